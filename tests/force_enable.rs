// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! RAAT last-resort behavior.
//!
//! Kept in its own test binary: both scenarios walk through RAAT's
//! real port 9003, which only one process may own at a time, so they
//! run sequentially inside a single test.

use std::io;
use std::net::{Ipv4Addr, SocketAddrV4, UdpSocket};
use std::sync::Arc;

use castrelay::config::{ProtocolFlags, RelaySettings};
use castrelay::iface::Interface;
use castrelay::raw::Emitter;
use castrelay::Relay;

struct NullEmitter;

impl Emitter for NullEmitter {
    fn emit(&self, _: SocketAddrV4, _: SocketAddrV4, _: u8, _: &[u8]) -> io::Result<()> {
        Ok(())
    }
}

fn settings(flags: ProtocolFlags) -> RelaySettings {
    RelaySettings {
        site_name: "site-b".to_string(),
        tunnel_port: 9993,
        remote_relay: None,
        interfaces: vec![Interface {
            local_ip: Ipv4Addr::new(127, 0, 5, 10),
            broadcast: Ipv4Addr::new(127, 0, 5, 255),
            mask: Ipv4Addr::new(255, 255, 255, 0),
        }],
        unicast_targets: Vec::new(),
        protocols: flags,
    }
}

#[test]
fn test_raat_force_enable_is_conditional() {
    // Scenario 1: RAAT was configured and its bind failed. No retry,
    // no duplicate listener - the relay comes up with zero workers.
    let holder = UdpSocket::bind(("0.0.0.0", 9003)).expect("occupy RAAT port");
    let relay = Relay::start_with_emitter(
        settings(ProtocolFlags {
            raat: true,
            air_play: false,
            ssdp: false,
            squeezebox: false,
        }),
        Arc::new(NullEmitter),
    )
    .expect("relay starts without listeners");
    assert_eq!(relay.worker_count(), 0);
    assert!(relay.context().protocols.is_empty());
    drop(relay);
    drop(holder);

    // Scenario 2: every protocol switched off in configuration. The
    // relay exists to carry RAAT, so RAAT comes up anyway.
    let relay = Relay::start_with_emitter(
        settings(ProtocolFlags {
            raat: false,
            air_play: false,
            ssdp: false,
            squeezebox: false,
        }),
        Arc::new(NullEmitter),
    )
    .expect("relay starts");
    assert_eq!(relay.worker_count(), 1);
    assert!(relay.context().protocols.contains_key(&9003));
}
