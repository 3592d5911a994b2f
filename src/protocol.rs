// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Built-in discovery protocol descriptors.
//!
//! The relay speaks to fixed, well-known endpoints; nothing here is
//! configurable beyond the on/off flags. TTLs matter on the wire:
//! mDNS responders drop packets that do not arrive with TTL 255, and
//! SSDP traditionally stays within a site at TTL 4.

use std::net::Ipv4Addr;

use crate::config::ProtocolFlags;

/// A relayed discovery protocol: its well-known port, optional
/// multicast group, wire TTL, and whether announcements also go to the
/// subnet broadcast address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Protocol {
    pub name: &'static str,
    pub port: u16,
    pub multicast_group: Option<Ipv4Addr>,
    pub ttl: u8,
    pub use_broadcast: bool,
}

/// Roon Advanced Audio Transport discovery.
pub const RAAT: Protocol = Protocol {
    name: "RAAT",
    port: 9003,
    multicast_group: Some(Ipv4Addr::new(239, 255, 90, 90)),
    ttl: 64,
    use_broadcast: true,
};

/// mDNS as used by Bonjour/AirPlay. TTL 255 is required by responders.
pub const AIRPLAY: Protocol = Protocol {
    name: "AirPlay",
    port: 5353,
    multicast_group: Some(Ipv4Addr::new(224, 0, 0, 251)),
    ttl: 255,
    use_broadcast: false,
};

/// SSDP (UPnP discovery).
pub const SSDP: Protocol = Protocol {
    name: "SSDP",
    port: 1900,
    multicast_group: Some(Ipv4Addr::new(239, 255, 255, 250)),
    ttl: 4,
    use_broadcast: true,
};

/// Logitech/Squeezebox SlimProto discovery. Broadcast only.
pub const SQUEEZEBOX: Protocol = Protocol {
    name: "Squeezebox",
    port: 3483,
    multicast_group: None,
    ttl: 64,
    use_broadcast: true,
};

/// All built-in descriptors.
pub const ALL: [Protocol; 4] = [RAAT, AIRPLAY, SSDP, SQUEEZEBOX];

/// The descriptors selected by the configuration flags, in table order.
#[must_use]
pub fn selected_protocols(flags: &ProtocolFlags) -> Vec<Protocol> {
    let mut selected = Vec::new();
    if flags.raat {
        selected.push(RAAT);
    }
    if flags.air_play {
        selected.push(AIRPLAY);
    }
    if flags.ssdp {
        selected.push(SSDP);
    }
    if flags.squeezebox {
        selected.push(SQUEEZEBOX);
    }
    selected
}
