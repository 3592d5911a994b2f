// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! The raw IPv4 emitter.
//!
//! One `AF_INET`/`SOCK_RAW`/`IPPROTO_UDP` socket with `IP_HDRINCL`
//! set, shared by every worker. A single `sendto` on a datagram below
//! the MTU is atomic on the platforms we run on, so the socket carries
//! no user-level lock. Creating it requires CAP_NET_RAW (or root);
//! failure to create it is fatal at startup.

use std::io;
use std::net::SocketAddrV4;

use socket2::{Domain, Protocol as SockProtocol, SockAddr, Socket, Type};

use crate::packet::{build_udp_datagram, MAX_PAYLOAD};

/// Seam between the forwarding policy and the privileged socket.
///
/// `src` is written verbatim into the forged IPv4/UDP headers; the
/// kernel routes on `dst` and ignores the sockaddr port for raw
/// sockets.
pub trait Emitter: Send + Sync {
    fn emit(&self, src: SocketAddrV4, dst: SocketAddrV4, ttl: u8, payload: &[u8])
        -> io::Result<()>;
}

/// Production [`Emitter`] backed by the raw socket.
pub struct RawEmitter {
    socket: Socket,
}

impl RawEmitter {
    /// Create and configure the raw socket.
    ///
    /// # Errors
    /// Any failure here (socket creation, `IP_HDRINCL`,
    /// `SO_BROADCAST`) means the relay cannot do its job and the
    /// caller must abort startup.
    pub fn new() -> io::Result<Self> {
        let socket = Socket::new(Domain::IPV4, Type::RAW, Some(SockProtocol::UDP))?;
        socket.set_header_included_v4(true)?;
        socket.set_broadcast(true)?;
        // Our own spoofed multicast must not be looped straight back
        // into the listeners.
        let _ = socket.set_multicast_loop_v4(false);

        log::info!("[raw] emitter ready (IP_HDRINCL, SO_BROADCAST)");
        Ok(Self { socket })
    }
}

impl Emitter for RawEmitter {
    fn emit(
        &self,
        src: SocketAddrV4,
        dst: SocketAddrV4,
        ttl: u8,
        payload: &[u8],
    ) -> io::Result<()> {
        if payload.len() > MAX_PAYLOAD {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "payload exceeds raw datagram capacity",
            ));
        }

        let gram = build_udp_datagram(src, dst, ttl, payload);
        self.socket.send_to(&gram, &SockAddr::from(dst))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    #[ignore = "requires CAP_NET_RAW"]
    fn test_raw_emitter_loopback_send() {
        let emitter = RawEmitter::new().expect("raw socket (run as root)");
        let src = SocketAddrV4::new(Ipv4Addr::new(192, 168, 100, 5), 54321);
        let dst = SocketAddrV4::new(Ipv4Addr::LOCALHOST, 9003);
        emitter
            .emit(src, dst, 64, b"announce")
            .expect("send should succeed");
    }

    #[test]
    #[ignore = "requires CAP_NET_RAW"]
    fn test_oversized_payload_rejected() {
        let emitter = RawEmitter::new().expect("raw socket (run as root)");
        let src = SocketAddrV4::new(Ipv4Addr::LOCALHOST, 1);
        let dst = SocketAddrV4::new(Ipv4Addr::LOCALHOST, 2);
        let err = emitter
            .emit(src, dst, 64, &vec![0u8; MAX_PAYLOAD + 1])
            .expect_err("must reject");
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }
}
