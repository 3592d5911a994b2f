// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Inter-site tunnel transport.
//!
//! Announcements travel between relay sites as plain UDP datagrams
//! with an 8-byte preamble in front of the untouched payload:
//!
//! ```text
//! 0        4        6        8
//! +--------+--------+--------+------------------+
//! | src IP | src    | dst    | payload...       |
//! | (BE)   | port BE| port BE|                  |
//! +--------+--------+--------+------------------+
//! ```
//!
//! The tunnel carries no version byte and no authentication; it is
//! expected to run inside an already-authenticated WireGuard link.
//! Both peers must use the same preamble format (an older 6-byte
//! format without the destination port is not interoperable).

use std::io;
use std::net::{Ipv4Addr, SocketAddrV4, UdpSocket};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use thiserror::Error;

use crate::listener::{spoof_fan_out, RECV_BUFFER_SIZE};
use crate::relay::RelayContext;

/// Preamble length in front of every tunneled payload.
pub const PREAMBLE_LEN: usize = 8;

/// Frame-level rejection. Anything malformed is dropped, never
/// answered.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("tunnel frame too short ({len} bytes)")]
    Truncated { len: usize },
}

/// A decoded inbound tunnel frame borrowing its payload.
#[derive(Debug, PartialEq, Eq)]
pub struct Frame<'a> {
    pub src_ip: Ipv4Addr,
    pub src_port: u16,
    pub dst_port: u16,
    pub payload: &'a [u8],
}

/// Prepend the preamble to a payload for transmission to the peer.
#[must_use]
pub fn encode_frame(src: SocketAddrV4, dst_port: u16, payload: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(PREAMBLE_LEN + payload.len());
    frame.extend_from_slice(&src.ip().octets());
    frame.extend_from_slice(&src.port().to_be_bytes());
    frame.extend_from_slice(&dst_port.to_be_bytes());
    frame.extend_from_slice(payload);
    frame
}

/// Split a received datagram into preamble and payload.
///
/// # Errors
/// A frame must carry the full preamble plus at least one payload
/// byte; anything shorter is [`FrameError::Truncated`].
pub fn decode_frame(buf: &[u8]) -> Result<Frame<'_>, FrameError> {
    if buf.len() < PREAMBLE_LEN + 1 {
        return Err(FrameError::Truncated { len: buf.len() });
    }
    Ok(Frame {
        src_ip: Ipv4Addr::new(buf[0], buf[1], buf[2], buf[3]),
        src_port: u16::from_be_bytes([buf[4], buf[5]]),
        dst_port: u16::from_be_bytes([buf[6], buf[7]]),
        payload: &buf[PREAMBLE_LEN..],
    })
}

/// Outbound half of the tunnel, shared by every listener worker.
#[derive(Clone)]
pub struct TunnelSender {
    socket: Arc<UdpSocket>,
    remote: SocketAddrV4,
}

impl TunnelSender {
    #[must_use]
    pub fn new(socket: Arc<UdpSocket>, remote: SocketAddrV4) -> Self {
        Self { socket, remote }
    }

    #[must_use]
    pub fn remote(&self) -> SocketAddrV4 {
        self.remote
    }

    #[must_use]
    pub fn socket(&self) -> Arc<UdpSocket> {
        Arc::clone(&self.socket)
    }

    /// Frame an announcement and send it to the peer relay.
    pub fn send(&self, payload: &[u8], src: SocketAddrV4, dst_port: u16) -> io::Result<()> {
        let frame = encode_frame(src, dst_port, payload);
        self.socket.send_to(&frame, self.remote)?;
        Ok(())
    }
}

/// Process one inbound tunnel frame: validate, spoof the original
/// sender onto every local interface, then deliver to unicast targets
/// through the destination protocol's own listener socket.
pub fn handle_frame(ctx: &RelayContext, buf: &[u8]) {
    let frame = match decode_frame(buf) {
        Ok(frame) => frame,
        Err(FrameError::Truncated { len }) => {
            log::debug!("[{}] tunnel: {} byte frame dropped", ctx.site_name, len);
            return;
        }
    };

    let Some(proto) = ctx.protocols.get(&frame.dst_port) else {
        log::warn!(
            "[{}] tunnel: frame for unknown port {} dropped",
            ctx.site_name,
            frame.dst_port
        );
        return;
    };

    let src = SocketAddrV4::new(frame.src_ip, frame.src_port);
    spoof_fan_out(ctx, proto, None, src, frame.payload);

    // Unicast delivery rides the LAN listener socket so targets see a
    // routable source. No listener (protocol disabled here) means no
    // unicast copies for this frame.
    let Some(socket) = ctx.lan_sockets.get(&frame.dst_port) else {
        return;
    };
    for target in &ctx.unicast_targets {
        if *target == frame.src_ip || ctx.local_ips.contains(target) {
            continue;
        }
        let dst = SocketAddrV4::new(*target, frame.dst_port);
        match socket.send_to(frame.payload, dst) {
            Ok(_) => log::info!(
                "[{}] {} tunnel {} -> {} (unicast)",
                ctx.site_name,
                proto.name,
                src,
                dst
            ),
            Err(err) => log::warn!(
                "[{}] {} unicast to {} failed: {}",
                ctx.site_name,
                proto.name,
                dst,
                err
            ),
        }
    }
}

/// Spawn the tunnel receive worker.
pub fn spawn_worker(
    ctx: Arc<RelayContext>,
    socket: Arc<UdpSocket>,
) -> io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("relay-tunnel".to_string())
        .spawn(move || run_loop(&ctx, &socket))
}

fn run_loop(ctx: &RelayContext, socket: &UdpSocket) {
    loop {
        let mut buf = [0u8; RECV_BUFFER_SIZE];
        match socket.recv_from(&mut buf) {
            Ok((len, peer)) => {
                log::debug!("[{}] tunnel: {} bytes from {}", ctx.site_name, len, peer);
                handle_frame(ctx, &buf[..len]);
            }
            Err(err) => {
                log::warn!("[{}] tunnel: recv error: {}", ctx.site_name, err);
            }
        }
    }
}
