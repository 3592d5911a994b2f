// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Per-protocol UDP listeners and the forwarding policy.
//!
//! One listener per enabled protocol: a wildcard-bound socket joined
//! to the protocol's multicast group on every declared interface, and
//! a blocking receive loop in its own worker thread. The forwarding
//! policy in [`dispatch`] decides, per datagram, what goes into the
//! tunnel, which unicast targets get a copy, and which other
//! interfaces see a retransmit (native or source-spoofed).

use std::io;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, UdpSocket};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use socket2::{Domain, Protocol as SockProtocol, SockAddr, SockRef, Socket, Type};

use crate::iface::{find_interface, Interface};
use crate::protocol::Protocol;
use crate::relay::RelayContext;

/// Receive buffer per loop iteration. Discovery announcements are
/// small; 4 KiB leaves generous headroom.
pub const RECV_BUFFER_SIZE: usize = 4096;

/// A bound protocol listener. Binding can fail (another daemon may own
/// the port); the caller disables the protocol and moves on.
pub struct ProtocolListener {
    pub proto: Protocol,
    pub socket: Arc<UdpSocket>,
}

impl ProtocolListener {
    /// Bind the protocol's well-known port on the wildcard address and
    /// join its multicast group on every declared interface.
    ///
    /// Both TTLs on the socket are set to the protocol's wire TTL so
    /// native retransmits leave with the same hop limit as spoofed
    /// ones.
    ///
    /// # Errors
    /// Propagates the bind failure; a failed multicast join is only a
    /// warning (the interface may simply not route that group).
    pub fn bind(proto: Protocol, interfaces: &[Interface]) -> io::Result<Self> {
        let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(SockProtocol::UDP))?;
        socket.set_reuse_address(true)?;
        socket.set_broadcast(true)?;
        socket.set_ttl(u32::from(proto.ttl))?;
        socket.set_multicast_ttl_v4(u32::from(proto.ttl))?;
        socket.bind(&SockAddr::from(SocketAddrV4::new(
            Ipv4Addr::UNSPECIFIED,
            proto.port,
        )))?;
        let socket: UdpSocket = socket.into();

        if let Some(group) = proto.multicast_group {
            for iface in interfaces {
                match socket.join_multicast_v4(&group, &iface.local_ip) {
                    Ok(()) => {
                        log::debug!("[{}] joined {} on {}", proto.name, group, iface.local_ip);
                    }
                    Err(err) => {
                        log::warn!(
                            "[{}] join {} on {} failed: {}",
                            proto.name,
                            group,
                            iface.local_ip,
                            err
                        );
                    }
                }
            }
        }

        log::info!(
            "[{}] listening on 0.0.0.0:{} (multicast {}, ttl {})",
            proto.name,
            proto.port,
            proto
                .multicast_group
                .map_or_else(|| "none".to_string(), |group| group.to_string()),
            proto.ttl
        );

        Ok(Self {
            proto,
            socket: Arc::new(socket),
        })
    }
}

/// Spawn the listener's worker thread.
pub fn spawn_worker(
    ctx: Arc<RelayContext>,
    listener: ProtocolListener,
) -> io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name(format!("relay-{}", listener.proto.name.to_lowercase()))
        .spawn(move || run_loop(&ctx, &listener))
}

fn run_loop(ctx: &RelayContext, listener: &ProtocolListener) {
    let proto = listener.proto;
    loop {
        let mut buf = [0u8; RECV_BUFFER_SIZE];
        match listener.socket.recv_from(&mut buf) {
            Ok((len, SocketAddr::V4(src))) => {
                dispatch(ctx, &proto, &listener.socket, &buf[..len], src);
            }
            Ok((_, SocketAddr::V6(_))) => {}
            Err(err) => {
                log::warn!("[{}] recv error: {}", proto.name, err);
            }
        }
    }
}

/// The forwarding policy for one received datagram.
///
/// `socket` is the listener's own socket: unicast fan-out and native
/// retransmits ride it so the kernel supplies a routable source
/// address for each destination.
pub fn dispatch(
    ctx: &RelayContext,
    proto: &Protocol,
    socket: &UdpSocket,
    payload: &[u8],
    src: SocketAddrV4,
) {
    let sip = *src.ip();

    // Our own traffic coming back: never forward.
    if ctx.local_ips.contains(&sip) {
        return;
    }

    let from_unicast = ctx.unicast_targets.contains(&sip);
    let source_iface = find_interface(&ctx.interfaces, sip);
    if source_iface.is_none() && !from_unicast {
        log::debug!("[{}] {}: sender off topology, dropped", proto.name, src);
        return;
    }

    if let Some(tunnel) = &ctx.tunnel {
        match tunnel.send(payload, src, proto.port) {
            Ok(()) => log::info!(
                "[{}] {} {} -> tunnel {}",
                ctx.site_name,
                proto.name,
                src,
                tunnel.remote()
            ),
            Err(err) => log::warn!(
                "[{}] {} tunnel send failed: {}",
                ctx.site_name,
                proto.name,
                err
            ),
        }
    }

    for target in &ctx.unicast_targets {
        if *target == sip || ctx.local_ips.contains(target) {
            continue;
        }
        let dst = SocketAddrV4::new(*target, proto.port);
        match socket.send_to(payload, dst) {
            Ok(_) => log::info!(
                "[{}] {} {} -> {} (unicast)",
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

    if from_unicast {
        // Off-subnet sender: receivers must still see the original
        // source, so the copies go out through the raw emitter.
        spoof_fan_out(ctx, proto, source_iface, src, payload);
    } else {
        native_fan_out(ctx, proto, socket, source_iface, src, payload);
    }
}

/// Retransmit on every other interface with the sender's address
/// preserved, gated by the dedup window.
///
/// One dedup decision covers the whole packet: a suppressed source
/// port produces no emissions at all, a fresh one is emitted on every
/// fanned-out interface.
pub fn spoof_fan_out(
    ctx: &RelayContext,
    proto: &Protocol,
    exclude: Option<&Interface>,
    src: SocketAddrV4,
    payload: &[u8],
) {
    if ctx.dedup.check_and_record(src.port()) {
        log::debug!(
            "[{}] {} duplicate from source port {} suppressed",
            ctx.site_name,
            proto.name,
            src.port()
        );
        return;
    }

    for iface in &ctx.interfaces {
        if exclude == Some(iface) {
            continue;
        }
        if proto.use_broadcast {
            emit_spoofed(
                ctx,
                proto,
                src,
                SocketAddrV4::new(iface.broadcast, proto.port),
                payload,
            );
        }
        if let Some(group) = proto.multicast_group {
            emit_spoofed(ctx, proto, src, SocketAddrV4::new(group, proto.port), payload);
        }
    }
}

fn emit_spoofed(
    ctx: &RelayContext,
    proto: &Protocol,
    src: SocketAddrV4,
    dst: SocketAddrV4,
    payload: &[u8],
) {
    match ctx.emitter.emit(src, dst, proto.ttl, payload) {
        Ok(()) => log::info!(
            "[{}] {} {} -> {} (spoofed)",
            ctx.site_name,
            proto.name,
            src,
            dst
        ),
        Err(err) => log::warn!(
            "[{}] {} raw send to {} failed: {}",
            ctx.site_name,
            proto.name,
            dst,
            err
        ),
    }
}

/// Retransmit on every other interface from the listener socket; the
/// kernel's source selection supplies a correct address per subnet.
fn native_fan_out(
    ctx: &RelayContext,
    proto: &Protocol,
    socket: &UdpSocket,
    source_iface: Option<&Interface>,
    src: SocketAddrV4,
    payload: &[u8],
) {
    for iface in &ctx.interfaces {
        if source_iface == Some(iface) {
            continue;
        }
        if proto.use_broadcast {
            let dst = SocketAddrV4::new(iface.broadcast, proto.port);
            match socket.send_to(payload, dst) {
                Ok(_) => log::info!(
                    "[{}] {} {} -> {} (native)",
                    ctx.site_name,
                    proto.name,
                    src,
                    dst
                ),
                Err(err) => log::warn!(
                    "[{}] {} broadcast to {} failed: {}",
                    ctx.site_name,
                    proto.name,
                    dst,
                    err
                ),
            }
        }
        if let Some(group) = proto.multicast_group {
            // Point IP_MULTICAST_IF at this interface so the copy
            // egresses where intended. Only this worker writes native
            // multicast on this socket, so the option does not race.
            if let Err(err) = SockRef::from(socket).set_multicast_if_v4(&iface.local_ip) {
                log::warn!(
                    "[{}] {} IP_MULTICAST_IF {} failed: {}",
                    ctx.site_name,
                    proto.name,
                    iface.local_ip,
                    err
                );
                continue;
            }
            let dst = SocketAddrV4::new(group, proto.port);
            match socket.send_to(payload, dst) {
                Ok(_) => log::info!(
                    "[{}] {} {} -> {} via {} (native)",
                    ctx.site_name,
                    proto.name,
                    src,
                    dst,
                    iface.local_ip
                ),
                Err(err) => log::warn!(
                    "[{}] {} multicast via {} failed: {}",
                    ctx.site_name,
                    proto.name,
                    iface.local_ip,
                    err
                ),
            }
        }
    }
}
