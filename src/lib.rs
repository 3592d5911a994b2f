// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # castrelay - cross-subnet relay for home audio discovery traffic
//!
//! Link-local discovery protocols (RAAT, mDNS/AirPlay, SSDP,
//! SlimProto) announce endpoints over UDP broadcast and multicast,
//! which never cross a routed boundary. castrelay bridges those
//! announcements between L2 segments — VLANs, WireGuard tunnels,
//! road-warrior VPN peers — while preserving each announcement's
//! original source address, so receivers treat the relayed packet as
//! if it had arrived on-link.
//!
//! ## Architecture
//!
//! ```text
//! +--------------------------------------------------------------+
//! |                      Relay supervisor                        |
//! |  config -> listeners -> workers -> shutdown signal           |
//! +--------------------------------------------------------------+
//! |  Protocol listeners (one blocking worker per protocol)       |
//! |  loop guard | classify | tunnel / unicast / interface fanout |
//! +--------------------------------------------------------------+
//! |  Tunnel endpoint            |  Raw emitter                   |
//! |  8-byte preamble + payload  |  IP_HDRINCL, forged src + TTL  |
//! +--------------------------------------------------------------+
//! ```
//!
//! Cross-subnet retransmits and tunnel-received announcements go out
//! through a raw IPv4 socket with the original sender's address and
//! the protocol's wire TTL in a hand-built header. Same-subnet
//! retransmits and unicast fan-out ride the ordinary listener sockets
//! and let the kernel pick a routable source.
//!
//! Emitting packets with a source address the host does not own is
//! hostile to strict reverse-path-filtering routers; deploying this
//! relay is an operational decision, not just a software one.

/// JSON configuration file handling and typed settings.
pub mod config;
/// Short-lived duplicate suppression shared by all workers.
pub mod dedup;
/// Fatal startup errors.
pub mod error;
/// Declared interfaces and subnet matching.
pub mod iface;
/// Per-protocol listeners and the forwarding policy.
pub mod listener;
/// IPv4/UDP datagram construction and checksumming.
pub mod packet;
/// Built-in discovery protocol descriptors.
pub mod protocol;
/// The raw-socket emitter behind the `Emitter` seam.
pub mod raw;
/// Supervisor wiring and shared runtime state.
pub mod relay;
/// Inter-site tunnel framing and workers.
pub mod tunnel;

pub use config::{ConfigError, RelayConfig, RelaySettings};
pub use error::RelayError;
pub use raw::{Emitter, RawEmitter};
pub use relay::{Relay, RelayContext};
