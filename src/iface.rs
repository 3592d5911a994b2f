// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Declared local interfaces and subnet matching.
//!
//! Interfaces are configuration, not discovery: the relay only ever
//! touches the segments the operator listed. The configured broadcast
//! address is authoritative even when it disagrees with
//! `local_ip | !mask`.

use std::collections::HashSet;
use std::net::Ipv4Addr;

/// One declared local network segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interface {
    pub local_ip: Ipv4Addr,
    pub broadcast: Ipv4Addr,
    pub mask: Ipv4Addr,
}

impl Interface {
    /// Subnet containment: `ip & mask == local_ip & mask`.
    #[must_use]
    pub fn contains(&self, ip: Ipv4Addr) -> bool {
        let mask = u32::from(self.mask);
        u32::from(ip) & mask == u32::from(self.local_ip) & mask
    }
}

/// Find the declared interface whose subnet contains `ip`.
///
/// First match wins; declared interfaces are expected not to overlap.
#[must_use]
pub fn find_interface(interfaces: &[Interface], ip: Ipv4Addr) -> Option<&Interface> {
    interfaces.iter().find(|iface| iface.contains(ip))
}

/// The set of our own addresses, used for loop suppression: traffic
/// from any of these is ours coming back and must never be forwarded.
#[must_use]
pub fn local_ip_set(interfaces: &[Interface]) -> HashSet<Ipv4Addr> {
    interfaces.iter().map(|iface| iface.local_ip).collect()
}
