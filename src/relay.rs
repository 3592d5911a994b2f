// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Relay supervisor: wires the configured pieces together and spawns
//! the workers.
//!
//! Startup order matters: local-IP set first (loop suppression must be
//! in place before anything forwards), then the raw emitter (fatal if
//! unavailable), then one listener per enabled protocol (bind failure
//! disables just that protocol), then the tunnel socket when a peer is
//! configured. Workers run until the process exits; there is no
//! in-process restart, an external supervisor owns that.

use std::collections::{HashMap, HashSet};
use std::net::{Ipv4Addr, SocketAddrV4, UdpSocket};
use std::sync::Arc;
use std::thread::JoinHandle;

use crate::config::RelaySettings;
use crate::dedup::DedupWindow;
use crate::error::RelayError;
use crate::iface::{local_ip_set, Interface};
use crate::listener::{self, ProtocolListener};
use crate::protocol::{self, Protocol, RAAT};
use crate::raw::{Emitter, RawEmitter};
use crate::tunnel::{self, TunnelSender};

/// Everything the workers share. Immutable after startup except the
/// dedup window, which is internally synchronized.
pub struct RelayContext {
    pub site_name: String,
    pub interfaces: Vec<Interface>,
    pub local_ips: HashSet<Ipv4Addr>,
    pub unicast_targets: Vec<Ipv4Addr>,
    /// Surviving protocols keyed by well-known port.
    pub protocols: HashMap<u16, Protocol>,
    /// Listener sockets keyed by well-known port; the tunnel worker
    /// borrows them for unicast delivery.
    pub lan_sockets: HashMap<u16, Arc<UdpSocket>>,
    pub emitter: Arc<dyn Emitter>,
    pub dedup: DedupWindow,
    pub tunnel: Option<TunnelSender>,
}

/// A running relay. Dropping it does not stop the workers; they are
/// daemon-like and live until process exit.
pub struct Relay {
    context: Arc<RelayContext>,
    workers: Vec<JoinHandle<()>>,
}

impl Relay {
    /// Build the runtime state and start all workers.
    ///
    /// # Errors
    /// [`RelayError::RawInit`] when the raw socket cannot be created
    /// (missing CAP_NET_RAW is the usual cause).
    pub fn start(settings: RelaySettings) -> Result<Self, RelayError> {
        let emitter: Arc<dyn Emitter> =
            Arc::new(RawEmitter::new().map_err(RelayError::RawInit)?);
        Self::start_with_emitter(settings, emitter)
    }

    /// Start with a caller-supplied emitter. Tests use this to run the
    /// full relay without raw socket privileges.
    pub fn start_with_emitter(
        settings: RelaySettings,
        emitter: Arc<dyn Emitter>,
    ) -> Result<Self, RelayError> {
        let local_ips = local_ip_set(&settings.interfaces);
        log::info!(
            "[{}] starting: {} interface(s), {} unicast target(s)",
            settings.site_name,
            settings.interfaces.len(),
            settings.unicast_targets.len()
        );

        let selected = protocol::selected_protocols(&settings.protocols);
        let raat_attempted = selected.iter().any(|proto| proto.port == RAAT.port);

        let mut listeners = Vec::new();
        for proto in selected {
            match ProtocolListener::bind(proto, &settings.interfaces) {
                Ok(bound) => listeners.push(bound),
                Err(err) => log::warn!(
                    "[{}] {} disabled: bind 0.0.0.0:{} failed: {}",
                    settings.site_name,
                    proto.name,
                    proto.port,
                    err
                ),
            }
        }

        // The relay exists to carry RAAT; with nothing else standing,
        // bring it up even when the configuration switched it off. A
        // RAAT bind that already failed above is not retried.
        if listeners.is_empty() && !raat_attempted {
            log::warn!(
                "[{}] no protocol listener survived, force-enabling RAAT",
                settings.site_name
            );
            match ProtocolListener::bind(RAAT, &settings.interfaces) {
                Ok(bound) => listeners.push(bound),
                Err(err) => log::warn!(
                    "[{}] forced RAAT bind failed: {}",
                    settings.site_name,
                    err
                ),
            }
        }

        let tunnel = settings.remote_relay.and_then(|peer| {
            let remote = SocketAddrV4::new(peer, settings.tunnel_port);
            match UdpSocket::bind((Ipv4Addr::UNSPECIFIED, settings.tunnel_port)) {
                Ok(socket) => {
                    log::info!(
                        "[{}] tunnel on 0.0.0.0:{}, peer {}",
                        settings.site_name,
                        settings.tunnel_port,
                        remote
                    );
                    Some(TunnelSender::new(Arc::new(socket), remote))
                }
                Err(err) => {
                    log::warn!(
                        "[{}] tunnel disabled: bind 0.0.0.0:{} failed: {}",
                        settings.site_name,
                        settings.tunnel_port,
                        err
                    );
                    None
                }
            }
        });

        let protocols: HashMap<u16, Protocol> = listeners
            .iter()
            .map(|bound| (bound.proto.port, bound.proto))
            .collect();
        let lan_sockets: HashMap<u16, Arc<UdpSocket>> = listeners
            .iter()
            .map(|bound| (bound.proto.port, Arc::clone(&bound.socket)))
            .collect();

        let context = Arc::new(RelayContext {
            site_name: settings.site_name,
            interfaces: settings.interfaces,
            local_ips,
            unicast_targets: settings.unicast_targets,
            protocols,
            lan_sockets,
            emitter,
            dedup: DedupWindow::new(),
            tunnel: tunnel.clone(),
        });

        let mut workers = Vec::new();
        for bound in listeners {
            workers.push(
                listener::spawn_worker(Arc::clone(&context), bound)
                    .map_err(RelayError::Spawn)?,
            );
        }
        if let Some(sender) = tunnel {
            workers.push(
                tunnel::spawn_worker(Arc::clone(&context), sender.socket())
                    .map_err(RelayError::Spawn)?,
            );
        }

        log::info!(
            "[{}] running: protocols {:?}, tunnel {}",
            context.site_name,
            {
                let mut names: Vec<&str> =
                    context.protocols.values().map(|proto| proto.name).collect();
                names.sort_unstable();
                names
            },
            context
                .tunnel
                .as_ref()
                .map_or_else(|| "off".to_string(), |sender| sender.remote().to_string())
        );

        Ok(Self { context, workers })
    }

    /// Shared runtime state, mainly for tests and introspection.
    #[must_use]
    pub fn context(&self) -> Arc<RelayContext> {
        Arc::clone(&self.context)
    }

    /// Number of running workers (listeners + tunnel).
    #[must_use]
    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }
}
