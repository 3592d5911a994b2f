// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Relay configuration.
//!
//! Loaded once at startup from a JSON file (`appsettings.json` by
//! default) and never mutated. The on-disk key casing is part of the
//! format: `SiteName`, `TunnelPort`, `RemoteRelayIp`,
//! `LocalInterfaces`, `UnicastTargets`, `Protocols`.

use std::net::Ipv4Addr;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::iface::Interface;

/// Configuration errors. All fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid address {value:?} in {field}")]
    InvalidAddress { field: &'static str, value: String },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Top-level configuration file shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RelayConfig {
    /// Site tag carried in every log line.
    #[serde(default = "default_site_name")]
    pub site_name: String,

    /// UDP port for the inter-site tunnel (both peers use the same).
    #[serde(default = "default_tunnel_port")]
    pub tunnel_port: u16,

    /// Peer relay address. Empty string means no tunnel.
    #[serde(default)]
    pub remote_relay_ip: String,

    /// The L2 segments this relay bridges.
    #[serde(default)]
    pub local_interfaces: Vec<InterfaceConfig>,

    /// Off-subnet endpoints (road-warrior VPN peers) reached by
    /// unicast. May be absent or null.
    #[serde(default)]
    pub unicast_targets: Option<Vec<String>>,

    /// Protocol on/off switches. A missing object enables RAAT only.
    #[serde(default)]
    pub protocols: ProtocolFlags,
}

/// One declared interface as written in the file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct InterfaceConfig {
    pub local_ip: String,
    pub broadcast_address: String,
    pub subnet_mask: String,
}

/// Which protocols to relay.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ProtocolFlags {
    #[serde(default = "default_true")]
    pub raat: bool,
    #[serde(default)]
    pub air_play: bool,
    #[serde(default)]
    pub ssdp: bool,
    #[serde(default)]
    pub squeezebox: bool,
}

impl Default for ProtocolFlags {
    fn default() -> Self {
        Self {
            raat: true,
            air_play: false,
            ssdp: false,
            squeezebox: false,
        }
    }
}

fn default_site_name() -> String {
    "relay".to_string()
}

fn default_tunnel_port() -> u16 {
    9993
}

fn default_true() -> bool {
    true
}

/// Parsed, typed settings derived from [`RelayConfig`].
#[derive(Debug, Clone)]
pub struct RelaySettings {
    pub site_name: String,
    pub tunnel_port: u16,
    pub remote_relay: Option<Ipv4Addr>,
    pub interfaces: Vec<Interface>,
    pub unicast_targets: Vec<Ipv4Addr>,
    pub protocols: ProtocolFlags,
}

impl RelayConfig {
    /// Load configuration from a JSON file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Write an example configuration, used when the file is missing.
    pub fn write_example(path: &Path) -> Result<(), ConfigError> {
        let example = RelayConfig {
            site_name: "home".to_string(),
            tunnel_port: default_tunnel_port(),
            remote_relay_ip: String::new(),
            local_interfaces: vec![
                InterfaceConfig {
                    local_ip: "172.16.0.108".to_string(),
                    broadcast_address: "172.16.0.255".to_string(),
                    subnet_mask: "255.255.255.0".to_string(),
                },
                InterfaceConfig {
                    local_ip: "192.168.100.100".to_string(),
                    broadcast_address: "192.168.100.255".to_string(),
                    subnet_mask: "255.255.255.0".to_string(),
                },
            ],
            unicast_targets: Some(Vec::new()),
            protocols: ProtocolFlags::default(),
        };
        let content = serde_json::to_string_pretty(&example)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Parse string fields into typed addresses.
    pub fn resolve(&self) -> Result<RelaySettings, ConfigError> {
        let remote_relay = if self.remote_relay_ip.trim().is_empty() {
            None
        } else {
            Some(parse_addr("RemoteRelayIp", &self.remote_relay_ip)?)
        };

        let mut interfaces = Vec::with_capacity(self.local_interfaces.len());
        for entry in &self.local_interfaces {
            interfaces.push(Interface {
                local_ip: parse_addr("LocalIp", &entry.local_ip)?,
                broadcast: parse_addr("BroadcastAddress", &entry.broadcast_address)?,
                mask: parse_addr("SubnetMask", &entry.subnet_mask)?,
            });
        }

        let mut unicast_targets = Vec::new();
        for target in self.unicast_targets.iter().flatten() {
            unicast_targets.push(parse_addr("UnicastTargets", target)?);
        }

        let settings = RelaySettings {
            site_name: self.site_name.clone(),
            tunnel_port: self.tunnel_port,
            remote_relay,
            interfaces,
            unicast_targets,
            protocols: self.protocols.clone(),
        };
        settings.validate()?;
        Ok(settings)
    }
}

impl RelaySettings {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.interfaces.is_empty() {
            return Err(ConfigError::Invalid(
                "LocalInterfaces must declare at least one interface".into(),
            ));
        }
        if self.remote_relay.is_some() && self.tunnel_port == 0 {
            return Err(ConfigError::Invalid(
                "TunnelPort cannot be 0 when RemoteRelayIp is set".into(),
            ));
        }
        Ok(())
    }
}

fn parse_addr(field: &'static str, value: &str) -> Result<Ipv4Addr, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidAddress {
            field,
            value: value.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIXTURE: &str = r#"{
        "SiteName": "studio",
        "TunnelPort": 9993,
        "RemoteRelayIp": "198.51.100.17",
        "LocalInterfaces": [
            { "LocalIp": "172.16.0.108", "BroadcastAddress": "172.16.0.255", "SubnetMask": "255.255.255.0" },
            { "LocalIp": "192.168.100.100", "BroadcastAddress": "192.168.100.255", "SubnetMask": "255.255.255.0" }
        ],
        "UnicastTargets": ["10.10.99.5"],
        "Protocols": { "Raat": true, "AirPlay": true, "Ssdp": false, "Squeezebox": false }
    }"#;

    #[test]
    fn test_parse_pascal_case_fixture() {
        let config: RelayConfig = serde_json::from_str(FIXTURE).expect("fixture parses");
        assert_eq!(config.site_name, "studio");
        assert_eq!(config.tunnel_port, 9993);
        assert_eq!(config.local_interfaces.len(), 2);
        assert!(config.protocols.raat);
        assert!(config.protocols.air_play);
        assert!(!config.protocols.ssdp);

        let settings = config.resolve().expect("resolves");
        assert_eq!(settings.remote_relay, Some("198.51.100.17".parse().unwrap()));
        assert_eq!(settings.unicast_targets, vec!["10.10.99.5".parse::<Ipv4Addr>().unwrap()]);
        assert_eq!(settings.interfaces[1].broadcast, "192.168.100.255".parse::<Ipv4Addr>().unwrap());
    }

    #[test]
    fn test_missing_protocols_means_raat_only() {
        let json = r#"{
            "SiteName": "a",
            "TunnelPort": 9993,
            "RemoteRelayIp": "",
            "LocalInterfaces": [
                { "LocalIp": "10.0.0.1", "BroadcastAddress": "10.0.0.255", "SubnetMask": "255.255.255.0" }
            ]
        }"#;
        let config: RelayConfig = serde_json::from_str(json).expect("parses");
        assert!(config.protocols.raat);
        assert!(!config.protocols.air_play);
        assert!(!config.protocols.ssdp);
        assert!(!config.protocols.squeezebox);
    }

    #[test]
    fn test_empty_protocols_object_defaults_raat_true() {
        let json = r#"{
            "LocalInterfaces": [
                { "LocalIp": "10.0.0.1", "BroadcastAddress": "10.0.0.255", "SubnetMask": "255.255.255.0" }
            ],
            "Protocols": {}
        }"#;
        let config: RelayConfig = serde_json::from_str(json).expect("parses");
        assert!(config.protocols.raat);
    }

    #[test]
    fn test_null_unicast_targets_tolerated() {
        let json = r#"{
            "LocalInterfaces": [
                { "LocalIp": "10.0.0.1", "BroadcastAddress": "10.0.0.255", "SubnetMask": "255.255.255.0" }
            ],
            "UnicastTargets": null
        }"#;
        let config: RelayConfig = serde_json::from_str(json).expect("parses");
        let settings = config.resolve().expect("resolves");
        assert!(settings.unicast_targets.is_empty());
    }

    #[test]
    fn test_empty_remote_relay_means_no_tunnel() {
        let json = r#"{
            "RemoteRelayIp": "",
            "LocalInterfaces": [
                { "LocalIp": "10.0.0.1", "BroadcastAddress": "10.0.0.255", "SubnetMask": "255.255.255.0" }
            ]
        }"#;
        let settings = serde_json::from_str::<RelayConfig>(json)
            .expect("parses")
            .resolve()
            .expect("resolves");
        assert_eq!(settings.remote_relay, None);
    }

    #[test]
    fn test_malformed_address_rejected() {
        let json = r#"{
            "LocalInterfaces": [
                { "LocalIp": "not-an-ip", "BroadcastAddress": "10.0.0.255", "SubnetMask": "255.255.255.0" }
            ]
        }"#;
        let err = serde_json::from_str::<RelayConfig>(json)
            .expect("parses")
            .resolve()
            .expect_err("must reject");
        assert!(matches!(err, ConfigError::InvalidAddress { field: "LocalIp", .. }));
    }

    #[test]
    fn test_no_interfaces_rejected() {
        let config: RelayConfig = serde_json::from_str("{}").expect("parses");
        assert!(matches!(
            config.resolve(),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_example_config_round_trips() {
        let dir = std::env::temp_dir().join(format!("castrelay-cfg-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("appsettings.json");

        RelayConfig::write_example(&path).expect("example written");
        let config = RelayConfig::load(&path).expect("example loads");
        let settings = config.resolve().expect("example resolves");

        assert_eq!(settings.site_name, "home");
        assert_eq!(settings.remote_relay, None);
        assert_eq!(settings.interfaces.len(), 2);
        assert!(settings.protocols.raat);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_serialized_keys_are_pascal_case() {
        let json = serde_json::to_string(&RelayConfig {
            site_name: "x".into(),
            tunnel_port: 1,
            remote_relay_ip: String::new(),
            local_interfaces: vec![InterfaceConfig {
                local_ip: "10.0.0.1".into(),
                broadcast_address: "10.0.0.255".into(),
                subnet_mask: "255.255.255.0".into(),
            }],
            unicast_targets: None,
            protocols: ProtocolFlags::default(),
        })
        .unwrap();
        for key in [
            "\"SiteName\"",
            "\"TunnelPort\"",
            "\"RemoteRelayIp\"",
            "\"LocalInterfaces\"",
            "\"LocalIp\"",
            "\"BroadcastAddress\"",
            "\"SubnetMask\"",
            "\"Protocols\"",
            "\"Raat\"",
            "\"AirPlay\"",
            "\"Ssdp\"",
            "\"Squeezebox\"",
        ] {
            assert!(json.contains(key), "missing {} in {}", key, json);
        }
    }
}
