//! TOML configuration for a router: its interfaces, routing table, and the
//! ARP timing knobs. The I/O layer loads one of these per router instance
//! and hands the built [`Router`] its sink.

use crate::error::ConfigError;
use crate::interface::Interface;
use crate::router::{Router, Tunables};
use crate::routing::{RouteEntry, RoutingTable};
use crate::sink::FrameSink;
use nexthop_packets::MacAddr;
use serde::Deserialize;
use std::net::Ipv4Addr;
use std::path::Path;
use std::time::Duration;

/// On-disk description of one router.
///
/// ```toml
/// [[interfaces]]
/// name = "eth0"
/// mac = "02:00:00:00:00:01"
/// ip = "10.0.0.1"
///
/// [[routes]]
/// dest = "0.0.0.0"
/// mask = "0.0.0.0"
/// gateway = "10.0.0.254"
/// interface = "eth0"
/// ```
///
/// A route without a `gateway` is directly connected. The ARP knobs all
/// have defaults (15 s cache TTL, 1 s retry interval, 5 tries, no ingress
/// checksum validation).
#[derive(Clone, Debug, Deserialize)]
pub struct RouterConfig {
    pub interfaces: Vec<InterfaceConfig>,
    #[serde(default)]
    pub routes: Vec<RouteConfig>,
    #[serde(default = "default_arp_cache_ttl_secs")]
    pub arp_cache_ttl_secs: u64,
    #[serde(default = "default_arp_retry_interval_secs")]
    pub arp_retry_interval_secs: u64,
    #[serde(default = "default_arp_retry_cap")]
    pub arp_retry_cap: u8,
    #[serde(default)]
    pub validate_ip_checksum: bool,
}

#[derive(Clone, Debug, Deserialize)]
pub struct InterfaceConfig {
    pub name: String,
    pub mac: String,
    pub ip: Ipv4Addr,
}

#[derive(Clone, Debug, Deserialize)]
pub struct RouteConfig {
    pub dest: Ipv4Addr,
    pub mask: Ipv4Addr,
    pub gateway: Option<Ipv4Addr>,
    pub interface: String,
}

fn default_arp_cache_ttl_secs() -> u64 {
    15
}

fn default_arp_retry_interval_secs() -> u64 {
    1
}

fn default_arp_retry_cap() -> u8 {
    5
}

impl RouterConfig {
    pub fn from_toml_str(input: &str) -> Result<RouterConfig, ConfigError> {
        Ok(toml::from_str(input)?)
    }

    pub fn from_path(path: &Path) -> Result<RouterConfig, ConfigError> {
        RouterConfig::from_toml_str(&std::fs::read_to_string(path)?)
    }

    pub fn tunables(&self) -> Tunables {
        Tunables {
            arp_cache_ttl: Duration::from_secs(self.arp_cache_ttl_secs),
            arp_retry_interval: Duration::from_secs(self.arp_retry_interval_secs),
            arp_retry_cap: self.arp_retry_cap,
            validate_ip_checksum: self.validate_ip_checksum,
        }
    }

    /// Resolves names to interface ids and builds the router around `sink`.
    pub fn build<S: FrameSink>(&self, sink: S) -> Result<Router<S>, ConfigError> {
        if self.interfaces.is_empty() {
            return Err(ConfigError::NoInterfaces);
        }

        let mut interfaces = Vec::with_capacity(self.interfaces.len());
        for iface in &self.interfaces {
            if interfaces.iter().any(|built: &Interface| built.name == iface.name) {
                return Err(ConfigError::DuplicateInterface(iface.name.clone()));
            }
            let mac: MacAddr = iface
                .mac
                .parse()
                .map_err(|reason| ConfigError::InvalidMac(iface.name.clone(), reason))?;
            interfaces.push(Interface {
                name: iface.name.clone(),
                mac,
                ip: iface.ip,
            });
        }

        let mut entries = Vec::with_capacity(self.routes.len());
        for route in &self.routes {
            let interface = interfaces
                .iter()
                .position(|iface| iface.name == route.interface)
                .ok_or_else(|| ConfigError::UnknownInterface(route.interface.clone()))?;
            entries.push(RouteEntry {
                dest: route.dest,
                mask: route.mask,
                gateway: route.gateway.unwrap_or(Ipv4Addr::UNSPECIFIED),
                interface,
            });
        }

        Ok(Router::new(
            interfaces,
            RoutingTable::new(entries),
            self.tunables(),
            sink,
        ))
    }
}
