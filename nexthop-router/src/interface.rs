use nexthop_packets::MacAddr;
use std::net::Ipv4Addr;

/// Index of an interface within its router's interface list. Frames and
/// withheld copies refer to interfaces by id so the router context owns no
/// self-references.
pub type InterfaceId = usize;

/// A logical router port: a name for configuration and logging, the MAC the
/// port answers to, and its IPv4 address. Created at startup, never mutated.
#[derive(Clone, Debug)]
pub struct Interface {
    pub name: String,
    pub mac: MacAddr,
    pub ip: Ipv4Addr,
}
