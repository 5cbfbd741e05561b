use crate::interface::InterfaceId;
use std::net::Ipv4Addr;

/// One row of the routing table. Immutable after load.
#[derive(Clone, Debug)]
pub struct RouteEntry {
    pub dest: Ipv4Addr,
    pub mask: Ipv4Addr,
    /// 0.0.0.0 means the destination network is directly connected.
    pub gateway: Ipv4Addr,
    pub interface: InterfaceId,
}

impl RouteEntry {
    pub fn matches(&self, addr: Ipv4Addr) -> bool {
        u32::from(addr) & u32::from(self.mask) == u32::from(self.dest)
    }

    /// The link-layer neighbor a datagram to `dst` is handed to: the
    /// gateway, or `dst` itself on a directly connected network.
    pub fn next_hop(&self, dst: Ipv4Addr) -> Ipv4Addr {
        if self.gateway.is_unspecified() {
            dst
        } else {
            self.gateway
        }
    }
}

/// The routing table, loaded once at startup. Lookups are a linear scan; a
/// router of this size carries tens of entries at most.
#[derive(Clone, Debug, Default)]
pub struct RoutingTable {
    entries: Vec<RouteEntry>,
}

impl RoutingTable {
    pub fn new(entries: Vec<RouteEntry>) -> RoutingTable {
        RoutingTable { entries }
    }

    /// Longest-prefix match: the matching entry with the largest mask.
    /// Between two matches with equal masks the earlier entry wins.
    pub fn lookup(&self, dst: Ipv4Addr) -> Option<&RouteEntry> {
        let mut best: Option<&RouteEntry> = None;
        for entry in &self.entries {
            if !entry.matches(dst) {
                continue;
            }
            let better = match best {
                Some(current) => u32::from(entry.mask) > u32::from(current.mask),
                None => true,
            };
            if better {
                best = Some(entry);
            }
        }
        best
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
