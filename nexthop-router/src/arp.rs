//! ARP resolution state: the cache of resolved neighbors and the table of
//! in-flight requests with their withheld frames. Both live in one
//! [`ArpState`] so the classifier and the worker serialize on a single
//! mutex.

use crate::interface::InterfaceId;
use nexthop_packets::MacAddr;
use std::net::Ipv4Addr;
use std::time::{Duration, Instant};

/// Upper bound on resolved entries kept in a cache.
pub const ARP_CACHE_CAPACITY: usize = 256;

/// How many unanswered transmissions a pending request survives.
pub const ARP_RETRY_CAP: u8 = 5;

#[derive(Clone, Debug)]
pub struct ArpCacheEntry {
    pub ip: Ipv4Addr,
    pub mac: MacAddr,
    inserted: Instant,
}

/// Time-limited IPv4-to-MAC mapping, scoped to one router. Lookups are a
/// linear scan over at most [`ARP_CACHE_CAPACITY`] entries.
#[derive(Debug)]
pub struct ArpCache {
    entries: Vec<ArpCacheEntry>,
    ttl: Duration,
}

impl ArpCache {
    pub fn new(ttl: Duration) -> ArpCache {
        ArpCache {
            entries: Vec::new(),
            ttl,
        }
    }

    pub fn lookup(&self, ip: Ipv4Addr) -> Option<MacAddr> {
        self.entries
            .iter()
            .find(|entry| entry.ip == ip)
            .map(|entry| entry.mac)
    }

    /// Inserts or refreshes the mapping, stamping the insertion time. When
    /// the cache is full the oldest entry is evicted to make room.
    pub fn insert(&mut self, ip: Ipv4Addr, mac: MacAddr, now: Instant) {
        if let Some(entry) = self.entries.iter_mut().find(|entry| entry.ip == ip) {
            entry.mac = mac;
            entry.inserted = now;
            return;
        }
        if self.entries.len() >= ARP_CACHE_CAPACITY {
            if let Some(oldest) = self
                .entries
                .iter()
                .enumerate()
                .min_by_key(|(_, entry)| entry.inserted)
                .map(|(i, _)| i)
            {
                self.entries.swap_remove(oldest);
            }
        }
        self.entries.push(ArpCacheEntry { ip, mac, inserted: now });
    }

    /// Removes every entry older than the cache TTL.
    pub fn expire(&mut self, now: Instant) {
        let ttl = self.ttl;
        self.entries
            .retain(|entry| now.duration_since(entry.inserted) < ttl);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A frame held back until its next hop resolves. Owns a deep copy of the
/// original bytes; the ingress id is kept so an abandonment can return ICMP
/// host unreachable on the interface the frame came from.
#[derive(Clone, Debug)]
pub struct WithheldFrame {
    pub frame: Vec<u8>,
    pub ingress: InterfaceId,
}

/// One in-flight next-hop resolution: the address being resolved, the
/// interface the requests go out on, retry bookkeeping, and the frames
/// waiting for the answer.
#[derive(Debug)]
pub struct PendingRequest {
    pub ip: Ipv4Addr,
    pub interface: InterfaceId,
    pub times_sent: u8,
    pub last_sent: Option<Instant>,
    pub withheld: Vec<WithheldFrame>,
}

impl PendingRequest {
    /// Takes a deep copy of `frame` and appends it to the withheld list.
    pub fn attach_frame(&mut self, frame: &[u8], ingress: InterfaceId) {
        self.withheld.push(WithheldFrame {
            frame: frame.to_vec(),
            ingress,
        });
    }
}

/// The mutex-guarded bundle: cache and pending list are only ever mutated
/// together under the router's ARP lock.
#[derive(Debug)]
pub struct ArpState {
    pub cache: ArpCache,
    pub pending: Vec<PendingRequest>,
}

impl ArpState {
    pub fn new(cache_ttl: Duration) -> ArpState {
        ArpState {
            cache: ArpCache::new(cache_ttl),
            pending: Vec::new(),
        }
    }

    pub fn pending_lookup_mut(&mut self, ip: Ipv4Addr) -> Option<&mut PendingRequest> {
        self.pending.iter_mut().find(|request| request.ip == ip)
    }

    /// Appends a fresh pending entry with nothing sent yet.
    pub fn pending_create(&mut self, ip: Ipv4Addr, interface: InterfaceId) -> &mut PendingRequest {
        self.pending.push(PendingRequest {
            ip,
            interface,
            times_sent: 0,
            last_sent: None,
            withheld: Vec::new(),
        });
        self.pending.last_mut().unwrap()
    }

    /// Detaches and returns the pending entry for `ip`, withheld frames and
    /// all, so the caller can drain it outside the critical section.
    pub fn pending_remove(&mut self, ip: Ipv4Addr) -> Option<PendingRequest> {
        let index = self.pending.iter().position(|request| request.ip == ip)?;
        Some(self.pending.swap_remove(index))
    }
}
