//! A minimal learning-grade IPv4 router core.
//!
//! The router consumes raw Ethernet frames through
//! [`router::Router::process_frame`], answers ARP and ICMP echo itself,
//! generates the small set of ICMP errors a router produces, and forwards
//! everything else, resolving next-hop MACs on demand through a pending
//! request table. Outbound frames leave through the [`sink::FrameSink`] the
//! embedding I/O layer provides. A once-per-second [`worker::ArpWorker`]
//! retransmits unanswered ARP requests and expires stale cache entries.
//!
//! A process may run any number of independent `Router` instances; they
//! share nothing. Frame delivery must be sequential per router, the worker
//! runs in parallel and synchronizes on the router's ARP mutex.

pub mod arp;
pub mod config;
pub mod icmp;
pub mod interface;
pub mod routing;
pub mod router;
pub mod sink;
pub mod worker;

mod error;
pub use self::error::*;
