use thiserror::Error;

/// What `process_frame` and `arp_tick` surface to the I/O layer.
///
/// Network-visible failures are not errors: a routing miss, an ARP timeout
/// or an unsupported protocol turn into ICMP responses and return `Ok`.
/// Malformed frames are dropped silently and also return `Ok`. Only
/// resource and invariant failures reach the caller.
#[derive(Debug, Error)]
pub enum RouterError {
    /// The frame could not be processed; drop it and carry on.
    #[error("frame dropped: {0}")]
    Dropped(&'static str),
    /// An internal invariant is broken; the process should exit.
    #[error("router invariant violated: {0}")]
    Fatal(&'static str),
}

/// Failures while loading or resolving a router configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("could not parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("a router needs at least one interface")]
    NoInterfaces,
    #[error("interface {0:?} declared twice")]
    DuplicateInterface(String),
    #[error("interface {0:?} has an invalid MAC address: {1}")]
    InvalidMac(String, &'static str),
    #[error("route references unknown interface {0:?}")]
    UnknownInterface(String),
}
