mod types;
pub use self::types::*;

mod checksum;
pub use self::checksum::*;

mod ethernet;
pub use self::ethernet::*;

mod ipv4;
pub use self::ipv4::*;

mod arp;
pub use self::arp::*;

mod icmp;
pub use self::icmp::*;
