//! A distance-vector routing daemon in the style of RIPv2.
//!
//! One process per router: routes are learned by exchanging vector updates
//! with directly configured neighbors over UDP sockets on the loopback
//! interface. Split horizon with poisoned reverse is applied to outgoing
//! updates, stale routes are poisoned after a timeout and reaped after a
//! garbage-collection window.

use std::time::Duration;

mod config;
mod daemon;
mod error;
mod pkt;
mod table;

pub use self::config::{ConfigError, Neighbor, RouterConfig};
pub use self::daemon::RipRoutingDaemon;
pub use self::error::Error;
pub use self::pkt::{PacketError, RipCommand, RipEntry, RipPacket, MAX_PACKET_SIZE};
pub use self::table::{Route, RoutingTable};

/// Router identifiers are small integers, unique within the topology.
pub type RouterId = u16;

/// The metric denoting "unreachable"; the diameter cap of the network.
pub const INFINITY: u32 = 16;

/// Timing configuration for RIP routers.
///
/// All intervals derive from the route timeout: advertisements go out
/// every `timeout / 6`, and a dead route lingers for `timeout * 2 / 3`
/// so its poisoned metric can propagate before the entry disappears.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RipConfig {
    pub timeout: Duration,
    pub period: Duration,
    pub gc_time: Duration,
}

impl RipConfig {
    pub fn from_timeout(timeout: Duration) -> Self {
        Self {
            timeout,
            period: timeout / 6,
            gc_time: timeout * 2 / 3,
        }
    }
}

impl Default for RipConfig {
    fn default() -> Self {
        Self::from_timeout(Duration::from_secs(30))
    }
}
