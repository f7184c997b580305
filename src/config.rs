//! Runtime configuration for the engine and the network layer.
//!
//! Both structs carry the defaults the game ships with; the `play` binary
//! overrides individual fields from its command line flags.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use crate::DEFAULT_EXPLORATION;

/// Well-known UDP port rooms are advertised on.
pub const DISCOVERY_PORT: u16 = 55556;

/// Search and difficulty settings.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Exploration constant `C` in the UCT formula.
    pub exploration_parameter: f64,
    /// Thinking time at Easy difficulty.
    pub easy_time: Duration,
    /// Thinking time at Medium difficulty.
    pub medium_time: Duration,
    /// Program and arguments of the Hard-difficulty oracle, if any.
    pub oracle_command: Option<Vec<String>>,
    /// Fixed RNG seed; `None` seeds from entropy.
    pub seed: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            exploration_parameter: DEFAULT_EXPLORATION,
            easy_time: Duration::from_secs(1),
            medium_time: Duration::from_secs(3),
            oracle_command: None,
            seed: None,
        }
    }
}

/// LAN hosting, discovery and framing settings.
#[derive(Debug, Clone, PartialEq)]
pub struct NetConfig {
    /// Port discovery listens on.
    pub discovery_port: u16,
    /// Where room adverts are sent. Defaults to the IPv4 broadcast address on
    /// the discovery port.
    pub broadcast_target: SocketAddr,
    /// IP written into adverts; detected from the routing table when `None`.
    pub advertise_ip: Option<IpAddr>,
    /// Address the game listener binds to (port 0 picks an ephemeral port).
    pub listen_addr: SocketAddr,
    pub broadcast_interval: Duration,
    /// Read deadline of the receive task; a lapse is retried, not fatal.
    pub read_timeout: Duration,
    /// How long a discovery scan listens for adverts.
    pub discovery_window: Duration,
    pub connect_timeout: Duration,
}

impl Default for NetConfig {
    fn default() -> Self {
        NetConfig {
            discovery_port: DISCOVERY_PORT,
            broadcast_target: SocketAddr::new(IpAddr::V4(Ipv4Addr::BROADCAST), DISCOVERY_PORT),
            advertise_ip: None,
            listen_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0),
            broadcast_interval: Duration::from_secs(1),
            read_timeout: Duration::from_secs(1),
            discovery_window: Duration::from_secs(2),
            connect_timeout: Duration::from_secs(5),
        }
    }
}

impl NetConfig {
    /// Changes the discovery port and points the broadcast target at it.
    pub fn with_discovery_port(mut self, port: u16) -> Self {
        self.discovery_port = port;
        self.broadcast_target.set_port(port);
        self
    }

    /// Configuration for same-machine play and tests: adverts go to the
    /// loopback address instead of the broadcast address.
    pub fn loopback(discovery_port: u16) -> Self {
        let localhost = IpAddr::V4(Ipv4Addr::LOCALHOST);
        NetConfig {
            discovery_port,
            broadcast_target: SocketAddr::new(localhost, discovery_port),
            advertise_ip: Some(localhost),
            listen_addr: SocketAddr::new(localhost, 0),
            ..NetConfig::default()
        }
    }
}
