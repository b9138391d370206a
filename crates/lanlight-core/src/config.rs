//! Tuning values threaded through session and discovery construction.

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::time::Duration;

/// UDP port devices listen on.
pub const DEVICE_PORT: u16 = 56700;

/// How long to wait for an ack or response before retransmitting
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(500);

/// Total transmissions per request before the device is declared unreachable
pub const DEFAULT_ATTEMPTS: u32 = 3;

/// Devices handle at most 20 messages per second
pub const DEFAULT_PACING: Duration = Duration::from_millis(50);

pub const DEFAULT_DISCOVERY_INTERVAL: Duration = Duration::from_secs(180);
pub const DEFAULT_DISCOVERY_STEP: Duration = Duration::from_secs(5);

/// Per-device request settings.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub timeout: Duration,
    pub max_attempts: u32,
    /// Delay between repeated fire-and-forget sends.
    pub pacing: Duration,
    /// Fetch label, group, firmware etc. in the background after each renew.
    pub refresh_metadata: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            max_attempts: DEFAULT_ATTEMPTS,
            pacing: DEFAULT_PACING,
            refresh_metadata: true,
        }
    }
}

impl SessionConfig {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn with_pacing(mut self, pacing: Duration) -> Self {
        self.pacing = pacing;
        self
    }

    pub fn with_refresh_metadata(mut self, refresh: bool) -> Self {
        self.refresh_metadata = refresh;
        self
    }
}

/// Discovery loop settings.
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    /// When set, sessions talk to the MAC-derived IPv6 address in this
    /// prefix instead of the IPv4 address replies came from.
    pub ipv6_prefix: Option<String>,
    /// Time between active probes.
    pub discovery_interval: Duration,
    /// Wake period of the loop; liveness sweeps run on every wake.
    pub discovery_step: Duration,
    /// Local port the discovery socket binds to.
    pub bind_port: u16,
    /// Destination of active probes.
    pub broadcast_addr: SocketAddr,
    pub session: SessionConfig,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            ipv6_prefix: None,
            discovery_interval: DEFAULT_DISCOVERY_INTERVAL,
            discovery_step: DEFAULT_DISCOVERY_STEP,
            bind_port: DEVICE_PORT,
            broadcast_addr: SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::BROADCAST, DEVICE_PORT)),
            session: SessionConfig::default(),
        }
    }
}

impl DiscoveryConfig {
    pub fn with_ipv6_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.ipv6_prefix = Some(prefix.into());
        self
    }

    pub fn with_discovery_interval(mut self, interval: Duration) -> Self {
        self.discovery_interval = interval;
        self
    }

    pub fn with_discovery_step(mut self, step: Duration) -> Self {
        self.discovery_step = step.max(Duration::from_millis(1));
        self
    }

    pub fn with_bind_port(mut self, port: u16) -> Self {
        self.bind_port = port;
        self
    }

    pub fn with_broadcast_addr(mut self, addr: SocketAddr) -> Self {
        self.broadcast_addr = addr;
        self
    }

    pub fn with_session(mut self, session: SessionConfig) -> Self {
        self.session = session;
        self
    }
}
