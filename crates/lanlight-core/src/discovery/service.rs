//! Active and passive device discovery.
//!
//! A single task owns the broadcast socket and the device registry. It
//! probes the segment periodically, treats every service announcement or
//! volunteered light state as a discovery event, and drops sessions whose
//! transport has died. Everyone else sees an immutable snapshot of the
//! registry published through a watch channel.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tokio::sync::{oneshot, watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info, trace, warn};

use super::address::resolve_ipv6;
use crate::collection::DeviceCollection;
use crate::config::{DiscoveryConfig, SessionConfig, DEVICE_PORT};
use crate::device::{Connector, DeviceSession, UdpConnector};
use crate::error::Result;
use crate::protocol::{Codec, LanCodec, Message, Payload, SERVICE_UDP};
use crate::types::{DeviceSummary, MacAddr};

const RECV_BUFFER: usize = 2048;

/// Published view of the registry, sorted by hardware address.
pub type DeviceSnapshot = Arc<[Arc<DeviceSession>]>;

/// Lifecycle of a [`Discovery`] instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryState {
    /// Created, no socket yet.
    Idle,
    /// Socket bound, loop not yet running.
    Bound,
    Running,
    /// Shut down; socket released and sessions torn down.
    Stopped,
}

/// Create a UDP socket on `port` that shares the port with other listeners
/// and may send broadcasts.
pub fn create_broadcast_socket(port: u16) -> io::Result<std::net::UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;

    socket.set_reuse_address(true)?;

    #[cfg(unix)]
    socket.set_reuse_port(true)?;

    socket.set_broadcast(true)?;

    let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));
    socket.bind(&addr.into())?;

    socket.set_nonblocking(true)?;

    Ok(socket.into())
}

/// What a datagram meant to the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryEvent {
    Discovered(MacAddr),
    Rediscovered(MacAddr),
}

/// Result of one wake cycle.
#[derive(Debug, Default)]
pub struct WakeOutcome {
    pub probe: bool,
    pub dropped: Vec<MacAddr>,
}

/// Device registry plus the probe countdown. Holds no socket.
pub struct Registry {
    sessions: HashMap<MacAddr, Arc<DeviceSession>>,
    codec: Arc<dyn Codec>,
    connector: Arc<dyn Connector>,
    ipv6_prefix: Option<String>,
    session_config: SessionConfig,
    interval: Duration,
    step: Duration,
    countdown: Duration,
}

impl Registry {
    pub fn new(config: &DiscoveryConfig, codec: Arc<dyn Codec>, connector: Arc<dyn Connector>) -> Self {
        Self {
            sessions: HashMap::new(),
            codec,
            connector,
            ipv6_prefix: config.ipv6_prefix.clone(),
            session_config: config.session.clone(),
            interval: config.discovery_interval,
            step: config.discovery_step,
            countdown: Duration::ZERO,
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn get(&self, mac: &MacAddr) -> Option<&Arc<DeviceSession>> {
        self.sessions.get(mac)
    }

    /// Handle one datagram received on the discovery socket.
    ///
    /// Returns `Ok(None)` for anything that is not a discovery event.
    pub fn on_datagram(&mut self, datagram: &[u8], from: SocketAddr) -> Result<Option<DiscoveryEvent>> {
        let message = match self.codec.decode(datagram) {
            Ok(message) => message,
            Err(e) => {
                trace!(%from, error = %e, "Ignoring undecodable datagram");
                return Ok(None);
            }
        };

        let mac = message.target;
        if mac.is_broadcast() {
            return Ok(None);
        }

        let port = match message.payload {
            Payload::StateService { service, port } if service == SERVICE_UDP => {
                match u16::try_from(port) {
                    Ok(port) => port,
                    Err(_) => {
                        debug!(%mac, port, "Ignoring service with invalid port");
                        return Ok(None);
                    }
                }
            }
            // Lights volunteer their state after booting.
            Payload::LightState { .. } => DEVICE_PORT,
            _ => return Ok(None),
        };

        let ip = match &self.ipv6_prefix {
            Some(prefix) => IpAddr::V6(resolve_ipv6(mac, prefix)?),
            None => from.ip(),
        };
        let addr = SocketAddr::new(ip, port);

        let (session, event) = match self.sessions.entry(mac) {
            Entry::Occupied(entry) => {
                debug!(%mac, %addr, "Rediscovered device");
                (Arc::clone(entry.get()), DiscoveryEvent::Rediscovered(mac))
            }
            Entry::Vacant(entry) => {
                let session = DeviceSession::new(
                    mac,
                    addr,
                    Arc::clone(&self.codec),
                    Arc::clone(&self.connector),
                    self.session_config.clone(),
                );
                info!(%mac, %addr, "Discovered device");
                (Arc::clone(entry.insert(session)), DiscoveryEvent::Discovered(mac))
            }
        };

        session.renew(addr)?;
        Ok(Some(event))
    }

    /// Drop dead sessions and decide whether this wake sends a probe.
    pub fn on_wake(&mut self) -> WakeOutcome {
        let dead: Vec<MacAddr> = self
            .sessions
            .iter()
            .filter(|(_, session)| !session.is_alive())
            .map(|(mac, _)| *mac)
            .collect();

        for mac in &dead {
            if let Some(session) = self.sessions.remove(mac) {
                info!(device = %session, "Dropping device");
                session.teardown();
            }
        }

        let probe = if self.countdown.is_zero() {
            self.countdown = self.interval;
            true
        } else {
            self.countdown = self.countdown.saturating_sub(self.step);
            false
        };

        WakeOutcome {
            probe,
            dropped: dead,
        }
    }

    /// Make the next wake send a probe.
    pub fn request_probe(&mut self) {
        self.countdown = Duration::ZERO;
    }

    pub fn snapshot(&self) -> DeviceSnapshot {
        let mut sessions: Vec<Arc<DeviceSession>> = self.sessions.values().cloned().collect();
        sessions.sort_by_key(|session| session.mac());
        sessions.into()
    }

    /// Tear down and forget every session.
    pub fn shutdown(&mut self) {
        for (_, session) in self.sessions.drain() {
            session.teardown();
        }
    }
}

struct DiscoveryLoop {
    socket: UdpSocket,
    registry: Registry,
    probe: Bytes,
    broadcast_addr: SocketAddr,
    probe_requested: Arc<Notify>,
    devices: watch::Sender<DeviceSnapshot>,
    state: Arc<watch::Sender<DiscoveryState>>,
}

impl DiscoveryLoop {
    async fn run(mut self, step: Duration, mut shutdown: oneshot::Receiver<()>) {
        self.state.send_replace(DiscoveryState::Running);

        let mut wake = time::interval(step);
        wake.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut buf = vec![0u8; RECV_BUFFER];

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = wake.tick() => self.wake().await,
                _ = self.probe_requested.notified() => {
                    self.registry.request_probe();
                    self.wake().await;
                }
                received = self.socket.recv_from(&mut buf) => match received {
                    Ok((len, from)) => self.datagram(&buf[..len], from),
                    Err(e) => warn!(error = %e, "Discovery receive failed"),
                },
            }
        }

        self.registry.shutdown();
        self.devices.send_replace(Arc::from(Vec::new()));
        self.state.send_replace(DiscoveryState::Stopped);
        info!("Discovery stopped");
    }

    fn datagram(&mut self, datagram: &[u8], from: SocketAddr) {
        match self.registry.on_datagram(datagram, from) {
            Ok(Some(DiscoveryEvent::Discovered(_))) => self.publish(),
            Ok(_) => {}
            Err(e) => warn!(%from, error = %e, "Failed to handle discovery datagram"),
        }
    }

    async fn wake(&mut self) {
        let outcome = self.registry.on_wake();
        if !outcome.dropped.is_empty() {
            self.publish();
        }

        if outcome.probe {
            debug!(to = %self.broadcast_addr, "Sending discovery probe");
            if let Err(e) = self.socket.send_to(&self.probe, self.broadcast_addr).await {
                warn!(to = %self.broadcast_addr, error = %e, "Failed to send discovery probe");
            }
        }
    }

    fn publish(&self) {
        self.devices.send_replace(self.registry.snapshot());
    }
}

/// Handle on the discovery loop.
pub struct Discovery {
    config: DiscoveryConfig,
    codec: Arc<dyn Codec>,
    connector: Arc<dyn Connector>,
    state: Arc<watch::Sender<DiscoveryState>>,
    devices: watch::Receiver<DeviceSnapshot>,
    devices_tx: Option<watch::Sender<DeviceSnapshot>>,
    probe_requested: Arc<Notify>,
    local_addr: Option<SocketAddr>,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl Discovery {
    /// Create an idle discovery instance using UDP sessions and the LAN codec.
    pub fn new(config: DiscoveryConfig) -> Self {
        let (devices_tx, devices) = watch::channel::<DeviceSnapshot>(Arc::from(Vec::new()));
        let (state, _) = watch::channel(DiscoveryState::Idle);
        Self {
            config,
            codec: Arc::new(LanCodec),
            connector: Arc::new(UdpConnector),
            state: Arc::new(state),
            devices,
            devices_tx: Some(devices_tx),
            probe_requested: Arc::new(Notify::new()),
            local_addr: None,
            shutdown: None,
            task: None,
        }
    }

    pub fn with_codec(mut self, codec: Arc<dyn Codec>) -> Self {
        self.codec = codec;
        self
    }

    pub fn with_connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = connector;
        self
    }

    /// Bind the discovery socket and spawn the loop. A no-op unless idle.
    pub async fn start(&mut self) -> Result<()> {
        let Some(devices) = self.devices_tx.take() else {
            return Ok(());
        };

        let socket = UdpSocket::from_std(create_broadcast_socket(self.config.bind_port)?)?;
        let local_addr = socket.local_addr()?;
        self.local_addr = Some(local_addr);
        self.state.send_replace(DiscoveryState::Bound);
        info!(%local_addr, "Discovery listening");

        let probe = self.codec.encode(&Message::discovery_probe(rand::random::<u32>()));
        let discovery_loop = DiscoveryLoop {
            socket,
            registry: Registry::new(&self.config, Arc::clone(&self.codec), Arc::clone(&self.connector)),
            probe,
            broadcast_addr: self.config.broadcast_addr,
            probe_requested: Arc::clone(&self.probe_requested),
            devices,
            state: Arc::clone(&self.state),
        };

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        self.shutdown = Some(shutdown_tx);
        self.task = Some(tokio::spawn(
            discovery_loop.run(self.config.discovery_step, shutdown_rx),
        ));
        Ok(())
    }

    pub fn state(&self) -> DiscoveryState {
        *self.state.borrow()
    }

    /// Address the discovery socket is bound to, once started.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Current set of known devices, sorted by hardware address.
    pub fn devices(&self) -> DeviceCollection {
        DeviceCollection::new(self.devices.borrow().to_vec())
    }

    /// Wait until the published device set changes.
    pub async fn changed(&mut self) -> bool {
        self.devices.changed().await.is_ok()
    }

    /// Run a wake cycle with a probe right away.
    pub fn probe_now(&self) {
        self.probe_requested.notify_one();
    }

    /// Shut the loop down, releasing the socket and tearing down every session.
    pub async fn stop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!(error = %e, "Discovery task ended abnormally");
            }
        }
        self.state.send_replace(DiscoveryState::Stopped);
    }

    /// Discover for `duration` and return what was found.
    pub async fn discover_once(config: DiscoveryConfig, duration: Duration) -> Result<Vec<DeviceSummary>> {
        let mut discovery = Discovery::new(config);
        discovery.start().await?;
        time::sleep(duration).await;

        let found = discovery.devices().summaries();
        discovery.stop().await;
        Ok(found)
    }
}

impl Drop for Discovery {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::testing::RecordingConnector;

    const FROM: &str = "192.168.1.40:56700";

    fn config() -> DiscoveryConfig {
        DiscoveryConfig::default()
            .with_discovery_interval(Duration::from_secs(15))
            .with_discovery_step(Duration::from_secs(5))
            .with_session(SessionConfig::default().with_refresh_metadata(false))
    }

    fn registry(config: &DiscoveryConfig, connector: &Arc<RecordingConnector>) -> Registry {
        Registry::new(config, Arc::new(LanCodec), connector.clone())
    }

    fn announcement(mac: &str, payload: Payload) -> Vec<u8> {
        let message = Message {
            target: mac.parse().unwrap(),
            source: 0,
            sequence: 0,
            ack_required: false,
            res_required: false,
            payload,
        };
        LanCodec.encode(&message).to_vec()
    }

    fn service(mac: &str, port: u32) -> Vec<u8> {
        announcement(
            mac,
            Payload::StateService {
                service: SERVICE_UDP,
                port,
            },
        )
    }

    #[tokio::test]
    async fn test_service_announcement_creates_session() {
        let connector = RecordingConnector::new();
        let mut registry = registry(&config(), &connector);

        let event = registry
            .on_datagram(&service("d0:73:d5:00:00:01", 56701), FROM.parse().unwrap())
            .unwrap();

        let mac: MacAddr = "d0:73:d5:00:00:01".parse().unwrap();
        assert_eq!(event, Some(DiscoveryEvent::Discovered(mac)));
        assert_eq!(registry.len(), 1);
        assert_eq!(
            registry.get(&mac).unwrap().address(),
            "192.168.1.40:56701".parse().unwrap()
        );
        assert_eq!(connector.connect_count(), 1);
    }

    #[tokio::test]
    async fn test_volunteered_state_uses_default_port() {
        let connector = RecordingConnector::new();
        let mut registry = registry(&config(), &connector);

        let state = Payload::LightState {
            color: Default::default(),
            power: 0,
            label: String::new(),
        };
        registry
            .on_datagram(&announcement("d0:73:d5:00:00:02", state), "192.168.1.41:1234".parse().unwrap())
            .unwrap();

        assert_eq!(connector.last().remote(), "192.168.1.41:56700".parse().unwrap());
    }

    #[tokio::test]
    async fn test_non_discovery_datagrams_are_ignored() {
        let connector = RecordingConnector::new();
        let mut registry = registry(&config(), &connector);
        let from = FROM.parse().unwrap();

        let ignored = [
            service("00:00:00:00:00:00", 56700),
            announcement(
                "d0:73:d5:00:00:03",
                Payload::StateService {
                    service: 5,
                    port: 56700,
                },
            ),
            announcement("d0:73:d5:00:00:03", Payload::StatePower { level: 0 }),
            b"not a packet".to_vec(),
        ];
        for datagram in &ignored {
            assert_eq!(registry.on_datagram(datagram, from).unwrap(), None);
        }
        assert!(registry.is_empty());
        assert_eq!(connector.connect_count(), 0);
    }

    #[tokio::test]
    async fn test_rediscovery_renews_existing_session() {
        let connector = RecordingConnector::new();
        let mut registry = registry(&config(), &connector);
        let datagram = service("d0:73:d5:00:00:04", 56700);

        registry.on_datagram(&datagram, FROM.parse().unwrap()).unwrap();
        let event = registry.on_datagram(&datagram, FROM.parse().unwrap()).unwrap();

        assert!(matches!(event, Some(DiscoveryEvent::Rediscovered(_))));
        assert_eq!(connector.connect_count(), 1);

        registry
            .on_datagram(&datagram, "192.168.1.99:56700".parse().unwrap())
            .unwrap();
        assert_eq!(registry.len(), 1);
        assert_eq!(connector.connect_count(), 2);
        assert_eq!(connector.last().remote(), "192.168.1.99:56700".parse().unwrap());
    }

    #[tokio::test]
    async fn test_ipv6_prefix_remaps_address() {
        let connector = RecordingConnector::new();
        let config = config().with_ipv6_prefix("fe80:0000:0000:0000");
        let mut registry = registry(&config, &connector);

        registry
            .on_datagram(&service("01:23:45:67:89:ab", 56700), FROM.parse().unwrap())
            .unwrap();

        assert_eq!(
            connector.last().remote(),
            "[fe80::323:45ff:fe67:89ab]:56700".parse().unwrap()
        );
    }

    #[tokio::test]
    async fn test_invalid_ipv6_prefix_is_an_error() {
        let connector = RecordingConnector::new();
        let config = config().with_ipv6_prefix("fd00:1234");
        let mut registry = registry(&config, &connector);

        assert!(registry
            .on_datagram(&service("01:23:45:67:89:ab", 56700), FROM.parse().unwrap())
            .is_err());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_probe_countdown() {
        let connector = RecordingConnector::new();
        let mut registry = registry(&config(), &connector);

        let probes: Vec<bool> = (0..9).map(|_| registry.on_wake().probe).collect();
        assert_eq!(
            probes,
            [true, false, false, false, true, false, false, false, true]
        );

        registry.request_probe();
        assert!(registry.on_wake().probe);
    }

    #[tokio::test]
    async fn test_sweep_drops_dead_sessions_only() {
        let connector = RecordingConnector::new();
        let mut registry = registry(&config(), &connector);
        let from = FROM.parse().unwrap();

        registry.on_datagram(&service("d0:73:d5:00:00:0b", 56700), from).unwrap();
        registry.on_datagram(&service("d0:73:d5:00:00:0a", 56700), from).unwrap();

        let dead = connector.transports()[0].clone();
        dead.kill();

        let outcome = registry.on_wake();
        assert_eq!(outcome.dropped, vec!["d0:73:d5:00:00:0b".parse().unwrap()]);
        assert_eq!(registry.len(), 1);
        assert!(registry.get(&"d0:73:d5:00:00:0a".parse().unwrap()).is_some());

        assert!(registry.on_wake().dropped.is_empty());
    }

    #[tokio::test]
    async fn test_snapshot_sorted_by_mac() {
        let connector = RecordingConnector::new();
        let mut registry = registry(&config(), &connector);
        let from = FROM.parse().unwrap();

        for mac in ["d0:73:d5:00:00:03", "d0:73:d5:00:00:01", "d0:73:d5:00:00:02"] {
            registry.on_datagram(&service(mac, 56700), from).unwrap();
        }

        let macs: Vec<String> = registry
            .snapshot()
            .iter()
            .map(|session| session.mac().to_string())
            .collect();
        assert_eq!(
            macs,
            ["d0:73:d5:00:00:01", "d0:73:d5:00:00:02", "d0:73:d5:00:00:03"]
        );
    }

    #[tokio::test]
    async fn test_discovery_loop_end_to_end() {
        let device = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let config = config()
            .with_bind_port(0)
            .with_broadcast_addr(device.local_addr().unwrap());

        let mut discovery = Discovery::new(config).with_connector(RecordingConnector::new());
        assert_eq!(discovery.state(), DiscoveryState::Idle);

        discovery.start().await.unwrap();
        let port = discovery.local_addr().unwrap().port();

        // The first wake probes immediately.
        let mut buf = [0u8; 128];
        let (len, _) = time::timeout(Duration::from_secs(2), device.recv_from(&mut buf))
            .await
            .unwrap()
            .unwrap();
        let probe = LanCodec.decode(&buf[..len]).unwrap();
        assert_eq!(probe.payload, Payload::GetService);
        assert!(probe.target.is_broadcast());
        assert_eq!(discovery.state(), DiscoveryState::Running);

        device
            .send_to(&service("d0:73:d5:00:00:09", 56700), ("127.0.0.1", port))
            .await
            .unwrap();
        time::timeout(Duration::from_secs(2), discovery.changed())
            .await
            .unwrap();

        let devices = discovery.devices();
        assert_eq!(devices.len(), 1);
        assert_eq!(devices.iter().next().unwrap().mac().to_string(), "d0:73:d5:00:00:09");

        discovery.stop().await;
        assert_eq!(discovery.state(), DiscoveryState::Stopped);
        assert!(discovery.devices().is_empty());
    }

    async fn recv_probe(device: &UdpSocket) -> (Message, SocketAddr) {
        let mut buf = [0u8; 128];
        let (len, from) = time::timeout(Duration::from_secs(2), device.recv_from(&mut buf))
            .await
            .unwrap()
            .unwrap();
        (LanCodec.decode(&buf[..len]).unwrap(), from)
    }

    #[tokio::test]
    async fn test_probe_now_sends_an_extra_probe() {
        let device = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let config = config()
            .with_discovery_interval(Duration::from_secs(600))
            .with_discovery_step(Duration::from_secs(300))
            .with_bind_port(0)
            .with_broadcast_addr(device.local_addr().unwrap());

        let mut discovery = Discovery::new(config).with_connector(RecordingConnector::new());
        discovery.start().await.unwrap();

        let (first, _) = recv_probe(&device).await;
        assert_eq!(first.payload, Payload::GetService);

        // The countdown would hold the next probe back for ten minutes.
        discovery.probe_now();
        let (second, _) = recv_probe(&device).await;
        assert_eq!(second.payload, Payload::GetService);
        assert!(second.res_required);

        discovery.stop().await;
    }

    #[tokio::test]
    async fn test_discover_once_returns_answering_devices() {
        let device = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let device_port = device.local_addr().unwrap().port();
        let config = config()
            .with_bind_port(0)
            .with_broadcast_addr(device.local_addr().unwrap());

        let responder = tokio::spawn(async move {
            let (_, from) = recv_probe(&device).await;
            device
                .send_to(&service("d0:73:d5:00:00:2a", u32::from(device_port)), from)
                .await
                .unwrap();
            device
        });

        let found = Discovery::discover_once(config, Duration::from_millis(500))
            .await
            .unwrap();
        responder.await.unwrap();

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].mac.to_string(), "d0:73:d5:00:00:2a");
        assert_eq!(found[0].port, device_port);
        assert!(found[0].alive);
    }
}
