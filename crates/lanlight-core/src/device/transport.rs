//! Datagram transport to a single device.
//!
//! Sessions never touch sockets directly; they hold an `Arc<dyn Transport>`
//! obtained from a [`Connector`], which keeps the session logic testable
//! without a network.

use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, SocketAddrV6};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

/// Receive buffer size; the largest device reply is well under this.
const RECV_BUFFER: usize = 2048;

/// Callback receiving every datagram that arrives on a transport.
pub type InboundHandler = Arc<dyn Fn(&[u8]) + Send + Sync>;

/// An open datagram channel to one remote address.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send one datagram, waiting for the socket to become writable.
    async fn send(&self, datagram: &[u8]) -> io::Result<()>;

    /// False once closed or once the receive side has failed.
    fn is_alive(&self) -> bool;

    /// Stop receiving and release the socket. Idempotent.
    fn close(&self);
}

/// Opens transports.
pub trait Connector: Send + Sync {
    fn connect(
        &self,
        remote: SocketAddr,
        inbound: InboundHandler,
    ) -> io::Result<Arc<dyn Transport>>;
}

/// Create a UDP socket bound to an ephemeral port and connected to `remote`.
pub fn create_unicast_socket(remote: SocketAddr) -> io::Result<std::net::UdpSocket> {
    let socket = Socket::new(Domain::for_address(remote), Type::DGRAM, Some(Protocol::UDP))?;

    let local: SocketAddr = match remote {
        SocketAddr::V4(_) => (Ipv4Addr::UNSPECIFIED, 0).into(),
        // Link-local targets need the scope of the interface they live on.
        SocketAddr::V6(v6) => SocketAddrV6::new(Ipv6Addr::UNSPECIFIED, 0, 0, v6.scope_id()).into(),
    };
    socket.bind(&local.into())?;
    socket.connect(&remote.into())?;
    socket.set_nonblocking(true)?;

    Ok(socket.into())
}

/// Production connector: one connected UDP socket per device, with a
/// receive task feeding the inbound handler.
///
/// Must be used from within a tokio runtime.
#[derive(Debug, Default, Clone, Copy)]
pub struct UdpConnector;

impl Connector for UdpConnector {
    fn connect(
        &self,
        remote: SocketAddr,
        inbound: InboundHandler,
    ) -> io::Result<Arc<dyn Transport>> {
        let socket = Arc::new(UdpSocket::from_std(create_unicast_socket(remote)?)?);
        debug!(%remote, "Opened device socket");

        let receiver = tokio::spawn(receive_loop(Arc::clone(&socket), remote, inbound));

        Ok(Arc::new(UdpTransport {
            socket,
            remote,
            closed: AtomicBool::new(false),
            receiver: Mutex::new(Some(receiver)),
        }))
    }
}

async fn receive_loop(socket: Arc<UdpSocket>, remote: SocketAddr, inbound: InboundHandler) {
    let mut buf = vec![0u8; RECV_BUFFER];

    loop {
        match socket.recv(&mut buf).await {
            Ok(len) => inbound(&buf[..len]),
            // ICMP port-unreachable surfaces here on connected sockets; the
            // retry logic decides when the device is gone.
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::ConnectionRefused | io::ErrorKind::ConnectionReset
                ) =>
            {
                trace!(%remote, error = %e, "Transient receive error");
            }
            Err(e) => {
                warn!(%remote, error = %e, "Device socket receive failed");
                break;
            }
        }
    }
}

struct UdpTransport {
    socket: Arc<UdpSocket>,
    remote: SocketAddr,
    closed: AtomicBool,
    receiver: Mutex<Option<JoinHandle<()>>>,
}

#[async_trait]
impl Transport for UdpTransport {
    async fn send(&self, datagram: &[u8]) -> io::Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(io::Error::new(
                io::ErrorKind::NotConnected,
                format!("transport to {} is closed", self.remote),
            ));
        }
        self.socket.send(datagram).await.map(|_| ())
    }

    fn is_alive(&self) -> bool {
        if self.closed.load(Ordering::Acquire) {
            return false;
        }
        let receiver = self.receiver.lock().unwrap_or_else(PoisonError::into_inner);
        receiver.as_ref().is_some_and(|task| !task.is_finished())
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let task = self
            .receiver
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = task {
            task.abort();
        }
        debug!(remote = %self.remote, "Closed device socket");
    }
}

impl Drop for UdpTransport {
    fn drop(&mut self) {
        self.close();
    }
}
