//! In-memory transport doubles for session and discovery tests.

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::transport::{Connector, InboundHandler, Transport};
use crate::protocol::{Codec, LanCodec, Message, Payload};

type Responder = Arc<dyn Fn(&Message) -> Vec<Payload> + Send + Sync>;

/// Connector handing out [`RecordingTransport`]s.
#[derive(Default)]
pub struct RecordingConnector {
    transports: Mutex<Vec<Arc<RecordingTransport>>>,
    responder: Mutex<Option<Responder>>,
}

impl RecordingConnector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Connector whose transports answer every request with the payloads
    /// `responder` returns, echoing sequence and source.
    pub fn answering(
        responder: impl Fn(&Message) -> Vec<Payload> + Send + Sync + 'static,
    ) -> Arc<Self> {
        let connector = Self::default();
        *connector.responder.lock().unwrap() = Some(Arc::new(responder));
        Arc::new(connector)
    }

    pub fn transports(&self) -> Vec<Arc<RecordingTransport>> {
        self.transports.lock().unwrap().clone()
    }

    pub fn connect_count(&self) -> usize {
        self.transports.lock().unwrap().len()
    }

    pub fn last(&self) -> Arc<RecordingTransport> {
        self.transports
            .lock()
            .unwrap()
            .last()
            .cloned()
            .expect("no transport was opened")
    }
}

impl Connector for RecordingConnector {
    fn connect(
        &self,
        remote: SocketAddr,
        inbound: InboundHandler,
    ) -> io::Result<Arc<dyn Transport>> {
        let transport = Arc::new(RecordingTransport {
            remote,
            inbound,
            sent: Mutex::new(Vec::new()),
            alive: AtomicBool::new(true),
            responder: self.responder.lock().unwrap().clone(),
        });
        self.transports.lock().unwrap().push(Arc::clone(&transport));
        Ok(transport)
    }
}

/// Transport that records outgoing datagrams and lets tests inject
/// inbound ones.
pub struct RecordingTransport {
    remote: SocketAddr,
    inbound: InboundHandler,
    sent: Mutex<Vec<Vec<u8>>>,
    alive: AtomicBool,
    responder: Option<Responder>,
}

impl RecordingTransport {
    pub fn remote(&self) -> SocketAddr {
        self.remote
    }

    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_messages(&self) -> Vec<Message> {
        self.sent()
            .iter()
            .map(|datagram| LanCodec.decode(datagram).unwrap())
            .collect()
    }

    /// Hand a datagram to the owning session as if it arrived on the wire.
    pub fn deliver(&self, datagram: &[u8]) {
        (self.inbound)(datagram);
    }

    pub fn deliver_message(&self, message: &Message) {
        self.deliver(&LanCodec.encode(message));
    }

    /// Reply to the most recently sent request with `payload`.
    pub fn reply_to_last(&self, payload: Payload) {
        let request = self.sent_messages().pop().expect("nothing was sent");
        self.deliver_message(&reply_to(&request, payload));
    }

    pub fn kill(&self) {
        self.alive.store(false, Ordering::Release);
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn send(&self, datagram: &[u8]) -> io::Result<()> {
        if !self.alive.load(Ordering::Acquire) {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "closed"));
        }
        self.sent.lock().unwrap().push(datagram.to_vec());

        if let Some(responder) = &self.responder {
            let request = LanCodec.decode(datagram).unwrap();
            for payload in responder(&request) {
                self.deliver_message(&reply_to(&request, payload));
            }
        }
        Ok(())
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    fn close(&self) {
        self.alive.store(false, Ordering::Release);
    }
}

/// Reply as a device would: same target, source and sequence.
pub fn reply_to(request: &Message, payload: Payload) -> Message {
    Message {
        target: request.target,
        source: request.source,
        sequence: request.sequence,
        ack_required: false,
        res_required: false,
        payload,
    }
}
