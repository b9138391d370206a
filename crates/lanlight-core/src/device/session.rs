//! Per-device request/response engine.
//!
//! A [`DeviceSession`] owns one transport to one device and a
//! [`RequestTracker`] correlating replies with callers. Requests are
//! retransmitted byte-for-byte at a fixed interval until answered or out
//! of attempts.

use std::fmt;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use tokio::time;
use tracing::{debug, error, info, trace};

use super::attributes::{FirmwareInfo, ProductInfo};
use super::tracker::{Correlation, RequestTracker, Ticket};
use super::transport::{Connector, InboundHandler, Transport};
use crate::config::SessionConfig;
use crate::error::{DeviceError, Result};
use crate::protocol::{Codec, Message, MessageKind, Payload};
use crate::types::{DeviceSummary, Hsbk, MacAddr, Power};

/// Everything a session knows about its device, without any I/O handles.
#[derive(Debug, Clone)]
pub struct SessionState {
    pub addr: SocketAddr,
    pub label: Option<String>,
    pub location: Option<String>,
    pub group: Option<String>,
    pub power: Option<Power>,
    pub color: Option<Hsbk>,
    /// Infrared brightness in percent.
    pub infrared: Option<u8>,
    pub color_zones: Vec<Hsbk>,
    pub host_firmware: Option<FirmwareInfo>,
    pub wifi_firmware: Option<FirmwareInfo>,
    pub product: Option<ProductInfo>,
}

impl SessionState {
    fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            label: None,
            location: None,
            group: None,
            power: None,
            color: None,
            infrared: None,
            color_zones: Vec::new(),
            host_firmware: None,
            wifi_firmware: None,
            product: None,
        }
    }
}

/// A live connection to one device.
pub struct DeviceSession {
    mac: MacAddr,
    state: Mutex<SessionState>,
    transport: Mutex<Option<Arc<dyn Transport>>>,
    tracker: RequestTracker,
    codec: Arc<dyn Codec>,
    connector: Arc<dyn Connector>,
    config: SessionConfig,
}

impl DeviceSession {
    /// Create a session for `mac` at `addr`. No transport is opened until
    /// [`renew`](Self::renew) is called.
    pub fn new(
        mac: MacAddr,
        addr: SocketAddr,
        codec: Arc<dyn Codec>,
        connector: Arc<dyn Connector>,
        config: SessionConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            mac,
            state: Mutex::new(SessionState::new(addr)),
            transport: Mutex::new(None),
            tracker: RequestTracker::new(rand::random::<u32>()),
            codec,
            connector,
            config,
        })
    }

    pub fn mac(&self) -> MacAddr {
        self.mac
    }

    pub fn address(&self) -> SocketAddr {
        self.lock_state().addr
    }

    pub fn source_id(&self) -> u32 {
        self.tracker.source_id()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Copy of the cached device state.
    pub fn snapshot(&self) -> SessionState {
        self.lock_state().clone()
    }

    pub(crate) fn update_state(&self, update: impl FnOnce(&mut SessionState)) {
        update(&mut self.lock_state());
    }

    pub(crate) fn read_state<T>(&self, read: impl FnOnce(&SessionState) -> T) -> T {
        read(&self.lock_state())
    }

    fn lock_state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_transport(&self) -> MutexGuard<'_, Option<Arc<dyn Transport>>> {
        self.transport.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn current_transport(&self) -> Option<Arc<dyn Transport>> {
        self.lock_transport().clone()
    }

    /// Point the session at `addr` and make sure a transport is open.
    ///
    /// Calling this again with the same address while the transport is
    /// alive does nothing. A different address tears the session down
    /// first, failing every outstanding request.
    pub fn renew(self: &Arc<Self>, addr: SocketAddr) -> Result<()> {
        let previous = {
            let mut state = self.lock_state();
            std::mem::replace(&mut state.addr, addr)
        };

        if previous != addr {
            info!(mac = %self.mac, from = %previous, to = %addr, "Device address changed");
            self.teardown();
        }

        let established = {
            let mut slot = self.lock_transport();
            match slot.as_ref() {
                Some(transport) if transport.is_alive() => false,
                _ => {
                    if let Some(dead) = slot.take() {
                        dead.close();
                    }
                    *slot = Some(self.connector.connect(addr, self.inbound_handler())?);
                    true
                }
            }
        };

        if established {
            debug!(mac = %self.mac, %addr, "Transport established");
            if self.config.refresh_metadata {
                let session = Arc::clone(self);
                tokio::spawn(async move {
                    if let Err(e) = session.get_metadata().await {
                        debug!(mac = %session.mac, error = %e, "Metadata refresh failed");
                    }
                });
            }
        }

        Ok(())
    }

    fn inbound_handler(self: &Arc<Self>) -> InboundHandler {
        let session: Weak<Self> = Arc::downgrade(self);
        Arc::new(move |datagram: &[u8]| {
            if let Some(session) = session.upgrade() {
                session.on_datagram_received(datagram);
            }
        })
    }

    /// Close the transport and abandon every outstanding request. Waiting
    /// callers fail immediately.
    pub fn teardown(&self) {
        self.close_transport();
        let abandoned = self.tracker.abandon_all();
        if abandoned > 0 {
            debug!(mac = %self.mac, abandoned, "Abandoned outstanding requests");
        }
    }

    /// Close the transport only; outstanding requests keep waiting.
    fn close_transport(&self) {
        if let Some(transport) = self.lock_transport().take() {
            transport.close();
        }
    }

    /// A transport is present and reports alive.
    pub fn is_alive(&self) -> bool {
        self.lock_transport()
            .as_ref()
            .is_some_and(|transport| transport.is_alive())
    }

    /// Number of requests awaiting a reply.
    pub fn outstanding(&self) -> usize {
        self.tracker.len()
    }

    fn message(&self, sequence: u8, ack_required: bool, res_required: bool, payload: Payload) -> Message {
        Message {
            target: self.mac,
            source: self.tracker.source_id(),
            sequence,
            ack_required,
            res_required,
            payload,
        }
    }

    /// Send `payload` `repeat_count` times with sequence 0 and no reply
    /// expected, pausing between sends. A count of zero sends nothing.
    pub async fn send_fire_and_forget(&self, payload: Payload, repeat_count: u32) -> Result<()> {
        let transport = self
            .current_transport()
            .ok_or(DeviceError::NotConnected { mac: self.mac })?;
        let datagram = self.codec.encode(&self.message(0, false, false, payload));

        for i in 0..repeat_count {
            if i > 0 {
                time::sleep(self.config.pacing).await;
            }
            transport.send(&datagram).await?;
        }
        Ok(())
    }

    /// Send with ack requested and wait for the `Acknowledgement`.
    pub async fn send_with_ack(
        &self,
        payload: Payload,
        timeout: Duration,
        max_attempts: u32,
    ) -> Result<Message> {
        self.exchange(payload, true, false, MessageKind::Acknowledgement, timeout, max_attempts)
            .await
    }

    /// Send with response requested and wait for a `response_kind` reply.
    pub async fn send_with_response(
        &self,
        payload: Payload,
        response_kind: MessageKind,
        timeout: Duration,
        max_attempts: u32,
    ) -> Result<Message> {
        self.exchange(payload, false, true, response_kind, timeout, max_attempts)
            .await
    }

    /// Send with both flags set; completes on the `response_kind` reply.
    pub async fn send_with_ack_and_response(
        &self,
        payload: Payload,
        response_kind: MessageKind,
        timeout: Duration,
        max_attempts: u32,
    ) -> Result<Message> {
        self.exchange(payload, true, true, response_kind, timeout, max_attempts)
            .await
    }

    /// [`send_with_ack`](Self::send_with_ack) with the configured timeout and attempts.
    pub async fn request_ack(&self, payload: Payload) -> Result<Message> {
        self.send_with_ack(payload, self.config.timeout, self.config.max_attempts)
            .await
    }

    /// [`send_with_response`](Self::send_with_response) with the configured timeout and attempts.
    pub async fn request(&self, payload: Payload, response_kind: MessageKind) -> Result<Message> {
        self.send_with_response(
            payload,
            response_kind,
            self.config.timeout,
            self.config.max_attempts,
        )
        .await
    }

    async fn exchange(
        &self,
        payload: Payload,
        ack_required: bool,
        res_required: bool,
        expected: MessageKind,
        timeout: Duration,
        max_attempts: u32,
    ) -> Result<Message> {
        if self.current_transport().is_none() {
            return Err(DeviceError::NotConnected { mac: self.mac }.into());
        }

        let (ticket, mut reply) = self
            .tracker
            .register(expected)
            .ok_or(DeviceError::SequenceExhausted { mac: self.mac })?;
        // Releases the sequence however this call ends, including when the
        // caller drops the future mid-wait.
        let _pending = PendingGuard {
            tracker: &self.tracker,
            ticket,
        };
        let kind = payload.kind();
        let datagram = self
            .codec
            .encode(&self.message(ticket.sequence, ack_required, res_required, payload));

        let max_attempts = max_attempts.max(1);
        for attempt in 1..=max_attempts {
            // Re-read every attempt: a renew at the same address may have
            // replaced a transport closed by another call's failure.
            match self.current_transport() {
                Some(transport) => {
                    if let Err(e) = transport.send(&datagram).await {
                        debug!(mac = %self.mac, seq = ticket.sequence, error = %e, "Send failed");
                    }
                }
                None => trace!(mac = %self.mac, seq = ticket.sequence, "No transport, waiting only"),
            }

            match time::timeout(timeout, &mut reply).await {
                Ok(Ok(message)) => return Ok(message),
                Ok(Err(_)) => {
                    debug!(mac = %self.mac, seq = ticket.sequence, "Request abandoned");
                    return Err(DeviceError::Unreachable {
                        mac: self.mac,
                        attempts: attempt,
                    }
                    .into());
                }
                Err(_) if attempt < max_attempts => {
                    debug!(
                        mac = %self.mac,
                        seq = ticket.sequence,
                        ?kind,
                        attempt,
                        "No reply, retransmitting"
                    );
                }
                Err(_) => {}
            }
        }

        self.close_transport();
        error!(
            mac = %self.mac,
            ?kind,
            attempts = max_attempts,
            "Device unreachable, closing transport"
        );
        Err(DeviceError::Unreachable {
            mac: self.mac,
            attempts: max_attempts,
        }
        .into())
    }

    /// Decode an inbound datagram and release the caller waiting on it.
    /// Anything that does not match an outstanding request is discarded.
    pub fn on_datagram_received(&self, datagram: &[u8]) {
        let message = match self.codec.decode(datagram) {
            Ok(message) => message,
            Err(e) => {
                trace!(mac = %self.mac, error = %e, "Discarding undecodable datagram");
                return;
            }
        };

        let sequence = message.sequence;
        let kind = message.kind();
        match self.tracker.resolve(message) {
            Correlation::Accepted => trace!(mac = %self.mac, seq = sequence, ?kind, "Reply matched"),
            Correlation::Unsolicited => {
                trace!(mac = %self.mac, seq = sequence, ?kind, "Discarding unsolicited message")
            }
            Correlation::Mismatch(e) => debug!(mac = %self.mac, error = %e, "Discarding reply"),
        }
    }

    /// Serializable view of the cached state.
    pub fn summary(&self) -> DeviceSummary {
        let alive = self.is_alive();
        let state = self.lock_state();
        DeviceSummary {
            mac: self.mac,
            ip: state.addr.ip(),
            port: state.addr.port(),
            alive,
            label: state.label.clone(),
            group: state.group.clone(),
            location: state.location.clone(),
            power: state.power,
            color: state.color,
            host_firmware: state.host_firmware.map(|fw| fw.to_string()),
            wifi_firmware: state.wifi_firmware.map(|fw| fw.to_string()),
            vendor: state.product.map(|p| p.vendor),
            product: state.product.map(|p| p.product),
            version: state.product.map(|p| p.version),
        }
    }
}

/// Cancels its ticket on drop. A ticket already resolved or abandoned is
/// left alone by the tracker's generation check.
struct PendingGuard<'a> {
    tracker: &'a RequestTracker,
    ticket: Ticket,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.tracker.cancel(self.ticket);
    }
}

impl fmt::Display for DeviceSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.lock_state().label {
            Some(label) => write!(f, "{} ({})", label, self.mac),
            None => write!(f, "unlabeled ({})", self.mac),
        }
    }
}

impl fmt::Debug for DeviceSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceSession")
            .field("mac", &self.mac)
            .field("addr", &self.address())
            .field("alive", &self.is_alive())
            .finish()
    }
}

impl Drop for DeviceSession {
    fn drop(&mut self) {
        if let Some(transport) = self
            .transport
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            transport.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::testing::{reply_to, RecordingConnector};
    use crate::error::CoreError;
    use crate::protocol::LanCodec;
    use tokio::time::Instant;

    const TIMEOUT: Duration = Duration::from_millis(500);

    fn mac() -> MacAddr {
        "d0:73:d5:01:02:03".parse().unwrap()
    }

    fn addr(ip: &str) -> SocketAddr {
        format!("{}:56700", ip).parse().unwrap()
    }

    fn quiet_config() -> SessionConfig {
        SessionConfig::default().with_refresh_metadata(false)
    }

    fn session(connector: &Arc<RecordingConnector>) -> Arc<DeviceSession> {
        let session = DeviceSession::new(
            mac(),
            addr("192.168.1.10"),
            Arc::new(LanCodec),
            connector.clone(),
            quiet_config(),
        );
        session.renew(addr("192.168.1.10")).unwrap();
        session
    }

    fn assert_unreachable(result: Result<Message>) {
        match result {
            Err(CoreError::Device(DeviceError::Unreachable { .. })) => {}
            other => panic!("expected Unreachable, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_requests_fail_fast_without_transport() {
        let connector = RecordingConnector::new();
        let session = DeviceSession::new(
            mac(),
            addr("192.168.1.10"),
            Arc::new(LanCodec),
            connector.clone(),
            quiet_config(),
        );

        let result = session.request_ack(Payload::GetPower).await;

        assert!(matches!(
            result,
            Err(CoreError::Device(DeviceError::NotConnected { .. }))
        ));
        assert_eq!(connector.connect_count(), 0);
        assert!(!session.is_alive());
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_exhaustion_sends_exactly_max_attempts() {
        let connector = RecordingConnector::new();
        let session = session(&connector);
        let transport = connector.last();

        let start = Instant::now();
        let result = session
            .send_with_ack(Payload::SetPower { level: 65535 }, TIMEOUT, 3)
            .await;

        assert_unreachable(result);
        let elapsed = start.elapsed();
        assert!(elapsed >= TIMEOUT * 3 && elapsed < TIMEOUT * 3 + Duration::from_millis(50));

        let sent = transport.sent();
        assert_eq!(sent.len(), 3);
        assert!(sent.windows(2).all(|pair| pair[0] == pair[1]));

        let first = &transport.sent_messages()[0];
        assert!(first.ack_required);
        assert!(!first.res_required);
        assert_ne!(first.sequence, 0);

        assert!(!session.is_alive());
        assert_eq!(session.outstanding(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_calls_after_exhaustion_fail_until_renew() {
        let connector = RecordingConnector::new();
        let session = session(&connector);

        assert_unreachable(session.send_with_ack(Payload::GetPower, TIMEOUT, 1).await);
        assert!(matches!(
            session.request_ack(Payload::GetPower).await,
            Err(CoreError::Device(DeviceError::NotConnected { .. }))
        ));

        session.renew(addr("192.168.1.10")).unwrap();
        assert!(session.is_alive());
        assert_eq!(connector.connect_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reply_on_second_attempt() {
        let connector = RecordingConnector::new();
        let session = session(&connector);
        let transport = connector.last();

        let call = {
            let session = Arc::clone(&session);
            tokio::spawn(async move {
                session
                    .send_with_response(Payload::GetLabel, MessageKind::StateLabel, TIMEOUT, 3)
                    .await
            })
        };

        time::sleep(TIMEOUT + Duration::from_millis(100)).await;
        assert_eq!(transport.sent().len(), 2);
        transport.reply_to_last(Payload::StateLabel {
            label: "Kitchen".to_string(),
        });

        let reply = call.await.unwrap().unwrap();
        assert_eq!(
            reply.payload,
            Payload::StateLabel {
                label: "Kitchen".to_string()
            }
        );
        assert_eq!(transport.sent().len(), 2);
        assert!(session.is_alive());
    }

    #[tokio::test(start_paused = true)]
    async fn test_mismatched_replies_leave_caller_pending() {
        let connector = RecordingConnector::new();
        let session = session(&connector);
        let transport = connector.last();

        let call = {
            let session = Arc::clone(&session);
            tokio::spawn(async move {
                session
                    .send_with_response(Payload::GetLabel, MessageKind::StateLabel, TIMEOUT, 2)
                    .await
            })
        };
        tokio::task::yield_now().await;

        let request = transport.sent_messages().pop().unwrap();
        let good = reply_to(
            &request,
            Payload::StateLabel {
                label: "Desk".to_string(),
            },
        );

        let mut wrong_sequence = good.clone();
        wrong_sequence.sequence = request.sequence.wrapping_add(1);
        let mut wrong_source = good.clone();
        wrong_source.source ^= 1;
        let wrong_kind = reply_to(&request, Payload::StatePower { level: 0 });

        for bad in [&wrong_sequence, &wrong_source, &wrong_kind] {
            transport.deliver_message(bad);
        }
        transport.deliver(b"garbage");

        tokio::task::yield_now().await;
        assert!(!call.is_finished());
        assert_eq!(session.outstanding(), 1);

        transport.deliver_message(&good);
        let reply = call.await.unwrap().unwrap();
        assert_eq!(reply.sequence, request.sequence);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_requests_use_distinct_sequences() {
        let connector = RecordingConnector::new();
        let session = session(&connector);
        let transport = connector.last();

        let calls: Vec<_> = (0..5)
            .map(|_| {
                let session = Arc::clone(&session);
                tokio::spawn(async move { session.request(Payload::GetPower, MessageKind::StatePower).await })
            })
            .collect();
        tokio::task::yield_now().await;

        let sent = transport.sent_messages();
        let mut sequences: Vec<u8> = sent.iter().map(|m| m.sequence).collect();
        sequences.sort_unstable();
        sequences.dedup();
        assert_eq!(sequences.len(), 5);

        for request in &sent {
            transport.deliver_message(&reply_to(request, Payload::StatePower { level: 0 }));
        }
        for call in calls {
            call.await.unwrap().unwrap();
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_renew_same_address_is_idempotent() {
        let connector = RecordingConnector::new();
        let session = session(&connector);

        let call = {
            let session = Arc::clone(&session);
            tokio::spawn(async move { session.request_ack(Payload::GetPower).await })
        };
        tokio::task::yield_now().await;

        session.renew(addr("192.168.1.10")).unwrap();
        session.renew(addr("192.168.1.10")).unwrap();

        assert_eq!(connector.connect_count(), 1);
        assert_eq!(session.outstanding(), 1);
        assert!(!call.is_finished());

        connector.last().reply_to_last(Payload::Acknowledgement);
        call.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_renew_new_address_fails_outstanding_immediately() {
        let connector = RecordingConnector::new();
        let session = session(&connector);
        let old = connector.last();

        let call = {
            let session = Arc::clone(&session);
            tokio::spawn(async move { session.send_with_ack(Payload::GetPower, TIMEOUT, 3).await })
        };
        tokio::task::yield_now().await;

        let start = Instant::now();
        session.renew(addr("192.168.1.20")).unwrap();
        assert_unreachable(call.await.unwrap());
        assert!(start.elapsed() < TIMEOUT);

        assert!(!old.is_alive());
        assert_eq!(connector.connect_count(), 2);
        assert_eq!(connector.last().remote(), addr("192.168.1.20"));
        assert_eq!(session.address(), addr("192.168.1.20"));
        assert!(session.is_alive());
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_keeps_other_calls_registered() {
        let connector = RecordingConnector::new();
        let session = session(&connector);

        let short = {
            let session = Arc::clone(&session);
            tokio::spawn(async move { session.send_with_ack(Payload::GetPower, TIMEOUT, 1).await })
        };
        let long = {
            let session = Arc::clone(&session);
            tokio::spawn(async move {
                session
                    .send_with_response(Payload::GetLabel, MessageKind::StateLabel, TIMEOUT, 4)
                    .await
            })
        };
        tokio::task::yield_now().await;

        assert_unreachable(short.await.unwrap());
        assert!(!session.is_alive());
        assert_eq!(session.outstanding(), 1);

        // Same address: the surviving call can still complete on the new transport.
        session.renew(addr("192.168.1.10")).unwrap();
        time::sleep(TIMEOUT + Duration::from_millis(100)).await;
        let request = connector
            .last()
            .sent_messages()
            .into_iter()
            .find(|m| m.kind() == MessageKind::GetLabel)
            .unwrap();
        connector.last().deliver_message(&reply_to(
            &request,
            Payload::StateLabel {
                label: "Hall".to_string(),
            },
        ));

        assert!(long.await.unwrap().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_teardown_fails_waiters() {
        let connector = RecordingConnector::new();
        let session = session(&connector);

        let call = {
            let session = Arc::clone(&session);
            tokio::spawn(async move { session.request_ack(Payload::GetPower).await })
        };
        tokio::task::yield_now().await;

        session.teardown();
        assert_unreachable(call.await.unwrap());
        assert!(!session.is_alive());
        assert_eq!(session.outstanding(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fire_and_forget_paces_repeats() {
        let connector = RecordingConnector::new();
        let session = session(&connector);
        let transport = connector.last();

        let start = Instant::now();
        session
            .send_fire_and_forget(Payload::LightSetPower { level: 0, duration: 0 }, 3)
            .await
            .unwrap();

        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(100) && elapsed < Duration::from_millis(150));
        let sent = transport.sent_messages();
        assert_eq!(sent.len(), 3);
        assert!(sent
            .iter()
            .all(|m| m.sequence == 0 && !m.ack_required && !m.res_required));
        assert_eq!(session.outstanding(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fire_and_forget_zero_repeats_sends_nothing() {
        let connector = RecordingConnector::new();
        let session = session(&connector);

        session
            .send_fire_and_forget(Payload::SetPower { level: 0 }, 0)
            .await
            .unwrap();
        assert!(connector.last().sent().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_callers_release_their_sequence() {
        let connector = RecordingConnector::new();
        let session = session(&connector);

        // More abandoned calls than there are sequence numbers.
        for _ in 0..200 {
            let call = session.send_with_ack(Payload::GetPower, TIMEOUT, 3);
            assert!(time::timeout(Duration::from_millis(10), call).await.is_err());
        }
        assert_eq!(session.outstanding(), 0);

        let call = {
            let session = Arc::clone(&session);
            tokio::spawn(async move { session.request_ack(Payload::GetPower).await })
        };
        tokio::task::yield_now().await;
        connector.last().reply_to_last(Payload::Acknowledgement);
        call.await.unwrap().unwrap();
        assert_eq!(session.outstanding(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ack_and_response_waits_for_the_response() {
        let connector = RecordingConnector::new();
        let session = session(&connector);
        let transport = connector.last();

        let call = {
            let session = Arc::clone(&session);
            tokio::spawn(async move {
                session
                    .send_with_ack_and_response(
                        Payload::SetLabel {
                            label: "Den".to_string(),
                        },
                        MessageKind::StateLabel,
                        TIMEOUT,
                        3,
                    )
                    .await
            })
        };
        tokio::task::yield_now().await;

        let request = transport.sent_messages().pop().unwrap();
        assert!(request.ack_required && request.res_required);

        // The acknowledgement alone does not complete the call.
        transport.deliver_message(&reply_to(&request, Payload::Acknowledgement));
        tokio::task::yield_now().await;
        assert!(!call.is_finished());

        transport.deliver_message(&reply_to(
            &request,
            Payload::StateLabel {
                label: "Den".to_string(),
            },
        ));
        let reply = call.await.unwrap().unwrap();
        assert_eq!(reply.kind(), MessageKind::StateLabel);
        assert_eq!(session.outstanding(), 0);
    }

    #[tokio::test]
    async fn test_udp_session_sends_every_attempt_from_the_start() {
        let peer = tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let remote = peer.local_addr().unwrap();
        let session = DeviceSession::new(
            mac(),
            remote,
            Arc::new(LanCodec),
            Arc::new(crate::device::UdpConnector),
            quiet_config(),
        );
        session.renew(remote).unwrap();

        session
            .send_fire_and_forget(Payload::SetPower { level: 65535 }, 1)
            .await
            .unwrap();

        let result = session
            .send_with_ack(Payload::GetPower, Duration::from_millis(100), 3)
            .await;
        assert_unreachable(result);

        let mut kinds = Vec::new();
        let mut buf = [0u8; 256];
        while let Ok(Ok(len)) = time::timeout(Duration::from_millis(200), peer.recv(&mut buf)).await {
            kinds.push(LanCodec.decode(&buf[..len]).unwrap().kind());
        }
        assert_eq!(
            kinds,
            vec![
                MessageKind::SetPower,
                MessageKind::GetPower,
                MessageKind::GetPower,
                MessageKind::GetPower
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_display_and_summary() {
        let connector = RecordingConnector::new();
        let session = session(&connector);
        assert_eq!(session.to_string(), "unlabeled (d0:73:d5:01:02:03)");

        session.update_state(|state| {
            state.label = Some("Porch".to_string());
            state.power = Some(Power::On);
        });
        assert_eq!(session.to_string(), "Porch (d0:73:d5:01:02:03)");

        let summary = session.summary();
        assert!(summary.alive);
        assert_eq!(summary.port, 56700);
        assert_eq!(summary.label.as_deref(), Some("Porch"));
        assert_eq!(summary.power, Some(Power::On));
    }
}
