//! Device communication layer.
//!
//! Provides the per-device session (retrying request/response over UDP),
//! its request tracker, typed attribute access and text formatting.

pub mod attributes;
pub mod format;
pub mod session;
pub mod tracker;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use attributes::{FirmwareInfo, HostInfo, ProductInfo, SendMode, WifiInfo};
pub use format::{radio_str, time_str};
pub use session::{DeviceSession, SessionState};
pub use tracker::RequestTracker;
pub use transport::{Connector, InboundHandler, Transport, UdpConnector};
