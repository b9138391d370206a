//! LAN control library for UDP lighting devices.
//!
//! Discovers devices on the local broadcast domain, keeps a live registry
//! of reachable ones, and talks to each through a session that retries
//! requests until they are acknowledged or answered.

pub mod collection;
pub mod config;
pub mod device;
pub mod discovery;
pub mod error;
pub mod protocol;
pub mod types;

pub use collection::{DeviceCollection, FanOutSummary, MemberResult, MemberStatus};
pub use config::{DiscoveryConfig, SessionConfig};
pub use device::{DeviceSession, SendMode};
pub use discovery::{Discovery, DiscoveryState};
pub use error::{ConfigError, CoreError, DeviceError, ProtocolError, Result};
pub use types::{DeviceSummary, Hsbk, MacAddr, Power, Waveform, WaveformKind};
