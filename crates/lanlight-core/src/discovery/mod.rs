//! UDP device discovery module.
//!
//! Provides the broadcast probe loop, the device registry it owns, and
//! MAC-derived IPv6 addressing.

pub mod address;
pub mod service;

pub use address::{mac_to_ipv6_link_local, resolve_ipv6};
pub use service::{
    create_broadcast_socket, DeviceSnapshot, Discovery, DiscoveryEvent, DiscoveryState, Registry,
};
