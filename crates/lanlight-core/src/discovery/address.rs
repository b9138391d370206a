//! MAC-derived IPv6 addressing.

use std::net::Ipv6Addr;

use crate::error::ConfigError;
use crate::types::MacAddr;

/// Build the modified-EUI-64 address of `mac` inside `prefix`.
///
/// The universal/local bit of the first octet is inverted and `ff:fe` is
/// inserted between the two halves of the address. `prefix` is used as
/// given, so it must supply the first four groups for the result to be a
/// valid IPv6 address.
pub fn mac_to_ipv6_link_local(mac: MacAddr, prefix: &str) -> String {
    let value = mac.to_u64();
    let high2 = ((value >> 32) & 0xffff) ^ 0x0200;
    let high1 = (value >> 24) & 0xff;
    let low1 = (value >> 16) & 0xff;
    let low2 = value & 0xffff;
    format!("{prefix}:{high2:04x}:{high1:02x}ff:fe{low1:02x}:{low2:04x}")
}

/// [`mac_to_ipv6_link_local`], parsed.
pub fn resolve_ipv6(mac: MacAddr, prefix: &str) -> Result<Ipv6Addr, ConfigError> {
    let formatted = mac_to_ipv6_link_local(mac, prefix);
    formatted
        .parse()
        .map_err(|_| ConfigError::InvalidIpv6Address(formatted))
}
