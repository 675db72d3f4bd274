//! Conversions between dotted-quad IPv4 text and the 32-bit integers the
//! codec works with.

use std::net::Ipv4Addr;

pub fn is_valid_address(text: &str) -> bool {
    text.parse::<Ipv4Addr>().is_ok()
}

/// Returns `None` when `text` is not a dotted-quad IPv4 address.
pub fn address_to_u32(text: &str) -> Option<u32> {
    text.parse::<Ipv4Addr>().ok().map(u32::from)
}

pub fn u32_to_address(value: u32) -> String {
    Ipv4Addr::from(value).to_string()
}
