use std::net::{IpAddr, Ipv4Addr};

/// Reverse-resolves `address`, or returns an empty string when it has no name
/// or is not an IPv4 address.
pub fn lookup_hostname(address: &str) -> String {
    match address.parse::<Ipv4Addr>() {
        Ok(ip) => dns_lookup::lookup_addr(&IpAddr::V4(ip)).unwrap_or_default(),
        Err(_) => String::new(),
    }
}
