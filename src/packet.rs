use pnet::packet::icmp::echo_request::MutableEchoRequestPacket;
use pnet::packet::icmp::{IcmpCode, IcmpTypes};
use pnet::packet::ip::IpNextHeaderProtocols;
use pnet::packet::ipv4::{self, Ipv4Flags, MutableIpv4Packet};
use pnet::packet::{MutablePacket, Packet};
use rand::Rng;
use std::net::Ipv4Addr;

pub const IPV4_HEADER_LEN: usize = 20;
pub const ICMP_HEADER_LEN: usize = 8;

pub const ICMP_ECHO_REPLY: u8 = 0;
pub const ICMP_ECHO_REQUEST: u8 = 8;
pub const ICMP_TIME_EXCEEDED: u8 = 11;

/// Largest payload that still fits a single IPv4 datagram.
pub const MAX_PAYLOAD_LEN: usize = u16::MAX as usize - IPV4_HEADER_LEN - ICMP_HEADER_LEN;

const FILLER: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Builds an ICMP Echo Request (type 8, code 0) carrying `payload`, with the
/// checksum computed over header and payload.
pub fn encode(identifier: u16, sequence: u16, payload: &[u8]) -> Vec<u8> {
    let mut buf = vec![0u8; ICMP_HEADER_LEN + payload.len()];

    // the buffer always holds at least the 8-byte header
    if let Some(mut echo_packet) = MutableEchoRequestPacket::new(&mut buf) {
        echo_packet.set_icmp_type(IcmpTypes::EchoRequest);
        echo_packet.set_icmp_code(IcmpCode::new(0));
        echo_packet.set_checksum(0);
        echo_packet.set_identifier(identifier);
        echo_packet.set_sequence_number(sequence);
        echo_packet.set_payload(payload);

        let echo_checksum = checksum(echo_packet.packet());
        echo_packet.set_checksum(echo_checksum);
    }
    buf
}

/// RFC 1071 internet checksum. An odd trailing byte is treated as if
/// followed by a zero byte.
pub fn checksum(bytes: &[u8]) -> u16 {
    !ones_complement_sum(bytes)
}

/// Folded 16-bit one's-complement sum of `bytes` taken as network order words.
/// A message carrying a correct checksum sums to `0xFFFF`.
pub fn ones_complement_sum(bytes: &[u8]) -> u16 {
    let mut sum: u64 = 0;
    let mut words = bytes.chunks_exact(2);
    for word in &mut words {
        sum += u64::from(u16::from_be_bytes([word[0], word[1]]));
    }
    if let [last] = words.remainder() {
        sum += u64::from(u16::from_be_bytes([*last, 0]));
    }
    while sum > 0xFFFF {
        sum = (sum >> 16) + (sum & 0xFFFF);
    }
    sum as u16
}

/// `size` bytes of random ASCII letters.
pub fn filler_payload(size: usize) -> Vec<u8> {
    let mut rng = rand::rng();
    (0..size)
        .map(|_| FILLER[rng.random_range(0..FILLER.len())])
        .collect()
}

/// Wraps an ICMP message in a 20-byte IPv4 header so TTL and the
/// don't-fragment bit travel with the packet. The source is left
/// unspecified for the kernel to fill in.
pub fn wrap_ipv4(icmp: &[u8], destination: Ipv4Addr, ttl: u8, dont_fragment: bool) -> Vec<u8> {
    let total_length = IPV4_HEADER_LEN + icmp.len();
    let mut buf = vec![0u8; total_length];

    if let Some(mut ip_packet) = MutableIpv4Packet::new(&mut buf) {
        ip_packet.set_version(4);
        ip_packet.set_header_length((IPV4_HEADER_LEN / 4) as u8);
        ip_packet.set_total_length(total_length as u16);
        ip_packet.set_identification(rand::random::<u16>());
        ip_packet.set_flags(if dont_fragment { Ipv4Flags::DontFragment } else { 0 });
        ip_packet.set_ttl(ttl);
        ip_packet.set_next_level_protocol(IpNextHeaderProtocols::Icmp);
        ip_packet.set_source(Ipv4Addr::UNSPECIFIED);
        ip_packet.set_destination(destination);
        ip_packet.payload_mut().copy_from_slice(icmp);

        let ip_checksum = ipv4::checksum(&ip_packet.to_immutable());
        ip_packet.set_checksum(ip_checksum);
    }
    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_layout_is_network_order() {
        let bytes = encode(0x1234, 0xABCD, b"hi");
        assert_eq!(bytes.len(), 10);
        assert_eq!(bytes[0], ICMP_ECHO_REQUEST);
        assert_eq!(bytes[1], 0);
        assert_eq!(&bytes[4..6], &[0x12, 0x34]);
        assert_eq!(&bytes[6..8], &[0xAB, 0xCD]);
        assert_eq!(&bytes[8..], b"hi");
    }

    #[test]
    fn known_checksum_value() {
        // type 8, code 0, id 1, seq 1, no payload
        let bytes = encode(1, 1, &[]);
        assert_eq!(u16::from_be_bytes([bytes[2], bytes[3]]), 0xF7FD);
    }

    #[test]
    fn encoded_messages_sum_to_all_ones() {
        for size in 0..=64 {
            let payload = filler_payload(size);
            let bytes = encode(rand::random(), rand::random(), &payload);
            assert_eq!(ones_complement_sum(&bytes), 0xFFFF, "payload size {}", size);
        }
    }

    #[test]
    fn odd_length_padding_is_logical() {
        for size in (1..=63).step_by(2) {
            let data = filler_payload(size);
            let mut padded = data.clone();
            padded.push(0);
            assert_eq!(checksum(&data), checksum(&padded));
            assert_eq!(data.len(), size);
        }
    }

    #[test]
    fn carries_are_folded() {
        assert_eq!(checksum(&[0xFF, 0xFF, 0xFF, 0xFF]), 0x0000);
        assert_eq!(checksum(&[0xFF, 0xFF, 0x00, 0x01]), 0xFFFE);
        assert_eq!(checksum(&[]), 0xFFFF);
    }

    #[test]
    fn agrees_with_pnet_checksum() {
        let bytes = encode(0xBEEF, 7, &filler_payload(33));
        let mut zeroed = bytes.clone();
        zeroed[2] = 0;
        zeroed[3] = 0;
        assert_eq!(checksum(&zeroed), pnet::packet::util::checksum(&bytes, 1));
    }

    #[test]
    fn filler_is_ascii_letters() {
        let payload = filler_payload(200);
        assert_eq!(payload.len(), 200);
        assert!(payload.iter().all(u8::is_ascii_alphabetic));
    }

    #[test]
    fn ipv4_wrapper_carries_ttl_and_df() {
        let icmp = encode(1, 2, b"abc");
        let target = Ipv4Addr::new(10, 1, 2, 3);

        let datagram = wrap_ipv4(&icmp, target, 7, true);
        assert_eq!(datagram.len(), IPV4_HEADER_LEN + icmp.len());
        assert_eq!(datagram[0], 0x45);
        assert_eq!(datagram[6] & 0x40, 0x40);
        assert_eq!(datagram[8], 7);
        assert_eq!(datagram[9], 1);
        assert_eq!(&datagram[16..20], &target.octets());
        assert_eq!(&datagram[IPV4_HEADER_LEN..], &icmp[..]);

        let datagram = wrap_ipv4(&icmp, target, 64, false);
        assert_eq!(datagram[6] & 0x40, 0);
    }
}
