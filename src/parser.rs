use crate::packet::{ICMP_HEADER_LEN, ICMP_TIME_EXCEEDED, IPV4_HEADER_LEN};
use pnet::packet::icmp::echo_reply::EchoReplyPacket;
use pnet::packet::icmp::IcmpPacket;
use pnet::packet::ipv4::Ipv4Packet;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("datagram truncated: {len} bytes, need at least 28")]
    Truncated { len: usize },
}

/// One received IPv4 datagram carrying ICMP.
///
/// The outer header is assumed to be the fixed 20-byte form: `header_length`
/// and `total_length` are reported as received but never used to locate the
/// ICMP message, so datagrams with IP options are misparsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedDatagram {
    pub header_length: u8,
    pub total_length: u16,
    pub ttl: u8,
    pub source: u32,
    pub destination: u32,
    pub icmp_type: u8,
    pub icmp_code: u8,
    pub checksum: u16,
    pub identifier: u16,
    pub sequence: u16,
    /// ICMP message bytes following the 8-byte header.
    pub payload: Vec<u8>,
    /// Offending packet quoted by a time-exceeded notification.
    pub quoted: Option<QuotedPacket>,
}

/// The IPv4 + ICMP packet a router copies into a time-exceeded message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuotedPacket {
    pub destination: u32,
    /// Bytes after the quoted 20-byte IPv4 header, up to the quoted total
    /// length or the end of the message, whichever comes first.
    pub icmp: Vec<u8>,
}

pub fn decode_ip_icmp(datagram: &[u8]) -> Result<ReceivedDatagram, DecodeError> {
    let truncated = || DecodeError::Truncated { len: datagram.len() };
    if datagram.len() < IPV4_HEADER_LEN + ICMP_HEADER_LEN {
        return Err(truncated());
    }

    let ipv4 = Ipv4Packet::new(&datagram[..IPV4_HEADER_LEN]).ok_or_else(truncated)?;
    let icmp_data = &datagram[IPV4_HEADER_LEN..];
    let icmp_packet = IcmpPacket::new(icmp_data).ok_or_else(truncated)?;
    // identifier and sequence sit at the same offsets for every ICMP type
    let echo = EchoReplyPacket::new(icmp_data).ok_or_else(truncated)?;

    let icmp_type = icmp_packet.get_icmp_type().0;
    let payload = icmp_data[ICMP_HEADER_LEN..].to_vec();
    let quoted = if icmp_type == ICMP_TIME_EXCEEDED {
        parse_quoted(&payload)
    } else {
        None
    };

    Ok(ReceivedDatagram {
        header_length: ipv4.get_header_length(),
        total_length: ipv4.get_total_length(),
        ttl: ipv4.get_ttl(),
        source: u32::from(ipv4.get_source()),
        destination: u32::from(ipv4.get_destination()),
        icmp_type,
        icmp_code: icmp_packet.get_icmp_code().0,
        checksum: icmp_packet.get_checksum(),
        identifier: echo.get_identifier(),
        sequence: echo.get_sequence_number(),
        payload,
        quoted,
    })
}

fn parse_quoted(icmp_payload: &[u8]) -> Option<QuotedPacket> {
    if icmp_payload.len() < IPV4_HEADER_LEN {
        return None;
    }
    let original_ip = Ipv4Packet::new(&icmp_payload[..IPV4_HEADER_LEN])?;
    // the quote may be followed by RFC 4884 padding or extensions
    let quoted_len = usize::from(original_ip.get_total_length()).saturating_sub(IPV4_HEADER_LEN);
    let present = &icmp_payload[IPV4_HEADER_LEN..];
    Some(QuotedPacket {
        destination: u32::from(original_ip.get_destination()),
        icmp: present[..quoted_len.min(present.len())].to_vec(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::{encode, wrap_ipv4, ICMP_ECHO_REQUEST};
    use std::net::Ipv4Addr;

    #[test]
    fn rejects_short_datagrams() {
        assert_eq!(decode_ip_icmp(&[]), Err(DecodeError::Truncated { len: 0 }));
        assert_eq!(
            decode_ip_icmp(&[0x45; 27]),
            Err(DecodeError::Truncated { len: 27 })
        );
    }

    #[test]
    fn round_trip_recovers_header_fields() {
        let icmp = encode(0x4242, 0x0101, b"payload!");
        let target = Ipv4Addr::new(192, 0, 2, 9);
        let datagram = wrap_ipv4(&icmp, target, 33, false);

        let decoded = decode_ip_icmp(&datagram).unwrap();
        assert_eq!(decoded.icmp_type, ICMP_ECHO_REQUEST);
        assert_eq!(decoded.icmp_code, 0);
        assert_eq!(decoded.identifier, 0x4242);
        assert_eq!(decoded.sequence, 0x0101);
        assert_eq!(decoded.payload.len(), 8);
        assert_eq!(decoded.ttl, 33);
        assert_eq!(decoded.destination, u32::from(target));
        assert_eq!(decoded.header_length, 5);
        assert!(decoded.quoted.is_none());
    }

    #[test]
    fn time_exceeded_exposes_quoted_packet() {
        let original = encode(7, 8, b"xy");
        let target = Ipv4Addr::new(198, 51, 100, 1);
        let offending = wrap_ipv4(&original, target, 1, false);

        let mut notification = vec![ICMP_TIME_EXCEEDED, 0, 0, 0, 0, 0, 0, 0];
        notification.extend_from_slice(&offending);
        let datagram = wrap_ipv4(&notification, Ipv4Addr::new(10, 0, 0, 1), 250, false);

        let decoded = decode_ip_icmp(&datagram).unwrap();
        let quoted = decoded.quoted.unwrap();
        assert_eq!(quoted.destination, u32::from(target));
        assert_eq!(quoted.icmp, original);
    }

    #[test]
    fn padding_after_quote_is_excluded() {
        let original = encode(7, 8, b"z");
        let target = Ipv4Addr::new(198, 51, 100, 1);

        let mut notification = vec![ICMP_TIME_EXCEEDED, 0, 0, 0, 0, 0, 0, 0];
        notification.extend_from_slice(&wrap_ipv4(&original, target, 1, false));
        notification.resize(ICMP_HEADER_LEN + 128, 0);
        let datagram = wrap_ipv4(&notification, Ipv4Addr::new(10, 0, 0, 1), 250, false);

        let quoted = decode_ip_icmp(&datagram).unwrap().quoted.unwrap();
        assert_eq!(quoted.icmp, original);
    }

    #[test]
    fn truncated_quote_keeps_what_is_present() {
        let original = encode(7, 8, &[b'q'; 64]);
        let offending = wrap_ipv4(&original, Ipv4Addr::new(198, 51, 100, 1), 1, false);

        let mut notification = vec![ICMP_TIME_EXCEEDED, 0, 0, 0, 0, 0, 0, 0];
        notification.extend_from_slice(&offending[..IPV4_HEADER_LEN + 8]);
        let datagram = wrap_ipv4(&notification, Ipv4Addr::new(10, 0, 0, 1), 250, false);

        let quoted = decode_ip_icmp(&datagram).unwrap().quoted.unwrap();
        assert_eq!(quoted.icmp, &original[..8]);
    }

    #[test]
    fn short_quote_is_dropped() {
        let notification = vec![ICMP_TIME_EXCEEDED, 0, 0, 0, 0, 0, 0, 0, 0x45, 0];
        let datagram = wrap_ipv4(&notification, Ipv4Addr::new(10, 0, 0, 1), 250, false);

        let decoded = decode_ip_icmp(&datagram).unwrap();
        assert_eq!(decoded.icmp_type, ICMP_TIME_EXCEEDED);
        assert!(decoded.quoted.is_none());
    }
}
