use crate::messages::ProbeRequest;
use crate::packet::wrap_ipv4;
use pnet::packet::ip::IpNextHeaderProtocols;
use pnet::packet::ipv4::Ipv4Packet;
use pnet::packet::Packet;
use pnet::transport::TransportChannelType::Layer3;
use pnet::transport::{ipv4_packet_iter, transport_channel, TransportReceiver, TransportSender};
use std::io;
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

const RECV_BUFFER_SIZE: usize = 65535;

// a zero receive timeout means "block forever" to the socket layer
const MIN_RECV_WAIT: Duration = Duration::from_millis(1);

/// Datagram transport used by a single probe.
pub trait Transport {
    /// Sends one ICMP message to `target`.
    fn send_to(&mut self, icmp: &[u8], target: Ipv4Addr) -> io::Result<()>;

    /// Waits at most `bound` for the next datagram and returns it whole,
    /// IPv4 header included.
    ///
    /// Returns `Ok(None)` if nothing arrived within the bound.
    fn recv_timeout(&mut self, bound: Duration) -> io::Result<Option<Vec<u8>>>;
}

/// Opens a fresh [`Transport`] configured for one request.
pub trait Connector {
    type Transport: Transport;

    fn open(&self, request: &ProbeRequest) -> io::Result<Self::Transport>;
}

/// Raw IPv4 socket bound to the ICMP protocol. Requires CAP_NET_RAW or root.
///
/// The socket is closed when the value is dropped.
pub struct RawIcmpSocket {
    transport_sender: TransportSender,
    transport_receiver: TransportReceiver,
    ttl: u8,
    dont_fragment: bool,
}

impl RawIcmpSocket {
    pub fn open(ttl: u8, dont_fragment: bool) -> io::Result<RawIcmpSocket> {
        let (transport_sender, transport_receiver) =
            transport_channel(RECV_BUFFER_SIZE, Layer3(IpNextHeaderProtocols::Icmp))?;
        Ok(RawIcmpSocket { transport_sender, transport_receiver, ttl, dont_fragment })
    }
}

impl Transport for RawIcmpSocket {
    fn send_to(&mut self, icmp: &[u8], target: Ipv4Addr) -> io::Result<()> {
        let datagram = wrap_ipv4(icmp, target, self.ttl, self.dont_fragment);
        let ip_packet = Ipv4Packet::new(&datagram)
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "malformed IPv4 datagram"))?;
        self.transport_sender.send_to(ip_packet, IpAddr::V4(target))?;
        Ok(())
    }

    fn recv_timeout(&mut self, bound: Duration) -> io::Result<Option<Vec<u8>>> {
        let mut packets = ipv4_packet_iter(&mut self.transport_receiver);
        let received = packets.next_with_timeout(bound.max(MIN_RECV_WAIT))?;
        Ok(received.map(|(ip_packet, _)| ip_packet.packet().to_vec()))
    }
}

/// Opens a [`RawIcmpSocket`] per probe.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawConnector;

impl Connector for RawConnector {
    type Transport = RawIcmpSocket;

    fn open(&self, request: &ProbeRequest) -> io::Result<RawIcmpSocket> {
        RawIcmpSocket::open(request.ttl(), request.dont_fragment())
    }
}
