//! IP/UDP header decoding for queued packets.
//!
//! Packets arrive from the queue as raw IP datagrams. Only unfragmented
//! UDP over IPv4, or IPv6 with UDP as the first next header, is decoded;
//! everything else is left for the caller to pass through.

use std::net::IpAddr;

use pnet::packet::ip::IpNextHeaderProtocols;
use pnet::packet::ipv4::Ipv4Packet;
use pnet::packet::ipv6::Ipv6Packet;
use pnet::packet::udp::UdpPacket;

pub const DNS_PORT: u16 = 53;

const IPV4_MIN_HEADER_LEN: usize = 20;
const IPV6_HEADER_LEN: usize = 40;
const UDP_HEADER_LEN: usize = 8;

/// A UDP datagram borrowed from a raw IP packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Datagram<'a> {
    pub source: IpAddr,
    pub destination: IpAddr,
    pub source_port: u16,
    pub destination_port: u16,
    pub payload: &'a [u8],
}

impl<'a> Datagram<'a> {
    /// Decode the IP and UDP headers of `packet`.
    ///
    /// Returns `None` for anything that is not a well-formed UDP datagram.
    /// Lengths declared in the headers are clamped to the captured bytes.
    pub fn parse(packet: &'a [u8]) -> Option<Self> {
        match packet.first()? >> 4 {
            4 => Self::parse_v4(packet),
            6 => Self::parse_v6(packet),
            _ => None,
        }
    }

    fn parse_v4(packet: &'a [u8]) -> Option<Self> {
        let ip = Ipv4Packet::new(packet)?;
        if ip.get_next_level_protocol() != IpNextHeaderProtocols::Udp {
            return None;
        }
        // Later fragments carry no UDP header.
        if ip.get_fragment_offset() != 0 {
            return None;
        }

        let header_len = usize::from(ip.get_header_length()) * 4;
        if header_len < IPV4_MIN_HEADER_LEN {
            return None;
        }
        let total_len = usize::from(ip.get_total_length()).min(packet.len());
        let segment = packet.get(header_len..total_len)?;

        Self::parse_udp(
            segment,
            IpAddr::V4(ip.get_source()),
            IpAddr::V4(ip.get_destination()),
        )
    }

    fn parse_v6(packet: &'a [u8]) -> Option<Self> {
        let ip = Ipv6Packet::new(packet)?;
        if ip.get_next_header() != IpNextHeaderProtocols::Udp {
            return None;
        }

        let end = (IPV6_HEADER_LEN + usize::from(ip.get_payload_length())).min(packet.len());
        let segment = packet.get(IPV6_HEADER_LEN..end)?;

        Self::parse_udp(
            segment,
            IpAddr::V6(ip.get_source()),
            IpAddr::V6(ip.get_destination()),
        )
    }

    fn parse_udp(segment: &'a [u8], source: IpAddr, destination: IpAddr) -> Option<Self> {
        let udp = UdpPacket::new(segment)?;
        let udp_len = usize::from(udp.get_length()).min(segment.len());
        let payload = segment.get(UDP_HEADER_LEN..udp_len)?;

        Some(Self {
            source,
            destination,
            source_port: udp.get_source(),
            destination_port: udp.get_destination(),
            payload,
        })
    }
}
