//! ICMP errors that quote one of our own datagrams or segments.
//!
//! An ICMP error carries the IPv4 header of the packet that provoked it plus
//! the first 8 bytes of its payload, which is enough to recover the ports.
use std::io;
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use pnet::packet::ip::{IpNextHeaderProtocol, IpNextHeaderProtocols};
use pnet::packet::ipv4::Ipv4Packet;
use pnet::packet::Packet;
use pnet::transport::TransportProtocol::Ipv4;
use pnet::transport::{icmp_packet_iter, transport_channel, TransportChannelType, TransportReceiver};

pub const DEST_UNREACHABLE: u8 = 3;
pub const SOURCE_QUENCH: u8 = 4;
pub const REDIRECT: u8 = 5;
pub const TIME_EXCEEDED: u8 = 11;
pub const PARAMETER_PROBLEM: u8 = 12;

const CHANNEL_BUFFER: usize = 4096;
/// Bytes between the ICMP checksum and the quoted IPv4 header.
const REST_OF_HEADER: usize = 4;

/// Type and code of an ICMP message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IcmpReply {
    pub icmp_type: u8,
    pub code: u8,
}

/// The offending packet as quoted inside an ICMP error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotedHeader {
    pub destination: Ipv4Addr,
    pub protocol: IpNextHeaderProtocol,
    pub source_port: u16,
    pub destination_port: u16,
}

impl QuotedHeader {
    /// Whether this quotes a packet we sent from `local_port` to `target:port`.
    pub fn is_for(
        &self,
        protocol: IpNextHeaderProtocol,
        target: Ipv4Addr,
        local_port: u16,
        port: u16,
    ) -> bool {
        self.protocol == protocol
            && self.destination == target
            && self.source_port == local_port
            && self.destination_port == port
    }
}

/// Message types that quote the packet they answer.
pub fn quotes_original(icmp_type: u8) -> bool {
    matches!(
        icmp_type,
        DEST_UNREACHABLE | SOURCE_QUENCH | REDIRECT | TIME_EXCEEDED | PARAMETER_PROBLEM
    )
}

/// Parse the quoted IPv4 header and transport ports out of an ICMP payload
/// (everything after the type, code and checksum fields).
pub fn parse_quoted(icmp_payload: &[u8]) -> Option<QuotedHeader> {
    let quoted = icmp_payload.get(REST_OF_HEADER..)?;
    let ip = Ipv4Packet::new(quoted)?;
    let ihl = usize::from(ip.get_header_length()) * 4;
    let ports = quoted.get(ihl..ihl + 4)?;
    Some(QuotedHeader {
        destination: ip.get_destination(),
        protocol: ip.get_next_level_protocol(),
        source_port: u16::from_be_bytes([ports[0], ports[1]]),
        destination_port: u16::from_be_bytes([ports[2], ports[3]]),
    })
}

/// Raw IPv4 ICMP receiver. Needs the same privilege as any raw socket.
pub struct IcmpListener {
    rx: TransportReceiver,
}

impl IcmpListener {
    pub fn open() -> io::Result<Self> {
        let (_tx, rx) = transport_channel(
            CHANNEL_BUFFER,
            TransportChannelType::Layer4(Ipv4(IpNextHeaderProtocols::Icmp)),
        )?;
        Ok(Self { rx })
    }

    /// Wait up to `wait` for one ICMP error matching `wanted`.
    pub fn poll(
        &mut self,
        wait: Duration,
        wanted: impl Fn(&QuotedHeader) -> bool,
    ) -> io::Result<Option<IcmpReply>> {
        let deadline = Instant::now() + wait;
        let mut iter = icmp_packet_iter(&mut self.rx);
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(None);
            }
            let Some((packet, _from)) = iter.next_with_timeout(remaining)? else {
                return Ok(None);
            };
            let icmp_type = packet.get_icmp_type().0;
            if !quotes_original(icmp_type) {
                continue;
            }
            if parse_quoted(packet.payload()).is_some_and(|q| wanted(&q)) {
                return Ok(Some(IcmpReply {
                    icmp_type,
                    code: packet.get_icmp_code().0,
                }));
            }
        }
    }

    /// Poll until `deadline` or until `done` is raised by the caller.
    pub fn wait_until(
        mut self,
        deadline: Instant,
        done: &AtomicBool,
        poll_interval: Duration,
        wanted: impl Fn(&QuotedHeader) -> bool,
    ) -> io::Result<Option<IcmpReply>> {
        while !done.load(Ordering::Relaxed) {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            if let Some(reply) = self.poll(remaining.min(poll_interval), &wanted)? {
                return Ok(Some(reply));
            }
        }
        Ok(None)
    }
}
