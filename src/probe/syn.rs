//! Half-open TCP scan over a raw IPv4 socket.
//!
//! A bare SYN goes out; the first matching reply decides the port:
//! SYN+ACK is open (and gets an RST so the handshake never completes),
//! RST+ACK is closed, silence until the deadline is filtered. With an ICMP
//! listener available, an ICMP error quoting the SYN is an unknown reply
//! shape and ends the wait early.
use std::net::{IpAddr, Ipv4Addr};
use std::time::{Duration, Instant};

use log::debug;
use pnet::packet::ip::IpNextHeaderProtocols;
use pnet::packet::tcp::{self, MutableTcpPacket, TcpFlags, TcpPacket};
use pnet::transport::TransportProtocol::Ipv4;
use pnet::transport::{tcp_packet_iter, transport_channel, TransportChannelType, TransportSender};

use super::icmp::{IcmpListener, IcmpReply, QuotedHeader};
use super::{local_ipv4_for, Probe};
use crate::error::ProbeError;
use crate::types::{ProbeStatus, ScanMode};

const TCP_HEADER_LEN: usize = 20;
const CHANNEL_BUFFER: usize = 4096;
const POLL_INTERVAL: Duration = Duration::from_millis(100);
const SOURCE_PORT_BASE: u16 = 49152;
const SOURCE_PORT_SPAN: u16 = 16000;
const INITIAL_SEQUENCE: u32 = 0x1234_5678;
const WINDOW: u16 = 64_240;

/// Flags that decide the verdict; ECN and PSH bits are ignored.
const VERDICT_MASK: u8 = TcpFlags::SYN | TcpFlags::ACK | TcpFlags::RST | TcpFlags::FIN;

#[derive(Debug, Clone, Copy)]
pub struct SynProbe {
    pub timeout: Duration,
}

impl SynProbe {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for SynProbe {
    fn default() -> Self {
        Self::new(ScanMode::Syn.default_timeout())
    }
}

impl Probe for SynProbe {
    async fn probe(&self, target: Ipv4Addr, port: u16) -> ProbeStatus {
        let timeout = self.timeout;
        match tokio::task::spawn_blocking(move || syn_probe_blocking(target, port, timeout)).await
        {
            Ok(Ok(status)) => status,
            Ok(Err(e)) => {
                debug!("syn {target}:{port}: {e}");
                ProbeStatus::Error(e.to_string())
            }
            Err(e) => ProbeStatus::Error(format!("probe task failed: {e}")),
        }
    }
}

/// Map the flags of a reply to a verdict.
pub fn classify_syn_reply(flags: u8) -> ProbeStatus {
    let syn_ack = TcpFlags::SYN | TcpFlags::ACK;
    let rst_ack = TcpFlags::RST | TcpFlags::ACK;
    match flags & VERDICT_MASK {
        f if f == syn_ack => ProbeStatus::Open,
        f if f == rst_ack => ProbeStatus::Closed,
        _ => ProbeStatus::Unknown,
    }
}

/// Any ICMP error quoting our SYN is neither an accept nor a refusal.
pub fn classify_syn_icmp(reply: IcmpReply) -> ProbeStatus {
    debug!(
        "icmp type {} code {} in answer to syn",
        reply.icmp_type, reply.code
    );
    ProbeStatus::Unknown
}

/// Source port for a probe. Distinct destination ports get distinct source
/// ports within one span, so concurrent replies cannot be confused.
pub fn source_port_for(dst_port: u16) -> u16 {
    SOURCE_PORT_BASE + dst_port % SOURCE_PORT_SPAN
}

/// Build a bare TCP segment (no options) with a valid IPv4 pseudo-header checksum.
pub fn build_segment(
    src: Ipv4Addr,
    dst: Ipv4Addr,
    src_port: u16,
    dst_port: u16,
    sequence: u32,
    flags: u8,
) -> Result<[u8; TCP_HEADER_LEN], ProbeError> {
    let mut buf = [0u8; TCP_HEADER_LEN];
    {
        let mut seg =
            MutableTcpPacket::new(&mut buf[..]).ok_or(ProbeError::Packet("tcp buffer too small"))?;
        seg.set_source(src_port);
        seg.set_destination(dst_port);
        seg.set_sequence(sequence);
        seg.set_acknowledgement(0);
        seg.set_data_offset(5);
        seg.set_flags(flags);
        seg.set_window(if flags & TcpFlags::RST != 0 { 0 } else { WINDOW });
        seg.set_urgent_ptr(0);
        let checksum = tcp::ipv4_checksum(&seg.to_immutable(), &src, &dst);
        seg.set_checksum(checksum);
    }
    Ok(buf)
}

fn send_segment(tx: &mut TransportSender, segment: &[u8], dst: Ipv4Addr) -> Result<(), ProbeError> {
    let packet = TcpPacket::new(segment).ok_or(ProbeError::Packet("truncated tcp segment"))?;
    tx.send_to(packet, IpAddr::V4(dst))?;
    Ok(())
}

fn syn_probe_blocking(
    target: Ipv4Addr,
    port: u16,
    timeout: Duration,
) -> Result<ProbeStatus, ProbeError> {
    let source = local_ipv4_for(target)?;
    let (mut tx, mut rx) = transport_channel(
        CHANNEL_BUFFER,
        TransportChannelType::Layer4(Ipv4(IpNextHeaderProtocols::Tcp)),
    )?;

    let mut icmp = match IcmpListener::open() {
        Ok(l) => Some(l),
        Err(e) => {
            debug!("syn {target}:{port}: no icmp listener: {e}");
            None
        }
    };

    let src_port = source_port_for(port);
    let syn = build_segment(source, target, src_port, port, INITIAL_SEQUENCE, TcpFlags::SYN)?;
    send_segment(&mut tx, &syn, target)?;

    let deadline = Instant::now() + timeout;
    let mut replies = tcp_packet_iter(&mut rx);
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Ok(ProbeStatus::Filtered);
        }
        let mut slice = remaining.min(POLL_INTERVAL);
        if let Some(listener) = icmp.as_mut() {
            // Split the slice; the kernel queues whatever arrives on the other socket.
            slice /= 2;
            let quotes_syn = |q: &QuotedHeader| {
                q.is_for(IpNextHeaderProtocols::Tcp, target, src_port, port)
            };
            if let Some(reply) = listener.poll(slice, quotes_syn)? {
                return Ok(classify_syn_icmp(reply));
            }
        }
        let Some((reply, from)) = replies.next_with_timeout(slice)? else {
            continue;
        };
        if from != IpAddr::V4(target)
            || reply.get_source() != port
            || reply.get_destination() != src_port
        {
            continue;
        }
        let flags = reply.get_flags();
        // A reply carrying an ACK must acknowledge our SYN; anything else is stale.
        if flags & TcpFlags::ACK != 0
            && reply.get_acknowledgement() != INITIAL_SEQUENCE.wrapping_add(1)
        {
            continue;
        }

        let status = classify_syn_reply(flags);
        if status == ProbeStatus::Open {
            let rst = build_segment(
                source,
                target,
                src_port,
                port,
                INITIAL_SEQUENCE.wrapping_add(1),
                TcpFlags::RST,
            )?;
            if let Err(e) = send_segment(&mut tx, &rst, target) {
                debug!("syn {target}:{port}: reset not sent: {e}");
            }
        }
        return Ok(status);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_reply_flags() {
        assert_eq!(classify_syn_reply(TcpFlags::SYN | TcpFlags::ACK), ProbeStatus::Open);
        assert_eq!(
            classify_syn_reply(TcpFlags::SYN | TcpFlags::ACK | TcpFlags::ECE),
            ProbeStatus::Open
        );
        assert_eq!(classify_syn_reply(TcpFlags::RST | TcpFlags::ACK), ProbeStatus::Closed);
        assert_eq!(classify_syn_reply(TcpFlags::RST), ProbeStatus::Unknown);
        assert_eq!(classify_syn_reply(TcpFlags::SYN), ProbeStatus::Unknown);
        assert_eq!(classify_syn_reply(TcpFlags::FIN | TcpFlags::ACK), ProbeStatus::Unknown);
    }

    #[test]
    fn syn_segment_layout() {
        let src = Ipv4Addr::new(10, 0, 0, 1);
        let dst = Ipv4Addr::new(10, 0, 0, 2);
        let buf = build_segment(src, dst, 50000, 443, 7, TcpFlags::SYN).unwrap();
        let seg = TcpPacket::new(&buf).unwrap();
        assert_eq!(seg.get_source(), 50000);
        assert_eq!(seg.get_destination(), 443);
        assert_eq!(seg.get_sequence(), 7);
        assert_eq!(seg.get_flags(), TcpFlags::SYN);
        assert_eq!(seg.get_data_offset(), 5);
        assert_eq!(seg.get_checksum(), tcp::ipv4_checksum(&seg, &src, &dst));
        assert_ne!(seg.get_checksum(), 0);
    }

    #[test]
    fn reset_segment_has_no_window() {
        let ip = Ipv4Addr::LOCALHOST;
        let buf = build_segment(ip, ip, 50000, 22, 8, TcpFlags::RST).unwrap();
        let seg = TcpPacket::new(&buf).unwrap();
        assert_eq!(seg.get_flags(), TcpFlags::RST);
        assert_eq!(seg.get_window(), 0);
    }

    #[test]
    fn icmp_answer_is_unknown() {
        use crate::probe::icmp::{self, parse_quoted, tests::quoting_payload};

        for (icmp_type, code) in [(3, 13), (3, 1), (11, 0)] {
            let reply = IcmpReply { icmp_type, code };
            assert_eq!(classify_syn_icmp(reply), ProbeStatus::Unknown);
        }
        assert!(icmp::quotes_original(icmp::DEST_UNREACHABLE));

        let target = Ipv4Addr::new(192, 0, 2, 7);
        let src_port = source_port_for(443);
        let payload = quoting_payload(IpNextHeaderProtocols::Tcp, target, src_port, 443);
        let quoted = parse_quoted(&payload).unwrap();
        assert!(quoted.is_for(IpNextHeaderProtocols::Tcp, target, src_port, 443));
        assert!(!quoted.is_for(IpNextHeaderProtocols::Tcp, target, src_port, 80));
    }

    #[test]
    fn source_ports_stay_ephemeral() {
        for p in [0u16, 1, 15999, 16000, 65535] {
            let s = source_port_for(p);
            assert!(s >= SOURCE_PORT_BASE, "{p} -> {s}");
        }
        assert_ne!(source_port_for(80), source_port_for(81));
    }
}
