//! UDP scan with an empty datagram.
//!
//! The datagram goes out through a connected socket, so the kernel hands
//! back hard ICMP errors for it as socket errors; those are mapped back to
//! their ICMP type and code. With raw socket privileges an ICMP listener
//! runs alongside the receive and also catches the soft errors (time
//! exceeded, fragmentation needed) the socket never reports.
use std::io;
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, trace};
use pnet::packet::ip::IpNextHeaderProtocols;
use tokio::net::UdpSocket;
use tokio::time::{self, error::Elapsed};

use super::icmp::{self, IcmpListener, IcmpReply};
use super::Probe;
use crate::types::{ProbeStatus, ScanMode};

pub const ICMP_NET_UNREACHABLE: u8 = 0;
pub const ICMP_HOST_UNREACHABLE: u8 = 1;
pub const ICMP_PROTOCOL_UNREACHABLE: u8 = 2;
pub const ICMP_PORT_UNREACHABLE: u8 = 3;
pub const ICMP_FRAGMENTATION_NEEDED: u8 = 4;
pub const ICMP_HOST_UNKNOWN: u8 = 7;
pub const ICMP_ADMIN_PROHIBITED: u8 = 13;

const RECV_BUFFER: usize = 1500;
const ICMP_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// What came back after the datagram was sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UdpReply {
    /// Nothing before the deadline.
    Silence,
    /// A datagram from the probed port.
    Datagram,
    Icmp { icmp_type: u8, code: u8 },
}

impl From<IcmpReply> for UdpReply {
    fn from(r: IcmpReply) -> Self {
        UdpReply::Icmp {
            icmp_type: r.icmp_type,
            code: r.code,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct UdpProbe {
    pub timeout: Duration,
}

impl UdpProbe {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for UdpProbe {
    fn default() -> Self {
        Self::new(ScanMode::Udp.default_timeout())
    }
}

impl Probe for UdpProbe {
    async fn probe(&self, target: Ipv4Addr, port: u16) -> ProbeStatus {
        match exchange(target, port, self.timeout).await {
            Ok(reply) => classify_udp_reply(reply),
            Err(e) => {
                debug!("udp {target}:{port}: {e}");
                ProbeStatus::Error(e.to_string())
            }
        }
    }
}

pub fn classify_udp_reply(reply: UdpReply) -> ProbeStatus {
    match reply {
        UdpReply::Silence => ProbeStatus::OpenOrFiltered,
        UdpReply::Datagram => ProbeStatus::Open,
        UdpReply::Icmp {
            icmp_type: icmp::DEST_UNREACHABLE,
            code: ICMP_PORT_UNREACHABLE,
        } => ProbeStatus::Closed,
        UdpReply::Icmp { .. } => ProbeStatus::Filtered,
    }
}

/// Recover the ICMP message behind a socket error, if the error is one the
/// kernel raises for an incoming ICMP message.
pub fn icmp_from_error(err: &io::Error) -> Option<IcmpReply> {
    let unreachable = |code| IcmpReply {
        icmp_type: icmp::DEST_UNREACHABLE,
        code,
    };
    match err.kind() {
        // Windows reports port-unreachable as a reset.
        io::ErrorKind::ConnectionRefused | io::ErrorKind::ConnectionReset => {
            Some(unreachable(ICMP_PORT_UNREACHABLE))
        }
        io::ErrorKind::NetworkUnreachable => Some(unreachable(ICMP_NET_UNREACHABLE)),
        io::ErrorKind::HostUnreachable => Some(unreachable(ICMP_HOST_UNREACHABLE)),
        io::ErrorKind::PermissionDenied => Some(unreachable(ICMP_ADMIN_PROHIBITED)),
        _ => icmp_from_errno(err.raw_os_error()?),
    }
}

#[cfg(target_os = "linux")]
fn icmp_from_errno(errno: i32) -> Option<IcmpReply> {
    const ENONET: i32 = 64;
    const EPROTO: i32 = 71;
    const EMSGSIZE: i32 = 90;
    const ENOPROTOOPT: i32 = 92;
    const EHOSTDOWN: i32 = 112;
    let reply = |icmp_type, code| Some(IcmpReply { icmp_type, code });
    match errno {
        ENOPROTOOPT => reply(icmp::DEST_UNREACHABLE, ICMP_PROTOCOL_UNREACHABLE),
        EHOSTDOWN | ENONET => reply(icmp::DEST_UNREACHABLE, ICMP_HOST_UNKNOWN),
        EMSGSIZE => reply(icmp::DEST_UNREACHABLE, ICMP_FRAGMENTATION_NEEDED),
        EPROTO => reply(icmp::PARAMETER_PROBLEM, 0),
        _ => None,
    }
}

#[cfg(not(target_os = "linux"))]
fn icmp_from_errno(_errno: i32) -> Option<IcmpReply> {
    None
}

fn icmp_reply(err: io::Error) -> io::Result<UdpReply> {
    match icmp_from_error(&err) {
        Some(reply) => Ok(reply.into()),
        None => Err(err),
    }
}

fn received(outcome: Result<io::Result<usize>, Elapsed>) -> io::Result<UdpReply> {
    match outcome {
        Err(_) => Ok(UdpReply::Silence),
        Ok(Ok(_)) => Ok(UdpReply::Datagram),
        Ok(Err(e)) => icmp_reply(e),
    }
}

async fn exchange(target: Ipv4Addr, port: u16, timeout: Duration) -> io::Result<UdpReply> {
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).await?;
    socket.connect((target, port)).await?;
    let local_port = socket.local_addr()?.port();

    // Opened before sending so an early reply is not missed.
    let listener = match IcmpListener::open() {
        Ok(l) => Some(l),
        Err(e) => {
            trace!("udp {target}:{port}: no icmp listener: {e}");
            None
        }
    };

    // An error queued from an earlier datagram can surface on send.
    if let Err(e) = socket.send(&[]).await {
        return icmp_reply(e);
    }

    let mut buf = [0u8; RECV_BUFFER];
    let recv = time::timeout(timeout, socket.recv(&mut buf));
    let Some(listener) = listener else {
        return received(recv.await);
    };

    let deadline = Instant::now() + timeout;
    let done = Arc::new(AtomicBool::new(false));
    let mut watcher = {
        let done = done.clone();
        tokio::task::spawn_blocking(move || {
            listener.wait_until(deadline, &done, ICMP_POLL_INTERVAL, |q| {
                q.is_for(IpNextHeaderProtocols::Udp, target, local_port, port)
            })
        })
    };

    tokio::pin!(recv);
    let reply = tokio::select! {
        outcome = &mut recv => received(outcome),
        heard = &mut watcher => match heard {
            Ok(Ok(Some(icmp))) => Ok(icmp.into()),
            _ => received(recv.await),
        },
    };
    done.store(true, Ordering::Relaxed);
    reply
}
