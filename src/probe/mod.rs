//! Probe strategies: one way each to classify the reachability of a port.
use std::future::Future;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket};

use crate::error::ScanError;

pub mod connect;
pub mod icmp;
pub mod syn;
pub mod udp;

pub use connect::TcpConnectProbe;
pub use syn::SynProbe;
pub use udp::UdpProbe;

use crate::types::ProbeStatus;

/// Classify one port of one target.
///
/// Implementations catch their own failures and report them as
/// [`ProbeStatus::Error`]; a probe never fails the scan around it.
pub trait Probe: Send + Sync + 'static {
    fn probe(&self, target: Ipv4Addr, port: u16) -> impl Future<Output = ProbeStatus> + Send;
}

/// Resolve a target string to the first IPv4 address it names.
pub async fn resolve_target(target: &str) -> Result<Ipv4Addr, ScanError> {
    if let Ok(ip) = target.parse::<Ipv4Addr>() {
        return Ok(ip);
    }
    let not_found = || ScanError::Resolve {
        target: target.to_string(),
    };
    let addrs = tokio::net::lookup_host((target, 0))
        .await
        .map_err(|_| not_found())?;
    addrs
        .filter_map(|a| match a.ip() {
            IpAddr::V4(v4) => Some(v4),
            IpAddr::V6(_) => None,
        })
        .next()
        .ok_or_else(not_found)
}

/// Local address the kernel would use to reach `dest`. Nothing is sent.
pub(crate) fn local_ipv4_for(dest: Ipv4Addr) -> std::io::Result<Ipv4Addr> {
    let sock = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))?;
    sock.connect(SocketAddr::new(IpAddr::V4(dest), 53))?;
    match sock.local_addr()?.ip() {
        IpAddr::V4(v4) => Ok(v4),
        IpAddr::V6(_) => Err(std::io::Error::new(
            std::io::ErrorKind::AddrNotAvailable,
            "no local IPv4 address toward target",
        )),
    }
}
