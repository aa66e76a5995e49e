use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use log::debug;
use tokio::net::TcpStream;
use tokio::time;

use super::Probe;
use crate::types::{ProbeStatus, ScanMode};

/// Full TCP handshake through the OS. Works without privileges.
#[derive(Debug, Clone, Copy)]
pub struct TcpConnectProbe {
    pub timeout: Duration,
}

impl TcpConnectProbe {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for TcpConnectProbe {
    fn default() -> Self {
        Self::new(ScanMode::TcpConnect.default_timeout())
    }
}

impl Probe for TcpConnectProbe {
    async fn probe(&self, target: Ipv4Addr, port: u16) -> ProbeStatus {
        let addr = SocketAddr::from((target, port));
        // The stream is dropped, and the connection closed, before returning.
        match time::timeout(self.timeout, TcpStream::connect(addr)).await {
            Ok(Ok(_stream)) => ProbeStatus::Open,
            Ok(Err(e)) => {
                debug!("connect {addr}: {e}");
                ProbeStatus::Closed
            }
            Err(_) => {
                debug!("connect {addr}: timed out after {:?}", self.timeout);
                ProbeStatus::Closed
            }
        }
    }
}
