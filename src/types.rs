use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Which probe strategy a campaign uses.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ScanMode {
    /// Full three-way handshake through the OS socket API. No privilege needed.
    #[default]
    TcpConnect,
    /// Half-open scan with a hand-built SYN segment. Needs a raw socket.
    Syn,
    /// Empty datagram, classified by the reply or ICMP error it provokes.
    Udp,
}

impl ScanMode {
    /// Per-probe timeout used when the caller does not override it.
    pub fn default_timeout(self) -> Duration {
        match self {
            ScanMode::TcpConnect | ScanMode::Syn => Duration::from_secs(1),
            ScanMode::Udp => Duration::from_secs(2),
        }
    }
}

impl fmt::Display for ScanMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScanMode::TcpConnect => write!(f, "tcp-connect"),
            ScanMode::Syn => write!(f, "syn"),
            ScanMode::Udp => write!(f, "udp"),
        }
    }
}

/// Classification of one port after one probe.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProbeStatus {
    Open,
    Closed,
    Filtered,
    OpenOrFiltered,
    Unknown,
    Error(String),
}

impl ProbeStatus {
    /// Whether the port is recorded as open in a target's results.
    ///
    /// `OpenOrFiltered` counts: a silent UDP port cannot be told apart from a
    /// filtered one without protocol payloads, and the report keeps both.
    pub fn is_open(&self) -> bool {
        matches!(self, ProbeStatus::Open | ProbeStatus::OpenOrFiltered)
    }
}

impl fmt::Display for ProbeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeStatus::Open => write!(f, "open"),
            ProbeStatus::Closed => write!(f, "closed"),
            ProbeStatus::Filtered => write!(f, "filtered"),
            ProbeStatus::OpenOrFiltered => write!(f, "open|filtered"),
            ProbeStatus::Unknown => write!(f, "unknown"),
            ProbeStatus::Error(detail) => write!(f, "error: {detail}"),
        }
    }
}

/// Outcome of a single probe against one port.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ProbeResult {
    pub port: u16,
    pub status: ProbeStatus,
}

impl ProbeResult {
    pub fn new(port: u16, status: ProbeStatus) -> Self {
        Self { port, status }
    }
}

/// Open ports of one target, in the order the probes completed.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct TargetResult {
    pub target: String,
    pub open_ports: Vec<u16>,
}

/// What the orchestrator hands back for one target.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TargetScan {
    pub open_ports: Vec<u16>,
    /// Set when a stop request cut the target short.
    pub interrupted: bool,
}

/// Target -> open ports, one entry per target, in scan order.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct CampaignResult {
    pub targets: Vec<TargetResult>,
}

impl CampaignResult {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a target. A target seen before keeps its position and takes the new ports.
    pub fn insert(&mut self, target: impl Into<String>, open_ports: Vec<u16>) {
        let target = target.into();
        match self.targets.iter_mut().find(|t| t.target == target) {
            Some(existing) => existing.open_ports = open_ports,
            None => self.targets.push(TargetResult { target, open_ports }),
        }
    }

    pub fn get(&self, target: &str) -> Option<&[u16]> {
        self.targets
            .iter()
            .find(|t| t.target == target)
            .map(|t| t.open_ports.as_slice())
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[u16])> {
        self.targets
            .iter()
            .map(|t| (t.target.as_str(), t.open_ports.as_slice()))
    }

    pub fn open_count(&self) -> usize {
        self.targets.iter().map(|t| t.open_ports.len()).sum()
    }
}
