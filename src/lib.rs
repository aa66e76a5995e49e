//! Library crate for port-probe: concurrent TCP connect, SYN and UDP port scanning.
pub mod campaign;
pub mod config;
pub mod error;
pub mod logging;
pub mod ports;
pub mod probe;
pub mod report;
pub mod scanner;
pub mod targets;
pub mod types;

pub use campaign::{Campaign, ScanState};
pub use config::ScanConfig;
pub use error::{PortParseError, ProbeError, ScanError};
pub use report::Reporter;
pub use types::{CampaignResult, ProbeResult, ProbeStatus, ScanMode, TargetResult};
