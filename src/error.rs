use std::path::PathBuf;
use thiserror::Error;

/// A port specification token that could not be turned into ports.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid port specification token '{token}': {reason}")]
pub struct PortParseError {
    pub token: String,
    pub reason: String,
}

/// Errors that reach the caller of a campaign. Probe failures never show up
/// here; they are folded into `ProbeStatus::Error`.
#[derive(Error, Debug)]
pub enum ScanError {
    #[error(transparent)]
    Parse(#[from] PortParseError),

    #[error("worker count must be between {min} and {max}, got {value}")]
    Validation { value: i64, min: usize, max: usize },

    #[error("cannot resolve target '{target}' to an IPv4 address")]
    Resolve { target: String },

    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("target {target:?} cannot be written to a report: it is empty, spans lines or has surrounding whitespace")]
    UnrenderableTarget { target: String },

    #[error("malformed report at line {line}: {reason}")]
    Report { line: usize, reason: String },
}

/// Failure inside a single probe.
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("packet construction failed: {0}")]
    Packet(&'static str),
}
