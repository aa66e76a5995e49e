use std::time::Duration;

use crate::error::ScanError;
use crate::types::ScanMode;

pub const MIN_WORKERS: usize = 1;
pub const MAX_WORKERS: usize = 500;
pub const DEFAULT_WORKERS: usize = 20;

/// Settings shared by every target of one campaign.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanConfig {
    pub ports: Vec<u16>,
    pub mode: ScanMode,
    pub workers: usize,
    /// Per-probe timeout. Shortening it raises false "filtered" verdicts on
    /// slow links, lengthening it slows every silent port.
    pub timeout: Duration,
}

impl ScanConfig {
    /// Validate the worker count and fill in the mode's default timeout.
    pub fn new(ports: Vec<u16>, mode: ScanMode, workers: i64) -> Result<Self, ScanError> {
        Ok(Self {
            ports,
            mode,
            workers: validate_workers(workers)?,
            timeout: mode.default_timeout(),
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Accept a worker count in `[MIN_WORKERS, MAX_WORKERS]`.
pub fn validate_workers(value: i64) -> Result<usize, ScanError> {
    match usize::try_from(value) {
        Ok(n) if (MIN_WORKERS..=MAX_WORKERS).contains(&n) => Ok(n),
        _ => Err(ScanError::Validation {
            value,
            min: MIN_WORKERS,
            max: MAX_WORKERS,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worker_bounds() {
        for bad in [0, -5, 501, i64::MAX] {
            assert!(validate_workers(bad).is_err(), "{bad} accepted");
        }
        assert_eq!(validate_workers(1).unwrap(), 1);
        assert_eq!(validate_workers(500).unwrap(), 500);
    }

    #[test]
    fn timeout_follows_mode() {
        let cfg = ScanConfig::new(vec![53], ScanMode::Udp, 4).unwrap();
        assert_eq!(cfg.timeout, Duration::from_secs(2));
        let cfg = cfg.with_timeout(Duration::from_millis(300));
        assert_eq!(cfg.timeout, Duration::from_millis(300));
    }
}
