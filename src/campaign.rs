use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::{info, warn};
use tokio_util::sync::{CancellationToken, WaitForCancellationFutureOwned};

use crate::config::ScanConfig;
use crate::probe::{resolve_target, Probe, SynProbe, TcpConnectProbe, UdpProbe};
use crate::report::{summary_line, Reporter};
use crate::scanner::scan_target;
use crate::types::{CampaignResult, ScanMode};

/// The "is scanning" flag of one campaign.
///
/// Cheap to clone; every clone observes the same flag, so one can be handed
/// to a signal handler or a cancel button while the campaign runs elsewhere.
#[derive(Clone, Debug, Default)]
pub struct ScanState {
    inner: Arc<StateInner>,
}

#[derive(Debug, Default)]
struct StateInner {
    scanning: AtomicBool,
    // Re-armed by every `begin`; cancelled by `stop`.
    token: Mutex<CancellationToken>,
}

impl ScanState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_scanning(&self) -> bool {
        self.inner.scanning.load(Ordering::SeqCst)
    }

    /// Ask the running campaign to stop. Safe to call from any thread, any
    /// number of times, with or without a campaign running.
    pub fn stop(&self) {
        let token = self.token();
        self.inner.scanning.store(false, Ordering::SeqCst);
        token.cancel();
    }

    /// Resolves once `stop` is called for the current run.
    pub(crate) fn stopped(&self) -> WaitForCancellationFutureOwned {
        self.token().clone().cancelled_owned()
    }

    pub(crate) fn begin(&self) -> ScanGuard<'_> {
        let mut token = self.token();
        *token = CancellationToken::new();
        self.inner.scanning.store(true, Ordering::SeqCst);
        ScanGuard { state: self }
    }

    fn token(&self) -> MutexGuard<'_, CancellationToken> {
        self.inner
            .token
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Clears the flag when the campaign ends, however it ends.
pub(crate) struct ScanGuard<'a> {
    state: &'a ScanState,
}

impl Drop for ScanGuard<'_> {
    fn drop(&mut self) {
        self.state.inner.scanning.store(false, Ordering::SeqCst);
    }
}

/// Scans targets one after another with one configuration.
#[derive(Debug, Clone)]
pub struct Campaign {
    config: ScanConfig,
    state: ScanState,
}

impl Campaign {
    pub fn new(config: ScanConfig) -> Self {
        Self::with_state(config, ScanState::new())
    }

    pub fn with_state(config: ScanConfig, state: ScanState) -> Self {
        Self { config, state }
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// Handle for stopping this campaign from elsewhere.
    pub fn state(&self) -> &ScanState {
        &self.state
    }

    pub fn stop(&self) {
        self.state.stop();
    }

    /// Run the campaign with the probe strategy selected by the configured mode.
    pub async fn run<S, R>(&self, targets: &[S], reporter: &R) -> CampaignResult
    where
        S: AsRef<str>,
        R: Reporter + ?Sized,
    {
        let timeout = self.config.timeout;
        match self.config.mode {
            ScanMode::TcpConnect => {
                self.run_with(TcpConnectProbe::new(timeout), targets, reporter)
                    .await
            }
            ScanMode::Syn => self.run_with(SynProbe::new(timeout), targets, reporter).await,
            ScanMode::Udp => self.run_with(UdpProbe::new(timeout), targets, reporter).await,
        }
    }

    /// Run the campaign with an explicit probe.
    ///
    /// Targets are scanned strictly in order. A stop request lets the current
    /// target drain and prevents the next one from starting; the interrupted
    /// target is summarised but left out of the returned result.
    pub async fn run_with<P, S, R>(&self, probe: P, targets: &[S], reporter: &R) -> CampaignResult
    where
        P: Probe,
        S: AsRef<str>,
        R: Reporter + ?Sized,
    {
        let _guard = self.state.begin();
        let probe = Arc::new(probe);
        let mut results = CampaignResult::new();
        let total = targets.len();

        for (i, target) in targets.iter().enumerate() {
            let target: &str = target.as_ref();
            if !self.state.is_scanning() {
                info!("stop requested, {} targets not scanned", total - i);
                break;
            }
            reporter.on_progress(&format!("Scanning target {}/{}: {}", i + 1, total, target));

            let ip = match resolve_target(target).await {
                Ok(ip) => ip,
                Err(e) => {
                    warn!("{e}");
                    reporter.on_progress(&e.to_string());
                    reporter.on_summary(&summary_line(target, &[]));
                    results.insert(target, Vec::new());
                    continue;
                }
            };

            let scan = scan_target(
                ip,
                &self.config.ports,
                self.config.workers,
                Arc::clone(&probe),
                &self.state,
                reporter,
            )
            .await;

            if scan.interrupted {
                reporter.on_summary(&format!(
                    "Target {target}: scan interrupted, {} open ports found before stopping",
                    scan.open_ports.len()
                ));
                break;
            }
            reporter.on_summary(&summary_line(target, &scan.open_ports));
            results.insert(target, scan.open_ports);
        }

        results
    }
}
