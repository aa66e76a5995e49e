use std::collections::HashSet;
use std::net::Ipv4Addr;
use std::sync::Arc;

use log::{debug, info, warn};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::campaign::ScanState;
use crate::config::{MAX_WORKERS, MIN_WORKERS};
use crate::probe::Probe;
use crate::report::Reporter;
use crate::types::{ProbeResult, TargetScan};

/// Probe every port of one target with a bounded number of probes in flight.
///
/// - Each distinct port is tried once, however often the list repeats it.
/// - Limits concurrent probes using a `Semaphore`; each task keeps its permit until it finishes.
/// - Records open ports in completion order and reports each one as it arrives.
/// - Checks `state` before every dispatch and every collection. Once it is
///   cleared, nothing new is dispatched or recorded; probes already in flight
///   are drained (each is bounded by its own timeout) before returning.
pub async fn scan_target<P, R>(
    target: Ipv4Addr,
    ports: &[u16],
    workers: usize,
    probe: Arc<P>,
    state: &ScanState,
    reporter: &R,
) -> TargetScan
where
    P: Probe,
    R: Reporter + ?Sized,
{
    let sem = Arc::new(Semaphore::new(workers.clamp(MIN_WORKERS, MAX_WORKERS)));
    let mut set = JoinSet::new();
    let mut seen = HashSet::with_capacity(ports.len());
    let unique: Vec<u16> = ports.iter().copied().filter(|p| seen.insert(*p)).collect();
    let mut pending = unique.iter().copied().peekable();
    let mut open_ports = Vec::new();

    let stopped = state.stopped();
    tokio::pin!(stopped);

    info!("{target}: probing {} ports with {workers} workers", unique.len());
    reporter.on_progress(&format!("Starting scan of target: {target}"));

    let interrupted = loop {
        if pending.peek().is_none() && set.is_empty() {
            break false;
        }
        if !state.is_scanning() {
            break true;
        }

        tokio::select! {
            biased;
            _ = &mut stopped => break true,
            Some(joined) = set.join_next(), if !set.is_empty() => match joined {
                Ok(ProbeResult { port, status }) => {
                    debug!("{target}:{port} {status}");
                    if status.is_open() {
                        open_ports.push(port);
                        reporter.on_result(port, &status.to_string());
                    }
                }
                Err(e) => warn!("{target}: probe task failed: {e}"),
            },
            Ok(permit) = sem.clone().acquire_owned(), if pending.peek().is_some() => {
                if let Some(port) = pending.next() {
                    let probe = Arc::clone(&probe);
                    set.spawn(async move {
                        let _permit = permit; // keep permit until the probe completes
                        ProbeResult::new(port, probe.probe(target, port).await)
                    });
                }
            }
        }
    };

    if interrupted {
        info!(
            "{target}: stopped with {} probes in flight and {} not started",
            set.len(),
            pending.count()
        );
        while set.join_next().await.is_some() {}
    }

    TargetScan {
        open_ports,
        interrupted,
    }
}
