use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use port_probe::probe::Probe;
use port_probe::ports::parse_ports_str;
use port_probe::report::Callbacks;
use port_probe::{Campaign, ProbeStatus, ScanConfig, ScanMode, ScanState};

#[derive(Default)]
struct Stats {
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    calls: AtomicUsize,
}

/// Probe double: sleeps per port, reports the listed ports open and can
/// request a stop when it reaches a given port.
struct FakeProbe {
    stats: Arc<Stats>,
    open: Vec<u16>,
    delay: fn(u16) -> Duration,
    stop_at: Option<(u16, ScanState)>,
}

impl FakeProbe {
    fn new(open: Vec<u16>) -> Self {
        Self {
            stats: Arc::new(Stats::default()),
            open,
            delay: |_| Duration::from_millis(10),
            stop_at: None,
        }
    }
}

impl Probe for FakeProbe {
    async fn probe(&self, _target: Ipv4Addr, port: u16) -> ProbeStatus {
        self.stats.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.stats.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.stats.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep((self.delay)(port)).await;
        self.stats.in_flight.fetch_sub(1, Ordering::SeqCst);

        if let Some((stop_port, state)) = &self.stop_at {
            if *stop_port == port {
                state.stop();
            }
        }
        if self.open.contains(&port) {
            ProbeStatus::Open
        } else {
            ProbeStatus::Closed
        }
    }
}

fn config(ports: Vec<u16>, workers: i64) -> ScanConfig {
    ScanConfig::new(ports, ScanMode::TcpConnect, workers).expect("valid config")
}

#[tokio::test]
async fn concurrency_never_exceeds_workers() {
    let probe = FakeProbe::new(vec![3, 17]);
    let stats = probe.stats.clone();
    let campaign = Campaign::new(config((1..=40).collect(), 4));

    let results = campaign.run_with(probe, &["127.0.0.1"], &()).await;

    assert_eq!(stats.calls.load(Ordering::SeqCst), 40);
    let peak = stats.peak.load(Ordering::SeqCst);
    assert!(peak <= 4, "peak {peak} exceeds 4 workers");
    let mut open = results.get("127.0.0.1").expect("target recorded").to_vec();
    open.sort_unstable();
    assert_eq!(open, vec![3, 17]);
}

#[tokio::test]
async fn open_ports_follow_completion_order() {
    let mut probe = FakeProbe::new(vec![1, 2]);
    probe.delay = |port| {
        if port == 1 {
            Duration::from_millis(150)
        } else {
            Duration::from_millis(5)
        }
    };
    let campaign = Campaign::new(config(vec![1, 2], 2));

    let results = campaign.run_with(probe, &["127.0.0.1"], &()).await;
    assert_eq!(results.get("127.0.0.1"), Some(&[2, 1][..]));
}

#[tokio::test]
async fn repeated_ports_are_tried_once() {
    let ports = parse_ports_str("80,80,79-81").expect("valid spec");
    assert_eq!(ports, vec![80, 80, 79, 80, 81]);

    let probe = FakeProbe::new(vec![79, 80, 81]);
    let stats = probe.stats.clone();
    let campaign = Campaign::new(config(ports, 3));

    let results = campaign.run_with(probe, &["127.0.0.1"], &()).await;

    assert_eq!(stats.calls.load(Ordering::SeqCst), 3);
    let mut open = results.get("127.0.0.1").expect("target recorded").to_vec();
    open.sort_unstable();
    assert_eq!(open, vec![79, 80, 81]);
}

#[tokio::test]
async fn callbacks_see_progress_results_and_summaries() {
    let events = Arc::new(Mutex::new(Vec::<String>::new()));
    let (p, r, s) = (events.clone(), events.clone(), events.clone());
    let reporter = Callbacks::new()
        .progress(move |m| p.lock().unwrap().push(format!("progress {m}")))
        .result(move |port, status| r.lock().unwrap().push(format!("result {port} {status}")))
        .summary(move |m| s.lock().unwrap().push(format!("summary {m}")));

    let campaign = Campaign::new(config(vec![22, 23], 1));
    let targets = ["127.0.0.1", "127.0.0.2"];
    let results = campaign
        .run_with(FakeProbe::new(vec![22]), &targets, &reporter)
        .await;

    assert_eq!(results.len(), 2);
    let events = events.lock().unwrap().clone();
    assert_eq!(
        events,
        vec![
            "progress Scanning target 1/2: 127.0.0.1",
            "progress Starting scan of target: 127.0.0.1",
            "result 22 open",
            "summary Target 127.0.0.1 open ports: 22",
            "progress Scanning target 2/2: 127.0.0.2",
            "progress Starting scan of target: 127.0.0.2",
            "result 22 open",
            "summary Target 127.0.0.2 open ports: 22",
        ]
    );
}

#[tokio::test]
async fn stop_between_targets_keeps_finished_ones() {
    let campaign = Campaign::new(config(vec![80], 2));
    let state = campaign.state().clone();
    let reporter = Callbacks::new().summary(move |_| state.stop());

    let targets = ["127.0.0.1", "127.0.0.2", "127.0.0.3"];
    let results = campaign
        .run_with(FakeProbe::new(vec![80]), &targets, &reporter)
        .await;

    assert_eq!(results.len(), 1);
    assert_eq!(results.get("127.0.0.1"), Some(&[80][..]));
    assert!(!campaign.state().is_scanning());
}

#[tokio::test]
async fn stop_mid_target_drains_and_skips_rest() {
    let campaign = Campaign::new(config((1..=20).collect(), 1));
    let mut probe = FakeProbe::new((1..=20).collect());
    probe.stop_at = Some((5, campaign.state().clone()));
    let stats = probe.stats.clone();

    let interrupted = Arc::new(Mutex::new(Vec::<String>::new()));
    let sink = interrupted.clone();
    let reporter = Callbacks::new().summary(move |m| sink.lock().unwrap().push(m.to_string()));

    let results = campaign
        .run_with(probe, &["127.0.0.1", "127.0.0.2"], &reporter)
        .await;

    assert!(results.is_empty(), "interrupted target must not be recorded");
    assert!(stats.calls.load(Ordering::SeqCst) <= 6);
    assert_eq!(stats.in_flight.load(Ordering::SeqCst), 0, "in-flight probes drained");
    let summaries = interrupted.lock().unwrap().clone();
    assert_eq!(summaries.len(), 1);
    assert!(summaries[0].contains("interrupted"));
}

#[tokio::test]
async fn unresolvable_target_does_not_stop_campaign() {
    let campaign = Campaign::new(config(vec![80], 2));
    let targets = ["no such host.invalid", "127.0.0.1"];
    let results = campaign
        .run_with(FakeProbe::new(vec![80]), &targets, &())
        .await;

    assert_eq!(results.get("no such host.invalid"), Some(&[][..]));
    assert_eq!(results.get("127.0.0.1"), Some(&[80][..]));
}

#[tokio::test]
async fn tcp_connect_campaign_on_loopback() {
    let listener = tokio::net::TcpListener::bind((Ipv4Addr::LOCALHOST, 0))
        .await
        .unwrap();
    let open = listener.local_addr().unwrap().port();
    let closed = {
        let l = tokio::net::TcpListener::bind((Ipv4Addr::LOCALHOST, 0))
            .await
            .unwrap();
        l.local_addr().unwrap().port()
    };

    let campaign = Campaign::new(config(vec![closed, open], 8));
    let results = campaign.run(&["127.0.0.1".to_string()], &()).await;

    assert_eq!(results.get("127.0.0.1"), Some(&[open][..]));
    assert!(!campaign.state().is_scanning());
}

#[test]
fn invalid_worker_counts_rejected_before_scanning() {
    for bad in [0, -5, 501] {
        assert!(ScanConfig::new(vec![80], ScanMode::Syn, bad).is_err());
    }
    for good in [1, 500] {
        assert!(ScanConfig::new(vec![80], ScanMode::Syn, good).is_ok());
    }
}
