use std::ffi::OsString;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Parser};
use port_probe::report::{self, ConsoleReporter};
use port_probe::{config, logging, ports, targets, Campaign, CampaignResult, ScanConfig, ScanMode};

/// port-probe — concurrent TCP connect, SYN and UDP port scanner.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "port-probe",
    version,
    about = "Concurrent TCP connect, SYN and UDP port scanner.",
    after_help = "The nmap spellings -sS, -sT, -sU, -iL and -oN are accepted as well.",
    long_about = None
)]
struct Cli {
    /// Target host name or IPv4 address.
    target: Option<String>,

    /// Ports to scan, e.g. 22,80,443 or 1-1000. Defaults to 20 common ports.
    #[arg(short = 'p', long = "ports")]
    ports: Option<String>,

    /// Half-open SYN scan (-sS). Needs raw socket privileges.
    #[arg(long, group = "mode")]
    syn: bool,

    /// TCP connect scan (-sT). The default.
    #[arg(long, group = "mode")]
    connect: bool,

    /// UDP scan (-sU).
    #[arg(long, group = "mode")]
    udp: bool,

    /// Read targets from a file, one per line (-iL).
    #[arg(long = "input-list", value_name = "FILE")]
    input_list: Option<PathBuf>,

    /// Write a Markdown report to this path (-oN).
    #[arg(long = "output-normal", value_name = "FILE")]
    output_normal: Option<PathBuf>,

    /// Write results as pretty JSON to this path.
    #[arg(long, value_name = "FILE")]
    json: Option<PathBuf>,

    /// Concurrent probes per target (1-500).
    #[arg(
        short = 't',
        long = "threads",
        default_value_t = config::DEFAULT_WORKERS as i64,
        allow_negative_numbers = true
    )]
    threads: i64,

    /// Per-probe timeout in milliseconds. Defaults to 1000 (TCP, SYN) or 2000 (UDP).
    #[arg(long = "timeout-ms")]
    timeout_ms: Option<u64>,

    /// Increase log verbosity (-v, -vv).
    #[arg(short = 'v', long, action = ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    fn mode(&self) -> ScanMode {
        // The group makes at most one of these true.
        match (self.syn, self.connect, self.udp) {
            (true, _, _) => ScanMode::Syn,
            (_, _, true) => ScanMode::Udp,
            _ => ScanMode::TcpConnect,
        }
    }
}

/// Rewrite nmap-style two-letter options into their long forms.
fn normalize_args(args: impl IntoIterator<Item = OsString>) -> Vec<OsString> {
    args.into_iter()
        .map(|arg| {
            let long = match arg.to_str() {
                Some("-sS") => "--syn",
                Some("-sT") => "--connect",
                Some("-sU") => "--udp",
                Some("-iL") => "--input-list",
                Some("-oN") => "--output-normal",
                _ => return arg,
            };
            OsString::from(long)
        })
        .collect()
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse_from(normalize_args(std::env::args_os()));
    logging::init(cli.verbose);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mode = cli.mode();
    let port_list = ports::parse_ports_opt(cli.ports.as_deref())?;
    let mut scan_config = ScanConfig::new(port_list, mode, cli.threads)?;
    if let Some(ms) = cli.timeout_ms {
        scan_config = scan_config.with_timeout(Duration::from_millis(ms));
    }

    let target_list = if let Some(path) = cli.input_list.as_deref() {
        targets::load_targets(path)?
    } else if let Some(t) = cli.target.clone() {
        vec![t]
    } else {
        bail!("no target given; pass a target or -iL <file> (see --help)");
    };

    println!("port-probe configuration:");
    println!("  targets      : {}", target_list.len());
    println!("  ports        : {}", scan_config.ports.len());
    println!("  mode         : {mode}");
    println!("  threads      : {}", scan_config.workers);
    println!("  timeout_ms   : {}", scan_config.timeout.as_millis());
    println!();

    let campaign = Campaign::new(scan_config);

    // Ctrl-C stops dispatching; in-flight probes drain and partial results are kept.
    let interrupted = Arc::new(AtomicBool::new(false));
    {
        let state = campaign.state().clone();
        let interrupted = interrupted.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("\nInterrupted, waiting for in-flight probes...");
                interrupted.store(true, Ordering::SeqCst);
                state.stop();
            }
        });
    }

    let results = campaign.run(target_list.as_slice(), &ConsoleReporter).await;

    if interrupted.load(Ordering::SeqCst) {
        println!("Scan interrupted by user.");
    }
    print_results_table(&results);

    if let Some(path) = cli.output_normal.as_deref() {
        report::save_markdown(path, &results)?;
        println!("Wrote report to {}", path.display());
    }
    if let Some(path) = cli.json.as_deref() {
        report::save_json(path, &results)
            .with_context(|| format!("failed to write JSON to {}", path.display()))?;
        println!("Wrote JSON results to {}", path.display());
    }

    Ok(())
}

fn print_results_table(results: &CampaignResult) {
    let target_w = results
        .iter()
        .map(|(t, _)| t.len())
        .fold("target".len(), usize::max);

    println!(
        "Open ports: {} across {} targets",
        results.open_count(),
        results.len()
    );
    println!("{:<target_w$}  open ports", "target", target_w = target_w);
    println!("{:-<target_w$}  {:-<10}", "", "", target_w = target_w);
    for (target, open_ports) in results.iter() {
        let list = if open_ports.is_empty() {
            "-".to_string()
        } else {
            open_ports
                .iter()
                .map(u16::to_string)
                .collect::<Vec<_>>()
                .join(",")
        };
        println!("{:<target_w$}  {}", target, list, target_w = target_w);
    }
}
