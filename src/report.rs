use std::fs::File;
use std::io::Write;
use std::path::Path;

use ::time::{format_description::well_known, OffsetDateTime};

use crate::error::ScanError;
use crate::types::CampaignResult;

/// Receives campaign events. Every method defaults to doing nothing, so a
/// front end only implements the events it renders.
pub trait Reporter: Send + Sync {
    /// Free-form progress text, e.g. which target is being scanned.
    fn on_progress(&self, _message: &str) {}

    /// An open port, as soon as its probe completes.
    fn on_result(&self, _port: u16, _status: &str) {}

    /// One line per finished target describing its open ports.
    fn on_summary(&self, _message: &str) {}
}

/// Silent reporter.
impl Reporter for () {}

type TextFn = Box<dyn Fn(&str) + Send + Sync>;
type ResultFn = Box<dyn Fn(u16, &str) + Send + Sync>;

/// Reporter assembled from optional closures; unset slots are skipped.
#[derive(Default)]
pub struct Callbacks {
    progress: Option<TextFn>,
    result: Option<ResultFn>,
    summary: Option<TextFn>,
}

impl Callbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn progress(mut self, f: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.progress = Some(Box::new(f));
        self
    }

    pub fn result(mut self, f: impl Fn(u16, &str) + Send + Sync + 'static) -> Self {
        self.result = Some(Box::new(f));
        self
    }

    pub fn summary(mut self, f: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.summary = Some(Box::new(f));
        self
    }
}

impl Reporter for Callbacks {
    fn on_progress(&self, message: &str) {
        if let Some(f) = &self.progress {
            f(message);
        }
    }

    fn on_result(&self, port: u16, status: &str) {
        if let Some(f) = &self.result {
            f(port, status);
        }
    }

    fn on_summary(&self, message: &str) {
        if let Some(f) = &self.summary {
            f(message);
        }
    }
}

/// Prints every event to stdout as it happens.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleReporter;

impl Reporter for ConsoleReporter {
    fn on_progress(&self, message: &str) {
        println!("{message}");
    }

    fn on_result(&self, port: u16, status: &str) {
        println!("  port {port:>5}: {status}");
    }

    fn on_summary(&self, message: &str) {
        println!("{message}\n");
    }
}

const TITLE: &str = "# Port Scan Results";
const TARGET_PREFIX: &str = "## Target: ";
const OPEN_HEADER: &str = "Open ports:";
const NO_OPEN: &str = "No open ports";
const GENERATED_PREFIX: &str = "Generated: ";

/// A target heads its own line and is read back trimmed, so it has to
/// survive that unchanged.
fn renderable(target: &str) -> bool {
    !target.is_empty() && target.trim() == target && !target.contains(['\n', '\r'])
}

/// Render results as the persisted Markdown report.
///
/// Fails on a target that [`parse_markdown`] could not read back.
pub fn render_markdown(results: &CampaignResult) -> Result<String, ScanError> {
    if let Some((target, _)) = results.iter().find(|(t, _)| !renderable(t)) {
        return Err(ScanError::UnrenderableTarget {
            target: target.to_string(),
        });
    }

    let mut out = String::new();
    out.push_str(TITLE);
    out.push_str("\n\n");
    out.push_str(GENERATED_PREFIX);
    out.push_str(&now_iso_like());
    out.push_str("\n\n");
    for (target, open_ports) in results.iter() {
        out.push_str(TARGET_PREFIX);
        out.push_str(target);
        out.push('\n');
        if open_ports.is_empty() {
            out.push_str(NO_OPEN);
            out.push('\n');
        } else {
            out.push_str(OPEN_HEADER);
            out.push('\n');
            for port in open_ports {
                out.push_str(&format!("- {port}\n"));
            }
        }
        out.push('\n');
    }
    Ok(out)
}

/// Read back a report produced by [`render_markdown`].
pub fn parse_markdown(text: &str) -> Result<CampaignResult, ScanError> {
    let mut results = CampaignResult::new();
    let mut current: Option<(String, Vec<u16>)> = None;

    for (idx, raw_line) in text.lines().enumerate() {
        let line_no = idx + 1;
        let line = raw_line.trim();
        if let Some(target) = line.strip_prefix(TARGET_PREFIX) {
            if let Some((t, ports)) = current.take() {
                results.insert(t, ports);
            }
            current = Some((target.trim().to_string(), Vec::new()));
        } else if let Some(port) = line.strip_prefix("- ") {
            let Some((_, ports)) = current.as_mut() else {
                return Err(ScanError::Report {
                    line: line_no,
                    reason: "port listed before any target".into(),
                });
            };
            let port = port.trim().parse::<u16>().map_err(|e| ScanError::Report {
                line: line_no,
                reason: format!("invalid port '{port}': {e}"),
            })?;
            ports.push(port);
        }
        // Title, timestamp, section captions and blank lines carry no data.
    }
    if let Some((t, ports)) = current {
        results.insert(t, ports);
    }
    Ok(results)
}

pub fn save_markdown(path: &Path, results: &CampaignResult) -> Result<(), ScanError> {
    let io_err = |source| ScanError::Io {
        path: path.to_path_buf(),
        source,
    };
    let text = render_markdown(results)?;
    let mut file = File::create(path).map_err(io_err)?;
    file.write_all(text.as_bytes())
        .map_err(io_err)
}

pub fn save_json(path: &Path, results: &CampaignResult) -> anyhow::Result<()> {
    let file = File::create(path)?;
    serde_json::to_writer_pretty(file, results)?;
    Ok(())
}

/// Summary line for one finished target.
pub fn summary_line(target: &str, open_ports: &[u16]) -> String {
    if open_ports.is_empty() {
        format!("Target {target}: no open ports found")
    } else {
        let list: Vec<String> = open_ports.iter().map(u16::to_string).collect();
        format!("Target {target} open ports: {}", list.join(", "))
    }
}

fn now_iso_like() -> String {
    let now = OffsetDateTime::now_utc();
    now.format(&well_known::Rfc3339)
        .unwrap_or_else(|_| String::from("1970-01-01T00:00:00Z"))
}
