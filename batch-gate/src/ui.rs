//! Display logic for the batch-gate CLI.
//!
//! This module handles all text output: colored result lines, progress
//! counters, the spinner, headers and summaries. Structured formats (JSON,
//! CSV) are written by `main.rs` and never pass through here.

use batch_gate_lib::{FetchResponse, Outcome, UnitFailure};
use console::{pad_str, style, Alignment, Term};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::{ErrorCategory, ErrorStats, Settings, Tally};

// ── Spinner ──────────────────────────────────────────────────────────────────

const SPINNER_FRAMES: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];

/// An async braille-dot spinner that writes to stderr so stdout stays clean.
pub struct Spinner {
    running: Arc<AtomicBool>,
    handle: Option<tokio::task::JoinHandle<()>>,
}

impl Spinner {
    /// Start a new spinner with the given message (e.g. "Sending 200 requests...").
    ///
    /// Returns `None` when stderr is not a terminal.
    pub fn start(message: String) -> Option<Self> {
        let term = Term::stderr();
        if !term.is_term() {
            return None;
        }

        let running = Arc::new(AtomicBool::new(true));
        let running_clone = running.clone();

        let handle = tokio::spawn(async move {
            let mut idx = 0usize;
            while running_clone.load(Ordering::Relaxed) {
                let frame = SPINNER_FRAMES[idx % SPINNER_FRAMES.len()];
                let _ = term.clear_line();
                let _ = term.write_str(&format!("{} {}", style(frame).cyan(), message));
                idx += 1;
                tokio::time::sleep(Duration::from_millis(80)).await;
            }
            let _ = term.clear_line();
        });

        Some(Self {
            running,
            handle: Some(handle),
        })
    }

    /// Stop the spinner and clear the line.
    pub async fn stop(mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(h) = self.handle.take() {
            let _ = h.await;
        }
    }
}

// ── Header ───────────────────────────────────────────────────────────────────

/// Print a styled header at the start of a pretty run.
pub fn print_header(request_count: usize, settings: &Settings) {
    println!(
        "{} {} {}",
        style("batch-gate").bold(),
        style(format!("v{}", env!("CARGO_PKG_VERSION"))).dim(),
        style(format!(
            "- Sending {} request{}",
            request_count,
            if request_count == 1 { "" } else { "s" }
        ))
        .dim(),
    );

    let mut meta_parts = vec![
        format!("Concurrency: {}", settings.batch.concurrency),
        format!("Timeout: {}", format_duration(settings.batch.request_timeout)),
    ];
    if let Some(deadline) = settings.batch.batch_timeout {
        meta_parts.push(format!("Deadline: {}", format_duration(deadline)));
    }
    if settings.repeat > 1 {
        meta_parts.push(format!("Repeat: {}", settings.repeat));
    }

    println!("{}", style(meta_parts.join(" | ")).dim());
    println!();
}

// ── Single result line ───────────────────────────────────────────────────────

/// Format and print one outcome with colors and alignment.
///
/// If `counter` is Some((current, total)), a progress prefix like `[3/8]` is
/// shown. Pretty mode adds a detail line under each result.
pub fn print_result(
    target: &str,
    outcome: &Outcome<FetchResponse>,
    pretty: bool,
    counter: Option<(usize, usize)>,
) {
    let target_width = 40;
    let padded_target = pad_str(target, target_width, Alignment::Left, Some(".."));

    let prefix = match counter {
        Some((cur, total)) => {
            format!("{} ", style(format!("[{}/{}]", cur, total)).dim())
        }
        None => String::new(),
    };

    match outcome {
        Outcome::Success(response) => {
            println!(
                "  {}{}  {}  {}",
                prefix,
                style(&padded_target).white(),
                style(response.status).green().bold(),
                style(format!("{}ms", response.elapsed.as_millis())).dim(),
            );
            if pretty {
                println!(
                    "    {} {} bytes from {}",
                    style("└─").dim(),
                    response.body_bytes,
                    response.url,
                );
            }
        }
        Outcome::Failure(failure) => {
            let label = match ErrorCategory::of(failure) {
                ErrorCategory::Cancelled => style("CANCELLED").yellow(),
                _ => style("FAILED").red().bold(),
            };
            println!(
                "  {}{}  {}  {}",
                prefix,
                style(&padded_target).white(),
                label,
                style(brief_error(failure)).dim(),
            );
            if pretty {
                println!("    {} {}", style("└─").dim(), failure.message);
            }
        }
    }
}

// ── Summary ──────────────────────────────────────────────────────────────────

/// Print the final summary bar with colored counts.
pub fn print_summary(tally: &Tally, duration: Duration) {
    let total = tally.total();
    println!(
        "  {}",
        style("────────────────────────────────────────────────────").dim()
    );
    println!(
        "  {} request{} in {:.1}s  {}  {}  {}  {}  {}  {}",
        style(total).bold(),
        if total == 1 { "" } else { "s" },
        duration.as_secs_f64(),
        style("|").dim(),
        style(format!("{} succeeded", tally.succeeded)).green(),
        style("|").dim(),
        style(format!("{} failed", tally.failed)).red(),
        style("|").dim(),
        style(format!("{} cancelled", tally.cancelled)).yellow(),
    );
}

// ── Error summary ────────────────────────────────────────────────────────────

/// Print a categorized error summary using colors.
pub fn print_error_summary(error_stats: &ErrorStats) {
    let categories = error_stats.categories();
    if categories.is_empty() {
        return;
    }

    println!("  {}", style("Some requests did not succeed:").yellow());

    for (label, targets) in categories {
        println!(
            "  {} {} {}{}: {}",
            style("•").dim(),
            targets.len(),
            label,
            if targets.len() == 1 { "" } else { "s" },
            format_target_list(targets, 5),
        );
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────────

/// Join targets, showing at most `max_show` before "and N more".
///
/// Repeated targets are collapsed so a 200x run doesn't print one host 200 times.
fn format_target_list(targets: &[String], max_show: usize) -> String {
    let mut unique: Vec<&str> = Vec::new();
    for target in targets {
        if !unique.contains(&target.as_str()) {
            unique.push(target);
        }
    }

    if unique.len() <= max_show {
        unique.join(", ")
    } else {
        let remaining = unique.len() - max_show;
        format!("{}, ... and {} more", unique[..max_show].join(", "), remaining)
    }
}

/// Short reason shown next to a failed target.
fn brief_error(failure: &UnitFailure) -> &'static str {
    match ErrorCategory::of(failure) {
        ErrorCategory::Timeout => "(timeout)",
        ErrorCategory::Connection => "(connection error)",
        ErrorCategory::HttpStatus => "(HTTP status)",
        ErrorCategory::Cancelled => "(cancelled)",
        ErrorCategory::Other => "(error)",
    }
}

fn format_duration(duration: Duration) -> String {
    if duration.subsec_millis() == 0 {
        format!("{}s", duration.as_secs())
    } else {
        format!("{}ms", duration.as_millis())
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────
