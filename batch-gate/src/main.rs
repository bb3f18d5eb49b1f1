//! Batch Gate CLI Application
//!
//! A command-line interface for sending many HTTP GET requests with a hard
//! limit on how many are in flight at once. This CLI application provides a
//! user-friendly interface to the batch-gate-lib library.

mod ui;

use batch_gate_lib::{
    expand_targets, load_env_config, normalize_target, parse_duration, read_targets_file,
    BatchConfig, BatchExecutor, BatchResult, ConfigManager, EnvConfig, FailureKind,
    FetchResponse, FileConfig, HttpFetcher, Outcome, UnitFailure, WorkUnit, MAX_CONCURRENCY,
};
use clap::builder::styling::{AnsiColor, Effects, Styles};
use clap::Parser;
use std::process;
use std::time::Instant;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

const STYLES: Styles = Styles::styled()
    .header(AnsiColor::Yellow.on_default().effects(Effects::BOLD))
    .usage(AnsiColor::Yellow.on_default().effects(Effects::BOLD))
    .literal(AnsiColor::Green.on_default().effects(Effects::BOLD))
    .placeholder(AnsiColor::Cyan.on_default());

/// CLI arguments for batch-gate
#[derive(Parser, Debug)]
#[command(name = "batch-gate")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Send batches of HTTP GET requests with bounded concurrency")]
#[command(
    long_about = "Send batches of HTTP GET requests while never keeping more than N in flight.\n\nEvery request produces exactly one outcome; failures are reported, never fatal."
)]
#[command(styles = STYLES)]
pub struct Args {
    /// URLs or hosts to request (bare hosts use https)
    #[arg(value_name = "TARGETS", help_heading = "Targets")]
    pub targets: Vec<String>,

    /// Input file with targets (one per line, # for comments)
    #[arg(
        short = 'f',
        long = "file",
        value_name = "FILE",
        help_heading = "Targets"
    )]
    pub file: Option<String>,

    /// Send the whole target list this many times (default: 1)
    #[arg(
        short = 'r',
        long = "repeat",
        value_name = "N",
        help_heading = "Targets"
    )]
    pub repeat: Option<usize>,

    /// Output results in JSON format
    #[arg(short = 'j', long = "json", help_heading = "Output Format")]
    pub json: bool,

    /// Output results in CSV format
    #[arg(long = "csv", help_heading = "Output Format")]
    pub csv: bool,

    /// Enable structured output with a header and detail lines
    #[arg(short = 'p', long = "pretty", help_heading = "Output Format")]
    pub pretty: bool,

    /// Collect all results before displaying
    #[arg(long = "batch", help_heading = "Output Format")]
    pub batch: bool,

    /// Show results as they complete
    #[arg(long = "streaming", help_heading = "Output Format")]
    pub streaming: bool,

    /// Max requests in flight (default: 20, max: 1000)
    #[arg(
        short = 'c',
        long = "concurrency",
        value_name = "N",
        help_heading = "Performance"
    )]
    pub concurrency: Option<usize>,

    /// Per-request timeout, e.g. 500ms, 5s, 2m (default: 5s)
    #[arg(long = "timeout", value_name = "DURATION", help_heading = "Performance")]
    pub timeout: Option<String>,

    /// Deadline for the whole batch; unfinished requests are cancelled
    #[arg(
        long = "batch-timeout",
        value_name = "DURATION",
        help_heading = "Performance"
    )]
    pub batch_timeout: Option<String>,

    /// Use specific config file instead of automatic discovery
    #[arg(long = "config", value_name = "FILE", help_heading = "Configuration")]
    pub config: Option<String>,

    /// Show detailed debug information and error messages
    #[arg(short = 'd', long = "debug", help_heading = "Configuration")]
    pub debug: bool,

    /// Verbose logging
    #[arg(short = 'v', long = "verbose", help_heading = "Configuration")]
    pub verbose: bool,
}

/// How results are written to stdout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum OutputFormat {
    Text,
    Json,
    Csv,
}

impl OutputFormat {
    fn is_structured(self) -> bool {
        self != OutputFormat::Text
    }
}

/// Run settings after layering defaults, config files, environment and CLI.
#[derive(Debug, Clone)]
pub(crate) struct Settings {
    pub(crate) batch: BatchConfig,
    pub(crate) repeat: usize,
    pub(crate) pretty: bool,
    pub(crate) format: OutputFormat,
    pub(crate) json_pretty: bool,
    pub(crate) file: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            batch: BatchConfig::default(),
            repeat: 1,
            pretty: false,
            format: OutputFormat::Text,
            json_pretty: true,
            file: None,
        }
    }
}

/// Coarse failure categories for the end-of-run summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ErrorCategory {
    Timeout,
    Connection,
    HttpStatus,
    Cancelled,
    Other,
}

impl ErrorCategory {
    /// Classify a failed unit from its kind and message.
    pub(crate) fn of(failure: &UnitFailure) -> Self {
        match failure.kind {
            FailureKind::Cancelled => return ErrorCategory::Cancelled,
            FailureKind::Panicked => return ErrorCategory::Other,
            FailureKind::Action => {}
        }

        let msg = failure.message.to_lowercase();
        if msg.starts_with("timeout") || msg.contains("timed out") {
            ErrorCategory::Timeout
        } else if msg.starts_with("http ") {
            ErrorCategory::HttpStatus
        } else if msg.starts_with("network error") || msg.contains("connect") || msg.contains("dns")
        {
            ErrorCategory::Connection
        } else {
            ErrorCategory::Other
        }
    }
}

/// Error statistics for aggregated reporting
#[derive(Debug, Default)]
pub(crate) struct ErrorStats {
    pub(crate) timeouts: Vec<String>,
    pub(crate) connection_errors: Vec<String>,
    pub(crate) http_status_errors: Vec<String>,
    pub(crate) cancelled: Vec<String>,
    pub(crate) other_errors: Vec<String>,
}

impl ErrorStats {
    fn add_failure(&mut self, target: &str, failure: &UnitFailure) {
        let bucket = match ErrorCategory::of(failure) {
            ErrorCategory::Timeout => &mut self.timeouts,
            ErrorCategory::Connection => &mut self.connection_errors,
            ErrorCategory::HttpStatus => &mut self.http_status_errors,
            ErrorCategory::Cancelled => &mut self.cancelled,
            ErrorCategory::Other => &mut self.other_errors,
        };
        bucket.push(target.to_string());
    }

    fn has_errors(&self) -> bool {
        !self.timeouts.is_empty()
            || !self.connection_errors.is_empty()
            || !self.http_status_errors.is_empty()
            || !self.cancelled.is_empty()
            || !self.other_errors.is_empty()
    }

    /// Non-empty categories as (label, targets) pairs, in display order.
    pub(crate) fn categories(&self) -> Vec<(&'static str, &[String])> {
        [
            ("timeout", self.timeouts.as_slice()),
            ("connection error", self.connection_errors.as_slice()),
            ("HTTP status error", self.http_status_errors.as_slice()),
            ("cancelled request", self.cancelled.as_slice()),
            ("other error", self.other_errors.as_slice()),
        ]
        .into_iter()
        .filter(|(_, targets)| !targets.is_empty())
        .collect()
    }
}

/// Running counts for the summary bar.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Tally {
    pub(crate) succeeded: usize,
    pub(crate) failed: usize,
    pub(crate) cancelled: usize,
}

impl Tally {
    fn record(&mut self, outcome: &Outcome<FetchResponse>) {
        match outcome {
            Outcome::Success(_) => self.succeeded += 1,
            Outcome::Failure(f) if f.kind == FailureKind::Cancelled => self.cancelled += 1,
            Outcome::Failure(_) => self.failed += 1,
        }
    }

    pub(crate) fn total(&self) -> usize {
        self.succeeded + self.failed + self.cancelled
    }
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    init_tracing(&args);

    if let Err(e) = validate_args(&args) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }

    if let Err(e) = run(args).await {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

/// Install the stderr log subscriber.
///
/// `RUST_LOG` wins when set; otherwise `--debug` selects debug, `--verbose`
/// info, and the default is warn.
fn init_tracing(args: &Args) {
    let default_level = if args.debug {
        "debug"
    } else if args.verbose {
        "info"
    } else {
        "warn"
    };

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Validate command line arguments
fn validate_args(args: &Args) -> Result<(), String> {
    // Must have targets, a file, or BG_FILE
    if args.targets.is_empty() && args.file.is_none() && std::env::var_os("BG_FILE").is_none() {
        return Err("You must specify at least one target or a file with --file".to_string());
    }

    // Can't have conflicting output modes
    if args.batch && args.streaming {
        return Err("Cannot specify both --batch and --streaming modes".to_string());
    }

    // Can't have multiple output formats
    if args.json && args.csv {
        return Err("Cannot specify multiple output formats (--json, --csv)".to_string());
    }

    // Streaming mode doesn't support structured output formats
    if args.streaming && (args.json || args.csv) {
        return Err(
            "Cannot use --streaming with --json or --csv. Use --batch for structured output"
                .to_string(),
        );
    }

    if let Some(concurrency) = args.concurrency {
        if concurrency == 0 || concurrency > MAX_CONCURRENCY {
            return Err(format!(
                "Concurrency must be between 1 and {}",
                MAX_CONCURRENCY
            ));
        }
    }

    if args.repeat == Some(0) {
        return Err("Repeat count must be at least 1".to_string());
    }

    for (flag, value) in [
        ("--timeout", &args.timeout),
        ("--batch-timeout", &args.batch_timeout),
    ] {
        if let Some(value) = value {
            if parse_duration(value).is_none() {
                return Err(format!(
                    "Invalid {} '{}'. Use a format like '500ms', '5s' or '2m'",
                    flag, value
                ));
            }
        }
    }

    Ok(())
}

/// Main batch logic
async fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let settings = build_settings(&args)?;
    let targets = gather_targets(&args, &settings)?;

    let fetcher = HttpFetcher::with_timeout(settings.batch.request_timeout)?;
    let executor = BatchExecutor::with_config(&settings.batch)?;

    info!(
        requests = targets.len(),
        concurrency = settings.batch.concurrency,
        timeout = ?settings.batch.request_timeout,
        "starting batch"
    );

    // Ctrl-C cancels the batch; remaining units drain as cancelled outcomes
    let token = executor.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, cancelling outstanding requests");
            token.cancel();
        }
    });

    let units = fetcher.units(&targets);

    if should_use_streaming(&args, &settings, targets.len()) {
        run_streaming(&executor, units, &settings).await?;
    } else {
        run_batched(&executor, units, &settings).await?;
    }

    Ok(())
}

/// Determine whether to use streaming or batch mode
fn should_use_streaming(args: &Args, settings: &Settings, request_count: usize) -> bool {
    if args.batch {
        return false;
    }

    if args.streaming {
        return true;
    }

    // Stream text output for multi-request runs
    request_count > 1 && !settings.format.is_structured()
}

/// Run in streaming mode, printing each outcome as it completes.
async fn run_streaming(
    executor: &BatchExecutor,
    units: Vec<WorkUnit<FetchResponse>>,
    settings: &Settings,
) -> Result<(), Box<dyn std::error::Error>> {
    use futures::StreamExt;

    let total = units.len();
    if settings.pretty {
        ui::print_header(total, settings);
    }

    let mut tally = Tally::default();
    let mut error_stats = ErrorStats::default();
    let mut completed = 0usize;
    let start_time = Instant::now();

    let mut stream = executor.run_batch_stream(units)?;
    while let Some(entry) = stream.next().await {
        tally.record(&entry.outcome);
        if let Outcome::Failure(failure) = &entry.outcome {
            error_stats.add_failure(&entry.label, failure);
        }

        completed += 1;
        let counter = (total > 1).then_some((completed, total));
        ui::print_result(&entry.label, &entry.outcome, settings.pretty, counter);
    }

    let duration = start_time.elapsed();
    debug!(completed, ?duration, "stream drained");

    if total > 1 {
        println!();
        ui::print_summary(&tally, duration);
        if error_stats.has_errors() {
            println!();
            ui::print_error_summary(&error_stats);
        }
    }

    Ok(())
}

/// Run in batch mode (collect all outcomes first, then print in input order)
async fn run_batched(
    executor: &BatchExecutor,
    units: Vec<WorkUnit<FetchResponse>>,
    settings: &Settings,
) -> Result<(), Box<dyn std::error::Error>> {
    let total = units.len();
    let is_structured = settings.format.is_structured();

    if settings.pretty && !is_structured && total > 1 {
        ui::print_header(total, settings);
    }

    // Spinner::start returns None if stderr isn't a TTY
    let spinner = if !is_structured && total > 1 {
        ui::Spinner::start(format!("Sending {} requests...", total))
    } else {
        None
    };

    let result = executor.run_batch(units).await?;

    if let Some(s) = spinner {
        s.stop().await;
    }

    display_results(&result, settings)
}

fn display_results(
    result: &BatchResult<FetchResponse>,
    settings: &Settings,
) -> Result<(), Box<dyn std::error::Error>> {
    match settings.format {
        OutputFormat::Json => display_json_results(result, settings.json_pretty),
        OutputFormat::Csv => {
            print!("{}", format_csv(result));
            Ok(())
        }
        OutputFormat::Text => {
            display_text_results(result, settings);
            Ok(())
        }
    }
}

/// Display results in JSON format
fn display_json_results(
    result: &BatchResult<FetchResponse>,
    pretty: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let json = if pretty {
        serde_json::to_string_pretty(result)?
    } else {
        serde_json::to_string(result)?
    };
    println!("{}", json);
    Ok(())
}

/// Format results as CSV with a header row.
fn format_csv(result: &BatchResult<FetchResponse>) -> String {
    let mut out = String::from("index,target,outcome,status,detail\n");

    for entry in result.entries() {
        let (outcome, status, detail) = match &entry.outcome {
            Outcome::Success(response) => (
                "success".to_string(),
                response.status.to_string(),
                format!("{}ms", response.elapsed.as_millis()),
            ),
            Outcome::Failure(failure) => (
                failure.kind.to_string(),
                "-".to_string(),
                failure.message.clone(),
            ),
        };

        out.push_str(&format!(
            "{},{},{},{},{}\n",
            entry.index,
            csv_field(&entry.label),
            outcome,
            status,
            csv_field(&detail)
        ));
    }

    out
}

/// Quote a CSV field when it contains a separator, quote or newline.
fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Display results in human-readable text format
fn display_text_results(result: &BatchResult<FetchResponse>, settings: &Settings) {
    let mut tally = Tally::default();
    let mut error_stats = ErrorStats::default();

    for entry in result.entries() {
        tally.record(&entry.outcome);
        if let Outcome::Failure(failure) = &entry.outcome {
            error_stats.add_failure(&entry.label, failure);
        }
        ui::print_result(&entry.label, &entry.outcome, settings.pretty, None);
    }

    if result.len() > 1 {
        println!();
        ui::print_summary(&tally, result.duration());
        if error_stats.has_errors() {
            println!();
            ui::print_error_summary(&error_stats);
        }
    }
}

/// Build run settings from CLI arguments with config file integration.
///
/// Precedence order (highest to lowest):
/// 1. CLI arguments (explicit user input)
/// 2. Environment variables (BG_*)
/// 3. Local config file (./batch-gate.toml or ./.batch-gate.toml)
/// 4. Global config file (~/.batch-gate.toml)
/// 5. XDG config file (~/.config/batch-gate/config.toml)
/// 6. Built-in defaults
fn build_settings(args: &Args) -> Result<Settings, Box<dyn std::error::Error>> {
    let env_config = load_env_config();
    let config_manager = ConfigManager::new();

    // Step 1: explicit config file, or automatic discovery
    let file_config = if let Some(path) = args.config.as_ref().or(env_config.config.as_ref()) {
        info!(path = %path, "using explicit config file");
        config_manager
            .load_file(path)
            .map_err(|e| format!("Failed to load config file '{}': {}", path, e))?
    } else {
        match config_manager.discover_and_load() {
            Ok(file_config) => file_config,
            Err(e) => {
                debug!(error = %e, "config discovery failed, using defaults");
                FileConfig::default()
            }
        }
    };

    // Steps 2 and 3: environment, then CLI
    Ok(resolve_settings(args, &env_config, file_config))
}

/// Layer file config, environment and CLI arguments over the defaults.
///
/// Values are validated before they get here; anything unparseable is
/// skipped and the lower layer stays in effect.
fn resolve_settings(args: &Args, env_config: &EnvConfig, file_config: FileConfig) -> Settings {
    let mut settings = Settings::default();

    if let Some(defaults) = file_config.defaults {
        apply_batch_values(
            &mut settings.batch,
            defaults.concurrency,
            defaults.timeout.as_deref(),
            defaults.batch_timeout.as_deref(),
        );
        if let Some(repeat) = defaults.repeat {
            settings.repeat = repeat;
        }
        if let Some(pretty) = defaults.pretty {
            settings.pretty = pretty;
        }
    }

    if let Some(output) = file_config.output {
        match output.default_format.as_deref() {
            Some("json") => settings.format = OutputFormat::Json,
            Some("csv") => settings.format = OutputFormat::Csv,
            Some("text") => settings.format = OutputFormat::Text,
            _ => {}
        }
        if let Some(json_pretty) = output.json_pretty {
            settings.json_pretty = json_pretty;
        }
    }

    apply_env_config(&mut settings, env_config);
    apply_cli_args(&mut settings, args);

    settings
}

/// Apply BG_* environment values.
fn apply_env_config(settings: &mut Settings, env_config: &EnvConfig) {
    apply_batch_values(
        &mut settings.batch,
        env_config.concurrency,
        env_config.timeout.as_deref(),
        env_config.batch_timeout.as_deref(),
    );
    if let Some(repeat) = env_config.repeat {
        settings.repeat = repeat;
    }
    if let Some(pretty) = env_config.pretty {
        settings.pretty = pretty;
    }
    if let Some(file) = &env_config.file {
        settings.file = Some(file.clone());
    }

    if env_config.has_output_format_conflict() {
        warn!("both BG_JSON and BG_CSV are set, ignoring both");
    } else if env_config.json == Some(true) {
        settings.format = OutputFormat::Json;
    } else if env_config.csv == Some(true) {
        settings.format = OutputFormat::Csv;
    }
}

/// Apply CLI arguments (highest precedence).
fn apply_cli_args(settings: &mut Settings, args: &Args) {
    apply_batch_values(
        &mut settings.batch,
        args.concurrency,
        args.timeout.as_deref(),
        args.batch_timeout.as_deref(),
    );
    if let Some(repeat) = args.repeat {
        settings.repeat = repeat;
    }
    // Only override booleans when the flag is present
    if args.pretty {
        settings.pretty = true;
    }
    if let Some(file) = &args.file {
        settings.file = Some(file.clone());
    }

    if args.json {
        settings.format = OutputFormat::Json;
    } else if args.csv {
        settings.format = OutputFormat::Csv;
    } else if args.streaming {
        // Streaming is text-only, even when config asks for structured output
        settings.format = OutputFormat::Text;
    }
}

/// Override the batch values one layer sets.
fn apply_batch_values(
    batch: &mut BatchConfig,
    concurrency: Option<usize>,
    timeout: Option<&str>,
    batch_timeout: Option<&str>,
) {
    if let Some(concurrency) = concurrency {
        batch.concurrency = concurrency.clamp(1, MAX_CONCURRENCY);
    }
    if let Some(timeout) = timeout.and_then(parse_duration) {
        batch.request_timeout = timeout;
    }
    if let Some(timeout) = batch_timeout.and_then(parse_duration) {
        batch.batch_timeout = Some(timeout);
    }
}

/// Collect targets from args and file, normalize them, then apply repeat.
fn gather_targets(args: &Args, settings: &Settings) -> Result<Vec<String>, String> {
    let mut targets = Vec::new();

    for raw in &args.targets {
        let url = normalize_target(raw).map_err(|e| e.to_string())?;
        targets.push(url);
    }

    if let Some(path) = &settings.file {
        let from_file = read_targets_file(path).map_err(|e| e.to_string())?;
        info!(path = %path, count = from_file.len(), "loaded targets from file");
        targets.extend(from_file);
    }

    if targets.is_empty() {
        return Err("No targets to request".to_string());
    }

    Ok(expand_targets(&targets, settings.repeat))
}

#[cfg(test)]
mod tests {
    use super::*;
    use batch_gate_lib::{load_env_config_from, DefaultsConfig, OutputConfig};
    use std::collections::HashMap;
    use std::time::Duration;

    fn create_test_args() -> Args {
        Args {
            targets: vec!["example.com".to_string()],
            file: None,
            repeat: None,
            json: false,
            csv: false,
            pretty: false,
            batch: false,
            streaming: false,
            concurrency: None,
            timeout: None,
            batch_timeout: None,
            config: None,
            debug: false,
            verbose: false,
        }
    }

    fn env_from(vars: &[(&str, &str)]) -> EnvConfig {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        load_env_config_from(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_validate_args_accepts_defaults() {
        assert!(validate_args(&create_test_args()).is_ok());
    }

    #[test]
    fn test_validate_args_rejects_conflicts() {
        let mut args = create_test_args();
        args.json = true;
        args.csv = true;
        assert!(validate_args(&args).is_err());

        let mut args = create_test_args();
        args.batch = true;
        args.streaming = true;
        assert!(validate_args(&args).is_err());

        let mut args = create_test_args();
        args.streaming = true;
        args.json = true;
        let err = validate_args(&args).unwrap_err();
        assert!(err.contains("--batch"));
    }

    #[test]
    fn test_validate_args_rejects_bad_values() {
        let mut args = create_test_args();
        args.concurrency = Some(0);
        assert!(validate_args(&args).is_err());

        args.concurrency = Some(MAX_CONCURRENCY + 1);
        assert!(validate_args(&args).is_err());

        let mut args = create_test_args();
        args.repeat = Some(0);
        assert!(validate_args(&args).is_err());

        let mut args = create_test_args();
        args.timeout = Some("soon".to_string());
        assert!(validate_args(&args).is_err());
    }

    #[test]
    fn test_resolve_settings_defaults() {
        let settings = resolve_settings(
            &create_test_args(),
            &EnvConfig::default(),
            FileConfig::default(),
        );
        assert_eq!(settings.batch.concurrency, 20);
        assert_eq!(settings.batch.request_timeout, Duration::from_secs(5));
        assert_eq!(settings.batch.batch_timeout, None);
        assert_eq!(settings.repeat, 1);
        assert_eq!(settings.format, OutputFormat::Text);
        assert!(settings.json_pretty);
    }

    #[test]
    fn test_resolve_settings_precedence() {
        let file_config = FileConfig {
            defaults: Some(DefaultsConfig {
                concurrency: Some(5),
                timeout: Some("10s".to_string()),
                batch_timeout: Some("1m".to_string()),
                repeat: Some(3),
                pretty: Some(true),
            }),
            output: Some(OutputConfig {
                default_format: Some("csv".to_string()),
                json_pretty: Some(false),
            }),
        };
        let env_config = env_from(&[("BG_CONCURRENCY", "7"), ("BG_TIMEOUT", "2s")]);
        let mut args = create_test_args();
        args.concurrency = Some(9);

        let settings = resolve_settings(&args, &env_config, file_config);

        // CLI beats env beats file
        assert_eq!(settings.batch.concurrency, 9);
        assert_eq!(settings.batch.request_timeout, Duration::from_secs(2));
        assert_eq!(settings.batch.batch_timeout, Some(Duration::from_secs(60)));
        assert_eq!(settings.repeat, 3);
        assert!(settings.pretty);
        assert_eq!(settings.format, OutputFormat::Csv);
        assert!(!settings.json_pretty);
    }

    #[test]
    fn test_resolve_settings_output_format() {
        let env_config = env_from(&[("BG_JSON", "true")]);
        let settings = resolve_settings(&create_test_args(), &env_config, FileConfig::default());
        assert_eq!(settings.format, OutputFormat::Json);

        let mut args = create_test_args();
        args.csv = true;
        let settings = resolve_settings(&args, &env_config, FileConfig::default());
        assert_eq!(settings.format, OutputFormat::Csv);

        let conflicting = env_from(&[("BG_JSON", "1"), ("BG_CSV", "1")]);
        let settings = resolve_settings(&create_test_args(), &conflicting, FileConfig::default());
        assert_eq!(settings.format, OutputFormat::Text);
    }

    #[test]
    fn test_should_use_streaming() {
        let settings = Settings::default();
        let args = create_test_args();
        assert!(should_use_streaming(&args, &settings, 10));
        assert!(!should_use_streaming(&args, &settings, 1));

        let mut batch_args = create_test_args();
        batch_args.batch = true;
        assert!(!should_use_streaming(&batch_args, &settings, 10));

        let json = Settings {
            format: OutputFormat::Json,
            ..Settings::default()
        };
        assert!(!should_use_streaming(&args, &json, 10));
    }

    #[test]
    fn test_gather_targets_normalizes_and_repeats() {
        let mut args = create_test_args();
        args.targets = vec!["google.com".to_string(), "http://localhost:8080".to_string()];
        let settings = Settings {
            repeat: 2,
            ..Settings::default()
        };

        let targets = gather_targets(&args, &settings).unwrap();
        assert_eq!(
            targets,
            vec![
                "https://google.com",
                "http://localhost:8080",
                "https://google.com",
                "http://localhost:8080",
            ]
        );

        args.targets = vec!["ftp://nope".to_string()];
        assert!(gather_targets(&args, &settings).is_err());
    }

    #[test]
    fn test_error_category() {
        assert_eq!(
            ErrorCategory::of(&UnitFailure::action("Timeout after 5s during: GET x")),
            ErrorCategory::Timeout
        );
        assert_eq!(
            ErrorCategory::of(&UnitFailure::action("HTTP 503 from 'https://a'")),
            ErrorCategory::HttpStatus
        );
        assert_eq!(
            ErrorCategory::of(&UnitFailure::action(
                "Network error: Connection failed (source: refused)"
            )),
            ErrorCategory::Connection
        );
        assert_eq!(
            ErrorCategory::of(&UnitFailure::cancelled("batch cancelled")),
            ErrorCategory::Cancelled
        );
        assert_eq!(
            ErrorCategory::of(&UnitFailure::panicked("boom")),
            ErrorCategory::Other
        );
    }

    #[test]
    fn test_error_stats_categories() {
        let mut stats = ErrorStats::default();
        assert!(!stats.has_errors());

        stats.add_failure("https://a", &UnitFailure::action("HTTP 500 from 'https://a'"));
        stats.add_failure("https://b", &UnitFailure::cancelled("batch cancelled"));
        stats.add_failure("https://c", &UnitFailure::cancelled("batch cancelled"));

        assert!(stats.has_errors());
        let categories = stats.categories();
        assert_eq!(categories.len(), 2);
        assert_eq!(categories[0].0, "HTTP status error");
        assert_eq!(categories[1].0, "cancelled request");
        assert_eq!(categories[1].1, ["https://b", "https://c"]);
    }

    #[test]
    fn test_csv_field_quoting() {
        assert_eq!(csv_field("plain"), "plain");
        assert_eq!(csv_field("a,b"), "\"a,b\"");
        assert_eq!(csv_field("say \"hi\""), "\"say \"\"hi\"\"\"");
    }
}
