//! CLI binary for pero-batch.
//!
//! A thin shim over the library crate that maps CLI flags and the
//! `.ocrtools.yml` settings to `BatchConfig`, runs one mode and turns the
//! outcome into a process exit code.

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use pero_batch::settings::{self, SettingsSource};
use pero_batch::{
    cancel_pair, cancel_request, download_only, list_engines, run_batch, BatchConfig,
    BatchProgressCallback, BatchReport, CancelToken, EngineDescriptor, ExponentialBackoff,
    OcrBatchError, ProgressCallback, Stage, EXIT_PARTIAL_FAILURE,
};
use std::fs::OpenOptions;
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Log file appended to inside the processed directory.
const LOG_FILE_NAME: &str = "ocr_log.txt";

/// First delay of `--backoff`; doubles up to `--poll-interval`.
const BACKOFF_INITIAL_SECS: u64 = 5;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: one bar reused for every stage, with a log
/// line per file printed above it.
struct CliProgressCallback {
    bar: ProgressBar,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Scanning directory…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            errors: AtomicUsize::new(0),
        })
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

fn stage_label(stage: Stage) -> &'static str {
    match stage {
        Stage::Upload => "Uploading",
        Stage::Poll => "Waiting for OCR",
        Stage::Download => "Downloading",
    }
}

impl BatchProgressCallback for CliProgressCallback {
    fn on_stage_start(&self, stage: Stage, total: usize) {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>4}/{len} images  \
             ⏱ {elapsed_precise}  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        self.bar.reset();
        self.bar.set_style(style);
        self.bar.set_length(total as u64);
        self.bar.set_prefix(stage_label(stage));
        self.bar.set_message("");
    }

    fn on_item_complete(&self, stage: Stage, path: &Path) {
        self.bar.println(format!(
            "  {} {:<8} {}",
            green("✓"),
            stage,
            dim(&path.display().to_string())
        ));
        self.bar.inc(1);
    }

    fn on_item_error(&self, stage: Stage, path: &Path, error: &str) {
        self.errors.fetch_add(1, Ordering::SeqCst);
        let msg = if error.chars().count() > 100 {
            format!("{}\u{2026}", error.chars().take(99).collect::<String>())
        } else {
            error.to_string()
        };
        self.bar.println(format!(
            "  {} {:<8} {}  {}",
            red("✗"),
            stage,
            path.display(),
            red(&msg)
        ));
        self.bar.inc(1);
    }

    fn on_poll(&self, attempt: u32, done: usize, _total: usize) {
        self.bar.set_position(done as u64);
        self.bar.set_message(format!("check #{attempt}"));
    }

    fn on_stage_complete(&self, stage: Stage, succeeded: usize, failed: usize) {
        let mark = if failed == 0 { green("✔") } else { cyan("⚠") };
        self.bar.println(format!(
            "{} {}: {} ok, {} failed",
            mark,
            bold(stage_label(stage)),
            succeeded,
            failed
        ));
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # OCR every scan under a directory, results written beside each image
  pero-batch -d scans/

  # Use engine 2 and check every 30 seconds, give up after an hour
  pero-batch -d scans/ -e 2 --poll-interval 30 --max-wait 3600

  # Fetch the results of an earlier request again
  pero-batch -d scans/ --pull-only 5f8c2e4a-...

  # Cancel a request
  pero-batch -c 5f8c2e4a-...

  # List available engines
  pero-batch --engines

SETTINGS (~/.ocrtools.yml, then ./.ocrtools.yml):
  pero:
    api_key: api-key-here
    endpoint: https://pero-ocr.fit.vutbr.cz/api/
    default_engine: 1

  A default file is written to the home directory on first run.

EXIT CODES:
  0 ok  1 transport/usage  2 not a directory  3 scan/no images  4 config
  5 service rejected  6 engine/submission  7 decode  8 request not found
  9 request not owned  10 unexpected HTTP status  11 key  12 some files failed
  13 poll limit  14 internal  130 cancelled
"#;

/// Batch OCR of a directory through the PERO OCR service.
#[derive(Parser, Debug)]
#[command(
    name = "pero-batch",
    version,
    about = "Batch OCR of a directory through the PERO OCR service",
    long_about = "Uploads every .tif/.tiff/.jpg/.jpeg/.png/.jp2/.jp2k image under a directory to \
PERO OCR, waits until recognition is done and writes <name>.txt (plain text) and <name>.xml \
(ALTO) beside each image. TIFF files are converted to JPEG before upload.",
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Directory to OCR in place.
    #[arg(short, long)]
    dir: Option<PathBuf>,

    /// OCR engine id (default: pero.default_engine from settings).
    #[arg(short, long, env = "PERO_ENGINE")]
    engine: Option<i64>,

    /// Cancel the request with this id and exit.
    #[arg(short, long, value_name = "ID", conflicts_with_all = ["pull_only", "engines"])]
    cancel: Option<String>,

    /// Only download txt + alto for this request id.
    #[arg(long, value_name = "ID")]
    pull_only: Option<String>,

    /// Print the engines available to this API key and exit.
    #[arg(long, conflicts_with = "pull_only")]
    engines: bool,

    /// Settings file (default: ~/.ocrtools.yml, then ./.ocrtools.yml).
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// API key, overrides the settings file.
    #[arg(long, env = "PERO_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Service endpoint, overrides the settings file.
    #[arg(long, env = "PERO_ENDPOINT")]
    endpoint: Option<String>,

    /// Seconds between status checks.
    #[arg(long, value_name = "SECS")]
    poll_interval: Option<u64>,

    /// Give up after this many status checks.
    #[arg(long, value_name = "N", value_parser = clap::value_parser!(u32).range(1..))]
    max_polls: Option<u32>,

    /// Give up after waiting this many seconds for OCR.
    #[arg(long, value_name = "SECS")]
    max_wait: Option<u64>,

    /// Exponential poll delay: 5s doubling up to --poll-interval.
    #[arg(long)]
    backoff: bool,

    /// Images whose results are downloaded at once.
    #[arg(long, value_name = "N", default_value_t = 1)]
    download_concurrency: usize,

    /// Print the final report as JSON on stdout.
    #[arg(long)]
    json: bool,

    /// Disable progress bar.
    #[arg(long)]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long)]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long)]
    quiet: bool,
}

impl Cli {
    fn show_progress(&self) -> bool {
        !self.quiet && !self.no_progress && !self.json && self.cancel.is_none() && !self.engines
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let _guard = match init_logging(&cli) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("{} {:#}", red("✘"), e);
            return ExitCode::from(1);
        }
    };

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            let code = e
                .downcast_ref::<OcrBatchError>()
                .map(OcrBatchError::exit_code)
                .unwrap_or(1);
            error!("{:#}", e);
            ExitCode::from(code)
        }
    }
}

// ── Logging setup ────────────────────────────────────────────────────────
// stderr follows -v/-q (errors only while the progress bar is up); the log
// file in the processed directory always gets INFO, or DEBUG with -v.
// RUST_LOG overrides both.
fn init_logging(cli: &Cli) -> Result<Option<WorkerGuard>> {
    let console_level = if cli.verbose {
        "debug"
    } else if cli.quiet || cli.show_progress() {
        "error"
    } else {
        "info"
    };
    let file_level = if cli.verbose { "debug" } else { "info" };

    let console_layer = tracing_subscriber::fmt::layer()
        .with_writer(io::stderr)
        .with_target(false)
        .with_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(console_level)),
        );

    let log_dir = cli
        .dir
        .as_deref()
        .filter(|d| d.is_dir() && cli.cancel.is_none() && !cli.engines);
    let (file_layer, guard) = if let Some(dir) = log_dir {
        let path = dir.join(LOG_FILE_NAME);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("open log file: {}", path.display()))?;
        let (non_blocking, guard) = tracing_appender::non_blocking(file);
        let layer = tracing_subscriber::fmt::layer()
            .with_writer(non_blocking)
            .with_ansi(false)
            .with_target(false)
            .with_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(file_level)),
            );
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow!("failed to init logging: {e}"))?;

    Ok(guard)
}

async fn run(cli: Cli) -> Result<ExitCode> {
    // ── Settings ─────────────────────────────────────────────────────────
    let settings = match settings::load_or_init(cli.config.as_deref()).await? {
        SettingsSource::Loaded { settings, path } => {
            info!("Using settings {}", path.display());
            settings
        }
        SettingsSource::Created { path } => {
            eprintln!(
                "Created default config, please set it up in: {}",
                bold(&path.display().to_string())
            );
            return Ok(ExitCode::SUCCESS);
        }
    };

    let (cancel_handle, cancel_token) = cancel_pair();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, stopping (press Ctrl-C again to abort immediately)");
            cancel_handle.cancel();
            if tokio::signal::ctrl_c().await.is_ok() {
                std::process::exit(130);
            }
        }
    });

    let progress = if cli.show_progress() {
        Some(CliProgressCallback::new())
    } else {
        None
    };
    let config = build_config(
        &cli,
        &settings,
        progress
            .clone()
            .map(|cb| cb as Arc<dyn BatchProgressCallback>),
        cancel_token,
    )?;

    // ── Admin modes ──────────────────────────────────────────────────────
    if let Some(ref id) = cli.cancel {
        cancel_request(&config, id).await?;
        println!("OK cancel req: {id}");
        return Ok(ExitCode::SUCCESS);
    }
    if cli.engines {
        let engines = list_engines(&config).await?;
        print!("{}", render_engines(&engines));
        return Ok(ExitCode::SUCCESS);
    }

    let Some(ref dir) = cli.dir else {
        eprintln!("-d/--dir is mandatory (see --help)");
        return Ok(ExitCode::from(1));
    };

    // ── Batch / pull-only ────────────────────────────────────────────────
    let result = match cli.pull_only {
        Some(ref id) => {
            info!("Starting standalone txt + alto download for {}", id);
            download_only(dir, id, &config).await
        }
        None => run_batch(dir, &config).await,
    };
    if let Some(ref cb) = progress {
        cb.finish();
    }
    let report = result?;

    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("Failed to serialise report")?
        );
    } else if !cli.quiet {
        print_summary(&report);
    }

    if report.has_failures() {
        Ok(ExitCode::from(EXIT_PARTIAL_FAILURE))
    } else {
        Ok(ExitCode::SUCCESS)
    }
}

/// Settings file first, then flags and environment on top.
fn build_config(
    cli: &Cli,
    settings: &settings::Settings,
    progress: Option<ProgressCallback>,
    cancel: CancelToken,
) -> Result<BatchConfig> {
    let mut builder = settings
        .apply(BatchConfig::builder())
        .download_concurrency(cli.download_concurrency)
        .cancel_token(cancel);

    if let Some(ref key) = cli.api_key {
        builder = builder.api_key(key);
    }
    if let Some(ref endpoint) = cli.endpoint {
        builder = builder.endpoint(endpoint);
    }
    if let Some(engine) = cli.engine {
        builder = builder.engine_id(engine);
    }
    if let Some(secs) = cli.poll_interval {
        builder = builder.poll_interval_secs(secs);
    }
    if cli.backoff {
        let max = cli
            .poll_interval
            .or(settings.pero.poll_interval_secs)
            .unwrap_or(60);
        builder = builder.poll_schedule(Arc::new(ExponentialBackoff::new(
            Duration::from_secs(BACKOFF_INITIAL_SECS),
            Duration::from_secs(max),
        )));
    }
    if let Some(n) = cli.max_polls {
        builder = builder.max_poll_attempts(n);
    }
    if let Some(secs) = cli.max_wait {
        builder = builder.max_poll_duration_secs(secs);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    Ok(builder.build()?)
}

fn print_summary(report: &BatchReport) {
    let mark = if report.has_failures() {
        cyan("⚠")
    } else {
        green("✔")
    };
    eprintln!(
        "{}  request {}  {}/{} processed  {} files saved  {}ms",
        mark,
        bold(&report.request_id),
        report.processed,
        report.discovered,
        report.artifacts_saved,
        report.total_duration_ms
    );
    for failure in &report.failures {
        eprintln!("   {} {}", red("✗"), failure);
    }
}

/// Left-aligned `id  name  description` table; missing descriptions print as `N/A`.
fn render_engines(engines: &[EngineDescriptor]) -> String {
    let header = ["id", "name", "description"];
    let rows: Vec<[String; 3]> = engines
        .iter()
        .map(|e| {
            [
                e.id.to_string(),
                e.name.clone(),
                e.description.clone().unwrap_or_else(|| "N/A".to_string()),
            ]
        })
        .collect();

    let mut widths = header.map(str::len);
    for row in &rows {
        for (w, cell) in widths.iter_mut().zip(row) {
            *w = (*w).max(cell.chars().count());
        }
    }

    let line = |cells: [&str; 3]| {
        format!(
            "{:<w0$} {:<w1$} {}\n",
            cells[0],
            cells[1],
            cells[2],
            w0 = widths[0],
            w1 = widths[1]
        )
    };
    let mut out = line(header);
    for row in &rows {
        out.push_str(&line([&row[0], &row[1], &row[2]]));
    }
    out
}
