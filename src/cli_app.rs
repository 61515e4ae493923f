//! Top-level CLI definition and dispatch.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use clap::Parser;
use colored::{Colorize, control};
use thiserror::Error;

use dirtop::core::config::Config;
use dirtop::core::errors::DtpError;
use dirtop::logger::failures::{
    FailureSink, FileFailureSink, StderrFailureSink, TraversalFailure,
};
use dirtop::report;
use dirtop::scanner::aggregate::SizeAggregator;
use dirtop::scanner::filter::IgnoreFilter;
use dirtop::scanner::gate::IoGate;
use dirtop::scanner::rank::top_n;

/// dirtop — find the largest directories under a root path.
#[derive(Debug, Parser)]
#[command(
    name = "dirtop",
    author,
    version,
    about = "Report the N largest directories under a root path",
    long_about = None
)]
pub struct Cli {
    /// Root directory to survey.
    root: PathBuf,
    /// Number of largest directories to report.
    #[arg(default_value_t = 10, value_name = "COUNT")]
    count: usize,
    /// Override config file path.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Minimum aggregate size in bytes for a directory to be reported.
    #[arg(long, value_name = "BYTES")]
    threshold: Option<u64>,
    /// Maximum filesystem operations in flight at once.
    #[arg(long, value_name = "N")]
    max_concurrent: Option<usize>,
    /// Where to persist the ranked report.
    #[arg(long, value_name = "PATH")]
    report_file: Option<PathBuf>,
    /// Where to append failure notices.
    #[arg(long, value_name = "PATH")]
    error_log: Option<PathBuf>,
    /// Emit the report as JSON on stdout instead of the human layout.
    #[arg(long)]
    json: bool,
    /// Disable colored output.
    #[arg(long)]
    no_color: bool,
    /// Print each directory as it is processed.
    #[arg(short, long, conflicts_with = "quiet")]
    verbose: bool,
    /// Quiet mode (errors only).
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

/// CLI error type with explicit exit-code mapping.
#[derive(Debug, Error)]
pub enum CliError {
    /// Invalid user input at runtime.
    #[error("{0}")]
    User(String),
    /// Environment/runtime failure.
    #[error("{0}")]
    Runtime(String),
    /// JSON serialization failed.
    #[error("failed to serialize output: {0}")]
    Json(#[from] serde_json::Error),
}

impl CliError {
    /// Process exit code contract for the CLI.
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::User(_) => 1,
            Self::Runtime(_) => 2,
            Self::Json(_) => 3,
        }
    }
}

fn map_config_error(err: DtpError) -> CliError {
    match err {
        DtpError::InvalidConfig { .. }
        | DtpError::MissingConfig { .. }
        | DtpError::ConfigParse { .. } => CliError::User(err.to_string()),
        _ => CliError::Runtime(err.to_string()),
    }
}

/// Run the survey end to end: config → sink → gate → aggregator → ranker →
/// report. A report that cannot be persisted is logged and surfaced but does
/// not change the computed results or the exit status.
pub fn run(cli: &Cli) -> Result<(), CliError> {
    if cli.no_color {
        control::set_override(false);
    }

    let mut config = Config::load(cli.config.as_deref()).map_err(map_config_error)?;
    if let Some(threshold) = cli.threshold {
        config.traversal.min_size_threshold_bytes = threshold;
    }
    if let Some(max_concurrent) = cli.max_concurrent {
        if max_concurrent == 0 {
            return Err(CliError::User(
                "--max-concurrent must be at least 1".to_string(),
            ));
        }
        config.traversal.max_concurrent = max_concurrent;
    }
    if let Some(path) = &cli.report_file {
        config.output.report_file.clone_from(path);
    }
    if let Some(path) = &cli.error_log {
        config.output.error_log.clone_from(path);
    }

    // Failures must be recorded somewhere even if the log file is unusable.
    let sink: Arc<dyn FailureSink> = match FileFailureSink::open(&config.output.error_log) {
        Ok(file_sink) => Arc::new(file_sink),
        Err(err) => {
            eprintln!(
                "dirtop: cannot open {}: {err}; failure notices go to stderr",
                config.output.error_log.display()
            );
            Arc::new(StderrFailureSink)
        }
    };

    let gate = IoGate::new(config.traversal.max_concurrent)
        .map_err(|e| CliError::Runtime(e.to_string()))?;
    let filter = IgnoreFilter::from_config(&config.ignore);
    let mut aggregator = SizeAggregator::new(
        gate,
        filter,
        config.traversal.min_size_threshold_bytes,
        Arc::clone(&sink),
    );
    if cli.verbose {
        aggregator = aggregator
            .with_progress(|path| println!("Processing directory: {}", path.display()));
    }

    // JSON mode keeps stdout machine-readable; status chatter is off there.
    let chatty = !cli.quiet && !cli.json;
    if chatty {
        println!("Starting directory traversal: {}", cli.root.display());
    }

    let started = Instant::now();
    let outcome = aggregator
        .measure(&cli.root)
        .map_err(|e| CliError::Runtime(e.to_string()))?;
    let elapsed = started.elapsed();

    let ranked = top_n(&outcome.sizes, cli.count);

    let rendered = report::render_text(&ranked, cli.count, elapsed);
    match report::persist(&config.output.report_file, &rendered) {
        Ok(()) => {
            if chatty {
                println!("Results saved to {}", config.output.report_file.display());
            }
        }
        Err(err) => {
            sink.record(&TraversalFailure::report_write(
                &config.output.report_file,
                &err,
            ));
            eprintln!(
                "dirtop: failed to write results to {}: {err}",
                config.output.report_file.display()
            );
        }
    }

    if cli.json {
        let payload = report::render_json(&cli.root, &ranked, cli.count, elapsed);
        println!("{}", serde_json::to_string_pretty(&payload)?);
        return Ok(());
    }

    if !cli.quiet {
        let header = format!("Top {} Largest Directories:", cli.count);
        println!("\n{}", header.as_str().bold());
        for (index, entry) in ranked.iter().enumerate() {
            println!(
                "{}. {} - {} GB",
                index + 1,
                entry.path.display(),
                report::format_gb(entry.total_bytes)
            );
        }
        println!(
            "\nScanned {} directories and {} files ({} failures logged)",
            outcome.stats.dirs_listed, outcome.stats.files_statted, outcome.stats.failures
        );
        println!("\nExecution Time: {:.2} seconds", elapsed.as_secs_f64());
    }

    Ok(())
}
