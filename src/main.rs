//! # GCS News Monitor
//!
//! Watches the Macau Government Information Bureau news listing for articles
//! that mention configured keywords and mails a digest of the new ones.
//!
//! ## Usage
//!
//! ```sh
//! gcs_news_monitor --config config_email.json
//! gcs_news_monitor --test
//! ```
//!
//! ## Architecture
//!
//! Each run is a forward-only pipeline:
//! 1. **Listing**: walk the paginated listing until pages turn stale
//! 2. **Content**: fetch article bodies concurrently
//! 3. **Filter**: keyword match, minus everything already sent
//! 4. **Notify**: render and mail the digest, then record what was sent
//!
//! The sent ledger on disk is what keeps consecutive runs from mailing the
//! same article twice.

use chrono::Utc;
use clap::Parser;
use std::process::ExitCode;
use tracing::{debug, error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod cli;
mod config;
mod filter;
mod ledger;
mod models;
mod outputs;
mod pipeline;
mod scrapers;
mod utils;

use cli::Cli;
use config::Settings;
use pipeline::{Monitor, RunMode};

/// Exit status used when the run is interrupted with Ctrl-C.
const INTERRUPTED: u8 = 130;

#[tokio::main]
async fn main() -> ExitCode {
    let args = Cli::parse();

    let settings = match Settings::load(&args.config) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::FAILURE;
        }
    };

    let _guard = init_tracing(&settings);
    debug!(config = %args.config.display(), test = args.test, "Parsed CLI arguments");

    until_interrupted(run(&args, settings), tokio::signal::ctrl_c()).await
}

/// Drive `work` to completion unless `interrupt` fires first.
///
/// An `Err` from `interrupt` (no signal handler) disables that branch and
/// `work` runs on.
async fn until_interrupted<W, I>(work: W, interrupt: I) -> ExitCode
where
    W: Future<Output = ExitCode>,
    I: Future<Output = std::io::Result<()>>,
{
    tokio::select! {
        code = work => code,
        Ok(()) = interrupt => {
            eprintln!("\ninterrupted");
            ExitCode::from(INTERRUPTED)
        }
    }
}

async fn run(args: &Cli, settings: Settings) -> ExitCode {
    let start_time = std::time::Instant::now();
    info!(version = env!("CARGO_PKG_VERSION"), "gcs_news_monitor starting up");

    let endpoint = format!("{}:{}", settings.smtp_server, settings.smtp_port);
    let mut monitor = match Monitor::from_settings(settings).await {
        Ok(monitor) => monitor,
        Err(e) => {
            error!(error = %e, "Failed to initialize monitor");
            return ExitCode::FAILURE;
        }
    };

    if args.send_test_email {
        return if monitor.send_test_email(Utc::now(), &endpoint).await {
            ExitCode::SUCCESS
        } else {
            ExitCode::FAILURE
        };
    }

    let mode = if args.test { RunMode::DryRun } else { RunMode::Live };
    let summary = monitor.run(mode, Utc::now()).await;

    let elapsed = start_time.elapsed();
    info!(
        ?elapsed,
        listed = summary.listed,
        matched = summary.matched,
        sent = summary.sent,
        "Execution complete"
    );
    ExitCode::SUCCESS
}

/// Console plus append-only file logging. `RUST_LOG` overrides `log_level`.
fn init_tracing(settings: &Settings) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(settings.log_directive()));

    let log_file = settings
        .log_file
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .map_or(Ok(()), std::fs::create_dir_all)
        .and_then(|()| {
            std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&settings.log_file)
        });

    let (file_layer, guard, file_error) = match log_file {
        Ok(file) => {
            let (writer, guard) = tracing_appender::non_blocking(file);
            let layer = tfmt::layer()
                .with_ansi(false)
                .with_target(true)
                .with_timer(UtcTime::rfc_3339())
                .with_writer(writer);
            (Some(layer), Some(guard), None)
        }
        Err(e) => (None, None, Some(e)),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tfmt::layer()
                .with_target(true)
                .with_file(false)
                .with_line_number(false)
                .with_timer(UtcTime::rfc_3339()),
        )
        .with(file_layer)
        .init();

    if let Some(e) = file_error {
        warn!(
            path = %settings.log_file.display(),
            error = %e,
            "Cannot open log file; logging to console only"
        );
    }
    guard
}
