//! Command-line interface definitions for the GCS news monitor.

use clap::Parser;
use std::path::PathBuf;

/// Command-line arguments.
///
/// # Examples
///
/// ```sh
/// # Normal scheduled run
/// gcs_news_monitor --config /etc/gcs_news_monitor/config_email.json
///
/// # See what would be sent without sending anything
/// gcs_news_monitor --test
///
/// # Check the SMTP settings
/// gcs_news_monitor --send-test-email
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Dry run: crawl and filter, print matches, send nothing
    #[arg(long)]
    pub test: bool,

    /// Path to the settings file (JSON, or YAML with a .yaml/.yml extension)
    #[arg(short, long, default_value = "config_email.json")]
    pub config: PathBuf,

    /// Send a transport check email and exit
    #[arg(long, conflicts_with = "test")]
    pub send_test_email: bool,
}
