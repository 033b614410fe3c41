//! One monitoring run, end to end.
//!
//! [`Monitor`] owns everything a run needs (settings, HTTP client, loaded
//! ledger, listing source and mailer) and walks the stages in order:
//!
//! 1. **Listing**: paginate and keep recent, unique stubs
//! 2. **Content**: fetch article bodies concurrently (optional)
//! 3. **Filter**: keep keyword matches not yet sent
//! 4. **Notify**: render the digest, send it, commit the ledger
//!
//! Data only flows forward; no stage revisits an earlier one.

use crate::config::Settings;
use crate::filter::filter_new_matches;
use crate::ledger::LedgerStore;
use crate::models::{ArticleStub, SentLedger};
use crate::outputs::digest::DigestRenderer;
use crate::outputs::email::{Mailer, SmtpMailer, send_digest};
use crate::scrapers::content::fetch_bodies;
use crate::scrapers::gcs::{GcsListing, ListingSource, Pagination};
use crate::scrapers::http_client;
use crate::utils::truncate_chars;
use chrono::{DateTime, Offset, Utc};
use reqwest::Client;
use thiserror::Error;
use tracing::{info, instrument, warn};
use url::Url;

const DRY_RUN_PREVIEW_CHARS: usize = 100;

#[derive(Debug, Error)]
pub enum SetupError {
    #[error("cannot build HTTP client: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid news_url: {0}")]
    Url(#[from] url::ParseError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Crawl, filter and send.
    Live,
    /// Crawl and filter, report matches, never send or touch the ledger.
    DryRun,
}

/// Counts observed during one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub listed: usize,
    pub matched: usize,
    pub sent: bool,
}

pub struct Monitor<L, M> {
    settings: Settings,
    client: Client,
    listing: L,
    mailer: M,
    store: LedgerStore,
    ledger: SentLedger,
    renderer: DigestRenderer,
}

impl Monitor<GcsListing, SmtpMailer> {
    /// Wire up the live GCS listing and SMTP transport.
    pub async fn from_settings(settings: Settings) -> Result<Self, SetupError> {
        let client = http_client(settings.request_timeout())?;
        let listing = GcsListing::new(client.clone(), Url::parse(&settings.news_url)?);
        let mailer = SmtpMailer::from_settings(&settings);
        Ok(Self::new(settings, client, listing, mailer).await)
    }
}

impl<L: ListingSource, M: Mailer> Monitor<L, M> {
    /// Build a monitor and load the sent ledger from disk.
    pub async fn new(settings: Settings, client: Client, listing: L, mailer: M) -> Self {
        let store = LedgerStore::new(settings.sent_news_file.clone());
        let ledger = store.load().await;
        let renderer = DigestRenderer {
            subject_prefix: settings.email_subject_prefix.clone(),
            preview_chars: settings.preview_chars,
            display_offset: settings.display_offset().unwrap_or_else(|| Utc.fix()),
        };
        Self {
            settings,
            client,
            listing,
            mailer,
            store,
            ledger,
            renderer,
        }
    }

    pub fn ledger(&self) -> &SentLedger {
        &self.ledger
    }

    #[instrument(level = "info", skip(self, now))]
    pub async fn run(&mut self, mode: RunMode, now: DateTime<Utc>) -> RunSummary {
        info!("GCS news monitor run starting");
        let mut summary = RunSummary::default();

        let pagination = Pagination {
            max_pages: self.settings.max_pages,
            recency_window: self.settings.recency_window(),
            page_delay: self.settings.page_delay(),
        };
        let stubs = pagination.collect_recent_articles(&self.listing, now).await;
        summary.listed = stubs.len();
        if stubs.is_empty() {
            warn!("No articles retrieved from the listing");
            return summary;
        }

        let stubs = self.populate_content(stubs).await;
        let matches = filter_new_matches(&stubs, &self.settings.keywords, &self.ledger);
        summary.matched = matches.len();

        if mode == RunMode::DryRun {
            report_dry_run(&stubs, &matches);
            return summary;
        }

        if matches.is_empty() {
            info!("No new matching articles");
        } else {
            let digest = self.renderer.render(&matches, now);
            summary.sent = send_digest(&self.mailer, &digest, &mut self.ledger, &self.store).await;
            info!(count = matches.len(), sent = summary.sent, "Run finished");
        }
        summary
    }

    /// Populate article bodies unless content checking is disabled.
    async fn populate_content(&self, stubs: Vec<ArticleStub>) -> Vec<ArticleStub> {
        if !self.settings.check_content {
            info!("Content checking disabled; matching on titles only");
            return stubs;
        }
        fetch_bodies(&self.client, stubs, self.settings.concurrent_requests).await
    }

    /// Send a fixed message through the configured transport.
    #[instrument(level = "info", skip_all)]
    pub async fn send_test_email(&self, now: DateTime<Utc>, endpoint: &str) -> bool {
        let message = self.renderer.render_transport_check(now, endpoint);
        match self.mailer.deliver(&message).await {
            Ok(()) => {
                info!(recipients = %self.mailer.recipients().join(", "), "Test email sent");
                true
            }
            Err(e) => {
                warn!(error = %e, "Test email failed");
                false
            }
        }
    }
}

fn report_dry_run(stubs: &[ArticleStub], matches: &[ArticleStub]) {
    info!(total = stubs.len(), matched = matches.len(), "Dry run results");
    if matches.is_empty() {
        info!("No articles contain the configured keywords");
    }
    for (i, item) in matches.iter().enumerate() {
        let preview = item
            .content
            .as_deref()
            .filter(|c| !c.is_empty())
            .map(|c| truncate_chars(c, DRY_RUN_PREVIEW_CHARS, "..."))
            .unwrap_or_default();
        info!(n = i + 1, title = %item.title, url = %item.url, %preview, "Match");
    }
    info!("Dry run: no email sent, ledger untouched");
}
