//! Scrapers for the Government Information Bureau (GCS) news site.
//!
//! Scraping follows a two-phase pattern:
//!
//! 1. **Indexing** ([`gcs`]): walk the paginated listing, stop once pages turn
//!    stale, and keep the recent, unique entries
//! 2. **Fetching** ([`content`]): download every detail page concurrently and
//!    extract readable body text
//!
//! Failures in either phase are logged and turned into empty results; they
//! never abort the run.

pub mod content;
pub mod gcs;

use reqwest::Client;
use std::time::Duration;

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

/// Shared HTTP client used for both listing and detail requests.
pub fn http_client(timeout: Duration) -> reqwest::Result<Client> {
    Client::builder()
        .user_agent(USER_AGENT)
        .timeout(timeout)
        .build()
}

/// Fetch `url` and decode the body as UTF-8 regardless of the declared charset.
pub(crate) async fn get_html(client: &Client, url: &str) -> reqwest::Result<String> {
    let bytes = client
        .get(url)
        .send()
        .await?
        .error_for_status()?
        .bytes()
        .await?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}
