//! GCS news listing scraper and pagination.
//!
//! The listing at `https://www.gcs.gov.mo/list/zh-hant/news/` renders one
//! `tr.infiniteItem` row per article. Later pages are served by the same
//! endpoint through a Wicket "next items" query carrying the page number.
//!
//! # Stop rule
//!
//! Pages are ordered newest first, so once at least 80% of a page is older
//! than the recency window the following pages can only be older still and
//! pagination stops after that page.

use crate::models::ArticleStub;
use crate::scrapers::get_html;
use crate::utils::{canonical_url, normalize_whitespace, parse_listing_time};
use chrono::{DateTime, Duration, Utc};
use itertools::Itertools;
use once_cell::sync::Lazy;
use reqwest::Client;
use scraper::{ElementRef, Html, Selector};
use tokio::time::sleep;
use tracing::{debug, error, info, instrument, warn};
use url::Url;

static ITEM_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("tr.infiniteItem").expect("valid item selector"));
static TITLE_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("h5").expect("valid title selector"));
static LINK_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"a[href*="/detail/"]"#).expect("valid link selector"));
static TIME_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("time.render_timeago_css[datetime]").expect("valid time selector")
});

/// Share of stale items on a page, in tenths, that ends pagination.
const STALE_STOP_TENTHS: usize = 8;

/// A paginated listing of article stubs.
///
/// An empty page means "nothing more to read", whether the listing really
/// ended or the request failed.
pub trait ListingSource {
    async fn fetch_page(&self, page: usize) -> Vec<ArticleStub>;
}

/// The live GCS listing.
#[derive(Debug, Clone)]
pub struct GcsListing {
    client: Client,
    base_url: Url,
}

impl GcsListing {
    pub fn new(client: Client, base_url: Url) -> Self {
        Self { client, base_url }
    }

    /// URL of listing page `page` (0-based).
    pub fn page_url(&self, page: usize) -> String {
        if page == 0 {
            self.base_url.to_string()
        } else {
            format!(
                "{}?0-1.0-infoContent-infoTable-nextItems&nextPage={}",
                self.base_url, page
            )
        }
    }
}

impl ListingSource for GcsListing {
    #[instrument(level = "info", skip(self))]
    async fn fetch_page(&self, page: usize) -> Vec<ArticleStub> {
        let url = self.page_url(page);
        debug!(%url, "Fetching listing page");

        match get_html(&self.client, &url).await {
            Ok(html) => {
                let stubs = parse_listing(&html, &self.base_url);
                debug!(count = stubs.len(), "Parsed listing page");
                stubs
            }
            Err(e) => {
                error!(%url, error = %e, "Listing page fetch failed");
                Vec::new()
            }
        }
    }
}

/// Extract article stubs from one listing page, in document order.
///
/// Rows without a title or a detail link are skipped; a missing or
/// unparseable timestamp leaves `publish_time` empty.
pub fn parse_listing(html: &str, base_url: &Url) -> Vec<ArticleStub> {
    let document = Html::parse_document(html);
    document
        .select(&ITEM_SELECTOR)
        .enumerate()
        .filter_map(|(index, row)| parse_row(row, base_url, index))
        .collect()
}

fn parse_row(row: ElementRef<'_>, base_url: &Url, index: usize) -> Option<ArticleStub> {
    let title = row
        .select(&TITLE_SELECTOR)
        .next()
        .map(|h5| normalize_whitespace(&h5.text().collect::<String>()))
        .filter(|title| !title.is_empty());
    let Some(title) = title else {
        debug!(index, "Listing row without title; skipping");
        return None;
    };

    let href = row
        .select(&LINK_SELECTOR)
        .next()
        .and_then(|a| a.value().attr("href"))
        .map(str::trim)
        .filter(|href| !href.is_empty());
    let Some(href) = href else {
        debug!(index, %title, "Listing row without detail link; skipping");
        return None;
    };

    let url = match base_url.join(href) {
        Ok(resolved) => canonical_url(resolved.as_str()),
        Err(e) => {
            warn!(index, %href, error = %e, "Unresolvable detail link; skipping");
            return None;
        }
    };

    let mut stub = ArticleStub::new(url, title);
    if let Some(raw) = row
        .select(&TIME_SELECTOR)
        .next()
        .and_then(|t| t.value().attr("datetime"))
    {
        match parse_listing_time(raw) {
            Some(ts) => stub = stub.with_publish_time(ts),
            None => debug!(index, %raw, "Unparseable publish time"),
        }
    }
    Some(stub)
}

/// Sequential, self-limiting walk over a [`ListingSource`].
#[derive(Debug, Clone)]
pub struct Pagination {
    pub max_pages: usize,
    pub recency_window: Duration,
    /// Pause between consecutive page requests.
    pub page_delay: std::time::Duration,
}

impl Pagination {
    /// Collect unique stubs published within the recency window.
    ///
    /// Stubs without a timestamp are kept, since they cannot be shown to be
    /// stale. The first occurrence of a link wins.
    #[instrument(level = "info", skip_all, fields(max_pages = self.max_pages))]
    pub async fn collect_recent_articles<S: ListingSource>(
        &self,
        source: &S,
        now: DateTime<Utc>,
    ) -> Vec<ArticleStub> {
        let cutoff = now
            .checked_sub_signed(self.recency_window)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let mut accumulated = Vec::new();

        for page in 0..self.max_pages {
            let stubs = source.fetch_page(page).await;
            if stubs.is_empty() {
                info!(page = page + 1, "Listing page empty; stopping");
                break;
            }

            let on_page = stubs.len();
            let stale = stubs
                .iter()
                .filter(|s| s.publish_time.is_some_and(|ts| ts < cutoff))
                .count();
            accumulated.extend(stubs);
            info!(page = page + 1, items = on_page, stale, "Fetched listing page");

            if stale * 10 >= on_page * STALE_STOP_TENTHS {
                info!(page = page + 1, "Listing page mostly stale; stopping");
                break;
            }

            if page + 1 < self.max_pages && !self.page_delay.is_zero() {
                sleep(self.page_delay).await;
            }
        }

        let total = accumulated.len();
        let unique = dedupe_by_url(accumulated);
        let unique_count = unique.len();
        let recent = retain_recent(unique, cutoff);

        info!(
            total,
            unique = unique_count,
            recent = recent.len(),
            "Collected listing entries"
        );
        recent
    }
}

/// Drop repeated links, keeping the first occurrence.
pub fn dedupe_by_url(stubs: Vec<ArticleStub>) -> Vec<ArticleStub> {
    stubs.into_iter().unique_by(|s| s.url.clone()).collect()
}

/// Keep stubs published at or after `cutoff`, or with no timestamp at all.
pub fn retain_recent(stubs: Vec<ArticleStub>, cutoff: DateTime<Utc>) -> Vec<ArticleStub> {
    stubs
        .into_iter()
        .filter(|s| s.publish_time.is_none_or(|ts| ts >= cutoff))
        .collect()
}
