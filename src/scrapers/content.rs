//! Article body extraction.
//!
//! Detail pages are fetched concurrently (bounded by `concurrent_requests`)
//! and reduced to plain text. Extraction tries, in order:
//!
//! 1. every `<p>` longer than 20 characters that is not a "跳至…" skip link
//! 2. the first of `<main>`, `<article>`, `div.content`
//! 3. the `og:description` meta tag
//!
//! A failed fetch leaves an empty body for that article only.

use crate::models::ArticleStub;
use crate::scrapers::get_html;
use crate::utils::{normalize_whitespace, truncate_for_log};
use futures::stream::{self, StreamExt};
use once_cell::sync::Lazy;
use reqwest::Client;
use scraper::{Html, Selector};
use tracing::{debug, info, instrument};

static PARAGRAPH_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("p").expect("valid paragraph selector"));
static CONTAINER_SELECTORS: Lazy<Vec<Selector>> = Lazy::new(|| {
    ["main", "article", "div.content"]
        .iter()
        .map(|s| Selector::parse(s).expect("valid container selector"))
        .collect()
});
static OG_DESCRIPTION_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(r#"meta[property="og:description"]"#).expect("valid meta selector")
});

/// Paragraphs must be strictly longer than this many characters.
const MIN_PARAGRAPH_CHARS: usize = 20;
/// Accessibility "skip to content" links start with this.
const SKIP_LINK_PREFIX: &str = "跳至";
const PROGRESS_EVERY: usize = 10;

/// Fill in `content` for every stub.
///
/// Results are written back by position, so completion order does not
/// matter. Every stub leaves with `Some(content)`, empty on failure.
#[instrument(level = "info", skip_all, fields(count = stubs.len(), concurrency = concurrency))]
pub async fn fetch_bodies(
    client: &Client,
    mut stubs: Vec<ArticleStub>,
    concurrency: usize,
) -> Vec<ArticleStub> {
    let total = stubs.len();
    info!(total, concurrency, "Fetching article bodies");

    let jobs: Vec<(usize, String)> = stubs
        .iter()
        .enumerate()
        .map(|(i, s)| (i, s.url.clone()))
        .collect();

    let mut results = stream::iter(jobs)
        .map(|(i, url)| async move { (i, fetch_body(client, &url).await) })
        .buffer_unordered(concurrency.max(1));

    let mut completed = 0usize;
    while let Some((i, content)) = results.next().await {
        stubs[i].content = Some(content);
        completed += 1;
        if completed % PROGRESS_EVERY == 0 {
            info!(completed, total, "Article body progress");
        }
    }

    info!(total, "Finished fetching article bodies");
    stubs
}

/// Fetch and extract one article; any failure yields an empty string.
#[instrument(level = "debug", skip(client))]
async fn fetch_body(client: &Client, url: &str) -> String {
    match get_html(client, url).await {
        Ok(html) => {
            let content = extract_content(&html);
            debug!(
                chars = content.chars().count(),
                preview = %truncate_for_log(&content, 60),
                "Extracted article body"
            );
            content
        }
        Err(e) => {
            debug!(%url, error = %e, "Article fetch failed");
            String::new()
        }
    }
}

/// Reduce an article page to whitespace-normalized body text.
pub fn extract_content(html: &str) -> String {
    let document = Html::parse_document(html);

    let paragraphs: Vec<String> = document
        .select(&PARAGRAPH_SELECTOR)
        .map(|p| normalize_whitespace(&p.text().collect::<Vec<_>>().join(" ")))
        .filter(|text| {
            text.chars().count() > MIN_PARAGRAPH_CHARS && !text.starts_with(SKIP_LINK_PREFIX)
        })
        .collect();
    if !paragraphs.is_empty() {
        return normalize_whitespace(&paragraphs.join(" "));
    }

    let container = CONTAINER_SELECTORS
        .iter()
        .find_map(|selector| document.select(selector).next())
        .map(|el| normalize_whitespace(&el.text().collect::<Vec<_>>().join(" ")))
        .filter(|text| !text.is_empty());
    if let Some(text) = container {
        return text;
    }

    document
        .select(&OG_DESCRIPTION_SELECTOR)
        .next()
        .and_then(|meta| meta.value().attr("content"))
        .map(normalize_whitespace)
        .unwrap_or_default()
}
