//! Keyword matching against title and body.

use crate::models::{ArticleStub, SentLedger};
use tracing::{debug, info};

/// Case-insensitive substring test of any keyword against title + body.
///
/// An empty keyword is a substring of everything and so matches every stub;
/// settings validation keeps blank keywords out of a real run.
pub fn matches_any(stub: &ArticleStub, keywords: &[String]) -> bool {
    let haystack = stub.searchable_text().to_lowercase();
    keywords
        .iter()
        .any(|kw| haystack.contains(&kw.to_lowercase()))
}

/// Keep stubs that mention a keyword and have not been delivered before.
///
/// Order is preserved. Matches already in the ledger are dropped silently.
pub fn filter_new_matches(
    stubs: &[ArticleStub],
    keywords: &[String],
    ledger: &SentLedger,
) -> Vec<ArticleStub> {
    stubs
        .iter()
        .filter(|stub| matches_any(stub, keywords))
        .filter(|stub| {
            if ledger.contains(&stub.url) {
                debug!(title = %stub.title, "Already sent; skipping");
                false
            } else {
                info!(title = %stub.title, url = %stub.url, "Found matching article");
                true
            }
        })
        .cloned()
        .collect()
}
