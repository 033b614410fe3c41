//! File-backed store for the sent ledger.
//!
//! The ledger is loaded once per run and rewritten in full after every
//! successful delivery. A missing or unreadable file yields an empty ledger;
//! a failed write is logged and the run carries on, at the cost of possibly
//! notifying the same links again next time.

use crate::models::{LedgerRecord, SentLedger};
use crate::utils::ensure_parent_dir;
use std::path::PathBuf;
use tokio::fs;
use tracing::{debug, error, info, instrument, warn};

#[derive(Debug, Clone)]
pub struct LedgerStore {
    path: PathBuf,
}

impl LedgerStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Read the ledger, falling back to an empty one on any problem.
    #[instrument(level = "info", skip_all, fields(path = %self.path.display()))]
    pub async fn load(&self) -> SentLedger {
        let raw = match fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("No sent ledger yet; starting empty");
                return SentLedger::default();
            }
            Err(e) => {
                warn!(error = %e, "Failed to read sent ledger; starting empty");
                return SentLedger::default();
            }
        };

        match serde_json::from_str::<LedgerRecord>(&raw) {
            Ok(record) => {
                let ledger = SentLedger::from(record);
                info!(count = ledger.len(), "Loaded sent ledger");
                ledger
            }
            Err(e) => {
                warn!(error = %e, "Sent ledger is corrupt; starting empty");
                SentLedger::default()
            }
        }
    }

    /// Rewrite the ledger file atomically. Failures are logged, not returned.
    #[instrument(
        level = "info",
        skip_all,
        fields(path = %self.path.display(), count = ledger.len())
    )]
    pub async fn persist(&self, ledger: &SentLedger) -> bool {
        match self.write(ledger).await {
            Ok(()) => {
                debug!("Persisted sent ledger");
                true
            }
            Err(e) => {
                error!(error = %e, "Failed to persist sent ledger");
                false
            }
        }
    }

    async fn write(&self, ledger: &SentLedger) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(&LedgerRecord::from(ledger))?;
        ensure_parent_dir(&self.path).await?;

        let tmp = self.temp_path();
        fs::write(&tmp, json).await?;
        if let Err(e) = fs::rename(&tmp, &self.path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(e);
        }
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_load_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = LedgerStore::new(dir.path().join("sent.json"));
        assert!(store.load().await.is_empty());
    }

    #[tokio::test]
    async fn test_load_corrupt_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sent.json");
        std::fs::write(&path, "{ this is not json").unwrap();
        let store = LedgerStore::new(&path);
        assert!(store.load().await.is_empty());
    }

    #[tokio::test]
    async fn test_persist_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = LedgerStore::new(dir.path().join("state/sent.json"));

        let mut ledger = SentLedger::default();
        ledger.insert("https://www.gcs.gov.mo/detail/zh-hant/N1");
        ledger.insert("https://www.gcs.gov.mo/detail/zh-hant/N2");
        assert!(store.persist(&ledger).await);

        let reloaded = store.load().await;
        assert_eq!(reloaded.len(), 2);
        assert!(reloaded.contains("https://www.gcs.gov.mo/detail/zh-hant/N2"));
        assert!(!dir.path().join("state/sent.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_persisted_file_shape() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sent.json");
        let store = LedgerStore::new(&path);

        let mut ledger = SentLedger::default();
        ledger.insert("https://www.gcs.gov.mo/detail/zh-hant/N1");
        store.persist(&ledger).await;

        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(
            value["sent_urls"],
            serde_json::json!(["https://www.gcs.gov.mo/detail/zh-hant/N1"])
        );
        assert!(value["last_updated"].is_string());
    }

    #[tokio::test]
    async fn test_persist_failure_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        // The target is a directory, so the rename cannot succeed.
        let store = LedgerStore::new(dir.path());
        assert!(!store.persist(&SentLedger::default()).await);
    }
}
