//! Monitor settings.
//!
//! Settings are read once at startup from a JSON file (or YAML when the
//! path ends in `.yaml`/`.yml`). Every option has a default, so a minimal
//! file only needs the keywords and the SMTP credentials.

use chrono::{Duration, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::instrument;
use url::Url;

/// Errors raised while loading or validating settings. All are fatal.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read settings file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed JSON settings: {0}")]
    Json(#[from] serde_json::Error),

    #[error("malformed YAML settings: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid settings: {0}")]
    Invalid(String),
}

/// A single recipient or a list of them.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(untagged)]
pub enum Recipients {
    One(String),
    Many(Vec<String>),
}

impl Default for Recipients {
    fn default() -> Self {
        Recipients::Many(Vec::new())
    }
}

/// Everything the pipeline needs to know about one deployment.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    pub news_url: String,
    pub max_pages: usize,
    pub days_to_check: i64,
    pub check_content: bool,
    pub concurrent_requests: usize,
    pub keywords: Vec<String>,
    pub sent_news_file: PathBuf,

    pub smtp_server: String,
    pub smtp_port: u16,
    pub smtp_use_ssl: bool,
    pub smtp_username: String,
    pub smtp_password: String,
    /// Falls back to `smtp_username` when unset.
    pub email_from: Option<String>,
    pub email_to: Recipients,
    pub email_subject_prefix: String,

    pub log_level: String,
    pub log_file: PathBuf,

    pub request_timeout_secs: u64,
    /// Pause between listing page requests.
    pub page_delay_ms: u64,
    /// Body preview length in the digest, in characters.
    pub preview_chars: usize,
    /// Offset used when printing times in the digest.
    pub display_utc_offset_hours: i32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            news_url: "https://www.gcs.gov.mo/list/zh-hant/news/".to_string(),
            max_pages: 10,
            days_to_check: 1,
            check_content: true,
            concurrent_requests: 5,
            keywords: Vec::new(),
            sent_news_file: PathBuf::from("sent_news_email.json"),
            smtp_server: "smtp-mail.outlook.com".to_string(),
            smtp_port: 587,
            smtp_use_ssl: false,
            smtp_username: String::new(),
            smtp_password: String::new(),
            email_from: None,
            email_to: Recipients::default(),
            email_subject_prefix: "【澳門新聞監控】".to_string(),
            log_level: "INFO".to_string(),
            log_file: PathBuf::from("gcs_news_monitor.log"),
            request_timeout_secs: 30,
            page_delay_ms: 1000,
            preview_chars: 300,
            display_utc_offset_hours: 8,
        }
    }
}

impl Settings {
    /// Load and validate settings from `path`.
    #[instrument(level = "debug", fields(path = %path.display()))]
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let settings = Self::parse(&raw, path)?;
        settings.validate()?;
        Ok(settings)
    }

    fn parse(raw: &str, path: &Path) -> Result<Self, ConfigError> {
        let is_yaml = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml"));
        if is_yaml {
            Ok(serde_yaml::from_str(raw)?)
        } else {
            Ok(serde_json::from_str(raw)?)
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.news_url.trim().is_empty() {
            return Err(ConfigError::Invalid("news_url is empty".into()));
        }
        Url::parse(&self.news_url)
            .map_err(|e| ConfigError::Invalid(format!("news_url is not an absolute URL: {e}")))?;
        if self.max_pages == 0 {
            return Err(ConfigError::Invalid("max_pages must be at least 1".into()));
        }
        if self.concurrent_requests == 0 {
            return Err(ConfigError::Invalid(
                "concurrent_requests must be at least 1".into(),
            ));
        }
        if self.days_to_check < 0 {
            return Err(ConfigError::Invalid("days_to_check must not be negative".into()));
        }
        let window_fits = Duration::try_days(self.days_to_check)
            .and_then(|window| Utc::now().checked_sub_signed(window))
            .is_some();
        if !window_fits {
            return Err(ConfigError::Invalid(format!(
                "days_to_check out of range: {}",
                self.days_to_check
            )));
        }
        if let Some(i) = self.keywords.iter().position(|kw| kw.trim().is_empty()) {
            return Err(ConfigError::Invalid(format!("keywords[{i}] is blank")));
        }
        if self.display_offset().is_none() {
            return Err(ConfigError::Invalid(format!(
                "display_utc_offset_hours out of range: {}",
                self.display_utc_offset_hours
            )));
        }
        Ok(())
    }

    /// Normalized recipient list, blank entries removed.
    pub fn recipients(&self) -> Vec<String> {
        let all = match &self.email_to {
            Recipients::One(addr) => vec![addr.clone()],
            Recipients::Many(addrs) => addrs.clone(),
        };
        all.into_iter()
            .map(|addr| addr.trim().to_string())
            .filter(|addr| !addr.is_empty())
            .collect()
    }

    pub fn sender(&self) -> &str {
        self.email_from
            .as_deref()
            .filter(|from| !from.trim().is_empty())
            .unwrap_or(&self.smtp_username)
    }

    pub fn recency_window(&self) -> Duration {
        Duration::try_days(self.days_to_check).unwrap_or(Duration::MAX)
    }

    pub fn page_delay(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.page_delay_ms)
    }

    pub fn request_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.request_timeout_secs)
    }

    pub fn display_offset(&self) -> Option<FixedOffset> {
        self.display_utc_offset_hours
            .checked_mul(3600)
            .and_then(FixedOffset::east_opt)
    }

    /// Directive for `EnvFilter`, accepting the usual level spellings.
    pub fn log_directive(&self) -> &'static str {
        match self.log_level.trim().to_ascii_uppercase().as_str() {
            "TRACE" => "trace",
            "DEBUG" => "debug",
            "WARN" | "WARNING" => "warn",
            "ERROR" | "CRITICAL" => "error",
            _ => "info",
        }
    }
}
