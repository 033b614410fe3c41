//! Digest delivery over SMTP.
//!
//! Two connection modes are supported, picked by `smtp_use_ssl`:
//!
//! | `smtp_use_ssl` | Mode | Usual port |
//! |----------------|------|------------|
//! | `true`  | TLS from the first byte (SMTPS) | 465 |
//! | `false` | plaintext greeting, then `STARTTLS` | 587 |
//!
//! Delivered links are committed to the sent ledger only after the server
//! has accepted the message, and the ledger is persisted right away.

use crate::config::Settings;
use crate::ledger::LedgerStore;
use crate::models::{DigestMessage, SentLedger};
use lettre::message::{Mailbox, MultiPart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info, instrument, warn};

#[derive(Debug, Error)]
pub enum SendError {
    #[error("mail settings incomplete: {0}")]
    Config(String),

    #[error("cannot build message: {0}")]
    Build(String),

    #[error("SMTP authentication failed: {0}")]
    Authentication(String),

    #[error("SMTP delivery failed: {0}")]
    Transport(String),
}

/// How the SMTP connection is secured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TlsMode {
    /// TLS from the first byte (SMTPS).
    Implicit,
    /// Plaintext greeting upgraded with `STARTTLS`.
    StartTls,
}

/// Something that can hand a digest to its recipients.
pub trait Mailer {
    async fn deliver(&self, message: &DigestMessage) -> Result<(), SendError>;

    /// Human-readable list of recipients, for logging.
    fn recipients(&self) -> Vec<String>;
}

/// Connection and addressing details for [`SmtpMailer`].
#[derive(Debug, Clone)]
pub struct SmtpMailer {
    server: String,
    port: u16,
    use_ssl: bool,
    username: String,
    password: String,
    from: String,
    to: Vec<String>,
    timeout: Duration,
}

impl SmtpMailer {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            server: settings.smtp_server.clone(),
            port: settings.smtp_port,
            use_ssl: settings.smtp_use_ssl,
            username: settings.smtp_username.clone(),
            password: settings.smtp_password.clone(),
            from: settings.sender().to_string(),
            to: settings.recipients(),
            timeout: settings.request_timeout(),
        }
    }

    pub fn tls_mode(&self) -> TlsMode {
        if self.use_ssl {
            TlsMode::Implicit
        } else {
            TlsMode::StartTls
        }
    }

    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.server, self.port)
    }

    fn check(&self) -> Result<(), SendError> {
        if self.username.is_empty() || self.password.is_empty() {
            return Err(SendError::Config(
                "smtp_username or smtp_password is not set".into(),
            ));
        }
        if self.to.is_empty() {
            return Err(SendError::Config("email_to has no recipients".into()));
        }
        Ok(())
    }

    /// Assemble the multipart/alternative message for all recipients.
    pub fn build_message(&self, digest: &DigestMessage) -> Result<Message, SendError> {
        let from: Mailbox = self
            .from
            .parse()
            .map_err(|e| SendError::Config(format!("invalid sender {:?}: {e}", self.from)))?;

        let mut builder = Message::builder().from(from).subject(digest.subject.clone());
        for addr in &self.to {
            let to: Mailbox = addr
                .parse()
                .map_err(|e| SendError::Config(format!("invalid recipient {addr:?}: {e}")))?;
            builder = builder.to(to);
        }

        builder
            .multipart(MultiPart::alternative_plain_html(
                digest.plain_body.clone(),
                digest.rich_body.clone(),
            ))
            .map_err(|e| SendError::Build(e.to_string()))
    }

    fn transport(&self) -> Result<AsyncSmtpTransport<Tokio1Executor>, SendError> {
        let builder = match self.tls_mode() {
            TlsMode::Implicit => AsyncSmtpTransport::<Tokio1Executor>::relay(&self.server),
            TlsMode::StartTls => {
                AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&self.server)
            }
        }
        .map_err(|e| SendError::Transport(e.to_string()))?;

        Ok(builder
            .port(self.port)
            .credentials(Credentials::new(self.username.clone(), self.password.clone()))
            .timeout(Some(self.timeout))
            .build())
    }
}

impl Mailer for SmtpMailer {
    #[instrument(
        level = "info",
        skip_all,
        fields(server = %self.endpoint(), tls = ?self.tls_mode())
    )]
    async fn deliver(&self, digest: &DigestMessage) -> Result<(), SendError> {
        self.check()?;
        let message = self.build_message(digest)?;
        let transport = self.transport()?;

        match transport.send(message).await {
            Ok(response) => {
                info!(code = %response.code(), "SMTP server accepted message");
                Ok(())
            }
            Err(e) => {
                let code = e.status().map(|code| code.to_string());
                Err(classify_failure(code.as_deref(), e.to_string()))
            }
        }
    }

    fn recipients(&self) -> Vec<String> {
        self.to.clone()
    }
}

/// Map an SMTP reply code to a [`SendError`].
///
/// 530 auth required, 534 mechanism too weak, 535 credentials rejected.
/// Anything else, including failures with no reply at all, is a transport
/// problem.
fn classify_failure(code: Option<&str>, detail: String) -> SendError {
    match code {
        Some("530" | "534" | "535") => SendError::Authentication(detail),
        _ => SendError::Transport(detail),
    }
}

/// Deliver `digest` and, on success, record and persist its links.
///
/// Returns `true` when there was nothing to send or the server accepted the
/// message. On failure the ledger is left untouched so the same articles are
/// offered again on the next run.
#[instrument(level = "info", skip_all, fields(items = digest.items.len()))]
pub async fn send_digest<M: Mailer>(
    mailer: &M,
    digest: &DigestMessage,
    ledger: &mut SentLedger,
    store: &LedgerStore,
) -> bool {
    if digest.items.is_empty() {
        info!("Nothing to send");
        return true;
    }

    match mailer.deliver(digest).await {
        Ok(()) => {
            info!(recipients = %mailer.recipients().join(", "), "Digest sent");
            let added = digest.urls().filter(|url| ledger.insert(*url)).count();
            store.persist(ledger).await;
            info!(added, total = ledger.len(), "Recorded sent articles");
            true
        }
        Err(SendError::Authentication(e)) => {
            error!(error = %e, "SMTP authentication failed; check smtp_username and smtp_password");
            warn!("Outlook and Gmail accounts usually need an app-specific password");
            false
        }
        Err(e) => {
            error!(error = %e, "Failed to send digest");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ArticleStub;
    use std::sync::Mutex;

    struct FakeMailer {
        fail_with: Option<fn() -> SendError>,
        delivered: Mutex<Vec<String>>,
    }

    impl FakeMailer {
        fn ok() -> Self {
            Self {
                fail_with: None,
                delivered: Mutex::new(Vec::new()),
            }
        }

        fn failing(f: fn() -> SendError) -> Self {
            Self {
                fail_with: Some(f),
                delivered: Mutex::new(Vec::new()),
            }
        }
    }

    impl Mailer for FakeMailer {
        async fn deliver(&self, message: &DigestMessage) -> Result<(), SendError> {
            if let Some(f) = self.fail_with {
                return Err(f());
            }
            self.delivered.lock().unwrap().push(message.subject.clone());
            Ok(())
        }

        fn recipients(&self) -> Vec<String> {
            vec!["ops@example.com".into()]
        }
    }

    fn digest(urls: &[&str]) -> DigestMessage {
        DigestMessage {
            subject: format!("found {}", urls.len()),
            plain_body: String::new(),
            rich_body: String::new(),
            items: urls.iter().map(|u| ArticleStub::new(*u, "t")).collect(),
        }
    }

    fn settings() -> Settings {
        Settings {
            smtp_username: "bot@example.com".into(),
            smtp_password: "secret".into(),
            email_to: crate::config::Recipients::Many(vec![
                "a@example.com".into(),
                "b@example.com".into(),
            ]),
            ..Settings::default()
        }
    }

    #[tokio::test]
    async fn test_failure_leaves_ledger_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sent.json");
        let store = LedgerStore::new(&path);
        let mut ledger = SentLedger::default();
        ledger.insert("https://example.com/old");
        let before = ledger.clone();

        let mailer = FakeMailer::failing(|| SendError::Transport("connection reset".into()));
        let batch = digest(&["https://example.com/new"]);
        let ok = send_digest(&mailer, &batch, &mut ledger, &store).await;

        assert!(!ok);
        assert_eq!(ledger, before);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_auth_failure_leaves_ledger_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let store = LedgerStore::new(dir.path().join("sent.json"));
        let mut ledger = SentLedger::default();

        let mailer = FakeMailer::failing(|| SendError::Authentication("535 5.7.3".into()));
        let batch = digest(&["https://example.com/a"]);
        let ok = send_digest(&mailer, &batch, &mut ledger, &store).await;

        assert!(!ok);
        assert!(ledger.is_empty());
    }

    #[tokio::test]
    async fn test_success_commits_exactly_the_sent_items() {
        let dir = tempfile::tempdir().unwrap();
        let store = LedgerStore::new(dir.path().join("sent.json"));
        let mut ledger = SentLedger::default();
        ledger.insert("https://example.com/old");

        let mailer = FakeMailer::ok();
        let urls = ["https://example.com/1", "https://example.com/2", "https://example.com/3"];
        let ok = send_digest(&mailer, &digest(&urls), &mut ledger, &store).await;

        assert!(ok);
        assert_eq!(ledger.len(), 4);
        assert_eq!(mailer.delivered.lock().unwrap().len(), 1);

        let on_disk = store.load().await;
        assert_eq!(on_disk.len(), 4);
        for url in urls {
            assert!(on_disk.contains(url));
        }
    }

    #[tokio::test]
    async fn test_empty_digest_is_not_sent() {
        let dir = tempfile::tempdir().unwrap();
        let store = LedgerStore::new(dir.path().join("sent.json"));
        let mut ledger = SentLedger::default();

        let mailer = FakeMailer::ok();
        assert!(send_digest(&mailer, &digest(&[]), &mut ledger, &store).await);
        assert!(mailer.delivered.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_smtp_mailer_requires_credentials() {
        let mailer = SmtpMailer::from_settings(&Settings::default());
        let err = mailer.deliver(&digest(&["https://example.com/1"])).await.unwrap_err();
        assert!(matches!(err, SendError::Config(_)));
    }

    #[tokio::test]
    async fn test_smtp_mailer_requires_recipients() {
        let settings = Settings {
            email_to: crate::config::Recipients::Many(vec![]),
            ..settings()
        };
        let mailer = SmtpMailer::from_settings(&settings);
        let err = mailer.deliver(&digest(&["https://example.com/1"])).await.unwrap_err();
        assert!(matches!(err, SendError::Config(_)));
    }

    #[test]
    fn test_build_message_addresses_all_recipients() {
        let mailer = SmtpMailer::from_settings(&settings());
        let message = mailer.build_message(&digest(&["https://example.com/1"])).unwrap();

        let envelope = message.envelope();
        let to: Vec<String> = envelope.to().iter().map(|a| a.to_string()).collect();
        assert_eq!(to, vec!["a@example.com", "b@example.com"]);
        assert_eq!(
            envelope.from().map(|a| a.to_string()),
            Some("bot@example.com".to_string())
        );

        let raw = String::from_utf8(message.formatted()).unwrap();
        assert!(raw.contains("multipart/alternative"));
    }

    #[test]
    fn test_auth_reply_codes_are_authentication_failures() {
        for code in ["535", "534", "530"] {
            let err = classify_failure(Some(code), format!("{code} rejected"));
            assert!(matches!(err, SendError::Authentication(_)), "code {code}");
        }
    }

    #[test]
    fn test_other_failures_are_transport_failures() {
        for code in [Some("550"), Some("421"), None] {
            let err = classify_failure(code, "failed".into());
            assert!(matches!(err, SendError::Transport(_)), "code {code:?}");
        }
    }

    #[test]
    fn test_tls_mode_follows_use_ssl() {
        let implicit = Settings {
            smtp_use_ssl: true,
            smtp_port: 465,
            ..settings()
        };
        assert_eq!(SmtpMailer::from_settings(&implicit).tls_mode(), TlsMode::Implicit);
        assert_eq!(SmtpMailer::from_settings(&settings()).tls_mode(), TlsMode::StartTls);
    }

    #[test]
    fn test_build_message_rejects_bad_recipient() {
        let settings = Settings {
            email_to: crate::config::Recipients::One("not-an-address".into()),
            ..settings()
        };
        let mailer = SmtpMailer::from_settings(&settings);
        assert!(matches!(
            mailer.build_message(&digest(&["https://example.com/1"])),
            Err(SendError::Config(_))
        ));
    }
}
