//! Digest rendering.
//!
//! Turns the matched articles of one run into a [`DigestMessage`] with a
//! plain-text body and an HTML body. Rendering is pure: the same items and
//! run time always produce the same message.

use crate::models::{ArticleStub, DigestMessage};
use crate::utils::truncate_chars;
use chrono::{DateTime, FixedOffset, Utc};
use html_escape::{encode_double_quoted_attribute, encode_text};
use std::fmt::Write;

const ELLIPSIS: &str = "...";
const SOURCE_NAME: &str = "澳門新聞局";
const SOURCE_URL: &str = "https://www.gcs.gov.mo";

const STYLE: &str = r#"
  body { font-family: 'Microsoft YaHei', 'Segoe UI', Arial, sans-serif; background: #f4f6f9; margin: 0; padding: 20px; }
  .container { max-width: 700px; margin: 0 auto; background: #ffffff; border-radius: 10px; box-shadow: 0 2px 12px rgba(0,0,0,0.08); overflow: hidden; }
  .header { background: linear-gradient(135deg, #1a73e8, #0d47a1); padding: 24px 30px; color: #ffffff; }
  .header h1 { margin: 0; font-size: 22px; font-weight: 600; }
  .header p { margin: 8px 0 0; font-size: 13px; opacity: 0.85; }
  .content { padding: 24px 30px; }
  .summary { background: #e8f0fe; border-left: 4px solid #1a73e8; padding: 12px 16px; margin-bottom: 20px; border-radius: 0 6px 6px 0; font-size: 14px; color: #1a56b8; }
  .news-item { border: 1px solid #e8eaed; border-radius: 8px; padding: 16px 20px; margin-bottom: 14px; }
  .news-title { font-size: 16px; font-weight: 600; color: #202124; margin: 0 0 8px; }
  .news-title a { color: #1a73e8; text-decoration: none; }
  .news-preview { font-size: 13px; color: #5f6368; line-height: 1.6; margin: 0; }
  .news-time { font-size: 12px; color: #9aa0a6; margin-top: 8px; }
  .footer { padding: 16px 30px; background: #f8f9fa; border-top: 1px solid #e8eaed; text-align: center; font-size: 12px; color: #9aa0a6; }
"#;

/// Presentation settings for the digest.
#[derive(Debug, Clone)]
pub struct DigestRenderer {
    pub subject_prefix: String,
    /// Maximum body preview length, in characters.
    pub preview_chars: usize,
    /// Zone used for every printed time.
    pub display_offset: FixedOffset,
}

impl DigestRenderer {
    /// Build the digest for `items` as of `run_time`.
    pub fn render(&self, items: &[ArticleStub], run_time: DateTime<Utc>) -> DigestMessage {
        DigestMessage {
            subject: format!("{} 發現 {} 條相關新聞", self.subject_prefix, items.len()),
            plain_body: self.plain_body(items),
            rich_body: self.rich_body(items, run_time),
            items: items.to_vec(),
        }
    }

    /// A fixed message for checking the SMTP setup end to end.
    pub fn render_transport_check(&self, run_time: DateTime<Utc>, server: &str) -> DigestMessage {
        let now = self.format_time(run_time, "%Y-%m-%d %H:%M:%S");
        let mut html = String::new();
        html.push_str("<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<style>");
        html.push_str(STYLE);
        html.push_str("</style>\n</head>\n<body>\n<div class=\"container\">\n");
        let _ = writeln!(
            html,
            "  <div class=\"header\">\n    <h1>Email 發送測試成功!</h1>\n    <p>測試時間: {now}</p>\n  </div>"
        );
        let _ = writeln!(
            html,
            "  <div class=\"content\">\n    <p>如果您收到此郵件，說明 Email 推送配置正確！</p>\n    <div class=\"summary\">SMTP: {}</div>\n  </div>",
            encode_text(server)
        );
        html.push_str("</div>\n</body>\n</html>\n");

        DigestMessage {
            subject: format!("{} Email 測試 - {now}", self.subject_prefix),
            plain_body: format!(
                "Email 發送測試成功!\n測試時間: {now}\n\n如果您收到此郵件，說明配置正確。"
            ),
            rich_body: html,
            items: Vec::new(),
        }
    }

    fn plain_body(&self, items: &[ArticleStub]) -> String {
        let mut text = format!(
            "{SOURCE_NAME}新聞監控\n\n共發現 {} 條相關新聞:\n\n",
            items.len()
        );
        for (i, item) in items.iter().enumerate() {
            let _ = write!(text, "{}. {}\n   鏈接: {}\n\n", i + 1, item.title, item.url);
        }
        text
    }

    fn rich_body(&self, items: &[ArticleStub], run_time: DateTime<Utc>) -> String {
        let mut html = String::new();
        html.push_str("<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<style>");
        html.push_str(STYLE);
        html.push_str("</style>\n</head>\n<body>\n<div class=\"container\">\n");

        let _ = writeln!(
            html,
            "  <div class=\"header\">\n    <h1>{SOURCE_NAME}關鍵詞相關新聞</h1>\n    <p>監控時間: {}</p>\n  </div>",
            self.format_time(run_time, "%Y-%m-%d %H:%M:%S")
        );
        let _ = writeln!(
            html,
            "  <div class=\"content\">\n    <div class=\"summary\">\n      共發現 <strong>{}</strong> 條相關新聞\n    </div>",
            items.len()
        );

        for (i, item) in items.iter().enumerate() {
            html.push_str("    <div class=\"news-item\">\n");
            let _ = writeln!(
                html,
                "      <p class=\"news-title\">{}. <a href=\"{}\" target=\"_blank\">{}</a></p>",
                i + 1,
                encode_double_quoted_attribute(&item.url),
                encode_text(&item.title)
            );
            if let Some(preview) = self.preview(item) {
                let _ = writeln!(
                    html,
                    "      <p class=\"news-preview\">{}</p>",
                    encode_text(&preview)
                );
            }
            if let Some(ts) = item.publish_time {
                let _ = writeln!(
                    html,
                    "      <p class=\"news-time\">{}</p>",
                    self.format_time(ts, "%Y-%m-%d %H:%M")
                );
            }
            html.push_str("    </div>\n");
        }

        let _ = writeln!(
            html,
            "  </div>\n  <div class=\"footer\">\n    數據來源: <a href=\"{SOURCE_URL}\" style=\"color:#1a73e8;\">{SOURCE_NAME}</a>\n  </div>"
        );
        html.push_str("</div>\n</body>\n</html>\n");
        html
    }

    fn preview(&self, item: &ArticleStub) -> Option<String> {
        item.content
            .as_deref()
            .filter(|content| !content.is_empty())
            .map(|content| truncate_chars(content, self.preview_chars, ELLIPSIS))
    }

    fn format_time(&self, ts: DateTime<Utc>, fmt: &str) -> String {
        ts.with_timezone(&self.display_offset).format(fmt).to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn renderer() -> DigestRenderer {
        DigestRenderer {
            subject_prefix: "【澳門新聞監控】".to_string(),
            preview_chars: 10,
            display_offset: FixedOffset::east_opt(8 * 3600).unwrap(),
        }
    }

    fn run_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 5, 6, 1, 0, 0).unwrap()
    }

    fn items() -> Vec<ArticleStub> {
        vec![
            ArticleStub::new("https://www.gcs.gov.mo/detail/zh-hant/N1", "軍團菌 <通報>")
                .with_publish_time(Utc.with_ymd_and_hms(2025, 5, 5, 23, 15, 0).unwrap())
                .with_content("0123456789abcdef"),
            ArticleStub::new("https://www.gcs.gov.mo/detail/zh-hant/N2?a=1&b=2", "Second")
                .with_content(""),
        ]
    }

    #[test]
    fn test_subject_embeds_count() {
        let msg = renderer().render(&items(), run_time());
        assert_eq!(msg.subject, "【澳門新聞監控】 發現 2 條相關新聞");
        assert_eq!(msg.items.len(), 2);
    }

    #[test]
    fn test_plain_body_lists_titles_and_links() {
        let msg = renderer().render(&items(), run_time());
        assert!(msg.plain_body.contains("共發現 2 條相關新聞"));
        assert!(
            msg.plain_body
                .contains("1. 軍團菌 <通報>\n   鏈接: https://www.gcs.gov.mo/detail/zh-hant/N1\n")
        );
        assert!(msg.plain_body.contains("2. Second\n"));
    }

    #[test]
    fn test_rich_body_preview_and_times() {
        let msg = renderer().render(&items(), run_time());
        let html = &msg.rich_body;
        assert!(html.contains("監控時間: 2025-05-06 09:00:00"));
        assert!(html.contains("<p class=\"news-preview\">0123456789...</p>"));
        assert!(html.contains("<p class=\"news-time\">2025-05-06 07:15</p>"));
        // Escaped title and link.
        assert!(html.contains("軍團菌 &lt;通報&gt;"));
        assert!(html.contains("href=\"https://www.gcs.gov.mo/detail/zh-hant/N2?a=1&amp;b=2\""));
        // Empty content and missing time render nothing.
        assert_eq!(html.matches("news-preview\">").count(), 1);
        assert_eq!(html.matches("news-time\">").count(), 1);
    }

    #[test]
    fn test_short_content_not_marked_truncated() {
        let item = ArticleStub::new("https://example.com/x", "t").with_content("short");
        let msg = renderer().render(&[item], run_time());
        assert!(msg.rich_body.contains("<p class=\"news-preview\">short</p>"));
    }

    #[test]
    fn test_render_is_deterministic() {
        let a = renderer().render(&items(), run_time());
        let b = renderer().render(&items(), run_time());
        assert_eq!(a, b);
    }

    #[test]
    fn test_transport_check_message() {
        let msg = renderer().render_transport_check(run_time(), "smtp.example.com:587");
        assert!(msg.subject.contains("2025-05-06 09:00:00"));
        assert!(msg.items.is_empty());
        assert!(msg.rich_body.contains("smtp.example.com:587"));
    }
}
