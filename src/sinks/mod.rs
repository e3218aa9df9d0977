//! Notification sinks and the payload helpers they share.
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime};

use crate::config;
use crate::model::Announcement;

pub mod discord;
pub mod telegram;

pub use discord::WebhookSink;
pub use telegram::BotSink;

/// A delivery target for a single announcement.
#[async_trait]
pub trait Sink: Send + Sync {
    /// Short label for log lines.
    fn name(&self) -> &'static str;

    async fn deliver(&self, announcement: &Announcement) -> Result<()>;
}

/// Build the sink set from config. Entries that still carry template
/// placeholders are skipped.
pub fn from_config(sinks: &config::Sinks) -> Vec<Box<dyn Sink>> {
    let mut out: Vec<Box<dyn Sink>> = Vec::new();
    if let Some(url) = &sinks.discord_webhook_url {
        if !config::is_placeholder(url) {
            out.push(Box::new(WebhookSink::new(url.clone())));
        }
    }
    if let Some(telegram) = &sinks.telegram {
        if !config::is_placeholder(&telegram.bot_token) {
            out.push(Box::new(BotSink::new(
                telegram.bot_token.clone(),
                telegram.chat_id,
            )));
        }
    }
    out
}

/// Render a schedule time for humans ("07 Aug 2026, 09:15 AM"). Falls back to
/// the raw string when it is not a parseable timestamp.
pub fn format_schedule_time(raw: &str) -> String {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return dt.format("%d %b %Y, %I:%M %p").to_string();
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        return dt.format("%d %b %Y, %I:%M %p").to_string();
    }
    raw.to_string()
}

pub(crate) fn schedule_display(announcement: &Announcement) -> String {
    format_schedule_time(announcement.schedule_time.as_deref().unwrap_or(""))
}

pub(crate) fn body_text(announcement: &Announcement) -> &str {
    if announcement.text.is_empty() {
        "New Announcement"
    } else {
        &announcement.text
    }
}
