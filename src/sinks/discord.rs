//! Webhook sink: posts each announcement as a Discord embed.
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use super::{body_text, schedule_display, Sink};
use crate::model::Announcement;

const AUTHOR_NAME: &str = "PW team";
const AUTHOR_ICON: &str = "https://www.pw.live/study/assets/icons/logo.png";

pub struct WebhookSink {
    http: Client,
    webhook_url: String,
}

impl WebhookSink {
    pub fn new(webhook_url: String) -> Self {
        let http = Client::builder()
            .user_agent("pw-announcer/0.1")
            .build()
            .expect("reqwest client");
        Self { http, webhook_url }
    }
}

/// Accent color in the 24-bit embed range, derived from the announcement id so
/// repeated sends of the same announcement look identical.
fn embed_color(id: &str) -> u32 {
    id.bytes()
        .fold(0u32, |acc, b| acc.wrapping_mul(31).wrapping_add(b as u32))
        & 0xFF_FFFF
}

pub fn build_payload(announcement: &Announcement) -> Value {
    let mut embed = json!({
        "author": { "name": AUTHOR_NAME, "icon_url": AUTHOR_ICON },
        "description": body_text(announcement),
        "color": embed_color(&announcement.id),
        "fields": [
            {
                "name": "Notification Time",
                "value": schedule_display(announcement),
                "inline": false
            }
        ]
    });
    if let Some(url) = announcement
        .attachment
        .as_ref()
        .and_then(|a| a.display_url())
    {
        embed["image"] = json!({ "url": url });
    }
    json!({ "embeds": [embed] })
}

#[async_trait]
impl Sink for WebhookSink {
    fn name(&self) -> &'static str {
        "discord"
    }

    async fn deliver(&self, announcement: &Announcement) -> Result<()> {
        let payload = build_payload(announcement);
        let res = self
            .http
            .post(&self.webhook_url)
            .json(&payload)
            .send()
            .await
            .context("failed to reach Discord webhook")?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(anyhow!("webhook error {}: {}", status, body));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Attachment;

    fn sample(attachment: Option<Attachment>) -> Announcement {
        Announcement {
            id: "a1".into(),
            text: "Class moved to 6 PM".into(),
            schedule_time: Some("2024-01-02T15:04:00Z".into()),
            attachment,
        }
    }

    #[test]
    fn payload_includes_body_and_time() {
        let payload = build_payload(&sample(None));
        let embed = &payload["embeds"][0];
        assert_eq!(embed["description"], "Class moved to 6 PM");
        assert_eq!(embed["fields"][0]["value"], "02 Jan 2024, 03:04 PM");
        assert!(embed.get("image").is_none());
    }

    #[test]
    fn payload_includes_attachment_image() {
        let payload = build_payload(&sample(Some(Attachment {
            name: Some("img.png".into()),
            base_url: "https://cdn.x/".into(),
            key: "/f/img.png".into(),
        })));
        assert_eq!(
            payload["embeds"][0]["image"]["url"],
            "https://cdn.x/f/img.png"
        );
    }

    #[test]
    fn empty_body_gets_a_default() {
        let mut ann = sample(None);
        ann.text = String::new();
        let payload = build_payload(&ann);
        assert_eq!(payload["embeds"][0]["description"], "New Announcement");
    }

    #[test]
    fn embed_color_is_deterministic_and_in_range() {
        assert_eq!(embed_color("a1"), embed_color("a1"));
        assert!(embed_color("whatever") <= 0xFF_FFFF);
    }
}
