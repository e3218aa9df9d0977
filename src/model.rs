use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A purchased batch as reported by the catalog endpoint. Re-fetched every
/// cycle; never cached across cycles.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Batch {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub slug: String,
    #[serde(default, rename = "startDate")]
    pub start_date: Option<String>,
    #[serde(default, rename = "endDate")]
    pub end_date: Option<String>,
    #[serde(default, rename = "expiryDate")]
    pub expiry_date: Option<String>,
}

impl Batch {
    /// Human label for log lines; falls back to the name when the platform
    /// sends no slug.
    pub fn label(&self) -> &str {
        if self.slug.is_empty() {
            &self.name
        } else {
            &self.slug
        }
    }
}

/// A single announcement within a batch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Announcement {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default, rename = "announcement")]
    pub text: String,
    #[serde(default, rename = "scheduleTime")]
    pub schedule_time: Option<String>,
    #[serde(default)]
    pub attachment: Option<Attachment>,
}

impl Announcement {
    /// Chronological sort key. A missing schedule time sorts before everything.
    pub fn sort_key(&self) -> &str {
        self.schedule_time.as_deref().unwrap_or("")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Attachment {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, rename = "baseUrl")]
    pub base_url: String,
    #[serde(default)]
    pub key: String,
}

impl Attachment {
    /// Join `base_url` and `key` with exactly one separating slash. `None`
    /// when either half is blank.
    pub fn display_url(&self) -> Option<String> {
        let base = self.base_url.trim_end_matches('/');
        let key = self.key.trim_start_matches('/');
        if base.is_empty() || key.is_empty() {
            return None;
        }
        Some(format!("{}/{}", base, key))
    }
}

/// Advisory estimate of remaining token lifetime, computed from the absolute
/// expiry deadline the platform reported at issuance. The verify endpoint has
/// the last word; this only feeds a startup log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenExpiry {
    pub expired: bool,
    pub days_remaining: i64,
}

impl TokenExpiry {
    pub fn from_deadline_ms(deadline_ms: i64, now: DateTime<Utc>) -> Self {
        let remaining_ms = deadline_ms - now.timestamp_millis();
        if remaining_ms <= 0 {
            Self {
                expired: true,
                days_remaining: 0,
            }
        } else {
            Self {
                expired: false,
                days_remaining: remaining_ms / (1000 * 60 * 60 * 24),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn attachment_url_joins_with_single_slash() {
        let attachment = Attachment {
            name: None,
            base_url: "https://cdn.x/".into(),
            key: "/f/img.png".into(),
        };
        assert_eq!(
            attachment.display_url().as_deref(),
            Some("https://cdn.x/f/img.png")
        );

        let plain = Attachment {
            name: None,
            base_url: "https://cdn.x".into(),
            key: "f/img.png".into(),
        };
        assert_eq!(
            plain.display_url().as_deref(),
            Some("https://cdn.x/f/img.png")
        );
    }

    #[test]
    fn attachment_url_requires_both_halves() {
        let no_key = Attachment {
            name: None,
            base_url: "https://cdn.x".into(),
            key: String::new(),
        };
        assert_eq!(no_key.display_url(), None);

        let no_base = Attachment {
            name: None,
            base_url: String::new(),
            key: "f/img.png".into(),
        };
        assert_eq!(no_base.display_url(), None);
    }

    #[test]
    fn missing_schedule_time_sorts_first() {
        let dated = Announcement {
            id: "a".into(),
            text: String::new(),
            schedule_time: Some("2024-01-01T00:00:00Z".into()),
            attachment: None,
        };
        let undated = Announcement {
            id: "b".into(),
            text: String::new(),
            schedule_time: None,
            attachment: None,
        };
        assert!(undated.sort_key() < dated.sort_key());
    }

    #[test]
    fn expiry_estimate() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let in_three_days = now.timestamp_millis() + 3 * 24 * 60 * 60 * 1000 + 5000;
        let estimate = TokenExpiry::from_deadline_ms(in_three_days, now);
        assert!(!estimate.expired);
        assert_eq!(estimate.days_remaining, 3);

        let past = TokenExpiry::from_deadline_ms(now.timestamp_millis() - 1, now);
        assert!(past.expired);
        assert_eq!(past.days_remaining, 0);
    }

    #[test]
    fn announcement_deserializes_without_attachment() {
        let ann: Announcement = serde_json::from_str(
            r#"{ "_id": "a1", "announcement": "hello", "scheduleTime": "2024-01-01T00:00:00Z" }"#,
        )
        .unwrap();
        assert_eq!(ann.attachment, None);
        assert_eq!(ann.text, "hello");
    }
}
