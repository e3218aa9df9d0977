//! Bot sink: sends each announcement to a Telegram chat, as a photo with a
//! caption when the announcement carries an attachment.
use anyhow::{Context, Result};
use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::{ChatId, InputFile, ParseMode};
use url::Url;

use super::{body_text, schedule_display, Sink};
use crate::model::Announcement;

pub struct BotSink {
    bot: Bot,
    chat_id: ChatId,
}

impl BotSink {
    pub fn new(bot_token: String, chat_id: i64) -> Self {
        Self {
            bot: Bot::new(bot_token),
            chat_id: ChatId(chat_id),
        }
    }
}

pub fn build_caption(announcement: &Announcement) -> String {
    format!(
        "<b>PW team</b>\nNotification time: <i>{}</i>\n\n<b>{}</b>",
        schedule_display(announcement),
        body_text(announcement),
    )
}

#[async_trait]
impl Sink for BotSink {
    fn name(&self) -> &'static str {
        "telegram"
    }

    async fn deliver(&self, announcement: &Announcement) -> Result<()> {
        let caption = build_caption(announcement);
        let image = announcement
            .attachment
            .as_ref()
            .and_then(|a| a.display_url());
        match image {
            Some(raw) => {
                let image_url = Url::parse(&raw).context("invalid attachment URL")?;
                self.bot
                    .send_photo(self.chat_id, InputFile::url(image_url))
                    .caption(caption)
                    .parse_mode(ParseMode::Html)
                    .await
                    .context("failed to send Telegram photo")?;
            }
            None => {
                self.bot
                    .send_message(self.chat_id, caption)
                    .parse_mode(ParseMode::Html)
                    .await
                    .context("failed to send Telegram message")?;
            }
        }
        Ok(())
    }
}
