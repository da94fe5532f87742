use crate::config;
use crate::delivery::{MessageSink, SendError};
use async_trait::async_trait;
use reqwest::Url;
use teloxide::payloads::{SendMessageSetters, SendPhotoSetters};
use teloxide::prelude::*;
use teloxide::types::{ChatId, InputFile, ParseMode, Recipient};
use teloxide::RequestError;
use tracing::debug;

/// Telegram Bot API sink posting HTML messages to one chat.
#[derive(Clone)]
pub struct TelegramSink {
    bot: Bot,
    chat: Recipient,
}

impl std::fmt::Debug for TelegramSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramSink")
            .field("chat", &self.chat)
            .finish_non_exhaustive()
    }
}

impl TelegramSink {
    pub fn new(bot: Bot, chat_id: &str) -> Self {
        Self {
            bot,
            chat: parse_recipient(chat_id),
        }
    }

    pub fn from_config(cfg: &config::Telegram) -> Self {
        Self::new(Bot::new(cfg.bot_token.clone()), &cfg.chat_id)
    }
}

/// Numeric ids (`-100…`) address chats directly; anything else is treated
/// as a public channel username.
pub fn parse_recipient(chat_id: &str) -> Recipient {
    let chat_id = chat_id.trim();
    match chat_id.parse::<i64>() {
        Ok(id) => Recipient::Id(ChatId(id)),
        Err(_) if chat_id.starts_with('@') => Recipient::ChannelUsername(chat_id.to_string()),
        Err(_) => Recipient::ChannelUsername(format!("@{}", chat_id)),
    }
}

fn map_error(err: RequestError) -> SendError {
    match err {
        RequestError::Api(api) => SendError::Rejected {
            status: None,
            description: api.to_string(),
        },
        RequestError::RetryAfter(after) => SendError::Rejected {
            status: Some(429),
            description: format!("flood control, retry after {:?}", after),
        },
        RequestError::MigrateToChatId(id) => SendError::Rejected {
            status: Some(400),
            description: format!("chat migrated to {:?}", id),
        },
        other => SendError::Transport(other.to_string()),
    }
}

#[async_trait]
impl MessageSink for TelegramSink {
    async fn send_media(&self, image_url: &str, caption_html: &str) -> Result<(), SendError> {
        let photo = Url::parse(image_url).map_err(|e| SendError::Rejected {
            status: None,
            description: format!("invalid image url {}: {}", image_url, e),
        })?;
        debug!(chat = ?self.chat, "sending photo");
        self.bot
            .send_photo(self.chat.clone(), InputFile::url(photo))
            .caption(caption_html)
            .parse_mode(ParseMode::Html)
            .await
            .map(|_| ())
            .map_err(map_error)
    }

    async fn send_text(&self, html: &str, suppress_preview: bool) -> Result<(), SendError> {
        debug!(chat = ?self.chat, suppress_preview, "sending message");
        self.bot
            .send_message(self.chat.clone(), html)
            .parse_mode(ParseMode::Html)
            .disable_web_page_preview(suppress_preview)
            .await
            .map(|_| ())
            .map_err(map_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recipient_from_numeric_id() {
        assert_eq!(
            parse_recipient("-1001234567890"),
            Recipient::Id(ChatId(-1001234567890))
        );
    }

    #[test]
    fn recipient_from_username() {
        assert_eq!(
            parse_recipient("@zaobao_feed"),
            Recipient::ChannelUsername("@zaobao_feed".into())
        );
        assert_eq!(
            parse_recipient("zaobao_feed"),
            Recipient::ChannelUsername("@zaobao_feed".into())
        );
    }

    #[test]
    fn migrated_chat_maps_to_400() {
        let err = map_error(RequestError::MigrateToChatId(-42));
        assert_eq!(err.status(), Some(400));
    }
}
