use async_trait::async_trait;
use std::time::Duration;
use teloxide::prelude::*;
use teloxide::types::ParseMode;
use teloxide::{ApiError, RequestError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SendError {
    /// The recipient blocked the bot (or is gone); the chat must be removed
    /// and the message never retried.
    #[error("recipient has blocked the bot")]
    Forbidden,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Outbound messaging capability. Injected so tests can substitute a
/// recording fake; link previews are always disabled.
#[async_trait]
pub trait Messenger: Send + Sync {
    async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        parse_mode: Option<ParseMode>,
    ) -> Result<(), SendError>;
}

#[derive(Clone)]
pub struct TelegramBot {
    bot: Bot,
    timeout: Duration,
}

impl TelegramBot {
    pub fn new(bot: Bot, timeout: Duration) -> Self {
        Self { bot, timeout }
    }
}

#[async_trait]
impl Messenger for TelegramBot {
    async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        parse_mode: Option<ParseMode>,
    ) -> Result<(), SendError> {
        let mut req = self
            .bot
            .send_message(ChatId(chat_id), text)
            .disable_web_page_preview(true);
        if let Some(mode) = parse_mode {
            req = req.parse_mode(mode);
        }
        let sent = tokio::time::timeout(self.timeout, req.send())
            .await
            .map_err(|_| SendError::Other(anyhow::anyhow!("telegram send timed out")))?;
        match sent {
            Ok(_) => Ok(()),
            Err(RequestError::Api(ApiError::BotBlocked)) => Err(SendError::Forbidden),
            Err(RequestError::Api(ApiError::UserDeactivated)) => Err(SendError::Forbidden),
            Err(err) => Err(SendError::Other(err.into())),
        }
    }
}
