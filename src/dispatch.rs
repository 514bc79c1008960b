//! Delivery dispatcher: one send per (chat, event), with failure-driven
//! unsubscription.

use anyhow::Result;
use tracing::{info, instrument, warn};

use crate::db;
use crate::db::Pool;
use crate::format::Rendered;
use crate::telegram::{Messenger, SendError};

/// Outcome of a single delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Delivered,
    /// Transient failure; nothing deleted, not retried this cycle.
    Failed,
    /// The recipient blocked the bot; the chat and its subscriptions are gone.
    ChatRemoved,
}

/// Send a rendered message to one chat. A permanent failure removes the chat
/// (subscriptions cascade); a transient failure is logged and skipped so it
/// never blocks delivery to the remaining chats.
#[instrument(skip_all)]
pub async fn deliver(
    pool: &Pool,
    messenger: &dyn Messenger,
    chat_id: i64,
    message: &Rendered,
) -> Result<Outcome> {
    match messenger
        .send_message(chat_id, &message.text, message.parse_mode)
        .await
    {
        Ok(()) => Ok(Outcome::Delivered),
        Err(SendError::Forbidden) => {
            info!(chat_id, "bot was blocked by the user; removing chat");
            db::delete_chat(pool, chat_id).await?;
            Ok(Outcome::ChatRemoved)
        }
        Err(SendError::Other(err)) => {
            warn!(?err, chat_id, "delivery failed; skipping this chat");
            Ok(Outcome::Failed)
        }
    }
}
