//! Database entity models used by repositories.
//!
//! Keep these structs focused on the data returned by queries. Business logic
//! should live in higher layers.

use chrono::{DateTime, Utc};

use crate::model::NoteFormat;

/// A subscriber chat with its rendering preference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chat {
    /// Telegram chat id.
    pub id: i64,
    pub note_format: NoteFormat,
    /// GitHub login used for starred-repository auto-subscription.
    pub github_username: Option<String>,
}

/// A tracked repository with the last-seen release/tag identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedRepo {
    /// GitHub repository id.
    pub id: i64,
    pub full_name: String,
    pub html_url: String,
    pub archived: bool,
    pub current_release_id: Option<i64>,
    pub current_release_tag: Option<String>,
    pub current_tag: Option<String>,
    pub subscriber_count: i64,
    pub created_at: DateTime<Utc>,
}

impl TrackedRepo {
    /// A repository nobody subscribes to anymore; polled for deletion only.
    pub fn is_orphan(&self) -> bool {
        self.subscriber_count == 0
    }
}
