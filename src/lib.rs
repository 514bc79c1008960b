//! release-bot: polls GitHub for new releases/tags on tracked repositories
//! and forwards formatted notifications to subscriber Telegram chats.

pub mod config;
pub mod db;
pub mod dispatch;
pub mod format;
pub mod github;
pub mod model;
pub mod poller;
pub mod scheduler;
pub mod stars;
pub mod telegram;
