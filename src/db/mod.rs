//! Database module: entity models and SQL repositories.
//!
//! This module is split into two submodules:
//! - `model`: typed domain entities returned by repositories.
//! - `repo`: SQL-only functions that map rows into entities.
//!
//! External modules should import from `release_bot::db` — we re-export the
//! repository API and commonly used models for convenience.

pub mod model;
pub mod repo;

// Re-export the repository API at `crate::db::*` for convenience.
pub use repo::*;

// Surface models used by callers (pollers, dispatcher, formatter).
pub use model::{Chat, TrackedRepo};
