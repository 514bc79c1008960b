use serde::{Deserialize, Serialize};

use crate::github::model::{Release, Tag};

/// Per-chat rendering preference for release notes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum NoteFormat {
    Quote,
    Pre,
    #[default]
    Markdown,
}

impl NoteFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            NoteFormat::Quote => "quote",
            NoteFormat::Pre => "pre",
            NoteFormat::Markdown => "markdown",
        }
    }

    /// Unknown values fall back to the default so a schema change never
    /// strands existing rows.
    pub fn parse(s: &str) -> NoteFormat {
        match s {
            "quote" => NoteFormat::Quote,
            "pre" => NoteFormat::Pre,
            _ => NoteFormat::Markdown,
        }
    }
}

/// What the latest poll of a repository produced: a proper release, or a
/// plain tag for repositories that never published a release.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReleaseEvent {
    Release(Release),
    Tag(Tag),
}
