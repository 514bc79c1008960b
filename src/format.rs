//! Pure message rendering: no I/O, no side effects.
//!
//! Release bodies arrive as GitHub-flavored markdown sprinkled with HTML
//! artifacts (alignment wrappers, anchors, `<picture>` blocks). Those are
//! stripped before the body is embedded in any of the three rendering modes.

use once_cell::sync::Lazy;
use regex::Regex;
use teloxide::types::ParseMode;
use teloxide::utils::html;
use teloxide::utils::markdown;

use crate::github::model::{Release, Repository, Tag};
use crate::model::{NoteFormat, ReleaseEvent};

/// Telegram's hard limit on message text length.
const MAX_TEXT_LENGTH: usize = 4096;
/// Reserve for everything around the body (links, title, tag, markers).
const BODY_RESERVE: usize = 256;
const SKIP_MARKER: &str = "\n-=SKIPPED=-";

static EXTRA_HTML_TAGS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        "(?s)<p align=\".*?\".*?>|</p>|<a name=\".*?\">|</a>|<picture>.*?</picture>|\
         </?h[1-4]>|</?sub>|</?sup>|</?details>|</?summary>|</?b>|</?dl>|</?dt>|\
         </?dd>|</?em>|<!--.*?-->",
    )
    .expect("valid tag-stripping regex")
});

static IMG_HTML_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new("<img .*?src=\"(.*?)\".*?>").expect("valid img regex"));

/// A rendered message plus the markup dialect Telegram should parse it with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rendered {
    pub text: String,
    pub parse_mode: Option<ParseMode>,
}

impl Rendered {
    fn html(text: String) -> Self {
        Rendered {
            text,
            parse_mode: Some(ParseMode::Html),
        }
    }

    fn markdown(text: String) -> Self {
        Rendered {
            text,
            parse_mode: Some(ParseMode::MarkdownV2),
        }
    }

    pub fn plain(text: String) -> Self {
        Rendered {
            text,
            parse_mode: None,
        }
    }
}

/// Strip GitHub markup artifacts and rewrite `<img>` tags to their bare URL.
fn clean_body(body: &str) -> String {
    let body = EXTRA_HTML_TAGS.replace_all(body, "");
    IMG_HTML_TAG.replace_all(&body, "$1").into_owned()
}

/// Cut an over-long body so the surrounding markup always fits under
/// Telegram's message limit. Counting is per character.
fn truncate_body(body: &str) -> String {
    let limit = MAX_TEXT_LENGTH - BODY_RESERVE;
    if body.chars().count() > limit {
        let mut cut: String = body.chars().take(limit).collect();
        cut.push_str(SKIP_MARKER);
        cut
    } else {
        body.to_string()
    }
}

/// Skip the release title when it is textually redundant with the tag
/// (equal, or differing only by a leading "v" on either side).
fn effective_title(title: Option<&str>, tag: &str) -> String {
    let title = title.unwrap_or("");
    if title == tag || title == format!("v{tag}") || format!("v{title}") == tag {
        String::new()
    } else {
        title.to_string()
    }
}

pub fn render_event(format: NoteFormat, repo: &Repository, event: &ReleaseEvent) -> Rendered {
    match event {
        ReleaseEvent::Release(release) => render_release(format, repo, release),
        ReleaseEvent::Tag(tag) => render_tag(repo, tag),
    }
}

pub fn render_release(format: NoteFormat, repo: &Repository, release: &Release) -> Rendered {
    let body = truncate_body(&clean_body(release.body.as_deref().unwrap_or("")));
    let title = effective_title(release.name.as_deref(), &release.tag_name);

    match format {
        NoteFormat::Quote => Rendered::html(render_html(
            repo,
            release,
            &title,
            &format!("<blockquote>{}</blockquote>", html::escape(&body)),
        )),
        NoteFormat::Pre => Rendered::html(render_html(
            repo,
            release,
            &title,
            &format!("<pre>{}</pre>", html::escape(&body)),
        )),
        NoteFormat::Markdown => Rendered::markdown(render_markdown(repo, release, &title, &body)),
    }
}

fn render_html(repo: &Repository, release: &Release, title: &str, body_block: &str) -> String {
    format!(
        "<a href='{}'>{}</a>:\n<b>{}</b> <code>{}</code>{}\n{}<a href='{}'>release note...</a>",
        repo.html_url,
        html::escape(&repo.full_name),
        html::escape(title),
        html::escape(&release.tag_name),
        if release.prerelease {
            " <i>pre-release</i>"
        } else {
            ""
        },
        body_block,
        release.html_url,
    )
}

fn render_markdown(repo: &Repository, release: &Release, title: &str, body: &str) -> String {
    let title_part = if title.is_empty() {
        String::new()
    } else {
        format!("*{}*", markdown::escape(title))
    };
    let body_part = if body.is_empty() {
        String::new()
    } else {
        format!("{}\n\n", markdown::escape(body))
    };
    format!(
        "[{}]({})\n{} `{}`{}\n\n{}[release note\\.\\.\\.]({})",
        markdown::escape(&repo.full_name),
        markdown::escape_link_url(&repo.html_url),
        title_part,
        markdown::escape_code(&release.tag_name),
        if release.prerelease {
            " _pre\\-release_"
        } else {
            ""
        },
        body_part,
        markdown::escape_link_url(&release.html_url),
    )
}

/// Tag-only events carry no release metadata; render a minimal two-liner.
/// Always HTML, regardless of the chat preference.
pub fn render_tag(repo: &Repository, tag: &Tag) -> Rendered {
    Rendered::html(format!(
        "<a href='{}'>{}</a>:\n<code>{}</code>",
        repo.html_url,
        html::escape(&repo.full_name),
        html::escape(&tag.name),
    ))
}

pub fn repo_deleted_message(full_name: &str) -> Rendered {
    Rendered::plain(format!("GitHub repo {full_name} has been deleted"))
}

pub fn repo_archived_message(full_name: &str) -> Rendered {
    Rendered::plain(format!("GitHub repo {full_name} has been archived"))
}

/// Confirmation sent when star reconciliation begins tracking a repository.
pub fn now_tracking_message(repo: &Repository) -> Rendered {
    Rendered::html(format!(
        "Now tracking <a href='{}'>{}</a> from your starred repositories",
        repo.html_url,
        html::escape(&repo.full_name),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repo() -> Repository {
        Repository {
            id: 500,
            full_name: "owner/name".into(),
            html_url: "https://github.com/owner/name".into(),
            archived: false,
        }
    }

    fn release(title: &str, tag: &str, body: &str) -> Release {
        Release {
            id: 11,
            tag_name: tag.into(),
            name: if title.is_empty() {
                None
            } else {
                Some(title.into())
            },
            body: if body.is_empty() {
                None
            } else {
                Some(body.into())
            },
            html_url: format!("https://github.com/owner/name/releases/tag/{tag}"),
            prerelease: false,
            draft: false,
        }
    }

    #[test]
    fn title_equal_to_tag_is_suppressed() {
        assert_eq!(effective_title(Some("v1.2.3"), "v1.2.3"), "");
        assert_eq!(effective_title(Some("1.2.3"), "v1.2.3"), "");
        assert_eq!(effective_title(Some("v1.2.3"), "1.2.3"), "");
        assert_eq!(effective_title(Some("Big Update"), "v1.2.3"), "Big Update");
        assert_eq!(effective_title(None, "v1.2.3"), "");
    }

    #[test]
    fn body_truncated_to_reserve_with_marker() {
        let long = "x".repeat(MAX_TEXT_LENGTH);
        let cut = truncate_body(&long);
        let expected_len = MAX_TEXT_LENGTH - BODY_RESERVE + SKIP_MARKER.chars().count();
        assert_eq!(cut.chars().count(), expected_len);
        assert!(cut.ends_with(SKIP_MARKER));
        assert_eq!(
            cut.chars().take(MAX_TEXT_LENGTH - BODY_RESERVE).count(),
            MAX_TEXT_LENGTH - BODY_RESERVE
        );

        let short = "short body";
        assert_eq!(truncate_body(short), short);
    }

    #[test]
    fn github_artifacts_are_stripped() {
        let body = "<p align=\"center\" dir=\"auto\">Hello</p>\
                    <a name=\"anchor\"></a><h2>Heading</h2>\
                    <picture>ignored <img src=\"x\"></picture>\
                    <details><summary>More</summary>rest</details>\
                    <!-- comment -->done";
        let cleaned = clean_body(body);
        assert_eq!(cleaned, "HelloHeadingMorerestdone");
    }

    #[test]
    fn img_tags_rewritten_to_source_url() {
        let body = "before <img width=\"600\" src=\"https://example.com/shot.png\" alt=\"x\"> after";
        assert_eq!(
            clean_body(body),
            "before https://example.com/shot.png after"
        );
    }

    #[test]
    fn multiline_comment_stripped() {
        let body = "a<!-- first\nsecond\nthird -->b";
        assert_eq!(clean_body(body), "ab");
    }

    #[test]
    fn quote_mode_wraps_body_in_blockquote() {
        let rendered = render_release(NoteFormat::Quote, &repo(), &release("Big Update", "v2.0", "Fixes"));
        assert_eq!(rendered.parse_mode, Some(ParseMode::Html));
        assert!(rendered.text.contains("<a href='https://github.com/owner/name'>owner/name</a>:"));
        assert!(rendered.text.contains("<b>Big Update</b>"));
        assert!(rendered.text.contains("<code>v2.0</code>"));
        assert!(rendered.text.contains("<blockquote>Fixes</blockquote>"));
        assert!(rendered.text.contains("release note..."));
        assert!(!rendered.text.contains("pre-release"));
    }

    #[test]
    fn pre_mode_wraps_body_in_pre() {
        let rendered = render_release(NoteFormat::Pre, &repo(), &release("Big Update", "v2.0", "Fixes"));
        assert!(rendered.text.contains("<pre>Fixes</pre>"));
    }

    #[test]
    fn redundant_title_renders_empty() {
        let rendered = render_release(NoteFormat::Quote, &repo(), &release("v2.0", "v2.0", "Fixes"));
        assert!(rendered.text.contains("<b></b>"));
    }

    #[test]
    fn prerelease_marker_present() {
        let mut rel = release("", "v2.0-rc1", "");
        rel.prerelease = true;
        let rendered = render_release(NoteFormat::Quote, &repo(), &rel);
        assert!(rendered.text.contains("<i>pre-release</i>"));

        let rendered = render_release(NoteFormat::Markdown, &repo(), &rel);
        assert!(rendered.text.contains("_pre\\-release_"));
    }

    #[test]
    fn markdown_mode_escapes_interpolated_text() {
        let rendered = render_release(
            NoteFormat::Markdown,
            &repo(),
            &release("Fix (urgent)", "v2.0", "1. item\n2. item"),
        );
        assert_eq!(rendered.parse_mode, Some(ParseMode::MarkdownV2));
        assert!(rendered.text.starts_with("[owner/name](https://github.com/owner/name)\n"));
        assert!(rendered.text.contains("*Fix \\(urgent\\)*"));
        assert!(rendered.text.contains("`v2.0`"));
        assert!(rendered.text.contains("1\\. item"));
        assert!(rendered.text.contains("[release note\\.\\.\\.]"));
    }

    #[test]
    fn html_body_is_entity_escaped() {
        let rendered = render_release(
            NoteFormat::Quote,
            &repo(),
            &release("Big Update", "v2.0", "use a < b && c"),
        );
        assert!(rendered.text.contains("use a &lt; b &amp;&amp; c"));
    }

    #[test]
    fn tag_event_renders_two_line_html() {
        let rendered = render_tag(
            &repo(),
            &Tag {
                name: "v0.3".into(),
            },
        );
        assert_eq!(rendered.parse_mode, Some(ParseMode::Html));
        assert_eq!(
            rendered.text,
            "<a href='https://github.com/owner/name'>owner/name</a>:\n<code>v0.3</code>"
        );
    }

    #[test]
    fn lifecycle_notices_are_plain_text() {
        let deleted = repo_deleted_message("owner/name");
        assert_eq!(deleted.parse_mode, None);
        assert_eq!(deleted.text, "GitHub repo owner/name has been deleted");

        let archived = repo_archived_message("owner/name");
        assert_eq!(archived.text, "GitHub repo owner/name has been archived");
    }
}
