use super::model::{Chat, TrackedRepo};
use crate::model::NoteFormat;
use anyhow::Result;
use sqlx::{Row, SqlitePool};
use tracing::instrument;

pub type Pool = SqlitePool;

pub async fn init_pool(database_url: &str) -> Result<Pool> {
    let normalized = prepare_sqlite_url(database_url);
    let pool = SqlitePool::connect(&normalized).await?;
    // Enable WAL and stricter durability; cascade deletes rely on FKs.
    sqlx::query("PRAGMA journal_mode=WAL;")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA synchronous=FULL;")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA foreign_keys=ON;").execute(&pool).await?;
    Ok(pool)
}

/// If using a file-backed SQLite URL, expand a leading `~/` and ensure the
/// parent directory exists. Leaves in-memory URLs untouched. Returns the
/// possibly-updated URL.
fn prepare_sqlite_url(url: &str) -> String {
    // Pass through non-sqlite schemes
    if !url.starts_with("sqlite:") {
        return url.to_string();
    }

    // In-memory URLs like sqlite::memory: or sqlite::memory:?cache=shared
    if url.starts_with("sqlite::memory") {
        return url.to_string();
    }

    // Strip prefix and optional //
    let rest = &url["sqlite:".len()..];
    let path_with_query = rest.strip_prefix("//").unwrap_or(rest);

    // Separate query string if any
    let (path_part, query_part) = match path_with_query.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (path_with_query, None),
    };

    if path_part.is_empty() {
        // nothing to normalize
        return url.to_string();
    }

    // Expand leading ~/ to HOME
    let expanded_path = if let Some(rest) = path_part.strip_prefix("~/") {
        if let Ok(home) = std::env::var("HOME") {
            format!("{}/{}", home.trim_end_matches('/'), rest)
        } else {
            path_part.to_string()
        }
    } else {
        path_part.to_string()
    };

    // Ensure parent directory exists if any
    if let Some(parent) = std::path::Path::new(&expanded_path).parent() {
        if !parent.as_os_str().is_empty() {
            let _ = std::fs::create_dir_all(parent);
        }
    }

    // Rebuild URL, prefer sqlite:// form
    let mut rebuilt = String::from("sqlite://");
    rebuilt.push_str(&expanded_path);
    if let Some(q) = query_part {
        rebuilt.push('?');
        rebuilt.push_str(q);
    }
    rebuilt
}

pub async fn run_migrations(pool: &Pool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

fn chat_from_row(row: &sqlx::sqlite::SqliteRow) -> Chat {
    let format: String = row.get("release_note_format");
    Chat {
        id: row.get("id"),
        note_format: NoteFormat::parse(&format),
        github_username: row
            .try_get::<Option<String>, _>("github_username")
            .ok()
            .flatten(),
    }
}

#[instrument(skip_all)]
pub async fn get_or_create_chat(pool: &Pool, chat_id: i64) -> Result<Chat> {
    if let Some(row) =
        sqlx::query("SELECT id, release_note_format, github_username FROM chats WHERE id = ?")
            .bind(chat_id)
            .fetch_optional(pool)
            .await?
    {
        return Ok(chat_from_row(&row));
    }

    sqlx::query("INSERT INTO chats (id, release_note_format) VALUES (?, ?)")
        .bind(chat_id)
        .bind(NoteFormat::default().as_str())
        .execute(pool)
        .await?;
    Ok(Chat {
        id: chat_id,
        note_format: NoteFormat::default(),
        github_username: None,
    })
}

/// Removes the chat and, via FK cascade, all of its subscriptions.
#[instrument(skip_all)]
pub async fn delete_chat(pool: &Pool, chat_id: i64) -> Result<()> {
    sqlx::query("DELETE FROM chats WHERE id = ?")
        .bind(chat_id)
        .execute(pool)
        .await?;
    Ok(())
}

#[instrument(skip_all)]
pub async fn set_note_format(pool: &Pool, chat_id: i64, format: NoteFormat) -> Result<()> {
    sqlx::query("UPDATE chats SET release_note_format = ? WHERE id = ?")
        .bind(format.as_str())
        .bind(chat_id)
        .execute(pool)
        .await?;
    Ok(())
}

#[instrument(skip_all)]
pub async fn link_github_username(
    pool: &Pool,
    chat_id: i64,
    username: Option<&str>,
) -> Result<()> {
    sqlx::query("UPDATE chats SET github_username = ? WHERE id = ?")
        .bind(username)
        .bind(chat_id)
        .execute(pool)
        .await?;
    Ok(())
}

fn repo_from_row(row: &sqlx::sqlite::SqliteRow) -> TrackedRepo {
    TrackedRepo {
        id: row.get("id"),
        full_name: row.get("full_name"),
        html_url: row.get("html_url"),
        archived: row.get::<i64, _>("archived") != 0,
        current_release_id: row
            .try_get::<Option<i64>, _>("current_release_id")
            .ok()
            .flatten(),
        current_release_tag: row
            .try_get::<Option<String>, _>("current_release_tag")
            .ok()
            .flatten(),
        current_tag: row.try_get::<Option<String>, _>("current_tag").ok().flatten(),
        subscriber_count: row.try_get("subscriber_count").unwrap_or(0),
        created_at: row.get("created_at"),
    }
}

const REPO_COLUMNS: &str = "r.id, r.full_name, r.html_url, r.archived, \
     r.current_release_id, r.current_release_tag, r.current_tag, r.created_at, \
     (SELECT COUNT(*) FROM subscriptions s WHERE s.repo_id = r.id) AS subscriber_count";

#[instrument(skip_all)]
pub async fn get_or_create_repo(
    pool: &Pool,
    repo_id: i64,
    full_name: &str,
    html_url: &str,
) -> Result<TrackedRepo> {
    sqlx::query("INSERT INTO repos (id, full_name, html_url) VALUES (?, ?, ?) ON CONFLICT(id) DO NOTHING")
        .bind(repo_id)
        .bind(full_name)
        .bind(html_url)
        .execute(pool)
        .await?;
    let row = sqlx::query(&format!("SELECT {REPO_COLUMNS} FROM repos r WHERE r.id = ?"))
        .bind(repo_id)
        .fetch_one(pool)
        .await?;
    Ok(repo_from_row(&row))
}

/// Removes the repository and, via FK cascade, all of its subscriptions.
#[instrument(skip_all)]
pub async fn delete_repo(pool: &Pool, repo_id: i64) -> Result<()> {
    sqlx::query("DELETE FROM repos WHERE id = ?")
        .bind(repo_id)
        .execute(pool)
        .await?;
    Ok(())
}

/// All tracked repositories with their subscriber counts, in id order so a
/// poll cycle visits repositories deterministically.
#[instrument(skip_all)]
pub async fn list_repos(pool: &Pool) -> Result<Vec<TrackedRepo>> {
    let rows = sqlx::query(&format!(
        "SELECT {REPO_COLUMNS} FROM repos r ORDER BY r.id ASC"
    ))
    .fetch_all(pool)
    .await?;
    Ok(rows.iter().map(repo_from_row).collect())
}

/// Subscribers of a repository in stable (chat id) order.
#[instrument(skip_all)]
pub async fn subscribers(pool: &Pool, repo_id: i64) -> Result<Vec<Chat>> {
    let rows = sqlx::query(
        "SELECT c.id, c.release_note_format, c.github_username \
         FROM chats c JOIN subscriptions s ON s.chat_id = c.id \
         WHERE s.repo_id = ? ORDER BY c.id ASC",
    )
    .bind(repo_id)
    .fetch_all(pool)
    .await?;
    Ok(rows.iter().map(chat_from_row).collect())
}

#[instrument(skip_all)]
pub async fn chats_with_github_username(pool: &Pool) -> Result<Vec<Chat>> {
    let rows = sqlx::query(
        "SELECT id, release_note_format, github_username FROM chats \
         WHERE github_username IS NOT NULL ORDER BY id ASC",
    )
    .fetch_all(pool)
    .await?;
    Ok(rows.iter().map(chat_from_row).collect())
}

#[instrument(skip_all)]
pub async fn subscribe(pool: &Pool, chat_id: i64, repo_id: i64) -> Result<()> {
    sqlx::query(
        "INSERT INTO subscriptions (chat_id, repo_id) VALUES (?, ?) \
         ON CONFLICT(chat_id, repo_id) DO NOTHING",
    )
    .bind(chat_id)
    .bind(repo_id)
    .execute(pool)
    .await?;
    Ok(())
}

#[instrument(skip_all)]
pub async fn unsubscribe(pool: &Pool, chat_id: i64, repo_id: i64) -> Result<()> {
    sqlx::query("DELETE FROM subscriptions WHERE chat_id = ? AND repo_id = ?")
        .bind(chat_id)
        .bind(repo_id)
        .execute(pool)
        .await?;
    Ok(())
}

#[instrument(skip_all)]
pub async fn is_subscribed(pool: &Pool, chat_id: i64, repo_id: i64) -> Result<bool> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM subscriptions WHERE chat_id = ? AND repo_id = ?",
    )
    .bind(chat_id)
    .bind(repo_id)
    .fetch_one(pool)
    .await?;
    Ok(count > 0)
}

/// Record the last-seen release. Must be committed before dispatch begins so
/// a crash mid-dispatch never re-announces the same release.
#[instrument(skip_all)]
pub async fn mark_release_seen(
    pool: &Pool,
    repo_id: i64,
    release_id: i64,
    tag_name: &str,
) -> Result<()> {
    sqlx::query(
        "UPDATE repos SET current_release_id = ?, current_release_tag = ? WHERE id = ?",
    )
    .bind(release_id)
    .bind(tag_name)
    .bind(repo_id)
    .execute(pool)
    .await?;
    Ok(())
}

/// Record the last-seen plain tag (only meaningful for repositories that have
/// never published a release).
#[instrument(skip_all)]
pub async fn mark_tag_seen(pool: &Pool, repo_id: i64, tag_name: &str) -> Result<()> {
    sqlx::query("UPDATE repos SET current_tag = ? WHERE id = ?")
        .bind(tag_name)
        .bind(repo_id)
        .execute(pool)
        .await?;
    Ok(())
}

#[instrument(skip_all)]
pub async fn set_archived(pool: &Pool, repo_id: i64, archived: bool) -> Result<()> {
    sqlx::query("UPDATE repos SET archived = ? WHERE id = ?")
        .bind(archived as i64)
        .bind(repo_id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Keep the stored name/url in sync with what the provider reports (repos get
/// renamed and transferred).
#[instrument(skip_all)]
pub async fn refresh_repo_metadata(
    pool: &Pool,
    repo_id: i64,
    full_name: &str,
    html_url: &str,
) -> Result<()> {
    sqlx::query("UPDATE repos SET full_name = ?, html_url = ? WHERE id = ?")
        .bind(full_name)
        .bind(html_url)
        .bind(repo_id)
        .execute(pool)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn setup_pool() -> Pool {
        let pool = init_pool("sqlite::memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();
        pool
    }

    #[tokio::test]
    async fn chat_defaults_to_markdown_format() {
        let pool = setup_pool().await;
        let chat = get_or_create_chat(&pool, 100).await.unwrap();
        assert_eq!(chat.note_format, NoteFormat::Markdown);
        assert!(chat.github_username.is_none());

        // Idempotent and preserves updates
        set_note_format(&pool, 100, NoteFormat::Quote).await.unwrap();
        let chat = get_or_create_chat(&pool, 100).await.unwrap();
        assert_eq!(chat.note_format, NoteFormat::Quote);
    }

    #[tokio::test]
    async fn subscription_counts_and_orphans() {
        let pool = setup_pool().await;
        get_or_create_chat(&pool, 1).await.unwrap();
        let repo = get_or_create_repo(&pool, 500, "owner/name", "https://github.com/owner/name")
            .await
            .unwrap();
        assert!(repo.is_orphan());

        subscribe(&pool, 1, 500).await.unwrap();
        subscribe(&pool, 1, 500).await.unwrap(); // duplicate is a no-op
        let repos = list_repos(&pool).await.unwrap();
        assert_eq!(repos.len(), 1);
        assert_eq!(repos[0].subscriber_count, 1);

        unsubscribe(&pool, 1, 500).await.unwrap();
        let repos = list_repos(&pool).await.unwrap();
        assert!(repos[0].is_orphan());
    }

    #[tokio::test]
    async fn deleting_chat_cascades_subscriptions() {
        let pool = setup_pool().await;
        get_or_create_chat(&pool, 1).await.unwrap();
        get_or_create_chat(&pool, 2).await.unwrap();
        get_or_create_repo(&pool, 500, "owner/name", "https://github.com/owner/name")
            .await
            .unwrap();
        subscribe(&pool, 1, 500).await.unwrap();
        subscribe(&pool, 2, 500).await.unwrap();

        delete_chat(&pool, 1).await.unwrap();
        let subs = subscribers(&pool, 500).await.unwrap();
        assert_eq!(subs.len(), 1);
        assert_eq!(subs[0].id, 2);
    }

    #[tokio::test]
    async fn deleting_repo_cascades_subscriptions() {
        let pool = setup_pool().await;
        get_or_create_chat(&pool, 1).await.unwrap();
        get_or_create_repo(&pool, 500, "owner/name", "https://github.com/owner/name")
            .await
            .unwrap();
        subscribe(&pool, 1, 500).await.unwrap();

        delete_repo(&pool, 500).await.unwrap();
        assert!(list_repos(&pool).await.unwrap().is_empty());
        assert!(!is_subscribed(&pool, 1, 500).await.unwrap());
    }

    #[tokio::test]
    async fn last_seen_updates() {
        let pool = setup_pool().await;
        get_or_create_repo(&pool, 500, "owner/name", "https://github.com/owner/name")
            .await
            .unwrap();

        mark_release_seen(&pool, 500, 11, "v2.0").await.unwrap();
        let repo = &list_repos(&pool).await.unwrap()[0];
        assert_eq!(repo.current_release_id, Some(11));
        assert_eq!(repo.current_release_tag.as_deref(), Some("v2.0"));
        assert_eq!(repo.current_tag, None);

        mark_tag_seen(&pool, 500, "v0.1").await.unwrap();
        let repo = &list_repos(&pool).await.unwrap()[0];
        assert_eq!(repo.current_tag.as_deref(), Some("v0.1"));
    }

    #[tokio::test]
    async fn chats_with_username_filter() {
        let pool = setup_pool().await;
        get_or_create_chat(&pool, 1).await.unwrap();
        get_or_create_chat(&pool, 2).await.unwrap();
        link_github_username(&pool, 2, Some("octocat")).await.unwrap();

        let linked = chats_with_github_username(&pool).await.unwrap();
        assert_eq!(linked.len(), 1);
        assert_eq!(linked[0].id, 2);
        assert_eq!(linked[0].github_username.as_deref(), Some("octocat"));
    }

    #[test]
    fn sqlite_url_normalization() {
        assert_eq!(prepare_sqlite_url("sqlite::memory:"), "sqlite::memory:");
        assert_eq!(
            prepare_sqlite_url("postgres://x/y"),
            "postgres://x/y".to_string()
        );
        let td = tempfile::tempdir().unwrap();
        let nested = format!("sqlite://{}/a/b/test.db", td.path().display());
        let rebuilt = prepare_sqlite_url(&nested);
        assert!(rebuilt.starts_with("sqlite://"));
        assert!(td.path().join("a/b").exists());
    }
}
