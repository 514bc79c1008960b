//! Repository poller: detects release/tag/archival/deletion transitions for
//! every tracked repository and drives notification dispatch.

use anyhow::Result;
use tracing::{error, info, instrument, warn};

use crate::db;
use crate::db::{Pool, TrackedRepo};
use crate::dispatch;
use crate::format;
use crate::format::Rendered;
use crate::github::{GithubError, GithubService};
use crate::model::ReleaseEvent;
use crate::telegram::Messenger;

/// One full poll cycle over all tracked repositories. A single repository's
/// failure never aborts the rest of the cycle.
#[instrument(skip_all)]
pub async fn poll_repositories(
    pool: &Pool,
    github: &dyn GithubService,
    messenger: &dyn Messenger,
    process_pre_releases: bool,
) -> Result<()> {
    for repo in db::list_repos(pool).await? {
        if let Err(err) = poll_repo(pool, github, messenger, &repo, process_pre_releases).await {
            error!(?err, repo = %repo.full_name, "poll failed for repository");
        }
    }
    Ok(())
}

async fn poll_repo(
    pool: &Pool,
    github: &dyn GithubService,
    messenger: &dyn Messenger,
    stored: &TrackedRepo,
    process_pre_releases: bool,
) -> Result<()> {
    // Orphans are deleted before any network call.
    if stored.is_orphan() {
        info!(repo = %stored.full_name, "deleting orphaned repository");
        db::delete_repo(pool, stored.id).await?;
        return Ok(());
    }

    info!(repo = %stored.full_name, "polling repository");
    let fresh = match github.get_repository(stored.id).await {
        Ok(fresh) => fresh,
        Err(GithubError::NotFound) => {
            let notice = format::repo_deleted_message(&stored.full_name);
            info!(repo = %stored.full_name, "repository deleted upstream");
            notify_subscribers(pool, messenger, stored.id, |_| notice.clone()).await?;
            db::delete_repo(pool, stored.id).await?;
            return Ok(());
        }
        Err(err) => {
            warn!(?err, repo = %stored.full_name, "fetch failed; retrying next cycle");
            return Ok(());
        }
    };

    if fresh.full_name != stored.full_name || fresh.html_url != stored.html_url {
        db::refresh_repo_metadata(pool, stored.id, &fresh.full_name, &fresh.html_url).await?;
    }

    if fresh.archived && !stored.archived {
        let notice = format::repo_archived_message(&fresh.full_name);
        info!(repo = %fresh.full_name, "repository archived upstream");
        notify_subscribers(pool, messenger, stored.id, |_| notice.clone()).await?;
        db::set_archived(pool, stored.id, true).await?;
    } else if !fresh.archived && stored.archived {
        // Un-archival is persisted silently.
        db::set_archived(pool, stored.id, false).await?;
    }

    let Some(event) = detect_event(github, stored, process_pre_releases).await? else {
        return Ok(());
    };

    // Commit the new last-seen identity before any dispatch so a crash
    // mid-dispatch cannot re-announce the same release on restart.
    match &event {
        ReleaseEvent::Release(release) => {
            info!(repo = %fresh.full_name, tag = %release.tag_name, "new release");
            db::mark_release_seen(pool, stored.id, release.id, &release.tag_name).await?;
        }
        ReleaseEvent::Tag(tag) => {
            info!(repo = %fresh.full_name, tag = %tag.name, "new tag");
            db::mark_tag_seen(pool, stored.id, &tag.name).await?;
        }
    }

    notify_subscribers(pool, messenger, stored.id, |chat| {
        format::render_event(chat.note_format, &fresh, &event)
    })
    .await
}

/// Compare provider state against the stored last-seen identity. A release is
/// new when its id differs from the stored one; a plain tag is considered
/// only for repositories without any release, so releases permanently shadow
/// tags. Transient provider errors yield `None` (retry next cycle).
async fn detect_event(
    github: &dyn GithubService,
    stored: &TrackedRepo,
    process_pre_releases: bool,
) -> Result<Option<ReleaseEvent>> {
    let latest = match github.latest_release(stored.id, process_pre_releases).await {
        Ok(latest) => latest,
        Err(err) => {
            warn!(?err, repo = %stored.full_name, "release fetch failed; retrying next cycle");
            return Ok(None);
        }
    };

    if let Some(release) = latest {
        if stored.current_release_id == Some(release.id) {
            return Ok(None);
        }
        return Ok(Some(ReleaseEvent::Release(release)));
    }

    // A recorded release shadows tags even when the provider no longer
    // reports any release (e.g. all releases were deleted upstream).
    if stored.current_release_id.is_some() {
        return Ok(None);
    }

    let tag = match github.latest_tag(stored.id).await {
        Ok(tag) => tag,
        Err(err) => {
            warn!(?err, repo = %stored.full_name, "tag fetch failed; retrying next cycle");
            return Ok(None);
        }
    };
    match tag {
        Some(tag) if stored.current_tag.as_deref() != Some(tag.name.as_str()) => {
            Ok(Some(ReleaseEvent::Tag(tag)))
        }
        _ => Ok(None),
    }
}

/// Deliver a message to every subscriber of a repository in stable order,
/// sequentially: each chat's send completes (success or definitive failure)
/// before the next one begins, so a block-triggered removal cannot race an
/// in-flight send.
async fn notify_subscribers<F>(
    pool: &Pool,
    messenger: &dyn Messenger,
    repo_id: i64,
    render: F,
) -> Result<()>
where
    F: Fn(&db::Chat) -> Rendered,
{
    for chat in db::subscribers(pool, repo_id).await? {
        let message = render(&chat);
        dispatch::deliver(pool, messenger, chat.id, &message).await?;
    }
    Ok(())
}
