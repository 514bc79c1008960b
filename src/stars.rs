//! User-star poller: reconciles each chat's linked GitHub account with its
//! auto-subscriptions. Addition-only: unstarring never removes a
//! subscription.

use anyhow::Result;
use tracing::{error, info, instrument, warn};

use crate::db;
use crate::db::{Chat, Pool};
use crate::dispatch;
use crate::dispatch::Outcome;
use crate::format;
use crate::github::{GithubError, GithubService};
use crate::telegram::Messenger;

/// One full poll cycle over all chats with a linked GitHub username. One
/// chat's failure never aborts the rest of the cycle.
#[instrument(skip_all)]
pub async fn poll_user_stars(
    pool: &Pool,
    github: &dyn GithubService,
    messenger: &dyn Messenger,
) -> Result<()> {
    for chat in db::chats_with_github_username(pool).await? {
        if let Err(err) = sync_chat_stars(pool, github, messenger, &chat).await {
            error!(?err, chat_id = chat.id, "star sync failed for chat");
        }
    }
    Ok(())
}

async fn sync_chat_stars(
    pool: &Pool,
    github: &dyn GithubService,
    messenger: &dyn Messenger,
    chat: &Chat,
) -> Result<()> {
    let Some(login) = chat.github_username.as_deref() else {
        return Ok(());
    };

    let user = match github.get_user(login).await {
        Ok(user) => user,
        Err(GithubError::NotFound) => {
            error!(login, chat_id = chat.id, "can't find GitHub user");
            return Ok(());
        }
        Err(err) => {
            warn!(?err, login, "user fetch failed; retrying next cycle");
            return Ok(());
        }
    };

    let starred = match github.starred_repositories(&user.login).await {
        Ok(starred) => starred,
        Err(err) => {
            warn!(?err, login, "starred fetch failed; retrying next cycle");
            return Ok(());
        }
    };

    for repo in starred {
        if db::is_subscribed(pool, chat.id, repo.id).await? {
            continue;
        }
        db::get_or_create_repo(pool, repo.id, &repo.full_name, &repo.html_url).await?;
        db::subscribe(pool, chat.id, repo.id).await?;
        info!(chat_id = chat.id, repo = %repo.full_name, "tracking starred repository");

        let message = format::now_tracking_message(&repo);
        if dispatch::deliver(pool, messenger, chat.id, &message).await? == Outcome::ChatRemoved {
            // The cascade already dropped this chat's subscriptions.
            return Ok(());
        }
    }
    Ok(())
}
