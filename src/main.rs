use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use teloxide::Bot;
use tracing::info;

use release_bot::config;
use release_bot::db;
use release_bot::github::GithubClient;
use release_bot::poller;
use release_bot::scheduler;
use release_bot::stars;
use release_bot::telegram::TelegramBot;

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let cfg = config::load(Some(&args.config))?;

    let database_url = std::env::var("DATABASE_URL").unwrap_or_else(|_| cfg.app.database_url.clone());
    let pool = db::init_pool(&database_url).await?;
    db::run_migrations(&pool).await?;

    let timeout = Duration::from_secs(cfg.app.request_timeout_secs);
    let github = Arc::new(GithubClient::new(&cfg.github.token, timeout));
    let messenger = Arc::new(TelegramBot::new(Bot::new(cfg.telegram.bot_token.clone()), timeout));

    let process_pre_releases = cfg.app.process_pre_releases;
    {
        let pool = pool.clone();
        let github = github.clone();
        let messenger = messenger.clone();
        scheduler::spawn_recurring(
            "poll_repositories",
            Duration::from_secs(cfg.app.poll_interval_secs),
            move || {
                let pool = pool.clone();
                let github = github.clone();
                let messenger = messenger.clone();
                async move {
                    poller::poll_repositories(
                        &pool,
                        github.as_ref(),
                        messenger.as_ref(),
                        process_pre_releases,
                    )
                    .await
                }
            },
        );
    }
    {
        let pool = pool.clone();
        let github = github.clone();
        let messenger = messenger.clone();
        scheduler::spawn_recurring(
            "poll_user_stars",
            Duration::from_secs(cfg.app.star_poll_interval_secs),
            move || {
                let pool = pool.clone();
                let github = github.clone();
                let messenger = messenger.clone();
                async move {
                    stars::poll_user_stars(&pool, github.as_ref(), messenger.as_ref()).await
                }
            },
        );
    }

    info!("release-bot started");
    tokio::signal::ctrl_c().await?;
    // Last-seen state commits before dispatch, so stopping mid-cycle leaves
    // the store consistent.
    info!("shutting down");
    Ok(())
}
