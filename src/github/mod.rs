use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, USER_AGENT};
use reqwest::{Client, StatusCode, Url};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

use crate::github::model::{Release, Repository, Tag, User};

pub mod model;

const GITHUB_API_BASE: &str = "https://api.github.com/";

#[derive(Debug, Error)]
pub enum GithubError {
    /// The repository or user no longer exists; terminal for that entity.
    #[error("not found")]
    NotFound,
    /// API rate limit exhausted; retry on a later cycle.
    #[error("rate limited")]
    RateLimited,
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected status: {0}")]
    Status(StatusCode),
}

/// Read-only slice of the GitHub API consumed by the pollers. Injected so
/// tests can substitute a recording fake.
#[async_trait]
pub trait GithubService: Send + Sync {
    async fn get_repository(&self, repo_id: i64) -> Result<Repository, GithubError>;

    /// Latest qualifying release, or `None` when the repository has none.
    /// With `include_prereleases` the newest release wins even if marked as a
    /// pre-release; drafts never qualify.
    async fn latest_release(
        &self,
        repo_id: i64,
        include_prereleases: bool,
    ) -> Result<Option<Release>, GithubError>;

    /// Most recent tag, or `None` for an untagged repository.
    async fn latest_tag(&self, repo_id: i64) -> Result<Option<Tag>, GithubError>;

    async fn get_user(&self, login: &str) -> Result<User, GithubError>;

    async fn starred_repositories(&self, login: &str) -> Result<Vec<Repository>, GithubError>;
}

#[derive(Clone)]
pub struct GithubClient {
    http: Client,
    base_url: Url,
}

impl fmt::Debug for GithubClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GithubClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl GithubClient {
    pub fn new(token: &str, timeout: Duration) -> Self {
        let base_url = Url::parse(GITHUB_API_BASE).expect("valid default GitHub URL");
        Self::with_base_url(token, timeout, base_url)
    }

    pub fn with_base_url(token: &str, timeout: Duration, base_url: Url) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/vnd.github+json"));
        headers.insert(USER_AGENT, HeaderValue::from_static("release-bot/0.1"));
        if !token.trim().is_empty() {
            if let Ok(mut value) = HeaderValue::from_str(&format!("Bearer {}", token.trim())) {
                value.set_sensitive(true);
                headers.insert(AUTHORIZATION, value);
            }
        }
        let http = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .expect("reqwest client");
        Self { http, base_url }
    }

    fn url(&self, path: &str) -> Result<Url, GithubError> {
        self.base_url
            .join(path)
            .map_err(|_| GithubError::Status(StatusCode::INTERNAL_SERVER_ERROR))
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: Url) -> Result<T, GithubError> {
        let resp = self.http.get(url).send().await?;
        let resp = classify_status(resp)?;
        Ok(resp.json::<T>().await?)
    }
}

/// Map GitHub's status codes onto the error taxonomy. 403/429 with an
/// exhausted rate-limit header means we should back off until the next cycle.
fn classify_status(resp: reqwest::Response) -> Result<reqwest::Response, GithubError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    if status == StatusCode::NOT_FOUND {
        return Err(GithubError::NotFound);
    }
    if status == StatusCode::TOO_MANY_REQUESTS {
        return Err(GithubError::RateLimited);
    }
    if status == StatusCode::FORBIDDEN {
        let exhausted = resp
            .headers()
            .get("x-ratelimit-remaining")
            .and_then(|v| v.to_str().ok())
            .map(|v| v == "0")
            .unwrap_or(false);
        if exhausted {
            return Err(GithubError::RateLimited);
        }
    }
    Err(GithubError::Status(status))
}

#[async_trait]
impl GithubService for GithubClient {
    async fn get_repository(&self, repo_id: i64) -> Result<Repository, GithubError> {
        // By-id endpoint survives renames and transfers.
        self.get_json(self.url(&format!("repositories/{repo_id}"))?)
            .await
    }

    async fn latest_release(
        &self,
        repo_id: i64,
        include_prereleases: bool,
    ) -> Result<Option<Release>, GithubError> {
        if include_prereleases {
            let releases: Vec<Release> = self
                .get_json(self.url(&format!("repositories/{repo_id}/releases?per_page=10"))?)
                .await?;
            return Ok(releases.into_iter().find(|r| !r.draft));
        }
        // `releases/latest` already excludes pre-releases and drafts.
        match self
            .get_json::<Release>(self.url(&format!("repositories/{repo_id}/releases/latest"))?)
            .await
        {
            Ok(release) => Ok(Some(release)),
            Err(GithubError::NotFound) => Ok(None),
            Err(err) => Err(err),
        }
    }

    async fn latest_tag(&self, repo_id: i64) -> Result<Option<Tag>, GithubError> {
        let tags: Vec<Tag> = self
            .get_json(self.url(&format!("repositories/{repo_id}/tags?per_page=1"))?)
            .await?;
        Ok(tags.into_iter().next())
    }

    async fn get_user(&self, login: &str) -> Result<User, GithubError> {
        self.get_json(self.url(&format!("users/{login}"))?).await
    }

    async fn starred_repositories(&self, login: &str) -> Result<Vec<Repository>, GithubError> {
        let mut starred = Vec::new();
        let mut page = 1u32;
        loop {
            let batch: Vec<Repository> = self
                .get_json(self.url(&format!(
                    "users/{login}/starred?per_page=100&page={page}"
                ))?)
                .await?;
            let len = batch.len();
            starred.extend(batch);
            if len < 100 {
                return Ok(starred);
            }
            page += 1;
        }
    }
}
