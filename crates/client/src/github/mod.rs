//! GitHub-hosted catalogue source.
//!
//! ### Protocol
//!
//! - **Content**: `GET https://{raw_host}/{owner}/{repo}/{branch}/{file_path}`
//!   with `If-None-Match` set to the ETag of the copy we hold.
//! - **Modification date**: `GET https://{api_host}/repos/{owner}/{repo}/commits`
//!   with `path={file_path}&page=1&per_page=1`, reading the author date of the
//!   newest commit. Only issued after a 200, so conditional hits cost nothing
//!   against the API quota.
//! - **Authentication**: `Authorization: token <t>` when credentials are set.
//!
//! Status mapping: 200 -> `Updated`, 304 -> `Unchanged`, 403 -> `RateLimited`
//! or `Forbidden` depending on the retry headers, anything else is an error.

pub mod rate_limit;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, RequestBuilder, StatusCode, header};
use serde::Deserialize;
use url::Url;

use catalogue_core::AppConfig;
use catalogue_core::source::{CatalogueSource, Clock, FetchError, FetchOutcome, SystemClock};

/// Default base URL for raw file contents.
const DEFAULT_RAW_BASE_URL: &str = "https://raw.githubusercontent.com";

/// Default base URL for the REST API.
const DEFAULT_API_BASE_URL: &str = "https://api.github.com";

/// Media type requested from the commits API.
const GITHUB_V3_JSON: &str = "application/vnd.github.v3+json";

/// GitHub source configuration.
#[derive(Debug, Clone)]
pub struct GitHubConfig {
    pub owner: String,
    pub repo: String,
    /// Path of the catalogue inside the repository.
    pub file_path: String,
    /// Branch to read the file from (default: master).
    pub branch: String,
    /// Base URL for raw contents (default: https://raw.githubusercontent.com).
    pub raw_base_url: String,
    /// Base URL for the API (default: https://api.github.com).
    pub api_base_url: String,
    /// Token sent as `Authorization: token <t>`.
    pub auth_token: Option<String>,
    /// Request timeout (default: 20s).
    pub timeout: Duration,
    /// Largest catalogue body accepted (default: 5MB).
    pub max_bytes: usize,
    pub user_agent: String,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            owner: String::new(),
            repo: String::new(),
            file_path: String::new(),
            branch: "master".to_string(),
            raw_base_url: DEFAULT_RAW_BASE_URL.to_string(),
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            auth_token: None,
            timeout: Duration::from_millis(20_000),
            max_bytes: 5 * 1024 * 1024,
            user_agent: "catalogue-server/0.1".to_string(),
        }
    }
}

impl GitHubConfig {
    /// Build the source configuration from application settings.
    pub fn from_app_config(config: &AppConfig) -> Self {
        let github = &config.github;
        Self {
            owner: github.owner.clone(),
            repo: github.repo.clone(),
            file_path: github.file_path.clone(),
            branch: github.branch.clone(),
            raw_base_url: format!("https://{}", github.raw_host),
            api_base_url: format!("https://{}", github.api_host),
            auth_token: github.credentials().map(|(_, token)| token.to_string()),
            timeout: config.timeout(),
            max_bytes: config.max_bytes,
            user_agent: config.user_agent.clone(),
        }
    }

    /// URL of the raw catalogue file.
    pub fn content_url(&self) -> Result<Url, FetchError> {
        let mut url = parse_base(&self.raw_base_url)?;
        url.path_segments_mut()
            .map_err(|_| FetchError::Client(format!("cannot use {} as a base URL", self.raw_base_url)))?
            .pop_if_empty()
            .extend([self.owner.as_str(), self.repo.as_str(), self.branch.as_str()])
            .extend(self.file_path.split('/').filter(|s| !s.is_empty()));
        Ok(url)
    }

    /// URL listing the newest commit touching the catalogue file.
    pub fn commits_url(&self) -> Result<Url, FetchError> {
        let mut url = parse_base(&self.api_base_url)?;
        url.path_segments_mut()
            .map_err(|_| FetchError::Client(format!("cannot use {} as a base URL", self.api_base_url)))?
            .pop_if_empty()
            .extend(["repos", self.owner.as_str(), self.repo.as_str(), "commits"]);
        url.query_pairs_mut()
            .append_pair("path", &self.file_path)
            .append_pair("page", "1")
            .append_pair("per_page", "1");
        Ok(url)
    }
}

fn parse_base(base: &str) -> Result<Url, FetchError> {
    Url::parse(base).map_err(|e| {
        FetchError::Client(format!(
            "invalid GitHub base URL {base}: {e}. This is a configuration problem; check the GitHub host settings"
        ))
    })
}

/// One entry of the commits API response; only the author date is read.
#[derive(Debug, Deserialize)]
struct CommitEntry {
    commit: CommitDetail,
}

#[derive(Debug, Deserialize)]
struct CommitDetail {
    author: CommitAuthor,
}

#[derive(Debug, Deserialize)]
struct CommitAuthor {
    date: DateTime<Utc>,
}

/// Catalogue source backed by a file in a GitHub repository.
#[derive(Clone)]
pub struct GitHubSource {
    http: Client,
    config: GitHubConfig,
    content_url: Url,
    commits_url: Url,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for GitHubSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubSource")
            .field("content_url", &self.content_url.as_str())
            .field("commits_url", &self.commits_url.as_str())
            .field("authenticated", &self.config.auth_token.is_some())
            .finish()
    }
}

impl GitHubSource {
    /// Create a new GitHub source with the given configuration.
    pub fn new(config: GitHubConfig) -> Result<Self, FetchError> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Create a source that reads the current time from `clock` when
    /// interpreting rate-limit headers.
    pub fn with_clock(config: GitHubConfig, clock: Arc<dyn Clock>) -> Result<Self, FetchError> {
        let http = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout)
            .use_rustls_tls()
            .gzip(true)
            .build()
            .map_err(|e| FetchError::Client(format!("failed to build HTTP client: {e}")))?;

        let content_url = config.content_url()?;
        let commits_url = config.commits_url()?;

        Ok(Self { http, config, content_url, commits_url, clock })
    }

    pub fn content_url(&self) -> &Url {
        &self.content_url
    }

    fn get(&self, url: &Url) -> RequestBuilder {
        let request = self.http.get(url.as_str());
        match &self.config.auth_token {
            Some(token) => request.header(header::AUTHORIZATION, format!("token {token}")),
            None => request,
        }
    }

    /// Read the catalogue body, refusing anything over `max_bytes`.
    async fn read_content(&self, response: reqwest::Response) -> Result<String, FetchError> {
        let url = &self.content_url;
        let max_bytes = self.config.max_bytes;

        if let Some(len) = response.content_length()
            && len > max_bytes as u64
        {
            return Err(FetchError::TooLarge(format!("{url}: {len} bytes exceeds {max_bytes}")));
        }

        let bytes = response.bytes().await.map_err(|e| transport_error(url, &e))?;
        if bytes.len() > max_bytes {
            return Err(FetchError::TooLarge(format!("{url}: {} bytes exceeds {max_bytes}", bytes.len())));
        }

        String::from_utf8(bytes.to_vec()).map_err(|e| FetchError::Malformed(format!("catalogue from {url}: {e}")))
    }

    /// Author date of the newest commit that touched the catalogue file.
    async fn fetch_modification_date(&self) -> Result<DateTime<Utc>, FetchError> {
        let url = &self.commits_url;
        let response = self
            .get(url)
            .header(header::ACCEPT, GITHUB_V3_JSON)
            .send()
            .await
            .map_err(|e| transport_error(url, &e))?;

        let status = response.status();
        if status != StatusCode::OK {
            tracing::error!(%url, status = status.as_u16(), "unexpected response code while fetching catalogue metadata");
            return Err(FetchError::UnexpectedStatus { url: url.to_string(), status: status.as_u16() });
        }

        let bytes = response.bytes().await.map_err(|e| transport_error(url, &e))?;
        let commits: Vec<CommitEntry> = serde_json::from_slice(&bytes)
            .map_err(|e| FetchError::Malformed(format!("commits response from {url}: {e}")))?;

        commits
            .into_iter()
            .next()
            .map(|entry| entry.commit.author.date)
            .ok_or_else(|| FetchError::Malformed(format!("no commits listed for {}", self.config.file_path)))
    }
}

#[async_trait]
impl CatalogueSource for GitHubSource {
    async fn fetch(&self, prior_revision_token: Option<&str>) -> Result<FetchOutcome, FetchError> {
        let url = &self.content_url;
        let mut request = self.get(url);
        if let Some(etag) = prior_revision_token {
            request = request.header(header::IF_NONE_MATCH, etag);
        }

        let response = request.send().await.map_err(|e| transport_error(url, &e))?;
        let status = response.status();
        tracing::info!(%url, status = status.as_u16(), "catalogue response status");

        match status {
            StatusCode::OK => {
                let revision_token = response
                    .headers()
                    .get(header::ETAG)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string);
                if revision_token.is_none() {
                    tracing::warn!(%url, "catalogue response carries no ETag; next fetch will be unconditional");
                }

                let content = self.read_content(response).await?;
                let modification_date = self.fetch_modification_date().await?;

                Ok(FetchOutcome::Updated { content, revision_token, modification_date })
            }
            StatusCode::NOT_MODIFIED => Ok(FetchOutcome::Unchanged),
            StatusCode::FORBIDDEN => {
                let retry_at = rate_limit::next_allowed_call(response.headers(), self.clock.now());
                let body = response.text().await.unwrap_or_default();

                match retry_at {
                    Some(retry_at) => {
                        tracing::error!(%url, %retry_at, body = %body, "403 Forbidden received; GitHub might have cut us out");
                        Ok(FetchOutcome::RateLimited { retry_at })
                    }
                    None => {
                        tracing::error!(
                            %url,
                            body = %body,
                            "403 Forbidden received; GitHub might have cut us out. No Retry-After nor X-RateLimit-Reset provided"
                        );
                        Ok(FetchOutcome::Forbidden)
                    }
                }
            }
            other => {
                tracing::error!(%url, status = other.as_u16(), "unexpected response code while fetching catalogue");
                Err(FetchError::UnexpectedStatus { url: url.to_string(), status: other.as_u16() })
            }
        }
    }
}

fn transport_error(url: &Url, err: &reqwest::Error) -> FetchError {
    if err.is_timeout() {
        FetchError::Timeout(url.to_string())
    } else {
        FetchError::Network { url: url.to_string(), message: err.to_string() }
    }
}
