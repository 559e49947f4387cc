//! GitHub source client
//!
//! Paginated REST reads of the issues, repositories, events, comments and
//! READMEs that the content push turns into search items.

use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::config::AppConfig;

const USER_AGENT: &str = "graph-connector/0.1";
const ACCEPT_JSON: &str = "application/vnd.github+json";
const ACCEPT_RAW: &str = "application/vnd.github.raw+json";
const PER_PAGE: &str = "100";

/// GitHub client errors
#[derive(Debug, Error)]
pub enum GitHubError {
    #[error("API request failed with status {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("URL parsing error: {0}")]
    Url(#[from] url::ParseError),
}

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub login: String,
    #[serde(default)]
    pub html_url: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Label {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Issue {
    pub number: u64,
    pub title: String,
    #[serde(default)]
    pub body: Option<String>,
    pub state: String,
    pub html_url: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub user: Option<User>,
    #[serde(default)]
    pub assignees: Vec<User>,
    #[serde(default)]
    pub labels: Vec<Label>,
    /// Present when the "issue" is actually a pull request.
    #[serde(default)]
    pub pull_request: Option<JsonValue>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IssueEvent {
    pub id: u64,
    pub event: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub actor: Option<User>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IssueComment {
    pub id: u64,
    #[serde(default)]
    pub body: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub user: Option<User>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Repository {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub visibility: Option<String>,
    pub html_url: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    pub owner: User,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RepositoryEvent {
    pub id: String,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub actor: Option<User>,
}

/// Read-only client scoped to one owner and repository.
#[derive(Clone)]
pub struct GitHubClient {
    http_client: Client,
    api_base: String,
    owner: String,
    repo: String,
    token: String,
}

impl GitHubClient {
    pub fn new(
        http_client: Client,
        api_base: String,
        owner: String,
        repo: String,
        token: String,
    ) -> Self {
        Self {
            http_client,
            api_base: api_base.trim_end_matches('/').to_string(),
            owner,
            repo,
            token,
        }
    }

    pub fn from_config(config: &AppConfig, http_client: Client) -> Self {
        Self::new(
            http_client,
            config.github_api_base.clone(),
            config.github_owner.clone(),
            config.github_repo.clone(),
            config.github_token.clone(),
        )
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn repo(&self) -> &str {
        &self.repo
    }

    /// Issues of the configured repository in every state; pull requests excluded.
    pub async fn list_issues(&self) -> Result<Vec<Issue>, GitHubError> {
        let mut url = self.endpoint(&format!("/repos/{}/{}/issues", self.owner, self.repo))?;
        url.query_pairs_mut().append_pair("state", "all");

        let issues: Vec<Issue> = self.get_paginated(url).await?;
        Ok(issues
            .into_iter()
            .filter(|issue| issue.pull_request.is_none())
            .collect())
    }

    /// Repositories owned by the configured owner.
    pub async fn list_repositories(&self) -> Result<Vec<Repository>, GitHubError> {
        let url = self.endpoint(&format!("/users/{}/repos", self.owner))?;
        self.get_paginated(url).await
    }

    pub async fn list_events_for_issue(&self, number: u64) -> Result<Vec<IssueEvent>, GitHubError> {
        let url = self.endpoint(&format!(
            "/repos/{}/{}/issues/{}/events",
            self.owner, self.repo, number
        ))?;
        self.get_paginated(url).await
    }

    pub async fn list_comments_for_issue(
        &self,
        number: u64,
    ) -> Result<Vec<IssueComment>, GitHubError> {
        let url = self.endpoint(&format!(
            "/repos/{}/{}/issues/{}/comments",
            self.owner, self.repo, number
        ))?;
        self.get_paginated(url).await
    }

    pub async fn list_events_for_repo(
        &self,
        name: &str,
    ) -> Result<Vec<RepositoryEvent>, GitHubError> {
        let url = self.endpoint(&format!("/repos/{}/{}/events", self.owner, name))?;
        self.get_paginated(url).await
    }

    /// Raw README markdown, or `None` when the repository has no README.
    pub async fn get_readme(&self, name: &str) -> Result<Option<String>, GitHubError> {
        let url = self.endpoint(&format!("/repos/{}/{}/readme", self.owner, name))?;
        let response = self
            .http_client
            .get(url)
            .bearer_auth(&self.token)
            .header("User-Agent", USER_AGENT)
            .header("Accept", ACCEPT_RAW)
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(GitHubError::Api { status, message });
        }

        Ok(Some(response.text().await?))
    }

    fn endpoint(&self, path: &str) -> Result<Url, GitHubError> {
        Ok(Url::parse(&format!("{}{}", self.api_base, path))?)
    }

    /// Follow `Link: rel="next"` until the last page.
    async fn get_paginated<T: DeserializeOwned>(
        &self,
        mut url: Url,
    ) -> Result<Vec<T>, GitHubError> {
        url.query_pairs_mut().append_pair("per_page", PER_PAGE);

        let mut items = Vec::new();
        let mut next = Some(url.to_string());

        while let Some(page_url) = next.take() {
            let response = self
                .http_client
                .get(&page_url)
                .bearer_auth(&self.token)
                .header("User-Agent", USER_AGENT)
                .header("Accept", ACCEPT_JSON)
                .send()
                .await?;

            if !response.status().is_success() {
                let status = response.status().as_u16();
                let message = response.text().await.unwrap_or_default();
                return Err(GitHubError::Api { status, message });
            }

            next = response
                .headers()
                .get("Link")
                .and_then(|h| h.to_str().ok())
                .and_then(parse_next_link);

            let mut page: Vec<T> = response.json().await?;
            debug!(url = %page_url, count = page.len(), "Fetched GitHub page");
            items.append(&mut page);
        }

        Ok(items)
    }
}

/// Extract the `rel="next"` target from a GitHub `Link` header.
fn parse_next_link(link_header: &str) -> Option<String> {
    // Format: <https://api.github.com/resource?page=2>; rel="next", <...>; rel="last"
    for link in link_header.split(',') {
        let mut parts = link.split(';');
        let url_part = parts.next()?.trim();
        if parts.any(|param| param.trim() == "rel=\"next\"")
            && let Some(start) = url_part.find('<')
            && let Some(end) = url_part.find('>')
        {
            return Some(url_part[start + 1..end].to_string());
        }
    }
    None
}
