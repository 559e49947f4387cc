//! Sync Executor
//!
//! One-shot content push: reads issues or repositories from GitHub, turns each
//! into an external item with plain-text content, writes it into a connection
//! and records the item's activities. A failing item is logged and counted;
//! the rest of the run continues.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value as JsonValue, json};
use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};

use crate::github::{
    GitHubClient, GitHubError, Issue, IssueComment, IssueEvent, Repository, RepositoryEvent,
};
use crate::graph::{GraphClient, GraphError};
use crate::models::{Acl, ActivityType, ExternalActivity, ExternalItem, ItemContent};
use crate::registry::ContentType;
use crate::render::to_plain_text;

/// Icon shown next to GitHub results.
pub const GITHUB_ICON_URL: &str = "https://github.githubassets.com/favicons/favicon.png";

const STRING_COLLECTION: &str = "Collection(String)";

/// Errors that abort a whole push run
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("source read failed: {0}")]
    Source(#[from] GitHubError),

    #[error("target write failed: {0}")]
    Target(#[from] GraphError),
}

/// Result of one push run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub pushed: usize,
    pub failed: usize,
}

impl SyncReport {
    fn record(&mut self, result: Result<(), SyncError>, item_id: &str) {
        match result {
            Ok(()) => self.pushed += 1,
            Err(e) => {
                error!(item_id, error = %e, "Failed to push item");
                self.failed += 1;
            }
        }
    }
}

/// Pushes GitHub content into an external connection.
pub struct SyncExecutor {
    github: GitHubClient,
    graph: GraphClient,
    placeholder_user_id: String,
}

impl SyncExecutor {
    pub fn new(github: GitHubClient, graph: GraphClient, placeholder_user_id: String) -> Self {
        Self {
            github,
            graph,
            placeholder_user_id,
        }
    }

    pub async fn push(
        &self,
        connection_id: &str,
        content_type: ContentType,
    ) -> Result<SyncReport, SyncError> {
        match content_type {
            ContentType::Issues => self.push_issues(connection_id).await,
            ContentType::Repositories => self.push_repositories(connection_id).await,
        }
    }

    /// Push every issue of the configured repository.
    #[instrument(skip(self), fields(owner = %self.github.owner(), repo = %self.github.repo()))]
    pub async fn push_issues(&self, connection_id: &str) -> Result<SyncReport, SyncError> {
        let issues = self.github.list_issues().await?;
        info!(count = issues.len(), "Pushing issues");

        let mut report = SyncReport::default();
        for issue in &issues {
            let item_id = issue.number.to_string();
            let result = self.push_issue(connection_id, issue).await;
            report.record(result, &item_id);
        }

        info!(pushed = report.pushed, failed = report.failed, "Issue push finished");
        Ok(report)
    }

    async fn push_issue(&self, connection_id: &str, issue: &Issue) -> Result<(), SyncError> {
        let item = issue_item(issue);
        self.graph.put_item(connection_id, &item).await?;

        let events = self.github.list_events_for_issue(issue.number).await?;
        let comments = self.github.list_comments_for_issue(issue.number).await?;
        let activities = issue_activities(issue, &events, &comments, &self.placeholder_user_id);
        debug!(item_id = %item.id, activities = activities.len(), "Recording issue activities");

        self.graph
            .add_activities(connection_id, &item.id, &activities)
            .await?;
        Ok(())
    }

    /// Push every repository of the configured owner.
    #[instrument(skip(self), fields(owner = %self.github.owner()))]
    pub async fn push_repositories(&self, connection_id: &str) -> Result<SyncReport, SyncError> {
        let repositories = self.github.list_repositories().await?;
        info!(count = repositories.len(), "Pushing repositories");

        let mut report = SyncReport::default();
        for repository in &repositories {
            let result = self.push_repository(connection_id, repository).await;
            report.record(result, &repository.name);
        }

        info!(pushed = report.pushed, failed = report.failed, "Repository push finished");
        Ok(report)
    }

    async fn push_repository(
        &self,
        connection_id: &str,
        repository: &Repository,
    ) -> Result<(), SyncError> {
        let readme = self.github.get_readme(&repository.name).await?;
        if readme.is_none() {
            warn!(repository = %repository.name, "Repository has no README; pushing empty content");
        }

        let item = repository_item(repository, readme.as_deref());
        self.graph.put_item(connection_id, &item).await?;

        let events = self.github.list_events_for_repo(&repository.name).await?;
        let activities = repository_activities(repository, &events, &self.placeholder_user_id);
        self.graph
            .add_activities(connection_id, &item.id, &activities)
            .await?;
        Ok(())
    }
}

fn timestamp(value: DateTime<Utc>) -> JsonValue {
    JsonValue::String(value.to_rfc3339_opts(chrono::SecondsFormat::Secs, true))
}

fn string_collection(properties: &mut Map<String, JsonValue>, name: &str, values: Vec<String>) {
    properties.insert(format!("{}@odata.type", name), json!(STRING_COLLECTION));
    properties.insert(name.to_string(), json!(values));
}

/// Item for one issue, keyed by its number.
pub fn issue_item(issue: &Issue) -> ExternalItem {
    let body = to_plain_text(issue.body.as_deref().unwrap_or_default());

    let mut properties = Map::new();
    properties.insert("title".into(), json!(issue.title));
    properties.insert("body".into(), json!(body));
    string_collection(
        &mut properties,
        "assignees",
        issue.assignees.iter().map(|u| u.login.clone()).collect(),
    );
    string_collection(
        &mut properties,
        "labels",
        issue.labels.iter().map(|l| l.name.clone()).collect(),
    );
    properties.insert("state".into(), json!(issue.state));
    properties.insert("issueUrl".into(), json!(issue.html_url));
    properties.insert("icon".into(), json!(GITHUB_ICON_URL));
    properties.insert(
        "updatedAt".into(),
        timestamp(issue.updated_at.unwrap_or(issue.created_at)),
    );

    ExternalItem {
        id: issue.number.to_string(),
        acl: vec![Acl::everyone()],
        properties,
        content: ItemContent::text(body),
    }
}

/// `created`, then one `modified` per event, then one `commented` per comment.
pub fn issue_activities(
    issue: &Issue,
    events: &[IssueEvent],
    comments: &[IssueComment],
    user_id: &str,
) -> Vec<ExternalActivity> {
    std::iter::once(ExternalActivity::by_user(
        ActivityType::Created,
        issue.created_at,
        user_id,
    ))
    .chain(
        events
            .iter()
            .map(|e| ExternalActivity::by_user(ActivityType::Modified, e.created_at, user_id)),
    )
    .chain(
        comments
            .iter()
            .map(|c| ExternalActivity::by_user(ActivityType::Commented, c.created_at, user_id)),
    )
    .collect()
}

/// Item for one repository, keyed by its name.
pub fn repository_item(repository: &Repository, readme: Option<&str>) -> ExternalItem {
    let mut properties = Map::new();
    properties.insert("title".into(), json!(repository.name));
    properties.insert(
        "description".into(),
        json!(repository.description.clone().unwrap_or_default()),
    );
    properties.insert(
        "visibility".into(),
        json!(repository.visibility.clone().unwrap_or_else(|| "public".to_string())),
    );
    properties.insert("createdBy".into(), json!(repository.owner.login));
    properties.insert(
        "updatedAt".into(),
        timestamp(repository.updated_at.unwrap_or(repository.created_at)),
    );
    properties.insert("repoUrl".into(), json!(repository.html_url));
    properties.insert(
        "userUrl".into(),
        json!(repository.owner.html_url.clone().unwrap_or_default()),
    );
    properties.insert(
        "icon".into(),
        json!(
            repository
                .owner
                .avatar_url
                .clone()
                .unwrap_or_else(|| GITHUB_ICON_URL.to_string())
        ),
    );

    ExternalItem {
        id: repository.name.clone(),
        acl: vec![Acl::everyone()],
        properties,
        content: ItemContent::text(readme.map(to_plain_text).unwrap_or_default()),
    }
}

/// `created`, then one `modified` per repository event.
pub fn repository_activities(
    repository: &Repository,
    events: &[RepositoryEvent],
    user_id: &str,
) -> Vec<ExternalActivity> {
    std::iter::once(ExternalActivity::by_user(
        ActivityType::Created,
        repository.created_at,
        user_id,
    ))
    .chain(
        events
            .iter()
            .map(|e| ExternalActivity::by_user(ActivityType::Modified, e.created_at, user_id)),
    )
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::github::{Label, User};

    fn at(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value)
            .unwrap()
            .with_timezone(&Utc)
    }

    fn user(login: &str) -> User {
        User {
            login: login.to_string(),
            html_url: Some(format!("https://github.com/{}", login)),
            avatar_url: None,
        }
    }

    fn sample_issue() -> Issue {
        Issue {
            number: 42,
            title: "Crash on start".to_string(),
            body: Some("Steps:\n\n1. run **it**\n2. see [log](https://x)".to_string()),
            state: "open".to_string(),
            html_url: "https://github.com/octo/hello/issues/42".to_string(),
            created_at: at("2024-01-01T08:00:00Z"),
            updated_at: Some(at("2024-01-03T09:30:00Z")),
            user: Some(user("octo")),
            assignees: vec![user("alice"), user("bob")],
            labels: vec![Label {
                name: "bug".to_string(),
            }],
            pull_request: None,
        }
    }

    fn sample_repository() -> Repository {
        Repository {
            name: "hello".to_string(),
            description: None,
            visibility: Some("private".to_string()),
            html_url: "https://github.com/octo/hello".to_string(),
            created_at: at("2023-06-01T00:00:00Z"),
            updated_at: None,
            owner: user("octo"),
        }
    }

    #[test]
    fn test_issue_item_properties() {
        let item = issue_item(&sample_issue());

        assert_eq!(item.id, "42");
        assert_eq!(item.acl, vec![Acl::everyone()]);
        assert_eq!(item.properties["title"], json!("Crash on start"));
        assert_eq!(item.properties["body"], json!("Steps:\n\n1. run it\n2. see log"));
        assert_eq!(item.properties["assignees"], json!(["alice", "bob"]));
        assert_eq!(item.properties["assignees@odata.type"], json!("Collection(String)"));
        assert_eq!(item.properties["labels"], json!(["bug"]));
        assert_eq!(item.properties["labels@odata.type"], json!("Collection(String)"));
        assert_eq!(item.properties["state"], json!("open"));
        assert_eq!(
            item.properties["issueUrl"],
            json!("https://github.com/octo/hello/issues/42")
        );
        assert_eq!(item.properties["updatedAt"], json!("2024-01-03T09:30:00Z"));
        assert_eq!(item.content, ItemContent::text("Steps:\n\n1. run it\n2. see log"));
    }

    #[test]
    fn test_issue_without_body_has_empty_content() {
        let mut issue = sample_issue();
        issue.body = None;
        issue.updated_at = None;

        let item = issue_item(&issue);
        assert_eq!(item.content.value, "");
        assert_eq!(item.properties["updatedAt"], json!("2024-01-01T08:00:00Z"));
    }

    #[test]
    fn test_issue_activities_order() {
        let issue = sample_issue();
        let events = vec![IssueEvent {
            id: 1,
            event: "labeled".to_string(),
            created_at: at("2024-01-02T00:00:00Z"),
            actor: None,
        }];
        let comments = vec![
            IssueComment {
                id: 10,
                body: Some("me too".to_string()),
                created_at: at("2024-01-02T12:00:00Z"),
                user: None,
            },
            IssueComment {
                id: 11,
                body: None,
                created_at: at("2024-01-03T12:00:00Z"),
                user: None,
            },
        ];

        let activities = issue_activities(&issue, &events, &comments, "placeholder");
        let kinds: Vec<_> = activities.iter().map(|a| a.kind).collect();

        assert_eq!(
            kinds,
            vec![
                ActivityType::Created,
                ActivityType::Modified,
                ActivityType::Commented,
                ActivityType::Commented
            ]
        );
        assert_eq!(activities[0].start_date_time, issue.created_at);
        assert!(activities.iter().all(|a| a.performed_by.id == "placeholder"));
    }

    #[test]
    fn test_repository_item_defaults() {
        let item = repository_item(&sample_repository(), None);

        assert_eq!(item.id, "hello");
        assert_eq!(item.properties["description"], json!(""));
        assert_eq!(item.properties["visibility"], json!("private"));
        assert_eq!(item.properties["createdBy"], json!("octo"));
        assert_eq!(item.properties["userUrl"], json!("https://github.com/octo"));
        assert_eq!(item.properties["icon"], json!(GITHUB_ICON_URL));
        assert_eq!(item.properties["updatedAt"], json!("2023-06-01T00:00:00Z"));
        assert_eq!(item.content.value, "");
    }

    #[test]
    fn test_repository_item_renders_readme() {
        let item = repository_item(&sample_repository(), Some("# Hello\n\nA *small* project."));
        assert_eq!(item.content.value, "Hello\n\nA small project.");
    }

    #[test]
    fn test_repository_activities() {
        let repository = sample_repository();
        let events = vec![RepositoryEvent {
            id: "9001".to_string(),
            kind: Some("PushEvent".to_string()),
            created_at: at("2024-02-01T00:00:00Z"),
            actor: None,
        }];

        let activities = repository_activities(&repository, &events, "u1");
        assert_eq!(activities.len(), 2);
        assert_eq!(activities[0].kind, ActivityType::Created);
        assert_eq!(activities[1].kind, ActivityType::Modified);
        assert_eq!(activities[1].start_date_time, at("2024-02-01T00:00:00Z"));
    }
}
