//! Static per-content-type definitions: item schemas, URL resolvers and
//! result templates.

use serde_json::{Value as JsonValue, json};

use crate::models::{DisplayTemplate, UrlMatchInfo, UrlToItemResolver};
use crate::registry::ContentType;

const GITHUB_BASE_URL: &str = "https://github.com";
const ITEM_ID_RESOLVER_TYPE: &str = "#microsoft.graph.externalConnectors.itemIdResolver";

/// Schema document registered for `content_type`.
pub fn schema_for(content_type: ContentType) -> JsonValue {
    match content_type {
        ContentType::Issues => issues_schema(),
        ContentType::Repositories => repositories_schema(),
    }
}

pub fn issues_schema() -> JsonValue {
    json!({
        "baseType": "microsoft.graph.externalItem",
        "properties": [
            { "name": "title", "type": "String", "isQueryable": true, "isSearchable": true, "isRetrievable": true, "labels": ["title"] },
            { "name": "body", "type": "String", "isSearchable": true, "isRetrievable": true },
            { "name": "assignees", "type": "StringCollection", "isQueryable": true, "isSearchable": true, "isRetrievable": true },
            { "name": "labels", "type": "StringCollection", "isQueryable": true, "isSearchable": true, "isRetrievable": true, "isRefinable": true },
            { "name": "state", "type": "String", "isQueryable": true, "isSearchable": true, "isRetrievable": true },
            { "name": "issueUrl", "type": "String", "isRetrievable": true, "labels": ["url"] },
            { "name": "icon", "type": "String", "isRetrievable": true, "labels": ["iconUrl"] },
            { "name": "updatedAt", "type": "DateTime", "isQueryable": true, "isRetrievable": true, "isRefinable": true, "labels": ["lastModifiedDateTime"] }
        ]
    })
}

pub fn repositories_schema() -> JsonValue {
    json!({
        "baseType": "microsoft.graph.externalItem",
        "properties": [
            { "name": "title", "type": "String", "isQueryable": true, "isSearchable": true, "isRetrievable": true, "labels": ["title"] },
            { "name": "description", "type": "String", "isSearchable": true, "isRetrievable": true },
            { "name": "visibility", "type": "String", "isQueryable": true, "isRetrievable": true, "isRefinable": true },
            { "name": "createdBy", "type": "String", "isQueryable": true, "isSearchable": true, "isRetrievable": true, "labels": ["createdBy"] },
            { "name": "updatedAt", "type": "DateTime", "isQueryable": true, "isRetrievable": true, "isRefinable": true, "labels": ["lastModifiedDateTime"] },
            { "name": "repoUrl", "type": "String", "isRetrievable": true, "labels": ["url"] },
            { "name": "userUrl", "type": "String", "isRetrievable": true },
            { "name": "icon", "type": "String", "isRetrievable": true, "labels": ["iconUrl"] }
        ]
    })
}

/// Resolver mapping shared GitHub URLs onto item ids.
///
/// Issues capture the numeric issue id under `/{owner}/{repo}/issues/`;
/// repositories capture the repository name under `/{owner}/`.
pub fn url_resolver(content_type: ContentType, owner: &str, repo: &str) -> UrlToItemResolver {
    let (url_pattern, item_id) = match content_type {
        ContentType::Issues => (
            format!(
                "/{}/{}/issues/(?<issueId>[0-9]+)",
                regex::escape(owner),
                regex::escape(repo)
            ),
            "{issueId}",
        ),
        ContentType::Repositories => (
            format!("/{}/(?<repoName>[^/]+)", regex::escape(owner)),
            "{repoName}",
        ),
    };

    UrlToItemResolver {
        odata_type: ITEM_ID_RESOLVER_TYPE.to_string(),
        url_match_info: UrlMatchInfo {
            base_urls: vec![GITHUB_BASE_URL.to_string()],
            url_pattern,
        },
        item_id: item_id.to_string(),
        priority: 1,
    }
}

/// Adaptive card used to render search results of `content_type`.
pub fn result_template(content_type: ContentType) -> DisplayTemplate {
    match content_type {
        ContentType::Issues => DisplayTemplate {
            id: "issueDisplay".to_string(),
            priority: 1,
            layout: card(
                "${title}",
                "${issueUrl}",
                json!([
                    { "type": "TextBlock", "text": "State: ${state}", "isSubtle": true, "spacing": "Small" },
                    { "type": "TextBlock", "text": "${ResultSnippet}", "wrap": true, "maxLines": 3 }
                ]),
            ),
        },
        ContentType::Repositories => DisplayTemplate {
            id: "repoDisplay".to_string(),
            priority: 1,
            layout: card(
                "${title}",
                "${repoUrl}",
                json!([
                    { "type": "TextBlock", "text": "${createdBy} · ${visibility}", "isSubtle": true, "spacing": "Small" },
                    { "type": "TextBlock", "text": "${description}", "wrap": true, "maxLines": 3 }
                ]),
            ),
        },
    }
}

fn card(title: &str, url: &str, details: JsonValue) -> JsonValue {
    let mut body = vec![json!({
        "type": "ColumnSet",
        "columns": [
            {
                "type": "Column",
                "width": "auto",
                "items": [{ "type": "Image", "url": "${icon}", "size": "Small", "horizontalAlignment": "Center" }]
            },
            {
                "type": "Column",
                "width": "stretch",
                "verticalContentAlignment": "Center",
                "items": [{ "type": "TextBlock", "text": format!("[{}]({})", title, url), "weight": "Bolder", "color": "Accent", "size": "Medium" }]
            }
        ]
    })];
    if let JsonValue::Array(items) = details {
        body.extend(items);
    }

    json!({
        "type": "AdaptiveCard",
        "version": "1.3",
        "$schema": "http://adaptivecards.io/schemas/adaptive-card.json",
        "body": body
    })
}
