//! Integration tests for connector lifecycle dispatch.

use std::sync::Arc;

use graph_connector::dispatcher::{
    DispatchOutcome, LIFECYCLE_CONNECTION_NAME, NotificationDispatcher, NotificationOutcome,
};
use graph_connector::graph::schema;
use graph_connector::models::NotificationCollection;
use graph_connector::registry::{ContentType, Provisioning};
use serde_json::{Value as JsonValue, json};

#[path = "test_utils/mod.rs"]
mod test_utils;

use test_utils::*;

fn dispatcher_with(registry: Arc<RecordingRegistry>) -> NotificationDispatcher {
    NotificationDispatcher::new(Arc::new(TokenSet::new(&["good-1", "good-2"])), registry)
}

fn connector_notification(id: &str, state: &str, ticket: Option<&str>) -> JsonValue {
    let mut resource_data = json!({
        "@odata.type": "#microsoft.graph.connector",
        "id": id,
        "state": state,
    });
    if let Some(ticket) = ticket {
        resource_data["connectorsTicket"] = json!(ticket);
    }

    json!({
        "changeType": "updated",
        "resource": format!("external/connectors/{}", id),
        "tenantId": TEST_TENANT_ID,
        "resourceData": resource_data,
    })
}

fn batch(notifications: Vec<JsonValue>, tokens: &[&str]) -> NotificationCollection {
    serde_json::from_value(json!({
        "value": notifications,
        "validationTokens": tokens,
    }))
    .unwrap()
}

#[tokio::test]
async fn test_enable_creates_connection_and_registers_issues_schema() {
    let registry = Arc::new(RecordingRegistry::default());
    let dispatcher = dispatcher_with(registry.clone());

    let outcome = dispatcher
        .dispatch(batch(
            vec![connector_notification("C1", "enabled", Some("T1"))],
            &["good-1"],
        ))
        .await;

    let mutations = registry.mutations();
    assert_eq!(mutations.len(), 2);

    let RegistryCall::Create(request) = &mutations[0] else {
        panic!("expected create first, got {:?}", mutations[0]);
    };
    assert_eq!(
        request.provisioning,
        Some(Provisioning {
            ticket: "T1".to_string(),
            connector_id: "C1".to_string(),
        })
    );
    assert_eq!(request.name, LIFECYCLE_CONNECTION_NAME);
    assert_eq!(request.content_type, ContentType::Issues);
    assert!(request.id.starts_with("ghissues"));

    assert_eq!(
        mutations[1],
        RegistryCall::RegisterSchema {
            id: request.id.clone(),
            schema: schema::issues_schema(),
        }
    );
    assert_eq!(
        outcome,
        DispatchOutcome::Processed(vec![NotificationOutcome::Created {
            connection_id: request.id.clone(),
        }])
    );
}

#[tokio::test]
async fn test_enable_is_noop_when_connection_exists() {
    let registry = Arc::new(RecordingRegistry::with_connections(vec![connection(
        "existing1",
        Some("C1"),
    )]));
    let dispatcher = dispatcher_with(registry.clone());

    let outcome = dispatcher
        .dispatch(batch(
            vec![connector_notification("C1", "enabled", Some("T1"))],
            &["good-1"],
        ))
        .await;

    assert!(registry.mutations().is_empty());
    assert_eq!(
        outcome,
        DispatchOutcome::Processed(vec![NotificationOutcome::AlreadyEnabled {
            connection_id: Some("existing1".to_string()),
        }])
    );
}

#[tokio::test]
async fn test_disable_deletes_matching_connection() {
    let registry = Arc::new(RecordingRegistry::with_connections(vec![
        connection("other", Some("C7")),
        connection("conn-42", Some("C2")),
    ]));
    let dispatcher = dispatcher_with(registry.clone());

    dispatcher
        .dispatch(batch(
            vec![connector_notification("C2", "disabled", None)],
            &["good-1"],
        ))
        .await;

    assert_eq!(
        registry.mutations(),
        vec![RegistryCall::Delete(Some("conn-42".to_string()))]
    );
    assert_eq!(registry.connections().len(), 1);
}

#[tokio::test]
async fn test_disable_without_connection_is_noop() {
    let registry = Arc::new(RecordingRegistry::default());
    let dispatcher = dispatcher_with(registry.clone());

    let outcome = dispatcher
        .dispatch(batch(
            vec![connector_notification("C2", "disabled", None)],
            &["good-1"],
        ))
        .await;

    assert!(registry.mutations().is_empty());
    assert_eq!(
        outcome,
        DispatchOutcome::Processed(vec![NotificationOutcome::AlreadyDisabled])
    );
}

#[tokio::test]
async fn test_any_state_other_than_enabled_disables() {
    let registry = Arc::new(RecordingRegistry::with_connections(vec![connection(
        "conn9",
        Some("C9"),
    )]));
    let dispatcher = dispatcher_with(registry.clone());

    dispatcher
        .dispatch(batch(
            vec![connector_notification("C9", "Enabled", None)],
            &["good-1"],
        ))
        .await;

    assert_eq!(
        registry.mutations(),
        vec![RegistryCall::Delete(Some("conn9".to_string()))]
    );
}

#[tokio::test]
async fn test_one_invalid_token_discards_whole_batch() {
    let registry = Arc::new(RecordingRegistry::default());
    let dispatcher = dispatcher_with(registry.clone());

    let outcome = dispatcher
        .dispatch(batch(
            vec![
                connector_notification("C1", "enabled", Some("T1")),
                connector_notification("C2", "disabled", None),
            ],
            &["good-1", "forged", "good-2"],
        ))
        .await;

    assert_eq!(outcome, DispatchOutcome::Rejected);
    assert!(registry.calls().is_empty());
}

#[tokio::test]
async fn test_missing_tokens_or_notifications_are_ignored() {
    let registry = Arc::new(RecordingRegistry::default());
    let dispatcher = dispatcher_with(registry.clone());

    let no_tokens: NotificationCollection = serde_json::from_value(json!({
        "value": [connector_notification("C1", "enabled", Some("T1"))]
    }))
    .unwrap();
    let no_value: NotificationCollection =
        serde_json::from_value(json!({ "validationTokens": ["good-1"] })).unwrap();
    let empty_tokens = batch(
        vec![connector_notification("C1", "enabled", Some("T1"))],
        &[],
    );

    assert_eq!(dispatcher.dispatch(no_tokens).await, DispatchOutcome::Ignored);
    assert_eq!(dispatcher.dispatch(no_value).await, DispatchOutcome::Ignored);
    assert_eq!(dispatcher.dispatch(empty_tokens).await, DispatchOutcome::Ignored);
    assert!(registry.calls().is_empty());
}

#[tokio::test]
async fn test_unrecognized_resource_data_is_skipped() {
    let registry = Arc::new(RecordingRegistry::default());
    let dispatcher = dispatcher_with(registry.clone());

    let outcome = dispatcher
        .dispatch(batch(
            vec![
                json!({
                    "changeType": "created",
                    "resourceData": { "@odata.type": "#microsoft.graph.chatMessage", "id": "m1" }
                }),
                json!({ "changeType": "created" }),
            ],
            &["good-1"],
        ))
        .await;

    assert_eq!(
        outcome,
        DispatchOutcome::Processed(vec![
            NotificationOutcome::Skipped,
            NotificationOutcome::Skipped
        ])
    );
    assert!(registry.calls().is_empty());
}

#[tokio::test]
async fn test_failure_does_not_stop_later_notifications() {
    let registry = Arc::new(RecordingRegistry::with_connections(vec![connection(
        "conn-42",
        Some("C2"),
    )]));
    registry.fail_creates_for("C1");
    let dispatcher = dispatcher_with(registry.clone());

    let outcome = dispatcher
        .dispatch(batch(
            vec![
                connector_notification("C1", "enabled", Some("T1")),
                connector_notification("C2", "disabled", None),
            ],
            &["good-1", "good-2"],
        ))
        .await;

    let DispatchOutcome::Processed(outcomes) = outcome else {
        panic!("batch should have been processed");
    };
    assert!(matches!(outcomes[0], NotificationOutcome::Failed { .. }));
    assert_eq!(
        outcomes[1],
        NotificationOutcome::Deleted {
            connection_id: "conn-42".to_string(),
        }
    );

    // No schema registration after the failed create.
    assert!(
        !registry
            .mutations()
            .iter()
            .any(|call| matches!(call, RegistryCall::RegisterSchema { .. }))
    );
}

#[tokio::test]
async fn test_repeated_enable_creates_once() {
    let registry = Arc::new(RecordingRegistry::default());
    let dispatcher = dispatcher_with(registry.clone());
    let enable = || {
        batch(
            vec![connector_notification("C1", "enabled", Some("T1"))],
            &["good-1"],
        )
    };

    dispatcher.dispatch(enable()).await;
    let second = dispatcher.dispatch(enable()).await;

    let creates = registry
        .mutations()
        .into_iter()
        .filter(|call| matches!(call, RegistryCall::Create(_)))
        .count();
    assert_eq!(creates, 1);
    assert!(matches!(
        second,
        DispatchOutcome::Processed(ref outcomes)
            if matches!(outcomes[0], NotificationOutcome::AlreadyEnabled { .. })
    ));
}

#[tokio::test]
async fn test_enable_without_ticket_creates_unprovisioned_connection() {
    let registry = Arc::new(RecordingRegistry::default());
    let dispatcher = dispatcher_with(registry.clone());

    dispatcher
        .dispatch(batch(
            vec![connector_notification("C5", "enabled", None)],
            &["good-1"],
        ))
        .await;

    let mutations = registry.mutations();
    let RegistryCall::Create(request) = &mutations[0] else {
        panic!("expected a create call");
    };
    assert!(request.provisioning.is_none());
}

#[tokio::test]
async fn test_disable_of_connection_without_id_reports_already_disabled() {
    let mut unnamed = connection("ignored", Some("C2"));
    unnamed.id = None;
    let registry = Arc::new(RecordingRegistry::with_connections(vec![unnamed]));
    let dispatcher = dispatcher_with(registry.clone());

    let outcome = dispatcher
        .dispatch(batch(
            vec![connector_notification("C2", "disabled", None)],
            &["good-1"],
        ))
        .await;

    assert!(registry.mutations().is_empty());
    assert_eq!(
        outcome,
        DispatchOutcome::Processed(vec![NotificationOutcome::AlreadyDisabled])
    );
}

#[tokio::test]
async fn test_malformed_siblings_do_not_block_enable() {
    let registry = Arc::new(RecordingRegistry::default());
    let dispatcher = dispatcher_with(registry.clone());

    let mut wrong_typed = connector_notification("C9", "disabled", None);
    wrong_typed["resource"] = json!(5);

    let outcome = dispatcher
        .dispatch(batch(
            vec![
                JsonValue::Null,
                wrong_typed,
                connector_notification("C1", "enabled", Some("T1")),
            ],
            &["good-1"],
        ))
        .await;

    let DispatchOutcome::Processed(outcomes) = outcome else {
        panic!("batch should have been processed");
    };
    assert_eq!(outcomes.len(), 3);
    assert_eq!(outcomes[0], NotificationOutcome::Skipped);
    assert_eq!(outcomes[1], NotificationOutcome::AlreadyDisabled);
    assert!(matches!(outcomes[2], NotificationOutcome::Created { .. }));

    let connections = registry.connections();
    assert_eq!(connections.len(), 1);
    assert_eq!(connections[0].connector_id.as_deref(), Some("C1"));
}
