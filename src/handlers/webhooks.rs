//! # Notification Receiver
//!
//! Entry point for connector lifecycle notifications. The response is always
//! `202 Accepted` and is sent before any processing: the notifier must never
//! retry because of slow downstream work, and it is never told how a batch
//! fared. Processing runs on its own task.

use axum::{
    extract::{Request, State},
    http::StatusCode,
    response::Json,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use utoipa::ToSchema;

use crate::models::NotificationCollection;
use crate::server::AppState;

/// Largest notification body read; anything bigger is dropped unread.
pub const MAX_NOTIFICATION_BODY: usize = 1024 * 1024;

/// Webhook accept response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct WebhookAcceptResponse {
    /// Acceptance status
    pub status: String,
}

impl WebhookAcceptResponse {
    fn accepted() -> (StatusCode, Json<Self>) {
        (
            StatusCode::ACCEPTED,
            Json(Self {
                status: "accepted".to_string(),
            }),
        )
    }
}

/// Accept a change notification batch
///
/// Validation tokens are checked and connector lifecycle changes applied in
/// the background, after the response has been sent.
#[utoipa::path(
    post,
    path = "/",
    request_body(content = serde_json::Value, description = "Change notification collection", content_type = "application/json"),
    responses(
        (status = 202, description = "Notification batch accepted", body = WebhookAcceptResponse)
    ),
    tag = "notifications"
)]
pub async fn receive_notifications(
    State(state): State<AppState>,
    req: Request,
) -> (StatusCode, Json<WebhookAcceptResponse>) {
    let (_parts, body) = req.into_parts();
    let body_bytes = match axum::body::to_bytes(body, MAX_NOTIFICATION_BODY).await {
        Ok(bytes) => bytes,
        Err(err) => {
            warn!(
                error = %err,
                limit = MAX_NOTIFICATION_BODY,
                "Failed to read notification body"
            );
            return WebhookAcceptResponse::accepted();
        }
    };

    let Some(payload) = NotificationCollection::from_slice(&body_bytes) else {
        debug!(
            body_size = body_bytes.len(),
            "Body is not a notification collection; ignoring"
        );
        return WebhookAcceptResponse::accepted();
    };

    let dispatcher = state.dispatcher.clone();
    tokio::spawn(async move {
        let outcome = dispatcher.dispatch(payload).await;
        info!(outcome = ?outcome, "Notification batch handled");
    });

    WebhookAcceptResponse::accepted()
}
