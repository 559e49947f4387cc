//! Long-running operation polling
//!
//! Schema registration hands back an operation id; the poller reads the
//! operation status until it is `completed` or `failed`. There is no backoff,
//! attempt limit or timeout: an operation that never terminates is polled
//! forever, and a caller wanting a bound must wrap the future in its own
//! timeout. A failed status read ends the wait with that error.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::graph::GraphError;
use crate::models::{ConnectionOperation, OperationStatus};

/// Fixed delay between status reads.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60);

const GENERIC_FAILURE_MESSAGE: &str = "schema registration operation failed";

/// Reads the current state of an operation.
#[async_trait]
pub trait OperationSource: Send + Sync {
    async fn get_operation(
        &self,
        connection_id: &str,
        operation_id: &str,
    ) -> Result<ConnectionOperation, GraphError>;
}

pub struct OperationPoller<'a, S: ?Sized> {
    source: &'a S,
    interval: Duration,
}

impl<'a, S: OperationSource + ?Sized> OperationPoller<'a, S> {
    pub fn new(source: &'a S, interval: Duration) -> Self {
        Self { source, interval }
    }

    /// Poll until the operation terminates.
    ///
    /// Reads once immediately, then once per interval while pending. A
    /// `failed` status becomes [`GraphError::OperationFailed`] carrying the
    /// operation's own message when it has one.
    pub async fn wait_for_completion(
        &self,
        connection_id: &str,
        operation_id: &str,
    ) -> Result<ConnectionOperation, GraphError> {
        let mut reads: u64 = 0;

        loop {
            let operation = self
                .source
                .get_operation(connection_id, operation_id)
                .await?;
            reads += 1;

            match operation.status() {
                OperationStatus::Completed => {
                    info!(connection_id, operation_id, reads, "Operation completed");
                    return Ok(operation);
                }
                OperationStatus::Failed => {
                    let message = operation
                        .error_message()
                        .unwrap_or(GENERIC_FAILURE_MESSAGE)
                        .to_string();
                    warn!(connection_id, operation_id, reads, error = %message, "Operation failed");
                    return Err(GraphError::OperationFailed { message });
                }
                OperationStatus::Pending => {
                    debug!(
                        connection_id,
                        operation_id,
                        reads,
                        delay_secs = self.interval.as_secs(),
                        "Operation still pending"
                    );
                    tokio::time::sleep(self.interval).await;
                }
            }
        }
    }
}
