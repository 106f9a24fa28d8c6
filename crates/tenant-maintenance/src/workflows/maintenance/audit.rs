use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::info;

use super::domain::{NewLogEntry, RequestId, UserId, WorkflowLogEntry, WorkflowStep};
use super::repository::{AuditStore, StoreError};

/// Append-only trail explaining every status change of a request.
///
/// Write failures are returned to the caller: a step that cannot be recorded must not look
/// like it succeeded.
pub struct AuditLog<S> {
    store: Arc<S>,
}

impl<S: AuditStore> AuditLog<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub fn record(
        &self,
        request_id: RequestId,
        step: WorkflowStep,
        actor_id: Option<UserId>,
        details: impl Into<String>,
        at: DateTime<Utc>,
    ) -> Result<WorkflowLogEntry, StoreError> {
        let entry = self.store.append_log(NewLogEntry {
            request_id,
            step,
            actor_id,
            details: details.into(),
            created_at: at,
        })?;

        info!(
            request_id = %request_id,
            step = step.as_str(),
            actor = ?actor_id.map(|id| id.0),
            "workflow step recorded"
        );
        Ok(entry)
    }

    /// Replay order: oldest first.
    pub fn trail(&self, request_id: RequestId) -> Result<Vec<WorkflowLogEntry>, StoreError> {
        self.store.logs_for_request(request_id)
    }
}
