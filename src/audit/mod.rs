//! Audit Module - Append-only audit trail
//!
//! Events land in the `auditLogs` collection and are never mutated or
//! deleted. Lifecycle code batches the event with its domain writes via
//! [`op_for`], so an audit entry cannot exist for a check-in that was rolled
//! back (or vice versa).

use std::sync::Arc;

use serde_json::Value;

use crate::models::{AuditAction, AuditEvent};
use crate::store::{collections, DocumentStore, StoreError, WriteOp};

/// Build the write op for an event, for inclusion in a larger batch.
pub fn op_for(event: &AuditEvent) -> WriteOp {
    WriteOp::Put {
        collection: collections::AUDIT_LOGS.to_string(),
        id: event.id.clone(),
        // AuditEvent always serializes; it contains only JSON-safe fields.
        doc: serde_json::to_value(event).unwrap_or(Value::Null),
    }
}

pub struct AuditLogger {
    store: Arc<DocumentStore>,
}

impl AuditLogger {
    pub fn new(store: Arc<DocumentStore>) -> Self {
        Self { store }
    }

    /// Append a standalone event (admin actions outside any batch).
    pub async fn append(
        &self,
        user_id: &str,
        action: AuditAction,
        resource_type: &str,
        resource_id: &str,
        metadata: Value,
    ) -> Result<(), StoreError> {
        let event = AuditEvent::new(user_id, action, resource_type, resource_id, metadata);
        tracing::info!(
            user_id = %event.user_id,
            action = ?event.action,
            resource = %event.resource_id,
            "audit event"
        );
        let doc = serde_json::to_value(&event).unwrap_or(Value::Null);
        self.store
            .insert(collections::AUDIT_LOGS, &event.id, doc)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn append_persists_event() {
        let store = Arc::new(DocumentStore::new());
        let audit = AuditLogger::new(store.clone());

        audit
            .append("u1", AuditAction::CheckIn, "visit", "v1", json!({"hospitalId": "h1"}))
            .await
            .unwrap();

        let events = store.list(collections::AUDIT_LOGS).await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0]["action"], "check_in");
        assert_eq!(events[0]["resourceId"], "v1");
    }

    #[test]
    fn op_for_targets_audit_collection() {
        let event = AuditEvent::new("u1", AuditAction::CheckOut, "visit", "v1", json!({}));
        match op_for(&event) {
            WriteOp::Put { collection, id, .. } => {
                assert_eq!(collection, collections::AUDIT_LOGS);
                assert_eq!(id, event.id);
            }
            _ => panic!("expected put"),
        }
    }
}
