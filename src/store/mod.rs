//! Store Module - Schemaless multi-collection document store
//!
//! Documents are JSON objects keyed by id inside named collections. Nothing
//! here knows about the domain types; callers serialize with serde and query
//! by top-level field equality.
//!
//! Multi-document operations go through [`WriteBatch`]: every op plus every
//! precondition is evaluated under a single write lock, so a check-in's
//! visit, grant, passport and audit writes either all apply or none do, and
//! the "no second active visit" check cannot race a concurrent request.

use std::collections::HashMap;

use serde_json::Value;
use tokio::sync::RwLock;

/// Collection names, kept in one place so handlers and services agree.
pub mod collections {
    pub const USERS: &str = "users";
    pub const PATIENTS: &str = "patients";
    pub const HOSPITALS: &str = "hospitals";
    pub const VISITS: &str = "visits";
    pub const ACCESS_GRANTS: &str = "accessGrants";
    pub const EHEALTH_PASSPORTS: &str = "eHealthPassports";
    pub const DIAGNOSIS_SESSIONS: &str = "diagnosisSessions";
    pub const AUDIT_LOGS: &str = "auditLogs";
    pub const APPOINTMENTS: &str = "appointments";
    pub const PRESCRIPTIONS: &str = "prescriptions";
    pub const MEDICAL_REPORTS: &str = "medicalReports";
    pub const DEPARTMENTS: &str = "departments";
    pub const STAFF_ROLES: &str = "staffRoles";
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("document '{1}' not found in '{0}'")]
    NotFound(String, String),
    #[error("precondition failed: {0}")]
    PreconditionFailed(String),
    #[error("document must be a JSON object")]
    NotAnObject,
}

/// A single write inside a batch.
#[derive(Clone, Debug)]
pub enum WriteOp {
    /// Insert or replace a whole document.
    Put {
        collection: String,
        id: String,
        doc: Value,
    },
    /// Merge top-level fields into an existing document. Fails the batch if
    /// the document is absent.
    Update {
        collection: String,
        id: String,
        fields: serde_json::Map<String, Value>,
    },
}

/// Checked under the same lock as the batch's writes.
#[derive(Clone, Debug)]
pub enum Precondition {
    /// No document in `collection` matches all `filters` (top-level equality).
    NoneMatches {
        collection: String,
        filters: Vec<(String, Value)>,
        /// Message carried into [`StoreError::PreconditionFailed`].
        message: String,
    },
    /// The document exists and `field` currently equals `value`.
    FieldEquals {
        collection: String,
        id: String,
        field: String,
        value: Value,
        message: String,
    },
}

#[derive(Debug, Default)]
pub struct WriteBatch {
    preconditions: Vec<Precondition>,
    ops: Vec<WriteOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn require(mut self, pre: Precondition) -> Self {
        self.preconditions.push(pre);
        self
    }

    pub fn put(mut self, collection: &str, id: &str, doc: Value) -> Self {
        self.ops.push(WriteOp::Put {
            collection: collection.to_string(),
            id: id.to_string(),
            doc,
        });
        self
    }

    pub fn update(
        mut self,
        collection: &str,
        id: &str,
        fields: serde_json::Map<String, Value>,
    ) -> Self {
        self.ops.push(WriteOp::Update {
            collection: collection.to_string(),
            id: id.to_string(),
            fields,
        });
        self
    }

    pub fn push(&mut self, op: WriteOp) {
        self.ops.push(op);
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

type Collections = HashMap<String, HashMap<String, Value>>;

/// In-process document store shared across request handlers.
pub struct DocumentStore {
    collections: RwLock<Collections>,
}

impl DocumentStore {
    pub fn new() -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
        }
    }

    pub async fn get(&self, collection: &str, id: &str) -> Option<Value> {
        let cols = self.collections.read().await;
        cols.get(collection).and_then(|c| c.get(id)).cloned()
    }

    pub async fn insert(&self, collection: &str, id: &str, doc: Value) -> Result<(), StoreError> {
        if !doc.is_object() {
            return Err(StoreError::NotAnObject);
        }
        let mut cols = self.collections.write().await;
        cols.entry(collection.to_string())
            .or_default()
            .insert(id.to_string(), doc);
        Ok(())
    }

    /// Merge top-level fields into an existing document.
    pub async fn update(
        &self,
        collection: &str,
        id: &str,
        fields: serde_json::Map<String, Value>,
    ) -> Result<(), StoreError> {
        let mut cols = self.collections.write().await;
        Self::apply_update(&mut cols, collection, id, &fields)
    }

    pub async fn delete(&self, collection: &str, id: &str) -> bool {
        let mut cols = self.collections.write().await;
        cols.get_mut(collection)
            .map(|c| c.remove(id).is_some())
            .unwrap_or(false)
    }

    pub async fn list(&self, collection: &str) -> Vec<Value> {
        let cols = self.collections.read().await;
        cols.get(collection)
            .map(|c| c.values().cloned().collect())
            .unwrap_or_default()
    }

    /// All documents whose top-level fields equal every filter value.
    pub async fn find(&self, collection: &str, filters: &[(&str, Value)]) -> Vec<Value> {
        let cols = self.collections.read().await;
        cols.get(collection)
            .map(|c| {
                c.values()
                    .filter(|doc| filters.iter().all(|(f, v)| doc.get(*f) == Some(v)))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    pub async fn count(&self, collection: &str) -> usize {
        let cols = self.collections.read().await;
        cols.get(collection).map(|c| c.len()).unwrap_or(0)
    }

    /// Apply a batch atomically: preconditions and writes are evaluated under
    /// one write lock, and a failing op leaves nothing applied.
    pub async fn apply(&self, batch: WriteBatch) -> Result<(), StoreError> {
        let mut cols = self.collections.write().await;

        for pre in &batch.preconditions {
            match pre {
                Precondition::NoneMatches {
                    collection,
                    filters,
                    message,
                } => {
                    let hit = cols.get(collection.as_str()).is_some_and(|c| {
                        c.values()
                            .any(|doc| filters.iter().all(|(f, v)| doc.get(f.as_str()) == Some(v)))
                    });
                    if hit {
                        return Err(StoreError::PreconditionFailed(message.clone()));
                    }
                }
                Precondition::FieldEquals {
                    collection,
                    id,
                    field,
                    value,
                    message,
                } => {
                    let ok = cols
                        .get(collection.as_str())
                        .and_then(|c| c.get(id.as_str()))
                        .is_some_and(|doc| doc.get(field.as_str()) == Some(value));
                    if !ok {
                        return Err(StoreError::PreconditionFailed(message.clone()));
                    }
                }
            }
        }

        // Validate every op against current state before writing anything, so
        // a bad doc or missing target cannot leave the batch half-applied.
        for op in &batch.ops {
            match op {
                WriteOp::Put { doc, .. } => {
                    if !doc.is_object() {
                        return Err(StoreError::NotAnObject);
                    }
                }
                WriteOp::Update { collection, id, .. } => {
                    let exists = cols
                        .get(collection.as_str())
                        .is_some_and(|c| c.contains_key(id.as_str()));
                    if !exists {
                        return Err(StoreError::NotFound(collection.clone(), id.clone()));
                    }
                }
            }
        }

        for op in batch.ops {
            match op {
                WriteOp::Put {
                    collection,
                    id,
                    doc,
                } => {
                    cols.entry(collection).or_default().insert(id, doc);
                }
                WriteOp::Update {
                    collection,
                    id,
                    fields,
                } => {
                    Self::apply_update(&mut cols, &collection, &id, &fields)?;
                }
            }
        }

        Ok(())
    }

    fn apply_update(
        cols: &mut Collections,
        collection: &str,
        id: &str,
        fields: &serde_json::Map<String, Value>,
    ) -> Result<(), StoreError> {
        let doc = cols
            .get_mut(collection)
            .and_then(|c| c.get_mut(id))
            .ok_or_else(|| StoreError::NotFound(collection.to_string(), id.to_string()))?;
        let obj = doc.as_object_mut().ok_or(StoreError::NotAnObject)?;
        for (k, v) in fields {
            obj.insert(k.clone(), v.clone());
        }
        Ok(())
    }
}

impl Default for DocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn insert_get_update() {
        let store = DocumentStore::new();
        store
            .insert("users", "u1", json!({"id": "u1", "name": "Ada"}))
            .await
            .unwrap();

        let doc = store.get("users", "u1").await.unwrap();
        assert_eq!(doc["name"], "Ada");

        let mut fields = serde_json::Map::new();
        fields.insert("name".to_string(), json!("Grace"));
        store.update("users", "u1", fields).await.unwrap();
        assert_eq!(store.get("users", "u1").await.unwrap()["name"], "Grace");
    }

    #[tokio::test]
    async fn find_filters_on_all_fields() {
        let store = DocumentStore::new();
        store
            .insert("visits", "v1", json!({"patientId": "p1", "status": "checked_in"}))
            .await
            .unwrap();
        store
            .insert("visits", "v2", json!({"patientId": "p1", "status": "checked_out"}))
            .await
            .unwrap();

        let active = store
            .find("visits", &[("patientId", json!("p1")), ("status", json!("checked_in"))])
            .await;
        assert_eq!(active.len(), 1);
    }

    #[tokio::test]
    async fn batch_precondition_blocks_all_writes() {
        let store = DocumentStore::new();
        store
            .insert("visits", "v1", json!({"patientId": "p1", "status": "checked_in"}))
            .await
            .unwrap();

        let batch = WriteBatch::new()
            .require(Precondition::NoneMatches {
                collection: "visits".to_string(),
                filters: vec![
                    ("patientId".to_string(), json!("p1")),
                    ("status".to_string(), json!("checked_in")),
                ],
                message: "already checked in".to_string(),
            })
            .put("visits", "v2", json!({"patientId": "p1", "status": "checked_in"}))
            .put("accessGrants", "g1", json!({"visitId": "v2"}));

        let err = store.apply(batch).await.unwrap_err();
        assert!(matches!(err, StoreError::PreconditionFailed(_)));
        assert!(store.get("visits", "v2").await.is_none());
        assert!(store.get("accessGrants", "g1").await.is_none());
    }

    #[tokio::test]
    async fn batch_update_missing_target_applies_nothing() {
        let store = DocumentStore::new();
        let mut fields = serde_json::Map::new();
        fields.insert("status".to_string(), json!("revoked"));

        let batch = WriteBatch::new()
            .put("auditLogs", "a1", json!({"action": "check_out"}))
            .update("accessGrants", "missing", fields);

        assert!(store.apply(batch).await.is_err());
        assert!(store.get("auditLogs", "a1").await.is_none());
    }

    #[tokio::test]
    async fn batch_put_rejects_non_object_docs() {
        let store = DocumentStore::new();
        let batch = WriteBatch::new()
            .put("visits", "v1", json!({"status": "checked_in"}))
            .put("auditLogs", "a1", json!(null));

        let err = store.apply(batch).await.unwrap_err();
        assert!(matches!(err, StoreError::NotAnObject));
        assert!(store.get("visits", "v1").await.is_none());
    }

    #[tokio::test]
    async fn field_equals_precondition() {
        let store = DocumentStore::new();
        store
            .insert("visits", "v1", json!({"status": "checked_out"}))
            .await
            .unwrap();

        let batch = WriteBatch::new().require(Precondition::FieldEquals {
            collection: "visits".to_string(),
            id: "v1".to_string(),
            field: "status".to_string(),
            value: json!("checked_in"),
            message: "visit is not active".to_string(),
        });
        assert!(store.apply(batch).await.is_err());
    }
}
