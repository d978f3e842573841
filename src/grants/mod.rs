//! Grants Module - Per-visit access grants
//!
//! A grant scopes one hospital's read/write access to one patient's records
//! to the lifetime of one visit. Grants have no API of their own; the visit
//! lifecycle issues and revokes them, always in the same write batch as the
//! visit transition.

use chrono::{DateTime, Utc};
use serde_json::{json, Value};

use crate::models::{AccessGrant, GrantStatus, Permission, Visit};

/// Issue the grant accompanying a freshly created visit.
pub fn issue_for_visit(visit: &Visit) -> AccessGrant {
    AccessGrant {
        id: uuid::Uuid::new_v4().to_string(),
        patient_id: visit.patient_id.clone(),
        hospital_id: visit.hospital_id.clone(),
        visit_id: visit.id.clone(),
        granted_at: visit.check_in_time,
        revoked_at: None,
        permissions: vec![Permission::Read, Permission::Write],
        status: GrantStatus::Active,
    }
}

/// Field set applied to every active grant of a visit at check-out.
pub fn revocation_fields(at: DateTime<Utc>) -> serde_json::Map<String, Value> {
    let mut fields = serde_json::Map::new();
    fields.insert("status".to_string(), json!(GrantStatus::Revoked));
    fields.insert("revokedAt".to_string(), json!(at));
    fields
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::VisitStatus;

    fn sample_visit() -> Visit {
        let now = Utc::now();
        Visit {
            id: Visit::derive_id("p1", "h1", now),
            patient_id: "p1".to_string(),
            hospital_id: "h1".to_string(),
            check_in_time: now,
            check_out_time: None,
            status: VisitStatus::CheckedIn,
            purpose: "fever".to_string(),
            department: "General".to_string(),
            is_first_visit: true,
        }
    }

    #[test]
    fn grant_mirrors_visit_scope() {
        let visit = sample_visit();
        let grant = issue_for_visit(&visit);
        assert_eq!(grant.visit_id, visit.id);
        assert_eq!(grant.patient_id, "p1");
        assert_eq!(grant.hospital_id, "h1");
        assert_eq!(grant.status, GrantStatus::Active);
        assert_eq!(grant.permissions, vec![Permission::Read, Permission::Write]);
        assert!(grant.revoked_at.is_none());
    }

    #[test]
    fn revocation_sets_status_and_timestamp() {
        let at = Utc::now();
        let fields = revocation_fields(at);
        assert_eq!(fields["status"], json!("revoked"));
        assert!(fields.contains_key("revokedAt"));
    }
}
