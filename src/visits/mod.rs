//! Visits Module - Check-in / check-out orchestration
//!
//! The lifecycle writes for one operation (visit, access grant, passport,
//! audit event) go through a single [`WriteBatch`], so either the whole
//! check-in happens or none of it does, and the duplicate-active-visit check
//! holds under concurrent requests.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::json;
use tracing::info;

use crate::audit;
use crate::auth::AuthSession;
use crate::grants;
use crate::models::{
    AuditAction, AuditEvent, HealthPassport, Role, User, Visit, VisitStatus,
};
use crate::passport;
use crate::store::{collections, DocumentStore, Precondition, StoreError, WriteBatch};

#[derive(Debug, thiserror::Error)]
pub enum VisitError {
    #[error("missing required field: {0}")]
    MissingField(&'static str),
    #[error("patient not found")]
    PatientNotFound,
    #[error("patient is already checked in at this hospital")]
    AlreadyCheckedIn,
    #[error("visit not found")]
    VisitNotFound,
    #[error("visit belongs to a different hospital")]
    WrongHospital,
    #[error("visit is not checked in")]
    NotCheckedIn,
    #[error("caller is not hospital staff")]
    NotStaff,
    #[error("caller has no hospital affiliation")]
    NoHospital,
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug)]
pub struct CheckInRequest {
    pub patient_email: String,
    pub purpose: String,
    pub department: String,
}

#[derive(Debug)]
pub struct CheckInOutcome {
    pub visit: Visit,
    pub passport_activated: bool,
}

#[derive(Debug)]
pub struct CheckOutOutcome {
    pub visit_id: String,
    pub check_out_time: DateTime<Utc>,
    pub grants_revoked: usize,
}

/// Check-ins at different hospitals share the patient's passport document,
/// so the read-modify-write is guarded by a compare-and-swap on `updatedAt`
/// and re-read on conflict.
const PASSPORT_CAS_ATTEMPTS: usize = 3;
const PASSPORT_CONFLICT: &str = "passport modified concurrently";

pub struct VisitService {
    store: Arc<DocumentStore>,
}

impl VisitService {
    pub fn new(store: Arc<DocumentStore>) -> Self {
        Self { store }
    }

    /// Check a patient in at the caller's hospital. Activates the E-Health
    /// passport on the patient's first-ever check-in anywhere.
    pub async fn check_in(
        &self,
        caller: &AuthSession,
        req: CheckInRequest,
    ) -> Result<CheckInOutcome, VisitError> {
        let hospital_id = self.require_staff(caller)?;

        if req.patient_email.trim().is_empty() {
            return Err(VisitError::MissingField("patientEmail"));
        }
        if req.purpose.trim().is_empty() {
            return Err(VisitError::MissingField("purpose"));
        }
        if req.department.trim().is_empty() {
            return Err(VisitError::MissingField("department"));
        }

        let patient = self.find_patient_by_email(&req.patient_email).await?;
        let profile_doc = self.store.get(collections::PATIENTS, &patient.id).await;
        let user_doc = self.store.get(collections::USERS, &patient.id).await;

        for _ in 0..PASSPORT_CAS_ATTEMPTS {
            let now = Utc::now();
            let passport_doc = self
                .store
                .get(collections::EHEALTH_PASSPORTS, &patient.id)
                .await;
            // The guard compares the raw stored `updatedAt`, not a value that
            // round-tripped through serde.
            let passport_guard = match &passport_doc {
                Some(doc) => Precondition::FieldEquals {
                    collection: collections::EHEALTH_PASSPORTS.to_string(),
                    id: patient.id.clone(),
                    field: "updatedAt".to_string(),
                    value: doc.get("updatedAt").cloned().unwrap_or(serde_json::Value::Null),
                    message: PASSPORT_CONFLICT.to_string(),
                },
                None => Precondition::NoneMatches {
                    collection: collections::EHEALTH_PASSPORTS.to_string(),
                    filters: vec![("patientId".to_string(), json!(&patient.id))],
                    message: PASSPORT_CONFLICT.to_string(),
                },
            };
            let existing =
                passport_doc.and_then(|doc| serde_json::from_value::<HealthPassport>(doc).ok());
            let first_activation = !existing.as_ref().map(|p| p.is_active).unwrap_or(false);

            let mut pass = match existing.filter(|p| p.is_active) {
                Some(p) => p,
                None => passport::build_passport(
                    &patient.id,
                    profile_doc.as_ref(),
                    user_doc.as_ref(),
                    now,
                ),
            };
            passport::record_visit(&mut pass, &hospital_id, now);

            let visit = Visit {
                id: Visit::derive_id(&patient.id, &hospital_id, now),
                patient_id: patient.id.clone(),
                hospital_id: hospital_id.clone(),
                check_in_time: now,
                check_out_time: None,
                status: VisitStatus::CheckedIn,
                purpose: req.purpose.trim().to_string(),
                department: req.department.trim().to_string(),
                is_first_visit: first_activation,
            };
            let grant = grants::issue_for_visit(&visit);

            let action = if first_activation {
                AuditAction::PassportActivated
            } else {
                AuditAction::CheckIn
            };
            let event = AuditEvent::new(
                &caller.user_id,
                action,
                "visit",
                &visit.id,
                json!({
                    "patientId": &patient.id,
                    "hospitalId": &hospital_id,
                    "department": &visit.department,
                }),
            );

            let mut batch = WriteBatch::new()
                .require(Precondition::NoneMatches {
                    collection: collections::VISITS.to_string(),
                    filters: vec![
                        ("patientId".to_string(), json!(&patient.id)),
                        ("hospitalId".to_string(), json!(&hospital_id)),
                        ("status".to_string(), json!(VisitStatus::CheckedIn)),
                    ],
                    message: "already checked in".to_string(),
                })
                .require(passport_guard)
                .put(collections::VISITS, &visit.id, json!(&visit))
                .put(collections::ACCESS_GRANTS, &grant.id, json!(&grant))
                .put(collections::EHEALTH_PASSPORTS, &patient.id, json!(&pass));
            batch.push(audit::op_for(&event));

            match self.store.apply(batch).await {
                Ok(()) => {
                    info!(
                        visit_id = %visit.id,
                        patient_id = %visit.patient_id,
                        hospital_id = %visit.hospital_id,
                        first_visit = first_activation,
                        "patient checked in"
                    );
                    return Ok(CheckInOutcome {
                        visit,
                        passport_activated: first_activation,
                    });
                }
                Err(StoreError::PreconditionFailed(msg)) if msg == PASSPORT_CONFLICT => {
                    info!(patient_id = %patient.id, "passport changed during check-in, retrying");
                    continue;
                }
                Err(StoreError::PreconditionFailed(_)) => return Err(VisitError::AlreadyCheckedIn),
                Err(e) => return Err(e.into()),
            }
        }

        Err(VisitError::Store(StoreError::PreconditionFailed(
            PASSPORT_CONFLICT.to_string(),
        )))
    }

    /// Close a visit and revoke every active grant tied to it.
    pub async fn check_out(
        &self,
        caller: &AuthSession,
        visit_id: &str,
    ) -> Result<CheckOutOutcome, VisitError> {
        let hospital_id = self.require_staff(caller)?;

        let visit: Visit = self
            .store
            .get(collections::VISITS, visit_id)
            .await
            .and_then(|doc| serde_json::from_value(doc).ok())
            .ok_or(VisitError::VisitNotFound)?;

        if visit.hospital_id != hospital_id {
            return Err(VisitError::WrongHospital);
        }
        if visit.status != VisitStatus::CheckedIn {
            return Err(VisitError::NotCheckedIn);
        }

        let now = Utc::now();
        let active_grants = self
            .store
            .find(
                collections::ACCESS_GRANTS,
                &[("visitId", json!(visit_id)), ("status", json!("active"))],
            )
            .await;

        let mut visit_fields = serde_json::Map::new();
        visit_fields.insert("status".to_string(), json!(VisitStatus::CheckedOut));
        visit_fields.insert("checkOutTime".to_string(), json!(now));

        let event = AuditEvent::new(
            &caller.user_id,
            AuditAction::CheckOut,
            "visit",
            visit_id,
            json!({
                "patientId": visit.patient_id,
                "hospitalId": hospital_id,
                "grantsRevoked": active_grants.len(),
            }),
        );

        let mut batch = WriteBatch::new()
            .require(Precondition::FieldEquals {
                collection: collections::VISITS.to_string(),
                id: visit_id.to_string(),
                field: "status".to_string(),
                value: json!(VisitStatus::CheckedIn),
                message: "visit is not checked in".to_string(),
            })
            .update(collections::VISITS, visit_id, visit_fields);
        for grant in &active_grants {
            if let Some(grant_id) = grant.get("id").and_then(|v| v.as_str()) {
                batch = batch.update(
                    collections::ACCESS_GRANTS,
                    grant_id,
                    grants::revocation_fields(now),
                );
            }
        }
        batch.push(audit::op_for(&event));

        match self.store.apply(batch).await {
            Ok(()) => {}
            Err(StoreError::PreconditionFailed(_)) => return Err(VisitError::NotCheckedIn),
            Err(e) => return Err(e.into()),
        }

        info!(
            visit_id = %visit_id,
            grants_revoked = active_grants.len(),
            "patient checked out"
        );

        Ok(CheckOutOutcome {
            visit_id: visit_id.to_string(),
            check_out_time: now,
            grants_revoked: active_grants.len(),
        })
    }

    fn require_staff(&self, caller: &AuthSession) -> Result<String, VisitError> {
        if !caller.role.is_staff() {
            return Err(VisitError::NotStaff);
        }
        caller
            .hospital_id
            .clone()
            .ok_or(VisitError::NoHospital)
    }

    async fn find_patient_by_email(&self, email: &str) -> Result<User, VisitError> {
        let needle = email.trim().to_lowercase();
        let users = self.store.list(collections::USERS).await;
        users
            .into_iter()
            .filter_map(|doc| serde_json::from_value::<User>(doc).ok())
            .find(|u| u.role == Role::Patient && u.email.to_lowercase() == needle)
            .ok_or(VisitError::PatientNotFound)
    }
}
