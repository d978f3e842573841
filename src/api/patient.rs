//! Patient Endpoints - Self-service reads

use std::sync::Arc;

use axum::extract::Extension;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;

use super::error::{ok, ApiError};
use crate::auth::AuthSession;
use crate::models::{HealthPassport, Role, Visit};
use crate::store::{collections, DocumentStore};

pub fn routes() -> Router {
    Router::new()
        .route("/visits", get(my_visits))
        .route("/ehealth-passport", get(my_passport))
        .route("/scheduler/medications", get(my_medications))
}

fn require_patient(session: &AuthSession) -> Result<String, ApiError> {
    if session.role != Role::Patient {
        return Err(ApiError::forbidden("patient access required"));
    }
    Ok(session.user_id.clone())
}

async fn my_visits(
    Extension(store): Extension<Arc<DocumentStore>>,
    Extension(session): Extension<AuthSession>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let patient_id = require_patient(&session)?;
    let mut visits: Vec<Visit> = store
        .find(collections::VISITS, &[("patientId", json!(patient_id))])
        .await
        .into_iter()
        .filter_map(|doc| serde_json::from_value(doc).ok())
        .collect();
    visits.sort_by(|a, b| b.check_in_time.cmp(&a.check_in_time));
    Ok(ok(visits))
}

/// 404 until the first check-in activates the passport.
async fn my_passport(
    Extension(store): Extension<Arc<DocumentStore>>,
    Extension(session): Extension<AuthSession>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let patient_id = require_patient(&session)?;
    let passport = store
        .get(collections::EHEALTH_PASSPORTS, &patient_id)
        .await
        .ok_or_else(|| ApiError::not_found("e-health passport not initialized"))?;
    Ok(ok(passport))
}

async fn my_medications(
    Extension(store): Extension<Arc<DocumentStore>>,
    Extension(session): Extension<AuthSession>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let patient_id = require_patient(&session)?;
    let medications = store
        .get(collections::EHEALTH_PASSPORTS, &patient_id)
        .await
        .and_then(|doc| serde_json::from_value::<HealthPassport>(doc).ok())
        .map(|p| p.medical_history.medications)
        .unwrap_or_default();
    Ok(ok(medications))
}
