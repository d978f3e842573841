//! Diagnosis Endpoints - AI symptom analysis

use std::sync::Arc;

use axum::extract::Extension;
use axum::routing::post;
use axum::{Json, Router};
use serde_json::json;

use super::error::{ok, ApiError};
use crate::ai::{DiagnosisService, SymptomReport};
use crate::auth::AuthSession;
use crate::models::Role;

pub fn routes() -> Router {
    Router::new().route("/start", post(start))
}

async fn start(
    Extension(diagnosis): Extension<Arc<DiagnosisService>>,
    Extension(session): Extension<AuthSession>,
    Json(report): Json<SymptomReport>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if session.role != Role::Patient {
        return Err(ApiError::forbidden("only patients can request a diagnosis"));
    }
    let outcome = diagnosis.start(&session.user_id, report).await?;

    // The upstream result is flattened into the response; a non-object
    // result (parseable but malformed) is passed through under `result`.
    let mut data = match &outcome.result {
        serde_json::Value::Object(fields) => serde_json::Value::Object(fields.clone()),
        other => json!({ "result": other }),
    };
    if let Some(obj) = data.as_object_mut() {
        obj.insert("sessionId".to_string(), json!(outcome.id));
    }
    Ok(ok(data))
}
