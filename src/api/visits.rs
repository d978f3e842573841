//! Visit Endpoints - Check-in and check-out

use std::sync::Arc;

use axum::extract::{Extension, Path};
use axum::routing::post;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;

use super::error::{ok, ApiError};
use crate::auth::AuthSession;
use crate::visits::{CheckInRequest, VisitService};

pub fn routes() -> Router {
    Router::new()
        .route("/checkin", post(check_in))
        .route("/:visit_id/checkout", post(check_out))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CheckInBody {
    #[serde(default)]
    patient_email: String,
    #[serde(default)]
    purpose: String,
    #[serde(default)]
    department: String,
}

async fn check_in(
    Extension(visits): Extension<Arc<VisitService>>,
    Extension(session): Extension<AuthSession>,
    Json(body): Json<CheckInBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let outcome = visits
        .check_in(
            &session,
            CheckInRequest {
                patient_email: body.patient_email,
                purpose: body.purpose,
                department: body.department,
            },
        )
        .await?;

    let mut data = serde_json::to_value(&outcome.visit)
        .map_err(|e| ApiError::internal(e.to_string()))?;
    if let Some(obj) = data.as_object_mut() {
        obj.insert(
            "eHealthPassportActivated".to_string(),
            json!(outcome.passport_activated),
        );
    }
    Ok(ok(data))
}

async fn check_out(
    Extension(visits): Extension<Arc<VisitService>>,
    Extension(session): Extension<AuthSession>,
    Path(visit_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let outcome = visits.check_out(&session, &visit_id).await?;
    Ok(ok(json!({
        "visitId": outcome.visit_id,
        "checkOutTime": outcome.check_out_time,
        "grantsRevoked": outcome.grants_revoked,
    })))
}
