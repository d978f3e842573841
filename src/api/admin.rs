//! Admin Endpoints - Platform administration
//!
//! Super-admin routes manage hospital admins and provision hospitals.
//! Hospital provisioning writes the hospital and its admin user in one
//! batch, guarded against an email collision.

use std::sync::Arc;

use axum::extract::{Extension, Path};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use super::error::{ok, ApiError};
use crate::audit::AuditLogger;
use crate::auth::AuthSession;
use crate::models::{
    AuditAction, AuditEvent, Hospital, HospitalStatus, Role, User,
};
use crate::audit;
use crate::store::{collections, DocumentStore, Precondition, StoreError, WriteBatch};

pub fn super_admin_routes() -> Router {
    Router::new()
        .route("/admins", get(list_admins))
        .route("/admins/:id", axum::routing::patch(update_admin).delete(delete_admin))
        .route("/hospitals", post(provision_hospital).get(list_hospitals))
}

pub fn hospital_admin_routes() -> Router {
    Router::new().route("/hospital-admins", get(list_own_hospital_admins))
}

fn require_super_admin(session: &AuthSession) -> Result<(), ApiError> {
    if session.role != Role::SuperAdmin {
        return Err(ApiError::forbidden("super admin access required"));
    }
    Ok(())
}

async fn list_admins(
    Extension(store): Extension<Arc<DocumentStore>>,
    Extension(session): Extension<AuthSession>,
) -> Result<Json<serde_json::Value>, ApiError> {
    require_super_admin(&session)?;
    let admins: Vec<User> = store
        .list(collections::USERS)
        .await
        .into_iter()
        .filter_map(|doc| serde_json::from_value::<User>(doc).ok())
        .filter(|u| u.role == Role::HospitalAdmin)
        .collect();
    Ok(ok(admins))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AdminUpdateBody {
    is_active: bool,
}

async fn update_admin(
    Extension(store): Extension<Arc<DocumentStore>>,
    Extension(audit_log): Extension<Arc<AuditLogger>>,
    Extension(session): Extension<AuthSession>,
    Path(id): Path<String>,
    Json(body): Json<AdminUpdateBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    require_super_admin(&session)?;
    let admin = fetch_admin(&store, &id).await?;

    let mut fields = serde_json::Map::new();
    fields.insert("isActive".to_string(), json!(body.is_active));
    store
        .update(collections::USERS, &id, fields)
        .await
        .map_err(ApiError::from)?;

    audit_log
        .append(
            &session.user_id,
            AuditAction::AdminStatusChanged,
            "user",
            &id,
            json!({ "isActive": body.is_active, "email": admin.email }),
        )
        .await
        .map_err(ApiError::from)?;

    Ok(ok(json!({ "id": id, "isActive": body.is_active })))
}

async fn delete_admin(
    Extension(store): Extension<Arc<DocumentStore>>,
    Extension(audit_log): Extension<Arc<AuditLogger>>,
    Extension(session): Extension<AuthSession>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    require_super_admin(&session)?;
    let admin = fetch_admin(&store, &id).await?;

    if !store.delete(collections::USERS, &id).await {
        return Err(ApiError::not_found("admin not found"));
    }

    audit_log
        .append(
            &session.user_id,
            AuditAction::AdminDeleted,
            "user",
            &id,
            json!({ "email": admin.email }),
        )
        .await
        .map_err(ApiError::from)?;

    info!(admin_id = %id, "hospital admin deleted");
    Ok(ok(json!({ "id": id, "deleted": true })))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProvisionBody {
    name: String,
    email: String,
    phone: String,
    address: String,
    admin_email: String,
    admin_first_name: String,
    admin_last_name: String,
}

/// Create a hospital together with its first admin account.
async fn provision_hospital(
    Extension(store): Extension<Arc<DocumentStore>>,
    Extension(session): Extension<AuthSession>,
    Json(body): Json<ProvisionBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    require_super_admin(&session)?;
    if body.name.trim().is_empty() {
        return Err(ApiError::bad_request("hospital name must not be empty"));
    }
    let admin_email = body.admin_email.trim().to_lowercase();
    if admin_email.is_empty() {
        return Err(ApiError::bad_request("admin email must not be empty"));
    }

    let now = Utc::now();
    let admin = User {
        id: uuid::Uuid::new_v4().to_string(),
        email: admin_email.clone(),
        role: Role::HospitalAdmin,
        hospital_id: None,
        first_name: body.admin_first_name.trim().to_string(),
        last_name: body.admin_last_name.trim().to_string(),
        is_active: true,
        setup_complete: false,
        created_at: now,
    };
    let hospital = Hospital {
        id: uuid::Uuid::new_v4().to_string(),
        name: body.name.trim().to_string(),
        email: body.email.trim().to_lowercase(),
        phone: body.phone.trim().to_string(),
        address: body.address.trim().to_string(),
        status: HospitalStatus::Active,
        admin_id: admin.id.clone(),
        created_at: now,
    };
    let admin = User {
        hospital_id: Some(hospital.id.clone()),
        ..admin
    };

    let event = AuditEvent::new(
        &session.user_id,
        AuditAction::HospitalProvisioned,
        "hospital",
        &hospital.id,
        json!({ "name": &hospital.name, "adminId": &admin.id }),
    );

    let mut batch = WriteBatch::new()
        .require(Precondition::NoneMatches {
            collection: collections::USERS.to_string(),
            filters: vec![("email".to_string(), json!(admin_email))],
            message: "a user with this email already exists".to_string(),
        })
        .put(collections::HOSPITALS, &hospital.id, json!(&hospital))
        .put(collections::USERS, &admin.id, json!(&admin));
    batch.push(audit::op_for(&event));

    match store.apply(batch).await {
        Ok(()) => {}
        Err(StoreError::PreconditionFailed(msg)) => return Err(ApiError::bad_request(msg)),
        Err(e) => return Err(e.into()),
    }

    info!(hospital_id = %hospital.id, admin_id = %admin.id, "hospital provisioned");
    Ok(ok(json!({ "hospital": hospital, "admin": admin })))
}

async fn list_hospitals(
    Extension(store): Extension<Arc<DocumentStore>>,
    Extension(session): Extension<AuthSession>,
) -> Result<Json<serde_json::Value>, ApiError> {
    require_super_admin(&session)?;
    let hospitals = store.list(collections::HOSPITALS).await;
    Ok(ok(hospitals))
}

/// Hospital admins see the admin accounts of their own hospital only.
async fn list_own_hospital_admins(
    Extension(store): Extension<Arc<DocumentStore>>,
    Extension(session): Extension<AuthSession>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if session.role != Role::HospitalAdmin {
        return Err(ApiError::forbidden("hospital admin access required"));
    }
    let hospital_id = session
        .hospital_id
        .clone()
        .ok_or_else(|| ApiError::forbidden("no hospital affiliation"))?;

    let admins: Vec<User> = store
        .list(collections::USERS)
        .await
        .into_iter()
        .filter_map(|doc| serde_json::from_value::<User>(doc).ok())
        .filter(|u| u.role == Role::HospitalAdmin && u.hospital_id.as_deref() == Some(&hospital_id))
        .collect();
    Ok(ok(admins))
}

async fn fetch_admin(store: &DocumentStore, id: &str) -> Result<User, ApiError> {
    let user: User = store
        .get(collections::USERS, id)
        .await
        .and_then(|doc| serde_json::from_value(doc).ok())
        .ok_or_else(|| ApiError::not_found("admin not found"))?;
    if user.role != Role::HospitalAdmin {
        return Err(ApiError::not_found("admin not found"));
    }
    Ok(user)
}
