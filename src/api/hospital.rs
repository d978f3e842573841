//! Hospital Endpoints - Tenant-scoped catalog management
//!
//! Staff roles and departments share one record shape; every read filters
//! by the caller's hospital and every write stamps it, so a tenant can
//! never touch another tenant's rows.

use std::sync::Arc;

use axum::extract::{Extension, Path};
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;

use super::error::{ok, ApiError};
use crate::auth::AuthSession;
use crate::models::{Role, TenantRecord, User};
use crate::store::{collections, DocumentStore};

pub fn routes() -> Router {
    Router::new()
        .route("/roles", get(list_roles).post(create_role))
        .route("/roles/:id", axum::routing::put(update_role).delete(delete_role))
        .route("/departments", get(list_departments).post(create_department))
        .route(
            "/departments/:id",
            axum::routing::put(update_department).delete(delete_department),
        )
        .route("/staff", get(list_staff))
        .route("/staff/:id", axum::routing::patch(update_staff_status))
}

fn require_hospital_admin(session: &AuthSession) -> Result<String, ApiError> {
    if session.role != Role::HospitalAdmin {
        return Err(ApiError::forbidden("hospital admin access required"));
    }
    session
        .hospital_id
        .clone()
        .ok_or_else(|| ApiError::forbidden("no hospital affiliation"))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CatalogBody {
    name: String,
    #[serde(default)]
    description: String,
}

async fn list_catalog(
    store: &DocumentStore,
    collection: &str,
    hospital_id: &str,
) -> Vec<serde_json::Value> {
    store
        .find(collection, &[("hospitalId", json!(hospital_id))])
        .await
}

async fn create_catalog(
    store: &DocumentStore,
    collection: &str,
    hospital_id: String,
    body: CatalogBody,
) -> Result<TenantRecord, ApiError> {
    if body.name.trim().is_empty() {
        return Err(ApiError::bad_request("name must not be empty"));
    }
    let record = TenantRecord {
        id: uuid::Uuid::new_v4().to_string(),
        hospital_id,
        name: body.name.trim().to_string(),
        description: body.description.trim().to_string(),
        is_active: true,
        created_at: Utc::now(),
    };
    store
        .insert(collection, &record.id, json!(&record))
        .await
        .map_err(ApiError::from)?;
    Ok(record)
}

/// Load a record only if it belongs to the caller's hospital. A foreign id
/// reads as absent, not as forbidden.
async fn fetch_tenant_record(
    store: &DocumentStore,
    collection: &str,
    id: &str,
    hospital_id: &str,
) -> Result<TenantRecord, ApiError> {
    store
        .get(collection, id)
        .await
        .and_then(|doc| serde_json::from_value::<TenantRecord>(doc).ok())
        .filter(|r| r.hospital_id == hospital_id)
        .ok_or_else(|| ApiError::not_found("record not found"))
}

async fn update_catalog(
    store: &DocumentStore,
    collection: &str,
    id: &str,
    hospital_id: &str,
    body: CatalogBody,
) -> Result<serde_json::Value, ApiError> {
    fetch_tenant_record(store, collection, id, hospital_id).await?;
    if body.name.trim().is_empty() {
        return Err(ApiError::bad_request("name must not be empty"));
    }
    let mut fields = serde_json::Map::new();
    fields.insert("name".to_string(), json!(body.name.trim()));
    fields.insert("description".to_string(), json!(body.description.trim()));
    store
        .update(collection, id, fields)
        .await
        .map_err(ApiError::from)?;
    Ok(json!({ "id": id, "name": body.name.trim() }))
}

async fn delete_catalog(
    store: &DocumentStore,
    collection: &str,
    id: &str,
    hospital_id: &str,
) -> Result<serde_json::Value, ApiError> {
    fetch_tenant_record(store, collection, id, hospital_id).await?;
    store.delete(collection, id).await;
    Ok(json!({ "id": id, "deleted": true }))
}

async fn list_roles(
    Extension(store): Extension<Arc<DocumentStore>>,
    Extension(session): Extension<AuthSession>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let hospital_id = require_hospital_admin(&session)?;
    Ok(ok(list_catalog(&store, collections::STAFF_ROLES, &hospital_id).await))
}

async fn create_role(
    Extension(store): Extension<Arc<DocumentStore>>,
    Extension(session): Extension<AuthSession>,
    Json(body): Json<CatalogBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let hospital_id = require_hospital_admin(&session)?;
    let record = create_catalog(&store, collections::STAFF_ROLES, hospital_id, body).await?;
    Ok(ok(record))
}

async fn update_role(
    Extension(store): Extension<Arc<DocumentStore>>,
    Extension(session): Extension<AuthSession>,
    Path(id): Path<String>,
    Json(body): Json<CatalogBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let hospital_id = require_hospital_admin(&session)?;
    let out = update_catalog(&store, collections::STAFF_ROLES, &id, &hospital_id, body).await?;
    Ok(ok(out))
}

async fn delete_role(
    Extension(store): Extension<Arc<DocumentStore>>,
    Extension(session): Extension<AuthSession>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let hospital_id = require_hospital_admin(&session)?;
    let out = delete_catalog(&store, collections::STAFF_ROLES, &id, &hospital_id).await?;
    Ok(ok(out))
}

async fn list_departments(
    Extension(store): Extension<Arc<DocumentStore>>,
    Extension(session): Extension<AuthSession>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let hospital_id = require_hospital_admin(&session)?;
    Ok(ok(list_catalog(&store, collections::DEPARTMENTS, &hospital_id).await))
}

async fn create_department(
    Extension(store): Extension<Arc<DocumentStore>>,
    Extension(session): Extension<AuthSession>,
    Json(body): Json<CatalogBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let hospital_id = require_hospital_admin(&session)?;
    let record = create_catalog(&store, collections::DEPARTMENTS, hospital_id, body).await?;
    Ok(ok(record))
}

async fn update_department(
    Extension(store): Extension<Arc<DocumentStore>>,
    Extension(session): Extension<AuthSession>,
    Path(id): Path<String>,
    Json(body): Json<CatalogBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let hospital_id = require_hospital_admin(&session)?;
    let out = update_catalog(&store, collections::DEPARTMENTS, &id, &hospital_id, body).await?;
    Ok(ok(out))
}

async fn delete_department(
    Extension(store): Extension<Arc<DocumentStore>>,
    Extension(session): Extension<AuthSession>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let hospital_id = require_hospital_admin(&session)?;
    let out = delete_catalog(&store, collections::DEPARTMENTS, &id, &hospital_id).await?;
    Ok(ok(out))
}

async fn list_staff(
    Extension(store): Extension<Arc<DocumentStore>>,
    Extension(session): Extension<AuthSession>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let hospital_id = require_hospital_admin(&session)?;
    let staff: Vec<User> = store
        .list(collections::USERS)
        .await
        .into_iter()
        .filter_map(|doc| serde_json::from_value::<User>(doc).ok())
        .filter(|u| u.role.is_staff() && u.hospital_id.as_deref() == Some(hospital_id.as_str()))
        .collect();
    Ok(ok(staff))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StaffStatusBody {
    is_active: bool,
}

async fn update_staff_status(
    Extension(store): Extension<Arc<DocumentStore>>,
    Extension(session): Extension<AuthSession>,
    Path(id): Path<String>,
    Json(body): Json<StaffStatusBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let hospital_id = require_hospital_admin(&session)?;
    let staff: User = store
        .get(collections::USERS, &id)
        .await
        .and_then(|doc| serde_json::from_value(doc).ok())
        .filter(|u: &User| u.role.is_staff() && u.hospital_id.as_deref() == Some(hospital_id.as_str()))
        .ok_or_else(|| ApiError::not_found("staff member not found"))?;

    let mut fields = serde_json::Map::new();
    fields.insert("isActive".to_string(), json!(body.is_active));
    store
        .update(collections::USERS, &staff.id, fields)
        .await
        .map_err(ApiError::from)?;
    Ok(ok(json!({ "id": staff.id, "isActive": body.is_active })))
}
