//! API Layer - REST surface and middleware
//!
//! One router per audience, wired together with shared service handles as
//! `Extension` layers so every surface sees the same store.

pub mod admin;
pub mod auth;
pub mod diagnosis;
pub mod doctor;
pub mod error;
pub mod hospital;
pub mod middleware;
pub mod patient;
pub mod visits;

use std::sync::Arc;

use axum::routing::get;
use axum::{Extension, Json, Router};
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::ai::DiagnosisService;
use crate::audit::AuditLogger;
use crate::auth::{IdentityVerifier, SessionManager};
use crate::store::DocumentStore;
use crate::visits::VisitService;

pub struct AppServices {
    pub store: Arc<DocumentStore>,
    pub sessions: Arc<SessionManager>,
    pub verifier: Arc<IdentityVerifier>,
    pub visits: Arc<VisitService>,
    pub diagnosis: Arc<DiagnosisService>,
    pub audit: Arc<AuditLogger>,
}

pub fn router(services: AppServices) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        .nest("/api/auth", auth::routes())
        .nest("/api/visits", visits::routes())
        .nest("/api/ai-diagnosis", diagnosis::routes())
        .nest("/api/super-admin", admin::super_admin_routes())
        .nest("/api/admin", admin::hospital_admin_routes())
        .nest("/api/hospital", hospital::routes())
        .nest("/api/doctor", doctor::routes())
        .nest("/api/patient", patient::routes())
        .layer(axum::middleware::from_fn(middleware::auth_middleware))
        .layer(axum::middleware::from_fn(middleware::request_logging))
        .layer(Extension(services.store))
        .layer(Extension(services.sessions))
        .layer(Extension(services.verifier))
        .layer(Extension(services.visits))
        .layer(Extension(services.diagnosis))
        .layer(Extension(services.audit))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

async fn health_check() -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "service": "caregrid",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
