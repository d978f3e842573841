//! Auth Endpoints - Identity-token exchange and logout

use std::sync::Arc;

use axum::extract::Extension;
use axum::http::{header, HeaderMap, HeaderValue};
use axum::response::IntoResponse;
use axum::routing::post;
use axum::Router;
use serde_json::json;
use tracing::info;

use super::error::{ok, ApiError};
use super::middleware::SESSION_COOKIE;
use crate::auth::{AuthSession, IdentityVerifier, SessionManager};
use crate::models::User;
use crate::store::{collections, DocumentStore};

pub fn routes() -> Router {
    Router::new().route("/session", post(create_session).delete(delete_session))
}

/// Exchange a verified identity-provider token for a session cookie. The
/// token only proves who the caller is; role and hospital come from our
/// own user record.
async fn create_session(
    Extension(verifier): Extension<Arc<IdentityVerifier>>,
    Extension(sessions): Extension<Arc<SessionManager>>,
    Extension(store): Extension<Arc<DocumentStore>>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let token = bearer_token(&headers)
        .ok_or_else(|| ApiError::unauthorized("missing bearer token"))?;
    let claims = verifier
        .verify(token)
        .map_err(|_| ApiError::unauthorized("invalid identity token"))?;

    let needle = claims.email.to_lowercase();
    let user = store
        .list(collections::USERS)
        .await
        .into_iter()
        .filter_map(|doc| serde_json::from_value::<User>(doc).ok())
        .find(|u| u.email.to_lowercase() == needle)
        .ok_or_else(|| ApiError::unauthorized("no account for this identity"))?;
    if !user.is_active {
        return Err(ApiError::forbidden("account is deactivated"));
    }

    let token = sessions.create(&user).await;
    info!(user_id = %user.id, role = %user.role, "session created");

    let cookie = format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax",
        SESSION_COOKIE, token
    );
    let mut headers = HeaderMap::new();
    headers.insert(
        header::SET_COOKIE,
        HeaderValue::from_str(&cookie).map_err(|e| ApiError::internal(e.to_string()))?,
    );

    Ok((
        headers,
        ok(json!({
            "userId": user.id,
            "email": user.email,
            "role": user.role,
            "hospitalId": user.hospital_id,
            "setupComplete": user.setup_complete,
        })),
    ))
}

async fn delete_session(
    Extension(sessions): Extension<Arc<SessionManager>>,
    Extension(session): Extension<AuthSession>,
) -> Result<impl IntoResponse, ApiError> {
    sessions.revoke(&session.session_id).await;

    let cookie = format!("{}=; Path=/; HttpOnly; Max-Age=0", SESSION_COOKIE);
    let mut headers = HeaderMap::new();
    headers.insert(
        header::SET_COOKIE,
        HeaderValue::from_str(&cookie).map_err(|e| ApiError::internal(e.to_string()))?,
    );
    Ok((headers, ok(json!({ "revoked": true }))))
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}
