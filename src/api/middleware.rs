//! API Middleware - Session authentication and request logging

use std::sync::Arc;

use axum::extract::Request;
use axum::http::{header, Method, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::info;

use crate::auth::SessionManager;

pub const SESSION_COOKIE: &str = "cg_session";

/// Resolve the session cookie into an [`AuthSession`] request extension.
/// `/health` and the session-exchange endpoint itself stay public.
pub async fn auth_middleware(mut request: Request, next: Next) -> Response {
    let path = request.uri().path().to_string();

    if path == "/health" {
        return next.run(request).await;
    }
    if path == "/api/auth/session" && request.method() == &Method::POST {
        return next.run(request).await;
    }

    let token = cookie_value(&request, SESSION_COOKIE);
    let sessions = request
        .extensions()
        .get::<Arc<SessionManager>>()
        .cloned();

    let session = match (token, sessions) {
        (Some(token), Some(sessions)) => sessions.resolve(&token).await,
        _ => None,
    };

    match session {
        Some(session) => {
            request.extensions_mut().insert(session);
            next.run(request).await
        }
        None => (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "success": false, "error": "authentication required" })),
        )
            .into_response(),
    }
}

/// Tag each request with an id and log method, path, and status.
pub async fn request_logging(request: Request, next: Next) -> Response {
    let request_id = uuid::Uuid::new_v4().to_string();
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let start = std::time::Instant::now();

    let response = next.run(request).await;

    info!(
        %request_id,
        %method,
        %path,
        status = response.status().as_u16(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "request"
    );
    response
}

fn cookie_value(request: &Request, name: &str) -> Option<String> {
    let header = request.headers().get(header::COOKIE)?.to_str().ok()?;
    header.split(';').find_map(|pair| {
        let (k, v) = pair.trim().split_once('=')?;
        if k == name {
            Some(v.to_string())
        } else {
            None
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    fn request_with_cookie(value: &str) -> Request {
        Request::builder()
            .uri("/api/visits/checkin")
            .header(header::COOKIE, value)
            .body(Body::empty())
            .unwrap()
    }

    #[test]
    fn cookie_parsing_handles_multiple_pairs() {
        let req = request_with_cookie("theme=dark; cg_session=abc123; lang=en");
        assert_eq!(cookie_value(&req, SESSION_COOKIE).as_deref(), Some("abc123"));
        assert_eq!(cookie_value(&req, "missing"), None);
    }
}
