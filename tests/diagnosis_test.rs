use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use chrono::Utc;
use serde_json::{json, Value};
use tower::ServiceExt; // for `oneshot`

use caregrid::ai::{AiError, DiagnosisProvider, DiagnosisService, SymptomReport};
use caregrid::api::{self, AppServices};
use caregrid::audit::AuditLogger;
use caregrid::auth::{IdentityVerifier, SessionManager};
use caregrid::models::{Role, User};
use caregrid::store::{collections, DocumentStore};
use caregrid::visits::VisitService;

struct ScriptedProvider {
    calls: AtomicU32,
    fail_first: u32,
    error: fn() -> AiError,
}

impl ScriptedProvider {
    fn succeeding() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicU32::new(0),
            fail_first: 0,
            error: || AiError::Upstream("unused".to_string()),
        })
    }

    fn failing(fail_first: u32, error: fn() -> AiError) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicU32::new(0),
            fail_first,
            error,
        })
    }
}

#[async_trait::async_trait]
impl DiagnosisProvider for ScriptedProvider {
    async fn analyze(&self, _report: &SymptomReport) -> Result<Value, AiError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if n < self.fail_first {
            Err((self.error)())
        } else {
            Ok(json!({
                "conditions": [{ "name": "tension headache", "likelihood": "high" }],
                "recommendations": ["hydration", "rest"],
                "urgencyLevel": "low"
            }))
        }
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

async fn build_app(
    store: Arc<DocumentStore>,
    provider: Arc<ScriptedProvider>,
) -> (Router, Arc<SessionManager>, String) {
    let sessions = Arc::new(SessionManager::new(Duration::from_secs(3600)));
    let patient = User {
        id: "p1".to_string(),
        email: "p1@x.com".to_string(),
        role: Role::Patient,
        hospital_id: None,
        first_name: "Pat".to_string(),
        last_name: "One".to_string(),
        is_active: true,
        setup_complete: true,
        created_at: Utc::now(),
    };
    store
        .insert(collections::USERS, "p1", serde_json::to_value(&patient).unwrap())
        .await
        .unwrap();
    let cookie = format!("cg_session={}", sessions.create(&patient).await);

    let app = api::router(AppServices {
        store: store.clone(),
        sessions: sessions.clone(),
        verifier: Arc::new(IdentityVerifier::new("test-secret")),
        visits: Arc::new(VisitService::new(store.clone())),
        diagnosis: Arc::new(DiagnosisService::new(
            provider,
            store.clone(),
            3,
            Duration::from_millis(1),
        )),
        audit: Arc::new(AuditLogger::new(store)),
    });
    (app, sessions, cookie)
}

async fn post_diagnosis(app: &Router, cookie: &str, body: Value) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/ai-diagnosis/start")
                .header(header::COOKIE, cookie)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn diagnosis_result_is_persisted_verbatim() {
    let store = Arc::new(DocumentStore::new());
    let provider = ScriptedProvider::succeeding();
    let (app, _, cookie) = build_app(store.clone(), provider).await;

    let (status, body) = post_diagnosis(
        &app,
        &cookie,
        json!({ "symptoms": ["headache", "nausea"], "severity": "moderate" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["urgencyLevel"], "low");
    assert_eq!(body["data"]["conditions"][0]["name"], "tension headache");

    let session_id = body["data"]["sessionId"].as_str().unwrap();
    let stored = store
        .get(collections::DIAGNOSIS_SESSIONS, session_id)
        .await
        .unwrap();
    assert_eq!(stored["patientId"], "p1");
    assert_eq!(stored["result"]["urgencyLevel"], "low");
    assert_eq!(stored["status"], "completed");
}

#[tokio::test]
async fn transient_upstream_failures_are_retried() {
    let store = Arc::new(DocumentStore::new());
    let provider = ScriptedProvider::failing(2, || AiError::Upstream("reset".to_string()));
    let (app, _, cookie) = build_app(store, provider.clone()).await;

    let (status, _) = post_diagnosis(&app, &cookie, json!({ "symptoms": ["cough"] })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn upstream_403_fails_without_retry() {
    let store = Arc::new(DocumentStore::new());
    let provider = ScriptedProvider::failing(u32::MAX, || AiError::Forbidden);
    let (app, _, cookie) = build_app(store.clone(), provider.clone()).await;

    let (status, body) = post_diagnosis(&app, &cookie, json!({ "symptoms": ["cough"] })).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["success"], false);
    assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    assert_eq!(store.count(collections::DIAGNOSIS_SESSIONS).await, 0);
}

#[tokio::test]
async fn persistent_failures_exhaust_the_retry_budget() {
    let store = Arc::new(DocumentStore::new());
    let provider = ScriptedProvider::failing(u32::MAX, || AiError::Upstream("timeout".to_string()));
    let (app, _, cookie) = build_app(store, provider.clone()).await;

    let (status, _) = post_diagnosis(&app, &cookie, json!({ "symptoms": ["cough"] })).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    // 1 initial call + 3 retries
    assert_eq!(provider.calls.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn empty_symptoms_are_rejected_before_any_upstream_call() {
    let store = Arc::new(DocumentStore::new());
    let provider = ScriptedProvider::succeeding();
    let (app, _, cookie) = build_app(store.clone(), provider.clone()).await;

    let (status, body) = post_diagnosis(&app, &cookie, json!({ "symptoms": ["", "  "] })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    assert_eq!(store.count(collections::DIAGNOSIS_SESSIONS).await, 0);
}

#[tokio::test]
async fn staff_cannot_use_the_symptom_checker() {
    let store = Arc::new(DocumentStore::new());
    let provider = ScriptedProvider::succeeding();
    let (app, sessions, _) = build_app(store.clone(), provider.clone()).await;

    let doctor = User {
        id: "d1".to_string(),
        email: "d1@h1.com".to_string(),
        role: Role::Doctor,
        hospital_id: Some("h1".to_string()),
        first_name: "Doc".to_string(),
        last_name: "One".to_string(),
        is_active: true,
        setup_complete: true,
        created_at: Utc::now(),
    };
    let cookie = format!("cg_session={}", sessions.create(&doctor).await);

    let (status, body) = post_diagnosis(&app, &cookie, json!({ "symptoms": ["cough"] })).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["success"], false);
    assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
}
