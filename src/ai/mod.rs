//! AI Module - Symptom analysis through an upstream generative-language API
//!
//! The upstream response schema is pinned so the model always returns
//! `conditions`, `recommendations` and `urgencyLevel`; the parsed JSON is
//! persisted verbatim, never reshaped.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{error, info};

use crate::models::DiagnosisSession;
use crate::retry::{Retry, RetryPolicy};
use crate::store::{collections, DocumentStore};

#[derive(Debug, thiserror::Error)]
pub enum AiError {
    #[error("upstream rejected the request")]
    Forbidden,
    #[error("upstream call failed: {0}")]
    Upstream(String),
    #[error("unparseable upstream response: {0}")]
    Parse(String),
    #[error("provider misconfigured: {0}")]
    Config(String),
    #[error("symptoms must not be empty")]
    EmptySymptoms,
}

impl AiError {
    /// Only transport-level failures are worth retrying. A 403 means the
    /// key or quota is bad and will not fix itself between attempts.
    pub fn is_transient(&self) -> bool {
        matches!(self, AiError::Upstream(_))
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SymptomReport {
    pub symptoms: Vec<String>,
    #[serde(default)]
    pub duration: Option<String>,
    #[serde(default)]
    pub severity: Option<String>,
    #[serde(default)]
    pub additional_notes: Option<String>,
}

#[async_trait]
pub trait DiagnosisProvider: Send + Sync {
    async fn analyze(&self, report: &SymptomReport) -> Result<Value, AiError>;
    fn name(&self) -> &str;
}

/// Calls Google's Generative Language REST API with a constrained response
/// schema, so the model output parses as structured JSON.
pub struct GenerativeLanguageProvider {
    api_key: String,
    model: String,
    client: reqwest::Client,
}

impl GenerativeLanguageProvider {
    pub fn new(api_key: &str, model: &str) -> Self {
        Self {
            api_key: api_key.trim().to_string(),
            model: model.to_string(),
            client: reqwest::Client::new(),
        }
    }

    fn prompt(report: &SymptomReport) -> String {
        let mut parts = vec![format!(
            "A patient reports the following symptoms: {}.",
            report.symptoms.join(", ")
        )];
        if let Some(d) = &report.duration {
            parts.push(format!("Duration: {}.", d));
        }
        if let Some(s) = &report.severity {
            parts.push(format!("Severity: {}.", s));
        }
        if let Some(n) = &report.additional_notes {
            parts.push(format!("Notes: {}.", n));
        }
        parts.push(
            "Suggest possible conditions, practical recommendations, and an \
             overall urgency level (low, medium, or high)."
                .to_string(),
        );
        parts.join(" ")
    }

    fn response_schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "conditions": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "name": { "type": "string" },
                            "likelihood": { "type": "string" },
                            "description": { "type": "string" }
                        },
                        "required": ["name", "likelihood"]
                    }
                },
                "recommendations": {
                    "type": "array",
                    "items": { "type": "string" }
                },
                "urgencyLevel": { "type": "string" }
            },
            "required": ["conditions", "recommendations", "urgencyLevel"]
        })
    }
}

#[async_trait]
impl DiagnosisProvider for GenerativeLanguageProvider {
    async fn analyze(&self, report: &SymptomReport) -> Result<Value, AiError> {
        if self.api_key.is_empty() {
            return Err(AiError::Config("no generative API key set".to_string()));
        }
        let url = format!(
            "https://generativelanguage.googleapis.com/v1beta/models/{}:generateContent?key={}",
            self.model, self.api_key
        );
        let body = json!({
            "contents": [{
                "parts": [{ "text": Self::prompt(report) }]
            }],
            "generationConfig": {
                "responseMimeType": "application/json",
                "responseSchema": Self::response_schema(),
            }
        });

        let resp = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| AiError::Upstream(e.to_string()))?;

        let status = resp.status();
        if status == reqwest::StatusCode::FORBIDDEN {
            return Err(AiError::Forbidden);
        }
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(AiError::Upstream(format!("status {}: {}", status, text)));
        }

        let payload: Value = resp
            .json()
            .await
            .map_err(|e| AiError::Upstream(e.to_string()))?;

        let text = payload["candidates"][0]["content"]["parts"][0]["text"]
            .as_str()
            .ok_or_else(|| AiError::Parse("no candidate text in response".to_string()))?;

        serde_json::from_str(text).map_err(|e| AiError::Parse(e.to_string()))
    }

    fn name(&self) -> &str {
        &self.model
    }
}

pub struct DiagnosisService {
    provider: Arc<dyn DiagnosisProvider>,
    store: Arc<DocumentStore>,
    policy: RetryPolicy,
}

impl DiagnosisService {
    pub fn new(
        provider: Arc<dyn DiagnosisProvider>,
        store: Arc<DocumentStore>,
        max_retries: u32,
        initial_backoff: Duration,
    ) -> Self {
        let policy = RetryPolicy::default()
            .with_attempts(max_retries + 1)
            .with_delay(initial_backoff);
        Self {
            provider,
            store,
            policy,
        }
    }

    /// Run one symptom analysis and persist the session. Input is validated
    /// before any upstream call is made.
    pub async fn start(
        &self,
        patient_id: &str,
        report: SymptomReport,
    ) -> Result<DiagnosisSession, AiError> {
        let symptoms: Vec<String> = report
            .symptoms
            .iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        if symptoms.is_empty() {
            return Err(AiError::EmptySymptoms);
        }
        let report = SymptomReport { symptoms, ..report };

        let outcome = Retry::execute_if(
            &self.policy,
            || async { self.provider.analyze(&report).await },
            |e: &AiError| e.is_transient(),
        )
        .await;

        let result = match outcome.result {
            Ok(v) => v,
            Err(e) => {
                error!(
                    provider = self.provider.name(),
                    attempts = outcome.attempts,
                    error = %e,
                    "diagnosis failed"
                );
                return Err(e);
            }
        };

        let session = DiagnosisSession {
            id: uuid::Uuid::new_v4().to_string(),
            patient_id: patient_id.to_string(),
            symptoms: json!(report.symptoms),
            result,
            status: "completed".to_string(),
            created_at: Utc::now(),
        };
        self.store
            .insert(
                collections::DIAGNOSIS_SESSIONS,
                &session.id,
                json!(&session),
            )
            .await
            .map_err(|e| AiError::Upstream(e.to_string()))?;

        info!(
            session_id = %session.id,
            patient_id = %patient_id,
            attempts = outcome.attempts,
            "diagnosis session recorded"
        );
        Ok(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct ScriptedProvider {
        calls: AtomicU32,
        fail_first: u32,
        error: fn() -> AiError,
    }

    #[async_trait]
    impl DiagnosisProvider for ScriptedProvider {
        async fn analyze(&self, _report: &SymptomReport) -> Result<Value, AiError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_first {
                Err((self.error)())
            } else {
                Ok(json!({
                    "conditions": [{ "name": "common cold", "likelihood": "high" }],
                    "recommendations": ["rest"],
                    "urgencyLevel": "low"
                }))
            }
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    fn service(provider: Arc<ScriptedProvider>, store: Arc<DocumentStore>) -> DiagnosisService {
        DiagnosisService::new(provider, store, 3, Duration::from_millis(1))
    }

    fn report(symptoms: &[&str]) -> SymptomReport {
        SymptomReport {
            symptoms: symptoms.iter().map(|s| s.to_string()).collect(),
            duration: None,
            severity: None,
            additional_notes: None,
        }
    }

    #[tokio::test]
    async fn result_is_stored_verbatim() {
        let provider = Arc::new(ScriptedProvider {
            calls: AtomicU32::new(0),
            fail_first: 0,
            error: || AiError::Upstream("unused".to_string()),
        });
        let store = Arc::new(DocumentStore::new());
        let svc = service(provider, store.clone());

        let session = svc.start("p1", report(&["cough", "fever"])).await.unwrap();
        assert_eq!(session.result["urgencyLevel"], "low");
        assert_eq!(session.status, "completed");

        let stored = store
            .get(collections::DIAGNOSIS_SESSIONS, &session.id)
            .await
            .unwrap();
        assert_eq!(stored["result"], session.result);
        assert_eq!(stored["symptoms"], json!(["cough", "fever"]));
    }

    #[tokio::test]
    async fn transient_failures_are_retried() {
        let provider = Arc::new(ScriptedProvider {
            calls: AtomicU32::new(0),
            fail_first: 2,
            error: || AiError::Upstream("connection reset".to_string()),
        });
        let store = Arc::new(DocumentStore::new());
        let svc = service(provider.clone(), store);

        svc.start("p1", report(&["cough"])).await.unwrap();
        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn forbidden_is_not_retried() {
        let provider = Arc::new(ScriptedProvider {
            calls: AtomicU32::new(0),
            fail_first: u32::MAX,
            error: || AiError::Forbidden,
        });
        let store = Arc::new(DocumentStore::new());
        let svc = service(provider.clone(), store.clone());

        let err = svc.start("p1", report(&["cough"])).await.unwrap_err();
        assert!(matches!(err, AiError::Forbidden));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
        assert_eq!(store.count(collections::DIAGNOSIS_SESSIONS).await, 0);
    }

    #[tokio::test]
    async fn empty_symptoms_never_reach_the_provider() {
        let provider = Arc::new(ScriptedProvider {
            calls: AtomicU32::new(0),
            fail_first: 0,
            error: || AiError::Upstream("unused".to_string()),
        });
        let store = Arc::new(DocumentStore::new());
        let svc = service(provider.clone(), store);

        let err = svc.start("p1", report(&["  ", ""])).await.unwrap_err();
        assert!(matches!(err, AiError::EmptySymptoms));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn retries_give_up_after_the_attempt_cap() {
        let provider = Arc::new(ScriptedProvider {
            calls: AtomicU32::new(0),
            fail_first: u32::MAX,
            error: || AiError::Upstream("timeout".to_string()),
        });
        let store = Arc::new(DocumentStore::new());
        let svc = service(provider.clone(), store);

        let err = svc.start("p1", report(&["cough"])).await.unwrap_err();
        assert!(matches!(err, AiError::Upstream(_)));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 4);
    }
}
