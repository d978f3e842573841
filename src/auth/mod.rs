//! Auth Module - Bearer-token verification and opaque sessions
//!
//! Token issuance belongs to the external identity provider; this module only
//! verifies the provider's JWTs and exchanges them for server-side session
//! tokens carried in a cookie. The resolved [`AuthSession`] is attached to
//! each request by middleware, so handlers receive an explicit identity
//! instead of reading ambient state.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::models::{Role, User};

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("invalid or expired bearer token")]
    InvalidToken,
    #[error("no active account for this identity")]
    UnknownUser,
}

/// Claims carried by the identity provider's bearer tokens.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub email: String,
    pub exp: usize,
}

/// Verifies bearer tokens issued by the identity provider (HS256).
pub struct IdentityVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl IdentityVerifier {
    pub fn new(secret: &str) -> Self {
        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::new(Algorithm::HS256),
        }
    }

    pub fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        decode::<Claims>(token, &self.key, &self.validation)
            .map(|data| data.claims)
            .map_err(|_| AuthError::InvalidToken)
    }
}

/// Request-scoped identity, snapshotted from the user record at login.
#[derive(Clone, Debug)]
pub struct AuthSession {
    pub session_id: String,
    pub user_id: String,
    pub email: String,
    pub role: Role,
    pub hospital_id: Option<String>,
}

struct SessionEntry {
    session: AuthSession,
    last_seen: Instant,
}

/// Opaque session tokens mapped to identities. Expiry is checked lazily on
/// resolve; expired entries are dropped then.
pub struct SessionManager {
    sessions: RwLock<HashMap<String, SessionEntry>>,
    ttl: Duration,
}

impl SessionManager {
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    /// Mint an opaque session token for a verified user.
    pub async fn create(&self, user: &User) -> String {
        let token = uuid::Uuid::new_v4().to_string();
        let session = AuthSession {
            session_id: token.clone(),
            user_id: user.id.clone(),
            email: user.email.clone(),
            role: user.role,
            hospital_id: user.hospital_id.clone(),
        };
        let mut sessions = self.sessions.write().await;
        sessions.insert(
            token.clone(),
            SessionEntry {
                session,
                last_seen: Instant::now(),
            },
        );
        token
    }

    pub async fn resolve(&self, token: &str) -> Option<AuthSession> {
        let mut sessions = self.sessions.write().await;
        match sessions.get_mut(token) {
            Some(entry) if entry.last_seen.elapsed() <= self.ttl => {
                entry.last_seen = Instant::now();
                Some(entry.session.clone())
            }
            Some(_) => {
                sessions.remove(token);
                None
            }
            None => None,
        }
    }

    pub async fn revoke(&self, token: &str) -> bool {
        self.sessions.write().await.remove(token).is_some()
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use jsonwebtoken::{encode, EncodingKey, Header};

    fn sample_user(role: Role) -> User {
        User {
            id: "u1".to_string(),
            email: "u1@x.com".to_string(),
            role,
            hospital_id: Some("h1".to_string()),
            first_name: "Test".to_string(),
            last_name: "User".to_string(),
            is_active: true,
            setup_complete: true,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn verifier_accepts_valid_token() {
        let secret = "test-secret";
        let claims = Claims {
            sub: "u1".to_string(),
            email: "u1@x.com".to_string(),
            exp: (Utc::now().timestamp() + 600) as usize,
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap();

        let verifier = IdentityVerifier::new(secret);
        let out = verifier.verify(&token).unwrap();
        assert_eq!(out.email, "u1@x.com");
    }

    #[test]
    fn verifier_rejects_wrong_secret() {
        let claims = Claims {
            sub: "u1".to_string(),
            email: "u1@x.com".to_string(),
            exp: (Utc::now().timestamp() + 600) as usize,
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(b"other-secret"),
        )
        .unwrap();
        assert!(IdentityVerifier::new("test-secret").verify(&token).is_err());
    }

    #[tokio::test]
    async fn session_round_trip_and_revoke() {
        let mgr = SessionManager::new(Duration::from_secs(60));
        let token = mgr.create(&sample_user(Role::Doctor)).await;

        let session = mgr.resolve(&token).await.unwrap();
        assert_eq!(session.user_id, "u1");
        assert_eq!(session.role, Role::Doctor);
        assert_eq!(session.hospital_id.as_deref(), Some("h1"));

        assert!(mgr.revoke(&token).await);
        assert!(mgr.resolve(&token).await.is_none());
    }

    #[tokio::test]
    async fn expired_session_is_dropped() {
        let mgr = SessionManager::new(Duration::from_millis(0));
        let token = mgr.create(&sample_user(Role::Patient)).await;
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert!(mgr.resolve(&token).await.is_none());
        assert_eq!(mgr.session_count().await, 0);
    }
}
