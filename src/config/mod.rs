//! Config Module - Configuration management
//!
//! Defaults work out of the box for development; a TOML or JSON file can
//! override them, and secrets (identity secret, generative API key) are
//! picked up from the environment last.

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub identity: IdentityConfig,
    pub ai: AiConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IdentityConfig {
    /// Shared secret for verifying the identity provider's bearer tokens.
    pub jwt_secret: String,
    /// Opaque-session idle timeout.
    pub session_ttl_seconds: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AiConfig {
    pub api_key: String,
    pub model: String,
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
            },
            identity: IdentityConfig {
                jwt_secret: "dev-secret-change-me".to_string(),
                session_ttl_seconds: 3600,
            },
            ai: AiConfig {
                api_key: String::new(),
                model: "gemini-1.5-flash".to_string(),
                max_retries: 3,
                initial_backoff_ms: 1000,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
            },
        }
    }
}

impl Config {
    /// Load from a TOML or JSON file, then apply environment overrides.
    pub async fn load(path: &str) -> Result<Self, String> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| format!("Failed to read config: {}", e))?;

        let mut config: Config = if path.ends_with(".toml") {
            toml::from_str(&content).map_err(|e| format!("Invalid TOML: {}", e))?
        } else if path.ends_with(".json") {
            serde_json::from_str(&content).map_err(|e| format!("Invalid JSON: {}", e))?
        } else {
            return Err("Unsupported config format".to_string());
        };

        config.apply_env();
        Ok(config)
    }

    /// Environment wins over file values for secrets.
    pub fn apply_env(&mut self) {
        if let Ok(key) = std::env::var("GENERATIVE_API_KEY") {
            self.ai.api_key = key;
        }
        if let Ok(secret) = std::env::var("IDENTITY_JWT_SECRET") {
            self.identity.jwt_secret = secret;
        }
    }

    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.server.port == 0 {
            errors.push("Invalid server port".to_string());
        }
        if self.identity.jwt_secret.is_empty() {
            errors.push("identity.jwt_secret must not be empty".to_string());
        }
        if self.identity.session_ttl_seconds < 60 {
            errors.push("identity.session_ttl_seconds should be at least 60".to_string());
        }
        if self.ai.max_retries > 10 {
            errors.push("ai.max_retries is unreasonably large".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    pub fn export_toml(&self) -> Result<String, String> {
        toml::to_string_pretty(self).map_err(|e| format!("Failed to serialize: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn bad_port_is_rejected() {
        let mut c = Config::default();
        c.server.port = 0;
        let errs = c.validate().unwrap_err();
        assert!(errs.iter().any(|e| e.contains("port")));
    }

    #[test]
    fn toml_round_trip() {
        let c = Config::default();
        let s = c.export_toml().unwrap();
        let back: Config = toml::from_str(&s).unwrap();
        assert_eq!(back.server.port, c.server.port);
    }
}
