//! CareGrid - Multi-tenant hospital management backend
//!
//! Runs the visit lifecycle (check-in, access grants, E-Health passports),
//! the AI symptom checker, and the admin surfaces behind one axum server.

pub mod ai;
pub mod api;
pub mod audit;
pub mod auth;
pub mod config;
pub mod grants;
pub mod models;
pub mod passport;
pub mod retry;
pub mod store;
pub mod visits;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use clap::{Parser, Subcommand};
use serde_json::json;
use tokio::net::TcpListener;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use crate::ai::{DiagnosisService, GenerativeLanguageProvider};
use crate::api::AppServices;
use crate::audit::AuditLogger;
use crate::auth::{IdentityVerifier, SessionManager};
use crate::config::Config;
use crate::models::{Role, User};
use crate::store::{collections, DocumentStore};
use crate::visits::VisitService;

#[derive(Parser)]
#[command(name = "caregrid", about = "Hospital management backend", version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the API server (default)
    Start {
        /// Port to listen on
        #[arg(short, long, default_value = "8080")]
        port: u16,
        /// Path to a TOML or JSON config file
        #[arg(short, long)]
        config: Option<String>,
    },
    /// Write a starter configuration file
    Init {
        /// Output path for the config file
        #[arg(short, long, default_value = "caregrid.toml")]
        output: String,
    },
}

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Some(Commands::Start { port, config }) => {
            let mut cfg = match config {
                Some(path) => Config::load(&path).await?,
                None => Config::default(),
            };
            cfg.server.port = port;
            cfg.apply_env();
            start_server(cfg).await?;
        }
        Some(Commands::Init { output }) => {
            let cfg = Config::default();
            tokio::fs::write(&output, cfg.export_toml()?).await?;
            info!("wrote starter config to {}", output);
        }
        None => {
            let mut cfg = Config::default();
            cfg.apply_env();
            start_server(cfg).await?;
        }
    }
    Ok(())
}

pub async fn start_server(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    if let Err(problems) = config.validate() {
        for p in &problems {
            warn!("config: {}", p);
        }
        return Err("invalid configuration".into());
    }

    let store = Arc::new(DocumentStore::new());
    seed_demo_data(&store).await?;

    let sessions = Arc::new(SessionManager::new(Duration::from_secs(
        config.identity.session_ttl_seconds,
    )));
    let verifier = Arc::new(IdentityVerifier::new(&config.identity.jwt_secret));
    let visits = Arc::new(VisitService::new(store.clone()));
    let audit = Arc::new(AuditLogger::new(store.clone()));

    if config.ai.api_key.is_empty() {
        warn!("GENERATIVE_API_KEY not set; AI diagnosis requests will fail");
    }
    let provider = Arc::new(GenerativeLanguageProvider::new(
        &config.ai.api_key,
        &config.ai.model,
    ));
    let diagnosis = Arc::new(DiagnosisService::new(
        provider,
        store.clone(),
        config.ai.max_retries,
        Duration::from_millis(config.ai.initial_backoff_ms),
    ));

    let app = api::router(AppServices {
        store,
        sessions,
        verifier,
        visits,
        diagnosis,
        audit,
    });

    let addr = format!("{}:{}", config.server.host, config.server.port);
    info!("caregrid listening on {}", addr);
    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

/// Seed a super admin and a demo patient when the store is empty, so a fresh
/// instance is usable without a migration step.
async fn seed_demo_data(store: &DocumentStore) -> Result<(), store::StoreError> {
    if store.count(collections::USERS).await > 0 {
        return Ok(());
    }

    let now = Utc::now();
    let super_admin = User {
        id: "user_super_admin".to_string(),
        email: "admin@caregrid.local".to_string(),
        role: Role::SuperAdmin,
        hospital_id: None,
        first_name: "Platform".to_string(),
        last_name: "Admin".to_string(),
        is_active: true,
        setup_complete: true,
        created_at: now,
    };
    let patient = User {
        id: "user_demo_patient".to_string(),
        email: "patient@caregrid.local".to_string(),
        role: Role::Patient,
        hospital_id: None,
        first_name: "Demo".to_string(),
        last_name: "Patient".to_string(),
        is_active: true,
        setup_complete: true,
        created_at: now,
    };

    store
        .insert(collections::USERS, &super_admin.id, json!(&super_admin))
        .await?;
    store
        .insert(collections::USERS, &patient.id, json!(&patient))
        .await?;
    store
        .insert(
            collections::PATIENTS,
            &patient.id,
            json!({
                "userId": patient.id,
                "fullName": "Demo Patient",
                "dateOfBirth": "1990-01-01",
                "gender": "other",
                "bloodGroup": "O+",
                "phone": "",
                "address": { "city": "", "state": "", "country": "India" },
            }),
        )
        .await?;

    info!("seeded demo users (empty store)");
    Ok(())
}
