//! Conduit Auth - signup, login and revocable sessions for the Conduit API

use anyhow::{Context, Result};
use clap::Parser;
use conduit_auth::{
    auth::{api, AuthService, PasswordCredentialStore, RevocationTracker, TokenIssuer, UserStore},
    Config, Database,
};
use dotenv::dotenv;
use std::path::Path;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    load_env();
    init_tracing();

    let config = Config::parse();
    config.validate().context("Invalid configuration")?;

    info!("🚀 Conduit auth service starting");

    if config.uses_dev_secret() {
        warn!("⚠️  JWT_SECRET not set, using the development secret. CHANGE IN PRODUCTION!");
    }

    let db = Database::open(&config.db_path)?;
    let tracker = Arc::new(RevocationTracker::sqlite(db.clone()));
    let tokens = Arc::new(TokenIssuer::new(
        &config.jwt_secret,
        config.token_ttl(),
        tracker.clone(),
    ));
    let passwords = PasswordCredentialStore::new(config.kdf_params())?;
    let service = AuthService::new(UserStore::new(db), passwords, tokens);

    info!(
        algorithm = %config.hash_algorithm,
        iterations = config.hash_iterations,
        ttl_hours = config.token_ttl_hours,
        "🔐 Authentication initialized at: {}",
        config.db_path
    );

    if let Some(every) = config.sweep_interval() {
        tokio::spawn(revocation_sweep(tracker, every));
    }

    let app = api::router(service);

    let listener = TcpListener::bind(&config.bind)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind))?;
    info!("🎯 API server listening on {}", config.bind);

    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}

/// Periodically drop sign ids whose tokens have expired.
async fn revocation_sweep(tracker: Arc<RevocationTracker>, every: std::time::Duration) {
    let mut ticker = tokio::time::interval(every);
    loop {
        ticker.tick().await;
        if let Err(e) = tracker.sweep_expired().await {
            error!("Revocation sweep failed: {}", e);
        }
    }
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "conduit_auth=debug,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn load_env() {
    // Standard dotenv search (cwd + parents), then the crate root.
    let _ = dotenv();

    let crate_env = Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
    if crate_env.exists() {
        let _ = dotenv::from_path(&crate_env);
    }
}
