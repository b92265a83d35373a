mod config;

use std::sync::Arc;

use tracing::{error, info};

use bardly_api::quota::QuotaPolicy;
use bardly_api::relay::RelaySettings;
use bardly_api::{AppState, AppStateInner};
use bardly_db::Database;
use bardly_llm::OpenAiClient;

use crate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "bardly_server=debug,bardly_api=debug,tower_http=debug".into()),
        )
        .init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("FATAL: {:#}", e);
            error!("Set it in your .env file and restart.");
            std::process::exit(1);
        }
    };

    let db = Database::open(&config.db_path)?;
    let llm = OpenAiClient::with_base_url(&config.openai_api_key, &config.llm_base_url)?;

    let state: AppState = Arc::new(AppStateInner {
        db,
        jwt_secret: config.jwt_secret.clone(),
        llm: Arc::new(llm),
        relay: RelaySettings {
            model: config.llm_model.clone(),
            ..RelaySettings::default()
        },
        quota: QuotaPolicy::new(config.free_token_limit),
        billing_secret: config.billing_secret.clone(),
    });

    let app = bardly_api::router(state);

    let addr = config.addr()?;
    info!("Bardly server listening on {}", addr);
    info!("Narrating with {} via {}", config.llm_model, config.llm_base_url);
    info!("Free tier limit: {} tokens", config.free_token_limit);
    if config.billing_secret.is_none() {
        info!("Billing hook disabled (BARDLY_BILLING_SECRET unset)");
    }

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm =
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(sigterm) => sigterm,
                Err(e) => {
                    error!("Failed to install SIGTERM handler: {}", e);
                    ctrl_c.await.ok();
                    return;
                }
            };
        tokio::select! {
            _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
            _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}
