use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use api_rest::{build_router, render::Pages, AppState};
use rh_core::{AppConfig, Redeemer, RegistryClient};
use rh_signing::{ClaimSigner, LaunchTokenEncoder};

/// Main entry point for the respondent home gateway
///
/// Resolves configuration from the environment, loads the launch token keys and serves the
/// access code form until interrupted.
///
/// # Environment Variables
/// - `HOST`, `PORT`: listen address (default: "0.0.0.0:9092")
/// - `EQ_URL`: base URL of the questionnaire runner
/// - `ACCOUNT_SERVICE_URL`: URL respondents return to after the questionnaire
/// - `URL_PATH_PREFIX`: mount point of the access code form (default: "")
/// - `JSON_SECRET_KEYS`: key store holding our private signing key and eQ's public encryption key
/// - `{SERVICE}_URL`, `{SERVICE}_USERNAME`, `{SERVICE}_PASSWORD`: backend registries
/// - `RUST_LOG`: log filter
///
/// # Returns
/// * `Ok(())` - If the server shuts down cleanly
/// * `Err(anyhow::Error)` - If configuration, key loading or the listener fails
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("rh_run=info".parse()?)
                .add_directive("rh_core=info".parse()?)
                .add_directive("api_rest=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cfg = Arc::new(AppConfig::from_lookup(|key| std::env::var(key).ok())?);
    let signer: Arc<dyn ClaimSigner> =
        Arc::new(LaunchTokenEncoder::from_key_store(cfg.json_secret_keys())?);
    let registry = RegistryClient::new(cfg.services().clone(), cfg.http_timeout())?;
    let redeemer = Redeemer::new(cfg.clone(), registry, signer);

    let state = AppState::new(redeemer, Pages::new()?, cfg.url_path_prefix());
    let app = build_router(state, cfg.url_path_prefix());

    let addr = format!("{}:{}", cfg.host(), cfg.port());
    tracing::info!("++ Starting respondent home on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {:?}", e);
        std::future::pending::<()>().await;
    }
}
