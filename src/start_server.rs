//! Startup helpers for the parley server.

use std::process::ExitCode;
use std::sync::Arc;

use crate::chat::ChatController;
use crate::core::config::AppConfig;
use crate::llm::OllamaGenerator;
use crate::server::{self, AppState};
use crate::store::Store;

/// Run the server until Ctrl-C.
///
/// # Returns
/// `ExitCode::SUCCESS` on graceful shutdown, `1` on failure.
#[must_use]
pub fn run() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    tracing::info!("Starting parley v{}", env!("CARGO_PKG_VERSION"));

    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Invalid configuration: {e}");
            return ExitCode::from(1);
        }
    };

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            tracing::error!("Failed to create runtime: {e}");
            return ExitCode::from(1);
        }
    };

    if let Err(e) = rt.block_on(serve(config)) {
        tracing::error!("Server error: {e}");
        return ExitCode::from(1);
    }

    ExitCode::SUCCESS
}

/// Open the store, build the services and serve until Ctrl-C.
///
/// # Errors
/// Returns an error if the store cannot be opened, the model client cannot
/// be built, or the server fails.
pub async fn serve(config: AppConfig) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let store = Store::open(&config.database, config.pool.clone()).await?;

    let generator = OllamaGenerator::new(&config.llm)?;
    tracing::info!(
        model = generator.model_name(),
        endpoint = config.llm.base_url.as_deref().unwrap_or("default"),
        "Ollama generator ready"
    );

    let state = AppState::new(
        ChatController::new(Arc::new(generator)),
        store.clone(),
        config.server,
    );

    server::run_server_with_shutdown(state, shutdown_signal()).await?;

    store.close().await;
    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
