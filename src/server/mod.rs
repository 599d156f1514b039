//! HTTP server for the chat API.
//!
//! Provides:
//! - `POST /api/v1/chat/` streaming a reply as server-sent events
//! - `DELETE /api/v1/chat/{session_id}` (accepted, no-op)
//! - `GET /health`

pub mod error;
pub mod routes;
pub mod state;

pub use error::AppError;
pub use routes::create_router;
pub use state::AppState;

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::HeaderValue;
use axum::Router;
use tower::ServiceBuilder;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{AllowHeaders, AllowMethods, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::core::config::ServerConfig;

/// CORS policy for the configured origins.
///
/// `*` allows any origin without credentials; an explicit list allows those
/// origins with credentials.
#[must_use]
pub fn cors_layer(config: &ServerConfig) -> CorsLayer {
    if config.allows_any_origin() {
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
    }

    let origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(err) => {
                tracing::warn!(%origin, error = %err, "Skipping invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true)
}

/// Router with tracing, panic recovery and CORS applied.
pub fn build_app(state: Arc<AppState>) -> Router {
    let middleware = ServiceBuilder::new()
        .layer(TraceLayer::new_for_http())
        .layer(CatchPanicLayer::custom(error::panic_response))
        .layer(cors_layer(&state.server));

    create_router(state).layer(middleware)
}

/// Start the HTTP server with graceful shutdown support.
///
/// The server will stop accepting new connections when `shutdown_signal` completes.
///
/// # Errors
/// Returns an error if the server fails to start.
pub async fn run_server_with_shutdown<F>(
    state: Arc<AppState>,
    shutdown_signal: F,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = SocketAddr::from(([0, 0, 0, 0], state.server.port));
    let app = build_app(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Parley server listening on http://{}", addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use tower::ServiceExt;

    use super::*;
    use crate::chat::ChatController;
    use crate::llm::generator::scripted::ScriptedGenerator;
    use crate::store::test_support::temp_store;

    async fn app(server: ServerConfig) -> (tempfile::TempDir, Router) {
        let (dir, store) = temp_store().await;
        let state = AppState::new(
            ChatController::new(Arc::new(ScriptedGenerator::new(&[]))),
            store,
            server,
        );
        (dir, build_app(state))
    }

    fn health_from(origin: &str) -> Request<Body> {
        Request::get("/health")
            .header(header::ORIGIN, origin)
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn test_wildcard_origin_without_credentials() {
        let (_dir, app) = app(ServerConfig::default()).await;
        let response = app.oneshot(health_from("https://any.example")).await.unwrap();

        let headers = response.headers();
        assert_eq!(headers.get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(), "*");
        assert!(headers.get(header::ACCESS_CONTROL_ALLOW_CREDENTIALS).is_none());
    }

    #[tokio::test]
    async fn test_listed_origin_with_credentials() {
        let server = ServerConfig {
            allowed_origins: vec!["https://app.example".to_string()],
            ..ServerConfig::default()
        };
        let (_dir, app) = app(server).await;

        let response = app
            .clone()
            .oneshot(health_from("https://app.example"))
            .await
            .unwrap();
        let headers = response.headers();
        assert_eq!(
            headers.get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
            "https://app.example"
        );
        assert_eq!(
            headers.get(header::ACCESS_CONTROL_ALLOW_CREDENTIALS).unwrap(),
            "true"
        );

        let response = app.oneshot(health_from("https://evil.example")).await.unwrap();
        assert!(response
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .is_none());
    }

    #[tokio::test]
    async fn test_unknown_route_is_404() {
        let (_dir, app) = app(ServerConfig::default()).await;
        let response = app
            .oneshot(Request::get("/nope").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
