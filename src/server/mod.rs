//! HTTP/SSE server for the form synchronization service.
//!
//! The server fronts three surfaces:
//!
//! ```text
//! +---------------------------------------------------------------+
//! |  Axum HTTP Server                                             |
//! |  /health (GET)                         -> health check        |
//! |  /api/sessions/webhook (POST)          -> agent updates       |
//! |  /api/sessions (GET)                   -> list live sessions  |
//! |  /api/sessions/{key} (GET/PUT)         -> snapshot / sync     |
//! |  /api/sessions/{key}/stream (GET)      -> SSE updates         |
//! |  /api/sessions/{key}/analyse (POST)    -> AI notes            |
//! |  /api/applications[...]                -> CRUD + attachments  |
//! |  /api/documents/analyse (POST)         -> stateless grading   |
//! +---------------------------------------------------------------+
//!          |
//!          v
//! +---------------------------------------------------------------+
//! |  SessionService (DashMap)   ApplicationStore (Mutex)          |
//! |    +-- per-key record + broadcast hub fan-out                 |
//! +---------------------------------------------------------------+
//! ```

pub mod handlers;
pub mod types;

pub use handlers::AppState;
pub use types::{HealthResponse, ListSessionsResponse, WebhookPayload, WebhookResponse};

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    routing::{delete, get, post, put},
    Router,
};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::analysis::{DocumentAnalyzer, FormAnalyzer, GeminiAnalyzer, NoopAnalyzer};
use crate::config::{get_with_env_fallback, FormsyncSettings};
use crate::session::BroadcastHub;

/// Start the HTTP server.
///
/// Binds to the configured host/port (port 0 picks a random free port)
/// and serves until the returned cancellation token fires.
///
/// # Returns
///
/// The actual bound address and a token that triggers graceful shutdown.
pub async fn start_server(
    settings: &FormsyncSettings,
) -> anyhow::Result<(SocketAddr, CancellationToken)> {
    let hub = Arc::new(BroadcastHub::new(settings.hub.subscriber_capacity));

    let api_key = get_with_env_fallback(
        &settings.analysis.gemini_api_key,
        &["GEMINI_API_KEY", "GOOGLE_API_KEY"],
        None,
    );
    let (analyzer, documents): (Arc<dyn FormAnalyzer>, Arc<dyn DocumentAnalyzer>) = match api_key {
        Some(key) => {
            let gemini = Arc::new(GeminiAnalyzer::new(key, settings.analysis.model.clone()));
            (gemini.clone(), gemini)
        }
        None => {
            tracing::warn!("no Gemini API key configured, analysis endpoints degrade");
            (Arc::new(NoopAnalyzer), Arc::new(NoopAnalyzer))
        }
    };

    let (state, shutdown_token) = AppState::new(
        hub,
        analyzer,
        documents,
        settings.hub.heartbeat_secs,
    );

    let app = create_router(state);

    let addr: SocketAddr = format!("{}:{}", settings.server.host, settings.server.port)
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid bind address: {e}"))?;
    let listener = TcpListener::bind(addr).await?;
    let actual_addr = listener.local_addr()?;

    tracing::info!("HTTP server listening on {}", actual_addr);

    let server_shutdown = shutdown_token.clone();
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(server_shutdown.cancelled_owned())
            .await
        {
            tracing::error!("Server error: {}", e);
        }
    });

    Ok((actual_addr, shutdown_token))
}

/// Create the router with all routes configured.
///
/// This is separated from `start_server` to enable easier testing.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/api/sessions/webhook", post(handlers::webhook))
        .route("/api/sessions", get(handlers::list_sessions))
        .route("/api/sessions/{key}", get(handlers::get_session))
        .route("/api/sessions/{key}", put(handlers::sync_session))
        .route("/api/sessions/{key}/stream", get(handlers::stream_session))
        .route("/api/sessions/{key}/analyse", post(handlers::analyse_session))
        .route("/api/applications", post(handlers::create_application))
        .route("/api/applications", get(handlers::list_applications))
        .route("/api/applications/{app_id}", get(handlers::get_application))
        .route(
            "/api/applications/{app_id}",
            axum::routing::patch(handlers::update_application),
        )
        .route(
            "/api/applications/{app_id}",
            delete(handlers::delete_application),
        )
        .route(
            "/api/applications/{app_id}/attachments",
            post(handlers::create_attachment),
        )
        .route(
            "/api/applications/{app_id}/attachments",
            get(handlers::list_attachments),
        )
        .route(
            "/api/applications/{app_id}/attachments/{attachment_id}",
            get(handlers::get_attachment),
        )
        .route(
            "/api/applications/{app_id}/attachments/{attachment_id}",
            delete(handlers::delete_attachment),
        )
        .route("/api/documents/analyse", post(handlers::analyse_documents))
        .with_state(state)
}
