use std::future::Future;
use std::sync::Arc;

use axum::extract::FromRef;
use axum::routing::{get, post};
use axum::Router;
use storefront_agent::ConversationOrchestrator;
use storefront_db::DbPool;
use tokio::net::TcpListener;
use tracing::info;

use crate::{health, messages};

#[derive(Clone)]
pub struct AppState {
    pub db_pool: DbPool,
    pub orchestrator: Arc<ConversationOrchestrator>,
}

impl FromRef<AppState> for DbPool {
    fn from_ref(state: &AppState) -> Self {
        state.db_pool.clone()
    }
}

impl FromRef<AppState> for Arc<ConversationOrchestrator> {
    fn from_ref(state: &AppState) -> Self {
        Arc::clone(&state.orchestrator)
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route("/v1/messages", post(messages::post_message))
        .with_state(state)
}

/// Serves until `shutdown` resolves, then lets in-flight turns finish.
pub async fn serve(
    bind_address: &str,
    port: u16,
    state: AppState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    let address = format!("{bind_address}:{port}");
    let listener = TcpListener::bind(&address).await?;
    info!(
        event_name = "system.http.start",
        correlation_id = "bootstrap",
        bind_address = %address,
        "http endpoint started"
    );

    axum::serve(listener, router(state)).with_graceful_shutdown(shutdown).await
}
