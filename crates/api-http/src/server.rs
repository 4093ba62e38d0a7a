//! HTTP Server
//!
//! axum router with permissive CORS (the browser front end posts from
//! another origin) and graceful shutdown driven by the stage shutdown token.

use crate::handler::{chat_completions, formulary, health, recommend_products, AppState};
use axum::routing::{get, post};
use axum::Router;
use smartsearch_core::application::ShutdownToken;
use smartsearch_core::error::{AppError, Result};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

const DEFAULT_HTTP_HOST: &str = "0.0.0.0";
const DEFAULT_HTTP_PORT: u16 = 5000;

/// HTTP Server Configuration
#[derive(Debug, Clone)]
pub struct HttpServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for HttpServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HTTP_HOST.to_string(),
            port: DEFAULT_HTTP_PORT,
        }
    }
}

pub struct HttpServer {
    config: HttpServerConfig,
    state: Arc<AppState>,
}

impl HttpServer {
    pub fn new(config: HttpServerConfig, state: AppState) -> Self {
        Self {
            config,
            state: Arc::new(state),
        }
    }

    pub fn router(&self) -> Router {
        router(Arc::clone(&self.state))
    }

    /// Bind the configured address and serve until shutdown
    pub async fn serve(self, shutdown: ShutdownToken) -> Result<()> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| AppError::Config(format!("Failed to bind HTTP server on {}: {}", addr, e)))?;
        self.serve_on(listener, shutdown).await
    }

    /// Serve on an already bound listener until shutdown
    pub async fn serve_on(self, listener: TcpListener, mut shutdown: ShutdownToken) -> Result<()> {
        let local = listener
            .local_addr()
            .map_err(|e| AppError::Internal(format!("listener address: {}", e)))?;
        info!(addr = %local, "HTTP front door listening");

        axum::serve(listener, self.router())
            .with_graceful_shutdown(async move { shutdown.wait().await })
            .await
            .map_err(|e| AppError::Internal(format!("HTTP server failed: {}", e)))?;

        info!("HTTP front door stopped");
        Ok(())
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/recomendar-productos", post(recommend_products))
        .route("/formulary/:user_id", get(formulary))
        .route("/api/v1/chat/completions", post(chat_completions))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use smartsearch_core::application::{shutdown_channel, ConnectPolicy, StageProducer};
    use smartsearch_core::domain::{PipelineTopology, INTAKE_QUEUE};
    use smartsearch_core::port::broker::mocks::InMemoryBroker;
    use smartsearch_core::port::profile_repository::mocks::InMemoryProfileRepository;
    use std::time::Duration;

    #[tokio::test]
    async fn test_routes_over_http() {
        let broker = InMemoryBroker::new();
        let repo = InMemoryProfileRepository::new();
        let state = AppState::new(
            StageProducer::new(Arc::new(broker.clone()), ConnectPolicy::default()),
            PipelineTopology::standard().intake,
            Arc::new(repo),
        );
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let (tx, token) = shutdown_channel();
        let server = tokio::spawn(HttpServer::new(HttpServerConfig::default(), state).serve_on(listener, token));

        let client = reqwest::Client::new();
        let health = client.get(format!("{}/health", base)).send().await.unwrap();
        assert_eq!(health.status().as_u16(), 200);

        let accepted = client
            .post(format!("{}/recomendar-productos", base))
            .body(r#"{"nombreUsuario":"Ana","edad":29}"#)
            .send()
            .await
            .unwrap();
        assert_eq!(accepted.status().as_u16(), 202);
        let body: serde_json::Value = accepted.json().await.unwrap();
        assert_eq!(body["status"], "accepted");
        assert_eq!(body["queue"], INTAKE_QUEUE);

        let missing = client.get(format!("{}/formulary/42", base)).send().await.unwrap();
        assert_eq!(missing.status().as_u16(), 404);

        let no_provider = client
            .post(format!("{}/api/v1/chat/completions", base))
            .body(r#"{"model":"m","messages":[{"role":"user","content":"x"}]}"#)
            .send()
            .await
            .unwrap();
        assert_eq!(no_provider.status().as_u16(), 500);

        tx.shutdown();
        tokio::time::timeout(Duration::from_secs(5), server)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(broker.messages(INTAKE_QUEUE).len(), 1);
    }
}
