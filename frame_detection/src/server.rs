use crate::{
    config::ServerConfig, model_service::ModelService, routes::api_routes, telemetry::Metrics,
};
use axum::{extract::DefaultBodyLimit, Router};
use std::sync::Arc;
use tokio::{net::TcpListener, signal};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

/// Handles shared by every request. The model is loaded once and only ever
/// read afterwards.
#[derive(Clone)]
pub struct SharedState<M: ModelService> {
    pub model_service: Arc<M>,
    pub metrics: Arc<Metrics>,
}

impl<M: ModelService> SharedState<M> {
    pub fn new(model_service: M, metrics: Arc<Metrics>) -> Self {
        Self {
            model_service: Arc::new(model_service),
            metrics,
        }
    }
}

pub fn build_router<M: ModelService>(state: SharedState<M>, max_upload_bytes: usize) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .merge(api_routes())
        .with_state(state)
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

pub struct HttpServer {
    router: Router,
    listener: TcpListener,
}

impl HttpServer {
    pub async fn new(router: Router, config: &ServerConfig) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(config.get_address()).await?;

        Ok(Self { router, listener })
    }

    pub async fn run(self) -> anyhow::Result<()> {
        tracing::info!("Starting app on {}", self.listener.local_addr()?);

        axum::serve(self.listener, self.router)
            .with_graceful_shutdown(async {
                shutdown_signal().await;
                tracing::info!("Shutdown signal received, starting graceful shutdown");
            })
            .await?;

        tracing::info!("Server stopped");
        Ok(())
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
