use crate::{
    config::Config,
    ort_service::OrtModelService,
    server::{build_router, HttpServer, SharedState},
    telemetry::Metrics,
};
use std::sync::Arc;

pub async fn start_app(config: Config) -> anyhow::Result<()> {
    let model_config = config.model.clone();
    let labels_config = config.labels.clone();
    let ort_model_service = tokio::task::spawn_blocking(move || {
        OrtModelService::new(&model_config, labels_config.as_ref())
    })
    .await?
    .inspect_err(|e| tracing::error!("Failed to instantiate ort model service: {}", e))?;

    let metrics = Arc::new(Metrics::new()?);
    let state = SharedState::new(ort_model_service, metrics);
    let router = build_router(state, config.server.max_upload_bytes);

    let server = HttpServer::new(router, &config.server).await?;
    tracing::info!("Listening on {}", config.server.get_address());

    server.run().await
}
