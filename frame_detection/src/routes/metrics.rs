use crate::{error::ApiError, model_service::ModelService, server::SharedState};
use axum::extract::State;

pub async fn metrics_handler<M: ModelService>(
    State(state): State<SharedState<M>>,
) -> Result<String, ApiError> {
    state.metrics.render().map_err(ApiError::Metrics)
}
