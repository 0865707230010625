mod frame;
mod health;
mod metrics;

use crate::{model_service::ModelService, server::SharedState};
use axum::{
    routing::{get, post},
    Router,
};

pub use frame::FRAME_ROUTE;

pub fn api_routes<M: ModelService>() -> Router<SharedState<M>> {
    Router::new()
        .route(FRAME_ROUTE, post(frame::receive_frame::<M>))
        .route("/health_check", get(health::healthcheck))
        .route("/metrics", get(metrics::metrics_handler::<M>))
}
