mod decode;
mod error;
mod ort_service;
mod routes;
mod server;
mod telemetry;

pub mod app;
pub mod config;
pub mod detection;
pub mod labels;
pub mod model_service;

pub use app::start_app;
pub use decode::decode_frame;
pub use error::ApiError;
pub use ort_service::{ModelLoadError, OrtModelService};
pub use routes::FRAME_ROUTE;
pub use server::{build_router, HttpServer, SharedState};
pub use telemetry::Metrics;
