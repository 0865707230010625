use axum::Json;
use serde::Serialize;

const AVAILABLE: &str = "Available";

#[derive(Serialize)]
pub struct Status {
    status: &'static str,
}

pub async fn healthcheck() -> Json<Status> {
    Json(Status { status: AVAILABLE })
}
