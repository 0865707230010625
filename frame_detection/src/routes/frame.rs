use crate::{
    decode::decode_frame,
    detection::DetectionResponse,
    error::ApiError,
    model_service::ModelService,
    server::SharedState,
};
use axum::{
    body::Bytes,
    extract::{Multipart, State},
    Json,
};
use std::time::Instant;
use tracing::instrument;

pub const FRAME_ROUTE: &str = "/api/frame";
const FILE_FIELD: &str = "file";

async fn read_file_field(multipart: &mut Multipart) -> Result<Bytes, ApiError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() == Some(FILE_FIELD) {
            return Ok(field.bytes().await?);
        }
    }
    Err(ApiError::MissingFile)
}

#[instrument(skip(state, multipart))]
pub async fn receive_frame<M: ModelService>(
    State(state): State<SharedState<M>>,
    mut multipart: Multipart,
) -> Result<Json<DetectionResponse>, ApiError> {
    state.metrics.record_request(FRAME_ROUTE);

    let contents = read_file_field(&mut multipart).await?;
    let Some(frame) = decode_frame(&contents) else {
        tracing::warn!("Rejecting {} byte upload that is not a frame", contents.len());
        return Err(ApiError::InvalidFrame);
    };
    drop(contents);

    let (width, height) = frame.dimensions();
    let start = Instant::now();
    let output = state.model_service.predict(frame).await?;
    state
        .metrics
        .record_inference_duration(start.elapsed().as_millis() as u64, FRAME_ROUTE);

    let response = DetectionResponse::from_model_output(output);
    state
        .metrics
        .record_detections(response.detections.len() as u64, FRAME_ROUTE);

    tracing::debug!(
        "Returning {} detections for {}x{} frame",
        response.detections.len(),
        width,
        height
    );
    for (i, detection) in response.detections.iter().enumerate() {
        tracing::debug!(
            "Detection {}: class={}, confidence={:.3}, bbox=({:.1}, {:.1}, {:.1}, {:.1})",
            i,
            detection.class_name,
            detection.confidence,
            detection.bbox[0],
            detection.bbox[1],
            detection.bbox[2],
            detection.bbox[3]
        );
    }

    Ok(Json(response))
}
