use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use frame_detection::{
    build_router,
    labels::ClassNames,
    model_service::{InferenceError, ModelOutput, ModelService, PixelGrid, RawDetection},
    Metrics, SharedState, FRAME_ROUTE,
};
use image::{ImageFormat, Rgb, RgbImage};
use serde_json::{json, Value};
use std::{
    io::Cursor,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};
use tower::ServiceExt;

const BOUNDARY: &str = "frame-test-boundary";
const MAX_UPLOAD: usize = 1024 * 1024;

#[derive(Clone)]
struct FakeModel {
    boxes: Vec<RawDetection>,
    fail: bool,
    calls: Arc<AtomicUsize>,
    seen_sizes: Arc<parking_lot::Mutex<Vec<(u32, u32)>>>,
}

impl FakeModel {
    fn returning(boxes: Vec<RawDetection>) -> Self {
        Self {
            boxes,
            fail: false,
            calls: Arc::new(AtomicUsize::new(0)),
            seen_sizes: Arc::new(parking_lot::Mutex::new(Vec::new())),
        }
    }

    fn failing() -> Self {
        Self {
            fail: true,
            ..Self::returning(vec![])
        }
    }
}

#[async_trait]
impl ModelService for FakeModel {
    async fn predict(&self, frame: PixelGrid) -> Result<ModelOutput, InferenceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen_sizes.lock().push(frame.dimensions());
        if self.fail {
            return Err(InferenceError::Session("device lost".to_string()));
        }
        Ok(ModelOutput {
            boxes: self.boxes.clone(),
            names: Arc::new(ClassNames::from_names(["person", "bicycle", "car"])),
        })
    }
}

fn app(model: FakeModel) -> Router {
    let metrics = Arc::new(Metrics::new().unwrap());
    build_router(SharedState::new(model, metrics), MAX_UPLOAD)
}

fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = RgbImage::from_pixel(width, height, Rgb([255, 255, 255]));
    let mut buffer = Cursor::new(Vec::new());
    img.write_to(&mut buffer, ImageFormat::Png).unwrap();
    buffer.into_inner()
}

fn multipart_body(field_name: &str, contents: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
    body.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"{field_name}\"; filename=\"frame.png\"\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
    body.extend_from_slice(contents);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
    body
}

fn upload_request(body: Vec<u8>) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(FRAME_ROUTE)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

fn frame_request(field_name: &str, contents: &[u8]) -> Request<Body> {
    upload_request(multipart_body(field_name, contents))
}

async fn send(router: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn test_garbage_bytes_are_rejected_before_inference() {
    let model = FakeModel::returning(vec![]);
    let calls = model.calls.clone();

    let (status, body) = send(app(model), frame_request("file", b"\x00\x01\x02")).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({ "error": "Invalid frame" }));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_empty_upload_is_invalid_frame() {
    let model = FakeModel::returning(vec![]);
    let calls = model.calls.clone();

    let (status, body) = send(app(model), frame_request("file", b"")).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({ "error": "Invalid frame" }));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_blank_frame_returns_empty_detections() {
    let model = FakeModel::returning(vec![]);
    let seen = model.seen_sizes.clone();

    let (status, body) = send(app(model), frame_request("file", &png_bytes(100, 100))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "detections": [] }));
    assert_eq!(*seen.lock(), vec![(100, 100)]);
}

#[tokio::test]
async fn test_person_detection_wire_format() {
    let model = FakeModel::returning(vec![RawDetection {
        xyxy: [10.0, 20.0, 50.0, 80.0],
        confidence: 0.5,
        class_index: 0,
    }]);

    let (status, body) = send(app(model), frame_request("file", &png_bytes(64, 96))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({
            "detections": [
                { "class_name": "person", "conf": 0.5, "box": [10.0, 20.0, 50.0, 80.0] }
            ]
        })
    );
}

#[tokio::test]
async fn test_detections_keep_model_order() {
    let model = FakeModel::returning(vec![
        RawDetection {
            xyxy: [0.0, 0.0, 4.0, 4.0],
            confidence: 0.25,
            class_index: 2,
        },
        RawDetection {
            xyxy: [1.0, 1.0, 2.0, 2.0],
            confidence: 0.75,
            class_index: 1,
        },
        RawDetection {
            xyxy: [3.0, 3.0, 6.0, 6.0],
            confidence: 0.5,
            class_index: 7,
        },
    ]);

    let (status, body) = send(app(model), frame_request("file", &png_bytes(8, 8))).await;

    assert_eq!(status, StatusCode::OK);
    let names: Vec<&str> = body["detections"]
        .as_array()
        .unwrap()
        .iter()
        .map(|d| d["class_name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["car", "bicycle", "Unknown class 7"]);
    assert_eq!(body["detections"][1]["conf"], json!(0.75));
}

#[tokio::test]
async fn test_same_frame_gives_same_response() {
    let model = FakeModel::returning(vec![RawDetection {
        xyxy: [2.0, 2.0, 30.0, 30.0],
        confidence: 0.5,
        class_index: 1,
    }]);
    let router = app(model.clone());
    let frame = png_bytes(32, 32);

    let (first_status, first) = send(router.clone(), frame_request("file", &frame)).await;
    let (second_status, second) = send(router, frame_request("file", &frame)).await;

    assert_eq!(first_status, StatusCode::OK);
    assert_eq!(second_status, StatusCode::OK);
    assert_eq!(first, second);
    assert_eq!(model.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_inference_failure_is_internal_error() {
    let request = frame_request("file", &png_bytes(10, 10));

    let (status, body) = send(app(FakeModel::failing()), request).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body, json!({ "error": "Inference failed" }));
}

#[tokio::test]
async fn test_oversized_upload_is_rejected() {
    let model = FakeModel::returning(vec![]);
    let calls = model.calls.clone();
    let contents = vec![0u8; MAX_UPLOAD + 10];

    let (status, body) = send(app(model), frame_request("file", &contents)).await;

    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert!(body["error"].is_string());
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_truncated_multipart_stream_is_bad_request() {
    let model = FakeModel::returning(vec![]);
    let calls = model.calls.clone();
    let mut body = multipart_body("file", &png_bytes(10, 10));
    let closing = format!("\r\n--{BOUNDARY}--\r\n");
    body.truncate(body.len() - closing.len());

    let (status, body) = send(app(model), upload_request(body)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());
    assert_ne!(body, json!({ "error": "Invalid frame" }));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_missing_file_field() {
    let model = FakeModel::returning(vec![]);
    let calls = model.calls.clone();

    let (status, body) = send(app(model), frame_request("image", &png_bytes(10, 10))).await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body, json!({ "error": "Missing file field" }));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_cors_preflight_allows_any_origin() {
    let request = Request::builder()
        .method(Method::OPTIONS)
        .uri(FRAME_ROUTE)
        .header(header::ORIGIN, "http://localhost:5173")
        .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
        .header(header::ACCESS_CONTROL_REQUEST_HEADERS, "content-type")
        .body(Body::empty())
        .unwrap();

    let response = app(FakeModel::returning(vec![])).oneshot(request).await.unwrap();

    assert!(response.status().is_success());
    assert_eq!(
        response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
        "*"
    );
}

#[tokio::test]
async fn test_health_check() {
    let request = Request::builder()
        .uri("/health_check")
        .body(Body::empty())
        .unwrap();

    let (status, body) = send(app(FakeModel::returning(vec![])), request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "status": "Available" }));
}

#[tokio::test]
async fn test_metrics_count_frame_requests() {
    let router = app(FakeModel::returning(vec![]));
    let (status, _) = send(router.clone(), frame_request("file", &png_bytes(4, 4))).await;
    assert_eq!(status, StatusCode::OK);

    let request = Request::builder()
        .uri("/metrics")
        .body(Body::empty())
        .unwrap();
    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("requests_total{route=\"/api/frame\"} 1"));
}
