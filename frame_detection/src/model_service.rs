use crate::labels::ClassNames;
use async_trait::async_trait;
use image::RgbImage;
use std::sync::Arc;
use thiserror::Error;

/// Decoded frame: height x width x 3 `u8` samples.
pub type PixelGrid = RgbImage;

#[derive(Error, Debug)]
pub enum InferenceError {
    #[error("ONNX session error: {0}")]
    Session(String),
    #[error("Invalid model output: {0}")]
    InvalidOutput(String),
    #[error("Inference worker failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
}

/// One object as reported by the model, before name resolution.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawDetection {
    pub xyxy: [f32; 4],
    pub confidence: f32,
    pub class_index: usize,
}

/// Typed result of a single forward pass. `boxes` keeps the model's order.
#[derive(Debug, Clone)]
pub struct ModelOutput {
    pub boxes: Vec<RawDetection>,
    pub names: Arc<ClassNames>,
}

#[async_trait]
pub trait ModelService: Send + Sync + Clone + 'static {
    async fn predict(&self, frame: PixelGrid) -> Result<ModelOutput, InferenceError>;
}
