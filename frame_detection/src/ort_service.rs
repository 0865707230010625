use crate::{
    config::{LabelsConfig, ModelConfig, Validatable},
    labels::{load_labels, parse_names_metadata, ClassNames},
    model_service::{InferenceError, ModelOutput, ModelService, PixelGrid, RawDetection},
};
use async_trait::async_trait;
use image::imageops::{self, FilterType};
use ndarray::{s, Array, ArrayD, ArrayViewD, Axis, Ix4};
use ort::{
    execution_providers::TensorRTExecutionProvider,
    session::{builder::GraphOptimizationLevel, Session},
    value::TensorRef,
};
use parking_lot::Mutex;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};
use thiserror::Error;

const OUTPUT_NAME: &str = "output0";
const NAMES_METADATA_KEY: &str = "names";

#[derive(Error, Debug)]
pub enum ModelLoadError {
    #[error("ONNX Runtime error: {0}")]
    Ort(#[from] ort::Error),
    #[error("Failed to load labels: {0}")]
    Labels(#[from] std::io::Error),
    #[error("Model has no `names` metadata and no labels file is configured")]
    MissingClassNames,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectionParams {
    pub input_size: u32,
    pub min_probability: f32,
    pub iou_threshold: f32,
    pub max_detections: usize,
}

impl From<&ModelConfig> for DetectionParams {
    fn from(config: &ModelConfig) -> Self {
        Self {
            input_size: config.input_size,
            min_probability: config.min_probability,
            iou_threshold: config.iou_threshold,
            max_detections: config.max_detections,
        }
    }
}

fn area(b: &RawDetection) -> f32 {
    (b.xyxy[2] - b.xyxy[0]).max(0.) * (b.xyxy[3] - b.xyxy[1]).max(0.)
}

fn intersection(box1: &RawDetection, box2: &RawDetection) -> f32 {
    let w = box1.xyxy[2].min(box2.xyxy[2]) - box1.xyxy[0].max(box2.xyxy[0]);
    let h = box1.xyxy[3].min(box2.xyxy[3]) - box1.xyxy[1].max(box2.xyxy[1]);
    w.max(0.) * h.max(0.)
}

fn union(box1: &RawDetection, box2: &RawDetection) -> f32 {
    area(box1) + area(box2) - intersection(box1, box2)
}

fn iou(box1: &RawDetection, box2: &RawDetection) -> f32 {
    let union = union(box1, box2);
    if union <= 0. {
        return 0.;
    }
    intersection(box1, box2) / union
}

const PAD_VALUE: f32 = 114. / 255.;

/// Where the frame sits inside the square model input: scaled by one factor
/// on both axes and centred between grey borders.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Letterbox {
    scale: f32,
    resized_width: u32,
    resized_height: u32,
    pad_x: u32,
    pad_y: u32,
    frame_width: u32,
    frame_height: u32,
}

impl Letterbox {
    fn new(frame_width: u32, frame_height: u32, input_size: u32) -> Self {
        let scale = (input_size as f32 / frame_width as f32)
            .min(input_size as f32 / frame_height as f32);
        let resized_width = ((frame_width as f32 * scale).round() as u32).clamp(1, input_size);
        let resized_height = ((frame_height as f32 * scale).round() as u32).clamp(1, input_size);

        Self {
            scale,
            resized_width,
            resized_height,
            pad_x: (input_size - resized_width) / 2,
            pad_y: (input_size - resized_height) / 2,
            frame_width,
            frame_height,
        }
    }

    /// Maps a model-space `(cx, cy, w, h)` box back onto the frame, clipped.
    fn frame_box(&self, cx: f32, cy: f32, w: f32, h: f32) -> [f32; 4] {
        let max_x = self.frame_width as f32;
        let max_y = self.frame_height as f32;
        let unpad_x = |x: f32| ((x - self.pad_x as f32) / self.scale).clamp(0., max_x);
        let unpad_y = |y: f32| ((y - self.pad_y as f32) / self.scale).clamp(0., max_y);

        [
            unpad_x(cx - w / 2.),
            unpad_y(cy - h / 2.),
            unpad_x(cx + w / 2.),
            unpad_y(cy + h / 2.),
        ]
    }
}

/// Letterboxes the frame into a 1x3xHxW tensor scaled to [0, 1].
fn transform_frame(frame: &PixelGrid, input_size: u32) -> (Array<f32, Ix4>, Letterbox) {
    let (width, height) = frame.dimensions();
    let letterbox = Letterbox::new(width, height, input_size);
    let img = imageops::resize(
        frame,
        letterbox.resized_width,
        letterbox.resized_height,
        FilterType::CatmullRom,
    );
    let size = input_size as usize;

    let mut input = Array::from_elem((1, 3, size, size), PAD_VALUE);
    for (x, y, pixel) in img.enumerate_pixels() {
        let x = (x + letterbox.pad_x) as usize;
        let y = (y + letterbox.pad_y) as usize;
        let [r, g, b] = pixel.0;
        input[[0, 0, y, x]] = (r as f32) / 255.;
        input[[0, 1, y, x]] = (g as f32) / 255.;
        input[[0, 2, y, x]] = (b as f32) / 255.;
    }

    (input, letterbox)
}

/// Greedy suppression over boxes sorted by descending confidence. Boxes of
/// different classes never suppress each other.
fn non_max_suppression(
    mut boxes: Vec<RawDetection>,
    iou_threshold: f32,
    max_detections: usize,
) -> Vec<RawDetection> {
    let mut result = Vec::new();

    while !boxes.is_empty() && result.len() < max_detections {
        let best = boxes[0];
        result.push(best);
        boxes = boxes[1..]
            .iter()
            .filter(|other| {
                other.class_index != best.class_index || iou(&best, other) < iou_threshold
            })
            .copied()
            .collect();
    }

    result
}

/// Decodes a YOLO `[1, 4 + classes, candidates]` output into boxes in the
/// original frame's pixel space, sorted by confidence and suppressed.
fn extract_detections(
    output: ArrayViewD<'_, f32>,
    letterbox: &Letterbox,
    params: &DetectionParams,
) -> Result<Vec<RawDetection>, InferenceError> {
    let shape = output.shape();
    if shape.len() != 3 || shape[0] == 0 || shape[1] <= 4 {
        return Err(InferenceError::InvalidOutput(format!(
            "expected [1, 4 + classes, candidates], got {:?}",
            shape
        )));
    }

    let view = output.index_axis(Axis(0), 0);

    let mut boxes = Vec::new();
    for candidate in view.axis_iter(Axis(1)) {
        let best = candidate
            .slice(s![4..])
            .iter()
            .copied()
            .enumerate()
            .fold(None, |accum: Option<(usize, f32)>, (index, value)| match accum {
                Some((_, best)) if best >= value => accum,
                _ => Some((index, value)),
            });

        let Some((class_index, prob)) = best else {
            continue;
        };
        if prob.is_nan() || prob < params.min_probability {
            continue;
        }
        if !candidate.slice(s![..4]).iter().all(|v| v.is_finite()) {
            continue;
        }

        boxes.push(RawDetection {
            xyxy: letterbox.frame_box(candidate[0], candidate[1], candidate[2], candidate[3]),
            confidence: prob.clamp(0., 1.),
            class_index,
        });
    }

    boxes.sort_by(|box1, box2| box2.confidence.total_cmp(&box1.confidence));

    Ok(non_max_suppression(boxes, params.iou_threshold, params.max_detections))
}

#[derive(Clone)]
pub struct OrtModelService {
    sessions: Arc<Vec<Mutex<Session>>>,
    counter: Arc<AtomicUsize>,
    names: Arc<ClassNames>,
    params: DetectionParams,
}

impl OrtModelService {
    pub fn new(
        model_config: &ModelConfig,
        labels_config: Option<&LabelsConfig>,
    ) -> Result<Self, ModelLoadError> {
        let sessions = (0..model_config.num_instances.max(1))
            .map(|_| Self::build_session(model_config).map(Mutex::new))
            .collect::<Result<Vec<_>, ort::Error>>()?;

        tracing::info!(
            "Created {} ONNX sessions from {:?}",
            sessions.len(),
            model_config.get_path()
        );

        let names = match labels_config {
            Some(labels) => load_labels(&labels.get_path())?,
            None => Self::names_from_metadata(&sessions[0].lock())?,
        };
        tracing::info!("Loaded {} class names", names.len());

        Ok(Self {
            sessions: Arc::new(sessions),
            counter: Arc::new(AtomicUsize::new(0)),
            names: Arc::new(names),
            params: DetectionParams::from(model_config),
        })
    }

    fn build_session(model_config: &ModelConfig) -> Result<Session, ort::Error> {
        let mut builder =
            Session::builder()?.with_optimization_level(GraphOptimizationLevel::Level3)?;

        if model_config.use_tensorrt {
            builder = builder.with_execution_providers([TensorRTExecutionProvider::default()
                .with_engine_cache(true)
                .build()])?;
        }

        builder.commit_from_file(model_config.get_path())
    }

    fn names_from_metadata(session: &Session) -> Result<ClassNames, ModelLoadError> {
        let raw = session.metadata()?.custom(NAMES_METADATA_KEY)?;
        raw.as_deref()
            .and_then(parse_names_metadata)
            .ok_or(ModelLoadError::MissingClassNames)
    }

    pub fn run_inference(&self, input: &Array<f32, Ix4>) -> Result<ArrayD<f32>, InferenceError> {
        let index = self.counter.fetch_add(1, Ordering::SeqCst) % self.sessions.len();
        let mut session = self.sessions[index].lock();

        tracing::debug!("Handling request with session {}", index);
        let tensor_ref = TensorRef::from_array_view(input.view())
            .map_err(|e| InferenceError::Session(format!("failed to build tensor: {}", e)))?;

        let outputs = session
            .run(ort::inputs![tensor_ref])
            .map_err(|e| InferenceError::Session(format!("inference failed: {}", e)))?;

        if outputs.len() == 0 {
            return Err(InferenceError::InvalidOutput("model produced no outputs".into()));
        }
        let output = if outputs.contains_key(OUTPUT_NAME) {
            &outputs[OUTPUT_NAME]
        } else {
            &outputs[0]
        };

        let (shape, data) = output
            .try_extract_tensor::<f32>()
            .map_err(|e| {
                InferenceError::InvalidOutput(format!("failed to extract tensor: {}", e))
            })?;

        ArrayD::from_shape_vec(shape.to_ixdyn(), data.to_vec())
            .map_err(|e| InferenceError::InvalidOutput(format!("invalid tensor shape: {}", e)))
    }

    fn detect(&self, frame: &PixelGrid) -> Result<ModelOutput, InferenceError> {
        let (input, letterbox) = transform_frame(frame, self.params.input_size);
        let outputs = self.run_inference(&input)?;
        let boxes = extract_detections(outputs.view(), &letterbox, &self.params)?;

        Ok(ModelOutput {
            boxes,
            names: self.names.clone(),
        })
    }
}

#[async_trait]
impl ModelService for OrtModelService {
    async fn predict(&self, frame: PixelGrid) -> Result<ModelOutput, InferenceError> {
        let service = self.clone();
        tokio::task::spawn_blocking(move || service.detect(&frame)).await?
    }
}
