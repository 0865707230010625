use crate::model_service::ModelOutput;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub class_name: String,
    #[serde(rename = "conf")]
    pub confidence: f32,
    #[serde(rename = "box")]
    pub bbox: [f32; 4],
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectionResponse {
    pub detections: Vec<Detection>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

impl DetectionResponse {
    /// Maps raw model boxes to wire detections, keeping the model's order.
    pub fn from_model_output(output: ModelOutput) -> Self {
        let detections = output
            .boxes
            .iter()
            .map(|raw| Detection {
                class_name: output.names.resolve(raw.class_index),
                confidence: raw.confidence,
                bbox: raw.xyxy,
            })
            .collect();

        Self { detections }
    }
}
