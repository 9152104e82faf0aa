use std::fmt;

use serde::{Deserialize, Serialize};

/// Box around a detected object, normalized to 0..1 of the frame.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

/// One prediction returned by the backend for a frame.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Prediction {
    pub probability: f64,
    pub bounding_box: BoundingBox,
    pub tag_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag_id: Option<String>,
}

/// An accepted prediction bound to the frame it was found in.
///
/// Records are written to the detection log as soon as they are created and
/// are never modified afterwards.
#[derive(Clone, Debug, PartialEq)]
pub struct DetectionRecord {
    pub frame_index: u64,
    pub probability: f64,
    pub bounding_box: BoundingBox,
    pub tag_name: String,
}

impl DetectionRecord {
    pub fn new(frame_index: u64, prediction: Prediction) -> Self {
        Self {
            frame_index,
            probability: prediction.probability,
            bounding_box: prediction.bounding_box,
            tag_name: prediction.tag_name,
        }
    }
}

impl fmt::Display for DetectionRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Frame #{} - prediction with probability {} located at -> left: {}, top: {}, width: {}, height: {}. TAG: {}",
            self.frame_index,
            self.probability,
            self.bounding_box.left,
            self.bounding_box.top,
            self.bounding_box.width,
            self.bounding_box.height,
            self.tag_name
        )
    }
}
