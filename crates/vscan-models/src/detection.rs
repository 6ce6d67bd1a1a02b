//! Detection results produced for sampled frames.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A normalized rectangle (0.0 to 1.0) localizing violent content in a frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct BoundingBox {
    /// X coordinate of the top-left corner (0.0 = left, 1.0 = right)
    pub x: f64,
    /// Y coordinate of the top-left corner (0.0 = top, 1.0 = bottom)
    pub y: f64,
    /// Width of the rectangle (0.0 to 1.0)
    pub width: f64,
    /// Height of the rectangle (0.0 to 1.0)
    pub height: f64,
}

impl BoundingBox {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }

    /// Check if the box lies within the frame.
    pub fn is_valid(&self) -> bool {
        self.x >= 0.0
            && self.y >= 0.0
            && self.width > 0.0
            && self.height > 0.0
            && self.x + self.width <= 1.001 // float slack
            && self.y + self.height <= 1.001
    }
}

/// A sampled frame whose score met the job's confidence threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Detection {
    /// Position of the frame in the source, in seconds
    pub timestamp_seconds: f64,
    /// Violence probability in [0, 1]
    pub confidence_score: f64,
    /// Index of the frame in the source (not the sampled index)
    pub frame_number: u64,
    /// Regions flagged by the backend, only when it supplies localization
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bounding_boxes: Option<Vec<BoundingBox>>,
}

impl Detection {
    pub fn new(frame_number: u64, timestamp_seconds: f64, confidence_score: f64) -> Self {
        Self {
            timestamp_seconds,
            confidence_score,
            frame_number,
            bounding_boxes: None,
        }
    }

    /// Attach backend-provided localization.
    pub fn with_bounding_boxes(mut self, boxes: Vec<BoundingBox>) -> Self {
        self.bounding_boxes = Some(boxes);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounding_box_validity() {
        assert!(BoundingBox::new(0.1, 0.1, 0.5, 0.5).is_valid());
        assert!(!BoundingBox::new(0.8, 0.0, 0.5, 0.5).is_valid());
        assert!(!BoundingBox::new(0.0, 0.0, 0.0, 0.5).is_valid());
    }

    #[test]
    fn test_detection_without_boxes_omits_field() {
        let detection = Detection::new(30, 1.0, 0.91);
        let json = serde_json::to_value(&detection).unwrap();

        assert_eq!(json["frame_number"], 30);
        assert!(json.get("bounding_boxes").is_none());
    }
}
