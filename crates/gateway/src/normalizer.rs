//! Canonical detection records as they go over the wire.

use inference::{ClassNames, ClassTable, RawDetection};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub width: f32,
    pub height: f32,
}

impl BoundingBox {
    /// Corners are reordered if needed so that `x2 >= x1` and `y2 >= y1`.
    pub fn from_corners(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        let (x1, x2) = (x1.min(x2), x1.max(x2));
        let (y1, y2) = (y1.min(y2), y1.max(y2));
        Self {
            x1,
            y1,
            x2,
            y2,
            width: x2 - x1,
            height: y2 - y1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Detection {
    #[serde(rename = "class")]
    pub class_name: String,
    pub class_id: usize,
    pub confidence: f64,
    pub bbox: BoundingBox,
}

/// Round to 4 decimal places and pin into `[0, 1]`.
fn transport_confidence(confidence: f32) -> f64 {
    if confidence.is_nan() {
        return 0.0;
    }
    let clamped = f64::from(confidence).clamp(0.0, 1.0);
    (clamped * 10_000.0).round() / 10_000.0
}

pub fn normalize(
    raw: &RawDetection,
    classes: &ClassTable,
    model_names: Option<&ClassNames>,
) -> Detection {
    Detection {
        class_name: classes.resolve(raw.class_id, model_names),
        class_id: raw.class_id,
        confidence: transport_confidence(raw.confidence),
        bbox: BoundingBox::from_corners(raw.x1, raw.y1, raw.x2, raw.y2),
    }
}

/// Normalizes every raw detection, keeping order. Nothing is filtered here.
pub fn normalize_all(
    raw: &[RawDetection],
    classes: &ClassTable,
    model_names: Option<&ClassNames>,
) -> Vec<Detection> {
    raw.iter()
        .map(|d| normalize(d, classes, model_names))
        .collect()
}
