use super::nms::non_max_suppression;
use crate::detector::DetectParams;
use ndarray::ArrayViewD;

/// Values preceding the class scores for each anchor (cx, cy, w, h).
const BOX_CHANNELS: usize = 4;

pub struct TransformParams {
    pub orig_width: u32,
    pub orig_height: u32,
    pub scale: f32,
    pub offset_x: f32,
    pub offset_y: f32,
}

/// One box in source-image pixel coordinates, straight out of the model.
#[derive(Debug, Clone, PartialEq)]
pub struct RawDetection {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub confidence: f32,
    pub class_id: usize,
}

impl RawDetection {
    pub fn area(&self) -> f32 {
        (self.x2 - self.x1).max(0.0) * (self.y2 - self.y1).max(0.0)
    }

    pub fn iou(&self, other: &RawDetection) -> f32 {
        let w = (self.x2.min(other.x2) - self.x1.max(other.x1)).max(0.0);
        let h = (self.y2.min(other.y2) - self.y1.max(other.y1)).max(0.0);
        let inter = w * h;
        let union = self.area() + other.area() - inter;
        if union <= 0.0 { 0.0 } else { inter / union }
    }
}

#[derive(Debug, Default)]
pub struct PostProcessor;

impl PostProcessor {
    pub fn new() -> Self {
        Self
    }

    /// Decode a YOLOv8 detect head (`[1, 4 + nc, anchors]`) into boxes on the
    /// original image, thresholded, NMS'd and capped at `max_detections`.
    #[tracing::instrument(skip_all, fields(confidence = params.confidence, iou = params.iou))]
    pub fn parse_detections(
        &self,
        preds: &ArrayViewD<f32>,
        params: &DetectParams,
        transform: &TransformParams,
    ) -> anyhow::Result<Vec<RawDetection>> {
        let shape = preds.shape();
        if shape.len() != 3 || shape[0] != 1 || shape[1] <= BOX_CHANNELS {
            anyhow::bail!(
                "Unexpected model output shape {:?}, expected [1, 4 + classes, anchors]",
                shape
            );
        }

        let num_classes = shape[1] - BOX_CHANNELS;
        let num_anchors = shape[2];

        let mut detections = Vec::new();

        for i in 0..num_anchors {
            let mut confidence = f32::NEG_INFINITY;
            let mut class_id = 0usize;
            for c in 0..num_classes {
                let score = preds[[0, BOX_CHANNELS + c, i]];
                if score > confidence {
                    confidence = score;
                    class_id = c;
                }
            }

            if confidence < params.confidence {
                continue;
            }

            let (x1, y1, x2, y2) = cxcywh_to_xyxy(
                preds[[0, 0, i]],
                preds[[0, 1, i]],
                preds[[0, 2, i]],
                preds[[0, 3, i]],
            );

            let (x1, x2) = (
                unletterbox(x1, transform.offset_x, transform.scale, transform.orig_width),
                unletterbox(x2, transform.offset_x, transform.scale, transform.orig_width),
            );
            let (y1, y2) = (
                unletterbox(y1, transform.offset_y, transform.scale, transform.orig_height),
                unletterbox(y2, transform.offset_y, transform.scale, transform.orig_height),
            );

            detections.push(RawDetection {
                x1,
                y1,
                x2,
                y2,
                confidence: confidence.clamp(0.0, 1.0),
                class_id,
            });
        }

        let candidates = detections.len();
        non_max_suppression(&mut detections, params.iou);
        detections.truncate(params.max_detections);

        tracing::debug!(candidates, kept = detections.len(), "Decoded detections");

        Ok(detections)
    }
}

/// Convert bounding box from center-width-height format to corner format
#[inline]
fn cxcywh_to_xyxy(cx: f32, cy: f32, w: f32, h: f32) -> (f32, f32, f32, f32) {
    let x1 = cx - w / 2.0;
    let y1 = cy - h / 2.0;
    let x2 = cx + w / 2.0;
    let y2 = cy + h / 2.0;
    (x1, y1, x2, y2)
}

/// Map a model-space coordinate back onto the source image, clamped to its extent.
#[inline]
fn unletterbox(v: f32, offset: f32, scale: f32, extent: u32) -> f32 {
    ((v - offset) / scale).max(0.0).min(extent as f32)
}
