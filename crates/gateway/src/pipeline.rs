//! Blocking per-request work: decode, detect, normalize, annotate.
//!
//! Handlers run these on the blocking pool.

use crate::{
    error::ApiError,
    history::HistoryEntry,
    normalizer::{Detection, normalize_all},
    state::AppState,
};
use base64::{
    Engine, alphabet,
    engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig},
};
use image::RgbImage;
use inference::{DetectParams, DetectionModel, Prediction};
use serde::Serialize;

/// Standard alphabet, padding optional.
const PAYLOAD_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_decode_padding_mode(DecodePaddingMode::Indifferent)
        .with_decode_allow_trailing_bits(true),
);

const DATA_URI_PREFIX: &str = "data:image";

#[derive(Debug, Clone, Serialize)]
pub struct ImageInfo {
    pub width: u32,
    pub height: u32,
    pub annotated: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct UploadResponse {
    pub success: bool,
    pub timestamp: String,
    pub num_detections: usize,
    pub detections: Vec<Detection>,
    pub image: ImageInfo,
    pub inference_time_ms: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct StreamResponse {
    pub success: bool,
    pub num_detections: usize,
    pub detections: Vec<Detection>,
    pub inference_time_ms: f64,
}

/// Local time, ISO-8601 with microseconds and no offset.
pub fn timestamp() -> String {
    chrono::Local::now()
        .format("%Y-%m-%dT%H:%M:%S%.6f")
        .to_string()
}

pub fn decode_image(bytes: &[u8], detail: &str) -> Result<RgbImage, ApiError> {
    if bytes.is_empty() {
        return Err(ApiError::invalid(detail));
    }
    match image::load_from_memory(bytes) {
        Ok(image) => Ok(image.to_rgb8()),
        Err(e) => {
            tracing::warn!(stage = "decode", bytes = bytes.len(), error = %e, "Undecodable image");
            Err(ApiError::invalid(detail))
        }
    }
}

/// Accepts bare base64 or a `data:image/...;base64,` URI.
pub fn decode_base64_payload(payload: &str) -> Result<Vec<u8>, ApiError> {
    let mut encoded = payload.trim();
    if encoded.starts_with(DATA_URI_PREFIX) {
        encoded = match encoded.split_once(',') {
            Some((_, data)) => data,
            None => return Err(ApiError::invalid("Malformed data URI: missing ','")),
        };
    }

    let compact: String = encoded
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .collect();
    if compact.is_empty() {
        return Err(ApiError::invalid("No image data provided"));
    }

    PAYLOAD_ENGINE.decode(compact.as_bytes()).map_err(|e| {
        tracing::warn!(stage = "base64", length = compact.len(), error = %e, "Malformed base64 payload");
        ApiError::invalid(format!("Invalid base64 payload: {e}"))
    })
}

fn run_model(
    model: &dyn DetectionModel,
    image: &RgbImage,
    params: &DetectParams,
) -> Result<Prediction, ApiError> {
    model.detect(image, params).map_err(|e| {
        tracing::error!(
            stage = "inference",
            width = image.width(),
            height = image.height(),
            error = %e,
            "Inference failed"
        );
        ApiError::from(e)
    })
}

/// `/predict/image`: full response with annotated preview, recorded in history.
pub fn detect_upload(state: &AppState, bytes: &[u8]) -> Result<UploadResponse, ApiError> {
    let model = state.model.as_deref().ok_or(ApiError::ServiceUnavailable)?;
    let image = decode_image(bytes, "Invalid image file")?;
    let (width, height) = image.dimensions();
    tracing::info!(
        width,
        height,
        confidence = state.upload.confidence,
        iou = state.upload.iou,
        "Processing image"
    );

    let prediction = run_model(model, &image, &state.upload)?;
    let detections = normalize_all(&prediction.detections, &state.classes, model.class_names());
    state
        .metrics
        .record_inference("predict_image", prediction.inference_ms / 1000.0, detections.len());
    for d in &detections {
        tracing::debug!(class = %d.class_name, confidence = d.confidence, "Detected");
    }

    let annotated = state.annotator.annotate(&image, &detections).map_err(|e| {
        tracing::error!(stage = "annotation", width, height, error = %e, "Annotation failed");
        ApiError::from(e)
    })?;

    let timestamp = timestamp();
    state.history.append(HistoryEntry::new(
        timestamp.clone(),
        detections.iter().map(|d| d.class_name.clone()).collect(),
    ));

    tracing::info!(
        detections = detections.len(),
        inference_ms = prediction.inference_ms,
        "Prediction complete"
    );

    Ok(UploadResponse {
        success: true,
        timestamp,
        num_detections: detections.len(),
        detections,
        image: ImageInfo {
            width,
            height,
            annotated,
        },
        inference_time_ms: prediction.inference_ms,
    })
}

/// `/predict/base64`: detections only, not recorded in history.
pub fn detect_stream(state: &AppState, payload: &str) -> Result<StreamResponse, ApiError> {
    let model = state.model.as_deref().ok_or(ApiError::ServiceUnavailable)?;
    let bytes = decode_base64_payload(payload)?;
    let image = decode_image(&bytes, "Invalid image data")?;

    let prediction = run_model(model, &image, &state.stream)?;
    let detections = normalize_all(&prediction.detections, &state.classes, model.class_names());
    state
        .metrics
        .record_inference("predict_base64", prediction.inference_ms / 1000.0, detections.len());

    tracing::debug!(
        width = image.width(),
        height = image.height(),
        detections = detections.len(),
        "Stream frame processed"
    );

    Ok(StreamResponse {
        success: true,
        num_detections: detections.len(),
        detections,
        inference_time_ms: prediction.inference_ms,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose::STANDARD;

    #[test]
    fn test_bare_base64_decodes() {
        let encoded = STANDARD.encode(b"hello");
        assert_eq!(decode_base64_payload(&encoded).unwrap(), b"hello");
    }

    #[test]
    fn test_data_uri_header_is_stripped() {
        let encoded = format!("data:image/png;base64,{}", STANDARD.encode(b"pixels"));
        assert_eq!(decode_base64_payload(&encoded).unwrap(), b"pixels");
    }

    #[test]
    fn test_missing_padding_and_line_breaks_are_tolerated() {
        let encoded = STANDARD.encode(b"abcd");
        let unpadded = encoded.trim_end_matches('=');
        let wrapped = format!("{}\n{}", &unpadded[..2], &unpadded[2..]);
        assert_eq!(decode_base64_payload(&wrapped).unwrap(), b"abcd");
    }

    #[test]
    fn test_malformed_payloads_are_invalid_input() {
        for payload in ["", "   ", "not*base64!", "data:image/png;base64", "data:image/png;base64,"] {
            let err = decode_base64_payload(payload).unwrap_err();
            assert!(
                matches!(err, ApiError::InvalidInput(_)),
                "{payload:?} gave {err:?}"
            );
        }
    }

    #[test]
    fn test_undecodable_bytes_are_invalid_input() {
        let err = decode_image(b"definitely not an image", "Invalid image file").unwrap_err();
        assert!(matches!(err, ApiError::InvalidInput(ref m) if m == "Invalid image file"));
        assert!(matches!(
            decode_image(&[], "Invalid image data"),
            Err(ApiError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_timestamp_format() {
        let ts = timestamp();
        assert!(chrono::NaiveDateTime::parse_from_str(&ts, "%Y-%m-%dT%H:%M:%S%.6f").is_ok(), "{ts}");
    }
}
