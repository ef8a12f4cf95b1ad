use crate::{
    backend::{InferenceBackend, InferenceOutput},
    names::ClassNames,
    processing::post::{PostProcessor, RawDetection, TransformParams},
};
use common::span;
use image::RgbImage;
use preprocess::{CpuPreProcessor, PreprocessResult};
use std::sync::{Mutex, PoisonError};
use std::time::Instant;

pub const DEFAULT_MAX_DETECTIONS: usize = 300;

/// Per-call thresholds; each entry point passes its own.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectParams {
    pub confidence: f32,
    pub iou: f32,
    pub max_detections: usize,
}

impl DetectParams {
    pub const fn new(confidence: f32, iou: f32) -> Self {
        Self {
            confidence,
            iou,
            max_detections: DEFAULT_MAX_DETECTIONS,
        }
    }
}

/// Output of one detection call with per-stage timings in milliseconds.
#[derive(Debug, Clone, Default)]
pub struct Prediction {
    pub detections: Vec<RawDetection>,
    pub preprocess_ms: f64,
    pub inference_ms: f64,
    pub postprocess_ms: f64,
}

/// The model as request handlers see it.
pub trait DetectionModel: Send + Sync {
    fn detect(&self, image: &RgbImage, params: &DetectParams) -> anyhow::Result<Prediction>;

    /// Names shipped inside the model file, if any.
    fn class_names(&self) -> Option<&ClassNames>;
}

pub struct Detector<B: InferenceBackend> {
    backend: B,
    preprocessor: CpuPreProcessor,
    postprocessor: PostProcessor,
}

impl<B: InferenceBackend> Detector<B> {
    pub fn new(backend: B, input_size: (u32, u32)) -> Self {
        Self {
            backend,
            preprocessor: CpuPreProcessor::new(input_size),
            postprocessor: PostProcessor::new(),
        }
    }

    pub fn class_names(&self) -> Option<ClassNames> {
        self.backend.class_names()
    }

    pub fn detect(&mut self, image: &RgbImage, params: &DetectParams) -> anyhow::Result<Prediction> {
        let (width, height) = image.dimensions();

        let start = Instant::now();
        let PreprocessResult { tensor, letterbox } =
            self.preprocessor.preprocess(image.as_raw(), width, height)?;
        let preprocess_ms = elapsed_ms(start);

        let start = Instant::now();
        let InferenceOutput { preds } = {
            let _s = span!("model_inference");
            self.backend.infer(&tensor)?
        };
        let inference_ms = elapsed_ms(start);

        let transform = TransformParams {
            orig_width: width,
            orig_height: height,
            scale: letterbox.scale,
            offset_x: letterbox.offset_x,
            offset_y: letterbox.offset_y,
        };

        let start = Instant::now();
        let detections = self
            .postprocessor
            .parse_detections(&preds.view(), params, &transform)?;
        let postprocess_ms = elapsed_ms(start);

        tracing::debug!(
            width,
            height,
            detections = detections.len(),
            preprocess_ms,
            inference_ms,
            postprocess_ms,
            "Detection complete"
        );

        Ok(Prediction {
            detections,
            preprocess_ms,
            inference_ms,
            postprocess_ms,
        })
    }
}

/// A `Detector` shared between request handlers.
///
/// The backend needs `&mut` for every run, so calls are serialised on a mutex.
pub struct SharedDetector<B: InferenceBackend> {
    inner: Mutex<Detector<B>>,
    names: Option<ClassNames>,
}

impl<B: InferenceBackend> SharedDetector<B> {
    pub fn new(detector: Detector<B>) -> Self {
        let names = detector.class_names();
        Self {
            inner: Mutex::new(detector),
            names,
        }
    }
}

impl<B: InferenceBackend + Send> DetectionModel for SharedDetector<B> {
    fn detect(&self, image: &RgbImage, params: &DetectParams) -> anyhow::Result<Prediction> {
        // A panic mid-run leaves no partial state behind, so keep serving after it.
        let mut detector = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        detector.detect(image, params)
    }

    fn class_names(&self) -> Option<&ClassNames> {
        self.names.as_ref()
    }
}

fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array, IxDyn};
    use std::path::Path;

    /// Backend that returns a fixed head regardless of input.
    struct StubBackend {
        preds: Array<f32, IxDyn>,
        calls: usize,
        panic_first: bool,
    }

    impl InferenceBackend for StubBackend {
        fn load_model(_path: &Path) -> anyhow::Result<Self> {
            anyhow::bail!("stub backends are built in tests")
        }

        fn infer(&mut self, images: &Array<f32, IxDyn>) -> anyhow::Result<InferenceOutput> {
            assert_eq!(images.shape(), &[1, 3, 640, 640]);
            self.calls += 1;
            if self.panic_first && self.calls == 1 {
                panic!("corrupt frame");
            }
            Ok(InferenceOutput {
                preds: self.preds.clone(),
            })
        }

        fn class_names(&self) -> Option<ClassNames> {
            Some([(0, "widget")].into_iter().collect())
        }
    }

    fn stub_with_single_box() -> StubBackend {
        // One anchor, 7 classes: box centred at (320, 320) 64x64, class 2
        let mut preds = Array::zeros(IxDyn(&[1, 11, 1]));
        preds[[0, 0, 0]] = 320.0;
        preds[[0, 1, 0]] = 320.0;
        preds[[0, 2, 0]] = 64.0;
        preds[[0, 3, 0]] = 64.0;
        preds[[0, 4 + 2, 0]] = 0.9;
        StubBackend {
            preds,
            calls: 0,
            panic_first: false,
        }
    }

    #[test]
    fn test_detect_maps_boxes_back_to_source_image() {
        let mut detector = Detector::new(stub_with_single_box(), (640, 640));
        // 1280x960 → scale 0.5, offset_y 80
        let image = RgbImage::new(1280, 960);

        let prediction = detector
            .detect(&image, &DetectParams::new(0.25, 0.45))
            .unwrap();

        assert_eq!(prediction.detections.len(), 1);
        let det = &prediction.detections[0];
        assert_eq!(det.class_id, 2);
        assert!((det.x1 - 576.0).abs() < 0.01, "x1 = {}", det.x1);
        assert!((det.y1 - 416.0).abs() < 0.01, "y1 = {}", det.y1);
        assert!((det.x2 - 704.0).abs() < 0.01, "x2 = {}", det.x2);
        assert!((det.y2 - 544.0).abs() < 0.01, "y2 = {}", det.y2);
        assert!(prediction.inference_ms >= 0.0);
    }

    #[test]
    fn test_thresholds_are_per_call() {
        let mut detector = Detector::new(stub_with_single_box(), (640, 640));
        let image = RgbImage::new(640, 640);

        let strict = detector
            .detect(&image, &DetectParams::new(0.95, 0.45))
            .unwrap();
        assert!(strict.detections.is_empty());

        let lenient = detector
            .detect(&image, &DetectParams::new(0.15, 0.45))
            .unwrap();
        assert_eq!(lenient.detections.len(), 1);
    }

    #[test]
    fn test_shared_detector_exposes_model_names() {
        let shared = SharedDetector::new(Detector::new(stub_with_single_box(), (640, 640)));

        assert_eq!(shared.class_names().and_then(|n| n.get(0)), Some("widget"));

        let image = RgbImage::new(32, 32);
        let prediction = DetectionModel::detect(&shared, &image, &DetectParams::new(0.25, 0.45));
        assert!(prediction.is_ok());
    }

    #[test]
    fn test_shared_detector_survives_a_panicking_run() {
        let backend = StubBackend {
            panic_first: true,
            ..stub_with_single_box()
        };
        let shared = SharedDetector::new(Detector::new(backend, (640, 640)));
        let image = RgbImage::new(640, 640);
        let params = DetectParams::new(0.25, 0.45);

        let crashed = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            DetectionModel::detect(&shared, &image, &params)
        }));
        assert!(crashed.is_err());

        let prediction = DetectionModel::detect(&shared, &image, &params).unwrap();
        assert_eq!(prediction.detections.len(), 1);
    }
}
