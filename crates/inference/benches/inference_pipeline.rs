use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use inference::{
    DetectParams, Detector, InferenceBackend, InferenceOutput,
    processing::post::{PostProcessor, TransformParams},
};
use image::RgbImage;
use ndarray::{Array, IxDyn};
use std::path::Path;

const NUM_CLASSES: usize = 7;
const NUM_ANCHORS: usize = 8400;

/// Create a mock YOLOv8 head with `num_hits` confident anchors spread over the
/// input, the rest below any useful threshold.
fn create_mock_yolo_output(num_hits: usize) -> ndarray::ArrayD<f32> {
    let channels = 4 + NUM_CLASSES;
    let mut data = vec![0.01f32; channels * NUM_ANCHORS];

    for i in 0..num_hits.min(NUM_ANCHORS) {
        let cx = 40.0 + (i % 12) as f32 * 50.0;
        let cy = 40.0 + (i / 12 % 12) as f32 * 50.0;
        data[i] = cx;
        data[NUM_ANCHORS + i] = cy;
        data[2 * NUM_ANCHORS + i] = 30.0;
        data[3 * NUM_ANCHORS + i] = 30.0;
        data[(4 + i % NUM_CLASSES) * NUM_ANCHORS + i] = 0.9;
    }

    Array::from_shape_vec(IxDyn(&[1, channels, NUM_ANCHORS]), data).unwrap()
}

struct ReplayBackend {
    preds: ndarray::ArrayD<f32>,
}

impl InferenceBackend for ReplayBackend {
    fn load_model(_path: &Path) -> anyhow::Result<Self> {
        anyhow::bail!("replay backend has no model file")
    }

    fn infer(&mut self, _images: &Array<f32, IxDyn>) -> anyhow::Result<InferenceOutput> {
        Ok(InferenceOutput {
            preds: self.preds.clone(),
        })
    }
}

fn benchmark_postprocessing(c: &mut Criterion) {
    let mut group = c.benchmark_group("postprocessing");
    let post_processor = PostProcessor::new();
    let params = DetectParams::new(0.25, 0.7);
    let transform = TransformParams {
        orig_width: 1920,
        orig_height: 1080,
        scale: 640.0 / 1920.0,
        offset_x: 0.0,
        offset_y: 140.0,
    };

    for num_hits in [0, 20, 100, 500] {
        let preds = create_mock_yolo_output(num_hits);

        group.bench_with_input(
            BenchmarkId::new("parse_detections", num_hits),
            &preds,
            |b, preds| {
                b.iter(|| {
                    post_processor
                        .parse_detections(
                            black_box(&preds.view()),
                            black_box(&params),
                            black_box(&transform),
                        )
                        .unwrap()
                });
            },
        );
    }

    group.finish();
}

fn benchmark_detect(c: &mut Criterion) {
    let mut group = c.benchmark_group("detect");
    let params = DetectParams::new(0.15, 0.45);

    for (width, height) in [(640, 480), (1280, 720), (1920, 1080)] {
        let image = RgbImage::from_pixel(width, height, image::Rgb([128, 128, 128]));
        let mut detector = Detector::new(
            ReplayBackend {
                preds: create_mock_yolo_output(50),
            },
            (640, 640),
        );

        group.bench_with_input(
            BenchmarkId::new("letterbox_to_boxes", format!("{}x{}", width, height)),
            &image,
            |b, image| {
                b.iter(|| detector.detect(black_box(image), black_box(&params)).unwrap());
            },
        );
    }

    group.finish();
}

criterion_group!(benches, benchmark_postprocessing, benchmark_detect);
criterion_main!(benches);
