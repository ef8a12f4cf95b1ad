mod report;

use clap::Parser;
use common::Environment;
use indicatif::{ProgressBar, ProgressStyle};
use inference::{
    ClassTable, DetectParams, Detector, ModelLoader,
    backend::ort::{OrtBackend, OrtOptions},
};
use preprocess::DEFAULT_INPUT_SIZE;
use report::{ImageReport, Summary};
use std::path::{Path, PathBuf};

const DEFAULT_MODELS: [&str; 2] = [
    "runs/train/falcon_yolov8m_final/weights/best.onnx",
    "yolov8m.onnx",
];

/// Run the detector over a handful of images and summarise how it does.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Model candidates, first existing file is used
    #[arg(short, long = "model", num_args = 1.., default_values_t = DEFAULT_MODELS.map(String::from))]
    models: Vec<String>,

    /// Image paths or glob patterns
    #[arg(short, long = "images", num_args = 1.., required = true)]
    images: Vec<String>,

    #[arg(long, default_value_t = 0.25)]
    confidence: f32,

    #[arg(long, default_value_t = 0.7)]
    iou: f32,

    /// Stop after this many images
    #[arg(long)]
    limit: Option<usize>,

    /// Substring marking our own fine-tuned weights
    #[arg(long, default_value = "falcon_yolov8m")]
    finetuned_marker: String,
}

fn is_pattern(s: &str) -> bool {
    s.contains(['*', '?', '['])
}

/// Expands globs; literal paths that do not exist are reported as missing.
fn collect_images(inputs: &[String]) -> anyhow::Result<(Vec<PathBuf>, Vec<String>)> {
    let mut found = Vec::new();
    let mut missing = Vec::new();

    for input in inputs {
        if is_pattern(input) {
            let before = found.len();
            for entry in glob::glob(input)? {
                match entry {
                    Ok(path) if path.is_file() => found.push(path),
                    Ok(_) => {}
                    Err(e) => tracing::warn!(error = %e, "Unreadable glob entry"),
                }
            }
            if found.len() == before {
                missing.push(input.clone());
            }
        } else if Path::new(input).is_file() {
            found.push(PathBuf::from(input));
        } else {
            missing.push(input.clone());
        }
    }

    Ok((found, missing))
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn main() -> anyhow::Result<()> {
    common::setup_logging("warn", Environment::from_env());
    let args = Args::parse();

    let loader = ModelLoader::new(&args.models, &args.finetuned_marker);
    let loaded = loader.load_with(|path| {
        OrtBackend::load_model_with_options(path, &OrtOptions::default())
    })?;
    println!("Using {} model: {}", loaded.source.as_str(), loaded.path.display());

    let mut detector = Detector::new(loaded.backend, DEFAULT_INPUT_SIZE);
    let names = detector.class_names();
    let classes = ClassTable::default();
    let params = DetectParams::new(args.confidence, args.iou);

    let (mut images, mut missing) = collect_images(&args.images)?;
    if let Some(limit) = args.limit {
        images.truncate(limit);
    }

    let bar = ProgressBar::new(images.len() as u64);
    bar.set_style(
        ProgressStyle::with_template("{spinner} [{bar:40}] {pos}/{len} {msg}")?
            .progress_chars("=> "),
    );

    let mut reports = Vec::with_capacity(images.len());
    for path in &images {
        let name = file_name(path);
        bar.set_message(name.clone());

        let image = match image::open(path) {
            Ok(image) => image.to_rgb8(),
            Err(e) => {
                bar.println(format!("Skipping {}: {e}", path.display()));
                missing.push(path.display().to_string());
                bar.inc(1);
                continue;
            }
        };

        let prediction = match detector.detect(&image, &params) {
            Ok(prediction) => prediction,
            Err(e) => {
                bar.println(format!("Inference failed on {}: {e:#}", path.display()));
                bar.inc(1);
                continue;
            }
        };
        let detections = prediction
            .detections
            .iter()
            .map(|d| (classes.resolve(d.class_id, names.as_ref()), d.confidence))
            .collect();
        reports.push(ImageReport::new(name, detections));
        bar.inc(1);
    }
    bar.finish_and_clear();

    for report in &reports {
        println!("{report}");
    }
    println!("{}", Summary::new(reports, missing));

    Ok(())
}
