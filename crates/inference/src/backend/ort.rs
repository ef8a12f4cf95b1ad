use super::{InferenceBackend, InferenceOutput};
use crate::names::ClassNames;
use ndarray::{Array, IxDyn};
use ort::{
    session::{Session, builder::GraphOptimizationLevel},
    value::TensorRef,
};
use serde::Deserialize;
use std::path::Path;

/// Metadata key ultralytics exports use for the id → name table.
const NAMES_METADATA_KEY: &str = "names";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionProvider {
    #[default]
    Cpu,
    Cuda,
}

#[derive(Debug, Clone)]
pub struct OrtOptions {
    pub provider: ExecutionProvider,
    pub intra_threads: usize,
}

impl Default for OrtOptions {
    fn default() -> Self {
        Self {
            provider: ExecutionProvider::Cpu,
            intra_threads: 4,
        }
    }
}

pub struct OrtBackend {
    session: Session,
    names: Option<ClassNames>,
}

impl OrtBackend {
    /// Load model with specified execution provider
    pub fn load_model_with_options(path: &Path, options: &OrtOptions) -> anyhow::Result<Self> {
        // Initialize ORT environment (idempotent)
        let _ = ort::init().commit();

        let mut builder = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(options.intra_threads)?;

        match options.provider {
            ExecutionProvider::Cuda => {
                tracing::info!("Initializing ONNX Runtime with CUDA execution provider");
                builder = builder.with_execution_providers([
                    ort::execution_providers::CUDAExecutionProvider::default()
                        .with_device_id(0)
                        .build()
                        .error_on_failure(),
                ])?;
            }
            ExecutionProvider::Cpu => {
                tracing::info!("Initializing ONNX Runtime with CPU execution provider");
            }
        }

        let session = builder.commit_from_file(path)?;
        let names = read_class_names(&session);

        tracing::info!(
            path = %path.display(),
            embedded_classes = names.as_ref().map(ClassNames::len).unwrap_or(0),
            "Model loaded"
        );
        Ok(Self { session, names })
    }
}

fn read_class_names(session: &Session) -> Option<ClassNames> {
    let metadata = match session.metadata() {
        Ok(metadata) => metadata,
        Err(e) => {
            tracing::debug!(error = %e, "Model metadata unavailable");
            return None;
        }
    };

    match metadata.custom(NAMES_METADATA_KEY) {
        Ok(Some(raw)) => ClassNames::parse(&raw),
        Ok(None) => None,
        Err(e) => {
            tracing::debug!(error = %e, "Failed to read class names from model metadata");
            None
        }
    }
}

impl InferenceBackend for OrtBackend {
    fn load_model(path: &Path) -> anyhow::Result<Self> {
        Self::load_model_with_options(path, &OrtOptions::default())
    }

    fn infer(&mut self, images: &Array<f32, IxDyn>) -> anyhow::Result<InferenceOutput> {
        let outputs = self.session.run(ort::inputs![
            "images" => TensorRef::from_array_view(images.view())?
        ])?;

        let preds = outputs[0].try_extract_array::<f32>()?;

        Ok(InferenceOutput {
            preds: preds.into_owned(),
        })
    }

    fn class_names(&self) -> Option<ClassNames> {
        self.names.clone()
    }
}
