use crate::names::ClassNames;
use ndarray::{Array, IxDyn};
use std::path::Path;

#[cfg(feature = "ort-backend")]
pub mod ort;

pub trait InferenceBackend {
    fn load_model(path: &Path) -> anyhow::Result<Self>
    where
        Self: Sized;

    /// Run the forward pass on a preprocessed NCHW tensor.
    fn infer(&mut self, images: &Array<f32, IxDyn>) -> anyhow::Result<InferenceOutput>;

    /// Class names embedded in the model file, if the exporter wrote any.
    fn class_names(&self) -> Option<ClassNames> {
        None
    }
}

pub struct InferenceOutput {
    pub preds: ndarray::ArrayD<f32>, // [1, 4 + num_classes, anchors] cxcywh in input pixels, then class scores
}
