pub mod backend;
pub mod classes;
pub mod detector;
pub mod loader;
pub mod names;
pub mod processing;

// Re-export commonly used types for convenience
pub use backend::{InferenceBackend, InferenceOutput};
pub use classes::{CLASS_NAMES, ClassTable};
pub use detector::{DetectParams, DetectionModel, Detector, Prediction, SharedDetector};
pub use loader::{LoadError, LoadedModel, ModelLoader, ModelSource};
pub use names::ClassNames;
pub use processing::post::RawDetection;
