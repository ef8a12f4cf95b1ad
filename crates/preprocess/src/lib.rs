pub mod config;
pub mod cpu;

use ndarray::{Array, IxDyn};

pub use config::{DEFAULT_INPUT_SIZE, LETTERBOX_COLOR};
pub use cpu::CpuPreProcessor;

/// Geometry of the letterbox applied to one image.
///
/// Model-space coordinates map back to the source image with
/// `(v - offset) / scale`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
    /// Scale factor applied to the source image
    pub scale: f32,
    /// X offset of the resized image inside the model input (in pixels)
    pub offset_x: f32,
    /// Y offset of the resized image inside the model input (in pixels)
    pub offset_y: f32,
}

/// Result of preprocessing including transformation parameters
#[derive(Debug)]
pub struct PreprocessResult {
    /// NCHW tensor, values in `[0, 1]`
    pub tensor: Array<f32, IxDyn>,
    pub letterbox: Letterbox,
}
