/// Square input expected by YOLOv8 detect exports.
pub const DEFAULT_INPUT_SIZE: (u32, u32) = (640, 640);

/// Grey used by ultralytics to pad letterboxed images.
pub const LETTERBOX_COLOR: u8 = 114;
