use inference::{DetectParams, backend::ort::{ExecutionProvider, OrtOptions}};
use serde::Deserialize;

pub use common::Environment;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub max_upload_bytes: usize,
}

impl ServerConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModelConfig {
    /// Candidate model files, tried in order.
    pub paths: Vec<String>,
    /// Substring identifying our own fine-tuned weights.
    pub finetuned_marker: String,
    pub input_size: u32,
    pub execution_provider: ExecutionProvider,
    pub intra_threads: usize,
}

impl ModelConfig {
    pub fn ort_options(&self) -> OrtOptions {
        OrtOptions {
            provider: self.execution_provider,
            intra_threads: self.intra_threads,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ThresholdConfig {
    pub confidence: f32,
    pub iou: f32,
    pub max_detections: usize,
}

impl ThresholdConfig {
    pub fn params(&self) -> DetectParams {
        DetectParams {
            confidence: self.confidence,
            iou: self.iou,
            max_detections: self.max_detections,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnnotationConfig {
    pub font_paths: Vec<String>,
    pub font_scale: f32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub log_level: LogLevel,
    pub environment: Environment,
    pub otel_endpoint: Option<String>,
    pub server: ServerConfig,
    pub model: ModelConfig,
    /// Thresholds for `/predict/image`.
    pub upload: ThresholdConfig,
    /// Thresholds for `/predict/base64`.
    pub stream: ThresholdConfig,
    pub annotation: AnnotationConfig,
}

const DEFAULT_MODEL_PATHS: [&str; 3] = [
    "runs/train/falcon_yolov8m_final/weights/best.onnx",
    "yolov8m.onnx",
    "../yolov8m.onnx",
];

const DEFAULT_FONT_PATHS: [&str; 4] = [
    "/usr/share/fonts/truetype/dejavu/DejaVuSans-Bold.ttf",
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Bold.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
];

pub fn get_configuration() -> Result<Config, config::ConfigError> {
    let config = config::Config::builder()
        .set_default("log_level", "info")?
        .set_default("environment", "development")?
        .set_default("server.host", "0.0.0.0")?
        .set_default("server.port", 8000)?
        .set_default("server.max_upload_bytes", 20 * 1024 * 1024)?
        .set_default("model.paths", DEFAULT_MODEL_PATHS.to_vec())?
        .set_default("model.finetuned_marker", "falcon_yolov8m")?
        .set_default("model.input_size", 640)?
        .set_default("model.execution_provider", "cpu")?
        .set_default("model.intra_threads", 4)?
        .set_default("upload.confidence", 0.15)?
        .set_default("upload.iou", 0.45)?
        .set_default("upload.max_detections", 300)?
        .set_default("stream.confidence", 0.25)?
        .set_default("stream.iou", 0.7)?
        .set_default("stream.max_detections", 300)?
        .set_default("annotation.font_paths", DEFAULT_FONT_PATHS.to_vec())?
        .set_default("annotation.font_scale", 22.0)?
        .add_source(
            config::Environment::with_prefix("GATEWAY")
                .prefix_separator("_")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("model.paths")
                .with_list_parse_key("annotation.font_paths")
                .try_parsing(true),
        )
        .build()?;

    let config: Config = config.try_deserialize::<Config>()?;
    config.validate()?;

    Ok(config)
}

impl Config {
    fn validate(&self) -> Result<(), config::ConfigError> {
        for (name, t) in [("upload", &self.upload), ("stream", &self.stream)] {
            if !(0.0..=1.0).contains(&t.confidence) || !(0.0..=1.0).contains(&t.iou) {
                return Err(config::ConfigError::Message(format!(
                    "{name} thresholds must lie in [0, 1] (confidence={}, iou={})",
                    t.confidence, t.iou
                )));
            }
            if t.max_detections == 0 {
                return Err(config::ConfigError::Message(format!(
                    "{name}.max_detections must be at least 1"
                )));
            }
        }
        if self.model.input_size == 0 {
            return Err(config::ConfigError::Message(
                "model.input_size must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    fn clear_env() {
        for (key, _) in env::vars() {
            if key.starts_with("GATEWAY_") {
                unsafe { env::remove_var(key) };
            }
        }
    }

    #[test]
    #[serial]
    fn test_defaults() {
        clear_env();
        let config = get_configuration().unwrap();

        assert_eq!(config.log_level, LogLevel::Info);
        assert_eq!(config.environment, Environment::Development);
        assert!(config.otel_endpoint.is_none());
        assert_eq!(config.server.address(), "0.0.0.0:8000");
        assert_eq!(config.server.max_upload_bytes, 20 * 1024 * 1024);
        assert_eq!(config.model.paths, DEFAULT_MODEL_PATHS);
        assert_eq!(config.model.execution_provider, ExecutionProvider::Cpu);
        assert_eq!(config.upload.params(), DetectParams::new(0.15, 0.45));
        assert_eq!(config.stream.params(), DetectParams::new(0.25, 0.7));
        assert_eq!(config.annotation.font_scale, 22.0);
    }

    #[test]
    #[serial]
    fn test_environment_overrides() {
        clear_env();
        unsafe {
            env::set_var("GATEWAY_ENVIRONMENT", "production");
            env::set_var("GATEWAY_SERVER__PORT", "9000");
            env::set_var("GATEWAY_UPLOAD__CONFIDENCE", "0.3");
            env::set_var("GATEWAY_MODEL__PATHS", "a.onnx,b.onnx");
        }

        let config = get_configuration().unwrap();
        clear_env();

        assert_eq!(config.environment, Environment::Production);
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.upload.confidence, 0.3);
        assert_eq!(config.model.paths, vec!["a.onnx", "b.onnx"]);
    }

    #[test]
    #[serial]
    fn test_unknown_environment_is_rejected() {
        clear_env();
        unsafe { env::set_var("GATEWAY_ENVIRONMENT", "staging") };

        let err = get_configuration().unwrap_err();
        clear_env();

        assert!(err.to_string().contains("staging"));
    }

    #[test]
    #[serial]
    fn test_out_of_range_threshold_is_rejected() {
        clear_env();
        unsafe { env::set_var("GATEWAY_STREAM__IOU", "1.5") };

        let err = get_configuration().unwrap_err();
        clear_env();

        assert!(err.to_string().contains("stream"));
    }
}
