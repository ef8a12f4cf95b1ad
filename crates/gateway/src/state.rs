use crate::{annotate::Annotator, history::HistoryLedger, metrics::Metrics};
use inference::{ClassTable, DetectParams, DetectionModel};
use std::sync::Arc;

pub const UPLOAD_PARAMS: DetectParams = DetectParams::new(0.15, 0.45);
pub const STREAM_PARAMS: DetectParams = DetectParams::new(0.25, 0.7);

/// Everything a request handler needs, built once at startup.
#[derive(Clone)]
pub struct AppState {
    /// `None` keeps the service up in degraded mode.
    pub model: Option<Arc<dyn DetectionModel>>,
    pub classes: Arc<ClassTable>,
    pub annotator: Arc<Annotator>,
    pub history: Arc<HistoryLedger>,
    pub upload: DetectParams,
    pub stream: DetectParams,
    pub metrics: Metrics,
}

impl AppState {
    pub fn new(model: Option<Arc<dyn DetectionModel>>, annotator: Annotator) -> Self {
        Self {
            model,
            classes: Arc::new(ClassTable::default()),
            annotator: Arc::new(annotator),
            history: Arc::new(HistoryLedger::default()),
            upload: UPLOAD_PARAMS,
            stream: STREAM_PARAMS,
            metrics: Metrics::default(),
        }
    }

    pub fn with_thresholds(mut self, upload: DetectParams, stream: DetectParams) -> Self {
        self.upload = upload;
        self.stream = stream;
        self
    }

    pub fn model_loaded(&self) -> bool {
        self.model.is_some()
    }
}
