use crate::{
    error::ApiError,
    history::{HistorySnapshot, RECENT_WINDOW, Stats},
    pipeline::{self, StreamResponse, UploadResponse},
    state::AppState,
};
use axum::{
    Json,
    body::Bytes,
    extract::{
        Multipart, State,
        multipart::MultipartError,
        rejection::{JsonRejection, MultipartRejection},
    },
    http::StatusCode,
};
use serde::Deserialize;
use serde_json::{Value, json};

#[derive(Debug, Deserialize)]
pub struct Base64Request {
    #[serde(default)]
    pub image: String,
}

pub async fn root(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "message": "Falcon Detection API",
        "status": "online",
        "model_loaded": state.model_loaded(),
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "predict_image": "/predict/image",
            "predict_base64": "/predict/base64",
            "health": "/health",
            "history": "/history",
            "stats": "/stats"
        }
    }))
}

pub async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "model_loaded": state.model_loaded(),
        "timestamp": pipeline::timestamp(),
    }))
}

fn multipart_error(e: MultipartError, context: &str) -> ApiError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge(e.body_text())
    } else {
        ApiError::invalid(format!("{context}: {}", e.body_text()))
    }
}

/// `file` field wins; otherwise the first field carrying a filename.
async fn read_upload(multipart: &mut Multipart) -> Result<Bytes, ApiError> {
    let mut fallback = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, "Malformed multipart body"))?
    {
        let named_file = field.name() == Some("file");
        if !named_file && (fallback.is_some() || field.file_name().is_none()) {
            continue;
        }

        let data = field
            .bytes()
            .await
            .map_err(|e| multipart_error(e, "Failed to read upload"))?;
        if named_file {
            return Ok(data);
        }
        fallback = Some(data);
    }

    fallback.ok_or_else(|| ApiError::invalid("No file uploaded (expected multipart field `file`)"))
}

async fn run_blocking<T, F>(task: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, ApiError> + Send + 'static,
{
    tokio::task::spawn_blocking(task)
        .await
        .map_err(|e| ApiError::Internal(format!("Prediction task failed: {e}")))?
}

fn finish<T>(
    state: &AppState,
    endpoint: &'static str,
    result: Result<T, ApiError>,
) -> Result<Json<T>, ApiError> {
    if let Err(e) = &result {
        state.metrics.record_error(endpoint, e.kind());
        match e {
            ApiError::Internal(_) => tracing::error!(endpoint, error = %e, "Prediction failed"),
            _ => tracing::warn!(endpoint, error = %e, "Prediction rejected"),
        }
    }
    result.map(Json)
}

pub async fn predict_image(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<UploadResponse>, ApiError> {
    const ENDPOINT: &str = "predict_image";
    state.metrics.record_request(ENDPOINT);

    let result = async {
        if !state.model_loaded() {
            return Err(ApiError::ServiceUnavailable);
        }
        let mut multipart = multipart.map_err(|e| ApiError::rejected(e.status(), e.body_text()))?;
        let bytes = read_upload(&mut multipart).await?;

        let task_state = state.clone();
        run_blocking(move || pipeline::detect_upload(&task_state, &bytes)).await
    }
    .await;

    finish(&state, ENDPOINT, result)
}

pub async fn predict_base64(
    State(state): State<AppState>,
    body: Result<Json<Base64Request>, JsonRejection>,
) -> Result<Json<StreamResponse>, ApiError> {
    const ENDPOINT: &str = "predict_base64";
    state.metrics.record_request(ENDPOINT);

    let result = async {
        if !state.model_loaded() {
            return Err(ApiError::ServiceUnavailable);
        }
        let Json(request) = body.map_err(|e| ApiError::rejected(e.status(), e.body_text()))?;

        let task_state = state.clone();
        run_blocking(move || pipeline::detect_stream(&task_state, &request.image)).await
    }
    .await;

    finish(&state, ENDPOINT, result)
}

pub async fn history(State(state): State<AppState>) -> Json<HistorySnapshot> {
    Json(state.history.recent(RECENT_WINDOW))
}

pub async fn stats(State(state): State<AppState>) -> Json<Stats> {
    Json(state.history.stats())
}

pub async fn clear_history(State(state): State<AppState>) -> Json<Value> {
    state.history.clear();
    tracing::info!("History cleared");
    Json(json!({ "success": true, "message": "History cleared" }))
}
