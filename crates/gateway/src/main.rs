use gateway::{
    annotate::Annotator,
    config::{Config, get_configuration},
    logging::setup_logging,
    server, state::AppState,
};
use inference::{
    DetectionModel, Detector, ModelLoader, SharedDetector, backend::ort::OrtBackend,
};
use std::sync::Arc;

fn load_model(config: &Config) -> Option<Arc<dyn DetectionModel>> {
    let loader = ModelLoader::new(&config.model.paths, &config.model.finetuned_marker);
    let options = config.model.ort_options();

    match loader.load_with(|path| OrtBackend::load_model_with_options(path, &options)) {
        Ok(loaded) => {
            tracing::info!(
                path = %loaded.path.display(),
                source = loaded.source.as_str(),
                "Model loaded"
            );
            let size = config.model.input_size;
            let detector = Detector::new(loaded.backend, (size, size));
            Some(Arc::new(SharedDetector::new(detector)))
        }
        Err(e) => {
            tracing::error!(error = %e, "Model unavailable, prediction endpoints will return 503");
            None
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = get_configuration()?;
    let _telemetry = setup_logging(&config);

    tracing::info!(
        environment = config.environment.as_str(),
        address = %config.server.address(),
        "Starting detection gateway"
    );

    let model = load_model(&config);
    let annotator =
        Annotator::from_font_paths(&config.annotation.font_paths, config.annotation.font_scale);
    let state = AppState::new(model, annotator)
        .with_thresholds(config.upload.params(), config.stream.params());

    let app = server::router(state, config.server.max_upload_bytes);
    let listener = tokio::net::TcpListener::bind(config.server.address()).await?;
    tracing::info!(address = %config.server.address(), "Listening");

    server::serve(listener, app).await?;
    tracing::info!("Gateway stopped");

    Ok(())
}
