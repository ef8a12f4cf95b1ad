use crate::config::Config;
use common::TelemetryGuard;

const SERVICE_NAME: &str = "gateway";

/// Installs the subscriber; exports to OTLP when an endpoint is configured.
///
/// The returned guard must stay alive for the lifetime of the process.
pub fn setup_logging(config: &Config) -> Option<TelemetryGuard> {
    let level = config.log_level.as_str();

    if let Some(endpoint) = config.otel_endpoint.as_deref() {
        match TelemetryGuard::init(SERVICE_NAME, endpoint, level, config.environment) {
            Ok(guard) => return Some(guard),
            Err(e) => {
                common::setup_logging(level, config.environment);
                tracing::warn!(endpoint, error = %e, "OpenTelemetry export disabled");
                return None;
            }
        }
    }

    common::setup_logging(level, config.environment);
    None
}
