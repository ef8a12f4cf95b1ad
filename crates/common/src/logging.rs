use crate::config::Environment;
use tracing_subscriber::{Layer, Registry, layer::Identity, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize tracing subscriber with pretty formatting for development
/// and JSON formatting for production.
///
/// `RUST_LOG` takes precedence; `default_level` is used when it is not set.
pub fn setup_logging(default_level: &str, environment: Environment) {
    install(default_level, environment, Identity::new());
}

/// Installs the global subscriber with `extra` as the innermost layer
/// (the OpenTelemetry bridge when telemetry is enabled).
pub(crate) fn install<L>(default_level: &str, environment: Environment, extra: L)
where
    L: Layer<Registry> + Send + Sync + 'static,
{
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    let registry = tracing_subscriber::registry().with(extra).with(env_filter);

    match environment {
        Environment::Production => {
            registry
                .with(tracing_subscriber::fmt::layer().json().with_level(true))
                .init();
        }
        Environment::Development => {
            registry
                .with(tracing_subscriber::fmt::layer().pretty().with_ansi(true))
                .init();
        }
    }
}
