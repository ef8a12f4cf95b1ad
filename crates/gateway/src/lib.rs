pub mod annotate;
pub mod config;
pub mod error;
pub mod history;
pub mod logging;
pub mod metrics;
pub mod normalizer;
pub mod pipeline;
pub mod routes;
pub mod server;
pub mod state;

pub use error::ApiError;
pub use server::router;
pub use state::AppState;
