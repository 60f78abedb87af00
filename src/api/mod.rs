//! API layer - operational HTTP endpoints.

mod health;
mod metrics;
mod routes;

pub use health::{health, ready, DatabaseHealthResponse, HealthResponse, ReadyResponse};
pub use metrics::prometheus_metrics;
pub use routes::api_routes;
