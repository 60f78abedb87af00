// Infrastructure layer (shared components)
pub mod infrastructure;

// Re-export infrastructure modules at the crate root
pub use infrastructure::config;
pub use infrastructure::database;
pub use infrastructure::error;
pub use infrastructure::metrics;

// Application layer
pub mod api;
pub mod server;

// Supporting modules
pub mod telemetry;
