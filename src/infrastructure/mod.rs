//! Infrastructure layer modules
//!
//! This module contains shared infrastructure components:
//! - `config`: Application configuration and settings
//! - `database`: Store connection lifecycle, schema and health monitoring
//! - `error`: Unified error types
//! - `metrics`: Prometheus metrics helpers

pub mod config;
pub mod database;
pub mod error;
pub mod metrics;
