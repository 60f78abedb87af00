use std::time::Duration;

use thiserror::Error;

/// Errors that can occur while managing the database connection.
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("SQLx error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("{operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    #[error("Invalid connection target: {0}")]
    InvalidTarget(String),

    /// Retry budget exhausted during startup. Not recoverable.
    #[error("Failed to connect to database after {attempts} attempts: {last_error}")]
    ConnectFailed { attempts: u32, last_error: String },
}

impl DatabaseError {
    /// Whether this error aborts startup rather than triggering another attempt.
    pub fn is_fatal(&self) -> bool {
        matches!(self, DatabaseError::ConnectFailed { .. })
    }
}

/// Run `fut` under a deadline, mapping expiry to [`DatabaseError::Timeout`].
pub(crate) async fn with_deadline<T, F>(
    operation: &'static str,
    after: Duration,
    fut: F,
) -> Result<T, DatabaseError>
where
    F: std::future::Future<Output = Result<T, DatabaseError>>,
{
    match tokio::time::timeout(after, fut).await {
        Ok(result) => result,
        Err(_) => Err(DatabaseError::Timeout { operation, after }),
    }
}
