//! Idempotent schema provisioning for articles and users.

use std::time::Duration;

use super::{with_deadline, ManagedPool, StoreKind};

const POSTGRES_SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS articles (
        id SERIAL PRIMARY KEY,
        title VARCHAR(255) NOT NULL,
        content TEXT NOT NULL,
        category VARCHAR(100) NOT NULL,
        author VARCHAR(100) NOT NULL,
        image VARCHAR(255),
        created TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
        featured BOOLEAN DEFAULT FALSE
    )",
    "CREATE INDEX IF NOT EXISTS idx_articles_category ON articles(category)",
    "CREATE INDEX IF NOT EXISTS idx_articles_featured ON articles(featured)",
    "CREATE INDEX IF NOT EXISTS idx_articles_created ON articles(created DESC)",
    "CREATE TABLE IF NOT EXISTS users (
        id SERIAL PRIMARY KEY,
        name VARCHAR(100) NOT NULL,
        email VARCHAR(100) UNIQUE NOT NULL,
        password_hash VARCHAR(255) NOT NULL,
        created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
        updated_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
    )",
    "CREATE INDEX IF NOT EXISTS idx_users_email ON users(email)",
];

const SQLITE_SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS articles (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        title TEXT NOT NULL,
        content TEXT NOT NULL,
        category TEXT NOT NULL,
        author TEXT NOT NULL,
        image TEXT,
        created DATETIME DEFAULT CURRENT_TIMESTAMP,
        featured BOOLEAN DEFAULT 0
    )",
    "CREATE INDEX IF NOT EXISTS idx_articles_category ON articles(category)",
    "CREATE INDEX IF NOT EXISTS idx_articles_featured ON articles(featured)",
    "CREATE INDEX IF NOT EXISTS idx_articles_created ON articles(created DESC)",
    "CREATE TABLE IF NOT EXISTS users (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        email TEXT UNIQUE NOT NULL,
        password_hash TEXT NOT NULL,
        created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
        updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
    )",
    "CREATE INDEX IF NOT EXISTS idx_users_email ON users(email)",
];

impl StoreKind {
    /// Create-if-absent statements in this kind's dialect.
    pub fn schema_statements(&self) -> &'static [&'static str] {
        match self {
            StoreKind::Postgres => POSTGRES_SCHEMA,
            StoreKind::Sqlite => SQLITE_SCHEMA,
        }
    }
}

/// Outcome of a schema pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchemaReport {
    pub applied: usize,
    pub failed: usize,
}

impl SchemaReport {
    pub fn is_clean(&self) -> bool {
        self.failed == 0
    }
}

/// Ensure the required tables and indexes exist.
///
/// Safe against an already provisioned store. Failing statements are logged
/// as warnings and counted, never returned as errors.
pub async fn ensure_schema<P: ManagedPool + ?Sized>(
    pool: &P,
    kind: StoreKind,
    statement_timeout: Duration,
) -> SchemaReport {
    let mut report = SchemaReport::default();

    for statement in kind.schema_statements() {
        match with_deadline("schema statement", statement_timeout, pool.execute(statement)).await {
            Ok(_) => report.applied += 1,
            Err(e) => {
                report.failed += 1;
                tracing::warn!(
                    kind = %kind,
                    error = %e,
                    statement = %first_line(statement),
                    "Error creating schema, continuing"
                );
            }
        }
    }

    if report.is_clean() {
        tracing::info!(kind = %kind, statements = report.applied, "Database schema ready");
    } else {
        tracing::warn!(
            kind = %kind,
            applied = report.applied,
            failed = report.failed,
            "Database schema partially applied"
        );
    }

    report
}

fn first_line(statement: &str) -> &str {
    statement.lines().next().unwrap_or(statement).trim()
}
