//! Connection targets and pool limits for the supported store kinds.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use super::DatabaseError;

/// Relational store backends the portal can run against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    /// Embedded SQLite file (the default for local development)
    Sqlite,
    /// PostgreSQL server
    Postgres,
}

impl StoreKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreKind::Sqlite => "sqlite",
            StoreKind::Postgres => "postgres",
        }
    }

    /// Pool limits used when the configuration leaves a value unset.
    pub fn default_limits(&self) -> PoolLimits {
        match self {
            StoreKind::Postgres => PoolLimits {
                max_open: 50,
                max_idle: 5,
                max_lifetime: Duration::from_secs(30 * 60),
                max_idle_lifetime: Duration::from_secs(5 * 60),
            },
            StoreKind::Sqlite => PoolLimits {
                max_open: 10,
                max_idle: 2,
                max_lifetime: Duration::from_secs(10 * 60),
                max_idle_lifetime: Duration::from_secs(5 * 60),
            },
        }
    }

    /// Bind placeholder for the `index`-th (1-based) statement parameter.
    pub fn placeholder(&self, index: usize) -> String {
        match self {
            StoreKind::Postgres => format!("${}", index),
            StoreKind::Sqlite => "?".to_string(),
        }
    }
}

impl FromStr for StoreKind {
    type Err = DatabaseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sqlite" | "sqlite3" => Ok(StoreKind::Sqlite),
            "postgres" | "postgresql" | "pg" => Ok(StoreKind::Postgres),
            other => Err(DatabaseError::InvalidTarget(format!(
                "unknown database kind '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for StoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where to connect, per store kind.
#[derive(Clone, PartialEq, Eq)]
pub enum ConnectTarget {
    Postgres {
        host: String,
        port: u16,
        user: String,
        password: String,
        database: String,
        /// Session time zone passed as a startup option
        timezone: Option<String>,
    },
    Sqlite {
        path: PathBuf,
    },
}

impl ConnectTarget {
    pub fn kind(&self) -> StoreKind {
        match self {
            ConnectTarget::Postgres { .. } => StoreKind::Postgres,
            ConnectTarget::Sqlite { .. } => StoreKind::Sqlite,
        }
    }

    /// DSN rendering with the credential masked, safe for logs.
    pub fn masked(&self) -> String {
        match self {
            ConnectTarget::Postgres {
                host,
                port,
                user,
                database,
                ..
            } => format!("postgres://{}:***@{}:{}/{}", user, host, port, database),
            ConnectTarget::Sqlite { path } => format!("sqlite://{}", path.display()),
        }
    }
}

// Manual impl keeps the password out of `{:?}` output.
impl fmt::Debug for ConnectTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ConnectTarget").field(&self.masked()).finish()
    }
}

/// Limits applied to the connection pool once the store is reachable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolLimits {
    /// Maximum open connections
    pub max_open: u32,
    /// Idle connections kept around; the monitor drops to zero while recovering
    pub max_idle: u32,
    /// Maximum lifetime of a single connection
    pub max_lifetime: Duration,
    /// Idle connections older than this are closed
    pub max_idle_lifetime: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_kind_parsing() {
        assert_eq!("sqlite".parse::<StoreKind>().unwrap(), StoreKind::Sqlite);
        assert_eq!("Postgres".parse::<StoreKind>().unwrap(), StoreKind::Postgres);
        assert_eq!("postgresql".parse::<StoreKind>().unwrap(), StoreKind::Postgres);
        assert!("mysql".parse::<StoreKind>().is_err());
    }

    #[test]
    fn test_masked_target_hides_password() {
        let target = ConnectTarget::Postgres {
            host: "db.internal".to_string(),
            port: 5432,
            user: "portal".to_string(),
            password: "secret123".to_string(),
            database: "news_portal".to_string(),
            timezone: None,
        };

        let masked = target.masked();
        assert!(masked.contains("***"));
        assert!(!masked.contains("secret123"));
        assert!(masked.contains("portal:"));
        assert!(masked.contains("@db.internal:5432"));
        assert!(!format!("{:?}", target).contains("secret123"));
    }

    #[test]
    fn test_default_limits_per_kind() {
        let pg = StoreKind::Postgres.default_limits();
        assert_eq!(pg.max_open, 50);
        assert_eq!(pg.max_idle, 5);

        let lite = StoreKind::Sqlite.default_limits();
        assert_eq!(lite.max_open, 10);
        assert_eq!(lite.max_idle, 2);
    }

    #[test]
    fn test_placeholders() {
        assert_eq!(StoreKind::Postgres.placeholder(3), "$3");
        assert_eq!(StoreKind::Sqlite.placeholder(3), "?");
    }
}
