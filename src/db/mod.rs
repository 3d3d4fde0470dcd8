//! Database abstraction layer for the query service.
//!
//! Provides a trait-based interface for opening a single connection,
//! running one statement on it and closing it again, so that different
//! database backends (and test doubles) can be used interchangeably.

mod mock;
mod mysql;
mod postgres;
mod types;

pub use mock::{ConnectionStats, MockConnector, MockDatabaseClient};
pub use mysql::MySqlClient;
pub use postgres::PostgresClient;
pub use types::{ColumnInfo, QueryResult, Record, Records, Row, Value};

use crate::config::ConnectionConfig;
use crate::error::Result;
use async_trait::async_trait;

/// Supported database backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseBackend {
    #[default]
    MySql,
    Postgres,
}

impl DatabaseBackend {
    /// Returns the backend as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MySql => "mysql",
            Self::Postgres => "postgres",
        }
    }

    /// Parses a backend from a string (also accepts URL schemes).
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "mysql" | "mariadb" => Some(Self::MySql),
            "postgres" | "postgresql" => Some(Self::Postgres),
            _ => None,
        }
    }

    /// Returns the default port for this backend.
    pub fn default_port(&self) -> u16 {
        match self {
            Self::MySql => 3306,
            Self::Postgres => 5432,
        }
    }
}

/// Opens a single connection for the backend named in the configuration.
///
/// This is the central factory function for database connections.
pub async fn connect(config: &ConnectionConfig) -> Result<Box<dyn DatabaseClient>> {
    match config.backend() {
        DatabaseBackend::MySql => {
            let client = MySqlClient::connect(config).await?;
            Ok(Box::new(client))
        }
        DatabaseBackend::Postgres => {
            let client = PostgresClient::connect(config).await?;
            Ok(Box::new(client))
        }
    }
}

/// An open, unpooled database session.
///
/// A client is owned by exactly one request. `close` consumes it, so a
/// session can be released at most once.
#[async_trait]
pub trait DatabaseClient: Send {
    /// Executes a SQL statement verbatim and returns every row it produced.
    async fn execute_query(&mut self, sql: &str) -> Result<QueryResult>;

    /// Closes the database connection.
    async fn close(self: Box<Self>) -> Result<()>;
}

/// Opens database sessions from effective connection parameters.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Opens one new connection. Nothing is pooled or reused.
    async fn connect(&self, config: &ConnectionConfig) -> Result<Box<dyn DatabaseClient>>;
}

/// Connector backed by the real database drivers.
#[derive(Debug, Clone, Copy, Default)]
pub struct DriverConnector;

#[async_trait]
impl Connector for DriverConnector {
    async fn connect(&self, config: &ConnectionConfig) -> Result<Box<dyn DatabaseClient>> {
        connect(config).await
    }
}
