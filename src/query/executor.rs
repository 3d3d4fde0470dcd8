//! Request-scoped statement execution.
//!
//! Each call resolves the effective connection parameters, opens one
//! connection, runs one statement and closes the connection again on every
//! path that opened it.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::config::ConnectionConfig;
use crate::db::{Connector, QueryResult};
use crate::error::Result;
use crate::query::QueryRequest;

/// Executes one statement per request against a fresh connection.
pub struct QueryExecutor {
    connector: Arc<dyn Connector>,
    defaults: ConnectionConfig,
}

impl QueryExecutor {
    /// Creates a new query executor.
    pub fn new(connector: Arc<dyn Connector>, defaults: ConnectionConfig) -> Self {
        Self {
            connector,
            defaults,
        }
    }

    /// Runs the request's statement.
    ///
    /// Nothing is retried and no timeout is applied beyond the driver's own.
    /// A failure to close the connection is logged and never replaces the
    /// outcome of the statement.
    pub async fn execute(&self, request: &QueryRequest) -> Result<QueryResult> {
        let sql = request.statement()?;
        let config = request.connection.resolve(&self.defaults);
        let target = config.display_string();

        let start = Instant::now();
        let mut client = self.connector.connect(&config).await?;
        debug!("Connected to {} ({})", target, config.backend().as_str());

        let result = client.execute_query(sql).await;

        if let Err(e) = client.close().await {
            warn!("Failed to close connection to {}: {}", target, e);
        } else {
            debug!("Closed connection to {}", target);
        }

        let result = result?;

        info!(
            "Query on {} returned {} rows ({} affected) in {:?}",
            target,
            result.row_count(),
            result.rows_affected,
            start.elapsed()
        );

        Ok(result)
    }
}
