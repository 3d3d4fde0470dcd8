//! Mock database connector for testing.
//!
//! Records every connection attempt and counts opens and closes, so tests
//! can check that each request releases its connection exactly once.

use super::{ColumnInfo, Connector, DatabaseClient, QueryResult, Value};
use crate::config::ConnectionConfig;
use crate::error::{Result, ServiceError};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Counters shared between a [`MockConnector`] and the clients it hands out.
#[derive(Debug, Default)]
pub struct ConnectionStats {
    opened: AtomicUsize,
    closed: AtomicUsize,
    executed: Mutex<Vec<String>>,
    attempts: Mutex<Vec<ConnectionConfig>>,
}

impl ConnectionStats {
    /// Number of connections successfully opened.
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    /// Number of `close` calls, failed ones included.
    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    /// Connections opened but never closed.
    pub fn open_connections(&self) -> usize {
        self.opened().saturating_sub(self.closed())
    }

    /// Statements executed, in order.
    pub fn executed(&self) -> Vec<String> {
        self.executed
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Effective parameters of every connection attempt, in order.
    pub fn attempts(&self) -> Vec<ConnectionConfig> {
        self.attempts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Effective parameters of the most recent connection attempt.
    pub fn last_attempt(&self) -> Option<ConnectionConfig> {
        self.attempts().pop()
    }
}

/// A connector that hands out [`MockDatabaseClient`]s and can be told to
/// fail at any stage of the connection lifecycle.
#[derive(Debug, Clone, Default)]
pub struct MockConnector {
    stats: Arc<ConnectionStats>,
    result: Option<QueryResult>,
    connect_error: Option<String>,
    query_error: Option<String>,
    close_error: Option<String>,
}

impl MockConnector {
    /// Creates a connector whose connections always succeed.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns this result for every statement instead of the default echo.
    pub fn with_result(mut self, result: QueryResult) -> Self {
        self.result = Some(result);
        self
    }

    /// Makes every connection attempt fail with the given driver message.
    pub fn failing_connect(mut self, message: impl Into<String>) -> Self {
        self.connect_error = Some(message.into());
        self
    }

    /// Makes every statement fail with the given driver message.
    pub fn failing_query(mut self, message: impl Into<String>) -> Self {
        self.query_error = Some(message.into());
        self
    }

    /// Makes every close fail with the given driver message.
    pub fn failing_close(mut self, message: impl Into<String>) -> Self {
        self.close_error = Some(message.into());
        self
    }

    /// Returns the shared counters.
    pub fn stats(&self) -> Arc<ConnectionStats> {
        Arc::clone(&self.stats)
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, config: &ConnectionConfig) -> Result<Box<dyn DatabaseClient>> {
        self.stats
            .attempts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(config.clone());

        if let Some(message) = &self.connect_error {
            return Err(ServiceError::connection(message.clone()));
        }

        self.stats.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockDatabaseClient {
            stats: Arc::clone(&self.stats),
            result: self.result.clone(),
            query_error: self.query_error.clone(),
            close_error: self.close_error.clone(),
        }))
    }
}

/// A mock database client that returns predefined results.
#[derive(Debug, Default)]
pub struct MockDatabaseClient {
    stats: Arc<ConnectionStats>,
    result: Option<QueryResult>,
    query_error: Option<String>,
    close_error: Option<String>,
}

impl MockDatabaseClient {
    /// Creates a standalone mock client.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DatabaseClient for MockDatabaseClient {
    async fn execute_query(&mut self, sql: &str) -> Result<QueryResult> {
        self.stats
            .executed
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(sql.to_string());

        if let Some(message) = &self.query_error {
            return Err(ServiceError::query(message.clone()));
        }

        if let Some(result) = &self.result {
            return Ok(result.clone());
        }

        if sql.trim_start().to_uppercase().starts_with("SELECT") {
            // Echo the statement back as a single row
            Ok(QueryResult::with_data(
                vec![ColumnInfo::new("result", "VARCHAR")],
                vec![vec![Value::String(format!("Mock result for: {sql}"))]],
            ))
        } else {
            // For non-SELECT statements, report one affected row
            Ok(QueryResult::new().with_rows_affected(1))
        }
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.stats.closed.fetch_add(1, Ordering::SeqCst);
        match &self.close_error {
            Some(message) => Err(ServiceError::connection(message.clone())),
            None => Ok(()),
        }
    }
}
