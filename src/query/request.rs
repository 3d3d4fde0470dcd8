//! Incoming query requests and per-field connection parameter fallback.

use crate::config::ConnectionConfig;
use crate::error::{Result, ServiceError};
use serde::Deserialize;
use std::fmt;

/// Connection parameters a caller may supply with a request.
#[derive(Clone, Default, Deserialize, PartialEq, Eq)]
pub struct ConnectionParameters {
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub database: Option<String>,
}

impl fmt::Debug for ConnectionParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionParameters")
            .field("host", &self.host)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("database", &self.database)
            .finish()
    }
}

impl ConnectionParameters {
    /// Builds the effective connection parameters.
    ///
    /// Each of host, user, password and database is taken from the request
    /// when present and non-empty, otherwise from `defaults`. Backend and
    /// port always come from `defaults`.
    pub fn resolve(&self, defaults: &ConnectionConfig) -> ConnectionConfig {
        ConnectionConfig {
            backend: defaults.backend,
            host: pick(&self.host, &defaults.host),
            port: defaults.port,
            database: pick(&self.database, &defaults.database),
            user: pick(&self.user, &defaults.user),
            password: pick(&self.password, &defaults.password),
        }
    }
}

fn pick(requested: &Option<String>, fallback: &Option<String>) -> Option<String> {
    match requested.as_deref() {
        Some(value) if !value.is_empty() => Some(value.to_string()),
        _ => fallback.clone(),
    }
}

/// Body of `POST /api/query`.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct QueryRequest {
    #[serde(flatten)]
    pub connection: ConnectionParameters,

    /// The SQL statement, executed verbatim.
    #[serde(default)]
    pub query: Option<String>,
}

impl QueryRequest {
    /// Creates a request that relies on the configured defaults.
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            connection: ConnectionParameters::default(),
            query: Some(query.into()),
        }
    }

    /// Overrides the connection parameters.
    pub fn with_connection(mut self, connection: ConnectionParameters) -> Self {
        self.connection = connection;
        self
    }

    /// Returns the statement text, rejecting a missing or empty one.
    ///
    /// Anything else, whitespace included, is left for the server to judge.
    pub fn statement(&self) -> Result<&str> {
        match self.query.as_deref() {
            Some(sql) if !sql.is_empty() => Ok(sql),
            _ => Err(ServiceError::invalid_request("query must not be empty")),
        }
    }
}
