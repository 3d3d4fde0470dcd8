//! Query service - runs SQL statements posted over HTTP.
//!
//! This library exposes the core modules for use in integration tests.

pub mod cli;
pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod query;
pub mod server;
