//! Query execution for the service.
//!
//! This module holds the request shape and the request-scoped executor
//! that the HTTP layer drives.

pub mod executor;
pub mod request;

pub use executor::QueryExecutor;
pub use request::{ConnectionParameters, QueryRequest};
