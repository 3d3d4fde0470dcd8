//! HTTP surface of the query service.
//!
//! Exposes a single `POST /api/query` endpoint. Success answers with
//! `{"results": [...], "rowsAffected": n}`, every failure with status 500
//! and `{"error": "Database error: ..."}`.

use std::future::Future;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde::Serialize;
use tokio::net::TcpListener;
use tracing::{error, info};

use crate::db::Records;
use crate::error::ServiceError;
use crate::query::{QueryExecutor, QueryRequest};

/// Path of the query endpoint.
pub const QUERY_PATH: &str = "/api/query";

/// Prefix of every error message sent to clients.
pub const ERROR_PREFIX: &str = "Database error: ";

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub executor: Arc<QueryExecutor>,
}

/// Successful response body.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResponse<'a> {
    pub results: Records<'a>,
    pub rows_affected: u64,
}

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            error: format!("{ERROR_PREFIX}{self}"),
        };
        (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
    }
}

/// Builds the application router.
pub fn router(executor: Arc<QueryExecutor>) -> Router {
    Router::new()
        .route(QUERY_PATH, post(query_handler))
        .with_state(AppState { executor })
}

/// Handles `POST /api/query`.
///
/// The body is parsed here rather than through the `Json` extractor so a
/// malformed body gets the same error shape as a failed statement.
pub async fn query_handler(State(state): State<AppState>, body: Bytes) -> Response {
    let request: QueryRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            let err = ServiceError::invalid_request(format!("Malformed request body: {e}"));
            error!("{}: {}", err.category(), err);
            return err.into_response();
        }
    };

    match state.executor.execute(&request).await {
        Ok(result) => {
            let body = QueryResponse {
                results: result.records(),
                rows_affected: result.rows_affected,
            };
            (StatusCode::OK, Json(body)).into_response()
        }
        Err(e) => {
            error!("{}: {}", e.category(), e);
            e.into_response()
        }
    }
}

/// Serves the router on `listener` until ctrl-c or SIGTERM.
pub async fn serve(listener: TcpListener, executor: Arc<QueryExecutor>) -> std::io::Result<()> {
    serve_with_shutdown(listener, executor, shutdown_signal()).await
}

/// Serves the router on `listener` until `signal` resolves.
///
/// In-flight requests finish before this returns.
pub async fn serve_with_shutdown<F>(
    listener: TcpListener,
    executor: Arc<QueryExecutor>,
    signal: F,
) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        info!("Listening on http://{}{}", addr, QUERY_PATH);
    }

    axum::serve(listener, router(executor))
        .with_graceful_shutdown(signal)
        .await
}

/// Resolves on ctrl-c, or on SIGTERM where supported.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to install ctrl-c handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, draining in-flight requests");
}
