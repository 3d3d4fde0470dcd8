//! End-to-end endpoint tests over real HTTP with a mock connector.

use std::sync::Arc;

use db_query_service::config::ConnectionConfig;
use db_query_service::db::{ColumnInfo, DatabaseBackend, MockConnector, QueryResult, Value};
use pretty_assertions::assert_eq;
use serde_json::json;

use super::TestServer;

fn defaults() -> ConnectionConfig {
    ConnectionConfig {
        backend: Some(DatabaseBackend::MySql),
        host: Some("db.local".to_string()),
        port: None,
        database: Some("app".to_string()),
        user: Some("svc".to_string()),
        password: Some("secret".to_string()),
    }
}

async fn start(connector: &MockConnector) -> TestServer {
    TestServer::start(Arc::new(connector.clone()), defaults()).await
}

#[tokio::test]
async fn test_select_returns_results() {
    let connector = MockConnector::new().with_result(QueryResult::with_data(
        vec![ColumnInfo::new("test", "BIGINT")],
        vec![vec![Value::Int(2)]],
    ));
    let server = start(&connector).await;

    let (status, body) = server.post(json!({"query": "SELECT 1+1 AS test;"})).await;

    assert_eq!(status, 200);
    assert_eq!(body, json!({"results": [{"test": 2}], "rowsAffected": 0}));
    server.stop().await;
}

#[tokio::test]
async fn test_rows_keep_column_order_and_types() {
    let connector = MockConnector::new().with_result(QueryResult::with_data(
        vec![
            ColumnInfo::new("id", "INT"),
            ColumnInfo::new("name", "VARCHAR"),
            ColumnInfo::new("score", "DOUBLE"),
            ColumnInfo::new("deleted_at", "DATETIME"),
        ],
        vec![
            vec![
                Value::Int(1),
                Value::String("ada".to_string()),
                Value::Float(9.5),
                Value::Null,
            ],
            vec![
                Value::Int(2),
                Value::String("linus".to_string()),
                Value::Float(7.25),
                Value::String("2024-01-02T03:04:05".to_string()),
            ],
        ],
    ));
    let server = start(&connector).await;

    let response = reqwest::Client::new()
        .post(server.url())
        .json(&json!({"query": "SELECT id, name, score, deleted_at FROM users"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);
    let text = response.text().await.unwrap();

    assert_eq!(
        text,
        r#"{"results":[{"id":1,"name":"ada","score":9.5,"deleted_at":null},{"id":2,"name":"linus","score":7.25,"deleted_at":"2024-01-02T03:04:05"}],"rowsAffected":0}"#
    );
    server.stop().await;
}

#[tokio::test]
async fn test_query_error_returns_500() {
    let connector =
        MockConnector::new().failing_query("Table 'app.missing_table' doesn't exist");
    let stats = connector.stats();
    let server = start(&connector).await;

    let (status, body) = server
        .post(json!({"query": "SELECT * FROM missing_table"}))
        .await;

    assert_eq!(status, 500);
    let message = body["error"].as_str().unwrap();
    assert!(message.starts_with("Database error: "));
    assert!(message.contains("missing_table"));
    assert_eq!(stats.open_connections(), 0);
    server.stop().await;
}

#[tokio::test]
async fn test_connection_error_returns_500() {
    let connector = MockConnector::new().failing_connect("Unknown database 'nonexistent_db'");
    let server = start(&connector).await;

    let (status, body) = server
        .post(json!({"database": "nonexistent_db", "query": "SELECT 1;"}))
        .await;

    assert_eq!(status, 500);
    assert!(body["error"].as_str().unwrap().contains("nonexistent_db"));
    server.stop().await;
}

#[tokio::test]
async fn test_empty_query_returns_500() {
    let connector = MockConnector::new();
    let stats = connector.stats();
    let server = start(&connector).await;

    let (status, body) = server.post(json!({"query": ""})).await;
    assert_eq!(status, 500);
    assert!(body["error"].as_str().unwrap().starts_with("Database error: "));

    let (status, _) = server.post(json!({"host": "db.local"})).await;
    assert_eq!(status, 500);

    assert!(stats.attempts().is_empty());
    server.stop().await;
}

#[tokio::test]
async fn test_malformed_body_returns_500() {
    let connector = MockConnector::new();
    let server = start(&connector).await;

    let (status, body) = server.post_raw("{\"query\": ", "application/json").await;
    assert_eq!(status, 500);
    assert!(body["error"].as_str().unwrap().starts_with("Database error: "));

    // Content type is not checked
    let (status, _) = server
        .post_raw(r#"{"query":"SELECT 1"}"#, "text/plain")
        .await;
    assert_eq!(status, 200);
    server.stop().await;
}

#[tokio::test]
async fn test_request_fields_override_defaults_individually() {
    let connector = MockConnector::new();
    let stats = connector.stats();
    let server = start(&connector).await;

    let (status, _) = server
        .post(json!({"database": "reports", "user": "", "query": "SELECT 1"}))
        .await;
    assert_eq!(status, 200);

    let attempt = stats.last_attempt().unwrap();
    assert_eq!(attempt.database.as_deref(), Some("reports"));
    assert_eq!(attempt.user.as_deref(), Some("svc"));
    assert_eq!(attempt.host.as_deref(), Some("db.local"));
    assert_eq!(attempt.password.as_deref(), Some("secret"));
    server.stop().await;
}

#[tokio::test]
async fn test_repeated_requests_release_connections() {
    let connector = MockConnector::new();
    let stats = connector.stats();
    let server = start(&connector).await;

    let mut bodies = Vec::new();
    for _ in 0..5 {
        let (status, body) = server.post(json!({"query": "SELECT 1"})).await;
        assert_eq!(status, 200);
        bodies.push(body);
    }

    assert!(bodies.windows(2).all(|pair| pair[0] == pair[1]));
    assert_eq!(stats.opened(), 5);
    assert_eq!(stats.closed(), 5);
    server.stop().await;
}

#[tokio::test]
async fn test_other_methods_are_not_routed() {
    let connector = MockConnector::new();
    let server = start(&connector).await;

    let response = reqwest::Client::new().get(server.url()).send().await.unwrap();
    assert_eq!(response.status().as_u16(), 405);
    server.stop().await;
}
