//! MySQL database client implementation.
//!
//! Provides the `MySqlClient` struct that implements the `DatabaseClient` trait
//! over a single, unpooled sqlx connection.

use crate::config::ConnectionConfig;
use crate::db::types::temporal;
use crate::db::{ColumnInfo, DatabaseClient, QueryResult, Row, Value};
use crate::error::{Result, ServiceError};
use async_trait::async_trait;
use futures::TryStreamExt;
use sqlx::mysql::{MySql, MySqlConnectOptions, MySqlConnection, MySqlRow};
use sqlx::types::chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use sqlx::{Column as SqlxColumn, Connection, Decode, Either, Executor, Row as SqlxRow, Type, TypeInfo};
use tracing::debug;

/// MySQL database client owning exactly one connection.
#[derive(Debug)]
pub struct MySqlClient {
    conn: MySqlConnection,
}

impl MySqlClient {
    /// Opens a new connection using the given parameters.
    ///
    /// Fields left unset fall through to the driver defaults
    /// (`localhost`, user `root`, no password, no default schema).
    pub async fn connect(config: &ConnectionConfig) -> Result<Self> {
        let conn = MySqlConnection::connect_with(&connect_options(config))
            .await
            .map_err(|e| ServiceError::connection(format_error(&e)))?;

        debug!("Opened MySQL connection to {}", config.display_string());
        Ok(Self { conn })
    }
}

#[async_trait]
impl DatabaseClient for MySqlClient {
    async fn execute_query(&mut self, sql: &str) -> Result<QueryResult> {
        let mut columns = Vec::new();
        let mut rows: Vec<Row> = Vec::new();
        let mut rows_affected = 0;

        let mut results = (&mut self.conn).fetch_many(sqlx::query(sql));
        while let Some(step) = results
            .try_next()
            .await
            .map_err(|e| ServiceError::query(format_error(&e)))?
        {
            match step {
                Either::Left(done) => rows_affected += done.rows_affected(),
                Either::Right(row) => {
                    if columns.is_empty() {
                        columns = column_info(&row);
                    }
                    rows.push(convert_row(&row, &columns));
                }
            }
        }

        Ok(QueryResult {
            columns,
            rows,
            rows_affected,
        })
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.conn
            .close()
            .await
            .map_err(|e| ServiceError::connection(format!("Failed to close connection: {e}")))
    }
}

/// Builds connect options that leave the server's session state alone:
/// no extra `sql_mode` flags and no forced `time_zone`.
fn connect_options(config: &ConnectionConfig) -> MySqlConnectOptions {
    let mut options = MySqlConnectOptions::new()
        .port(config.port())
        .pipes_as_concat(false)
        .no_engine_substitution(false)
        .timezone(None::<String>);

    if let Some(host) = &config.host {
        options = options.host(host);
    }
    if let Some(user) = &config.user {
        options = options.username(user);
    }
    if let Some(password) = &config.password {
        options = options.password(password);
    }
    if let Some(database) = &config.database {
        options = options.database(database);
    }

    options
}

fn column_info(row: &MySqlRow) -> Vec<ColumnInfo> {
    row.columns()
        .iter()
        .map(|col| ColumnInfo::new(col.name(), col.type_info().name()))
        .collect()
}

/// Converts a sqlx MySqlRow to our Row type.
fn convert_row(row: &MySqlRow, columns: &[ColumnInfo]) -> Row {
    columns
        .iter()
        .enumerate()
        .map(|(i, column)| convert_value(row, i, &column.data_type))
        .collect()
}

fn decode<'r, T>(row: &'r MySqlRow, index: usize) -> Option<T>
where
    T: Decode<'r, MySql> + Type<MySql>,
{
    row.try_get::<Option<T>, _>(index).ok().flatten()
}

/// Decodes without the driver's type compatibility check. Used where the
/// wire format is text or raw bytes but no Rust type claims the column type.
fn decode_unchecked<'r, T>(row: &'r MySqlRow, index: usize) -> Option<T>
where
    T: Decode<'r, MySql>,
{
    row.try_get_unchecked::<Option<T>, _>(index).ok().flatten()
}

/// Converts a single column value from a MySqlRow to our Value type.
fn convert_value(row: &MySqlRow, index: usize, type_name: &str) -> Value {
    let value = match type_name {
        "NULL" => None,

        "BOOLEAN" => decode::<bool>(row, index)
            .map(Value::Bool)
            .or_else(|| decode::<i64>(row, index).map(Value::Int)),

        "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" => {
            decode::<i64>(row, index).map(Value::Int)
        }

        unsigned if unsigned.ends_with("UNSIGNED") => decode::<u64>(row, index).map(Value::UInt),

        "YEAR" => decode_unchecked::<u16>(row, index).map(|y| Value::Int(y as i64)),

        "FLOAT" => decode::<f32>(row, index).map(|v| Value::Float(v as f64)),

        "DOUBLE" => decode::<f64>(row, index).map(Value::Float),

        // Sent as text; keep it as text to preserve precision
        "DECIMAL" => decode_unchecked::<String>(row, index).map(Value::String),

        // Zero dates and out-of-range TIME values have no chrono equivalent
        "DATE" => decode::<NaiveDate>(row, index)
            .map(temporal::date)
            .or_else(|| raw_bytes(row, index).and_then(|raw| raw_date(raw, false)))
            .map(Value::String),

        "TIME" => decode::<NaiveTime>(row, index)
            .map(temporal::time)
            .or_else(|| raw_bytes(row, index).and_then(raw_time))
            .map(Value::String),

        "DATETIME" | "TIMESTAMP" => decode::<NaiveDateTime>(row, index)
            .map(temporal::datetime)
            .or_else(|| raw_bytes(row, index).and_then(|raw| raw_date(raw, true)))
            .map(Value::String),

        "JSON" => decode::<serde_json::Value>(row, index)
            .map(Value::Json)
            .or_else(|| decode_unchecked::<String>(row, index).map(Value::String)),

        "BINARY" | "VARBINARY" | "TINYBLOB" | "BLOB" | "MEDIUMBLOB" | "LONGBLOB" | "BIT"
        | "GEOMETRY" => decode::<Vec<u8>>(row, index)
            .or_else(|| decode_unchecked::<Vec<u8>>(row, index))
            .map(Value::Bytes),

        // CHAR, VARCHAR, TEXT, ENUM, SET and anything else textual
        _ => decode::<String>(row, index)
            .or_else(|| decode_unchecked::<String>(row, index))
            .map(Value::String),
    };

    value.unwrap_or(Value::Null)
}

fn raw_bytes(row: &MySqlRow, index: usize) -> Option<&[u8]> {
    row.try_get_unchecked::<Option<&[u8]>, _>(index)
        .ok()
        .flatten()
}

/// Splits a binary-protocol temporal value into its payload, or returns
/// `None` when the value is not length-prefixed (text protocol).
fn binary_payload(raw: &[u8]) -> Option<&[u8]> {
    let (len, payload) = raw.split_first()?;
    (*len as usize == payload.len()).then_some(payload)
}

fn fraction(micros: u32) -> String {
    if micros == 0 {
        String::new()
    } else {
        format!(".{micros:06}")
    }
}

/// Formats a DATE, DATETIME or TIMESTAMP the driver could not decode.
///
/// Binary layout: year (u16 LE), month, day, then optionally hour,
/// minute, second and microseconds (u32 LE). An empty payload is the
/// zero date.
fn raw_date(raw: &[u8], with_time: bool) -> Option<String> {
    let Some(payload) = binary_payload(raw) else {
        return std::str::from_utf8(raw).ok().map(String::from);
    };

    let byte = |at: usize| payload.get(at).copied().unwrap_or(0);
    let year = u16::from_le_bytes([byte(0), byte(1)]);
    let date = format!("{:04}-{:02}-{:02}", year, byte(2), byte(3));
    if !with_time {
        return Some(date);
    }

    let micros = u32::from_le_bytes([byte(7), byte(8), byte(9), byte(10)]);
    Some(format!(
        "{}T{:02}:{:02}:{:02}{}",
        date,
        byte(4),
        byte(5),
        byte(6),
        fraction(micros)
    ))
}

/// Formats a TIME the driver could not decode (negative, or 24 hours and
/// more, up to `838:59:59`).
///
/// Binary layout: negative flag, days (u32 LE), hour, minute, second and
/// optionally microseconds (u32 LE).
fn raw_time(raw: &[u8]) -> Option<String> {
    let Some(payload) = binary_payload(raw) else {
        return std::str::from_utf8(raw).ok().map(String::from);
    };

    let byte = |at: usize| payload.get(at).copied().unwrap_or(0);
    let sign = if byte(0) == 1 { "-" } else { "" };
    let days = u32::from_le_bytes([byte(1), byte(2), byte(3), byte(4)]);
    let hours = u64::from(days) * 24 + u64::from(byte(5));
    let micros = u32::from_le_bytes([byte(8), byte(9), byte(10), byte(11)]);

    Some(format!(
        "{}{:02}:{:02}:{:02}{}",
        sign,
        hours,
        byte(6),
        byte(7),
        fraction(micros)
    ))
}

/// Returns the driver's message, without sqlx's generic wrapper for
/// server-side errors (e.g. `1146 (42S02): Table 'app.t' doesn't exist`).
fn format_error(error: &sqlx::Error) -> String {
    match error.as_database_error() {
        Some(db_error) => db_error.to_string(),
        None => error.to_string(),
    }
}
