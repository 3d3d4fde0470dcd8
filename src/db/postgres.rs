//! PostgreSQL database client implementation.
//!
//! Provides the `PostgresClient` struct that implements the `DatabaseClient` trait
//! for PostgreSQL databases using sqlx.

use crate::config::ConnectionConfig;
use crate::db::types::temporal;
use crate::db::{ColumnInfo, DatabaseClient, QueryResult, Row, Value};
use crate::error::{Result, ServiceError};
use async_trait::async_trait;
use futures::TryStreamExt;
use sqlx::postgres::types::{Oid, PgInterval, PgMoney, PgTimeTz};
use sqlx::postgres::{PgConnectOptions, PgConnection, PgRow, Postgres};
use sqlx::types::chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use sqlx::types::ipnetwork::IpNetwork;
use sqlx::types::mac_address::MacAddress;
use sqlx::types::Uuid;
use sqlx::{Column as SqlxColumn, Connection, Decode, Either, Executor, Row as SqlxRow, Type, TypeInfo};
use tracing::debug;

/// PostgreSQL database client owning exactly one connection.
#[derive(Debug)]
pub struct PostgresClient {
    conn: PgConnection,
}

impl PostgresClient {
    /// Opens a new connection using the given parameters.
    ///
    /// Fields left unset follow libpq conventions (`PGHOST`, `PGUSER`, ...).
    pub async fn connect(config: &ConnectionConfig) -> Result<Self> {
        let conn = PgConnection::connect_with(&connect_options(config))
            .await
            .map_err(|e| ServiceError::connection(format_error(&e)))?;

        debug!("Opened PostgreSQL connection to {}", config.display_string());
        Ok(Self { conn })
    }
}

#[async_trait]
impl DatabaseClient for PostgresClient {
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
                        columns = row
                            .columns()
                            .iter()
                            .map(|col| ColumnInfo::new(col.name(), col.type_info().name()))
                            .collect();
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

fn connect_options(config: &ConnectionConfig) -> PgConnectOptions {
    let mut options = PgConnectOptions::new().port(config.port());

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

/// Converts a sqlx PgRow to our Row type.
fn convert_row(row: &PgRow, columns: &[ColumnInfo]) -> Row {
    columns
        .iter()
        .enumerate()
        .map(|(i, column)| convert_value(row, i, &column.data_type))
        .collect()
}

fn decode<'r, T>(row: &'r PgRow, index: usize) -> Option<T>
where
    T: Decode<'r, Postgres> + Type<Postgres>,
{
    row.try_get::<Option<T>, _>(index).ok().flatten()
}

/// Decodes a one-dimensional array into a JSON array, mapping each
/// element the same way a scalar column would be.
fn array<'r, T, F>(row: &'r PgRow, index: usize, element: F) -> Option<Value>
where
    Vec<Option<T>>: Decode<'r, Postgres> + Type<Postgres>,
    F: Fn(T) -> Value,
{
    let items = decode::<Vec<Option<T>>>(row, index)?;
    let items = items
        .into_iter()
        .map(|item| {
            let value = item.map(&element).unwrap_or(Value::Null);
            serde_json::to_value(&value).unwrap_or(serde_json::Value::Null)
        })
        .collect();
    Some(Value::Json(serde_json::Value::Array(items)))
}

fn raw(row: &PgRow, index: usize) -> Option<Vec<u8>> {
    row.try_get_unchecked::<Option<Vec<u8>>, _>(index)
        .ok()
        .flatten()
}

/// Converts a single column value from a PgRow to our Value type.
fn convert_value(row: &PgRow, index: usize, type_name: &str) -> Value {
    let value = match type_name.to_uppercase().as_str() {
        "BOOL" | "BOOLEAN" => decode::<bool>(row, index).map(Value::Bool),

        "INT2" | "SMALLINT" => decode::<i16>(row, index).map(|v| Value::Int(v as i64)),

        "INT4" | "INT" | "INTEGER" => decode::<i32>(row, index).map(|v| Value::Int(v as i64)),

        "INT8" | "BIGINT" => decode::<i64>(row, index).map(Value::Int),

        "OID" => decode::<Oid>(row, index).map(|v| Value::UInt(v.0 as u64)),

        "FLOAT4" | "REAL" => decode::<f32>(row, index).map(|v| Value::Float(v as f64)),

        "FLOAT8" | "DOUBLE PRECISION" => decode::<f64>(row, index).map(Value::Float),

        // Raw binary NUMERIC, rendered as decimal text
        "NUMERIC" => raw(row, index)
            .and_then(|raw| numeric_to_string(&raw))
            .map(Value::String),

        "BYTEA" => decode::<Vec<u8>>(row, index).map(Value::Bytes),

        "DATE" => decode::<NaiveDate>(row, index).map(|v| Value::String(temporal::date(v))),

        "TIME" => decode::<NaiveTime>(row, index).map(|v| Value::String(temporal::time(v))),

        "TIMESTAMP" => {
            decode::<NaiveDateTime>(row, index).map(|v| Value::String(temporal::datetime(v)))
        }

        "TIMESTAMPTZ" => {
            decode::<DateTime<Utc>>(row, index).map(|v| Value::String(temporal::datetime_utc(v)))
        }

        "JSON" | "JSONB" => decode::<serde_json::Value>(row, index).map(Value::Json),

        "UUID" => decode::<Uuid>(row, index).map(|v| Value::String(v.to_string())),

        "TIMETZ" => decode::<PgTimeTz<NaiveTime, FixedOffset>>(row, index)
            .map(|v| Value::String(format!("{}{}", temporal::time(v.time), v.offset))),

        "INTERVAL" => {
            decode::<PgInterval>(row, index).map(|v| Value::String(interval_to_string(&v)))
        }

        "INET" | "CIDR" => decode::<IpNetwork>(row, index)
            .map(|v| Value::String(network_to_string(&v, type_name == "INET"))),

        "MACADDR" => {
            decode::<MacAddress>(row, index).map(|v| Value::String(v.to_string().to_lowercase()))
        }

        "MONEY" => decode::<PgMoney>(row, index).map(|v| Value::String(money_to_string(v))),

        // The single-byte "char" type
        "\"CHAR\"" => {
            decode::<i8>(row, index).map(|v| Value::String((v as u8 as char).to_string()))
        }

        "BIT" | "VARBIT" => raw(row, index)
            .and_then(|raw| bits_to_string(&raw))
            .map(Value::String),

        "BOOL[]" => array::<bool, _>(row, index, Value::Bool),
        "INT2[]" => array::<i16, _>(row, index, |v| Value::Int(v as i64)),
        "INT4[]" => array::<i32, _>(row, index, |v| Value::Int(v as i64)),
        "INT8[]" => array::<i64, _>(row, index, Value::Int),
        "FLOAT4[]" => array::<f32, _>(row, index, |v| Value::Float(v as f64)),
        "FLOAT8[]" => array::<f64, _>(row, index, Value::Float),
        "TEXT[]" | "VARCHAR[]" | "BPCHAR[]" | "NAME[]" => {
            array::<String, _>(row, index, Value::String)
        }
        "UUID[]" => array::<Uuid, _>(row, index, |v| Value::String(v.to_string())),
        "JSON[]" | "JSONB[]" => array::<serde_json::Value, _>(row, index, Value::Json),
        "DATE[]" => array::<NaiveDate, _>(row, index, |v| Value::String(temporal::date(v))),
        "TIMESTAMP[]" => {
            array::<NaiveDateTime, _>(row, index, |v| Value::String(temporal::datetime(v)))
        }
        "TIMESTAMPTZ[]" => {
            array::<DateTime<Utc>, _>(row, index, |v| Value::String(temporal::datetime_utc(v)))
        }

        // Text-like types (enums, citext, ...) share the text wire format
        _ => decode::<String>(row, index)
            .or_else(|| {
                row.try_get_unchecked::<Option<String>, _>(index)
                    .ok()
                    .flatten()
            })
            .map(Value::String),
    };

    value.unwrap_or(Value::Null)
}

const NUMERIC_NEG: u16 = 0x4000;
const NUMERIC_NAN: u16 = 0xC000;
const NUMERIC_PINF: u16 = 0xD000;
const NUMERIC_NINF: u16 = 0xF000;

/// Renders PostgreSQL's binary NUMERIC representation as decimal text.
///
/// Layout: ndigits, weight, sign, dscale (all 16-bit big endian) followed
/// by `ndigits` base-10000 digits; `weight` is the power of 10000 of the
/// first digit.
fn numeric_to_string(raw: &[u8]) -> Option<String> {
    let word = |at: usize| -> Option<u16> {
        Some(u16::from_be_bytes([*raw.get(at)?, *raw.get(at + 1)?]))
    };

    let ndigits = word(0)? as usize;
    let weight = word(2)? as i16 as i32;
    let sign = word(4)?;
    let dscale = word(6)? as usize;

    match sign {
        NUMERIC_NAN => return Some("NaN".to_string()),
        NUMERIC_PINF => return Some("Infinity".to_string()),
        NUMERIC_NINF => return Some("-Infinity".to_string()),
        _ => {}
    }

    let digits = (0..ndigits)
        .map(|i| word(8 + i * 2))
        .collect::<Option<Vec<u16>>>()?;
    let digit_at = |position: i32| -> u16 {
        usize::try_from(position)
            .ok()
            .and_then(|i| digits.get(i).copied())
            .unwrap_or(0)
    };

    let mut text = String::new();
    if sign == NUMERIC_NEG {
        text.push('-');
    }

    if weight < 0 {
        text.push('0');
    } else {
        text.push_str(&digit_at(0).to_string());
        for position in 1..=weight {
            text.push_str(&format!("{:04}", digit_at(position)));
        }
    }

    if dscale > 0 {
        let mut fraction = String::with_capacity(dscale + 4);
        let mut position = weight + 1;
        while fraction.len() < dscale {
            fraction.push_str(&format!("{:04}", digit_at(position)));
            position += 1;
        }
        fraction.truncate(dscale);
        text.push('.');
        text.push_str(&fraction);
    }

    Some(text)
}

/// Renders an interval the way PostgreSQL's default output style does,
/// e.g. `1 year 2 mons 3 days 04:05:06.5`.
fn interval_to_string(interval: &PgInterval) -> String {
    let plural = |n: i64| if n == 1 || n == -1 { "" } else { "s" };
    let mut parts = Vec::new();

    let years = i64::from(interval.months / 12);
    let months = i64::from(interval.months % 12);
    let days = i64::from(interval.days);
    if years != 0 {
        parts.push(format!("{years} year{}", plural(years)));
    }
    if months != 0 {
        parts.push(format!("{months} mon{}", plural(months)));
    }
    if days != 0 {
        parts.push(format!("{days} day{}", plural(days)));
    }

    let micros = interval.microseconds;
    if micros != 0 || parts.is_empty() {
        let sign = if micros < 0 { "-" } else { "" };
        let micros = micros.unsigned_abs();
        let seconds = micros / 1_000_000;
        let mut time = format!(
            "{sign}{:02}:{:02}:{:02}",
            seconds / 3600,
            seconds / 60 % 60,
            seconds % 60
        );
        let fraction = micros % 1_000_000;
        if fraction != 0 {
            let digits = format!("{fraction:06}");
            time.push('.');
            time.push_str(digits.trim_end_matches('0'));
        }
        parts.push(time);
    }

    parts.join(" ")
}

/// Host addresses print without a prefix for `inet`, as PostgreSQL does.
fn network_to_string(network: &IpNetwork, is_inet: bool) -> String {
    let full_prefix = match network {
        IpNetwork::V4(_) => 32,
        IpNetwork::V6(_) => 128,
    };
    if is_inet && network.prefix() == full_prefix {
        network.ip().to_string()
    } else {
        network.to_string()
    }
}

fn money_to_string(money: PgMoney) -> String {
    let sign = if money.0 < 0 { "-" } else { "" };
    let cents = money.0.unsigned_abs();
    format!("{sign}{}.{:02}", cents / 100, cents % 100)
}

/// Renders binary BIT/VARBIT (bit count as i32 BE, then packed bits) as
/// a string of `0`s and `1`s.
fn bits_to_string(raw: &[u8]) -> Option<String> {
    let (len, bytes) = raw.split_first_chunk::<4>()?;
    let len = usize::try_from(i32::from_be_bytes(*len)).ok()?;
    if bytes.len() * 8 < len {
        return None;
    }
    Some(
        (0..len)
            .map(|i| if bytes[i / 8] & (0x80 >> (i % 8)) != 0 { '1' } else { '0' })
            .collect(),
    )
}

/// Formats a sqlx error with PostgreSQL detail fields when available.
fn format_error(error: &sqlx::Error) -> String {
    let Some(db_error) = error.as_database_error() else {
        return error.to_string();
    };

    let mut result = String::from("ERROR: ");
    result.push_str(db_error.message());

    if let Some(pg_error) = db_error.try_downcast_ref::<sqlx::postgres::PgDatabaseError>() {
        if let Some(detail) = pg_error.detail() {
            result.push_str("\n  DETAIL: ");
            result.push_str(detail);
        }

        if let Some(hint) = pg_error.hint() {
            result.push_str("\n  HINT: ");
            result.push_str(hint);
        }

        if let Some(table) = pg_error.table() {
            result.push_str("\n  TABLE: ");
            result.push_str(table);
        }

        if let Some(column) = pg_error.column() {
            result.push_str("\n  COLUMN: ");
            result.push_str(column);
        }

        if let Some(constraint) = pg_error.constraint() {
            result.push_str("\n  CONSTRAINT: ");
            result.push_str(constraint);
        }
    }

    result
}
