//! Query result types.
//!
//! Defines the structures used to represent query results from the database
//! and how they serialize into the JSON rows the HTTP endpoint returns.

use base64::{engine::general_purpose::STANDARD, Engine};
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};

/// Represents the result of executing a SQL statement.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResult {
    /// Column metadata for the result set (empty when no rows came back).
    pub columns: Vec<ColumnInfo>,

    /// Rows of data, in the order the driver returned them.
    pub rows: Vec<Row>,

    /// Rows affected as reported by the driver (0 for plain reads).
    pub rows_affected: u64,
}

impl QueryResult {
    /// Creates a new empty query result.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a query result with the given columns and rows.
    pub fn with_data(columns: Vec<ColumnInfo>, rows: Vec<Row>) -> Self {
        Self {
            columns,
            rows,
            rows_affected: 0,
        }
    }

    /// Sets the affected-row count.
    pub fn with_rows_affected(mut self, rows_affected: u64) -> Self {
        self.rows_affected = rows_affected;
        self
    }

    /// Returns the number of rows in the result.
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Returns true if the result set is empty.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Returns a serializable view of the rows as column-name keyed objects.
    pub fn records(&self) -> Records<'_> {
        Records {
            layout: key_layout(&self.columns),
            columns: &self.columns,
            rows: &self.rows,
        }
    }
}

/// Metadata about a column in a result set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnInfo {
    /// Column name.
    pub name: String,

    /// Column data type as reported by the driver.
    pub data_type: String,
}

impl ColumnInfo {
    /// Creates a new column info with the given name and type.
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
        }
    }
}

/// A row of data from a query result, positionally aligned with the columns.
pub type Row = Vec<Value>;

/// Represents a single value from a database query.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Value {
    /// NULL value.
    #[default]
    Null,

    /// Boolean value.
    Bool(bool),

    /// Signed integer (up to i64).
    Int(i64),

    /// Unsigned integer (up to u64).
    UInt(u64),

    /// Floating point number.
    Float(f64),

    /// Text, and anything rendered as text (decimals, dates, UUIDs).
    String(String),

    /// Embedded JSON document.
    Json(serde_json::Value),

    /// Binary data.
    Bytes(Vec<u8>),
}

/// Values serialize as bare JSON scalars; binary data becomes base64 text.
impl Serialize for Value {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Int(i) => serializer.serialize_i64(*i),
            Value::UInt(u) => serializer.serialize_u64(*u),
            Value::Float(f) => serializer.serialize_f64(*f),
            Value::String(s) => serializer.serialize_str(s),
            Value::Json(j) => j.serialize(serializer),
            Value::Bytes(b) => serializer.serialize_str(&STANDARD.encode(b)),
        }
    }
}

// Conversion implementations for common types
impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Value::UInt(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl<T> From<Option<T>> for Value
where
    T: Into<Value>,
{
    fn from(v: Option<T>) -> Self {
        match v {
            Some(val) => val.into(),
            None => Value::Null,
        }
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

/// Computes which value index feeds each output key.
///
/// A repeated column name yields one key, placed where the name first
/// appears and holding the value of its last occurrence.
fn key_layout(columns: &[ColumnInfo]) -> Vec<(usize, usize)> {
    let mut layout: Vec<(usize, usize)> = Vec::with_capacity(columns.len());
    for (index, column) in columns.iter().enumerate() {
        match layout
            .iter_mut()
            .find(|(name_index, _)| columns[*name_index].name == column.name)
        {
            Some(slot) => slot.1 = index,
            None => layout.push((index, index)),
        }
    }
    layout
}

/// Serializable view over all rows of a [`QueryResult`].
#[derive(Debug)]
pub struct Records<'a> {
    layout: Vec<(usize, usize)>,
    columns: &'a [ColumnInfo],
    rows: &'a [Row],
}

impl Records<'_> {
    /// Returns the number of records.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns true if there are no records.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Returns the record at the given row index.
    pub fn get(&self, index: usize) -> Option<Record<'_>> {
        self.rows.get(index).map(|row| Record {
            layout: &self.layout,
            columns: self.columns,
            values: row,
        })
    }
}

impl Serialize for Records<'_> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut seq = serializer.serialize_seq(Some(self.len()))?;
        for values in self.rows {
            seq.serialize_element(&Record {
                layout: &self.layout,
                columns: self.columns,
                values,
            })?;
        }
        seq.end()
    }
}

/// One row rendered as an ordered `column name -> value` object.
#[derive(Debug)]
pub struct Record<'a> {
    layout: &'a [(usize, usize)],
    columns: &'a [ColumnInfo],
    values: &'a [Value],
}

impl Record<'_> {
    /// Returns the value stored under a column name.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.layout
            .iter()
            .find(|(name_index, _)| self.columns[*name_index].name == name)
            .and_then(|(_, value_index)| self.values.get(*value_index))
    }

    /// Returns the keys of this record in output order.
    pub fn keys(&self) -> Vec<&str> {
        self.layout
            .iter()
            .map(|(name_index, _)| self.columns[*name_index].name.as_str())
            .collect()
    }
}

impl Serialize for Record<'_> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.layout.len()))?;
        for (name_index, value_index) in self.layout {
            let value = self.values.get(*value_index).unwrap_or(&Value::Null);
            map.serialize_entry(&self.columns[*name_index].name, value)?;
        }
        map.end()
    }
}

/// ISO-8601 text for date and time column values.
pub(crate) mod temporal {
    use sqlx::types::chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};

    pub fn date(v: NaiveDate) -> String {
        v.format("%Y-%m-%d").to_string()
    }

    pub fn time(v: NaiveTime) -> String {
        v.format("%H:%M:%S%.f").to_string()
    }

    pub fn datetime(v: NaiveDateTime) -> String {
        v.format("%Y-%m-%dT%H:%M:%S%.f").to_string()
    }

    pub fn datetime_utc(v: DateTime<Utc>) -> String {
        v.format("%Y-%m-%dT%H:%M:%S%.fZ").to_string()
    }
}
