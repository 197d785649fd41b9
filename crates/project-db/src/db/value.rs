//! Bind parameters, statements and row decoding.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::postgres::{PgArguments, PgRow};
use sqlx::{Arguments, Column, Row, TypeInfo, ValueRef};
use uuid::Uuid;

use crate::error::{DbError, DbResult};

/// A dynamically typed bind parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SqlValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Uuid(Uuid),
    Timestamp(DateTime<Utc>),
    Text(String),
    Json(serde_json::Value),
}

impl SqlValue {
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    fn add_to(&self, args: &mut PgArguments) -> DbResult<()> {
        // NULL goes over the wire as untyped text; insert placeholders carry
        // an explicit cast so it lands in any column type.
        let result = match self {
            SqlValue::Null => args.add(None::<String>),
            SqlValue::Bool(v) => args.add(*v),
            SqlValue::Int(v) => args.add(*v),
            SqlValue::Float(v) => args.add(*v),
            SqlValue::Uuid(v) => args.add(*v),
            SqlValue::Timestamp(v) => args.add(*v),
            SqlValue::Text(v) => args.add(v.clone()),
            SqlValue::Json(v) => args.add(v.clone()),
        };

        result.map_err(|e| DbError::Encode(e.to_string()))
    }
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        SqlValue::Bool(v)
    }
}

impl From<i32> for SqlValue {
    fn from(v: i32) -> Self {
        SqlValue::Int(i64::from(v))
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::Int(v)
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        SqlValue::Float(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(v.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::Text(v)
    }
}

impl From<Uuid> for SqlValue {
    fn from(v: Uuid) -> Self {
        SqlValue::Uuid(v)
    }
}

impl From<DateTime<Utc>> for SqlValue {
    fn from(v: DateTime<Utc>) -> Self {
        SqlValue::Timestamp(v)
    }
}

impl From<serde_json::Value> for SqlValue {
    fn from(v: serde_json::Value) -> Self {
        SqlValue::Json(v)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(SqlValue::Null)
    }
}

/// SQL text plus its positional parameters (`$1`, `$2`, ...).
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<SqlValue>,
}

impl Statement {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    /// Append a positional parameter.
    pub fn bind(mut self, value: impl Into<SqlValue>) -> Self {
        self.params.push(value.into());
        self
    }

    /// Encode the parameters into driver arguments.
    pub fn arguments(&self) -> DbResult<PgArguments> {
        let mut args = PgArguments::default();
        for param in &self.params {
            param.add_to(&mut args)?;
        }
        Ok(args)
    }
}

impl From<&str> for Statement {
    fn from(sql: &str) -> Self {
        Statement::new(sql)
    }
}

impl From<String> for Statement {
    fn from(sql: String) -> Self {
        Statement::new(sql)
    }
}

/// Convert a row into a JSON object keyed by column name.
///
/// Fails with [`DbError::Decode`] on a column type with no JSON mapping
/// rather than silently reporting it as null.
pub fn row_to_json(row: &PgRow) -> DbResult<serde_json::Value> {
    let mut obj = serde_json::Map::new();

    for (idx, column) in row.columns().iter().enumerate() {
        obj.insert(column.name().to_string(), column_to_json(row, idx)?);
    }

    Ok(serde_json::Value::Object(obj))
}

/// JSON mapping for a PostgreSQL column type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnDecoder {
    Int2,
    Int4,
    Int8,
    Float4,
    Float8,
    Bool,
    Uuid,
    Json,
    TimestampTz,
    Timestamp,
    Date,
    Time,
    /// Base64 (standard alphabet)
    Bytes,
    Text,
    Int4Array,
    Int8Array,
    Float8Array,
    BoolArray,
    TextArray,
    UuidArray,
}

fn decoder_for(type_name: &str) -> Option<ColumnDecoder> {
    let decoder = match type_name {
        "INT2" => ColumnDecoder::Int2,
        "INT4" => ColumnDecoder::Int4,
        "INT8" => ColumnDecoder::Int8,
        "FLOAT4" => ColumnDecoder::Float4,
        "FLOAT8" => ColumnDecoder::Float8,
        "BOOL" => ColumnDecoder::Bool,
        "UUID" => ColumnDecoder::Uuid,
        "JSON" | "JSONB" => ColumnDecoder::Json,
        "TIMESTAMPTZ" => ColumnDecoder::TimestampTz,
        "TIMESTAMP" => ColumnDecoder::Timestamp,
        "DATE" => ColumnDecoder::Date,
        "TIME" => ColumnDecoder::Time,
        "BYTEA" => ColumnDecoder::Bytes,
        "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" | "CITEXT" => ColumnDecoder::Text,
        "INT4[]" => ColumnDecoder::Int4Array,
        "INT8[]" => ColumnDecoder::Int8Array,
        "FLOAT8[]" => ColumnDecoder::Float8Array,
        "BOOL[]" => ColumnDecoder::BoolArray,
        "TEXT[]" | "VARCHAR[]" => ColumnDecoder::TextArray,
        "UUID[]" => ColumnDecoder::UuidArray,
        _ => return None,
    };
    Some(decoder)
}

fn column_to_json(row: &PgRow, idx: usize) -> DbResult<serde_json::Value> {
    let column = &row.columns()[idx];
    let type_name = column.type_info().name();
    let decoder = decoder_for(type_name).ok_or_else(|| {
        DbError::Decode(format!(
            "column '{}' has unsupported type {}; cast it in the query, e.g. ::text",
            column.name(),
            type_name
        ))
    })?;

    if row.try_get_raw(idx)?.is_null() {
        return Ok(serde_json::Value::Null);
    }

    let value = match decoder {
        ColumnDecoder::Int2 => json!(row.try_get::<i16, _>(idx)?),
        ColumnDecoder::Int4 => json!(row.try_get::<i32, _>(idx)?),
        ColumnDecoder::Int8 => json!(row.try_get::<i64, _>(idx)?),
        ColumnDecoder::Float4 => json!(row.try_get::<f32, _>(idx)?),
        ColumnDecoder::Float8 => json!(row.try_get::<f64, _>(idx)?),
        ColumnDecoder::Bool => json!(row.try_get::<bool, _>(idx)?),
        ColumnDecoder::Uuid => json!(row.try_get::<Uuid, _>(idx)?),
        ColumnDecoder::Json => row.try_get::<serde_json::Value, _>(idx)?,
        ColumnDecoder::TimestampTz => json!(row.try_get::<DateTime<Utc>, _>(idx)?.to_rfc3339()),
        ColumnDecoder::Timestamp => json!(row.try_get::<NaiveDateTime, _>(idx)?.to_string()),
        ColumnDecoder::Date => json!(row.try_get::<NaiveDate, _>(idx)?.to_string()),
        ColumnDecoder::Time => json!(row.try_get::<NaiveTime, _>(idx)?.to_string()),
        ColumnDecoder::Bytes => json!(BASE64.encode(row.try_get::<Vec<u8>, _>(idx)?)),
        ColumnDecoder::Text => json!(row.try_get::<String, _>(idx)?),
        ColumnDecoder::Int4Array => json!(row.try_get::<Vec<i32>, _>(idx)?),
        ColumnDecoder::Int8Array => json!(row.try_get::<Vec<i64>, _>(idx)?),
        ColumnDecoder::Float8Array => json!(row.try_get::<Vec<f64>, _>(idx)?),
        ColumnDecoder::BoolArray => json!(row.try_get::<Vec<bool>, _>(idx)?),
        ColumnDecoder::TextArray => json!(row.try_get::<Vec<String>, _>(idx)?),
        ColumnDecoder::UuidArray => json!(row.try_get::<Vec<Uuid>, _>(idx)?),
    };

    Ok(value)
}
