//! Row decoding for the sqlx backends.
//!
//! Type conversion uses a two-phase approach:
//! 1. `TypeCategory` classifies column types into logical categories
//! 2. Backend-specific decoders handle the actual value extraction

use crate::models::{Dialect, JsonRow};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde_json::Value as JsonValue;
use sqlx::mysql::{MySqlRow, MySqlTypeInfo, MySqlValueRef};
use sqlx::postgres::{PgRow, PgTypeInfo, PgValueRef};
use sqlx::sqlite::SqliteRow;
use sqlx::{Column, Decode, Row, Type, TypeInfo};

/// Logical category for database column types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeCategory {
    Integer,
    Float,
    Decimal,
    Boolean,
    Binary,
    Json,
    /// Dates, times and timestamps
    Temporal,
    Unknown,
}

/// Classify a database type name into a logical category.
pub fn categorize_type(type_name: &str, dialect: Dialect) -> TypeCategory {
    let lower = type_name.to_lowercase();

    // Checked first as it overlaps with "numeric" in float checks
    if lower.contains("decimal") || lower.contains("numeric") {
        // SQLite's NUMERIC is actually a float
        if dialect == Dialect::Sqlite && lower == "numeric" {
            return TypeCategory::Float;
        }
        return TypeCategory::Decimal;
    }

    if lower.contains("timestamp")
        || lower.contains("datetime")
        || matches!(lower.as_str(), "date" | "time" | "timetz")
    {
        return TypeCategory::Temporal;
    }

    if lower.contains("int") || lower.contains("serial") || lower.contains("tiny") {
        return TypeCategory::Integer;
    }

    if lower == "bool" || lower == "boolean" {
        return TypeCategory::Boolean;
    }

    if lower.contains("float") || lower.contains("double") || lower == "real" {
        return TypeCategory::Float;
    }

    if lower == "json" || lower == "jsonb" {
        return TypeCategory::Json;
    }

    if lower.contains("blob") || lower.contains("binary") || lower == "bytea" {
        return TypeCategory::Binary;
    }

    // varchar, text, uuid...
    TypeCategory::Unknown
}

/// Raw DECIMAL/NUMERIC values as strings, preserving the exact representation.
#[derive(Debug)]
pub struct RawDecimal(pub String);

impl Type<sqlx::MySql> for RawDecimal {
    fn type_info() -> MySqlTypeInfo {
        <String as Type<sqlx::MySql>>::type_info()
    }

    fn compatible(ty: &MySqlTypeInfo) -> bool {
        let name = ty.name().to_lowercase();
        name.contains("decimal") || name.contains("numeric")
    }
}

impl<'r> Decode<'r, sqlx::MySql> for RawDecimal {
    fn decode(value: MySqlValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <&str as Decode<sqlx::MySql>>::decode(value)?;
        Ok(RawDecimal(s.to_string()))
    }
}

impl Type<sqlx::Postgres> for RawDecimal {
    fn type_info() -> PgTypeInfo {
        <String as Type<sqlx::Postgres>>::type_info()
    }

    fn compatible(ty: &PgTypeInfo) -> bool {
        let name = ty.name().to_lowercase();
        name.contains("numeric") || name.contains("decimal")
    }
}

impl<'r> Decode<'r, sqlx::Postgres> for RawDecimal {
    fn decode(value: PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <&str as Decode<sqlx::Postgres>>::decode(value)?;
        Ok(RawDecimal(s.to_string()))
    }
}

/// Binary column values are returned base64 encoded.
pub fn encode_binary(bytes: &[u8]) -> JsonValue {
    use base64::{Engine as _, engine::general_purpose::STANDARD};
    JsonValue::String(STANDARD.encode(bytes))
}

pub(crate) fn float_value(v: f64) -> JsonValue {
    serde_json::Number::from_f64(v)
        .map(JsonValue::Number)
        .unwrap_or_else(|| JsonValue::String(v.to_string()))
}

/// Convert a database row into a JSON map keyed by column name.
pub trait RowToJson {
    fn to_json_map(&self) -> JsonRow;
}

impl RowToJson for MySqlRow {
    fn to_json_map(&self) -> JsonRow {
        self.columns()
            .iter()
            .enumerate()
            .map(|(idx, col)| {
                let type_name = col.type_info().name();
                let category = categorize_type(type_name, Dialect::MySql);
                (col.name().to_string(), mysql::decode_column(self, idx, category))
            })
            .collect()
    }
}

impl RowToJson for PgRow {
    fn to_json_map(&self) -> JsonRow {
        self.columns()
            .iter()
            .enumerate()
            .map(|(idx, col)| {
                let type_name = col.type_info().name();
                let category = categorize_type(type_name, Dialect::Postgres);
                (col.name().to_string(), postgres::decode_column(self, idx, category))
            })
            .collect()
    }
}

impl RowToJson for SqliteRow {
    fn to_json_map(&self) -> JsonRow {
        self.columns()
            .iter()
            .enumerate()
            .map(|(idx, col)| {
                let type_name = col.type_info().name();
                let category = categorize_type(type_name, Dialect::Sqlite);
                (col.name().to_string(), sqlite::decode_column(self, idx, type_name, category))
            })
            .collect()
    }
}

mod mysql {
    use super::*;

    pub fn decode_column(row: &MySqlRow, idx: usize, category: TypeCategory) -> JsonValue {
        match category {
            TypeCategory::Decimal => match row.try_get::<Option<RawDecimal>, _>(idx) {
                Ok(Some(v)) => JsonValue::String(v.0),
                Ok(None) => JsonValue::Null,
                Err(e) => {
                    tracing::error!("Failed to decode DECIMAL: {:?}", e);
                    JsonValue::Null
                }
            },
            TypeCategory::Integer => decode_integer(row, idx),
            TypeCategory::Boolean => row
                .try_get::<Option<bool>, _>(idx)
                .ok()
                .flatten()
                .map(JsonValue::Bool)
                .unwrap_or(JsonValue::Null),
            TypeCategory::Float => decode_float(row, idx),
            TypeCategory::Binary => row
                .try_get::<Option<Vec<u8>>, _>(idx)
                .ok()
                .flatten()
                .map(|v| encode_binary(&v))
                .unwrap_or(JsonValue::Null),
            TypeCategory::Json => row
                .try_get::<Option<JsonValue>, _>(idx)
                .ok()
                .flatten()
                .unwrap_or(JsonValue::Null),
            TypeCategory::Temporal => decode_temporal(row, idx),
            TypeCategory::Unknown => row
                .try_get::<Option<String>, _>(idx)
                .ok()
                .flatten()
                .map(JsonValue::String)
                .unwrap_or(JsonValue::Null),
        }
    }

    fn decode_integer(row: &MySqlRow, idx: usize) -> JsonValue {
        if let Ok(Some(v)) = row.try_get::<Option<i8>, _>(idx) {
            return JsonValue::Number(v.into());
        }
        if let Ok(Some(v)) = row.try_get::<Option<i16>, _>(idx) {
            return JsonValue::Number(v.into());
        }
        if let Ok(Some(v)) = row.try_get::<Option<i32>, _>(idx) {
            return JsonValue::Number(v.into());
        }
        if let Ok(Some(v)) = row.try_get::<Option<i64>, _>(idx) {
            return JsonValue::Number(v.into());
        }
        if let Ok(Some(v)) = row.try_get::<Option<u8>, _>(idx) {
            return JsonValue::Number(v.into());
        }
        if let Ok(Some(v)) = row.try_get::<Option<u16>, _>(idx) {
            return JsonValue::Number(v.into());
        }
        if let Ok(Some(v)) = row.try_get::<Option<u32>, _>(idx) {
            return JsonValue::Number(v.into());
        }
        if let Ok(Some(v)) = row.try_get::<Option<u64>, _>(idx) {
            return JsonValue::Number(v.into());
        }
        JsonValue::Null
    }

    fn decode_temporal(row: &MySqlRow, idx: usize) -> JsonValue {
        // TIMESTAMP decodes as UTC, DATETIME as a naive value
        if let Ok(Some(v)) = row.try_get::<Option<DateTime<Utc>>, _>(idx) {
            return JsonValue::String(v.to_rfc3339());
        }
        if let Ok(Some(v)) = row.try_get::<Option<NaiveDateTime>, _>(idx) {
            return JsonValue::String(v.to_string());
        }
        if let Ok(Some(v)) = row.try_get::<Option<NaiveDate>, _>(idx) {
            return JsonValue::String(v.to_string());
        }
        if let Ok(Some(v)) = row.try_get::<Option<NaiveTime>, _>(idx) {
            return JsonValue::String(v.to_string());
        }
        JsonValue::Null
    }

    fn decode_float(row: &MySqlRow, idx: usize) -> JsonValue {
        if let Ok(Some(v)) = row.try_get::<Option<f64>, _>(idx) {
            return float_value(v);
        }
        if let Ok(Some(v)) = row.try_get::<Option<f32>, _>(idx) {
            return float_value(v as f64);
        }
        JsonValue::Null
    }
}

mod postgres {
    use super::*;

    pub fn decode_column(row: &PgRow, idx: usize, category: TypeCategory) -> JsonValue {
        match category {
            TypeCategory::Decimal => match row.try_get::<Option<RawDecimal>, _>(idx) {
                Ok(Some(v)) => JsonValue::String(v.0),
                Ok(None) => JsonValue::Null,
                Err(e) => {
                    tracing::error!("Failed to decode NUMERIC: {:?}", e);
                    JsonValue::Null
                }
            },
            TypeCategory::Integer => decode_integer(row, idx),
            TypeCategory::Boolean => row
                .try_get::<Option<bool>, _>(idx)
                .ok()
                .flatten()
                .map(JsonValue::Bool)
                .unwrap_or(JsonValue::Null),
            TypeCategory::Float => {
                if let Ok(Some(v)) = row.try_get::<Option<f64>, _>(idx) {
                    return float_value(v);
                }
                if let Ok(Some(v)) = row.try_get::<Option<f32>, _>(idx) {
                    return float_value(v as f64);
                }
                JsonValue::Null
            }
            TypeCategory::Binary => row
                .try_get::<Option<Vec<u8>>, _>(idx)
                .ok()
                .flatten()
                .map(|v| encode_binary(&v))
                .unwrap_or(JsonValue::Null),
            TypeCategory::Json => row
                .try_get::<Option<JsonValue>, _>(idx)
                .ok()
                .flatten()
                .unwrap_or(JsonValue::Null),
            TypeCategory::Temporal => decode_temporal(row, idx),
            TypeCategory::Unknown => row
                .try_get::<Option<String>, _>(idx)
                .ok()
                .flatten()
                .map(JsonValue::String)
                .unwrap_or(JsonValue::Null),
        }
    }

    fn decode_temporal(row: &PgRow, idx: usize) -> JsonValue {
        if let Ok(Some(v)) = row.try_get::<Option<DateTime<Utc>>, _>(idx) {
            return JsonValue::String(v.to_rfc3339());
        }
        if let Ok(Some(v)) = row.try_get::<Option<NaiveDateTime>, _>(idx) {
            return JsonValue::String(v.to_string());
        }
        if let Ok(Some(v)) = row.try_get::<Option<NaiveDate>, _>(idx) {
            return JsonValue::String(v.to_string());
        }
        if let Ok(Some(v)) = row.try_get::<Option<NaiveTime>, _>(idx) {
            return JsonValue::String(v.to_string());
        }
        JsonValue::Null
    }

    fn decode_integer(row: &PgRow, idx: usize) -> JsonValue {
        if let Ok(Some(v)) = row.try_get::<Option<i16>, _>(idx) {
            return JsonValue::Number(v.into());
        }
        if let Ok(Some(v)) = row.try_get::<Option<i32>, _>(idx) {
            return JsonValue::Number(v.into());
        }
        if let Ok(Some(v)) = row.try_get::<Option<i64>, _>(idx) {
            return JsonValue::Number(v.into());
        }
        JsonValue::Null
    }
}

mod sqlite {
    use super::*;

    pub fn decode_column(
        row: &SqliteRow,
        idx: usize,
        type_name: &str,
        category: TypeCategory,
    ) -> JsonValue {
        match category {
            TypeCategory::Integer => row
                .try_get::<Option<i64>, _>(idx)
                .ok()
                .flatten()
                .map(|v| JsonValue::Number(v.into()))
                .unwrap_or(JsonValue::Null),
            TypeCategory::Boolean => row
                .try_get::<Option<bool>, _>(idx)
                .ok()
                .flatten()
                .map(JsonValue::Bool)
                .unwrap_or(JsonValue::Null),
            TypeCategory::Float | TypeCategory::Decimal => row
                .try_get::<Option<f64>, _>(idx)
                .ok()
                .flatten()
                .map(float_value)
                .unwrap_or(JsonValue::Null),
            TypeCategory::Binary => row
                .try_get::<Option<Vec<u8>>, _>(idx)
                .ok()
                .flatten()
                .map(|v| encode_binary(&v))
                .unwrap_or(JsonValue::Null),
            TypeCategory::Json | TypeCategory::Temporal | TypeCategory::Unknown => {
                decode_dynamic(row, idx, type_name)
            }
        }
    }

    /// Columns without a declared type (expressions) follow the value's storage class.
    fn decode_dynamic(row: &SqliteRow, idx: usize, type_name: &str) -> JsonValue {
        if let Ok(Some(v)) = row.try_get::<Option<String>, _>(idx) {
            if type_name.to_lowercase().contains("json") {
                if let Ok(json) = serde_json::from_str::<JsonValue>(&v) {
                    return json;
                }
            }
            return JsonValue::String(v);
        }
        if let Ok(Some(v)) = row.try_get::<Option<i64>, _>(idx) {
            return JsonValue::Number(v.into());
        }
        if let Ok(Some(v)) = row.try_get::<Option<f64>, _>(idx) {
            return float_value(v);
        }
        if let Ok(Some(v)) = row.try_get::<Option<Vec<u8>>, _>(idx) {
            return encode_binary(&v);
        }
        JsonValue::Null
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categorize_type_integer() {
        assert_eq!(categorize_type("INT", Dialect::MySql), TypeCategory::Integer);
        assert_eq!(categorize_type("BIGINT", Dialect::Postgres), TypeCategory::Integer);
        assert_eq!(categorize_type("TINYINT", Dialect::MySql), TypeCategory::Integer);
        assert_eq!(categorize_type("SERIAL", Dialect::Postgres), TypeCategory::Integer);
    }

    #[test]
    fn test_categorize_type_decimal() {
        assert_eq!(categorize_type("DECIMAL", Dialect::MySql), TypeCategory::Decimal);
        assert_eq!(categorize_type("NUMERIC", Dialect::Postgres), TypeCategory::Decimal);
        // SQLite NUMERIC is a float
        assert_eq!(categorize_type("numeric", Dialect::Sqlite), TypeCategory::Float);
    }

    #[test]
    fn test_categorize_type_other() {
        assert_eq!(categorize_type("jsonb", Dialect::Postgres), TypeCategory::Json);
        assert_eq!(categorize_type("BYTEA", Dialect::Postgres), TypeCategory::Binary);
        assert_eq!(categorize_type("boolean", Dialect::Sqlite), TypeCategory::Boolean);
        assert_eq!(categorize_type("VARCHAR", Dialect::MySql), TypeCategory::Unknown);
    }

    #[test]
    fn test_categorize_type_temporal() {
        assert_eq!(categorize_type("TIMESTAMPTZ", Dialect::Postgres), TypeCategory::Temporal);
        assert_eq!(categorize_type("DATETIME", Dialect::MySql), TypeCategory::Temporal);
        assert_eq!(categorize_type("DATE", Dialect::Postgres), TypeCategory::Temporal);
        assert_eq!(categorize_type("time", Dialect::MySql), TypeCategory::Temporal);
        assert_eq!(categorize_type("DATETIME", Dialect::Sqlite), TypeCategory::Temporal);
    }

    #[test]
    fn test_encode_binary() {
        assert_eq!(encode_binary(b"hello world"), JsonValue::String("aGVsbG8gd29ybGQ=".into()));
        assert_eq!(encode_binary(&[0xFF, 0xFE, 0x00, 0x01]), JsonValue::String("//4AAQ==".into()));
        assert_eq!(encode_binary(&[]), JsonValue::String(String::new()));
    }

    #[test]
    fn test_float_value_nan_falls_back_to_string() {
        assert_eq!(float_value(1.5), serde_json::json!(1.5));
        assert_eq!(float_value(f64::NAN), JsonValue::String("NaN".into()));
    }
}
