//! Query parameter and row models.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// One decoded result row, keyed by column name.
pub type JsonRow = serde_json::Map<String, JsonValue>;

/// A bind parameter for a parameterized statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SqlParam {
    Null,
    Bool(bool),
    /// Stored as i64 for maximum range
    Int(i64),
    Float(f64),
    Text(String),
    /// Binary data (base64 encoded in JSON)
    #[serde(with = "base64_bytes")]
    Bytes(Vec<u8>),
}

impl SqlParam {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Get the type name of this parameter for debugging.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Text(_) => "text",
            Self::Bytes(_) => "bytes",
        }
    }
}

impl From<bool> for SqlParam {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i32> for SqlParam {
    fn from(value: i32) -> Self {
        Self::Int(value.into())
    }
}

impl From<i64> for SqlParam {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for SqlParam {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for SqlParam {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for SqlParam {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<Vec<u8>> for SqlParam {
    fn from(value: Vec<u8>) -> Self {
        Self::Bytes(value)
    }
}

impl<T: Into<SqlParam>> From<Option<T>> for SqlParam {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

/// Custom serialization for binary data as base64.
mod base64_bytes {
    use base64::{Engine as _, engine::general_purpose::STANDARD};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(bytes: &Vec<u8>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        STANDARD.encode(bytes).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        STANDARD.decode(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_param_conversions() {
        assert_eq!(SqlParam::from(7), SqlParam::Int(7));
        assert_eq!(SqlParam::from("a"), SqlParam::Text("a".into()));
        assert_eq!(SqlParam::from(None::<i64>), SqlParam::Null);
        assert_eq!(SqlParam::from(Some(true)), SqlParam::Bool(true));
        assert_eq!(SqlParam::from(vec![1u8, 2]).type_name(), "bytes");
    }

    #[test]
    fn test_bytes_serialize_as_base64() {
        let json = serde_json::to_value(SqlParam::Bytes(b"hi".to_vec())).unwrap();
        assert_eq!(json, serde_json::json!("aGk="));
    }

    #[test]
    fn test_untagged_deserialize() {
        let params: Vec<SqlParam> = serde_json::from_str(r#"[null, true, 3, 1.5, "x"]"#).unwrap();
        assert_eq!(
            params,
            vec![
                SqlParam::Null,
                SqlParam::Bool(true),
                SqlParam::Int(3),
                SqlParam::Float(1.5),
                SqlParam::Text("x".into()),
            ]
        );
    }
}
