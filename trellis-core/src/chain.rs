// Values threaded through filters and controller stages

use crate::{Error, Result};
use bytes::Bytes;
use serde::Serialize;
use serde_json::{Value, json};
use std::fmt;

/// Content type used when a controller never set one.
pub const DEFAULT_CONTENT_TYPE: &str = "text/html";

/// The value each stage receives from the previous stage and hands to the
/// next one. A fresh controller run starts from [`ChainValue::Null`].
#[derive(Debug, Clone, Default, PartialEq)]
pub enum ChainValue {
    #[default]
    Null,
    Text(String),
    Bytes(Bytes),
    Json(Value),
}

impl ChainValue {
    /// Serialize any value into a JSON chain value.
    pub fn json<T: Serialize>(value: &T) -> Result<Self> {
        Ok(ChainValue::Json(serde_json::to_value(value)?))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, ChainValue::Null | ChainValue::Json(Value::Null))
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ChainValue::Text(text) => Some(text),
            ChainValue::Bytes(bytes) => std::str::from_utf8(bytes).ok(),
            ChainValue::Json(Value::String(text)) => Some(text),
            _ => None,
        }
    }

    pub fn as_json(&self) -> Option<&Value> {
        match self {
            ChainValue::Json(value) => Some(value),
            _ => None,
        }
    }

    /// Turn the final chain value into a response payload.
    ///
    /// JSON values are serialized when the response content type is
    /// `application/json`. Text and bytes are written as is. Anything else
    /// is rejected with a 400, unless `lenient` is set (serverless mode), in
    /// which case JSON is serialized regardless and null becomes an empty
    /// body.
    pub fn into_payload(self, content_type: &str, lenient: bool) -> Result<Bytes> {
        match self {
            ChainValue::Text(text) => Ok(Bytes::from(text)),
            ChainValue::Bytes(bytes) => Ok(bytes),
            ChainValue::Json(Value::String(text)) => Ok(Bytes::from(text)),
            ChainValue::Json(value) if !value.is_null() && (is_json(content_type) || lenient) => {
                Ok(Bytes::from(serde_json::to_vec(&value)?))
            }
            ChainValue::Null | ChainValue::Json(Value::Null) if lenient => Ok(Bytes::new()),
            other => Err(Error::routing(
                400,
                "ResponseType must be string or buffer",
                json!({ "response": other.to_string(), "contentType": content_type }),
            )),
        }
    }
}

fn is_json(content_type: &str) -> bool {
    content_type
        .split(';')
        .next()
        .is_some_and(|mime| mime.trim().eq_ignore_ascii_case("application/json"))
}

impl fmt::Display for ChainValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChainValue::Null => f.write_str("null"),
            ChainValue::Text(text) => f.write_str(text),
            ChainValue::Bytes(bytes) => f.write_str(&String::from_utf8_lossy(bytes)),
            ChainValue::Json(Value::String(text)) => f.write_str(text),
            ChainValue::Json(value) => write!(f, "{}", value),
        }
    }
}

impl From<&str> for ChainValue {
    fn from(value: &str) -> Self {
        ChainValue::Text(value.to_string())
    }
}

impl From<String> for ChainValue {
    fn from(value: String) -> Self {
        ChainValue::Text(value)
    }
}

impl From<Bytes> for ChainValue {
    fn from(value: Bytes) -> Self {
        ChainValue::Bytes(value)
    }
}

impl From<Vec<u8>> for ChainValue {
    fn from(value: Vec<u8>) -> Self {
        ChainValue::Bytes(Bytes::from(value))
    }
}

impl From<Value> for ChainValue {
    fn from(value: Value) -> Self {
        ChainValue::Json(value)
    }
}

impl<T: Into<ChainValue>> From<Option<T>> for ChainValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_displays_as_null() {
        assert_eq!(ChainValue::Null.to_string(), "null");
        assert_eq!(format!("a <- {}", ChainValue::from("CHAIN")), "a <- CHAIN");
    }

    #[test]
    fn test_text_payload_is_written_verbatim() {
        let payload = ChainValue::from("hello").into_payload("text/html", false).unwrap();
        assert_eq!(payload, Bytes::from_static(b"hello"));
    }

    #[test]
    fn test_json_payload_requires_json_content_type() {
        let value = ChainValue::Json(json!({"a": 1}));
        let payload = value.clone().into_payload("application/json", false).unwrap();
        assert_eq!(payload, Bytes::from_static(br#"{"a":1}"#));

        let err = value.into_payload("text/html", false).unwrap_err();
        assert_eq!(err.status_code(), 400);
        assert_eq!(err.message(), "ResponseType must be string or buffer");
    }

    #[test]
    fn test_json_content_type_with_charset() {
        let payload = ChainValue::Json(json!([1, 2]))
            .into_payload("application/json; charset=utf-8", false)
            .unwrap();
        assert_eq!(payload, Bytes::from_static(b"[1,2]"));
    }

    #[test]
    fn test_null_payload_is_rejected_unless_lenient() {
        assert!(ChainValue::Null.into_payload("text/html", false).is_err());
        assert_eq!(ChainValue::Null.into_payload("text/html", true).unwrap(), Bytes::new());
    }

    #[test]
    fn test_lenient_serializes_json_for_any_content_type() {
        let payload = ChainValue::Json(json!({"ok": true}))
            .into_payload("text/html", true)
            .unwrap();
        assert_eq!(payload, Bytes::from_static(br#"{"ok":true}"#));
    }
}
