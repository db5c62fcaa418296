//! Lambda response conversion.

use bytes::Bytes;
use serde::Serialize;
use std::collections::BTreeMap;
use trellis_core::{HeaderValue, ServerResponse};

/// API Gateway proxy integration response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyResponse {
    pub body: String,
    /// Single-valued response headers.
    pub headers: BTreeMap<String, String>,
    pub status_code: u16,
    pub is_base64_encoded: bool,
    /// Multi-valued response headers such as `Set-Cookie`.
    pub multi_value_headers: BTreeMap<String, Vec<String>>,
}

impl ProxyResponse {
    pub fn from_response(response: &ServerResponse, body: &Bytes, is_base64_encoded: bool) -> Self {
        let mut headers = BTreeMap::new();
        let mut multi_value_headers = BTreeMap::new();

        for (name, value) in response.headers() {
            match value {
                HeaderValue::Single(value) => {
                    headers.insert(name.clone(), value.clone());
                }
                HeaderValue::Multi(values) => {
                    multi_value_headers.insert(name.clone(), values.clone());
                }
            }
        }

        Self {
            body: body_text(body),
            headers,
            status_code: response.status(),
            is_base64_encoded,
            multi_value_headers,
        }
    }
}

/// Body returned as-is to non-proxy invocations.
pub fn body_text(body: &Bytes) -> String {
    String::from_utf8_lossy(body).into_owned()
}
