//! Request fingerprints.

use serde_json::Value as JsonValue;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use vigil_core::EndpointId;

/// Parameters of a remote call.
pub type RequestParams = HashMap<String, JsonValue>;

/// Serialize `params` with object keys sorted at every depth.
///
/// # Examples
///
/// ```
/// use vigil_cache::{RequestParams, canonical_json};
/// use serde_json::json;
///
/// let mut params = RequestParams::new();
/// params.insert("query".to_string(), json!("uniswap"));
/// params.insert("max_results".to_string(), json!(10));
///
/// assert_eq!(canonical_json(&params), r#"{"max_results":10,"query":"uniswap"}"#);
/// ```
pub fn canonical_json(params: &RequestParams) -> String {
    let mut out = String::new();
    let mut keys: Vec<&String> = params.keys().collect();
    keys.sort();
    out.push('{');
    for (i, key) in keys.into_iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        write_string(&mut out, key);
        out.push(':');
        write_value(&mut out, &params[key]);
    }
    out.push('}');
    out
}

/// Hex SHA-256 of `endpoint + ":" + canonical_json(params)`.
///
/// Identical parameters produce identical fingerprints regardless of
/// insertion order.
pub fn fingerprint(endpoint: &EndpointId, params: &RequestParams) -> String {
    let mut hasher = Sha256::new();
    hasher.update(endpoint.as_str().as_bytes());
    hasher.update(b":");
    hasher.update(canonical_json(params).as_bytes());
    format!("{:x}", hasher.finalize())
}

fn write_value(out: &mut String, value: &JsonValue) {
    match value {
        JsonValue::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_string(out, key);
                out.push(':');
                write_value(out, &map[key]);
            }
            out.push('}');
        }
        JsonValue::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_value(out, item);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

fn write_string(out: &mut String, s: &str) {
    out.push_str(&JsonValue::String(s.to_string()).to_string());
}
