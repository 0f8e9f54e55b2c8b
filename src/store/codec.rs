//! Typed field codec
//!
//! Hash fields are strings. Non-string values carry a type tag so that a
//! record read back decodes to the same JSON shape it was written from:
//!
//! | value | stored as |
//! |---|---|
//! | `true` | `:bool:true` |
//! | `42` | `:int:42` |
//! | `0.5` | `:float:0.5` |
//! | `["a","b"]`, `[1,2]` | `:list:a,b`, `:list:1,2` |
//! | other arrays, objects | `:json:...` |
//! | `null` | `:none:` |
//! | `"text"` | `text` (or `:str:text` when it starts with `:`) |

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Number, Value};

use super::{Hash, StoreError, StoreResult};

const DELIMITER: char = ',';

/// Encode one JSON value as a field string
pub fn encode_value(value: &Value) -> String {
    match value {
        Value::Bool(true) => ":bool:true".to_string(),
        Value::Bool(false) => ":bool:false".to_string(),
        Value::Number(n) if n.is_i64() || n.is_u64() => format!(":int:{}", n),
        Value::Number(n) => format!(":float:{}", n),
        Value::Null => ":none:".to_string(),
        Value::String(s) if s.starts_with(':') => format!(":str:{}", s),
        Value::String(s) => s.clone(),
        Value::Array(items) => match list_form(items) {
            Some(joined) => format!(":list:{}", joined),
            None => format!(":json:{}", value),
        },
        Value::Object(_) => format!(":json:{}", value),
    }
}

// The `:list:` form is only used when decoding gives back the same array.
fn list_form(items: &[Value]) -> Option<String> {
    if items.is_empty() {
        return Some(String::new());
    }
    if items.iter().all(|v| v.is_i64()) {
        let parts: Vec<String> = items.iter().map(|v| v.to_string()).collect();
        return Some(parts.join(","));
    }
    let mut parts = Vec::with_capacity(items.len());
    for item in items {
        match item {
            Value::String(s) if !s.is_empty() && !s.contains(DELIMITER) => parts.push(s.as_str()),
            _ => return None,
        }
    }
    if parts.iter().all(|p| p.parse::<i64>().is_ok()) {
        return None;
    }
    Some(parts.join(","))
}

/// Decode one field string back into a JSON value
pub fn decode_value(raw: &str) -> Result<Value, String> {
    if !raw.starts_with(':') {
        return Ok(Value::String(raw.to_string()));
    }
    if let Some(rest) = raw.strip_prefix(":bool:") {
        return match rest {
            "true" => Ok(Value::Bool(true)),
            "false" => Ok(Value::Bool(false)),
            other => Err(format!("bad bool '{}'", other)),
        };
    }
    if let Some(rest) = raw.strip_prefix(":int:") {
        if let Ok(n) = rest.parse::<i64>() {
            return Ok(Value::from(n));
        }
        return rest
            .parse::<u64>()
            .map(Value::from)
            .map_err(|e| format!("bad int '{}': {}", rest, e));
    }
    if let Some(rest) = raw.strip_prefix(":float:") {
        let parsed = rest
            .parse::<f64>()
            .map_err(|e| format!("bad float '{}': {}", rest, e))?;
        return Number::from_f64(parsed)
            .map(Value::Number)
            .ok_or_else(|| format!("non-finite float '{}'", rest));
    }
    if let Some(rest) = raw.strip_prefix(":list:") {
        if rest.is_empty() {
            return Ok(Value::Array(Vec::new()));
        }
        let parts: Vec<&str> = rest.split(DELIMITER).collect();
        let ints: Result<Vec<i64>, _> = parts.iter().map(|p| p.parse::<i64>()).collect();
        return Ok(match ints {
            Ok(ints) => Value::Array(ints.into_iter().map(Value::from).collect()),
            Err(_) => Value::Array(parts.into_iter().map(Value::from).collect()),
        });
    }
    if let Some(rest) = raw.strip_prefix(":json:") {
        return serde_json::from_str(rest).map_err(|e| format!("bad json: {}", e));
    }
    if raw == ":none:" {
        return Ok(Value::Null);
    }
    if let Some(rest) = raw.strip_prefix(":str:") {
        return Ok(Value::String(rest.to_string()));
    }
    Err(format!("unknown type tag in '{}'", raw))
}

/// Encode a serializable struct as a hash, one field per top-level member
pub fn encode_hash<T: Serialize>(key: &str, value: &T) -> StoreResult<Hash> {
    let json = serde_json::to_value(value).map_err(|e| StoreError::corrupt(key, e.to_string()))?;
    match json {
        Value::Object(map) => Ok(map
            .iter()
            .map(|(field, v)| (field.clone(), encode_value(v)))
            .collect()),
        _ => Err(StoreError::corrupt(key, "record must serialize to an object")),
    }
}

/// Decode a hash written by [`encode_hash`]
pub fn decode_hash<T: DeserializeOwned>(key: &str, hash: &Hash) -> StoreResult<T> {
    let mut map = Map::new();
    for (field, raw) in hash {
        let value = decode_value(raw)
            .map_err(|reason| StoreError::corrupt(key, format!("field {}: {}", field, reason)))?;
        map.insert(field.clone(), value);
    }
    serde_json::from_value(Value::Object(map)).map_err(|e| StoreError::corrupt(key, e.to_string()))
}
