use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::types::{OpenPort, Phase};

/// Why an inbound message could not be turned into a [`ScanEvent`].
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("message is not valid UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),
    #[error("message is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("message is JSON but not an object (got {0})")]
    NotAnObject(&'static str),
}

/// One decoded stream message. Every field is optional; `None` means the
/// message carries no change for that field.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScanEvent {
    pub action: Option<String>,
    pub log: Option<String>,
    pub progress: Option<u8>,
    pub phase: Option<Phase>,
    pub vuln_count: Option<u64>,
    pub port_found: Option<OpenPort>,
    pub subdomain_found: Option<String>,
    pub directory_found: Option<String>,
    pub technologies: Option<Map<String, Value>>,
    pub url_found: Option<String>,
    pub discovered_urls: Option<Vec<String>>,
    pub payload: Option<String>,
    pub scanner: Option<String>,
}

impl ScanEvent {
    /// Decode a text frame.
    pub fn from_text(text: &str) -> Result<Self, DecodeError> {
        let value: Value = serde_json::from_str(text)?;
        match value {
            Value::Object(map) => Ok(Self::from_object(&map)),
            other => Err(DecodeError::NotAnObject(kind_of(&other))),
        }
    }

    /// Decode a binary frame, which must still hold UTF-8 JSON.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DecodeError> {
        Self::from_text(std::str::from_utf8(bytes)?)
    }

    /// Pick the recognized keys out of a JSON object.
    ///
    /// Never fails: unknown keys, `null` values and values of the wrong shape
    /// are all treated as absent.
    pub fn from_object(map: &Map<String, Value>) -> Self {
        Self {
            action: field(map, "action"),
            log: field(map, "log"),
            progress: field::<u64>(map, "progress")
                .filter(|p| *p <= 100)
                .map(|p| p as u8),
            phase: field::<String>(map, "phase").and_then(|p| Phase::from_name(&p)),
            vuln_count: field(map, "vuln_count"),
            port_found: field(map, "port_found"),
            subdomain_found: field(map, "subdomain_found"),
            directory_found: present(map, "directory_found").and_then(directory_path),
            technologies: field(map, "technologies"),
            url_found: field(map, "url_found"),
            discovered_urls: present(map, "discovered_urls").and_then(string_items),
            payload: present(map, "payload").map(payload_text),
            scanner: field(map, "scanner"),
        }
    }

    /// True when the event carries no recognized field at all.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

fn present<'a>(map: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    map.get(key).filter(|v| !v.is_null())
}

fn field<T: DeserializeOwned>(map: &Map<String, Value>, key: &str) -> Option<T> {
    present(map, key).and_then(|v| T::deserialize(v).ok())
}

// The backend reports directories as `{path, status, ...}`; plain strings are
// accepted too.
fn directory_path(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Object(obj) => obj.get("path").and_then(Value::as_str).map(str::to_owned),
        _ => None,
    }
}

fn string_items(value: &Value) -> Option<Vec<String>> {
    value.as_array().map(|items| {
        items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_owned)
            .collect()
    })
}

fn payload_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
