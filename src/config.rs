use crate::error::StreamError;

pub const DEFAULT_BASE_URL: &str = "ws://localhost:8000";
pub const DEFAULT_PATH_TEMPLATE: &str = "/ws/scans/{scan_id}/";

const SCAN_ID_PLACEHOLDER: &str = "{scan_id}";

/// Where scan streams live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamConfig {
    /// `ws://` or `wss://` origin, without trailing slash.
    pub base_url: String,
    /// Path appended to `base_url`; `{scan_id}` is replaced by the encoded id.
    pub path_template: String,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            path_template: DEFAULT_PATH_TEMPLATE.to_string(),
        }
    }
}

impl StreamConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    /// Check the scan id and build the stream URL for it.
    pub fn stream_url(&self, scan_id: &str) -> Result<String, StreamError> {
        let scan_id = validate_scan_id(Some(scan_id))?;
        let base = self.base_url.trim_end_matches('/');
        if !(base.starts_with("ws://") || base.starts_with("wss://")) {
            return Err(StreamError::Configuration(format!(
                "stream base URL must use ws:// or wss://, got {base:?}"
            )));
        }
        if !self.path_template.contains(SCAN_ID_PLACEHOLDER) {
            return Err(StreamError::Configuration(format!(
                "path template {:?} has no {SCAN_ID_PLACEHOLDER} placeholder",
                self.path_template
            )));
        }
        let path = self
            .path_template
            .replace(SCAN_ID_PLACEHOLDER, &urlencoding::encode(scan_id));
        Ok(format!("{base}{path}"))
    }
}

/// A scan id must be present and not blank.
pub fn validate_scan_id(scan_id: Option<&str>) -> Result<&str, StreamError> {
    match scan_id.map(str::trim) {
        Some(id) if !id.is_empty() => Ok(id),
        _ => Err(StreamError::Configuration("no scan ID provided".into())),
    }
}
