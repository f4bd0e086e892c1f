use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::collections::{BoundedLog, OrderedSet};

/// Number of in-flight payload lines kept for the "what is happening now" view.
pub const ACTIVE_PAYLOADS_CAPACITY: usize = 50;

/// Placeholder action shown before the backend reports anything.
pub const INITIAL_ACTION: &str = "Initializing...";

/// Action label that marks the end of a scan.
pub const COMPLETED_ACTION: &str = "Completed";

/// Coarse stage of a scan as reported by the backend.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    #[default]
    Initializing,
    Reconnaissance,
    Scanning,
    Reporting,
}

impl Phase {
    /// Parse a backend phase name. Unknown names yield `None`.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "initializing" => Some(Self::Initializing),
            "reconnaissance" => Some(Self::Reconnaissance),
            "scanning" => Some(Self::Scanning),
            "reporting" => Some(Self::Reporting),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Initializing => "initializing",
            Self::Reconnaissance => "reconnaissance",
            Self::Scanning => "scanning",
            Self::Reporting => "reporting",
        }
    }
}

/// Connectivity of the stream feeding a [`ScanState`].
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    #[default]
    Connecting,
    Open,
    Error,
    Closed,
}

impl ConnectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Error => "error",
            Self::Closed => "closed",
        }
    }
}

/// One open port reported during reconnaissance.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct OpenPort {
    pub port: u16,
    #[serde(default = "unknown_service")]
    pub service: String,
    #[serde(default = "open_state")]
    pub state: String,
}

fn unknown_service() -> String {
    "unknown".into()
}

fn open_state() -> String {
    "open".into()
}

/// Reconnaissance findings. The arrays are logs: repeated findings are kept.
#[derive(Serialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Reconnaissance {
    pub open_ports: Vec<OpenPort>,
    pub subdomains: Vec<String>,
    pub directories: Vec<String>,
    pub technologies: Option<Map<String, Value>>,
}

/// Live view of one scan, rebuilt from its event stream.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ScanState {
    pub phase: Phase,
    pub current_action: String,
    pub progress: u8,
    pub vuln_count: u64,
    pub log_lines: Vec<String>,
    pub discovered_urls: OrderedSet,
    pub reconnaissance: Reconnaissance,
    pub active_payloads: BoundedLog<String>,
    pub connection_status: ConnectionStatus,
    /// Set once a `Completed` action has been observed.
    pub finished: bool,
}

impl ScanState {
    pub fn new() -> Self {
        Self {
            phase: Phase::default(),
            current_action: INITIAL_ACTION.to_string(),
            progress: 0,
            vuln_count: 0,
            log_lines: Vec::new(),
            discovered_urls: OrderedSet::new(),
            reconnaissance: Reconnaissance::default(),
            active_payloads: BoundedLog::new(ACTIVE_PAYLOADS_CAPACITY),
            connection_status: ConnectionStatus::default(),
            finished: false,
        }
    }
}

impl Default for ScanState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_state_uses_sentinels() {
        let s = ScanState::new();
        assert_eq!(s.phase, Phase::Initializing);
        assert_eq!(s.current_action, INITIAL_ACTION);
        assert_eq!(s.connection_status, ConnectionStatus::Connecting);
        assert_eq!(s.active_payloads.capacity(), ACTIVE_PAYLOADS_CAPACITY);
        assert!(!s.finished);
    }

    #[test]
    fn phase_names_round_trip() {
        for p in [
            Phase::Initializing,
            Phase::Reconnaissance,
            Phase::Scanning,
            Phase::Reporting,
        ] {
            assert_eq!(Phase::from_name(p.as_str()), Some(p));
        }
        assert_eq!(Phase::from_name("Scanning"), None);
    }

    #[test]
    fn state_serializes_with_camel_case_keys() {
        let v = serde_json::to_value(ScanState::new()).unwrap();
        assert_eq!(v["currentAction"], INITIAL_ACTION);
        assert_eq!(v["connectionStatus"], "connecting");
        assert_eq!(v["reconnaissance"]["openPorts"], serde_json::json!([]));
        assert!(v["reconnaissance"]["technologies"].is_null());
    }
}
