//! Library crate for scan-telemetry: follows a scan's live event stream and
//! folds it into a renderable [`ScanState`](types::ScanState).
pub mod collections;
pub mod config;
pub mod connection;
pub mod error;
pub mod event;
pub mod reducer;
pub mod render;
pub mod transport;
pub mod types;
