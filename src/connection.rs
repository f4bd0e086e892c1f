use time::{macros::format_description, OffsetDateTime};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::config::{validate_scan_id, StreamConfig};
use crate::error::StreamError;
use crate::event::{DecodeError, ScanEvent};
use crate::transport::{CloseInfo, Frame, Transport};
use crate::types::{ConnectionStatus, ScanState};

/// Called with the final state when a scan reports `Completed`.
pub type CompletionHook = Box<dyn FnMut(&ScanState) + Send>;

/// Owns one stream connection and the [`ScanState`] it feeds.
///
/// Frames are applied strictly one at a time in arrival order; after each
/// one a full snapshot is published to subscribers. Nothing else writes the
/// state. There is no reconnection: once the stream errors or closes, the
/// caller decides whether to `open` again.
pub struct ConnectionManager<T: Transport> {
    config: StreamConfig,
    transport: T,
    state: ScanState,
    updates: watch::Sender<ScanState>,
    on_complete: Option<CompletionHook>,
    scan_id: Option<String>,
    cancel: CancellationToken,
    // transport handle is held
    active: bool,
    // inbound frames are still applied
    accepting: bool,
}

impl<T: Transport> ConnectionManager<T> {
    pub fn new(config: StreamConfig, transport: T) -> Self {
        let state = ScanState::new();
        let (updates, _) = watch::channel(state.clone());
        Self {
            config,
            transport,
            state,
            updates,
            on_complete: None,
            scan_id: None,
            cancel: CancellationToken::new(),
            active: false,
            accepting: false,
        }
    }

    /// Register the completion hook. It fires at most once per opened connection.
    pub fn on_complete<F>(mut self, hook: F) -> Self
    where
        F: FnMut(&ScanState) + Send + 'static,
    {
        self.on_complete = Some(Box::new(hook));
        self
    }

    pub fn state(&self) -> &ScanState {
        &self.state
    }

    pub fn scan_id(&self) -> Option<&str> {
        self.scan_id.as_deref()
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// True while inbound frames are still being applied.
    pub fn is_accepting(&self) -> bool {
        self.accepting
    }

    /// Receive a snapshot after every applied frame.
    pub fn subscribe(&self) -> watch::Receiver<ScanState> {
        self.updates.subscribe()
    }

    /// Token that closes the current connection: a running [`run`](Self::run)
    /// stops and [`handle_frame`](Self::handle_frame) ignores further frames.
    /// Every `open` issues a fresh token, so take it after opening.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Connect to the stream of `scan_id`.
    ///
    /// Any previous connection is released first and the view starts from a
    /// fresh [`ScanState`]. A missing or blank id fails without any
    /// connection attempt. Failures are also recorded in the state's log.
    pub async fn open(
        &mut self,
        scan_id: Option<&str>,
    ) -> Result<watch::Receiver<ScanState>, StreamError> {
        self.release_previous().await;
        self.state = ScanState::new();
        self.scan_id = None;
        self.cancel = CancellationToken::new();

        let id = match validate_scan_id(scan_id) {
            Ok(id) => id.to_string(),
            Err(e) => {
                tracing::warn!("refusing to open scan stream without a scan id");
                self.fail(
                    "Error: No Scan ID",
                    "[Error] No scan ID provided. Cannot connect to scan stream.".into(),
                );
                return Err(e);
            }
        };
        let url = match self.config.stream_url(&id) {
            Ok(url) => url,
            Err(e) => {
                tracing::warn!(scan_id = %id, error = %e, "invalid stream configuration");
                self.fail("Configuration Error", format!("[Error] {e}"));
                return Err(e);
            }
        };
        self.scan_id = Some(id.clone());

        self.state.connection_status = ConnectionStatus::Connecting;
        self.publish();
        tracing::debug!(scan_id = %id, %url, "connecting to scan stream");

        match self.transport.connect(&url).await {
            Ok(()) => {
                self.active = true;
                self.accepting = true;
                self.state.connection_status = ConnectionStatus::Open;
                self.state
                    .log_lines
                    .push(format!("[{}] Connected to real-time scan stream.", clock()));
                self.publish();
                tracing::info!(scan_id = %id, %url, "scan stream connected");
                Ok(self.subscribe())
            }
            Err(e) => {
                tracing::warn!(scan_id = %id, error = %e, "scan stream connection failed");
                self.transport.release();
                self.fail(
                    "Connection Failed",
                    format!("[Error] Failed to connect to scan stream: {e}"),
                );
                Err(e.into())
            }
        }
    }

    /// Apply one transport frame. Returns whether further frames are accepted.
    pub fn handle_frame(&mut self, frame: Frame) -> bool {
        if !self.accepting || self.cancel.is_cancelled() {
            tracing::trace!("ignoring frame after close");
            return false;
        }
        match frame {
            Frame::Text(text) => self.apply_message(ScanEvent::from_text(&text)),
            Frame::Binary(bytes) => self.apply_message(ScanEvent::from_bytes(&bytes)),
            Frame::Error(err) => {
                tracing::warn!(scan_id = ?self.scan_id, error = %err, "scan stream error");
                self.state.connection_status = ConnectionStatus::Error;
                self.state.current_action = "Connection Error".into();
                self.state
                    .log_lines
                    .push(format!("[Error] Scan stream connection error: {err}"));
                self.publish();
            }
            Frame::Closed(info) => self.remote_closed(info),
        }
        self.accepting
    }

    /// Pump frames until the remote side closes, the stream ends, or the
    /// cancel token fires. Returns the final snapshot.
    pub async fn run(&mut self) -> ScanState {
        let cancel = self.cancel.clone();
        while self.accepting {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                frame = self.transport.recv() => Some(frame),
            };
            match next {
                None => {
                    self.close().await;
                    break;
                }
                Some(Some(frame)) => {
                    self.handle_frame(frame);
                }
                Some(None) => self.stream_ended(),
            }
        }
        self.state.clone()
    }

    /// Close the connection and stop applying frames. Safe to call repeatedly
    /// and on a manager that never connected.
    pub async fn close(&mut self) {
        self.cancel.cancel();
        let was_accepting = std::mem::replace(&mut self.accepting, false);
        if self.active {
            self.transport.close().await;
            self.active = false;
        } else {
            self.transport.release();
        }
        if was_accepting {
            self.state.connection_status = ConnectionStatus::Closed;
            self.state
                .log_lines
                .push(format!("[{}] Scan stream closed.", clock()));
            self.publish();
            tracing::info!(scan_id = ?self.scan_id, "scan stream closed by client");
        }
    }

    async fn release_previous(&mut self) {
        if self.active {
            tracing::debug!(scan_id = ?self.scan_id, "releasing previous scan stream");
            self.transport.close().await;
            self.active = false;
        }
        self.accepting = false;
    }

    fn apply_message(&mut self, decoded: Result<ScanEvent, DecodeError>) {
        match decoded {
            Ok(event) => {
                tracing::debug!(scan_id = ?self.scan_id, ?event, "scan event");
                let completed = self.state.apply(&event);
                self.publish();
                if completed {
                    tracing::info!(scan_id = ?self.scan_id, "scan completed");
                    if let Some(hook) = self.on_complete.as_mut() {
                        hook(&self.state);
                    }
                }
            }
            Err(e) => {
                tracing::warn!(scan_id = ?self.scan_id, error = %e, "discarding malformed message");
                self.state
                    .log_lines
                    .push(format!("[Error] Discarded malformed message: {e}"));
                self.publish();
            }
        }
    }

    fn remote_closed(&mut self, info: Option<CloseInfo>) {
        let (code, reason) = match &info {
            Some(i) if !i.reason.is_empty() => (i.code.to_string(), i.reason.clone()),
            Some(i) => (i.code.to_string(), "No reason".to_string()),
            None => ("none".to_string(), "No reason".to_string()),
        };
        tracing::info!(scan_id = ?self.scan_id, %code, %reason, "scan stream closed by remote");
        self.accepting = false;
        self.active = false;
        self.state.connection_status = ConnectionStatus::Closed;
        self.state.log_lines.push(format!(
            "[{}] Scan stream disconnected (code {code}, reason: {reason}).",
            clock()
        ));
        self.publish();
    }

    // Stream ended without a close frame; keep an error status if one was seen.
    fn stream_ended(&mut self) {
        tracing::info!(scan_id = ?self.scan_id, "scan stream ended");
        self.accepting = false;
        self.active = false;
        if self.state.connection_status != ConnectionStatus::Error {
            self.state.connection_status = ConnectionStatus::Closed;
        }
        self.state
            .log_lines
            .push(format!("[{}] Scan stream disconnected.", clock()));
        self.publish();
    }

    fn fail(&mut self, action: &str, line: String) {
        self.state.connection_status = ConnectionStatus::Error;
        self.state.current_action = action.to_string();
        self.state.log_lines.push(line);
        self.publish();
    }

    fn publish(&self) {
        self.updates.send_replace(self.state.clone());
    }
}

impl<T: Transport> Drop for ConnectionManager<T> {
    fn drop(&mut self) {
        self.cancel.cancel();
        if self.active {
            self.transport.release();
        }
    }
}

fn clock() -> String {
    OffsetDateTime::now_utc()
        .format(format_description!("[hour]:[minute]:[second]"))
        .unwrap_or_else(|_| String::from("--:--:--"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;
    use crate::transport::ScriptedTransport;

    fn manager(t: ScriptedTransport) -> ConnectionManager<ScriptedTransport> {
        ConnectionManager::new(StreamConfig::default(), t)
    }

    #[tokio::test]
    async fn open_connects_to_scan_path() {
        let mut m = manager(ScriptedTransport::default());
        m.open(Some("abc")).await.unwrap();
        assert_eq!(m.transport().connected_url(), Some("ws://localhost:8000/ws/scans/abc/"));
        assert_eq!(m.state().connection_status, ConnectionStatus::Open);
        assert_eq!(m.state().log_lines.len(), 1);
        assert!(m.state().log_lines[0].ends_with("Connected to real-time scan stream."));
    }

    #[tokio::test]
    async fn connect_failure_sets_error() {
        let mut m = manager(ScriptedTransport::failing("connection refused"));
        let err = m.open(Some("abc")).await.unwrap_err();
        assert!(matches!(err, StreamError::Transport(_)));
        assert_eq!(m.state().connection_status, ConnectionStatus::Error);
        assert_eq!(m.state().current_action, "Connection Failed");
        assert!(m.state().log_lines[0].contains("connection refused"));
        assert!(!m.is_accepting());
    }

    #[tokio::test]
    async fn bad_base_url_is_a_configuration_error() {
        let mut m = ConnectionManager::new(
            StreamConfig::new("http://localhost:8000"),
            ScriptedTransport::default(),
        );
        let err = m.open(Some("abc")).await.unwrap_err();
        assert!(matches!(err, StreamError::Configuration(_)));
        assert_eq!(m.transport().connect_attempts(), 0);
    }

    #[tokio::test]
    async fn frames_before_open_are_ignored() {
        let mut m = manager(ScriptedTransport::default());
        assert!(!m.handle_frame(Frame::Text(r#"{"progress":50}"#.into())));
        assert_eq!(m.state().progress, 0);
    }

    #[tokio::test]
    async fn stream_error_is_recorded() {
        let mut m = manager(ScriptedTransport::default());
        m.open(Some("abc")).await.unwrap();
        m.handle_frame(Frame::Error(TransportError::Protocol("reset by peer".into())));
        assert_eq!(m.state().connection_status, ConnectionStatus::Error);
        assert_eq!(m.state().current_action, "Connection Error");
    }

    #[test]
    fn clock_is_hms() {
        let c = clock();
        assert_eq!(c.len(), 8);
        assert_eq!(c.as_bytes()[2], b':');
    }
}
