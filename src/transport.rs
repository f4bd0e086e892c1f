use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::error::TransportError;

/// Close code and reason sent by the far end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseInfo {
    pub code: u16,
    pub reason: String,
}

/// What a transport hands up for each inbound unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
    /// Mid-stream transport failure.
    Error(TransportError),
    /// Orderly or abnormal close initiated by the remote side.
    Closed(Option<CloseInfo>),
}

/// A bidirectional stream connection, as seen by [`ConnectionManager`](crate::connection::ConnectionManager).
///
/// `recv` returning `None` means the stream ended without a close frame.
pub trait Transport: Send {
    fn connect(&mut self, url: &str) -> impl Future<Output = Result<(), TransportError>> + Send;

    fn recv(&mut self) -> impl Future<Output = Option<Frame>> + Send;

    /// Orderly close. Must be safe to call on a transport that never connected.
    fn close(&mut self) -> impl Future<Output = ()> + Send;

    /// Drop the underlying handle immediately, without a close handshake.
    fn release(&mut self);
}

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// WebSocket transport over `ws://` or `wss://`.
#[derive(Default)]
pub struct WebSocketTransport {
    socket: Option<Socket>,
}

impl WebSocketTransport {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Transport for WebSocketTransport {
    async fn connect(&mut self, url: &str) -> Result<(), TransportError> {
        self.release();
        let (socket, _resp) = connect_async(url)
            .await
            .map_err(|e| TransportError::Connect {
                url: url.to_string(),
                reason: e.to_string(),
            })?;
        self.socket = Some(socket);
        Ok(())
    }

    async fn recv(&mut self) -> Option<Frame> {
        let socket = self.socket.as_mut()?;
        loop {
            match socket.next().await {
                None => {
                    self.socket = None;
                    return None;
                }
                Some(Ok(Message::Text(text))) => return Some(Frame::Text(text)),
                Some(Ok(Message::Binary(bytes))) => return Some(Frame::Binary(bytes)),
                Some(Ok(Message::Close(frame))) => {
                    self.socket = None;
                    return Some(Frame::Closed(frame.map(|f| CloseInfo {
                        code: u16::from(f.code),
                        reason: f.reason.into_owned(),
                    })));
                }
                // pings are answered by tungstenite itself
                Some(Ok(_)) => continue,
                Some(Err(e)) => {
                    // the socket is unusable after an error
                    self.socket = None;
                    return Some(Frame::Error(TransportError::Protocol(e.to_string())));
                }
            }
        }
    }

    async fn close(&mut self) {
        if let Some(mut socket) = self.socket.take() {
            if let Err(e) = socket.close(None).await {
                tracing::debug!(error = %e, "websocket close handshake failed");
            }
        }
    }

    fn release(&mut self) {
        self.socket = None;
    }
}

/// Counters a [`ScriptedTransport`] shares with whoever created it, so they
/// stay readable after the transport has been moved or dropped.
#[derive(Debug, Default)]
pub struct ScriptStats {
    connect_attempts: AtomicUsize,
    close_calls: AtomicUsize,
    released: AtomicBool,
}

impl ScriptStats {
    pub fn connect_attempts(&self) -> usize {
        self.connect_attempts.load(Ordering::SeqCst)
    }

    pub fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }
}

/// Replays a fixed sequence of frames. Stands in for a socket in tests and in
/// offline replays of recorded streams.
#[derive(Debug, Clone, Default)]
pub struct ScriptedTransport {
    frames: VecDeque<Frame>,
    connect_error: Option<String>,
    hold_open: bool,
    connected_url: Option<String>,
    stats: Arc<ScriptStats>,
}

impl ScriptedTransport {
    pub fn new<I: IntoIterator<Item = Frame>>(frames: I) -> Self {
        Self {
            frames: frames.into_iter().collect(),
            ..Self::default()
        }
    }

    /// Script of text frames, one per JSON message.
    pub fn from_messages<I, S>(messages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(messages.into_iter().map(|m| Frame::Text(m.into())))
    }

    /// One text frame per non-blank line, as in a JSON-lines recording.
    pub fn from_json_lines(content: &str) -> Self {
        Self::from_messages(
            content
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(str::to_owned),
        )
    }

    /// Make `connect` fail with `reason`.
    pub fn failing(reason: impl Into<String>) -> Self {
        Self {
            connect_error: Some(reason.into()),
            ..Self::default()
        }
    }

    /// After the script runs out, wait forever instead of ending the stream.
    pub fn hold_open(mut self) -> Self {
        self.hold_open = true;
        self
    }

    pub fn push(&mut self, frame: Frame) {
        self.frames.push_back(frame);
    }

    /// Shared handle on the connect/close/release counters.
    pub fn stats(&self) -> Arc<ScriptStats> {
        Arc::clone(&self.stats)
    }

    pub fn connect_attempts(&self) -> usize {
        self.stats.connect_attempts()
    }

    pub fn connected_url(&self) -> Option<&str> {
        self.connected_url.as_deref()
    }

    pub fn close_calls(&self) -> usize {
        self.stats.close_calls()
    }

    pub fn is_released(&self) -> bool {
        self.stats.is_released()
    }

    pub fn remaining(&self) -> usize {
        self.frames.len()
    }
}

impl Transport for ScriptedTransport {
    async fn connect(&mut self, url: &str) -> Result<(), TransportError> {
        self.stats.connect_attempts.fetch_add(1, Ordering::SeqCst);
        self.stats.released.store(false, Ordering::SeqCst);
        match &self.connect_error {
            Some(reason) => Err(TransportError::Connect {
                url: url.to_string(),
                reason: reason.clone(),
            }),
            None => {
                self.connected_url = Some(url.to_string());
                Ok(())
            }
        }
    }

    async fn recv(&mut self) -> Option<Frame> {
        match self.frames.pop_front() {
            Some(frame) => Some(frame),
            None if self.hold_open => std::future::pending().await,
            None => None,
        }
    }

    async fn close(&mut self) {
        self.stats.close_calls.fetch_add(1, Ordering::SeqCst);
        self.connected_url = None;
    }

    fn release(&mut self) {
        self.stats.released.store(true, Ordering::SeqCst);
        self.connected_url = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scripted_replays_in_order_then_ends() {
        let mut t = ScriptedTransport::from_messages([r#"{"progress":1}"#, r#"{"progress":2}"#]);
        t.connect("ws://x/ws/scans/1/").await.unwrap();
        assert_eq!(t.recv().await, Some(Frame::Text(r#"{"progress":1}"#.into())));
        assert_eq!(t.recv().await, Some(Frame::Text(r#"{"progress":2}"#.into())));
        assert_eq!(t.recv().await, None);
    }

    #[tokio::test]
    async fn failing_script_counts_attempts() {
        let mut t = ScriptedTransport::failing("refused");
        let err = t.connect("ws://x/").await.unwrap_err();
        assert!(matches!(err, TransportError::Connect { .. }));
        assert_eq!(t.connect_attempts(), 1);
        assert_eq!(t.connected_url(), None);
    }

    #[test]
    fn json_lines_skip_blank_lines() {
        let t = ScriptedTransport::from_json_lines("{\"log\":\"a\"}\n\n  \n{\"log\":\"b\"}\n");
        assert_eq!(t.remaining(), 2);
    }

    #[tokio::test]
    async fn pushed_frames_follow_the_script() {
        let mut t = ScriptedTransport::from_messages([r#"{"progress":1}"#]);
        t.push(Frame::Error(TransportError::Protocol("reset".into())));
        assert_eq!(t.remaining(), 2);
        t.recv().await;
        assert_eq!(
            t.recv().await,
            Some(Frame::Error(TransportError::Protocol("reset".into())))
        );
    }

    #[tokio::test]
    async fn stats_outlive_the_transport() {
        let mut t = ScriptedTransport::default();
        let stats = t.stats();
        t.connect("ws://x/").await.unwrap();
        t.release();
        drop(t);
        assert_eq!(stats.connect_attempts(), 1);
        assert!(stats.is_released());
    }

    #[tokio::test]
    async fn websocket_close_without_connect_is_noop() {
        let mut t = WebSocketTransport::new();
        t.close().await;
        assert!(t.recv().await.is_none());
    }
}
