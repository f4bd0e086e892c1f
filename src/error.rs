use thiserror::Error;

/// Connection-level failures reported by a [`Transport`](crate::transport::Transport).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("could not connect to {url}: {reason}")]
    Connect { url: String, reason: String },
    /// Mid-stream failure; the message is the underlying transport's.
    #[error("{0}")]
    Protocol(String),
}

/// Errors returned to the caller of [`ConnectionManager::open`](crate::connection::ConnectionManager::open).
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error(transparent)]
    Transport(#[from] TransportError),
}
