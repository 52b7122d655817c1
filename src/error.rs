//! Error types for the chat server
//!
//! Defines application-level errors and message send errors.
//! Uses thiserror for ergonomic error definitions.

use thiserror::Error;

/// Application-level errors
///
/// Covers both fatal errors (connection termination) and protocol
/// errors (answered with a SERVER/ERROR envelope, connection stays open).
#[derive(Debug, Error)]
pub enum AppError {
    /// WebSocket protocol error (fatal)
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Inbound frame was not a valid envelope: bad JSON, unknown type,
    /// or a missing required field
    #[error("malformed envelope: {0}")]
    MalformedEnvelope(#[from] serde_json::Error),

    /// IO error (fatal)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Registry command channel closed (fatal - server actor gone)
    #[error("registry channel closed")]
    RegistryClosed,
}

/// Message send errors
///
/// Occurs when attempting to send envelopes through closed channels.
#[derive(Debug, Error)]
pub enum SendError {
    /// The receiving end of the channel has been closed
    #[error("session channel closed")]
    ChannelClosed,
}
