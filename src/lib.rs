//! Multi-Room WebSocket Chat Server Library
//!
//! A room-based WebSocket chat server built with tokio-tungstenite
//! using the Actor pattern for state management.
//!
//! # Features
//! - WebSocket connection handling, one JSON envelope per frame
//! - Single global login namespace (display names are unique)
//! - Logon-grace timer closing connections that never log on
//! - Named rooms, created lazily and destroyed when they empty
//! - A default room every session joins at logon, never destroyed
//! - Room broadcast, emotes, private whispers, member listings
//! - Pluggable welcome content on room join/leave
//!
//! # Architecture
//! Uses the Actor pattern with `mpsc` channels:
//! - `Registry` is the central actor owning all cross-session state:
//!   pending sessions, the active-name mapping, and the room directory
//! - Each connection has a `handler` task communicating with the registry
//! - Grace timers report expiry into the same command channel
//! - No locks needed - all state access goes through message passing
//!
//! # Example
//! ```ignore
//! use std::sync::Arc;
//! use tokio::net::TcpListener;
//! use tokio::sync::mpsc;
//! use chat_room_server::{handle_connection, Registry, TriviaWelcome};
//!
//! #[tokio::main]
//! async fn main() {
//!     let listener = TcpListener::bind("127.0.0.1:8081").await.unwrap();
//!     let (cmd_tx, cmd_rx) = mpsc::channel(256);
//!
//!     let registry = Registry::new(cmd_rx, cmd_tx.clone(), Arc::new(TriviaWelcome));
//!     tokio::spawn(registry.run());
//!
//!     while let Ok((stream, _)) = listener.accept().await {
//!         let cmd_tx = cmd_tx.clone();
//!         tokio::spawn(handle_connection(stream, cmd_tx));
//!     }
//! }
//! ```

pub mod envelope;
pub mod error;
pub mod handler;
pub mod registry;
pub mod room;
pub mod session;
pub mod types;
pub mod welcome;

// Re-export main types for convenience
pub use envelope::{ClientCommand, Envelope, EnvelopeType};
pub use error::{AppError, SendError};
pub use handler::handle_connection;
pub use registry::{Registry, RegistryCommand, DEFAULT_ROOM, LOGON_GRACE};
pub use room::Room;
pub use session::{Session, SessionState};
pub use types::SessionId;
pub use welcome::{NoWelcome, TriviaWelcome, WelcomeProvider};
