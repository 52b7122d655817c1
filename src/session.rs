//! Session struct definition
//!
//! Server-side state for one connected client: authentication state,
//! display name, current room, outbound channel, and the logon-grace
//! timer that closes connections which never log on.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::envelope::Envelope;
use crate::error::SendError;
use crate::types::SessionId;

/// Lifecycle state of a session
///
/// `Closed` is terminal; a closed connection never comes back, the
/// client must reconnect and log on again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Connected, name not yet granted; the grace timer is running
    Anonymous,
    /// Name granted and registered in the global namespace
    Authenticated,
    /// Torn down; kept only as an idempotency guard
    Closed,
}

/// One connected client
///
/// Owned by the registry for the duration of the connection. The display
/// name is assigned exactly once, at successful logon, and is immutable
/// thereafter. Dropping the session drops the only sender of its outbound
/// channel, which ends the connection's write task and closes the socket.
#[derive(Debug)]
pub struct Session {
    /// Unique identifier for this session
    pub id: SessionId,
    /// Display name (None until logon succeeds)
    pub name: Option<String>,
    /// Lifecycle state
    pub state: SessionState,
    /// Name of the room this session is currently a member of
    pub room: Option<String>,
    /// Registry → transport envelope channel
    sender: mpsc::Sender<Envelope>,
    /// One-shot logon-grace timer, present only while anonymous
    grace: Option<JoinHandle<()>>,
}

impl Session {
    /// Create a new anonymous session with the given outbound channel
    pub fn new(id: SessionId, sender: mpsc::Sender<Envelope>) -> Self {
        Self {
            id,
            name: None,
            state: SessionState::Anonymous,
            room: None,
            sender,
            grace: None,
        }
    }

    /// Queue an envelope for direct delivery to this session only
    ///
    /// Returns an error if the channel is closed (client disconnected).
    /// Callers delivering on behalf of a broadcast ignore the error so one
    /// dead connection never blocks the rest.
    pub async fn send(&self, envelope: Envelope) -> Result<(), SendError> {
        self.sender
            .send(envelope)
            .await
            .map_err(|_| SendError::ChannelClosed)
    }

    /// Display name, or a placeholder while anonymous
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("anonymous")
    }

    pub fn is_anonymous(&self) -> bool {
        self.state == SessionState::Anonymous
    }

    /// Arm the one-shot logon-grace timer
    pub fn arm_grace(&mut self, timer: JoinHandle<()>) {
        self.grace = Some(timer);
    }

    /// Cancel the grace timer if it is still pending
    pub fn cancel_grace(&mut self) {
        if let Some(timer) = self.grace.take() {
            timer.abort();
        }
    }

    /// Record a successful logon: name assigned, timer cancelled
    pub fn authenticate(&mut self, name: String) {
        self.cancel_grace();
        self.name = Some(name);
        self.state = SessionState::Authenticated;
    }

    /// Mark the session closed; safe to call more than once
    pub fn close(&mut self) {
        self.cancel_grace();
        self.state = SessionState::Closed;
    }
}
