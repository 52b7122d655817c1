//! Registry actor implementation
//!
//! The central actor owning all cross-session state: the pending set of
//! anonymous sessions, the active-name mapping, and the room directory.
//! Uses the Actor pattern with mpsc channels for message passing: every
//! connection, command, and timer event funnels into one channel and is
//! handled to completion before the next, so logon arbitration, room
//! switches, and broadcast enumeration are atomic without locks.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::envelope::{ClientCommand, Envelope};
use crate::room::Room;
use crate::session::Session;
use crate::types::SessionId;
use crate::welcome::WelcomeProvider;

/// The room every session joins at logon; exempt from destruction-on-empty
pub const DEFAULT_ROOM: &str = "General";

/// How long an anonymous session may linger before it is closed
pub const LOGON_GRACE: Duration = Duration::from_millis(2000);

/// Commands sent from connection handlers (and grace timers) to the registry
#[derive(Debug)]
pub enum RegistryCommand {
    /// New transport connection; `sender` is the session's outbound queue
    Connect {
        session_id: SessionId,
        sender: mpsc::Sender<Envelope>,
    },
    /// A decoded envelope arrived from this session
    Incoming {
        session_id: SessionId,
        envelope: Envelope,
    },
    /// A frame from this session failed envelope decoding
    Malformed {
        session_id: SessionId,
        detail: String,
    },
    /// Transport closed
    Disconnect { session_id: SessionId },
    /// The session's logon-grace timer fired
    GraceExpired { session_id: SessionId },
}

/// The registry actor
///
/// A session is in exactly one of `pending` (anonymous) or `names`
/// (authenticated) until it closes, at which point it is in neither.
/// Rooms are created lazily on first reference and destroyed when their
/// membership reaches zero, except the default room, which is created
/// here and never removed.
pub struct Registry {
    /// All connected sessions: SessionId -> Session
    sessions: HashMap<SessionId, Session>,
    /// Sessions that have connected but not yet logged on
    pending: HashSet<SessionId>,
    /// Active display name -> session (name uniqueness is enforced here)
    names: HashMap<String, SessionId>,
    /// Room directory: room name -> Room
    rooms: HashMap<String, Room>,
    /// Command receiver channel
    receiver: mpsc::Receiver<RegistryCommand>,
    /// Own command sender, cloned into grace-timer tasks
    handle: mpsc::Sender<RegistryCommand>,
    /// Join/leave content collaborator
    welcome: Arc<dyn WelcomeProvider>,
    /// Logon grace period for new connections
    grace: Duration,
}

impl Registry {
    /// Create a new registry
    ///
    /// `handle` must be a sender for the same channel as `receiver`; grace
    /// timers use it to report expiry back into the event loop.
    pub fn new(
        receiver: mpsc::Receiver<RegistryCommand>,
        handle: mpsc::Sender<RegistryCommand>,
        welcome: Arc<dyn WelcomeProvider>,
    ) -> Self {
        let mut rooms = HashMap::new();
        rooms.insert(DEFAULT_ROOM.to_string(), Room::new(DEFAULT_ROOM));

        Self {
            sessions: HashMap::new(),
            pending: HashSet::new(),
            names: HashMap::new(),
            rooms,
            receiver,
            handle,
            welcome,
            grace: LOGON_GRACE,
        }
    }

    /// Override the logon grace period (used by tests)
    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    /// Run the registry event loop
    ///
    /// Continuously receives and processes commands until all senders are
    /// dropped.
    pub async fn run(mut self) {
        info!("Registry started");

        while let Some(cmd) = self.receiver.recv().await {
            self.handle_command(cmd).await;
        }

        info!("Registry shutting down");
    }

    /// Process a single command
    async fn handle_command(&mut self, cmd: RegistryCommand) {
        match cmd {
            RegistryCommand::Connect { session_id, sender } => {
                self.handle_connect(session_id, sender).await;
            }
            RegistryCommand::Incoming {
                session_id,
                envelope,
            } => {
                self.handle_incoming(session_id, envelope).await;
            }
            RegistryCommand::Malformed { session_id, detail } => {
                self.handle_malformed(session_id, detail).await;
            }
            RegistryCommand::Disconnect { session_id } => {
                self.handle_disconnect(session_id).await;
            }
            RegistryCommand::GraceExpired { session_id } => {
                self.handle_grace_expired(session_id).await;
            }
        }
    }

    /// Handle a new connection: anonymous session, grace timer armed
    async fn handle_connect(&mut self, session_id: SessionId, sender: mpsc::Sender<Envelope>) {
        info!("Session {} connected", session_id);

        let mut session = Session::new(session_id, sender);

        let handle = self.handle.clone();
        let grace = self.grace;
        session.arm_grace(tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            let _ = handle
                .send(RegistryCommand::GraceExpired { session_id })
                .await;
        }));

        self.sessions.insert(session_id, session);
        self.pending.insert(session_id);

        debug!(
            "Total sessions: {}, Total rooms: {}",
            self.sessions.len(),
            self.rooms.len()
        );
    }

    /// Dispatch a decoded envelope from a session
    async fn handle_incoming(&mut self, session_id: SessionId, envelope: Envelope) {
        if !self.sessions.contains_key(&session_id) {
            return;
        }

        match ClientCommand::from_envelope(envelope) {
            ClientCommand::Logon { name } => self.logon(session_id, name).await,
            ClientCommand::Join { room } => self.switch_room(&room, session_id).await,
            ClientCommand::Emote { text } => self.emote(session_id, text).await,
            ClientCommand::Whisper { target, text } => {
                self.whisper(&target, session_id, text).await;
            }
            ClientCommand::List => self.list_members(session_id).await,
            ClientCommand::Chat { text } => self.chat(session_id, text).await,
            ClientCommand::Ignored => {
                debug!("Session {} sent an envelope nobody recognizes", session_id);
            }
        }
    }

    /// Attempt to claim a display name for an anonymous session
    ///
    /// The check-and-insert is atomic because the whole command is one
    /// actor turn. On success the session leaves the pending set and is
    /// switched into the default room; on failure nothing changes and the
    /// grace timer keeps running.
    async fn logon(&mut self, session_id: SessionId, name: String) {
        let Some(session) = self.sessions.get(&session_id) else {
            return;
        };
        if !session.is_anonymous() {
            debug!("Session {} re-sent LOGON, ignored", session_id);
            return;
        }

        if self.names.contains_key(&name) {
            info!("Session {} logon rejected, '{}' is taken", session_id, name);
            let _ = session.send(Envelope::logon_result(&name, false)).await;
            return;
        }

        let Some(session) = self.sessions.get_mut(&session_id) else {
            return;
        };
        session.authenticate(name.clone());
        let _ = session.send(Envelope::logon_result(&name, true)).await;

        self.pending.remove(&session_id);
        self.names.insert(name.clone(), session_id);
        info!("Session {} logged on as '{}'", session_id, name);

        self.switch_room(DEFAULT_ROOM, session_id).await;
    }

    /// Move a session into the named room, creating the room if absent
    ///
    /// Re-requesting the current room is a no-op. Otherwise the session
    /// leaves its current room first (possibly destroying it) and then
    /// joins the target.
    async fn switch_room(&mut self, name: &str, session_id: SessionId) {
        let Some(session) = self.sessions.get(&session_id) else {
            return;
        };
        let current = session.room.clone();
        if current.as_deref() == Some(name) {
            return;
        }

        if !self.rooms.contains_key(name) {
            self.rooms.insert(name.to_string(), Room::new(name));
            info!("Room '{}' created", name);
        }

        if let Some(current) = current {
            self.leave_room(&current, session_id).await;
        }

        if let Some(room) = self.rooms.get_mut(name) {
            room.add_member(session_id, &mut self.sessions, self.welcome.as_ref())
                .await;
        }
    }

    /// Deliver a private message to the active session with this name
    ///
    /// An unknown target is answered with SERVER/ERROR to the sender
    /// rather than dropped silently.
    async fn whisper(&mut self, target: &str, src: SessionId, text: Option<String>) -> bool {
        let src_name = self.sessions.get(&src).and_then(|s| s.name.clone());

        let recipient = self
            .names
            .get(target)
            .and_then(|id| self.sessions.get(id));

        match recipient {
            Some(recipient) => {
                let _ = recipient.send(Envelope::whisper(src_name, text)).await;
                true
            }
            None => {
                if let Some(sender) = self.sessions.get(&src) {
                    let _ = sender
                        .send(Envelope::server_error(format!("No such user: {}", target)))
                        .await;
                }
                false
            }
        }
    }

    /// Broadcast an emote to the session's current room; no-op without one
    async fn emote(&mut self, session_id: SessionId, text: Option<String>) {
        let Some(session) = self.sessions.get(&session_id) else {
            return;
        };
        let Some(room_name) = session.room.clone() else {
            return;
        };
        let envelope = Envelope::chat_me(session.name.clone(), text);
        if let Some(room) = self.rooms.get(&room_name) {
            room.broadcast(&envelope, &self.sessions).await;
        }
    }

    /// Broadcast a public message to the session's current room
    async fn chat(&mut self, session_id: SessionId, text: Option<String>) {
        let Some(session) = self.sessions.get(&session_id) else {
            return;
        };
        let Some(room_name) = session.room.clone() else {
            return;
        };
        let envelope = Envelope::chat_all(session.name.clone(), text);
        if let Some(room) = self.rooms.get(&room_name) {
            room.broadcast(&envelope, &self.sessions).await;
        }
    }

    /// Reply to the session with its current room's member listing
    async fn list_members(&self, session_id: SessionId) {
        let Some(session) = self.sessions.get(&session_id) else {
            return;
        };
        let Some(room_name) = session.room.as_deref() else {
            return;
        };
        let Some(room) = self.rooms.get(room_name) else {
            return;
        };

        let names = room.member_names(&self.sessions);
        let json = serde_json::to_string(&names).unwrap_or_else(|_| "[]".to_string());
        let _ = session.send(Envelope::member_list(room.name(), json)).await;
    }

    /// Answer an undecodable frame; the connection stays open
    async fn handle_malformed(&mut self, session_id: SessionId, detail: String) {
        warn!("Session {} sent a malformed frame: {}", session_id, detail);
        if let Some(session) = self.sessions.get(&session_id) {
            let _ = session
                .send(Envelope::server_error(format!("malformed message: {}", detail)))
                .await;
        }
    }

    /// Handle transport close
    async fn handle_disconnect(&mut self, session_id: SessionId) {
        self.close_session(session_id).await;
    }

    /// Handle grace-timer expiry
    ///
    /// A queued expiry can race a successful logon that aborted the timer
    /// a moment too late; only a still-anonymous session is closed.
    async fn handle_grace_expired(&mut self, session_id: SessionId) {
        let Some(session) = self.sessions.get(&session_id) else {
            return;
        };
        if !session.is_anonymous() {
            return;
        }

        info!("Session {} never logged on, closing", session_id);
        let _ = session.send(Envelope::server_close()).await;
        self.close_session(session_id).await;
    }

    /// Common teardown for timer expiry and transport close
    ///
    /// Idempotent: the second trigger finds no session and does nothing.
    /// Removing the session drops its outbound sender, which ends the
    /// connection's write task and closes the socket.
    async fn close_session(&mut self, session_id: SessionId) {
        let Some(session) = self.sessions.get_mut(&session_id) else {
            return;
        };
        session.close();
        let room = session.room.clone();
        let name = session.name.clone();

        if let Some(room_name) = room {
            self.leave_room(&room_name, session_id).await;
        }

        self.pending.remove(&session_id);
        if let Some(name) = name.as_deref() {
            self.names.remove(name);
        }
        self.sessions.remove(&session_id);

        info!(
            "Session {} ({}) closed",
            session_id,
            name.as_deref().unwrap_or("anonymous")
        );
        debug!(
            "Total sessions: {}, Total rooms: {}",
            self.sessions.len(),
            self.rooms.len()
        );
    }

    /// Remove a session from a room, destroying the room if it empties
    async fn leave_room(&mut self, room_name: &str, session_id: SessionId) {
        let mut now_empty = false;
        if let Some(room) = self.rooms.get_mut(room_name) {
            room.remove_member(session_id, &mut self.sessions, self.welcome.as_ref())
                .await;
            now_empty = room.is_empty();
        }
        if now_empty {
            self.destroy_room(room_name);
        }
    }

    /// Remove a room from the directory; the default room never goes away
    fn destroy_room(&mut self, name: &str) {
        if name == DEFAULT_ROOM {
            return;
        }
        if self.rooms.remove(name).is_some() {
            debug!("Room '{}' destroyed (empty)", name);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::EnvelopeType;
    use crate::welcome::NoWelcome;
    use tokio::time::timeout;

    fn new_registry() -> Registry {
        let (tx, rx) = mpsc::channel(256);
        Registry::new(rx, tx, Arc::new(NoWelcome))
    }

    async fn connect(registry: &mut Registry) -> (SessionId, mpsc::Receiver<Envelope>) {
        let session_id = SessionId::new();
        let (tx, rx) = mpsc::channel(32);
        registry
            .handle_command(RegistryCommand::Connect {
                session_id,
                sender: tx,
            })
            .await;
        (session_id, rx)
    }

    async fn incoming(registry: &mut Registry, session_id: SessionId, envelope: Envelope) {
        registry
            .handle_command(RegistryCommand::Incoming {
                session_id,
                envelope,
            })
            .await;
    }

    async fn logon(registry: &mut Registry, id: SessionId, name: &str) {
        incoming(
            registry,
            id,
            Envelope::new(EnvelopeType::Command, "LOGON", Some(name.into()), None),
        )
        .await;
    }

    async fn join(registry: &mut Registry, id: SessionId, room: &str) {
        incoming(
            registry,
            id,
            Envelope::new(EnvelopeType::Command, "JOIN", None, Some(room.into())),
        )
        .await;
    }

    fn drain(rx: &mut mpsc::Receiver<Envelope>) -> Vec<Envelope> {
        let mut out = Vec::new();
        while let Ok(env) = rx.try_recv() {
            out.push(env);
        }
        out
    }

    #[tokio::test]
    async fn test_logon_joins_default_room() {
        let mut registry = new_registry();
        let (alice, mut alice_rx) = connect(&mut registry).await;
        logon(&mut registry, alice, "alice").await;

        let got = drain(&mut alice_rx);
        assert_eq!(got.len(), 2);
        assert_eq!(got[0], Envelope::logon_result("alice", true));
        assert_eq!(got[1].sub_type, "JOINED");
        assert_eq!(got[1].source.as_deref(), Some(DEFAULT_ROOM));

        assert_eq!(registry.names.get("alice"), Some(&alice));
        assert!(!registry.pending.contains(&alice));
        assert!(registry.rooms[DEFAULT_ROOM].contains(alice));
        assert_eq!(registry.sessions[&alice].room.as_deref(), Some(DEFAULT_ROOM));
    }

    #[tokio::test]
    async fn test_logon_collision_leaves_both_sides_unchanged() {
        let mut registry = new_registry();
        let (first, mut first_rx) = connect(&mut registry).await;
        logon(&mut registry, first, "alice").await;
        drain(&mut first_rx);

        let (second, mut second_rx) = connect(&mut registry).await;
        logon(&mut registry, second, "alice").await;

        let got = drain(&mut second_rx);
        assert_eq!(got, vec![Envelope::logon_result("alice", false)]);

        // The loser stays pending and nameless; the winner is untouched.
        assert!(registry.pending.contains(&second));
        assert!(registry.sessions[&second].is_anonymous());
        assert_eq!(registry.names.get("alice"), Some(&first));
        assert!(drain(&mut first_rx).is_empty());
    }

    #[tokio::test]
    async fn test_logon_ignored_once_authenticated() {
        let mut registry = new_registry();
        let (alice, mut alice_rx) = connect(&mut registry).await;
        logon(&mut registry, alice, "alice").await;
        drain(&mut alice_rx);

        logon(&mut registry, alice, "bob").await;

        assert!(drain(&mut alice_rx).is_empty());
        assert_eq!(registry.sessions[&alice].name.as_deref(), Some("alice"));
        assert!(!registry.names.contains_key("bob"));
    }

    #[tokio::test]
    async fn test_switch_room_creates_lazily_and_keeps_default_alive() {
        let mut registry = new_registry();
        let (alice, mut alice_rx) = connect(&mut registry).await;
        logon(&mut registry, alice, "alice").await;
        drain(&mut alice_rx);

        join(&mut registry, alice, "dev").await;

        let got = drain(&mut alice_rx);
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].sub_type, "JOINED");
        assert_eq!(got[0].source.as_deref(), Some("dev"));

        // "dev" now exists with alice in it; the default room emptied but
        // is never destroyed.
        assert!(registry.rooms["dev"].contains(alice));
        assert_eq!(registry.sessions[&alice].room.as_deref(), Some("dev"));
        assert!(registry.rooms.contains_key(DEFAULT_ROOM));
        assert!(registry.rooms[DEFAULT_ROOM].is_empty());
    }

    #[tokio::test]
    async fn test_rejoining_current_room_is_noop() {
        let mut registry = new_registry();
        let (alice, mut alice_rx) = connect(&mut registry).await;
        logon(&mut registry, alice, "alice").await;
        drain(&mut alice_rx);

        join(&mut registry, alice, DEFAULT_ROOM).await;

        assert!(drain(&mut alice_rx).is_empty());
        assert_eq!(registry.rooms[DEFAULT_ROOM].member_count(), 1);
    }

    #[tokio::test]
    async fn test_chat_broadcast_reaches_everyone_including_sender() {
        let mut registry = new_registry();
        let (alice, mut alice_rx) = connect(&mut registry).await;
        logon(&mut registry, alice, "alice").await;
        join(&mut registry, alice, "dev").await;
        let (bob, mut bob_rx) = connect(&mut registry).await;
        logon(&mut registry, bob, "bob").await;
        join(&mut registry, bob, "dev").await;
        drain(&mut alice_rx);
        drain(&mut bob_rx);

        incoming(
            &mut registry,
            alice,
            Envelope::new(EnvelopeType::Chat, "ALL", None, Some("hi".into())),
        )
        .await;

        let expected = Envelope::chat_all(Some("alice".into()), Some("hi".into()));
        assert_eq!(drain(&mut alice_rx), vec![expected.clone()]);
        assert_eq!(drain(&mut bob_rx), vec![expected]);
    }

    #[tokio::test]
    async fn test_disconnect_destroys_vacated_room_and_frees_the_name() {
        let mut registry = new_registry();
        let (alice, mut alice_rx) = connect(&mut registry).await;
        logon(&mut registry, alice, "alice").await;
        join(&mut registry, alice, "dev").await;
        drain(&mut alice_rx);

        registry
            .handle_command(RegistryCommand::Disconnect { session_id: alice })
            .await;

        assert!(!registry.rooms.contains_key("dev"));
        assert!(registry.rooms.contains_key(DEFAULT_ROOM));
        assert!(registry.sessions.is_empty());
        assert!(registry.names.is_empty());
        assert!(registry.pending.is_empty());

        // A later join recreates the room from scratch.
        let (bob, mut bob_rx) = connect(&mut registry).await;
        logon(&mut registry, bob, "bob").await;
        join(&mut registry, bob, "dev").await;
        drain(&mut bob_rx);
        assert!(registry.rooms["dev"].contains(bob));
        assert_eq!(registry.rooms["dev"].member_count(), 1);
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let mut registry = new_registry();
        let (alice, _alice_rx) = connect(&mut registry).await;
        logon(&mut registry, alice, "alice").await;

        registry
            .handle_command(RegistryCommand::Disconnect { session_id: alice })
            .await;
        registry
            .handle_command(RegistryCommand::Disconnect { session_id: alice })
            .await;

        assert!(registry.sessions.is_empty());
        assert!(registry.names.is_empty());
    }

    #[tokio::test]
    async fn test_whisper_delivered_to_target_only() {
        let mut registry = new_registry();
        let (alice, mut alice_rx) = connect(&mut registry).await;
        logon(&mut registry, alice, "alice").await;
        let (bob, mut bob_rx) = connect(&mut registry).await;
        logon(&mut registry, bob, "bob").await;
        drain(&mut alice_rx);
        drain(&mut bob_rx);

        incoming(
            &mut registry,
            alice,
            Envelope::new(
                EnvelopeType::Command,
                "W",
                Some("bob".into()),
                Some("psst".into()),
            ),
        )
        .await;

        assert_eq!(
            drain(&mut bob_rx),
            vec![Envelope::whisper(Some("alice".into()), Some("psst".into()))]
        );
        assert!(drain(&mut alice_rx).is_empty());
    }

    #[tokio::test]
    async fn test_whisper_to_unknown_name_reports_back() {
        let mut registry = new_registry();
        let (alice, mut alice_rx) = connect(&mut registry).await;
        logon(&mut registry, alice, "alice").await;
        drain(&mut alice_rx);

        incoming(
            &mut registry,
            alice,
            Envelope::new(
                EnvelopeType::Command,
                "WHISPER",
                Some("nobody".into()),
                Some("psst".into()),
            ),
        )
        .await;

        let got = drain(&mut alice_rx);
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].kind, EnvelopeType::Server);
        assert_eq!(got[0].sub_type, "ERROR");
        assert!(got[0].message.as_deref().unwrap().contains("nobody"));
    }

    #[tokio::test]
    async fn test_list_members_in_join_order() {
        let mut registry = new_registry();
        let (alice, mut alice_rx) = connect(&mut registry).await;
        logon(&mut registry, alice, "alice").await;
        let (bob, mut bob_rx) = connect(&mut registry).await;
        logon(&mut registry, bob, "bob").await;
        drain(&mut alice_rx);
        drain(&mut bob_rx);

        incoming(
            &mut registry,
            bob,
            Envelope::new(EnvelopeType::Command, "LS", None, None),
        )
        .await;

        let got = drain(&mut bob_rx);
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].sub_type, "LIST");
        assert_eq!(got[0].source.as_deref(), Some(DEFAULT_ROOM));
        assert_eq!(got[0].message.as_deref(), Some(r#"["alice","bob"]"#));
    }

    #[tokio::test]
    async fn test_emote_broadcasts_chat_me() {
        let mut registry = new_registry();
        let (alice, mut alice_rx) = connect(&mut registry).await;
        logon(&mut registry, alice, "alice").await;
        drain(&mut alice_rx);

        incoming(
            &mut registry,
            alice,
            Envelope::new(EnvelopeType::Command, "ME", None, Some("waves".into())),
        )
        .await;

        assert_eq!(
            drain(&mut alice_rx),
            vec![Envelope::chat_me(Some("alice".into()), Some("waves".into()))]
        );
    }

    #[tokio::test]
    async fn test_room_scoped_commands_without_room_are_noops() {
        let mut registry = new_registry();
        let (anon, mut anon_rx) = connect(&mut registry).await;

        for envelope in [
            Envelope::new(EnvelopeType::Command, "ME", None, Some("waves".into())),
            Envelope::new(EnvelopeType::Command, "LS", None, None),
            Envelope::new(EnvelopeType::Chat, "ALL", None, Some("hi".into())),
        ] {
            incoming(&mut registry, anon, envelope).await;
        }

        assert!(drain(&mut anon_rx).is_empty());
    }

    #[tokio::test]
    async fn test_join_while_anonymous_then_logon_switches_to_default() {
        let mut registry = new_registry();
        let (anon, mut anon_rx) = connect(&mut registry).await;

        join(&mut registry, anon, "dev").await;
        let got = drain(&mut anon_rx);
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].sub_type, "JOINED");
        assert!(registry.rooms["dev"].contains(anon));

        // Logon moves the session into the default room with full switch
        // semantics, so the vacated room is destroyed.
        logon(&mut registry, anon, "alice").await;
        assert!(!registry.rooms.contains_key("dev"));
        assert!(registry.rooms[DEFAULT_ROOM].contains(anon));
        assert_eq!(registry.sessions[&anon].room.as_deref(), Some(DEFAULT_ROOM));
    }

    #[tokio::test]
    async fn test_unrecognized_sub_type_is_silently_ignored() {
        let mut registry = new_registry();
        let (alice, mut alice_rx) = connect(&mut registry).await;
        logon(&mut registry, alice, "alice").await;
        drain(&mut alice_rx);

        incoming(
            &mut registry,
            alice,
            Envelope::new(EnvelopeType::Command, "FROBNICATE", None, None),
        )
        .await;

        assert!(drain(&mut alice_rx).is_empty());
    }

    #[tokio::test]
    async fn test_malformed_frame_answered_and_connection_kept() {
        let mut registry = new_registry();
        let (alice, mut alice_rx) = connect(&mut registry).await;

        registry
            .handle_command(RegistryCommand::Malformed {
                session_id: alice,
                detail: "expected value at line 1".into(),
            })
            .await;

        let got = drain(&mut alice_rx);
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].sub_type, "ERROR");
        assert!(registry.sessions.contains_key(&alice));
    }

    #[tokio::test]
    async fn test_grace_timer_closes_silent_connection() {
        let (tx, rx) = mpsc::channel(256);
        let registry = Registry::new(rx, tx.clone(), Arc::new(NoWelcome))
            .with_grace(Duration::from_millis(50));
        tokio::spawn(registry.run());

        let session_id = SessionId::new();
        let (msg_tx, mut msg_rx) = mpsc::channel(32);
        tx.send(RegistryCommand::Connect {
            session_id,
            sender: msg_tx,
        })
        .await
        .unwrap();

        // No envelope from the client is required to trigger the close.
        let env = timeout(Duration::from_secs(1), msg_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(env, Envelope::server_close());

        // Teardown drops the outbound sender, ending the stream.
        let end = timeout(Duration::from_secs(1), msg_rx.recv()).await.unwrap();
        assert!(end.is_none());
    }

    #[tokio::test]
    async fn test_failed_logon_does_not_extend_the_grace_period() {
        let (tx, rx) = mpsc::channel(256);
        let registry = Registry::new(rx, tx.clone(), Arc::new(NoWelcome))
            .with_grace(Duration::from_millis(80));
        tokio::spawn(registry.run());

        let winner = SessionId::new();
        let (winner_tx, mut winner_rx) = mpsc::channel(32);
        tx.send(RegistryCommand::Connect {
            session_id: winner,
            sender: winner_tx,
        })
        .await
        .unwrap();
        tx.send(RegistryCommand::Incoming {
            session_id: winner,
            envelope: Envelope::new(EnvelopeType::Command, "LOGON", Some("alice".into()), None),
        })
        .await
        .unwrap();

        let loser = SessionId::new();
        let (loser_tx, mut loser_rx) = mpsc::channel(32);
        tx.send(RegistryCommand::Connect {
            session_id: loser,
            sender: loser_tx,
        })
        .await
        .unwrap();
        tx.send(RegistryCommand::Incoming {
            session_id: loser,
            envelope: Envelope::new(EnvelopeType::Command, "LOGON", Some("alice".into()), None),
        })
        .await
        .unwrap();

        // The loser is refused, never retries, and is closed once its
        // original grace window elapses.
        let refusal = timeout(Duration::from_secs(1), loser_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(refusal, Envelope::logon_result("alice", false));

        let close = timeout(Duration::from_secs(1), loser_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(close, Envelope::server_close());
        assert!(timeout(Duration::from_secs(1), loser_rx.recv())
            .await
            .unwrap()
            .is_none());

        // The winner's session is unaffected: still answers a listing.
        drain(&mut winner_rx);
        tx.send(RegistryCommand::Incoming {
            session_id: winner,
            envelope: Envelope::new(EnvelopeType::Command, "LS", None, None),
        })
        .await
        .unwrap();
        let listing = timeout(Duration::from_secs(1), winner_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(listing.sub_type, "LIST");
    }
}
