//! Room struct definition
//!
//! A named broadcast group with insertion-ordered membership. Rooms only
//! mutate their own membership; cross-room concerns (lazy creation,
//! destruction-on-empty, the default-room exemption) belong to the
//! registry that owns them.

use std::collections::HashMap;

use crate::envelope::Envelope;
use crate::session::Session;
use crate::types::SessionId;
use crate::welcome::WelcomeProvider;

/// A named chat room
///
/// Membership is a set (no duplicate entries) kept in insertion order,
/// which is also broadcast order. Delivery goes through each member
/// session's outbound channel; a failed delivery is skipped, never fatal.
#[derive(Debug)]
pub struct Room {
    name: String,
    members: Vec<SessionId>,
}

impl Room {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            members: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    pub fn contains(&self, id: SessionId) -> bool {
        self.members.contains(&id)
    }

    /// Add a session to the room
    ///
    /// No-op returning false if the session is already a member. Otherwise
    /// the existing membership is told about the newcomer (the joiner does
    /// not receive the announcement about itself), the session is inserted
    /// and its room reference set, and the joiner gets a direct welcome
    /// followed by whatever content the welcome provider contributes.
    pub async fn add_member(
        &mut self,
        id: SessionId,
        sessions: &mut HashMap<SessionId, Session>,
        welcome: &dyn WelcomeProvider,
    ) -> bool {
        if self.members.contains(&id) {
            return false;
        }

        let joiner_name = sessions.get(&id).and_then(|s| s.name.clone());
        self.broadcast(&Envelope::client_join(&self.name, joiner_name), sessions)
            .await;

        self.members.push(id);
        if let Some(session) = sessions.get_mut(&id) {
            session.room = Some(self.name.clone());
        }

        if let Some(joiner) = sessions.get(&id) {
            let greeting = format!("Welcome {}", joiner.display_name());
            let _ = joiner
                .send(Envelope::joined(&self.name, Some(greeting)))
                .await;

            if let Some(content) = welcome.on_join(&self.name, joiner.display_name()).await {
                let _ = joiner
                    .send(Envelope::chat_all(
                        Some(welcome.display_name().to_string()),
                        Some(content),
                    ))
                    .await;
            }
        }

        true
    }

    /// Remove a session from the room
    ///
    /// The leaver gets the provider's farewell content (if any) before
    /// removal; the remaining members, if there are any, are told about
    /// the departure. Returns whether removal occurred. The caller checks
    /// `is_empty` afterwards to decide on destruction.
    pub async fn remove_member(
        &mut self,
        id: SessionId,
        sessions: &mut HashMap<SessionId, Session>,
        welcome: &dyn WelcomeProvider,
    ) -> bool {
        let Some(pos) = self.members.iter().position(|m| *m == id) else {
            return false;
        };

        let leaver_name = sessions.get(&id).and_then(|s| s.name.clone());

        if let Some(leaver) = sessions.get(&id) {
            if let Some(content) = welcome.on_leave(&self.name, leaver.display_name()).await {
                let _ = leaver
                    .send(Envelope::chat_all(
                        Some(welcome.display_name().to_string()),
                        Some(content),
                    ))
                    .await;
            }
        }

        self.members.remove(pos);
        if let Some(session) = sessions.get_mut(&id) {
            session.room = None;
        }

        if !self.members.is_empty() {
            self.broadcast(&Envelope::client_leave(&self.name, leaver_name), sessions)
                .await;
        }

        true
    }

    /// Deliver an envelope to every member, in membership order
    pub async fn broadcast(&self, envelope: &Envelope, sessions: &HashMap<SessionId, Session>) {
        for id in &self.members {
            if let Some(member) = sessions.get(id) {
                // One dead connection must not block the rest.
                let _ = member.send(envelope.clone()).await;
            }
        }
    }

    /// Snapshot of member display names in membership order
    pub fn member_names(&self, sessions: &HashMap<SessionId, Session>) -> Vec<String> {
        self.members
            .iter()
            .filter_map(|id| sessions.get(id))
            .map(|s| s.display_name().to_string())
            .collect()
    }
}
