//! Welcome content provider
//!
//! Rooms forward a line of provider content to a session when it joins or
//! leaves. The provider is a pluggable collaborator: the core only invokes
//! it and forwards the result, so a provider that returns `None` changes
//! nothing about room behavior.

use async_trait::async_trait;

/// Source of decorative join/leave content
///
/// `display_name` is used as the `source` of the provider-authored chat
/// lines, so clients render them like messages from an ordinary member.
#[async_trait]
pub trait WelcomeProvider: Send + Sync {
    /// Name the provider's lines are attributed to
    fn display_name(&self) -> &str;

    /// Content forwarded to a session right after its JOINED welcome
    async fn on_join(&self, room: &str, name: &str) -> Option<String>;

    /// Content forwarded to a session just before it leaves a room
    async fn on_leave(&self, room: &str, name: &str) -> Option<String>;
}

/// Provider that never contributes content
///
/// Used by the test suite to keep message streams minimal.
pub struct NoWelcome;

#[async_trait]
impl WelcomeProvider for NoWelcome {
    fn display_name(&self) -> &str {
        "Server"
    }

    async fn on_join(&self, _room: &str, _name: &str) -> Option<String> {
        None
    }

    async fn on_leave(&self, _room: &str, _name: &str) -> Option<String> {
        None
    }
}

/// Built-in trivia lines greeting joiners and seeing leavers off
pub struct TriviaWelcome;

const TRIVIA: &[&str] = &[
    "a group of cats is called a clowder.",
    "honey never spoils.",
    "octopuses have three hearts.",
    "a day on Venus is longer than its year.",
    "bananas are berries, but strawberries are not.",
];

#[async_trait]
impl WelcomeProvider for TriviaWelcome {
    fn display_name(&self) -> &str {
        "Trivia"
    }

    async fn on_join(&self, _room: &str, name: &str) -> Option<String> {
        use rand::Rng;
        let fact = TRIVIA[rand::thread_rng().gen_range(0..TRIVIA.len())];
        Some(format!("{}, did you know... {}", name, fact))
    }

    async fn on_leave(&self, _room: &str, name: &str) -> Option<String> {
        Some(format!("Goodbye for now, {}", name))
    }
}
