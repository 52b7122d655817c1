//! Wire envelope definitions
//!
//! Every frame exchanged with a client carries exactly one JSON envelope:
//! `{type, subType, source, message}`. `type` is a closed enumeration;
//! `subType` is a plain string interpreted against the protocol catalog.
//! `source` and `message` are nullable and their meaning depends on the
//! `(type, subType)` pair.
//!
//! Inbound envelopes are lowered into [`ClientCommand`], a closed set of
//! variants, so dispatch is a pattern match rather than a string-keyed
//! conditional chain.

use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Top-level envelope type
///
/// `Local` is reserved for client-side use (client-local errors); the
/// server accepts it on the wire but never acts on or produces it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EnvelopeType {
    Server,
    Channel,
    Chat,
    Command,
    Local,
}

/// The immutable wire message shape
///
/// Constructed once and serialized as-is. The associated functions below
/// are the only places that spell out server-authored `(type, subType)`
/// pairs, so the outbound catalog lives in one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: EnvelopeType,
    #[serde(rename = "subType")]
    pub sub_type: String,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl Envelope {
    pub fn new(
        kind: EnvelopeType,
        sub_type: impl Into<String>,
        source: Option<String>,
        message: Option<String>,
    ) -> Self {
        Self {
            kind,
            sub_type: sub_type.into(),
            source,
            message,
        }
    }

    /// Parse a raw frame into an envelope
    ///
    /// Fails with [`AppError::MalformedEnvelope`] when the input is not
    /// valid JSON, the `type` is unknown, or `type`/`subType` is missing.
    /// `source` and `message` default to null when absent.
    pub fn read(raw: &str) -> Result<Self, AppError> {
        Ok(serde_json::from_str(raw)?)
    }

    /// SERVER/LOGON - logon outcome for the requested name
    pub fn logon_result(name: &str, accepted: bool) -> Self {
        Self::new(
            EnvelopeType::Server,
            "LOGON",
            Some(name.to_string()),
            Some(accepted.to_string()),
        )
    }

    /// SERVER/ERROR - server-side error text
    pub fn server_error(text: impl Into<String>) -> Self {
        Self::new(EnvelopeType::Server, "ERROR", None, Some(text.into()))
    }

    /// SERVER/CLOSE - the server is closing this connection
    pub fn server_close() -> Self {
        Self::new(EnvelopeType::Server, "CLOSE", None, None)
    }

    /// CHANNEL/CLIENT JOIN - a member joined, announced to the others
    pub fn client_join(room: &str, name: Option<String>) -> Self {
        Self::new(EnvelopeType::Channel, "CLIENT JOIN", Some(room.to_string()), name)
    }

    /// CHANNEL/JOINED - direct welcome to the session that just joined
    pub fn joined(room: &str, welcome: Option<String>) -> Self {
        Self::new(EnvelopeType::Channel, "JOINED", Some(room.to_string()), welcome)
    }

    /// CHANNEL/CLIENT LEAVE - a member left, announced to the rest
    pub fn client_leave(room: &str, name: Option<String>) -> Self {
        Self::new(EnvelopeType::Channel, "CLIENT LEAVE", Some(room.to_string()), name)
    }

    /// CHANNEL/LIST - member names as a JSON array rendered to text
    pub fn member_list(room: &str, names_json: String) -> Self {
        Self::new(EnvelopeType::Channel, "LIST", Some(room.to_string()), Some(names_json))
    }

    /// CHAT/ALL - public room message
    pub fn chat_all(source: Option<String>, text: Option<String>) -> Self {
        Self::new(EnvelopeType::Chat, "ALL", source, text)
    }

    /// CHAT/ME - emote
    pub fn chat_me(source: Option<String>, text: Option<String>) -> Self {
        Self::new(EnvelopeType::Chat, "ME", source, text)
    }

    /// CHAT/WHISPER - private message
    pub fn whisper(from: Option<String>, text: Option<String>) -> Self {
        Self::new(EnvelopeType::Chat, "WHISPER", from, text)
    }
}

/// Interpreted client command
///
/// The closed set of things a client can ask for. Anything the catalog
/// does not recognize, and any command envelope missing the field its
/// command needs, lowers to `Ignored` - never an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientCommand {
    /// Claim a display name (valid only while anonymous)
    Logon { name: String },
    /// Switch to the named room, creating it if absent
    Join { room: String },
    /// Emote to the current room
    Emote { text: Option<String> },
    /// Private message; `target` is the recipient's display name
    Whisper { target: String, text: Option<String> },
    /// Request the current room's member listing
    List,
    /// Plain chat to the current room
    Chat { text: Option<String> },
    /// Unrecognized or incomplete - dropped silently
    Ignored,
}

impl ClientCommand {
    /// Lower an inbound envelope into a command
    ///
    /// `W`/`WHISPER` carry the target in `source`; `JOIN` carries the
    /// room in `message`; `LOGON` carries the requested name in `source`.
    pub fn from_envelope(envelope: Envelope) -> Self {
        match envelope.kind {
            EnvelopeType::Command => match envelope.sub_type.as_str() {
                "LOGON" => match envelope.source {
                    Some(name) => Self::Logon { name },
                    None => Self::Ignored,
                },
                "JOIN" => match envelope.message {
                    Some(room) => Self::Join { room },
                    None => Self::Ignored,
                },
                "ME" | "EMOTE" => Self::Emote {
                    text: envelope.message,
                },
                "W" | "WHISPER" => match envelope.source {
                    Some(target) => Self::Whisper {
                        target,
                        text: envelope.message,
                    },
                    None => Self::Ignored,
                },
                "LS" | "LIST" => Self::List,
                _ => Self::Ignored,
            },
            // Any CHAT envelope is a public message to the current room,
            // regardless of subType.
            EnvelopeType::Chat => Self::Chat {
                text: envelope.message,
            },
            _ => Self::Ignored,
        }
    }
}
