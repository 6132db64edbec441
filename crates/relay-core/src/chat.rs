//! Chat request types handed to the framer.
//!
//! These are the caller-facing shapes; `wire` maps them onto the backend's
//! protobuf schema.

use serde::{Deserialize, Serialize};

/// Speaker of a chat turn. The backend only distinguishes the user from
/// everyone else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ChatRole {
    User,
    Other,
}

impl ChatRole {
    /// "user" maps to `User`; any other name maps to `Other`.
    pub fn from_name(name: &str) -> Self {
        if name == "user" {
            ChatRole::User
        } else {
            ChatRole::Other
        }
    }
}

impl From<String> for ChatRole {
    fn from(name: String) -> Self {
        Self::from_name(&name)
    }
}

impl From<ChatRole> for String {
    fn from(role: ChatRole) -> String {
        match role {
            ChatRole::User => "user".into(),
            ChatRole::Other => "assistant".into(),
        }
    }
}

/// One message in the conversation. Wire message ids are assigned when the
/// request is framed, not here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: ChatRole,
    pub content: String,
}

impl ChatTurn {
    pub fn new(role: ChatRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(ChatRole::User, content)
    }
}

/// A complete outbound chat call: the transcript plus the requested model.
///
/// `model` carries the relay's routing prefix (e.g. `cursor/claude-3.5-sonnet`);
/// the framer strips it before the name goes on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatTurn>,
}

impl ChatRequest {
    pub fn new(model: impl Into<String>, messages: Vec<ChatTurn>) -> Self {
        Self {
            model: model.into(),
            messages,
        }
    }
}
