//! Chat transport event types
//!
//! The transport delivers [`ChatEvent`]s to the orchestrator and carries
//! [`Reply`]s back to the user. These types are the whole surface between
//! the core pipeline and whatever chat service fronts it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Chat user identifier, assigned by the transport.
pub type UserId = i64;

/// How the transport classified an inbound payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatEventKind {
    /// Free-form message text
    Text,
    /// Inline-button callback data
    Callback,
    /// Slash command (payload includes the leading `/`)
    Command,
}

/// Inbound event from the chat transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatEvent {
    pub user_id: UserId,
    pub kind: ChatEventKind,
    pub payload: String,
    pub timestamp: DateTime<Utc>,
}

impl ChatEvent {
    pub fn new(user_id: UserId, kind: ChatEventKind, payload: impl Into<String>) -> Self {
        Self {
            user_id,
            kind,
            payload: payload.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn text(user_id: UserId, payload: impl Into<String>) -> Self {
        Self::new(user_id, ChatEventKind::Text, payload)
    }

    pub fn callback(user_id: UserId, payload: impl Into<String>) -> Self {
        Self::new(user_id, ChatEventKind::Callback, payload)
    }

    pub fn command(user_id: UserId, payload: impl Into<String>) -> Self {
        Self::new(user_id, ChatEventKind::Command, payload)
    }
}

/// One inline-keyboard option offered with a [`Reply::Choice`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChoiceOption {
    /// Button label shown to the user
    pub label: String,
    /// Callback payload returned when pressed
    pub data: String,
}

/// Outbound event for the chat transport to deliver.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Reply {
    /// Plain text message
    Text { user_id: UserId, body: String },

    /// Text message with inline-keyboard options
    Choice {
        user_id: UserId,
        body: String,
        options: Vec<ChoiceOption>,
    },

    /// Audio file delivery with display metadata
    Audio {
        user_id: UserId,
        path: PathBuf,
        title: String,
        performer: String,
    },
}

impl Reply {
    pub fn user_id(&self) -> UserId {
        match self {
            Reply::Text { user_id, .. }
            | Reply::Choice { user_id, .. }
            | Reply::Audio { user_id, .. } => *user_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_constructors_tag_kind() {
        assert_eq!(ChatEvent::text(1, "hi").kind, ChatEventKind::Text);
        assert_eq!(ChatEvent::callback(1, "lang_en").kind, ChatEventKind::Callback);
        assert_eq!(ChatEvent::command(1, "/start").kind, ChatEventKind::Command);
    }

    #[test]
    fn reply_user_id_covers_all_variants() {
        let audio = Reply::Audio {
            user_id: 7,
            path: PathBuf::from("/tmp/track.m4a"),
            title: "Track".into(),
            performer: "Artist".into(),
        };
        assert_eq!(audio.user_id(), 7);
        assert_eq!(Reply::Text { user_id: 3, body: "hi".into() }.user_id(), 3);
    }

    #[test]
    fn reply_serializes_with_type_tag() {
        let json = serde_json::to_string(&Reply::Text { user_id: 1, body: "hi".into() }).unwrap();
        assert!(json.contains("\"type\":\"Text\""));
    }
}
