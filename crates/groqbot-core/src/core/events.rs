//! Store event types for subscribers.
//!
//! The session store publishes one event after every successful mutation.
//! Presentation layers subscribe once and re-read whatever state they render,
//! instead of polling the store on a timer. Events are serializable so a
//! front end can forward them as JSON.

use serde::{Deserialize, Serialize};

use crate::core::store::{MessageId, Role, SessionId};

/// Events published by the session store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StoreEvent {
    /// A session was created and became active.
    SessionCreated { session_id: SessionId },

    /// A session title changed (explicit rename or automatic first-message title).
    SessionRenamed { session_id: SessionId, title: String },

    /// A session switched to another model.
    ModelChanged { session_id: SessionId, model: String },

    /// A session was removed.
    SessionDeleted { session_id: SessionId },

    /// The active-session pointer moved (`None` when the store became empty).
    ActiveChanged { session_id: Option<SessionId> },

    /// All messages of a session were removed.
    MessagesCleared { session_id: SessionId },

    /// A message was appended to a session.
    MessageAdded {
        session_id: SessionId,
        message_id: MessageId,
        role: Role,
    },

    /// The trailing assistant message received new content while streaming.
    AssistantUpdated {
        session_id: SessionId,
        message_id: MessageId,
    },

    /// The in-flight reply of a session reached its terminal content.
    StreamFinished {
        session_id: SessionId,
        message_id: MessageId,
    },
}

impl StoreEvent {
    /// Returns the session this event concerns, if any.
    pub fn session_id(&self) -> Option<SessionId> {
        match self {
            StoreEvent::SessionCreated { session_id }
            | StoreEvent::SessionRenamed { session_id, .. }
            | StoreEvent::ModelChanged { session_id, .. }
            | StoreEvent::SessionDeleted { session_id }
            | StoreEvent::MessagesCleared { session_id }
            | StoreEvent::MessageAdded { session_id, .. }
            | StoreEvent::AssistantUpdated { session_id, .. }
            | StoreEvent::StreamFinished { session_id, .. } => Some(*session_id),
            StoreEvent::ActiveChanged { session_id } => *session_id,
        }
    }
}
