//! In-memory session store.
//!
//! `SessionStore` is the single owner of every session and message for the
//! lifetime of the process. Consumers get cloned read views and go through the
//! store's operations for every change. Each successful mutation publishes a
//! [`StoreEvent`] to subscribers.
//!
//! Sessions are kept most-recent-first by creation time. Message activity
//! never reorders them.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, MutexGuard};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, info};
use uuid::Uuid;

use crate::core::events::StoreEvent;
use crate::providers::HistoryMessage;

/// Title given to sessions created without one.
pub const DEFAULT_TITLE: &str = "New Chat";

/// Maximum length (in chars) of the title derived from the first user message.
pub const AUTO_TITLE_MAX_CHARS: usize = 45;

/// Buffered events per subscriber before it starts lagging.
const EVENT_CAPACITY: usize = 256;

/// Unique session identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(Uuid);

impl SessionId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl FromStr for SessionId {
    type Err = uuid::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(value.trim()).map(Self)
    }
}

/// Unique message identifier (unique across the whole store).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(Uuid);

impl MessageId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

/// Author of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    /// Wire name of the role.
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single chat message.
///
/// Only the `content` of an assistant message ever changes after creation,
/// while its reply is streaming.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub role: Role,
    pub content: String,
    pub ts: DateTime<Utc>,
}

impl Message {
    fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: MessageId::new(),
            role,
            content: content.into(),
            ts: Utc::now(),
        }
    }
}

/// One independent conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub title: String,
    /// Engine identifier used for this session's requests.
    pub model: String,
    pub created_at: DateTime<Utc>,
    pub messages: Vec<Message>,
    /// Set by an explicit rename; disables the automatic first-message title.
    pub title_locked: bool,
}

impl Session {
    fn new(model: String, title: Option<&str>) -> Self {
        Self {
            id: SessionId::new(),
            title: title.unwrap_or(DEFAULT_TITLE).to_string(),
            model,
            created_at: Utc::now(),
            messages: Vec::new(),
            title_locked: false,
        }
    }
}

/// Errors returned by store operations.
///
/// A failed operation never mutates the store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("Session not found: {0}")]
    NotFound(SessionId),

    #[error("A reply is still streaming in session {0}")]
    StreamInFlight(SessionId),

    #[error("No reply is streaming in session {0}")]
    NoStreamInFlight(SessionId),
}

/// Authoritative state of all sessions and messages.
pub struct SessionStore {
    /// Most-recent-first.
    sessions: Vec<Session>,
    active_id: Option<SessionId>,
    /// Sessions with a reply in flight.
    streaming: HashSet<SessionId>,
    events: broadcast::Sender<StoreEvent>,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            sessions: Vec::new(),
            active_id: None,
            streaming: HashSet::new(),
            events,
        }
    }

    /// Subscribes to store events published after each successful mutation.
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }

    fn publish(&self, event: StoreEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    fn find(&self, id: SessionId) -> Option<&Session> {
        self.sessions.iter().find(|s| s.id == id)
    }

    fn find_mut(&mut self, id: SessionId) -> Option<&mut Session> {
        self.sessions.iter_mut().find(|s| s.id == id)
    }

    // ========================================================================
    // Sessions
    // ========================================================================

    /// Creates an empty session at the front of the list and makes it active.
    pub fn create_session(&mut self, model: impl Into<String>, title: Option<&str>) -> Session {
        let session = Session::new(model.into(), title);
        info!(session_id = %session.id, model = %session.model, "Created session");

        self.sessions.insert(0, session.clone());
        self.active_id = Some(session.id);

        self.publish(StoreEvent::SessionCreated {
            session_id: session.id,
        });
        self.publish(StoreEvent::ActiveChanged {
            session_id: Some(session.id),
        });
        session
    }

    /// Returns all sessions, most-recent-first.
    pub fn list_sessions(&self) -> Vec<Session> {
        self.sessions.clone()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn active_id(&self) -> Option<SessionId> {
        self.active_id
    }

    /// Makes `id` the active session.
    ///
    /// # Errors
    /// Returns `NotFound` for an unknown id; the active pointer is left unchanged.
    pub fn set_active_id(&mut self, id: SessionId) -> Result<(), StoreError> {
        if self.find(id).is_none() {
            return Err(StoreError::NotFound(id));
        }
        if self.active_id != Some(id) {
            self.active_id = Some(id);
            self.publish(StoreEvent::ActiveChanged {
                session_id: Some(id),
            });
        }
        Ok(())
    }

    pub fn get_session(&self, id: SessionId) -> Option<Session> {
        self.find(id).cloned()
    }

    pub fn active_session(&self) -> Option<Session> {
        self.active_id.and_then(|id| self.get_session(id))
    }

    /// Resolves a full id or a unique id prefix to a session id.
    pub fn resolve_id(&self, needle: &str) -> Option<SessionId> {
        let needle = needle.trim();
        if needle.is_empty() {
            return None;
        }
        if let Ok(id) = needle.parse::<SessionId>() {
            return self.find(id).map(|s| s.id);
        }

        let mut matches = self
            .sessions
            .iter()
            .filter(|s| s.id.to_string().starts_with(needle));
        match (matches.next(), matches.next()) {
            (Some(session), None) => Some(session.id),
            _ => None,
        }
    }

    /// Sets an explicit title. Returns `false` if the session does not exist.
    ///
    /// An explicit rename disables the automatic first-message title.
    pub fn rename_session(&mut self, id: SessionId, title: &str) -> bool {
        let Some(session) = self.find_mut(id) else {
            return false;
        };
        session.title_locked = true;
        if session.title == title {
            return true;
        }
        session.title = title.to_string();
        self.publish(StoreEvent::SessionRenamed {
            session_id: id,
            title: title.to_string(),
        });
        true
    }

    /// Derives the title from the first user message unless the title is locked.
    ///
    /// Returns `true` if the title changed.
    pub fn apply_auto_title(&mut self, id: SessionId, first_message: &str) -> bool {
        let title = auto_title(first_message);
        let Some(session) = self.find_mut(id) else {
            return false;
        };
        if session.title_locked || title.is_empty() || session.title == title {
            return false;
        }
        session.title.clone_from(&title);
        self.publish(StoreEvent::SessionRenamed {
            session_id: id,
            title,
        });
        true
    }

    /// Changes the model of a session. Returns `false` if the session does not exist.
    pub fn change_model(&mut self, id: SessionId, model: &str) -> bool {
        let Some(session) = self.find_mut(id) else {
            return false;
        };
        if session.model == model {
            return true;
        }
        session.model = model.to_string();
        self.publish(StoreEvent::ModelChanged {
            session_id: id,
            model: model.to_string(),
        });
        true
    }

    /// Removes a session. Returns `false` if the session does not exist.
    ///
    /// Deleting the active session activates the new front of the list, or
    /// clears the pointer when no session remains.
    pub fn delete_session(&mut self, id: SessionId) -> bool {
        let before = self.sessions.len();
        self.sessions.retain(|s| s.id != id);
        if self.sessions.len() == before {
            return false;
        }
        self.streaming.remove(&id);
        info!(session_id = %id, "Deleted session");
        self.publish(StoreEvent::SessionDeleted { session_id: id });

        if self.active_id == Some(id) {
            self.active_id = self.sessions.first().map(|s| s.id);
            self.publish(StoreEvent::ActiveChanged {
                session_id: self.active_id,
            });
        }
        true
    }

    /// Removes every message of a session, keeping its metadata.
    ///
    /// Returns `Ok(false)` if the session does not exist.
    ///
    /// # Errors
    /// Returns `StreamInFlight` while a reply is streaming into the session.
    pub fn clear_messages(&mut self, id: SessionId) -> Result<bool, StoreError> {
        if self.streaming.contains(&id) {
            return Err(StoreError::StreamInFlight(id));
        }
        let Some(session) = self.find_mut(id) else {
            return Ok(false);
        };
        session.messages.clear();
        self.publish(StoreEvent::MessagesCleared { session_id: id });
        Ok(true)
    }

    // ========================================================================
    // Messages
    // ========================================================================

    /// Appends a message with the content exactly as given.
    ///
    /// # Errors
    /// Returns `NotFound` for an unknown session and `StreamInFlight` while a
    /// reply is streaming into it.
    pub fn add_message(
        &mut self,
        session_id: SessionId,
        role: Role,
        content: impl Into<String>,
    ) -> Result<Message, StoreError> {
        if self.streaming.contains(&session_id) {
            return Err(StoreError::StreamInFlight(session_id));
        }
        self.push_message(session_id, Message::new(role, content))
    }

    fn push_message(
        &mut self,
        session_id: SessionId,
        message: Message,
    ) -> Result<Message, StoreError> {
        let session = self
            .find_mut(session_id)
            .ok_or(StoreError::NotFound(session_id))?;
        session.messages.push(message.clone());
        self.publish(StoreEvent::MessageAdded {
            session_id,
            message_id: message.id,
            role: message.role,
        });
        Ok(message)
    }

    /// Returns the messages of a session in append order (empty if absent).
    pub fn messages(&self, session_id: SessionId) -> Vec<Message> {
        self.find(session_id)
            .map(|s| s.messages.clone())
            .unwrap_or_default()
    }

    /// Returns the `{role, content}` pairs used to build a completion request.
    pub fn history(&self, session_id: SessionId) -> Vec<HistoryMessage> {
        self.find(session_id)
            .map(|s| {
                s.messages
                    .iter()
                    .map(|m| HistoryMessage::new(m.role, m.content.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Replaces the content of the last message if it is an assistant message.
    ///
    /// Any other case is a no-op. Returns `true` if content was replaced.
    pub fn update_last_assistant_message(&mut self, session_id: SessionId, content: &str) -> bool {
        let Some(last) = self
            .find_mut(session_id)
            .and_then(|s| s.messages.last_mut())
        else {
            return false;
        };
        if last.role != Role::Assistant {
            return false;
        }
        content.clone_into(&mut last.content);
        let message_id = last.id;
        self.publish(StoreEvent::AssistantUpdated {
            session_id,
            message_id,
        });
        true
    }

    // ========================================================================
    // Streaming
    // ========================================================================

    pub fn is_streaming(&self, session_id: SessionId) -> bool {
        self.streaming.contains(&session_id)
    }

    /// Appends the empty assistant placeholder and marks the session as streaming.
    ///
    /// Until [`finish_stream`](Self::finish_stream) runs, the placeholder stays
    /// the trailing message: appends and clears are refused.
    ///
    /// # Errors
    /// Returns `NotFound` for an unknown session and `StreamInFlight` if a
    /// reply is already streaming into it.
    pub fn begin_stream(&mut self, session_id: SessionId) -> Result<Message, StoreError> {
        if self.streaming.contains(&session_id) {
            return Err(StoreError::StreamInFlight(session_id));
        }
        let message = self.push_message(session_id, Message::new(Role::Assistant, ""))?;
        self.streaming.insert(session_id);
        debug!(session_id = %session_id, message_id = %message.id, "Stream started");
        Ok(message)
    }

    /// Writes the terminal content of the in-flight reply and ends the stream.
    ///
    /// Succeeds once per [`begin_stream`](Self::begin_stream).
    ///
    /// # Errors
    /// Returns `NotFound` if the session was deleted meanwhile and
    /// `NoStreamInFlight` if no reply is streaming into it.
    pub fn finish_stream(&mut self, session_id: SessionId, content: &str) -> Result<(), StoreError> {
        if self.find(session_id).is_none() {
            return Err(StoreError::NotFound(session_id));
        }
        if !self.streaming.remove(&session_id) {
            return Err(StoreError::NoStreamInFlight(session_id));
        }

        let message_id = self.find_mut(session_id).and_then(|s| {
            let last = s.messages.last_mut()?;
            (last.role == Role::Assistant).then(|| {
                content.clone_into(&mut last.content);
                last.id
            })
        });
        if let Some(message_id) = message_id {
            debug!(session_id = %session_id, message_id = %message_id, "Stream finished");
            self.publish(StoreEvent::StreamFinished {
                session_id,
                message_id,
            });
        }
        Ok(())
    }
}

/// Builds the automatic title: trimmed, at most [`AUTO_TITLE_MAX_CHARS`] chars.
pub fn auto_title(text: &str) -> String {
    text.trim().chars().take(AUTO_TITLE_MAX_CHARS).collect()
}

/// Cloneable handle serializing every store operation behind one lock.
///
/// Never hold the guard across an `.await`.
#[derive(Clone, Default)]
pub struct SharedStore {
    inner: Arc<Mutex<SessionStore>>,
}

impl SharedStore {
    pub fn new(store: SessionStore) -> Self {
        Self {
            inner: Arc::new(Mutex::new(store)),
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, SessionStore> {
        self.inner.lock()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.inner.lock().subscribe()
    }
}
