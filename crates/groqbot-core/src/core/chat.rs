//! Send orchestration.
//!
//! A send appends the user message, opens the assistant placeholder, streams
//! the reply into it, and finalizes it exactly once. Every failure after the
//! user message was appended is folded into the visible reply instead of being
//! returned to the caller.

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::core::interrupt::CancelToken;
use crate::core::store::{Role, SessionId, SharedStore, StoreError};
use crate::providers::{ProviderError, StreamOutcome, StreamingCompletionClient};

/// Prefix of a reply that records a failed send.
pub const ERROR_PREFIX: &str = "⚠️ ";
/// Reply recorded when the stream ended without any text.
pub const NO_RESPONSE: &str = "(no response)";

/// Errors that prevent a send from starting. Nothing is mutated.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SendError {
    #[error("Message is empty")]
    EmptyMessage,

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Terminal state of one send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnStatus {
    Completed,
    Cancelled,
    Failed(ProviderError),
}

/// Result of a send: how it ended and the finalized reply content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnOutcome {
    pub status: TurnStatus,
    pub content: String,
}

impl TurnOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self.status, TurnStatus::Failed(_))
    }
}

/// Runs sends against a shared store with one completion client.
pub struct ChatService {
    store: SharedStore,
    client: StreamingCompletionClient,
    credential: Option<String>,
}

impl ChatService {
    /// `credential` may be absent; sends then fail with `MissingCredential`.
    pub fn new(
        store: SharedStore,
        client: StreamingCompletionClient,
        credential: Option<String>,
    ) -> Self {
        Self {
            store,
            client,
            credential,
        }
    }

    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    /// Sends `text` to a session and streams the reply into it.
    ///
    /// `on_delta` receives each fragment after it has been written to the
    /// store. Cancelling `cancel` stops the stream and keeps the partial reply.
    ///
    /// # Errors
    /// `EmptyMessage` for blank input, `NotFound` for an unknown session and
    /// `StreamInFlight` while a previous reply is still streaming into it.
    pub async fn send<F>(
        &self,
        session_id: SessionId,
        text: &str,
        cancel: &CancelToken,
        mut on_delta: F,
    ) -> Result<TurnOutcome, SendError>
    where
        F: FnMut(&str),
    {
        let text = text.trim();
        if text.is_empty() {
            return Err(SendError::EmptyMessage);
        }

        let (history, model) = {
            let mut store = self.store.lock();
            let session = store
                .get_session(session_id)
                .ok_or(StoreError::NotFound(session_id))?;
            if store.is_streaming(session_id) {
                return Err(StoreError::StreamInFlight(session_id).into());
            }

            store.add_message(session_id, Role::User, text)?;
            if session.messages.is_empty() {
                store.apply_auto_title(session_id, text);
            }
            let history = store.history(session_id);
            store.begin_stream(session_id)?;
            (history, session.model)
        };
        debug!(session_id = %session_id, model = %model, turns = history.len(), "Send started");

        let credential = self.credential.as_deref().unwrap_or_default();
        let mut accumulated = String::new();
        let result = self
            .client
            .stream_completion_with_outcome(
                &history,
                &model,
                credential,
                |fragment| {
                    accumulated.push_str(fragment);
                    self.store
                        .lock()
                        .update_last_assistant_message(session_id, &accumulated);
                    on_delta(fragment);
                },
                || cancel.is_cancelled(),
            )
            .await;

        let outcome = match result {
            Ok(StreamOutcome { text, cancelled }) => TurnOutcome {
                status: if cancelled {
                    TurnStatus::Cancelled
                } else {
                    TurnStatus::Completed
                },
                content: if text.is_empty() {
                    NO_RESPONSE.to_string()
                } else {
                    text
                },
            },
            Err(err) => {
                warn!(session_id = %session_id, error = %err, "Send failed");
                TurnOutcome {
                    content: format!("{ERROR_PREFIX}{err}"),
                    status: TurnStatus::Failed(err),
                }
            }
        };

        if let Err(err) = self.store.lock().finish_stream(session_id, &outcome.content) {
            warn!(session_id = %session_id, error = %err, "Reply could not be finalized");
        }
        info!(
            session_id = %session_id,
            status = ?outcome.status,
            chars = outcome.content.len(),
            "Send finished"
        );
        Ok(outcome)
    }
}
