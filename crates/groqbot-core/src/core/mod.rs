//! Core module: UI-agnostic domain and runtime.
//!
//! This module contains:
//! - `store`: In-memory sessions, messages, and the active-session pointer
//! - `events`: Store notifications for subscribers
//! - `interrupt`: Cooperative cancellation and Ctrl+C wiring
//! - `chat`: Send orchestration (user message → stream → finalized reply)

pub mod chat;
pub mod events;
pub mod interrupt;
pub mod store;
