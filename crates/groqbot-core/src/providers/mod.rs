//! Completion provider: request building, event-stream decoding, transport.

pub mod chat_completions;
pub mod shared;
pub mod sse;
pub mod transport;

pub use chat_completions::{
    CompletionConfig, DEFAULT_BASE_URL, DEFAULT_MAX_TOKENS, DEFAULT_TEMPERATURE, StreamOutcome,
    StreamingCompletionClient,
};
pub use shared::{HistoryMessage, ProviderError, ProviderResult};
pub use transport::{ReqwestTransport, Transport, TransportRequest, TransportResponse};

/// Environment variable holding the bearer credential.
pub const API_KEY_ENV: &str = "GROQ_API_KEY";
/// Environment variable overriding the API root.
pub const BASE_URL_ENV: &str = "GROQ_BASE_URL";
