//! CLI command handlers.

use std::io::{self, Write};

use anyhow::{Context, Result};
use groqbot_core::config::Config;
use groqbot_core::core::chat::ChatService;
use groqbot_core::core::store::SharedStore;
use groqbot_core::providers::StreamingCompletionClient;

pub mod ask;
pub mod chat;
pub mod config;
pub mod models;

/// Builds a send service over a fresh in-memory store.
fn build_service(config: &Config) -> Result<ChatService> {
    let completion = config
        .completion_config()
        .context("resolve provider settings")?;
    Ok(ChatService::new(
        SharedStore::default(),
        StreamingCompletionClient::new(completion),
        config.api_key(),
    ))
}

/// Model for new sessions: a non-blank override, else the configured one.
fn resolve_model(config: &Config, model_override: Option<&str>) -> String {
    model_override
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .unwrap_or(&config.model)
        .to_string()
}

/// Echoes reply fragments as they arrive.
///
/// The delta callback cannot fail, so the first write error is kept and
/// reported by [`finish`](Self::finish).
struct DeltaWriter<'a, W: Write> {
    out: &'a mut W,
    wrote: bool,
    error: Option<io::Error>,
}

impl<'a, W: Write> DeltaWriter<'a, W> {
    fn new(out: &'a mut W) -> Self {
        Self {
            out,
            wrote: false,
            error: None,
        }
    }

    fn write(&mut self, fragment: &str) {
        if self.error.is_some() {
            return;
        }
        self.wrote = true;
        if let Err(e) = write!(self.out, "{fragment}").and_then(|()| self.out.flush()) {
            self.error = Some(e);
        }
    }

    /// Returns whether anything was written.
    fn finish(self) -> io::Result<bool> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(self.wrote),
        }
    }
}
