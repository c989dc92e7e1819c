//! Streaming client for OpenAI-compatible chat completions.
//!
//! One call issues one streaming POST, decodes the event stream into text
//! fragments, and hands each fragment to the caller as it arrives. The caller
//! can stop the stream at any time through a polled cancellation check.

use std::sync::Arc;

use futures_util::StreamExt;
use serde::Serialize;
use tracing::debug;

use crate::prompts::SYSTEM_PROMPT;
use crate::providers::shared::{HistoryMessage, ProviderError, ProviderResult};
use crate::providers::sse::SseDecoder;
use crate::providers::transport::{ReqwestTransport, Transport, TransportRequest};

/// Groq's OpenAI-compatible API root.
pub const DEFAULT_BASE_URL: &str = "https://api.groq.com/openai/v1";
pub const DEFAULT_TEMPERATURE: f64 = 0.7;
pub const DEFAULT_MAX_TOKENS: u32 = 2048;

const CHAT_COMPLETIONS_PATH: &str = "/chat/completions";

/// Fixed request settings shared by every call of a client.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionConfig {
    pub base_url: String,
    /// Always sent as the first message, ahead of the caller's history.
    pub system_prompt: String,
    pub temperature: f64,
    pub max_tokens: u32,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            system_prompt: SYSTEM_PROMPT.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<RequestMessage<'a>>,
    temperature: f64,
    max_tokens: u32,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct RequestMessage<'a> {
    role: &'static str,
    content: &'a str,
}

impl<'a> ChatCompletionRequest<'a> {
    fn new(config: &'a CompletionConfig, history: &'a [HistoryMessage], model: &'a str) -> Self {
        let mut messages = Vec::with_capacity(history.len() + 1);
        messages.push(RequestMessage {
            role: "system",
            content: &config.system_prompt,
        });
        messages.extend(history.iter().map(|msg| RequestMessage {
            role: msg.role.as_str(),
            content: &msg.content,
        }));

        Self {
            model,
            messages,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            stream: true,
        }
    }
}

/// How a successful stream ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamOutcome {
    /// Concatenation of every delivered fragment.
    pub text: String,
    /// `true` if the caller stopped the stream before it ended.
    pub cancelled: bool,
}

/// Chat-completions client with cooperative cancellation.
pub struct StreamingCompletionClient {
    config: CompletionConfig,
    transport: Arc<dyn Transport>,
}

impl StreamingCompletionClient {
    pub fn new(config: CompletionConfig) -> Self {
        Self::with_transport(config, Arc::new(ReqwestTransport::new()))
    }

    pub fn with_transport(config: CompletionConfig, transport: Arc<dyn Transport>) -> Self {
        Self { config, transport }
    }

    pub fn config(&self) -> &CompletionConfig {
        &self.config
    }

    /// Streams a completion and returns the full text.
    ///
    /// `on_delta` receives each non-empty fragment in arrival order;
    /// `is_cancelled` is polled before every read. Cancellation is not an
    /// error: the text delivered so far is returned.
    ///
    /// # Errors
    /// `MissingCredential` for an empty credential (nothing is sent);
    /// `RequestFailed` for a non-success status or a transport fault.
    pub async fn stream_completion<F, C>(
        &self,
        history: &[HistoryMessage],
        model: &str,
        credential: &str,
        on_delta: F,
        is_cancelled: C,
    ) -> ProviderResult<String>
    where
        F: FnMut(&str),
        C: Fn() -> bool,
    {
        self.stream_completion_with_outcome(history, model, credential, on_delta, is_cancelled)
            .await
            .map(|outcome| outcome.text)
    }

    /// Same as [`stream_completion`](Self::stream_completion), also reporting
    /// whether the stream was cancelled.
    ///
    /// # Errors
    /// See [`stream_completion`](Self::stream_completion).
    pub async fn stream_completion_with_outcome<F, C>(
        &self,
        history: &[HistoryMessage],
        model: &str,
        credential: &str,
        mut on_delta: F,
        is_cancelled: C,
    ) -> ProviderResult<StreamOutcome>
    where
        F: FnMut(&str),
        C: Fn() -> bool,
    {
        let credential = credential.trim();
        if credential.is_empty() {
            return Err(ProviderError::MissingCredential);
        }

        let request = ChatCompletionRequest::new(&self.config, history, model);
        let body = serde_json::to_value(&request)
            .map_err(|e| ProviderError::RequestFailed(format!("Failed to encode request: {e}")))?;
        let url = format!("{}{}", self.config.base_url, CHAT_COMPLETIONS_PATH);
        debug!(%url, model, messages = request.messages.len(), "Sending completion request");

        let response = self
            .transport
            .post_stream(TransportRequest {
                url,
                credential: credential.to_string(),
                body,
            })
            .await?;

        if !response.is_success() {
            let status = response.status;
            let error_body = response.text().await;
            debug!(status, body = %error_body, "Completion request rejected");
            return Err(ProviderError::http_status(status, &error_body));
        }

        let mut body = response.body;
        let mut decoder = SseDecoder::new();
        let mut text = String::new();

        loop {
            if is_cancelled() {
                debug!(chars = text.len(), "Stream cancelled");
                return Ok(StreamOutcome {
                    text,
                    cancelled: true,
                });
            }

            let Some(chunk) = body.next().await else {
                let rest = decoder.finish();
                let cancelled = !deliver(rest, &mut text, &mut on_delta, &is_cancelled);
                debug!(chars = text.len(), cancelled, "Stream ended");
                return Ok(StreamOutcome { text, cancelled });
            };

            let fragments = decoder.push(&chunk?);
            if !deliver(fragments, &mut text, &mut on_delta, &is_cancelled) {
                debug!(chars = text.len(), "Stream cancelled");
                return Ok(StreamOutcome {
                    text,
                    cancelled: true,
                });
            }
        }
    }
}

/// Hands fragments to the caller; returns `false` if cancelled midway.
fn deliver<F, C>(
    fragments: Vec<String>,
    text: &mut String,
    on_delta: &mut F,
    is_cancelled: &C,
) -> bool
where
    F: FnMut(&str),
    C: Fn() -> bool,
{
    for fragment in fragments {
        if is_cancelled() {
            return false;
        }
        on_delta(&fragment);
        text.push_str(&fragment);
    }
    true
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;
    use crate::core::interrupt::CancelToken;
    use crate::providers::transport::testing::{ScriptedTransport, UnreachableTransport};

    const MODEL: &str = "llama3-8b-8192";

    fn line(content: &str) -> String {
        format!(
            "data: {}\n",
            serde_json::json!({"choices": [{"delta": {"content": content}}]})
        )
    }

    fn client(transport: Arc<dyn Transport>) -> StreamingCompletionClient {
        StreamingCompletionClient::with_transport(CompletionConfig::default(), transport)
    }

    #[tokio::test]
    async fn test_streams_fragments_in_order_and_returns_full_text() {
        let transport = Arc::new(ScriptedTransport::ok([
            r#"data: {"choices":[{"delta":{"content":"Hel"}}]}"#.to_string() + "\n",
            r#"data: {"choices":[{"delta":{"content":"lo"}}]}"#.to_string() + "\n",
            "data: [DONE]\n".to_string(),
        ]));
        let deltas = RefCell::new(Vec::new());

        let text = client(transport.clone())
            .stream_completion(
                &[HistoryMessage::user("hi")],
                MODEL,
                "gsk_test",
                |d| deltas.borrow_mut().push(d.to_string()),
                || false,
            )
            .await
            .unwrap();

        assert_eq!(deltas.into_inner(), vec!["Hel", "lo"]);
        assert_eq!(text, "Hello");
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn test_cancel_after_first_fragment_stops_before_second() {
        let transport = Arc::new(ScriptedTransport::ok([line("Hel"), line("lo"), line("!")]));
        let token = CancelToken::new();
        let deltas = RefCell::new(Vec::new());

        let outcome = client(transport)
            .stream_completion_with_outcome(
                &[HistoryMessage::user("hi")],
                MODEL,
                "gsk_test",
                |d| {
                    deltas.borrow_mut().push(d.to_string());
                    token.cancel();
                },
                || token.is_cancelled(),
            )
            .await
            .unwrap();

        assert_eq!(deltas.into_inner(), vec!["Hel"]);
        assert_eq!(
            outcome,
            StreamOutcome {
                text: "Hel".to_string(),
                cancelled: true,
            }
        );
    }

    #[tokio::test]
    async fn test_cancel_within_single_read_stops_remaining_fragments() {
        let read = format!("{}{}", line("one"), line("two"));
        let transport = Arc::new(ScriptedTransport::ok([read]));
        let token = CancelToken::new();

        let text = client(transport)
            .stream_completion(
                &[],
                MODEL,
                "gsk_test",
                |_| token.cancel(),
                || token.is_cancelled(),
            )
            .await
            .unwrap();

        assert_eq!(text, "one");
    }

    #[tokio::test]
    async fn test_cancelled_before_first_read_returns_empty() {
        let transport = Arc::new(ScriptedTransport::ok([line("never")]));

        let outcome = client(transport)
            .stream_completion_with_outcome(&[], MODEL, "gsk_test", |_| {}, || true)
            .await
            .unwrap();

        assert!(outcome.cancelled);
        assert!(outcome.text.is_empty());
    }

    #[tokio::test]
    async fn test_error_status_uses_server_message() {
        let transport = Arc::new(ScriptedTransport::with_status(
            401,
            [r#"{"error":{"message":"bad key"}}"#],
        ));

        let err = client(transport)
            .stream_completion(&[], MODEL, "gsk_wrong", |_| {}, || false)
            .await
            .unwrap_err();

        assert_eq!(err, ProviderError::RequestFailed("bad key".to_string()));
    }

    #[tokio::test]
    async fn test_error_status_without_json_body_uses_status() {
        let transport = Arc::new(ScriptedTransport::with_status(502, ["<html>Bad gateway</html>"]));

        let err = client(transport)
            .stream_completion(&[], MODEL, "gsk_test", |_| {}, || false)
            .await
            .unwrap_err();

        assert_eq!(err, ProviderError::RequestFailed("HTTP 502".to_string()));
    }

    #[tokio::test]
    async fn test_missing_credential_makes_no_transport_call() {
        let transport = Arc::new(ScriptedTransport::ok([line("unused")]));
        let client = client(transport.clone());

        for credential in ["", "   "] {
            let err = client
                .stream_completion(&[], MODEL, credential, |_| {}, || false)
                .await
                .unwrap_err();
            assert_eq!(err, ProviderError::MissingCredential);
        }
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test]
    async fn test_malformed_lines_do_not_abort_stream() {
        let transport = Arc::new(ScriptedTransport::ok([
            line("a"),
            "data: {\"choices\":[{\"delta\":{\"cont\n".to_string(),
            line("b"),
            "data: {oops}\n".to_string(),
            line("c"),
        ]));
        let deltas = RefCell::new(Vec::new());

        let text = client(transport)
            .stream_completion(
                &[],
                MODEL,
                "gsk_test",
                |d| deltas.borrow_mut().push(d.to_string()),
                || false,
            )
            .await
            .unwrap();

        assert_eq!(deltas.into_inner(), vec!["a", "b", "c"]);
        assert_eq!(text, "abc");
    }

    #[tokio::test]
    async fn test_done_in_one_read_does_not_end_the_stream() {
        let transport = Arc::new(ScriptedTransport::ok([
            format!("{}data: [DONE]\n", line("first ")),
            line("second"),
        ]));

        let text = client(transport)
            .stream_completion(&[], MODEL, "gsk_test", |_| {}, || false)
            .await
            .unwrap();

        assert_eq!(text, "first second");
    }

    #[tokio::test]
    async fn test_payload_split_across_reads_is_reassembled() {
        let full = line("split");
        let (head, tail) = full.split_at(17);
        let transport = Arc::new(ScriptedTransport::ok([head.to_string(), tail.to_string()]));

        let text = client(transport)
            .stream_completion(&[], MODEL, "gsk_test", |_| {}, || false)
            .await
            .unwrap();

        assert_eq!(text, "split");
    }

    #[tokio::test]
    async fn test_transport_fault_mid_stream_fails_request() {
        let transport =
            Arc::new(ScriptedTransport::ok([line("partial")]).then_fail("Network error: reset"));
        let deltas = RefCell::new(Vec::new());

        let err = client(transport)
            .stream_completion(
                &[],
                MODEL,
                "gsk_test",
                |d| deltas.borrow_mut().push(d.to_string()),
                || false,
            )
            .await
            .unwrap_err();

        assert_eq!(
            err,
            ProviderError::RequestFailed("Network error: reset".to_string())
        );
        assert_eq!(deltas.into_inner(), vec!["partial"]);
    }

    #[tokio::test]
    async fn test_connection_failure_surfaces_transport_detail() {
        let err = client(Arc::new(UnreachableTransport))
            .stream_completion(&[], MODEL, "gsk_test", |_| {}, || false)
            .await
            .unwrap_err();

        assert!(matches!(err, ProviderError::RequestFailed(msg) if msg.contains("refused")));
    }

    #[tokio::test]
    async fn test_request_prepends_system_prompt_and_fixed_parameters() {
        let transport = Arc::new(ScriptedTransport::ok(["data: [DONE]\n"]));
        let config = CompletionConfig {
            base_url: "http://localhost:9999/v1".to_string(),
            system_prompt: "Be brief.".to_string(),
            ..CompletionConfig::default()
        };
        let client = StreamingCompletionClient::with_transport(config, transport.clone());
        let history = [
            HistoryMessage::user("hi"),
            HistoryMessage::assistant("hello"),
            HistoryMessage::user("bye"),
        ];

        client
            .stream_completion(&history, "gemma2-9b-it", " gsk_key ", |_| {}, || false)
            .await
            .unwrap();

        let request = transport.last_request().unwrap();
        assert_eq!(request.url, "http://localhost:9999/v1/chat/completions");
        assert_eq!(request.credential, "gsk_key");
        assert_eq!(
            request.body,
            serde_json::json!({
                "model": "gemma2-9b-it",
                "messages": [
                    {"role": "system", "content": "Be brief."},
                    {"role": "user", "content": "hi"},
                    {"role": "assistant", "content": "hello"},
                    {"role": "user", "content": "bye"},
                ],
                "temperature": 0.7,
                "max_tokens": 2048,
                "stream": true,
            })
        );
    }
}
