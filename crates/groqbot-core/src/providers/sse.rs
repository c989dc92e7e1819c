//! Event-stream decoder for chat-completions responses.
//!
//! The body is a sequence of newline-delimited lines. Lines starting with
//! `data: ` carry a JSON payload; everything else is ignored. Lines are
//! reassembled from raw reads before decoding, so a payload split across two
//! reads (even inside a multi-byte character) decodes normally.
//!
//! `data: [DONE]` ends decoding of the read it arrived in: the rest of that
//! read is dropped, but the next read is decoded as usual.

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

const DATA_PREFIX: &str = "data: ";
const DONE_SENTINEL: &str = "[DONE]";

#[derive(Debug, Deserialize)]
struct CompletionChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
    #[serde(default)]
    error: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: Option<ChunkDelta>,
}

#[derive(Debug, Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
}

/// Meaning of a single event line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventLine {
    /// Not a `data: ` line (comments, `event:` fields, blank separators).
    Ignored,
    /// The termination sentinel.
    Done,
    /// A text fragment to deliver.
    Fragment(String),
    /// A valid payload without text (role announcements, finish reasons).
    Empty,
    /// A payload that failed to parse.
    Malformed,
}

/// Classifies one line (without its trailing newline).
pub fn parse_line(line: &str) -> EventLine {
    let line = line.strip_suffix('\r').unwrap_or(line);
    let Some(payload) = line.strip_prefix(DATA_PREFIX) else {
        return EventLine::Ignored;
    };
    let payload = payload.trim();
    if payload == DONE_SENTINEL {
        return EventLine::Done;
    }

    let chunk = match serde_json::from_str::<CompletionChunk>(payload) {
        Ok(chunk) => chunk,
        Err(err) => {
            debug!(error = %err, "Skipping malformed stream line");
            return EventLine::Malformed;
        }
    };
    if let Some(error) = chunk.error {
        warn!(%error, "Stream carried an error payload");
        return EventLine::Empty;
    }

    match chunk
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.delta)
        .and_then(|delta| delta.content)
    {
        Some(text) if !text.is_empty() => EventLine::Fragment(text),
        _ => EventLine::Empty,
    }
}

fn decode_line(raw: &[u8]) -> EventLine {
    match std::str::from_utf8(raw) {
        Ok(line) => parse_line(line),
        Err(err) => {
            debug!(error = %err, "Skipping non UTF-8 stream line");
            EventLine::Malformed
        }
    }
}

/// Incremental decoder fed with raw reads.
#[derive(Debug, Default)]
pub struct SseDecoder {
    /// Bytes of the current, not yet terminated line.
    pending: Vec<u8>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decodes one read and returns its text fragments in order.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        // Everything already pending is newline-free.
        let scanned = self.pending.len();
        self.pending.extend_from_slice(chunk);

        let mut fragments = Vec::new();
        let mut start = 0;
        let mut search_from = scanned;
        while let Some(offset) = self.pending[search_from..]
            .iter()
            .position(|&b| b == b'\n')
        {
            let end = search_from + offset;
            let line = decode_line(&self.pending[start..end]);
            start = end + 1;
            search_from = start;

            match line {
                EventLine::Fragment(text) => fragments.push(text),
                EventLine::Done => {
                    self.pending.clear();
                    return fragments;
                }
                EventLine::Ignored | EventLine::Empty | EventLine::Malformed => {}
            }
        }
        self.pending.drain(..start);
        fragments
    }

    /// Decodes a final line left without a trailing newline at end of stream.
    pub fn finish(&mut self) -> Vec<String> {
        let rest = std::mem::take(&mut self.pending);
        if rest.is_empty() {
            return Vec::new();
        }
        match decode_line(&rest) {
            EventLine::Fragment(text) => vec![text],
            _ => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data(content: &str) -> String {
        format!(
            "data: {}\n",
            serde_json::json!({"choices": [{"delta": {"content": content}}]})
        )
    }

    #[test]
    fn test_parse_line_extracts_nested_content() {
        assert_eq!(
            parse_line(r#"data: {"choices":[{"delta":{"content":"Hel"}}]}"#),
            EventLine::Fragment("Hel".to_string())
        );
    }

    #[test]
    fn test_parse_line_classifies_non_content_lines() {
        assert_eq!(parse_line(""), EventLine::Ignored);
        assert_eq!(parse_line(": keep-alive"), EventLine::Ignored);
        assert_eq!(parse_line("event: message"), EventLine::Ignored);
        assert_eq!(parse_line("data:[DONE]"), EventLine::Ignored);
        assert_eq!(parse_line("data: [DONE]"), EventLine::Done);
        assert_eq!(parse_line("data: [DONE]\r"), EventLine::Done);
        assert_eq!(
            parse_line(r#"data: {"choices":[{"delta":{"role":"assistant"}}]}"#),
            EventLine::Empty
        );
        assert_eq!(
            parse_line(r#"data: {"choices":[{"delta":{"content":""}}]}"#),
            EventLine::Empty
        );
        assert_eq!(
            parse_line(r#"data: {"choices":[{"delta":null,"finish_reason":"stop"}]}"#),
            EventLine::Empty
        );
        assert_eq!(parse_line(r#"data: {"choices":[]}"#), EventLine::Empty);
        assert_eq!(parse_line(r#"data: {"choices":[{"delta":{"con"#), EventLine::Malformed);
    }

    #[test]
    fn test_decoder_reassembles_payload_split_across_reads() {
        let line = data("Hello");
        let (head, tail) = line.split_at(20);

        let mut decoder = SseDecoder::new();
        assert!(decoder.push(head.as_bytes()).is_empty());
        assert_eq!(decoder.push(tail.as_bytes()), vec!["Hello"]);
    }

    #[test]
    fn test_decoder_reassembles_split_multibyte_character() {
        let line = data("héllo");
        let bytes = line.as_bytes();
        let split = line.find('é').unwrap() + 1;

        let mut decoder = SseDecoder::new();
        assert!(decoder.push(&bytes[..split]).is_empty());
        assert_eq!(decoder.push(&bytes[split..]), vec!["héllo"]);
    }

    #[test]
    fn test_decoder_skips_malformed_lines_between_valid_ones() {
        let body = format!(
            "{}data: {{\"choices\":[{{\"delta\":\n{}data: not json\n{}",
            data("a"),
            data("b"),
            data("c")
        );

        let mut decoder = SseDecoder::new();
        assert_eq!(decoder.push(body.as_bytes()), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_done_ends_only_the_current_read() {
        let first = format!("{}data: [DONE]\n{}", data("a"), data("dropped"));
        let second = data("b");

        let mut decoder = SseDecoder::new();
        assert_eq!(decoder.push(first.as_bytes()), vec!["a"]);
        assert_eq!(decoder.push(second.as_bytes()), vec!["b"]);
    }

    #[test]
    fn test_done_discards_partial_tail_of_its_read() {
        let read = format!("data: [DONE]\n{}", &data("x")[..10]);

        let mut decoder = SseDecoder::new();
        assert!(decoder.push(read.as_bytes()).is_empty());
        assert!(decoder.finish().is_empty());
    }

    #[test]
    fn test_long_line_fed_byte_by_byte_decodes_once() {
        let text = "x".repeat(4096);
        let line = data(&text);
        let bytes = line.as_bytes();

        let mut decoder = SseDecoder::new();
        for byte in &bytes[..bytes.len() - 1] {
            assert!(decoder.push(std::slice::from_ref(byte)).is_empty());
        }
        assert_eq!(decoder.pending.len(), bytes.len() - 1);
        assert_eq!(decoder.push(&bytes[bytes.len() - 1..]), vec![text]);
        assert!(decoder.pending.is_empty());
    }

    #[test]
    fn test_pending_prefix_joins_lines_completed_later() {
        let first = data("a");
        let second = data("b");
        let (head, tail) = first.split_at(10);

        let mut decoder = SseDecoder::new();
        assert!(decoder.push(head.as_bytes()).is_empty());
        let rest = format!("{tail}{second}");
        assert_eq!(decoder.push(rest.as_bytes()), vec!["a", "b"]);
    }

    #[test]
    fn test_handles_crlf_line_endings() {
        let body = data("crlf").replace('\n', "\r\n");
        let mut decoder = SseDecoder::new();
        assert_eq!(decoder.push(body.as_bytes()), vec!["crlf"]);
    }

    #[test]
    fn test_finish_decodes_unterminated_last_line() {
        let line = data("tail");
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(line.trim_end().as_bytes()).is_empty());
        assert_eq!(decoder.finish(), vec!["tail"]);
        assert!(decoder.finish().is_empty());
    }
}
