//! HTTP transport seam for the completion client.
//!
//! The client only needs "POST this JSON with a bearer token, give me the
//! status and a byte stream". `ReqwestTransport` does that over the network;
//! tests substitute scripted transports.

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::StreamExt;
use futures_util::stream::BoxStream;
use reqwest::header::{HeaderMap, HeaderValue};
use serde_json::Value;

use crate::providers::shared::{ProviderError, ProviderResult, USER_AGENT};

/// Raw response body, delivered in whatever pieces the transport reads.
pub type ByteStream = BoxStream<'static, ProviderResult<Bytes>>;

/// A streaming POST request.
#[derive(Debug, Clone)]
pub struct TransportRequest {
    pub url: String,
    pub credential: String,
    pub body: Value,
}

/// Status plus the not-yet-read body.
pub struct TransportResponse {
    pub status: u16,
    pub body: ByteStream,
}

impl TransportResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Reads the remaining body as text. Read errors end the body early.
    pub async fn text(mut self) -> String {
        let mut buf = Vec::new();
        while let Some(Ok(chunk)) = self.body.next().await {
            buf.extend_from_slice(&chunk);
        }
        String::from_utf8_lossy(&buf).into_owned()
    }
}

/// Sends completion requests.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Issues the request and returns once response headers arrive.
    ///
    /// # Errors
    /// Returns `RequestFailed` when the request cannot be sent.
    async fn post_stream(&self, request: TransportRequest) -> ProviderResult<TransportResponse>;
}

/// Network transport backed by `reqwest`.
#[derive(Debug, Clone, Default)]
pub struct ReqwestTransport {
    http: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn post_stream(&self, request: TransportRequest) -> ProviderResult<TransportResponse> {
        let headers = build_headers(&request.credential)?;

        let response = self
            .http
            .post(&request.url)
            .headers(headers)
            .json(&request.body)
            .send()
            .await
            .map_err(classify_reqwest_error)?;

        let status = response.status().as_u16();
        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(classify_reqwest_error))
            .boxed();
        Ok(TransportResponse { status, body })
    }
}

fn build_headers(credential: &str) -> ProviderResult<HeaderMap> {
    let mut headers = HeaderMap::new();
    let auth = HeaderValue::from_str(&format!("Bearer {credential}"))
        .map_err(|e| ProviderError::RequestFailed(format!("Invalid API key header: {e}")))?;
    headers.insert("Authorization", auth);
    headers.insert("accept", HeaderValue::from_static("text/event-stream"));
    headers.insert("content-type", HeaderValue::from_static("application/json"));
    headers.insert("user-agent", HeaderValue::from_static(USER_AGENT));
    Ok(headers)
}

fn classify_reqwest_error(e: reqwest::Error) -> ProviderError {
    let message = if e.is_timeout() {
        format!("Request timed out: {e}")
    } else if e.is_connect() {
        format!("Connection failed: {e}")
    } else if e.is_request() {
        format!("Request error: {e}")
    } else {
        format!("Network error: {e}")
    };
    ProviderError::RequestFailed(message)
}
