use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::config::OpenAiConfig;

pub const MODEL: &str = "gpt-3.5-turbo-instruct";
const MAX_TOKENS: u32 = 50;

/// Reply sent in place of a completion when the service call fails
pub const FALLBACK_REPLY: &str = "The completion service is not available";

/// Anything that can turn a prompt into completed text.
#[async_trait]
pub trait Completer: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String>;

    /// Like `complete`, but failures are logged and replaced by
    /// [`FALLBACK_REPLY`]. Partial output is never returned.
    async fn complete_or_fallback(&self, prompt: &str) -> String {
        match self.complete(prompt).await {
            Ok(text) => text,
            Err(e) => {
                error!("Completion request failed: {:#}", e);
                FALLBACK_REPLY.to_string()
            }
        }
    }
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    max_tokens: u32,
    temperature: f32,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct CompletionChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
    #[serde(default)]
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(default)]
    message: String,
}

/// Collects the text of a streamed completion from raw SSE bytes.
///
/// Lines may arrive split across reads at any byte offset; text is appended
/// in arrival order.
#[derive(Debug, Default)]
pub struct CompletionAccumulator {
    pending: Vec<u8>,
    text: String,
    done: bool,
}

impl CompletionAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a chunk of the response body. Returns true once `[DONE]` was seen.
    pub fn feed(&mut self, bytes: &[u8]) -> Result<bool> {
        if self.done {
            return Ok(true);
        }
        self.pending.extend_from_slice(bytes);

        while let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            self.process_line(&line)?;
            if self.done {
                self.pending.clear();
                break;
            }
        }

        Ok(self.done)
    }

    /// Flush a trailing unterminated line and return the accumulated text.
    pub fn finish(mut self) -> Result<String> {
        if !self.done && !self.pending.is_empty() {
            let rest = std::mem::take(&mut self.pending);
            self.process_line(&rest)?;
        }
        Ok(self.text)
    }

    fn process_line(&mut self, raw: &[u8]) -> Result<()> {
        let line = String::from_utf8_lossy(raw);
        let line = line.trim_end_matches(['\n', '\r']);

        // Blank separators, comments and non-data fields carry no text
        let Some(data) = line.strip_prefix("data:") else {
            return Ok(());
        };
        let data = data.strip_prefix(' ').unwrap_or(data);

        if data == "[DONE]" {
            self.done = true;
            return Ok(());
        }

        let chunk: CompletionChunk = serde_json::from_str(data)
            .with_context(|| format!("Malformed completion chunk: {}", data))?;

        if let Some(err) = chunk.error {
            bail!("Completion service error: {}", err.message);
        }
        if let Some(choice) = chunk.choices.into_iter().next() {
            self.text.push_str(&choice.text);
        }
        Ok(())
    }
}

/// Streaming client for an OpenAI-compatible `/completions` endpoint.
pub struct CompletionClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl CompletionClient {
    pub fn new(config: &OpenAiConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: config.api_key.clone(),
            base_url: config.effective_base_url().to_string(),
        }
    }
}

#[async_trait]
impl Completer for CompletionClient {
    async fn complete(&self, prompt: &str) -> Result<String> {
        let request = CompletionRequest {
            model: MODEL,
            prompt,
            max_tokens: MAX_TOKENS,
            temperature: 0.0,
            stream: true,
        };

        let url = format!("{}/completions", self.base_url);

        debug!("Sending completion request to {}", url);

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .context("Failed to send request to completion service")?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            bail!("Completion API error ({}): {}", status, error_body);
        }

        let mut accumulator = CompletionAccumulator::new();
        let mut body = response.bytes_stream();
        while let Some(chunk) = body.next().await {
            let chunk = chunk.context("Completion stream interrupted")?;
            if accumulator.feed(&chunk)? {
                break;
            }
        }

        let text = accumulator.finish()?;
        debug!("Completion finished: {} chars", text.len());
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn sse(chunks: &[&str]) -> String {
        let mut body = String::new();
        for text in chunks {
            let event = json!({
                "id": "cmpl-1",
                "object": "text_completion",
                "model": MODEL,
                "choices": [{"text": text, "index": 0, "logprobs": null, "finish_reason": null}]
            });
            body.push_str(&format!("data: {}\n\n", event));
        }
        body.push_str("data: [DONE]\n\n");
        body
    }

    fn client_for(server: &MockServer) -> CompletionClient {
        CompletionClient::new(&OpenAiConfig {
            api_key: "sk-test".to_string(),
            base_url: format!("{}/v1", server.uri()),
        })
    }

    #[test]
    fn test_accumulates_in_order() {
        let mut acc = CompletionAccumulator::new();
        let done = acc.feed(sse(&["Once upon ", "a time."]).as_bytes()).unwrap();
        assert!(done);
        assert_eq!(acc.finish().unwrap(), "Once upon a time.");
    }

    #[test]
    fn test_lines_split_across_reads() {
        let body = sse(&["héllo ", "wörld"]);
        let bytes = body.as_bytes();
        let mut acc = CompletionAccumulator::new();
        // One byte at a time splits both lines and multi-byte characters
        for b in bytes {
            acc.feed(std::slice::from_ref(b)).unwrap();
        }
        assert_eq!(acc.finish().unwrap(), "héllo wörld");
    }

    #[test]
    fn test_repeated_chunks_not_deduplicated() {
        let mut acc = CompletionAccumulator::new();
        acc.feed(sse(&["ha", "ha", "ha"]).as_bytes()).unwrap();
        assert_eq!(acc.finish().unwrap(), "hahaha");
    }

    #[test]
    fn test_crlf_and_comments_ignored() {
        let body = ": keep-alive\r\n\r\ndata: {\"choices\":[{\"text\":\"ok\"}]}\r\n\r\ndata: [DONE]\r\n";
        let mut acc = CompletionAccumulator::new();
        assert!(acc.feed(body.as_bytes()).unwrap());
        assert_eq!(acc.finish().unwrap(), "ok");
    }

    #[test]
    fn test_data_after_done_ignored() {
        let mut acc = CompletionAccumulator::new();
        acc.feed(b"data: {\"choices\":[{\"text\":\"a\"}]}\n\ndata: [DONE]\n\n")
            .unwrap();
        acc.feed(b"data: {\"choices\":[{\"text\":\"b\"}]}\n\n").unwrap();
        assert_eq!(acc.finish().unwrap(), "a");
    }

    #[test]
    fn test_trailing_line_without_newline() {
        let mut acc = CompletionAccumulator::new();
        acc.feed(b"data: {\"choices\":[{\"text\":\"tail\"}]}").unwrap();
        assert_eq!(acc.finish().unwrap(), "tail");
    }

    #[test]
    fn test_empty_choices_skipped() {
        let mut acc = CompletionAccumulator::new();
        acc.feed(b"data: {\"choices\":[]}\n\ndata: {\"choices\":[{\"text\":\"x\"}]}\n\n")
            .unwrap();
        assert_eq!(acc.finish().unwrap(), "x");
    }

    #[test]
    fn test_malformed_chunk_is_error() {
        let mut acc = CompletionAccumulator::new();
        assert!(acc.feed(b"data: {not json}\n\n").is_err());
    }

    #[test]
    fn test_error_payload_is_error() {
        let mut acc = CompletionAccumulator::new();
        let err = acc
            .feed(b"data: {\"error\":{\"message\":\"overloaded\"}}\n\n")
            .unwrap_err();
        assert!(err.to_string().contains("overloaded"));
    }

    #[tokio::test]
    async fn test_client_sends_fixed_request() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(json!({
                "model": "gpt-3.5-turbo-instruct",
                "prompt": "Write a creative writing prompt. TOPIC: space travel",
                "max_tokens": 50,
                "temperature": 0.0,
                "stream": true
            })))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw(sse(&["Once upon ", "a time."]), "text/event-stream"),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server);
        let text = client
            .complete("Write a creative writing prompt. TOPIC: space travel")
            .await
            .unwrap();
        assert_eq!(text, "Once upon a time.");
    }

    #[tokio::test]
    async fn test_http_error_maps_to_fallback() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/completions"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let err = client.complete("p").await.unwrap_err();
        assert!(err.to_string().contains("500"));
        assert_eq!(client.complete_or_fallback("p").await, FALLBACK_REPLY);
    }

    #[tokio::test]
    async fn test_mid_stream_error_discards_partial_text() {
        let server = MockServer::start().await;

        let body = "data: {\"choices\":[{\"text\":\"partial \"}]}\n\n\
                    data: {\"error\":{\"message\":\"server_error\"}}\n\n";
        Mock::given(method("POST"))
            .and(path("/v1/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
            .mount(&server)
            .await;

        let client = client_for(&server);
        assert_eq!(client.complete_or_fallback("p").await, FALLBACK_REPLY);
    }

    #[tokio::test]
    async fn test_unreachable_service_maps_to_fallback() {
        let client = CompletionClient::new(&OpenAiConfig {
            api_key: "sk-test".to_string(),
            base_url: "http://127.0.0.1:1/v1".to_string(),
        });
        assert_eq!(client.complete_or_fallback("p").await, FALLBACK_REPLY);
    }
}
