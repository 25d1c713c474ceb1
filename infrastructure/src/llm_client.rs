//! OpenAI-compatible chat-completions client. In the shape of
//! `copilot/transport.rs`'s streaming-reader shape (drain chunks in a
//! loop until a terminal marker) adapted from Content-Length-framed
//! JSON-RPC to Server-Sent-Events `data: {...}` lines, and
//! `copilot/gateway.rs`'s thin-wrapper-over-a-transport gateway pattern.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde_json::Value;
use tokio::sync::Mutex;

use turnloop_application::ports::llm_client::{
    Chunk, CompletionResponse, FinishReason, GatewayError, LlmClient, LlmStream, ModelCapabilities,
    RequestParams, StreamInfo,
};
use turnloop_domain::message::ToolCallRef;
use turnloop_domain::usage::UsageDelta;

/// Models known to accept image/PDF parts in user content. Conservative
/// static table; unlisted models are assumed text-only.
fn capability_table() -> HashMap<&'static str, ModelCapabilities> {
    let mut table = HashMap::new();
    table.insert("gpt-4o", ModelCapabilities { vision: true, pdf: false });
    table.insert("gpt-4o-mini", ModelCapabilities { vision: true, pdf: false });
    table.insert("gpt-4.1", ModelCapabilities { vision: true, pdf: true });
    table
}

pub struct OpenAiCompatibleClient {
    http: Client,
    api_base: String,
    api_key: Option<String>,
    extra_headers: HashMap<String, String>,
}

impl OpenAiCompatibleClient {
    pub fn new(api_base: impl Into<String>, api_key: Option<String>, extra_headers: HashMap<String, String>) -> Self {
        Self {
            http: Client::new(),
            api_base: api_base.into(),
            api_key,
            extra_headers,
        }
    }

    fn request(&self, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}/{}", self.api_base.trim_end_matches('/'), path.trim_start_matches('/'));
        let mut builder = self.http.post(url);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }
        for (name, value) in &self.extra_headers {
            builder = builder.header(name, value);
        }
        builder
    }
}

#[async_trait]
impl LlmClient for OpenAiCompatibleClient {
    async fn stream(&self, params: RequestParams) -> Result<Box<dyn LlmStream>, GatewayError> {
        let mut body = params;
        body["stream"] = Value::Bool(true);

        let response = self
            .request("chat/completions")
            .json(&body)
            .send()
            .await
            .map_err(|e| GatewayError::Connection(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(GatewayError::RequestFailed(format!("{status}: {text}")));
        }

        Ok(Box::new(SseStream {
            bytes: Mutex::new(Box::pin(response.bytes_stream())),
            buffer: String::new(),
            finish_reason: FinishReason::Other,
            saw_tool_delta: false,
            done: false,
        }))
    }

    async fn complete(&self, mut params: RequestParams) -> Result<CompletionResponse, GatewayError> {
        params["stream"] = Value::Bool(false);

        let response = self
            .request("chat/completions")
            .json(&params)
            .send()
            .await
            .map_err(|e| GatewayError::Connection(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(GatewayError::RequestFailed(format!("{status}: {text}")));
        }

        let body: Value = response.json().await.map_err(|e| GatewayError::Other(e.to_string()))?;
        parse_completion(&body)
    }

    fn capabilities(&self, model: &str) -> ModelCapabilities {
        capability_table().get(model).copied().unwrap_or_default()
    }
}

fn parse_completion(body: &Value) -> Result<CompletionResponse, GatewayError> {
    let choice = body
        .get("choices")
        .and_then(|c| c.get(0))
        .ok_or_else(|| GatewayError::Other("response had no choices".into()))?;
    let message = choice.get("message").ok_or_else(|| GatewayError::Other("choice had no message".into()))?;

    let text = message.get("content").and_then(Value::as_str).map(str::to_string);

    let tool_calls = message
        .get("tool_calls")
        .and_then(Value::as_array)
        .map(|calls| {
            calls
                .iter()
                .filter_map(|call| {
                    let id = call.get("id")?.as_str()?.to_string();
                    let function = call.get("function")?;
                    let name = function.get("name")?.as_str()?.to_string();
                    let arguments = function.get("arguments")?.as_str().unwrap_or("{}").to_string();
                    Some(ToolCallRef { id, name, arguments })
                })
                .collect()
        })
        .unwrap_or_default();

    let usage = body.get("usage").map(|u| UsageDelta {
        prompt: u.get("prompt_tokens").and_then(Value::as_u64),
        completion: u.get("completion_tokens").and_then(Value::as_u64),
        total: u.get("total_tokens").and_then(Value::as_u64),
        reasoning_tokens: u
            .get("completion_tokens_details")
            .and_then(|d| d.get("reasoning_tokens"))
            .and_then(Value::as_u64),
        cached_tokens: u
            .get("prompt_tokens_details")
            .and_then(|d| d.get("cached_tokens"))
            .and_then(Value::as_u64),
        cost: None,
    });

    Ok(CompletionResponse { text, tool_calls, usage })
}

type BytesStream = futures::stream::BoxStream<'static, reqwest::Result<bytes::Bytes>>;

struct SseStream {
    bytes: Mutex<std::pin::Pin<Box<BytesStream>>>,
    buffer: String,
    finish_reason: FinishReason,
    saw_tool_delta: bool,
    done: bool,
}

#[async_trait]
impl LlmStream for SseStream {
    async fn next_chunk(&mut self) -> Result<Option<Chunk>, GatewayError> {
        loop {
            if self.done {
                return Ok(None);
            }

            if let Some(pos) = self.buffer.find('\n') {
                let line = self.buffer[..pos].trim_end_matches('\r').to_string();
                self.buffer.drain(..=pos);
                if let Some(chunk) = self.decode_line(&line)? {
                    return Ok(Some(chunk));
                }
                continue;
            }

            let mut stream = self.bytes.lock().await;
            match stream.next().await {
                Some(Ok(bytes)) => {
                    drop(stream);
                    self.buffer.push_str(&String::from_utf8_lossy(&bytes));
                }
                Some(Err(e)) => return Err(GatewayError::Connection(e.to_string())),
                None => {
                    self.done = true;
                    return Ok(None);
                }
            }
        }
    }

    fn finish(&self) -> StreamInfo {
        StreamInfo {
            finish_reason: self.finish_reason,
            saw_tool_delta: self.saw_tool_delta,
        }
    }
}

impl SseStream {
    fn decode_line(&mut self, line: &str) -> Result<Option<Chunk>, GatewayError> {
        let Some(payload) = line.strip_prefix("data: ") else {
            return Ok(None);
        };
        if payload == "[DONE]" {
            self.done = true;
            return Ok(None);
        }

        let event: Value = serde_json::from_str(payload).map_err(|e| GatewayError::Other(e.to_string()))?;
        let Some(choice) = event.get("choices").and_then(|c| c.get(0)) else {
            if event.get("usage").is_some() {
                let usage = event.get("usage").map(|u| UsageDelta {
                    prompt: u.get("prompt_tokens").and_then(Value::as_u64),
                    completion: u.get("completion_tokens").and_then(Value::as_u64),
                    total: u.get("total_tokens").and_then(Value::as_u64),
                    reasoning_tokens: None,
                    cached_tokens: None,
                    cost: None,
                });
                return Ok(usage.map(Chunk::Usage));
            }
            return Ok(Some(Chunk::Other));
        };

        if let Some(reason) = choice.get("finish_reason").and_then(Value::as_str) {
            self.finish_reason = match reason {
                "stop" => FinishReason::Stop,
                "tool_calls" => FinishReason::ToolCalls,
                "length" => FinishReason::Length,
                "content_filter" => FinishReason::ContentFilter,
                _ => FinishReason::Other,
            };
        }

        let delta = choice.get("delta");
        if let Some(text) = delta.and_then(|d| d.get("content")).and_then(Value::as_str) {
            if !text.is_empty() {
                return Ok(Some(Chunk::Text(text.to_string())));
            }
        }

        if let Some(tool_calls) = delta.and_then(|d| d.get("tool_calls")).and_then(Value::as_array) {
            if let Some(call) = tool_calls.first() {
                self.saw_tool_delta = true;
                let index = call.get("index").and_then(Value::as_u64).unwrap_or(0) as usize;
                let id = call.get("id").and_then(Value::as_str).map(str::to_string);
                let function = call.get("function");
                let name = function.and_then(|f| f.get("name")).and_then(Value::as_str).map(str::to_string);
                let arguments = function
                    .and_then(|f| f.get("arguments"))
                    .and_then(Value::as_str)
                    .unwrap_or("")
                    .to_string();
                return Ok(Some(Chunk::ToolDelta { index, id, name, arguments }));
            }
        }

        Ok(Some(Chunk::Other))
    }
}

/// Build a client for a configured provider, resolving its API key from
/// the environment variable it names (if any).
pub fn from_provider(provider: &turnloop_domain::config::ProviderConfig) -> Arc<dyn LlmClient> {
    let api_key = provider
        .api_key_env
        .as_deref()
        .and_then(|var| std::env::var(var).ok());
    Arc::new(OpenAiCompatibleClient::new(
        provider.api_base.clone().unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
        api_key,
        provider.extra_headers.clone(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_completion_extracts_text() {
        let body = serde_json::json!({
            "choices": [{"message": {"content": "hello"}}],
            "usage": {"prompt_tokens": 10, "completion_tokens": 2, "total_tokens": 12}
        });
        let response = parse_completion(&body).unwrap();
        assert_eq!(response.text.as_deref(), Some("hello"));
        assert_eq!(response.usage.unwrap().total, Some(12));
    }

    #[test]
    fn parse_completion_extracts_tool_calls() {
        let body = serde_json::json!({
            "choices": [{"message": {
                "content": null,
                "tool_calls": [{
                    "id": "call_1",
                    "function": {"name": "fs__read", "arguments": "{\"path\":\"a\"}"}
                }]
            }}]
        });
        let response = parse_completion(&body).unwrap();
        assert_eq!(response.tool_calls.len(), 1);
        assert_eq!(response.tool_calls[0].name, "fs__read");
    }

    #[test]
    fn capability_table_is_conservative_for_unknown_models() {
        let client = OpenAiCompatibleClient::new("https://example.com", None, HashMap::new());
        let caps = client.capabilities("some-unlisted-model");
        assert!(!caps.vision);
        assert!(!caps.pdf);
    }

    #[test]
    fn known_model_reports_vision_support() {
        let client = OpenAiCompatibleClient::new("https://example.com", None, HashMap::new());
        assert!(client.capabilities("gpt-4o").vision);
    }
}
