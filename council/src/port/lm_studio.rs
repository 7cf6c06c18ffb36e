//! LM Studio backend implementation of the completion port
//!
//! LM Studio exposes an OpenAI-compatible API on `localhost:1234`,
//! plus extended endpoints for loading and unloading models. Chat
//! completions stream as SSE `data:` lines; some model/server
//! combinations put generated text in `reasoning_content` or
//! `reasoning` instead of `delta.content`, which is why delta
//! extraction goes through [`extract_delta_text`].

use std::time::Duration;

use async_stream::stream;
use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use super::{extract_delta_text, extract_text, CompletionPort};
use crate::config::LmStudioConfig;
use crate::prompt::ChatMessage;

/// Async client for LM Studio's local API server.
///
/// Holds one shared `reqwest::Client`; safe to share across concurrent
/// sessions.
#[derive(Debug, Clone)]
pub struct LmStudioPort {
    client: reqwest::Client,
    /// Base URL including `/v1` (e.g. `http://localhost:1234/v1`).
    base_url: String,
    /// LM Studio accepts any string as the key.
    api_key: String,
}

impl LmStudioPort {
    pub fn new(config: &LmStudioConfig) -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn chat_body(model: &str, messages: &[ChatMessage], temperature: f32, max_tokens: u32, stream: bool) -> Value {
        json!({
            "model": model,
            "messages": messages,
            "temperature": temperature,
            "max_tokens": max_tokens,
            "stream": stream,
        })
    }

    /// Load a model into backend memory. Optimistic on ambiguous
    /// outcomes: older LM Studio versions lack the load endpoint and
    /// auto-load on first request, so only a connect failure is
    /// treated as definitive.
    async fn load_model(&self, model: &str) -> bool {
        info!(model, "loading model");
        let result = self
            .client
            .post(self.endpoint("/models/load"))
            .bearer_auth(&self.api_key)
            .json(&json!({ "model": model }))
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => {
                info!(model, "model loaded");
                true
            }
            Ok(response) => {
                warn!(model, status = %response.status(), "model load endpoint unavailable; relying on auto-load");
                true
            }
            Err(e) if e.is_connect() => {
                warn!(model, "cannot connect to LM Studio for model load");
                false
            }
            Err(e) => {
                warn!(model, error = %e, "model load request failed; relying on auto-load");
                true
            }
        }
    }
}

#[async_trait]
impl CompletionPort for LmStudioPort {
    async fn ensure_ready(&self, model: &str) -> bool {
        // Loading an already-loaded model is a no-op on the backend.
        self.load_model(model).await
    }

    fn stream_chat(
        &self,
        model: &str,
        messages: &[ChatMessage],
        temperature: f32,
        max_tokens: u32,
    ) -> BoxStream<'static, String> {
        let client = self.client.clone();
        let url = self.endpoint("/chat/completions");
        let api_key = self.api_key.clone();
        let body = Self::chat_body(model, messages, temperature, max_tokens, true);
        let model = model.to_string();

        Box::pin(stream! {
            let response = client
                .post(&url)
                .bearer_auth(&api_key)
                .json(&body)
                .send()
                .await;

            let response = match response {
                Ok(r) => r,
                Err(e) => {
                    warn!(model, error = %e, "chat completion request failed");
                    yield format!(
                        "\n\n[Error: Could not get response from {model}. \
                         Make sure LM Studio is running and the model is loaded. Error: {e}]"
                    );
                    return;
                }
            };

            if !response.status().is_success() {
                let status = response.status();
                let detail = response.text().await.unwrap_or_default();
                warn!(model, %status, "chat completion returned error status");
                yield format!("\n\n[Error: {model} returned {status}. {detail}]");
                return;
            }

            let mut bytes = response.bytes_stream();
            let mut buffer = String::new();

            while let Some(next) = bytes.next().await {
                let chunk = match next {
                    Ok(b) => b,
                    Err(e) => {
                        warn!(model, error = %e, "chat completion stream interrupted");
                        yield format!("\n\n[Error: stream from {model} interrupted. Error: {e}]");
                        return;
                    }
                };
                buffer.push_str(&String::from_utf8_lossy(&chunk));

                // SSE frames are newline-delimited `data:` lines.
                while let Some(pos) = buffer.find('\n') {
                    let line = buffer[..pos].trim().to_string();
                    buffer.drain(..=pos);

                    let Some(data) = line.strip_prefix("data:") else {
                        continue;
                    };
                    let data = data.trim();
                    if data == "[DONE]" {
                        return;
                    }
                    let Ok(frame) = serde_json::from_str::<Value>(data) else {
                        debug!(model, "skipping unparseable SSE frame");
                        continue;
                    };
                    let Some(delta) = frame
                        .get("choices")
                        .and_then(|c| c.get(0))
                        .and_then(|c| c.get("delta"))
                    else {
                        continue;
                    };
                    let text = extract_delta_text(delta);
                    if !text.is_empty() {
                        yield text;
                    }
                }
            }
        })
    }

    async fn chat_once(
        &self,
        model: &str,
        messages: &[ChatMessage],
        temperature: f32,
        max_tokens: u32,
    ) -> String {
        let body = Self::chat_body(model, messages, temperature, max_tokens, false);
        let response = self
            .client
            .post(self.endpoint("/chat/completions"))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await;

        let response = match response {
            Ok(r) if r.status().is_success() => r,
            Ok(r) => {
                warn!(model, status = %r.status(), "non-stream completion returned error status");
                return String::new();
            }
            Err(e) => {
                warn!(model, error = %e, "non-stream completion failed");
                return String::new();
            }
        };

        let Ok(payload) = response.json::<Value>().await else {
            return String::new();
        };
        payload
            .get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("message"))
            .and_then(|m| m.get("content"))
            .map(extract_text)
            .unwrap_or_default()
    }

    async fn unload(&self, model: &str) -> bool {
        info!(model, "unloading model");
        let result = self
            .client
            .post(self.endpoint("/models/unload"))
            .bearer_auth(&self.api_key)
            .json(&json!({ "model": model }))
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => true,
            Ok(response) => {
                warn!(model, status = %response.status(), "model unload rejected");
                false
            }
            Err(e) => {
                warn!(model, error = %e, "model unload request failed");
                false
            }
        }
    }

    async fn list_models(&self) -> Vec<String> {
        let result = self
            .client
            .get(self.endpoint("/models"))
            .bearer_auth(&self.api_key)
            .send()
            .await;

        let Ok(response) = result else {
            warn!("cannot connect to LM Studio to list models");
            return Vec::new();
        };
        let Ok(payload) = response.json::<Value>().await else {
            return Vec::new();
        };
        payload
            .get("data")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|m| m.get("id").and_then(Value::as_str))
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    async fn health_check(&self) -> bool {
        match self.client.get(self.endpoint("/models")).send().await {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_joins_cleanly() {
        let port = LmStudioPort::new(&LmStudioConfig {
            base_url: "http://localhost:1234/v1/".to_string(),
            api_key: "lm-studio".to_string(),
        });
        assert_eq!(
            port.endpoint("/chat/completions"),
            "http://localhost:1234/v1/chat/completions"
        );
    }

    #[test]
    fn test_chat_body_shape() {
        let messages = vec![ChatMessage::system("p"), ChatMessage::user("t")];
        let body = LmStudioPort::chat_body("phi-4", &messages, 0.7, 512, true);
        assert_eq!(body["model"], "phi-4");
        assert_eq!(body["stream"], true);
        assert_eq!(body["max_tokens"], 512);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "t");
    }
}
