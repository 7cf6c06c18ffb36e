//! Completion port: the text-generation backend boundary
//!
//! The orchestration core only ever sees plain text: a lazy stream of
//! chunks, or one complete string. Everything messy about real
//! backends (SSE framing, reasoning side-channels, fragment-list
//! content shapes, transport failures) is normalized here, at the
//! boundary.
//!
//! Transport failures are reported *in-band*: `stream_chat` yields a
//! single chunk starting with [`ERROR_MARKER`] instead of erroring,
//! so a failed agent turn degrades into error text the session can
//! continue past.

mod lm_studio;

pub use lm_studio::LmStudioPort;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde_json::Value;

use crate::prompt::ChatMessage;

/// Prefix identifying an in-band transport error chunk.
pub const ERROR_MARKER: &str = "[Error:";

/// Whether a streamed chunk is an in-band error report.
pub fn is_error_chunk(chunk: &str) -> bool {
    chunk.trim_start().starts_with(ERROR_MARKER)
}

/// Abstraction over the completion backend consumed by the turn runner.
///
/// Implementations must be safe to share across concurrent sessions:
/// each session's turns are strictly sequential, but a long-lived
/// engine serves many sessions over one port.
#[async_trait]
pub trait CompletionPort: Send + Sync {
    /// Ensure `model` is loaded and ready. Best effort: never errors,
    /// and an optimistic `true` is acceptable when the backend cannot
    /// confirm (the chat call will surface the real failure).
    async fn ensure_ready(&self, model: &str) -> bool;

    /// Stream completion chunks for `messages`. Ends normally at end
    /// of generation; on transport failure yields one error-marked
    /// chunk and ends.
    fn stream_chat(
        &self,
        model: &str,
        messages: &[ChatMessage],
        temperature: f32,
        max_tokens: u32,
    ) -> BoxStream<'static, String>;

    /// One non-streaming completion. Empty string on failure.
    async fn chat_once(
        &self,
        model: &str,
        messages: &[ChatMessage],
        temperature: f32,
        max_tokens: u32,
    ) -> String;

    /// Unload `model` from backend memory. Best effort.
    async fn unload(&self, model: &str) -> bool;

    /// Identifiers of models known to the backend.
    async fn list_models(&self) -> Vec<String>;

    /// Whether the backend is reachable.
    async fn health_check(&self) -> bool;
}

/// Best-effort extraction of plain text from a backend content value.
///
/// Backends disagree about the shape of `content`: plain string,
/// object with a text field, or a list of content-part fragments.
/// Rules are ordered; the first match wins.
pub fn extract_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Object(map) => ["text", "content", "value"]
            .iter()
            .find_map(|k| map.get(*k).and_then(Value::as_str))
            .unwrap_or_default()
            .to_string(),
        Value::Array(items) => items.iter().map(extract_text).collect(),
        _ => String::new(),
    }
}

/// Extract the text carried by one streaming delta, checking the
/// standard field first and then the reasoning side-channels some
/// backends emit instead.
pub fn extract_delta_text(delta: &Value) -> String {
    let mut out = String::new();
    for field in ["content", "reasoning_content", "reasoning"] {
        if let Some(value) = delta.get(field) {
            out.push_str(&extract_text(value));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_error_chunk_detection() {
        assert!(is_error_chunk("[Error: model offline]"));
        assert!(is_error_chunk("\n\n[Error: connection refused]"));
        assert!(!is_error_chunk("The [Error: token appears mid-text"));
        assert!(!is_error_chunk("plain text"));
    }

    #[test]
    fn test_extract_text_string() {
        assert_eq!(extract_text(&json!("hello")), "hello");
    }

    #[test]
    fn test_extract_text_object_field_order() {
        assert_eq!(extract_text(&json!({"text": "a", "content": "b"})), "a");
        assert_eq!(extract_text(&json!({"content": "b"})), "b");
        assert_eq!(extract_text(&json!({"value": "c"})), "c");
        assert_eq!(extract_text(&json!({"other": "x"})), "");
    }

    #[test]
    fn test_extract_text_fragment_list() {
        let parts = json!([
            {"type": "text", "text": "hello "},
            "plain ",
            {"content": "world"},
        ]);
        assert_eq!(extract_text(&parts), "hello plain world");
    }

    #[test]
    fn test_extract_text_non_text() {
        assert_eq!(extract_text(&json!(null)), "");
        assert_eq!(extract_text(&json!(42)), "");
    }

    #[test]
    fn test_extract_delta_reasoning_channel() {
        let delta = json!({"reasoning_content": "thinking..."});
        assert_eq!(extract_delta_text(&delta), "thinking...");

        let delta = json!({"content": "answer", "reasoning": " trail"});
        assert_eq!(extract_delta_text(&delta), "answer trail");

        assert_eq!(extract_delta_text(&json!({})), "");
    }
}
