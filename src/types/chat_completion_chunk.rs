use serde::{Deserialize, Serialize};

/// One streamed event of a chat-completions response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatCompletionChunk {
    /// Candidate deltas; only the first is read.
    #[serde(default)]
    pub choices: Vec<ChunkChoice>,
}

/// A single choice within a [`ChatCompletionChunk`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkChoice {
    /// The incremental content.
    #[serde(default)]
    pub delta: ChunkDelta,
}

/// The incremental content of a choice.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkDelta {
    /// Newly generated text, absent on role-only or final deltas.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

impl ChatCompletionChunk {
    /// Create a chunk carrying a single content delta.
    pub fn with_content(content: impl Into<String>) -> Self {
        Self {
            choices: vec![ChunkChoice {
                delta: ChunkDelta {
                    content: Some(content.into()),
                },
            }],
        }
    }

    /// Returns `choices[0].delta.content`, or the empty string.
    pub fn content(&self) -> &str {
        self.choices
            .first()
            .and_then(|choice| choice.delta.content.as_deref())
            .unwrap_or("")
    }
}

/// A `{role, content}` entry of a chat-completions request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Upstream role name.
    pub role: String,

    /// Message text.
    pub content: String,
}

/// Request body for a streaming chat-completions call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatCompletionRequest {
    /// Model identifier.
    pub model: String,

    /// The messages sent upstream.
    pub messages: Vec<ChatMessage>,

    /// Always true.
    pub stream: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn content_from_first_choice() {
        let chunk: ChatCompletionChunk = serde_json::from_value(json!({
            "id": "abc",
            "object": "chat.completion.chunk",
            "choices": [{"index": 0, "delta": {"content": "Yo"}, "finish_reason": null}]
        }))
        .unwrap();
        assert_eq!(chunk.content(), "Yo");
    }

    #[test]
    fn role_only_delta_has_empty_content() {
        let chunk: ChatCompletionChunk = serde_json::from_value(json!({
            "choices": [{"index": 0, "delta": {"role": "assistant"}}]
        }))
        .unwrap();
        assert_eq!(chunk.content(), "");
    }

    #[test]
    fn missing_choices_has_empty_content() {
        let chunk: ChatCompletionChunk = serde_json::from_value(json!({"usage": {}})).unwrap();
        assert_eq!(chunk.content(), "");
    }

    #[test]
    fn request_serialization() {
        let request = ChatCompletionRequest {
            model: "deepseek-chat".to_string(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: "prompt".to_string(),
            }],
            stream: true,
        };
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({
                "model": "deepseek-chat",
                "messages": [{"role": "user", "content": "prompt"}],
                "stream": true
            })
        );
    }
}
