use serde::{Deserialize, Serialize};

/// One line of a newline-delimited generate response.
///
/// Servers add fields such as `model`, `created_at` and timing statistics;
/// only the text and the completion marker are kept.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerateChunk {
    /// The text fragment carried by this line.
    pub response: String,

    /// Set on the final line of the stream.
    #[serde(default)]
    pub done: bool,
}

impl GenerateChunk {
    /// Create a new `GenerateChunk` with the given text.
    pub fn new(response: impl Into<String>) -> Self {
        Self {
            response: response.into(),
            done: false,
        }
    }
}

/// Request body for a streaming generate call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerateRequest {
    /// Model identifier.
    pub model: String,

    /// The full prompt.
    pub prompt: String,

    /// Always true; the response is streamed line by line.
    pub stream: bool,
}
