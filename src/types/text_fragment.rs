use crate::types::{ChatCompletionChunk, GenerateChunk};

/// One incremental unit of streamed text.
///
/// The two variants correspond to the two upstream API shapes; both expose
/// their text through [`TextFragment::text`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextFragment {
    /// A parsed line of a newline-delimited generate response.
    Chunk(GenerateChunk),

    /// A parsed chat-completions delta.
    Delta(ChatCompletionChunk),
}

impl TextFragment {
    /// The text this fragment contributes to the response.
    pub fn text(&self) -> &str {
        match self {
            TextFragment::Chunk(chunk) => &chunk.response,
            TextFragment::Delta(delta) => delta.content(),
        }
    }
}

impl From<GenerateChunk> for TextFragment {
    fn from(chunk: GenerateChunk) -> Self {
        TextFragment::Chunk(chunk)
    }
}

impl From<ChatCompletionChunk> for TextFragment {
    fn from(chunk: ChatCompletionChunk) -> Self {
        TextFragment::Delta(chunk)
    }
}

impl From<&str> for TextFragment {
    fn from(text: &str) -> Self {
        TextFragment::Chunk(GenerateChunk::new(text))
    }
}
