// Public modules
pub mod chat_completion_chunk;
pub mod conversation;
pub mod generate_chunk;
pub mod message;
pub mod persona;
pub mod text_fragment;

// Re-exports
pub use chat_completion_chunk::{
    ChatCompletionChunk, ChatCompletionRequest, ChatMessage, ChunkChoice, ChunkDelta,
};
pub use conversation::Conversation;
pub use generate_chunk::{GenerateChunk, GenerateRequest};
pub use message::{Message, Role};
pub use persona::{PersonaConfig, parse_adversaries};
pub use text_fragment::TextFragment;
