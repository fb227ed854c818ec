// Public modules
pub mod accumulator;
pub mod chat;
pub mod client;
pub mod error;
pub mod ndjson;
pub mod prompt;
pub mod sse;
pub mod store;
pub mod thinking;
pub mod types;
pub mod utils;

mod observability;

// Re-exports
pub use accumulator::StreamAccumulator;
pub use client::{
    Backend, ChatCompletionsClient, FragmentSource, FragmentStream, GenerateClient,
};
pub use error::{Error, Result};
pub use observability::register_biometrics;
pub use prompt::{PromptOptions, build_opening_prompt, build_prompt};
pub use store::{ConversationStore, FileStore, MemoryStore, new_conversation_id};
pub use thinking::{Split, split_thinking};
pub use types::*;
