//! Interactive banter chat built on the streaming fragment sources.
//!
//! - [`config`]: CLI argument parsing and configuration
//! - [`session`]: Conversation state and the turn state machine
//! - [`commands`]: Slash command parsing
//! - [`render`]: Terminal output

mod commands;
mod config;
mod render;
mod session;

pub use commands::{ChatCommand, help_text, parse_command};
pub use config::{ChatArgs, ChatConfig, DEFAULT_OPENING_TIMEOUT, DEFAULT_TURN_TIMEOUT};
pub use render::{PlainTextRenderer, Renderer, SERVER_BUSY_NOTICE, USER_ERROR_BANNER};
pub use session::{ChatSession, SessionStats, TurnOutcome};
