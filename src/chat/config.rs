//! Configuration types for the chat application.
//!
//! This module provides CLI argument parsing via `arrrg` and configuration
//! structures for controlling chat behavior.

use std::path::PathBuf;
use std::time::Duration;

use arrrg_derive::CommandLine;

use crate::client::Backend;
use crate::prompt::{DEFAULT_ASSISTANT_NAME, DEFAULT_REPLY_WORD_LIMIT, PromptOptions};

/// Default deadline for a follow-up turn.
pub const DEFAULT_TURN_TIMEOUT: Duration = Duration::from_secs(60);

/// Default deadline for the session-opening turn.
pub const DEFAULT_OPENING_TIMEOUT: Duration = Duration::from_secs(120);

/// Command-line arguments for the banter-chat tool.
#[derive(CommandLine, Debug, Default, PartialEq, Eq)]
pub struct ChatArgs {
    #[arrrg(optional, "Backend protocol: generate or chat-completions (default: generate)", "BACKEND")]
    pub backend: Option<String>,

    #[arrrg(optional, "Endpoint URL for the selected backend", "URL")]
    pub base_url: Option<String>,

    #[arrrg(optional, "Model to request", "MODEL")]
    pub model: Option<String>,

    /// API key for the chat-completions backend.  Falls back to `BANTER_API_KEY`.
    #[arrrg(optional, "API key (default: $BANTER_API_KEY)", "KEY")]
    pub api_key: Option<String>,

    #[arrrg(optional, "YAML file with user_name, adversaries and domain", "FILE")]
    pub persona: Option<String>,

    #[arrrg(optional, "Your name", "NAME")]
    pub user_name: Option<String>,

    #[arrrg(optional, "Comma-separated list of rivals", "NAMES")]
    pub adversaries: Option<String>,

    #[arrrg(optional, "Home turf of the bot", "DOMAIN")]
    pub domain: Option<String>,

    #[arrrg(optional, "Name the bot answers to (default: BanterBot)", "NAME")]
    pub assistant_name: Option<String>,

    /// Directory for saved conversations.  Without it, conversations live
    /// only in memory.
    #[arrrg(optional, "Directory to save conversations in", "DIR")]
    pub store_dir: Option<String>,

    #[arrrg(optional, "Only send the newest N messages with each prompt", "N")]
    pub history_limit: Option<u32>,

    #[arrrg(optional, "Ask for replies under N words, 0 for no limit (default: 50)", "N")]
    pub word_limit: Option<u32>,

    #[arrrg(optional, "Seconds before a turn gives up (default: 60)", "SECONDS")]
    pub turn_timeout: Option<u32>,

    #[arrrg(optional, "Seconds before the opening turn gives up (default: 120)", "SECONDS")]
    pub opening_timeout: Option<u32>,

    #[arrrg(flag, "Do not print thinking blocks")]
    pub hide_thinking: bool,

    /// Disable ANSI colors and styles.
    #[arrrg(flag, "Disable ANSI colors/styles")]
    pub no_color: bool,
}

/// Configuration for a chat session.
///
/// This struct holds the resolved configuration values after processing
/// command-line arguments with appropriate defaults.
#[derive(Debug, Clone)]
pub struct ChatConfig {
    /// The wire protocol to speak.
    pub backend: Backend,

    /// Endpoint override; `None` uses the backend's default.
    pub base_url: Option<String>,

    /// Model override; `None` uses the backend's default.
    pub model: Option<String>,

    /// Explicit API key for the chat-completions backend.
    pub api_key: Option<String>,

    /// Options passed to the prompt builder.
    pub prompt: PromptOptions,

    /// Where conversations are saved, if anywhere.
    pub store_dir: Option<PathBuf>,

    /// Deadline for a follow-up turn.
    pub turn_timeout: Duration,

    /// Deadline for the opening turn.
    pub opening_timeout: Duration,

    /// Whether thinking blocks are printed.
    pub show_thinking: bool,

    /// Whether to use ANSI colors and styles in output.
    pub use_color: bool,
}

impl ChatConfig {
    /// Creates a new ChatConfig with default values.
    ///
    /// Defaults:
    /// - Backend: generate, at its default endpoint and model
    /// - Turn timeout: 60 s, opening timeout: 120 s
    /// - Thinking: shown
    /// - Color: enabled
    pub fn new() -> Self {
        Self {
            backend: Backend::default(),
            base_url: None,
            model: None,
            api_key: None,
            prompt: PromptOptions::new(),
            store_dir: None,
            turn_timeout: DEFAULT_TURN_TIMEOUT,
            opening_timeout: DEFAULT_OPENING_TIMEOUT,
            show_thinking: true,
            use_color: true,
        }
    }

    /// Sets the backend.
    pub fn with_backend(mut self, backend: Backend) -> Self {
        self.backend = backend;
        self
    }

    /// Sets the endpoint URL.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Sets the model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Sets the prompt options.
    pub fn with_prompt_options(mut self, prompt: PromptOptions) -> Self {
        self.prompt = prompt;
        self
    }

    /// Sets the directory conversations are saved in.
    pub fn with_store_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.store_dir = dir;
        self
    }

    /// Sets the follow-up turn deadline.
    pub fn with_turn_timeout(mut self, timeout: Duration) -> Self {
        self.turn_timeout = timeout;
        self
    }

    /// Sets the opening turn deadline.
    pub fn with_opening_timeout(mut self, timeout: Duration) -> Self {
        self.opening_timeout = timeout;
        self
    }

    /// Sets whether thinking blocks are printed.
    pub fn with_show_thinking(mut self, show: bool) -> Self {
        self.show_thinking = show;
        self
    }

    /// Disables ANSI color output.
    pub fn without_color(mut self) -> Self {
        self.use_color = false;
        self
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl TryFrom<ChatArgs> for ChatConfig {
    type Error = crate::Error;

    fn try_from(args: ChatArgs) -> Result<Self, Self::Error> {
        let backend = match args.backend.as_deref() {
            Some(backend) => backend.parse::<Backend>()?,
            None => Backend::default(),
        };
        let prompt = PromptOptions::new()
            .with_assistant_name(
                args.assistant_name
                    .unwrap_or_else(|| DEFAULT_ASSISTANT_NAME.to_string()),
            )
            .with_reply_word_limit(match args.word_limit {
                Some(0) => None,
                Some(words) => Some(words),
                None => Some(DEFAULT_REPLY_WORD_LIMIT),
            })
            .with_history_limit(args.history_limit.map(|n| n as usize));
        Ok(ChatConfig {
            backend,
            base_url: args.base_url,
            model: args.model,
            api_key: args.api_key,
            prompt,
            store_dir: args.store_dir.map(PathBuf::from),
            turn_timeout: args
                .turn_timeout
                .map(|secs| Duration::from_secs(secs.into()))
                .unwrap_or(DEFAULT_TURN_TIMEOUT),
            opening_timeout: args
                .opening_timeout
                .map(|secs| Duration::from_secs(secs.into()))
                .unwrap_or(DEFAULT_OPENING_TIMEOUT),
            show_thinking: !args.hide_thinking,
            use_color: !args.no_color,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = ChatConfig::new();
        assert_eq!(config.backend, Backend::Generate);
        assert!(config.base_url.is_none());
        assert!(config.model.is_none());
        assert_eq!(config.turn_timeout, Duration::from_secs(60));
        assert_eq!(config.opening_timeout, Duration::from_secs(120));
        assert_eq!(config.prompt, PromptOptions::new());
        assert!(config.show_thinking);
        assert!(config.use_color);
        assert!(config.store_dir.is_none());
    }

    #[test]
    fn config_from_args_defaults() {
        let config = ChatConfig::try_from(ChatArgs::default()).unwrap();
        assert_eq!(config.backend, Backend::Generate);
        assert_eq!(config.prompt.reply_word_limit, Some(50));
        assert_eq!(config.prompt.history_limit, None);
        assert_eq!(config.turn_timeout, DEFAULT_TURN_TIMEOUT);
    }

    #[test]
    fn config_from_args_custom() {
        let args = ChatArgs {
            backend: Some("chat-completions".to_string()),
            model: Some("deepseek-reasoner".to_string()),
            assistant_name: Some("Rook".to_string()),
            store_dir: Some("/tmp/banter".to_string()),
            history_limit: Some(20),
            word_limit: Some(0),
            turn_timeout: Some(5),
            opening_timeout: Some(7),
            hide_thinking: true,
            no_color: true,
            ..ChatArgs::default()
        };
        let config = ChatConfig::try_from(args).unwrap();
        assert_eq!(config.backend, Backend::ChatCompletions);
        assert_eq!(config.model.as_deref(), Some("deepseek-reasoner"));
        assert_eq!(config.prompt.assistant_name, "Rook");
        assert_eq!(config.prompt.reply_word_limit, None);
        assert_eq!(config.prompt.history_limit, Some(20));
        assert_eq!(config.store_dir, Some(PathBuf::from("/tmp/banter")));
        assert_eq!(config.turn_timeout, Duration::from_secs(5));
        assert_eq!(config.opening_timeout, Duration::from_secs(7));
        assert!(!config.show_thinking);
        assert!(!config.use_color);
    }

    #[test]
    fn config_from_args_rejects_unknown_backend() {
        let args = ChatArgs {
            backend: Some("carrier-pigeon".to_string()),
            ..ChatArgs::default()
        };
        let err = ChatConfig::try_from(args).unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn config_builder_pattern() {
        let config = ChatConfig::new()
            .with_backend(Backend::ChatCompletions)
            .with_base_url("http://localhost:8080")
            .with_model("local")
            .with_prompt_options(PromptOptions::new().with_history_limit(Some(4)))
            .with_store_dir(Some(PathBuf::from("saved")))
            .with_turn_timeout(Duration::from_secs(1))
            .with_opening_timeout(Duration::from_secs(2))
            .with_show_thinking(false)
            .without_color();

        assert_eq!(config.backend, Backend::ChatCompletions);
        assert_eq!(config.base_url.as_deref(), Some("http://localhost:8080"));
        assert_eq!(config.model.as_deref(), Some("local"));
        assert_eq!(config.prompt.history_limit, Some(4));
        assert_eq!(config.store_dir, Some(PathBuf::from("saved")));
        assert_eq!(config.turn_timeout, Duration::from_secs(1));
        assert_eq!(config.opening_timeout, Duration::from_secs(2));
        assert!(!config.show_thinking);
        assert!(!config.use_color);
    }
}
