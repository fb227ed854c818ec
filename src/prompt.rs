//! Prompt construction.
//!
//! The generation endpoints are stateless, so every turn serializes the
//! persona and the conversation so far into one prompt string.  By default
//! the whole history is resent each turn and prompts grow without bound;
//! set [`PromptOptions::history_limit`] to keep only the newest messages.

use crate::types::{Message, PersonaConfig};

/// Default display name of the bot.
pub const DEFAULT_ASSISTANT_NAME: &str = "BanterBot";

/// Default cap on reply length, in words.
pub const DEFAULT_REPLY_WORD_LIMIT: u32 = 50;

/// Knobs that shape the generated prompts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptOptions {
    /// The name the bot answers to.
    pub assistant_name: String,

    /// Ask the model to stay under this many words.
    pub reply_word_limit: Option<u32>,

    /// Render only the newest `n` messages of the history.
    pub history_limit: Option<usize>,
}

impl PromptOptions {
    /// Creates options with the default assistant name and word limit and
    /// no history limit.
    pub fn new() -> Self {
        Self {
            assistant_name: DEFAULT_ASSISTANT_NAME.to_string(),
            reply_word_limit: Some(DEFAULT_REPLY_WORD_LIMIT),
            history_limit: None,
        }
    }

    /// Sets the assistant name.
    pub fn with_assistant_name(mut self, name: impl Into<String>) -> Self {
        self.assistant_name = name.into();
        self
    }

    /// Sets the reply word limit.
    pub fn with_reply_word_limit(mut self, limit: Option<u32>) -> Self {
        self.reply_word_limit = limit;
        self
    }

    /// Sets the history limit.
    pub fn with_history_limit(mut self, limit: Option<usize>) -> Self {
        self.history_limit = limit;
        self
    }

    fn length_hint(&self) -> String {
        match self.reply_word_limit {
            Some(words) => format!(" (keep it under {words} words)"),
            None => String::new(),
        }
    }
}

impl Default for PromptOptions {
    fn default() -> Self {
        Self::new()
    }
}

/// Builds the prompt for a follow-up turn.
///
/// The prompt is the persona preamble, then one `role: content` line per
/// history message in order, then an instruction line carrying `input`.
/// Thinking text is never sent back upstream.
pub fn build_prompt(
    history: &[Message],
    input: &str,
    persona: &PersonaConfig,
    options: &PromptOptions,
) -> String {
    let name = &options.assistant_name;
    let mut prompt = format!(
        "Here is some context for your roleplay. {user} is your sole master and creator. \
         The following are your sworn rivals: {rivals}. \
         You will respond to the user as {name}, a local character from {domain}; \
         that is where you are from and where you operate. \
         Stay in character at all times. \
         You are having a conversation with {user} as {name}; \
         the following is the recorded conversation so far:\n",
        user = persona.user_name,
        rivals = persona.adversary_list(),
        domain = persona.domain,
    );

    let skip = options
        .history_limit
        .map_or(0, |limit| history.len().saturating_sub(limit));
    let lines: Vec<String> = history[skip..]
        .iter()
        .map(|message| format!("{}: {}", message.role, message.content))
        .collect();
    prompt.push_str(&lines.join("\n"));

    prompt.push_str(&format!(
        "\n\nAnswer the user's latest message in character as {name}, like a person rather \
         than a bot, without using quotes{hint}: {input}\n",
        hint = options.length_hint(),
    ));
    prompt
}

/// Builds the prompt that opens a session, before the user has said anything.
pub fn build_opening_prompt(persona: &PersonaConfig, options: &PromptOptions) -> String {
    format!(
        "What's good, {name}? This is {user}, repping {domain}. {rivals} better watch their \
         backs. Introduce yourself{hint}.",
        name = options.assistant_name,
        user = persona.user_name,
        domain = persona.domain,
        rivals = persona.adversary_list(),
        hint = options.length_hint(),
    )
}
