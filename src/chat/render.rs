//! Output rendering for the chat application.
//!
//! The session calls [`Renderer::update_response`] after every fragment with
//! the bot message as re-derived from everything received so far.  Because
//! the visible text is recomputed rather than appended, it can shrink: when
//! a thinking block closes, the text that was shown while the block was open
//! moves into the message's `thinking` field.

use std::io::{self, Stdout, Write};

use crate::types::Message;

/// Banner shown for every user-visible failure.
pub const USER_ERROR_BANNER: &str = "Sorry, something went wrong. Please try again.";

/// Notice shown when a turn runs past its deadline.
pub const SERVER_BUSY_NOTICE: &str = "Server is busy. Please try again later.";

/// ANSI escape code for dim text (used for thinking blocks).
const ANSI_DIM: &str = "\x1b[2m";

/// ANSI escape code for italic text (used for thinking blocks).
const ANSI_ITALIC: &str = "\x1b[3m";

/// ANSI escape code for bold text (used for speaker labels).
const ANSI_BOLD: &str = "\x1b[1m";

/// ANSI escape code for red text (used for the error banner).
const ANSI_RED: &str = "\x1b[31m";

/// ANSI escape code for yellow text (used for the busy notice).
const ANSI_YELLOW: &str = "\x1b[33m";

/// ANSI escape code to reset all styling.
const ANSI_RESET: &str = "\x1b[0m";

/// ANSI escape code to return to column zero and erase the line.
const ANSI_CLEAR_LINE: &str = "\r\x1b[2K";

/// Shown while waiting for a response to start.
const LOADING_MARKER: &str = "...";

/// Trait for rendering chat output.
///
/// This abstraction allows for different rendering strategies:
/// - Plain text with ANSI styling
/// - Plain text without styling (for piping/redirecting)
/// - Recording renderers for tests
pub trait Renderer: Send {
    /// Called once a response stream has started and its bot message exists.
    fn start_response(&mut self);

    /// Called after every fragment with the current state of the bot message.
    fn update_response(&mut self, message: &Message);

    /// Called when the response stream has ended, for whatever reason.
    fn finish_response(&mut self);

    /// Print the generic error banner.
    fn print_error(&mut self, error: &str);

    /// Print the "server busy" notice shown after a timeout.
    fn print_server_busy(&mut self);

    /// Print an informational message.
    fn print_info(&mut self, info: &str);

    /// Called when the user cancels a turn.
    fn print_interrupted(&mut self);

    /// Show or hide a loading indicator.
    fn set_loading(&mut self, loading: bool) {
        _ = loading;
    }
}

/// Plain text renderer with optional ANSI styling.
///
/// Visible content is printed incrementally.  Thinking is printed once, dim
/// and italic, as soon as its block closes.  When the visible content stops
/// extending what is already on screen, the response is reprinted on a new
/// line.
pub struct PlainTextRenderer {
    stdout: Stdout,
    use_color: bool,
    show_thinking: bool,
    bot_label: String,
    shown_content: String,
    shown_thinking: bool,
    at_line_start: bool,
    loading: bool,
}

impl PlainTextRenderer {
    /// Creates a new PlainTextRenderer with ANSI colors enabled.
    pub fn new() -> Self {
        Self::with_color(true)
    }

    /// Creates a new PlainTextRenderer with specified color setting.
    pub fn with_color(use_color: bool) -> Self {
        Self {
            stdout: io::stdout(),
            use_color,
            show_thinking: true,
            bot_label: "Bot".to_string(),
            shown_content: String::new(),
            shown_thinking: false,
            at_line_start: true,
            loading: false,
        }
    }

    /// Sets the label printed before each response.
    pub fn with_bot_label(mut self, label: impl Into<String>) -> Self {
        self.bot_label = label.into();
        self
    }

    /// Sets whether thinking blocks are printed.
    pub fn set_show_thinking(&mut self, show: bool) {
        self.show_thinking = show;
    }

    /// Returns true if thinking blocks are printed.
    pub fn show_thinking(&self) -> bool {
        self.show_thinking
    }

    /// Print a finished message, e.g. when replaying history.
    pub fn print_message(&mut self, message: &Message) {
        if message.is_bot() {
            if let Some(thinking) = message.thinking.as_deref().filter(|_| self.show_thinking) {
                self.write_thinking(thinking);
            }
            let label = self.label(&self.bot_label.clone());
            self.write(&format!("{label} {}\n", message.content));
        } else {
            let label = self.label("You:");
            self.write(&format!("{label} {}\n", message.content));
        }
        self.at_line_start = true;
    }

    /// Flushes stdout to ensure immediate display of streamed content.
    fn flush(&mut self) {
        let _ = self.stdout.flush();
    }

    fn write(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        let _ = self.stdout.write_all(text.as_bytes());
        self.at_line_start = text.ends_with('\n');
        self.flush();
    }

    fn label(&self, label: &str) -> String {
        let label = if label.ends_with(':') {
            label.to_string()
        } else {
            format!("{label}:")
        };
        if self.use_color {
            format!("{ANSI_BOLD}{label}{ANSI_RESET}")
        } else {
            label
        }
    }

    fn write_thinking(&mut self, thinking: &str) {
        if !self.at_line_start {
            self.write("\n");
        }
        if self.use_color {
            self.write(&format!("{ANSI_DIM}{ANSI_ITALIC}{thinking}{ANSI_RESET}\n"));
        } else {
            self.write(&format!("[thinking] {thinking}\n"));
        }
    }

    fn restart_line(&mut self) {
        if !self.at_line_start {
            self.write("\n");
        }
        let label = self.label(&self.bot_label.clone());
        self.write(&format!("{label} "));
    }
}

impl Default for PlainTextRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl Renderer for PlainTextRenderer {
    fn start_response(&mut self) {
        self.shown_content.clear();
        self.shown_thinking = false;
        self.restart_line();
    }

    fn update_response(&mut self, message: &Message) {
        if let Some(thinking) = message.thinking.as_deref() {
            if !self.shown_thinking {
                self.shown_thinking = true;
                if self.show_thinking && !thinking.is_empty() {
                    self.write_thinking(thinking);
                    self.restart_line();
                    self.shown_content.clear();
                }
            }
        }

        if let Some(suffix) = message.content.strip_prefix(self.shown_content.as_str()) {
            let suffix = suffix.to_string();
            self.write(&suffix);
        } else {
            self.restart_line();
            let content = message.content.clone();
            self.write(&content);
        }
        self.shown_content = message.content.clone();
    }

    fn finish_response(&mut self) {
        if !self.at_line_start {
            self.write("\n");
        }
    }

    fn print_error(&mut self, error: &str) {
        if !self.at_line_start {
            self.write("\n");
        }
        if self.use_color {
            eprintln!("{ANSI_RED}{error}{ANSI_RESET}");
        } else {
            eprintln!("{error}");
        }
        self.at_line_start = true;
    }

    fn print_server_busy(&mut self) {
        if !self.at_line_start {
            self.write("\n");
        }
        if self.use_color {
            eprintln!("{ANSI_YELLOW}{SERVER_BUSY_NOTICE}{ANSI_RESET}");
        } else {
            eprintln!("{SERVER_BUSY_NOTICE}");
        }
        self.at_line_start = true;
    }

    fn print_info(&mut self, info: &str) {
        if !self.at_line_start {
            self.write("\n");
        }
        self.write(&format!("{info}\n"));
    }

    fn print_interrupted(&mut self) {
        if !self.at_line_start {
            self.write("\n");
        }
        self.write("[stopped]\n");
    }

    fn set_loading(&mut self, loading: bool) {
        if loading == self.loading {
            return;
        }
        self.loading = loading;
        if loading {
            if !self.at_line_start {
                self.write("\n");
            }
            if self.use_color {
                self.write(&format!("{ANSI_DIM}{LOADING_MARKER}{ANSI_RESET}"));
            } else {
                self.write(LOADING_MARKER);
            }
        } else {
            if self.use_color {
                self.write(ANSI_CLEAR_LINE);
            } else {
                self.write("\n");
            }
            self.at_line_start = true;
        }
    }
}
