//! Separating reasoning blocks from user-visible text.
//!
//! Models such as deepseek-r1 wrap their reasoning in `<think>...</think>`.
//! Only closed blocks are recognised: while a block is still streaming, the
//! opening tag and its partial interior stay in the visible text.  The first
//! closed block becomes the thinking text; nested blocks are not understood.

use std::sync::LazyLock;

use regex::Regex;

/// Tag that opens a reasoning block.
pub const THINK_OPEN: &str = "<think>";

/// Tag that closes a reasoning block.
pub const THINK_CLOSE: &str = "</think>";

static THINK_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<think>(.*?)</think>").expect("think pattern is valid"));

/// Visible content and reasoning derived from raw model output.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Split {
    /// The raw text with every closed reasoning block removed, trimmed.
    pub content: String,

    /// The trimmed interior of the first closed reasoning block.
    pub thinking: Option<String>,
}

/// Split raw model output into visible content and thinking.
pub fn split_thinking(raw: &str) -> Split {
    let thinking = THINK_BLOCK
        .captures(raw)
        .and_then(|captures| captures.get(1))
        .map(|interior| interior.as_str().trim().to_string());
    let content = THINK_BLOCK.replace_all(raw, "").trim().to_string();
    Split { content, thinking }
}
