//! Accumulates streamed fragments into the open bot message.

use crate::thinking::split_thinking;
use crate::types::Message;

/// Builds a bot message from streamed text fragments.
///
/// Every push re-derives the message's `content` and `thinking` from the
/// whole accumulated string rather than from the delta, so a reasoning block
/// opened in one fragment and closed in a later one is reclassified once it
/// closes.  The state after fragment *n* depends only on the concatenation
/// of fragments 1..n, never on where the chunk boundaries fell.
#[derive(Debug, Default)]
pub struct StreamAccumulator {
    accumulated: String,
    fragments: usize,
}

impl StreamAccumulator {
    /// Creates an empty accumulator for a new stream.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `text` and rewrites `message` from the accumulated output.
    pub fn push(&mut self, text: &str, message: &mut Message) {
        self.accumulated.push_str(text);
        self.fragments += 1;
        let split = split_thinking(&self.accumulated);
        message.content = split.content;
        message.thinking = split.thinking;
    }

    /// The raw concatenation of every fragment so far.
    pub fn accumulated(&self) -> &str {
        &self.accumulated
    }

    /// The number of fragments pushed.
    pub fn fragment_count(&self) -> usize {
        self.fragments
    }
}
