//! Core chat session management.
//!
//! A `ChatSession` owns the message history and drives one turn at a time:
//! it opens a fragment stream, folds every fragment into the open bot
//! message, and saves the conversation once the stream ends.  `open` and
//! `send` take `&mut self`, so at most one turn is ever in flight.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::accumulator::StreamAccumulator;
use crate::chat::config::ChatConfig;
use crate::chat::render::{Renderer, USER_ERROR_BANNER};
use crate::client::FragmentSource;
use crate::error::{Error, Result};
use crate::observability::{
    SESSION_CANCELLATIONS, SESSION_TIMEOUTS, SESSION_TURN_DURATION, SESSION_TURN_FAILURES,
    SESSION_TURNS,
};
use crate::prompt::{build_opening_prompt, build_prompt};
use crate::store::{ConversationStore, new_conversation_id};
use crate::types::{Message, PersonaConfig};

/// How a turn ended.
#[derive(Debug)]
pub enum TurnOutcome {
    /// The stream ended normally and the conversation was saved.
    Completed,

    /// The user cancelled the turn.  Nothing was saved.
    Cancelled,

    /// The turn ran past its deadline.  Nothing was saved.
    TimedOut,

    /// The request or the stream failed.
    Failed(Error),
}

impl TurnOutcome {
    /// Returns true if the turn completed.
    pub fn is_completed(&self) -> bool {
        matches!(self, TurnOutcome::Completed)
    }
}

/// Aggregated stats for a chat session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionStats {
    /// Backend and model, as described by the fragment source.
    pub backend: String,
    /// The number of messages in the conversation.
    pub message_count: usize,
    /// The identifier the conversation is saved under, once saved.
    pub conversation_id: Option<String>,
    /// Turns started, including the opening turn.
    pub turns: u64,
    /// Turns that ended in [`TurnOutcome::Failed`].
    pub failed_turns: u64,
    /// Turns the user cancelled.
    pub cancelled_turns: u64,
    /// Turns that ran past their deadline.
    pub timed_out_turns: u64,
    /// Fragments received across all turns.
    pub fragments: u64,
}

enum Step<T> {
    Cancelled,
    Deadline,
    Ready(T),
}

/// A chat session that manages conversation state and streaming turns.
pub struct ChatSession {
    source: Box<dyn FragmentSource>,
    store: Arc<dyn ConversationStore>,
    persona: PersonaConfig,
    config: ChatConfig,
    messages: Vec<Message>,
    conversation_id: Option<String>,
    error: bool,
    streaming: bool,
    turns: u64,
    failed_turns: u64,
    cancelled_turns: u64,
    timed_out_turns: u64,
    fragments: u64,
}

impl ChatSession {
    /// Creates a new chat session.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the persona is incomplete.
    pub fn new(
        source: Box<dyn FragmentSource>,
        store: Arc<dyn ConversationStore>,
        persona: PersonaConfig,
        config: ChatConfig,
    ) -> Result<Self> {
        persona.validate()?;
        Ok(Self {
            source,
            store,
            persona,
            config,
            messages: Vec::new(),
            conversation_id: None,
            error: false,
            streaming: false,
            turns: 0,
            failed_turns: 0,
            cancelled_turns: 0,
            timed_out_turns: 0,
            fragments: 0,
        })
    }

    /// Runs the session-opening turn.  The bot's introduction becomes the
    /// first message of the conversation.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the conversation already has messages.
    pub async fn open(
        &mut self,
        renderer: &mut dyn Renderer,
        cancel: &CancellationToken,
    ) -> Result<TurnOutcome> {
        if !self.messages.is_empty() {
            return Err(Error::validation(
                "the conversation has already started",
                Some("messages".to_string()),
            ));
        }
        let prompt = build_opening_prompt(&self.persona, &self.config.prompt);
        let timeout = self.config.opening_timeout;
        Ok(self.run_turn(prompt, timeout, renderer, cancel).await)
    }

    /// Sends a user message and streams the reply.
    ///
    /// # Errors
    ///
    /// Returns a validation error, without touching the history, if `input`
    /// is blank.  Otherwise `input` is recorded as typed.  Every other failure
    /// is reported through the outcome.
    pub async fn send(
        &mut self,
        input: &str,
        renderer: &mut dyn Renderer,
        cancel: &CancellationToken,
    ) -> Result<TurnOutcome> {
        if input.trim().is_empty() {
            return Err(Error::validation(
                "message must not be empty",
                Some("input".to_string()),
            ));
        }
        self.messages.push(Message::user(input));
        let prompt = build_prompt(&self.messages, input, &self.persona, &self.config.prompt);
        let timeout = self.config.turn_timeout;
        Ok(self.run_turn(prompt, timeout, renderer, cancel).await)
    }

    async fn run_turn(
        &mut self,
        prompt: String,
        timeout: Duration,
        renderer: &mut dyn Renderer,
        cancel: &CancellationToken,
    ) -> TurnOutcome {
        SESSION_TURNS.click();
        self.turns += 1;
        self.error = false;
        self.streaming = true;
        let started = Instant::now();
        let outcome = self.stream_turn(&prompt, timeout, renderer, cancel).await;
        self.streaming = false;
        SESSION_TURN_DURATION.add(started.elapsed().as_secs_f64());

        match &outcome {
            TurnOutcome::Completed => {
                log::debug!("turn completed in {:?}", started.elapsed());
                self.save().await;
            }
            TurnOutcome::Cancelled => {
                SESSION_CANCELLATIONS.click();
                self.cancelled_turns += 1;
                renderer.print_interrupted();
            }
            TurnOutcome::TimedOut => {
                SESSION_TIMEOUTS.click();
                self.timed_out_turns += 1;
                log::warn!("turn exceeded its {timeout:?} deadline");
                cancel.cancel();
                renderer.print_server_busy();
            }
            TurnOutcome::Failed(err) => {
                SESSION_TURN_FAILURES.click();
                self.failed_turns += 1;
                log::error!("turn failed: {err}");
                self.error = true;
                renderer.print_error(USER_ERROR_BANNER);
            }
        }
        outcome
    }

    async fn stream_turn(
        &mut self,
        prompt: &str,
        timeout: Duration,
        renderer: &mut dyn Renderer,
        cancel: &CancellationToken,
    ) -> TurnOutcome {
        let deadline = tokio::time::sleep(timeout);
        tokio::pin!(deadline);

        renderer.set_loading(true);
        let started = tokio::select! {
            biased;
            _ = cancel.cancelled() => Step::Cancelled,
            _ = &mut deadline => Step::Deadline,
            result = self.source.start_stream(prompt, cancel) => Step::Ready(result),
        };
        renderer.set_loading(false);
        let mut stream = match started {
            Step::Cancelled => return TurnOutcome::Cancelled,
            Step::Deadline => return TurnOutcome::TimedOut,
            Step::Ready(Err(err)) if err.is_cancellation() => return TurnOutcome::Cancelled,
            Step::Ready(Err(err)) => return TurnOutcome::Failed(err),
            Step::Ready(Ok(stream)) => stream,
        };

        self.messages.push(Message::bot(""));
        let index = self.messages.len() - 1;
        let mut accumulator = StreamAccumulator::new();
        renderer.start_response();

        let outcome = loop {
            let step = tokio::select! {
                biased;
                _ = cancel.cancelled() => Step::Cancelled,
                _ = &mut deadline => Step::Deadline,
                next = stream.next() => Step::Ready(next),
            };
            match step {
                Step::Cancelled => break TurnOutcome::Cancelled,
                Step::Deadline => break TurnOutcome::TimedOut,
                Step::Ready(None) => break TurnOutcome::Completed,
                Step::Ready(Some(Err(err))) if err.is_cancellation() => {
                    break TurnOutcome::Cancelled;
                }
                Step::Ready(Some(Err(err))) => break TurnOutcome::Failed(err),
                Step::Ready(Some(Ok(fragment))) => {
                    self.fragments += 1;
                    let message = &mut self.messages[index];
                    accumulator.push(fragment.text(), message);
                    renderer.update_response(message);
                }
            }
        };
        renderer.finish_response();
        log::debug!(
            "stream ended after {} fragments, {} bytes",
            accumulator.fragment_count(),
            accumulator.accumulated().len()
        );
        outcome
    }

    /// Writes the whole conversation to the store.  The first save creates
    /// the document and every later save replaces it.
    async fn save(&mut self) {
        let result = match &self.conversation_id {
            Some(id) => self.store.update_conversation(id, &self.messages).await,
            None => {
                let id = new_conversation_id();
                self.conversation_id = Some(id.clone());
                self.store.create_conversation(&id, &self.messages).await
            }
        };
        if let Err(err) = result {
            log::error!("failed to save conversation: {err}");
        }
    }

    /// The conversation so far, oldest first.
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Returns the number of messages in the conversation.
    pub fn message_count(&self) -> usize {
        self.messages.len()
    }

    /// The identifier the conversation is saved under, once the first save
    /// has been attempted.
    pub fn conversation_id(&self) -> Option<&str> {
        self.conversation_id.as_deref()
    }

    pub fn persona(&self) -> &PersonaConfig {
        &self.persona
    }

    pub fn config(&self) -> &ChatConfig {
        &self.config
    }

    /// Returns true if the most recent turn failed.
    pub fn has_error(&self) -> bool {
        self.error
    }

    /// Returns true while a turn is streaming.
    pub fn is_streaming(&self) -> bool {
        self.streaming
    }

    /// Short description of the backend in use.
    pub fn describe_backend(&self) -> String {
        self.source.describe()
    }

    /// Returns the current session statistics snapshot.
    pub fn stats(&self) -> SessionStats {
        SessionStats {
            backend: self.source.describe(),
            message_count: self.messages.len(),
            conversation_id: self.conversation_id.clone(),
            turns: self.turns,
            failed_turns: self.failed_turns,
            cancelled_turns: self.cancelled_turns,
            timed_out_turns: self.timed_out_turns,
            fragments: self.fragments,
        }
    }
}
