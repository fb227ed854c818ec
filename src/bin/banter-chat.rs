//! Interactive banter with a streaming language model.
//!
//! # Usage
//!
//! ```bash
//! # Local generate endpoint with the default model
//! banter-chat --user-name Ada --adversaries "Jets, Sharks" --domain Westside
//!
//! # Persona from a file, hosted chat-completions backend (key from $BANTER_API_KEY)
//! banter-chat --persona persona.yaml --backend chat-completions
//!
//! # Save conversations to disk
//! banter-chat --store-dir ~/.banter
//! ```
//!
//! Missing persona fields are asked for before the chat starts.  The bot
//! speaks first.  Press Ctrl+C while it is talking to cut it off; Ctrl+D or
//! `/quit` exits.  Set `RUST_LOG` to see logs (default: `warn`).

use std::sync::{Arc, Mutex, MutexGuard};

use arrrg::CommandLine;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tokio_util::sync::CancellationToken;

use banter::chat::{
    ChatArgs, ChatCommand, ChatConfig, ChatSession, PlainTextRenderer, Renderer, help_text,
    parse_command,
};
use banter::{ConversationStore, FileStore, MemoryStore, PersonaConfig, parse_adversaries};

type TokenSlot = Arc<Mutex<Option<CancellationToken>>>;

/// Main entry point for the banter-chat application.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let (args, _) = ChatArgs::from_command_line_relaxed("banter-chat [OPTIONS]");
    let mut persona = match args.persona.as_deref() {
        Some(path) => PersonaConfig::from_file(path)?,
        None => PersonaConfig::new("", Vec::<String>::new(), ""),
    };
    if let Some(user_name) = args.user_name.as_deref() {
        persona.user_name = user_name.trim().to_string();
    }
    if let Some(adversaries) = args.adversaries.as_deref() {
        persona.adversaries = parse_adversaries(adversaries);
    }
    if let Some(domain) = args.domain.as_deref() {
        persona.domain = domain.trim().to_string();
    }
    let config = ChatConfig::try_from(args)?;

    let mut rl = DefaultEditor::new()?;
    let Some(persona) = gather_persona(&mut rl, persona)? else {
        return Ok(());
    };

    let source = config.backend.connect(
        config.base_url.clone(),
        config.model.clone(),
        config.api_key.clone(),
    )?;
    let store: Arc<dyn ConversationStore> = match &config.store_dir {
        Some(dir) => Arc::new(FileStore::new(dir)),
        None => Arc::new(MemoryStore::new()),
    };

    let mut renderer = PlainTextRenderer::with_color(config.use_color)
        .with_bot_label(config.prompt.assistant_name.clone());
    renderer.set_show_thinking(config.show_thinking);
    let mut session = ChatSession::new(source, store, persona, config)?;

    // Ctrl+C during a turn cancels it.  At the prompt rustyline sees the key
    // itself and reports Interrupted.
    let current: TokenSlot = Arc::new(Mutex::new(None));
    let handler_slot = current.clone();
    ctrlc::set_handler(move || {
        if let Some(token) = lock(&handler_slot).as_ref() {
            token.cancel();
        }
    })?;

    println!("Banter ({})", session.describe_backend());
    println!("Type /help for commands, /quit to exit\n");

    let cancel = arm(&current);
    session.open(&mut renderer, &cancel).await?;
    disarm(&current);

    loop {
        match rl.readline("You: ") {
            Ok(input) => {
                let line = input.trim();
                if line.is_empty() {
                    continue;
                }

                let _ = rl.add_history_entry(line);

                if let Some(cmd) = parse_command(line) {
                    match cmd {
                        ChatCommand::Quit => {
                            println!("Later!");
                            break;
                        }
                        ChatCommand::Help => {
                            for line in help_text().lines() {
                                println!("    {line}");
                            }
                        }
                        ChatCommand::Stats => print_stats(&session),
                        ChatCommand::ShowConfig => print_config(&session, &renderer),
                        ChatCommand::Thinking(show) => {
                            renderer.set_show_thinking(show);
                            renderer.print_info(if show {
                                "Thinking blocks will be shown."
                            } else {
                                "Thinking blocks will be hidden."
                            });
                        }
                        ChatCommand::History => {
                            for message in session.messages() {
                                renderer.print_message(message);
                            }
                        }
                        ChatCommand::Invalid(message) => {
                            renderer.print_error(&message);
                        }
                    }
                    continue;
                }

                let cancel = arm(&current);
                let result = session.send(&input, &mut renderer, &cancel).await;
                disarm(&current);
                if let Err(err) = result {
                    renderer.print_error(&err.to_string());
                }
            }
            Err(ReadlineError::Interrupted) => {
                // Ctrl+C at prompt - soft interrupt
                println!();
                continue;
            }
            Err(ReadlineError::Eof) => {
                println!("\nLater!");
                break;
            }
            Err(err) => {
                renderer.print_error(&format!("Input error: {err}"));
                break;
            }
        }
    }

    Ok(())
}

/// Ask for whatever the persona is missing until it is complete.  Returns
/// `None` if the user gives up with Ctrl+C or Ctrl+D.
fn gather_persona(
    rl: &mut DefaultEditor,
    mut persona: PersonaConfig,
) -> Result<Option<PersonaConfig>, ReadlineError> {
    while !persona.is_complete() {
        let answer = if persona.user_name.is_empty() {
            rl.readline("Your name: ")
        } else if persona.adversaries.is_empty() {
            rl.readline("Your rivals (comma-separated): ")
        } else {
            rl.readline("Your turf: ")
        };
        let answer = match answer {
            Ok(answer) => answer,
            Err(ReadlineError::Interrupted | ReadlineError::Eof) => return Ok(None),
            Err(err) => return Err(err),
        };
        if persona.user_name.is_empty() {
            persona.user_name = answer.trim().to_string();
        } else if persona.adversaries.is_empty() {
            persona.adversaries = parse_adversaries(&answer);
        } else {
            persona.domain = answer.trim().to_string();
        }
    }
    Ok(Some(persona))
}

fn lock(slot: &Mutex<Option<CancellationToken>>) -> MutexGuard<'_, Option<CancellationToken>> {
    slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn arm(slot: &TokenSlot) -> CancellationToken {
    let token = CancellationToken::new();
    *lock(slot) = Some(token.clone());
    token
}

fn disarm(slot: &TokenSlot) {
    *lock(slot) = None;
}

fn print_stats(session: &ChatSession) {
    let stats = session.stats();
    println!("    Session Statistics:");
    println!("      Backend: {}", stats.backend);
    println!("      Messages: {}", stats.message_count);
    match stats.conversation_id.as_deref() {
        Some(id) => println!("      Conversation: {id}"),
        None => println!("      Conversation: (not saved yet)"),
    }
    println!(
        "      Turns: {} ({} failed, {} cancelled, {} timed out)",
        stats.turns, stats.failed_turns, stats.cancelled_turns, stats.timed_out_turns
    );
    println!("      Fragments received: {}", stats.fragments);
}

fn print_config(session: &ChatSession, renderer: &PlainTextRenderer) {
    let config = session.config();
    let persona = session.persona();
    println!("    Current Configuration:");
    println!("      Backend: {}", session.describe_backend());
    println!("      You: {}", persona.user_name);
    println!("      Rivals: {}", persona.adversary_list());
    println!("      Turf: {}", persona.domain);
    println!("      Bot name: {}", config.prompt.assistant_name);
    match config.prompt.reply_word_limit {
        Some(words) => println!("      Word limit: {words}"),
        None => println!("      Word limit: (none)"),
    }
    match config.prompt.history_limit {
        Some(limit) => println!("      History sent: newest {limit} messages"),
        None => println!("      History sent: all messages"),
    }
    println!("      Turn timeout: {:?}", config.turn_timeout);
    println!("      Opening timeout: {:?}", config.opening_timeout);
    println!(
        "      Thinking output: {}",
        if renderer.show_thinking() {
            "shown"
        } else {
            "hidden"
        }
    );
    match config.store_dir.as_ref() {
        Some(dir) => println!("      Saving to: {}", dir.display()),
        None => println!("      Saving to: (memory only)"),
    }
}
