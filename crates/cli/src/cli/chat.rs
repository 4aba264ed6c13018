//! `edition chat`: interactive REPL command.
//!
//! Opens a readline-based loop that keeps the conversation history, sends
//! it to the active provider on each line and streams the reply back.
//! Slash-commands switch provider or model, show usage and compact the
//! history.

use std::io::Write;

use ed_domain::config::Config;
use ed_domain::message::Message;
use ed_domain::error::Result;
use ed_domain::stream::{BoxStream, StreamEvent};
use ed_llm::{ChatOptions, UnifiedLlm};
use futures_util::StreamExt;

use super::ask::build_llm;

/// Non-system messages kept verbatim by `/compact`.
const COMPACT_KEEP_RECENT: usize = 4;

pub struct ChatArgs {
    pub provider: Option<String>,
    pub model: Option<String>,
    pub system: Option<String>,
    pub compress: bool,
}

struct Session {
    history: Vec<Message>,
    model: Option<String>,
    compress: bool,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Public entry point
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn chat(config: &Config, args: ChatArgs) -> anyhow::Result<()> {
    let llm = build_llm(config, args.provider.as_deref())?;

    let mut session = Session {
        history: args.system.map(Message::system).into_iter().collect(),
        model: args.model,
        compress: args.compress,
    };

    let history_path = dirs::home_dir()
        .unwrap_or_default()
        .join(".edition")
        .join("chat_history.txt");
    if let Some(parent) = history_path.parent() {
        std::fs::create_dir_all(parent).ok();
    }
    let mut rl = rustyline::DefaultEditor::new()?;
    let _ = rl.load_history(&history_path);

    eprintln!("edition interactive chat");
    eprintln!(
        "Provider: {}  |  Type /help for commands, Ctrl+D to exit",
        llm.provider()
    );
    eprintln!();

    loop {
        match rl.readline("you> ") {
            Ok(line) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                rl.add_history_entry(&line).ok();

                if trimmed.starts_with('/') {
                    match handle_slash_command(trimmed, &llm, &mut session).await {
                        Ok(true) => break,
                        Ok(false) => {}
                        Err(e) => eprintln!("\x1B[31merror: {e}\x1B[0m"),
                    }
                    continue;
                }

                if let Err(e) = send_message(&llm, &mut session, trimmed).await {
                    eprintln!("\x1B[31merror: {e}\x1B[0m");
                }
            }
            Err(rustyline::error::ReadlineError::Interrupted) => {
                eprintln!("(Use Ctrl+D or /exit to quit)");
            }
            Err(rustyline::error::ReadlineError::Eof) => break,
            Err(e) => {
                eprintln!("\x1B[31mreadline error: {e}\x1B[0m");
                break;
            }
        }
    }

    rl.save_history(&history_path).ok();
    print_usage(&llm);
    Ok(())
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Slash command handling
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Process a slash command. Returns `true` if the REPL should exit.
async fn handle_slash_command(
    input: &str,
    llm: &UnifiedLlm,
    session: &mut Session,
) -> anyhow::Result<bool> {
    let (cmd, arg) = split_command(input);

    match cmd {
        "/exit" | "/quit" => return Ok(true),

        "/provider" => match arg {
            Some(id) => {
                llm.set_provider(id)?;
                // A model name rarely means anything to another backend.
                session.model = None;
                eprintln!("Provider set to: {id}");
            }
            None => {
                eprintln!("Current provider: {}", llm.provider());
                eprintln!("Available: {}", llm.providers().join(", "));
            }
        },

        "/model" => match arg {
            Some(name) => {
                session.model = Some(name.to_string());
                eprintln!("Model set to: {name}");
            }
            None => {
                let current = session.model.as_deref().unwrap_or("(default)");
                eprintln!("Current model: {current}");
                eprintln!("Usage: /model <name>");
            }
        },

        "/usage" => print_usage(llm),

        "/compress" => {
            session.compress = !session.compress;
            eprintln!("Compression {}", if session.compress { "on" } else { "off" });
        }

        "/compact" => {
            let before = session.history.len();
            session.history = llm.compact(&session.history, COMPACT_KEEP_RECENT).await?;
            eprintln!("History: {before} → {} messages", session.history.len());
        }

        "/reset" => {
            session.history.retain(|m| m.is_system());
            llm.reset_token_usage();
            eprintln!("Conversation cleared.");
        }

        "/help" => {
            eprintln!("Commands:");
            eprintln!("  /provider <id>   Switch provider (no argument lists them)");
            eprintln!("  /model <name>    Set the model or alias (e.g. sonnet-3.7)");
            eprintln!("  /usage           Show token usage so far");
            eprintln!("  /compress        Toggle history compression");
            eprintln!("  /compact         Summarize older turns with the model");
            eprintln!("  /reset           Clear the conversation");
            eprintln!("  /exit, /quit     Exit the chat");
            eprintln!("  /help            Show this help");
        }

        other => {
            eprintln!("Unknown command: {other}  (type /help for a list)");
        }
    }

    Ok(false)
}

fn split_command(input: &str) -> (&str, Option<&str>) {
    let mut parts = input.splitn(2, ' ');
    let cmd = parts.next().unwrap_or_default();
    let arg = parts.next().map(str::trim).filter(|s| !s.is_empty());
    (cmd, arg)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Message sending + streaming
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

async fn send_message(llm: &UnifiedLlm, session: &mut Session, text: &str) -> anyhow::Result<()> {
    session.history.push(Message::user(text));

    let opts = ChatOptions {
        model: session.model.clone(),
        compress: Some(session.compress),
        ..Default::default()
    };

    let outcome = match llm.chat_stream(&session.history, opts).await {
        Ok(stream) => print_reply(stream).await,
        Err(e) => Err(e.into()),
    };
    settle_turn(&mut session.history, outcome)
}

/// Print tokens as they arrive and return the whole reply. A transport or
/// provider error ends the reply with that error.
async fn print_reply(mut stream: BoxStream<'static, Result<StreamEvent>>) -> anyhow::Result<String> {
    let mut reply = String::new();
    while let Some(event) = stream.next().await {
        match event {
            Ok(StreamEvent::Token { text }) => {
                print!("{text}");
                std::io::stdout().flush().ok();
                reply.push_str(&text);
            }
            Ok(StreamEvent::Done { .. }) => println!(),
            Ok(StreamEvent::Error { message }) => {
                println!();
                anyhow::bail!("provider error: {message}");
            }
            Err(e) => {
                println!();
                return Err(e.into());
            }
        }
    }
    Ok(reply)
}

/// Store the reply, or drop the unanswered user turn so the history keeps
/// alternating user and assistant messages.
fn settle_turn(history: &mut Vec<Message>, outcome: anyhow::Result<String>) -> anyhow::Result<()> {
    match outcome {
        Ok(reply) if !reply.is_empty() => {
            history.push(Message::assistant(reply));
            Ok(())
        }
        Ok(_) => {
            history.pop();
            Ok(())
        }
        Err(e) => {
            history.pop();
            Err(e)
        }
    }
}

fn print_usage(llm: &UnifiedLlm) {
    let usage = llm.token_usage();
    eprintln!(
        "\x1b[2mtokens: {} prompt + {} completion = {} ({} requests)\x1b[0m",
        usage.prompt, usage.completion, usage.total, usage.requests
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_command_trims_argument() {
        assert_eq!(split_command("/model  haiku "), ("/model", Some("haiku")));
        assert_eq!(split_command("/model"), ("/model", None));
        assert_eq!(split_command("/provider   "), ("/provider", None));
    }

    fn events(items: Vec<Result<StreamEvent>>) -> BoxStream<'static, Result<StreamEvent>> {
        Box::pin(futures_util::stream::iter(items))
    }

    #[tokio::test]
    async fn interrupted_stream_drops_the_user_turn() {
        let mut history = vec![
            Message::system("Tu es un éditeur."),
            Message::user("Relis le chapitre 2."),
        ];
        let outcome = print_reply(events(vec![
            Ok(StreamEvent::Token { text: "Le chap".into() }),
            Err(ed_domain::error::Error::Http("connection reset".into())),
        ]))
        .await;

        assert!(settle_turn(&mut history, outcome).is_err());
        assert_eq!(history, vec![Message::system("Tu es un éditeur.")]);
    }

    #[tokio::test]
    async fn completed_stream_appends_the_reply() {
        let mut history = vec![Message::user("Un titre ?")];
        let outcome = print_reply(events(vec![
            Ok(StreamEvent::Token { text: "L'Hiver".into() }),
            Ok(StreamEvent::Done {
                usage: None,
                finish_reason: Some("stop".into()),
            }),
        ]))
        .await;

        settle_turn(&mut history, outcome).unwrap();
        assert_eq!(
            history,
            vec![Message::user("Un titre ?"), Message::assistant("L'Hiver")]
        );
    }

    #[tokio::test]
    async fn in_band_provider_error_also_drops_the_turn() {
        let mut history = vec![Message::user("Un titre ?")];
        let outcome = print_reply(events(vec![Ok(StreamEvent::Error {
            message: "overloaded".into(),
        })]))
        .await;

        let err = settle_turn(&mut history, outcome).unwrap_err();
        assert!(err.to_string().contains("overloaded"));
        assert!(history.is_empty());
    }
}
