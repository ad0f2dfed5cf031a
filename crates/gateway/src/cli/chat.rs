//! `wastewise chat`: interactive REPL command.
//!
//! Opens a readline loop that sends each line through the turn handler,
//! keeping one session for the whole conversation.  Slash-commands cover
//! starting over and leaving.

use std::path::PathBuf;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use ww_domain::config::Config;

use crate::bootstrap;
use crate::runtime::AskRequest;
use crate::state::AppState;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Public entry point
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn chat(config: Arc<Config>) -> anyhow::Result<()> {
    let state = bootstrap::build_app_state(config).await?;
    let shutdown = CancellationToken::new();
    bootstrap::spawn_background_tasks(&state, &shutdown);

    let history_path = history_path();
    let mut rl = rustyline::DefaultEditor::new()?;
    if let Some(path) = &history_path {
        let _ = rl.load_history(path);
    }

    // Welcome goes to stderr to keep stdout for replies.
    eprintln!("WasteWise interactive chat ({})", state.backend.model());
    eprintln!("Ask where something goes. Type /help for commands, Ctrl+D to exit");
    eprintln!();

    let mut session: Option<String> = None;

    loop {
        match rl.readline("you> ") {
            Ok(line) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                rl.add_history_entry(&line).ok();

                if trimmed.starts_with('/') {
                    if handle_slash_command(trimmed, &mut session) {
                        break;
                    }
                    continue;
                }

                match send_message(&state, session.clone(), trimmed).await {
                    Ok(id) => session = Some(id),
                    Err(e) => eprintln!("\x1B[31merror: {e}\x1B[0m"),
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

    if let Some(path) = &history_path {
        rl.save_history(path).ok();
    }
    shutdown.cancel();

    eprintln!("Goodbye!");
    Ok(())
}

fn history_path() -> Option<PathBuf> {
    std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".wastewise_history"))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Slash command handling
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Process a slash command.  Returns `true` if the REPL should exit.
fn handle_slash_command(input: &str, session: &mut Option<String>) -> bool {
    let cmd = input.split_whitespace().next().unwrap_or(input);

    match cmd {
        "/exit" | "/quit" => return true,
        "/session" => match session {
            Some(id) => eprintln!("Current session: {id}"),
            None => eprintln!("No session yet; one starts with your first message"),
        },
        "/new" => {
            *session = None;
            eprintln!("Starting a new conversation");
        }
        "/clear" => {
            // ANSI escape: clear screen and move cursor to top-left.
            eprint!("\x1B[2J\x1B[1;1H");
        }
        "/help" => {
            eprintln!("Commands:");
            eprintln!("  /session      Show the current session ID");
            eprintln!("  /new          Start a new conversation");
            eprintln!("  /clear        Clear the screen");
            eprintln!("  /exit, /quit  Exit the chat");
            eprintln!("  /help         Show this help");
        }
        other => eprintln!("Unknown command: {other}  (type /help for a list)"),
    }

    false
}

/// Run one turn and print the reply.  Returns the session ID to continue
/// with.
async fn send_message(
    state: &AppState,
    session: Option<String>,
    message: &str,
) -> anyhow::Result<String> {
    let reply = state
        .turns
        .handle(AskRequest::new(session, message), CancellationToken::new())
        .await?;
    println!("{}\n", reply.reply);
    Ok(reply.session_id)
}
