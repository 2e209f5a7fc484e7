//! Interactive chat loop.

use std::io::{BufRead, Write};
use std::path::Path;

use anyhow::{Context, Result};
use dialoguer::Confirm;
use tvision_core::{QuickAction, Transition};

use crate::clipboard::SystemClipboard;
use crate::commands::App;
use crate::render;

const HELP: &str = "\
Commands:
  /new               start a new chat
  /history           list your chats
  /open <n|id>       open a chat from /history
  /delete <n|id>     delete a chat
  /share             copy this conversation to the clipboard
  /upload <file>     upload an image for analysis
  /action <name>     caption | ocr | recolor | mask (after an upload)
  /theme             toggle light/dark
  /help              show this help
  /quit              leave
Anything else is sent as a message.";

/// One parsed line of input.
#[derive(Debug, PartialEq, Eq)]
enum Line<'a> {
    Empty,
    Message(&'a str),
    New,
    History,
    Open(&'a str),
    Delete(&'a str),
    Share,
    Upload(&'a str),
    Action(&'a str),
    Theme,
    Help,
    Quit,
    Unknown(&'a str),
}

fn parse_line(raw: &str) -> Line<'_> {
    let line = raw.trim();
    if line.is_empty() {
        return Line::Empty;
    }
    let Some(command) = line.strip_prefix('/') else {
        return Line::Message(line);
    };
    let (name, arg) = match command.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, arg.trim()),
        None => (command, ""),
    };
    match name {
        "new" => Line::New,
        "history" | "h" => Line::History,
        "open" | "o" => Line::Open(arg),
        "delete" | "rm" => Line::Delete(arg),
        "share" => Line::Share,
        "upload" | "u" => Line::Upload(arg),
        "action" | "a" => Line::Action(arg),
        "theme" => Line::Theme,
        "help" | "?" => Line::Help,
        "quit" | "exit" | "q" => Line::Quit,
        _ => Line::Unknown(name),
    }
}

/// Accept a 1-based index into the listed history or a raw session id.
fn resolve_session(app: &App, arg: &str) -> Option<String> {
    if arg.is_empty() {
        return None;
    }
    app.ctl.with_state(|s| {
        let sessions = s.history().sessions();
        arg.parse::<usize>()
            .ok()
            .and_then(|n| n.checked_sub(1))
            .and_then(|i| sessions.get(i))
            .map(|summary| summary.id.clone())
            .or_else(|| Some(arg.to_string()))
    })
}

fn report(app: &App, transition: Transition) {
    if let Transition::Rejected(r) = transition {
        eprintln!("{r}");
    }
    app.flush_notices();
}

pub async fn run(app: &App) -> Result<()> {
    app.ctl.restore().await;
    match app.ctl.with_state(|s| s.identity().map(|i| i.username.clone())) {
        Some(name) => println!("T-Vision chat, logged in as {name}. Type /help for commands."),
        None => println!("T-Vision chat (not logged in). Type /help for commands."),
    }
    app.print_timeline();

    let stdin = std::io::stdin();
    let mut input = String::new();
    loop {
        print!("> ");
        std::io::stdout().flush().context("flush stdout")?;
        input.clear();
        if stdin.lock().read_line(&mut input).context("read input")? == 0 {
            println!();
            break;
        }

        let mark = app.mark();
        match parse_line(&input) {
            Line::Empty => continue,
            Line::Quit => break,
            Line::Help => println!("{HELP}"),
            Line::Unknown(name) => eprintln!("Unknown command /{name}. Type /help."),
            Line::Message(text) => {
                let transition = app.ctl.send_message(text).await;
                report(app, transition);
                // The prompt line already shows what the user typed.
                app.print_since(&(mark.0, mark.1 + 1))?;
            }
            Line::New => {
                let transition = app.ctl.start_new_chat().await;
                report(app, transition);
                app.print_timeline();
            }
            Line::History => {
                if app.ctl.with_state(|s| s.identity().is_none()) {
                    eprintln!("Log in to see your chats.");
                    continue;
                }
                app.ctl.refresh_history().await;
                app.flush_notices();
                let active = app.ctl.with_state(|s| s.active_session().map(str::to_string));
                let lines =
                    app.ctl
                        .with_state(|s| render::format_history(s.history(), active.as_deref()));
                if lines.is_empty() {
                    println!("No chats yet");
                }
                for line in lines {
                    println!("{line}");
                }
            }
            Line::Open(arg) => match resolve_session(app, arg) {
                Some(id) => {
                    let transition = app.ctl.load_session(&id).await;
                    report(app, transition);
                    app.print_since(&mark)?;
                }
                None => eprintln!("Usage: /open <n|id>"),
            },
            Line::Delete(arg) => match resolve_session(app, arg) {
                Some(id) => {
                    let ask = |prompt: &str| {
                        Confirm::new()
                            .with_prompt(prompt)
                            .default(false)
                            .interact()
                            .unwrap_or(false)
                    };
                    let outcome = app.ctl.delete_session(&id, &ask).await;
                    tracing::debug!(?outcome, "delete");
                    app.print_since(&mark)?;
                }
                None => eprintln!("Usage: /delete <n|id>"),
            },
            Line::Share => match app.ctl.with_state(|s| s.active_session().map(str::to_string)) {
                Some(id) => {
                    app.ctl.share_session(&id, &SystemClipboard).await;
                    app.flush_notices();
                }
                None => eprintln!("No active session to share."),
            },
            Line::Upload(arg) if arg.is_empty() => eprintln!("Usage: /upload <file>"),
            Line::Upload(arg) => {
                let transition = app.ctl.upload_file(Path::new(arg)).await;
                report(app, transition);
                app.print_since(&mark)?;
            }
            Line::Action(arg) => match QuickAction::parse(arg) {
                Some(action) => {
                    let transition = app.ctl.quick_action(action).await;
                    report(app, transition);
                    app.print_since(&mark)?;
                }
                None => eprintln!("Usage: /action <caption|ocr|recolor|mask>"),
            },
            Line::Theme => {
                let theme = app.ctl.toggle_theme(app.config.ui.default_theme);
                println!("Theme: {theme} (applies from the next start)");
            }
        }

        if app.ctl.with_state(|s| s.quick_actions_available())
            && matches!(parse_line(&input), Line::Upload(_))
        {
            println!("Try: /action caption | ocr | recolor | mask");
        }
    }
    Ok(())
}
