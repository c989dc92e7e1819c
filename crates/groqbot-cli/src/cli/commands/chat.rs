//! Interactive chat command.
//!
//! A line-oriented REPL over the session store. Plain lines are sent to the
//! active session and the reply is streamed as it arrives; lines starting with
//! `:` manage sessions. Ctrl+C during a reply stops it and keeps the partial
//! text.

use std::io::{self, BufRead, Write};

use anyhow::Result;
use chrono::{DateTime, Utc};
use groqbot_core::config::Config;
use groqbot_core::core::chat::{ChatService, TurnStatus};
use groqbot_core::core::interrupt::{self, CancelToken, InterruptedError};
use groqbot_core::core::store::{Role, SessionId};
use groqbot_core::models::{self, MODELS};
use groqbot_core::prompts::SUGGESTIONS;

use super::DeltaWriter;

const QUIT_COMMAND: &str = ":q";
const PROMPT_PREFIX: &str = "you> ";
const ASSISTANT_PREFIX: &str = "groqbot> ";
const SHORT_ID_LEN: usize = 8;

const HELP: &str = "\
Commands:
  :new [title]       Start a new session
  :list              List sessions
  :switch <id>       Switch to a session (id prefix)
  :rename <title>    Rename the active session
  :model [id]        Show models, or set the active session's model
  :clear             Remove all messages from the active session
  :delete [id]       Delete a session (default: active)
  :history           Show the active session's messages
  :help              Show this help
  :q                 Quit";

/// Runs the chat REPL on stdin/stdout.
pub async fn run(config: &Config, model_override: Option<&str>) -> Result<()> {
    let service = super::build_service(config)?;
    let model = super::resolve_model(config, model_override);

    let stdin = io::stdin();
    let mut stdout = io::stdout();
    run_repl(stdin.lock(), &mut stdout, &service, &model).await
}

/// Runs the REPL loop.
///
/// Reads user input from `input`, writes everything to `output`.
/// Exits on `:q` or EOF.
pub async fn run_repl<R, W>(
    input: R,
    output: &mut W,
    service: &ChatService,
    default_model: &str,
) -> Result<()>
where
    R: BufRead,
    W: Write,
{
    if service.store().lock().is_empty() {
        service.store().lock().create_session(default_model, None);
    }
    write_welcome(output, default_model)?;
    write!(output, "{PROMPT_PREFIX}")?;
    output.flush()?;

    for line in input.lines() {
        let line = line?;
        if interrupt::is_interrupted() {
            return Err(InterruptedError.into());
        }
        let trimmed = line.trim();

        if trimmed == QUIT_COMMAND {
            writeln!(output, "Goodbye!")?;
            return Ok(());
        }

        if let Some(command) = ReplCommand::parse(trimmed) {
            run_command(output, service, default_model, command)?;
        } else if !trimmed.is_empty() {
            send_line(output, service, default_model, trimmed).await?;
        }

        write!(output, "{PROMPT_PREFIX}")?;
        output.flush()?;
    }

    writeln!(output)?;
    Ok(())
}

fn write_welcome<W: Write>(output: &mut W, model: &str) -> io::Result<()> {
    writeln!(
        output,
        "groqbot ({}). Type :help for commands, :q to quit.",
        models::label_for(model)
    )?;
    writeln!(output, "Try asking:")?;
    for suggestion in SUGGESTIONS {
        writeln!(output, "  - {suggestion}")?;
    }
    Ok(())
}

/// Returns the active session, creating one if the store is empty.
fn active_or_create(service: &ChatService, default_model: &str) -> SessionId {
    let mut store = service.store().lock();
    match store.active_id() {
        Some(id) => id,
        None => store.create_session(default_model, None).id,
    }
}

async fn send_line<W: Write>(
    output: &mut W,
    service: &ChatService,
    default_model: &str,
    text: &str,
) -> Result<()> {
    let session_id = active_or_create(service, default_model);
    let cancel = CancelToken::new();
    let _turn = interrupt::watch(cancel.clone());

    write!(output, "{ASSISTANT_PREFIX}")?;
    output.flush()?;

    let mut writer = DeltaWriter::new(&mut *output);
    let result = service
        .send(session_id, text, &cancel, |d| writer.write(d))
        .await;
    let streamed = writer.finish()?;

    let outcome = match result {
        Ok(outcome) => outcome,
        Err(e) => {
            writeln!(output, "Error: {e}")?;
            return Ok(());
        }
    };

    match outcome.status {
        TurnStatus::Completed if !streamed => writeln!(output, "{}", outcome.content)?,
        TurnStatus::Completed => writeln!(output)?,
        TurnStatus::Cancelled if !streamed => writeln!(output, "{} [stopped]", outcome.content)?,
        TurnStatus::Cancelled => writeln!(output, " [stopped]")?,
        TurnStatus::Failed(_) => {
            if streamed {
                writeln!(output)?;
            }
            writeln!(output, "{}", outcome.content)?;
        }
    }
    Ok(())
}

/// A `:` command typed at the prompt.
#[derive(Debug, PartialEq, Eq)]
enum ReplCommand<'a> {
    Help,
    New(Option<&'a str>),
    List,
    Switch(&'a str),
    Rename(&'a str),
    Model(Option<&'a str>),
    Clear,
    Delete(Option<&'a str>),
    History,
    Usage(&'static str),
    Unknown(&'a str),
}

impl<'a> ReplCommand<'a> {
    /// Parses a trimmed line; `None` if it is not a command.
    fn parse(line: &'a str) -> Option<Self> {
        if !line.starts_with(':') {
            return None;
        }
        let (name, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
        let arg = Some(rest.trim()).filter(|a| !a.is_empty());

        Some(match name {
            ":help" | ":h" => Self::Help,
            ":new" => Self::New(arg),
            ":list" | ":ls" => Self::List,
            ":switch" => arg.map_or(Self::Usage(":switch <id>"), Self::Switch),
            ":rename" => arg.map_or(Self::Usage(":rename <title>"), Self::Rename),
            ":model" => Self::Model(arg),
            ":clear" => Self::Clear,
            ":delete" => Self::Delete(arg),
            ":history" => Self::History,
            _ => Self::Unknown(name),
        })
    }
}

fn run_command<W: Write>(
    output: &mut W,
    service: &ChatService,
    default_model: &str,
    command: ReplCommand<'_>,
) -> io::Result<()> {
    let mut store = service.store().lock();
    // New sessions keep the model of the one being left.
    let current_model = store
        .active_session()
        .map_or_else(|| default_model.to_string(), |s| s.model);

    match command {
        ReplCommand::Help => writeln!(output, "{HELP}"),
        ReplCommand::New(title) => {
            let session = store.create_session(current_model, title);
            writeln!(
                output,
                "Started \"{}\" ({})",
                session.title,
                short_id(session.id)
            )
        }
        ReplCommand::List => {
            let active = store.active_id();
            let now = Utc::now();
            for session in store.list_sessions() {
                let marker = if Some(session.id) == active { '*' } else { ' ' };
                writeln!(
                    output,
                    "{marker} {}  {}  [{}]  {} messages, {}",
                    short_id(session.id),
                    session.title,
                    models::label_for(&session.model),
                    session.messages.len(),
                    format_ago(session.created_at, now)
                )?;
            }
            Ok(())
        }
        ReplCommand::Switch(needle) => match store.resolve_id(needle) {
            Some(id) if store.set_active_id(id).is_ok() => {
                let title = store.get_session(id).map(|s| s.title).unwrap_or_default();
                writeln!(output, "Switched to \"{title}\"")
            }
            _ => writeln!(output, "No session matches '{needle}'"),
        },
        ReplCommand::Rename(title) => match store.active_id() {
            Some(id) if store.rename_session(id, title) => {
                writeln!(output, "Renamed to \"{title}\"")
            }
            _ => writeln!(output, "No active session"),
        },
        ReplCommand::Model(None) => {
            let current = store.active_session().map(|s| s.model);
            for model in MODELS {
                let marker = if current.as_deref() == Some(model.id) {
                    '*'
                } else {
                    ' '
                };
                writeln!(
                    output,
                    "{marker} {:<24} {:<14} {}",
                    model.id, model.label, model.description
                )?;
            }
            Ok(())
        }
        ReplCommand::Model(Some(model)) => match store.active_id() {
            Some(id) if store.change_model(id, model) => {
                let note = if models::ModelOption::find_by_id(model).is_some() {
                    ""
                } else {
                    " (not in catalog)"
                };
                writeln!(output, "Model set to {model}{note}")
            }
            _ => writeln!(output, "No active session"),
        },
        ReplCommand::Clear => match store.active_id().map(|id| store.clear_messages(id)) {
            Some(Ok(true)) => writeln!(output, "Cleared"),
            Some(Err(e)) => writeln!(output, "Error: {e}"),
            _ => writeln!(output, "No active session"),
        },
        ReplCommand::Delete(needle) => {
            let target = match needle {
                Some(needle) => store.resolve_id(needle),
                None => store.active_id(),
            };
            let Some(id) = target.filter(|id| store.delete_session(*id)) else {
                return writeln!(output, "No session matches '{}'", needle.unwrap_or(""));
            };
            writeln!(output, "Deleted {}", short_id(id))?;
            if store.is_empty() {
                store.create_session(current_model, None);
            }
            Ok(())
        }
        ReplCommand::History => {
            let Some(session) = store.active_session() else {
                return writeln!(output, "No active session");
            };
            if session.messages.is_empty() {
                return writeln!(output, "(empty)");
            }
            for message in &session.messages {
                let prefix = match message.role {
                    Role::User => PROMPT_PREFIX,
                    Role::Assistant => ASSISTANT_PREFIX,
                };
                writeln!(output, "{prefix}{}", message.content)?;
            }
            Ok(())
        }
        ReplCommand::Usage(usage) => writeln!(output, "Usage: {usage}"),
        ReplCommand::Unknown(name) => {
            writeln!(output, "Unknown command: {name}. Type :help for commands.")
        }
    }
}

fn short_id(id: SessionId) -> String {
    id.to_string().chars().take(SHORT_ID_LEN).collect()
}

/// Relative time: `just now`, `Nm ago`, `Nh ago`, else the date.
fn format_ago(ts: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let secs = (now - ts).num_seconds();
    if secs < 60 {
        "just now".to_string()
    } else if secs < 3_600 {
        format!("{}m ago", secs / 60)
    } else if secs < 86_400 {
        format!("{}h ago", secs / 3_600)
    } else {
        ts.format("%Y-%m-%d").to_string()
    }
}
