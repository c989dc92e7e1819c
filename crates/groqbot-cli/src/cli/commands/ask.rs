//! Ask command handler.

use std::io;
use std::time::Duration;

use anyhow::{Context, Result};
use groqbot_core::config::Config;
use groqbot_core::core::chat::TurnStatus;
use groqbot_core::core::interrupt::{self, CancelToken, InterruptedError};

use super::DeltaWriter;

pub struct AskRunOptions<'a> {
    pub prompt: &'a str,
    pub config: &'a Config,
    pub model_override: Option<&'a str>,
    pub timeout: Option<Duration>,
}

/// Sends one prompt in a fresh session and streams the reply to stdout.
pub async fn run(options: AskRunOptions<'_>) -> Result<()> {
    let service = super::build_service(options.config)?;
    let model = super::resolve_model(options.config, options.model_override);
    let session_id = service.store().lock().create_session(model, None).id;

    // The timer cancels the deadline; Ctrl+C cancels only the turn.
    let deadline = CancelToken::new();
    let cancel = deadline.child();
    let timer = options.timeout.map(|t| deadline.cancel_after(t));
    let _turn = interrupt::watch(cancel.clone());

    let mut stdout = io::stdout();
    let mut writer = DeltaWriter::new(&mut stdout);
    let outcome = service
        .send(session_id, options.prompt, &cancel, |d| writer.write(d))
        .await
        .context("send prompt")?;
    let streamed = writer.finish().context("write reply")?;

    if let Some(timer) = timer {
        timer.abort();
    }
    let timed_out = deadline.is_cancelled();

    match outcome.status {
        TurnStatus::Completed => {
            if !streamed {
                print!("{}", outcome.content);
            }
            println!();
            Ok(())
        }
        TurnStatus::Cancelled => {
            if streamed {
                println!();
            }
            if timed_out {
                if !streamed {
                    println!("{}", outcome.content);
                }
                eprintln!(
                    "Stopped after {}s",
                    options.timeout.unwrap_or_default().as_secs()
                );
                Ok(())
            } else {
                Err(InterruptedError.into())
            }
        }
        TurnStatus::Failed(err) => {
            if streamed {
                println!();
            }
            Err(err).context("completion failed")
        }
    }
}
