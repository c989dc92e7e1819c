//! CLI entry and dispatch.

use std::time::Duration;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use groqbot_core::config;
use groqbot_core::core::interrupt;
use tracing::debug;

use crate::logging;

mod commands;

#[derive(Parser)]
#[command(name = "groqbot")]
#[command(version)]
#[command(about = "Chat with Groq-hosted models from the terminal")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Start an interactive chat (default)
    Chat {
        /// Model for new sessions (overrides config)
        #[arg(short, long)]
        model: Option<String>,
    },

    /// Send one prompt and print the reply
    Ask {
        /// The prompt to send
        #[arg(value_name = "PROMPT")]
        prompt: String,

        /// Override the model from config
        #[arg(short, long)]
        model: Option<String>,

        /// Stop the reply after this many seconds
        #[arg(long, value_name = "SECS")]
        timeout: Option<u64>,
    },

    /// List available models
    Models,

    /// Manage configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(clap::Subcommand)]
enum ConfigCommands {
    /// Show the path to the config file
    Path,
    /// Initialize a default config file (if not present)
    Init,
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    interrupt::init()?;

    // one tokio runtime for everything
    let rt = tokio::runtime::Runtime::new().context("create tokio runtime")?;

    rt.block_on(async move { dispatch(cli).await })
}

async fn dispatch(cli: Cli) -> Result<()> {
    let Cli { command, verbose } = cli;

    // config commands must work even when the existing file is broken
    if let Some(Commands::Config { command }) = &command {
        let _log_guard = logging::init(verbose, None)?;
        return match command {
            ConfigCommands::Path => {
                commands::config::path();
                Ok(())
            }
            ConfigCommands::Init => commands::config::init(),
        };
    }

    let config = config::Config::load().context("load config")?;
    let _log_guard = logging::init(verbose, config.log_file.as_deref())?;
    debug!(
        path = %config::paths::config_path().display(),
        model = %config.model,
        "Loaded config"
    );

    // default to chat mode
    let Some(command) = command else {
        return commands::chat::run(&config, None).await;
    };

    match command {
        Commands::Chat { model } => commands::chat::run(&config, model.as_deref()).await,
        Commands::Ask {
            prompt,
            model,
            timeout,
        } => {
            commands::ask::run(commands::ask::AskRunOptions {
                prompt: &prompt,
                config: &config,
                model_override: model.as_deref(),
                timeout: timeout.map(Duration::from_secs),
            })
            .await
        }
        Commands::Models => {
            commands::models::list(&config);
            Ok(())
        }
        Commands::Config { .. } => Ok(()),
    }
}
