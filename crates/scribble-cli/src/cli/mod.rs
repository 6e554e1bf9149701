//! CLI entry and dispatch.

use anyhow::{Context, Result};
use clap::Parser;
use scribble_core::{config, logging};

mod commands;

#[derive(Parser)]
#[command(name = "scribble")]
#[command(version)]
#[command(about = "Pencil-sketch chat companion backed by Gemini")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Sends one message to the active scribble and prints the reply
    Send {
        /// The message to send
        #[arg(short, long)]
        prompt: String,

        /// Draw a doodle instead of answering in text
        #[arg(long)]
        doodle: bool,

        /// Where to write a generated doodle (default: ./doodle-<timestamp>.<ext>)
        #[arg(long, value_name = "PATH")]
        out: Option<String>,
    },

    /// Manage scribbles (conversation threads)
    Sessions {
        #[command(subcommand)]
        command: SessionCommands,
    },

    /// Manage token, model and memory
    Settings {
        #[command(subcommand)]
        command: SettingsCommands,
    },

    /// Show the current presence status
    Status,

    /// Manage configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(clap::Subcommand)]
enum SessionCommands {
    /// Lists saved scribbles, newest first
    List,
    /// Shows a scribble transcript (active one if no id is given)
    Show {
        /// Id or title of the scribble
        #[arg(value_name = "SESSION")]
        id: Option<String>,
    },
    /// Starts a new scribble and makes it active
    New,
    /// Makes a scribble active
    Select {
        /// Id or title of the scribble
        #[arg(value_name = "SESSION")]
        id: String,
    },
    /// Renames a scribble
    Rename {
        /// Id or title of the scribble
        #[arg(value_name = "SESSION")]
        id: String,
        /// New title
        #[arg(value_name = "TITLE")]
        title: String,
    },
    /// Deletes a scribble
    Delete {
        /// Id or title of the scribble
        #[arg(value_name = "SESSION")]
        id: String,
    },
}

#[derive(clap::Subcommand)]
enum SettingsCommands {
    /// Shows the current preferences
    Show,
    /// Stores the Gemini API key (empty value clears it)
    SetToken {
        #[arg(value_name = "TOKEN")]
        token: String,
    },
    /// Selects the model used for new messages
    SetModel {
        #[arg(value_name = "MODEL_ID")]
        model: String,
    },
    /// Replaces the memory note
    SetMemory {
        #[arg(value_name = "TEXT")]
        memory: String,
    },
    /// Lists the known models
    Models,
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

    let _log_guard = match logging::init() {
        Ok(guard) => Some(guard),
        Err(err) => {
            eprintln!("Warning: logging disabled: {err:#}");
            None
        }
    };

    // one tokio runtime for everything
    let rt = tokio::runtime::Runtime::new().context("create tokio runtime")?;

    rt.block_on(async move { dispatch(cli).await })
}

async fn dispatch(cli: Cli) -> Result<()> {
    let config = config::Config::load().context("load config")?;

    // default to chat mode
    let Some(command) = cli.command else {
        return commands::chat::run(&config).await;
    };

    match command {
        Commands::Send {
            prompt,
            doodle,
            out,
        } => {
            commands::send::run(commands::send::SendRunOptions {
                prompt: &prompt,
                doodle,
                out: out.as_deref(),
                config: &config,
            })
            .await
        }

        Commands::Sessions { command } => match command {
            SessionCommands::List => {
                commands::sessions::list();
                Ok(())
            }
            SessionCommands::Show { id } => commands::sessions::show(id.as_deref()),
            SessionCommands::New => {
                commands::sessions::new();
                Ok(())
            }
            SessionCommands::Select { id } => commands::sessions::select(&id),
            SessionCommands::Rename { id, title } => commands::sessions::rename(&id, &title),
            SessionCommands::Delete { id } => commands::sessions::delete(&id),
        },

        Commands::Settings { command } => match command {
            SettingsCommands::Show => {
                commands::settings::show(&config);
                Ok(())
            }
            SettingsCommands::SetToken { token } => commands::settings::set_token(&token),
            SettingsCommands::SetModel { model } => commands::settings::set_model(&model),
            SettingsCommands::SetMemory { memory } => commands::settings::set_memory(&memory),
            SettingsCommands::Models => {
                commands::settings::models(&config);
                Ok(())
            }
        },

        Commands::Status => commands::status::run(&config).await,

        Commands::Config { command } => match command {
            ConfigCommands::Path => {
                commands::config::path();
                Ok(())
            }
            ConfigCommands::Init => commands::config::init(),
        },
    }
}
