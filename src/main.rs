#![warn(clippy::all, clippy::pedantic)]
#![allow(
    clippy::doc_markdown,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions,
    clippy::needless_pass_by_value,
    clippy::too_many_lines,
    clippy::uninlined_format_args
)]

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{fmt, EnvFilter};

use ragchat::sessions::commands::handle_session_command;
use ragchat::sources::{is_valid_url, normalize_url};
use ragchat::{open_session_store, Config, SessionCommands};

/// `ragchat` - conversational RAG session administration.
#[derive(Parser, Debug)]
#[command(name = "ragchat")]
#[command(version)]
#[command(about = "Inspect and manage conversational RAG sessions.", long_about = None)]
struct Cli {
    /// Config directory (RAGCHAT_CONFIG_DIR takes precedence)
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Manage stored conversation sessions
    #[command(long_about = "\
Manage stored conversation sessions.

Examples:
  ragchat sessions list
  ragchat sessions show session_1718000000_1a2b3c4d --limit 20
  ragchat sessions delete session_1718000000_1a2b3c4d")]
    Sessions {
        #[command(subcommand)]
        session_command: SessionCommands,
    },

    /// Show configuration and session store status
    Status,

    /// Normalize source URLs and report whether they are valid
    UrlCheck {
        /// URLs to check
        #[arg(required = true)]
        urls: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Some(config_dir) = &cli.config_dir {
        if config_dir.as_os_str().is_empty() {
            bail!("--config-dir cannot be empty");
        }
    }

    // URL checks are pure and should not create a config directory.
    if let Commands::UrlCheck { urls } = &cli.command {
        print!("{}", render_url_check(urls));
        return Ok(());
    }

    // Initialize logging - respects RUST_LOG env var, defaults to INFO
    let subscriber = fmt::Subscriber::builder()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = Config::load_or_init(cli.config_dir.as_deref()).await?;

    match cli.command {
        Commands::UrlCheck { .. } => Ok(()),

        Commands::Sessions { session_command } => {
            handle_session_command(session_command, &config).await
        }

        Commands::Status => {
            let sessions_path = config.sessions_path();
            println!("ragchat Status");
            println!();
            println!("Version:        {}", env!("CARGO_PKG_VERSION"));
            println!("Config:         {}", config.config_path.display());
            println!("Sessions file:  {}", sessions_path.display());
            println!();
            println!("Model:          {}", config.default_model);
            println!("Temperature:    {}", config.temperature);
            println!("Top k:          {}", config.chat.top_k);
            println!(
                "Prompt history: {}",
                if config.chat.max_prompt_history == 0 {
                    "all messages".to_string()
                } else {
                    format!("last {} messages", config.chat.max_prompt_history)
                }
            );
            println!();
            match open_session_store(&sessions_path).await {
                Ok(store) => println!("Sessions:       {}", store.len()),
                Err(e) => println!("Sessions:       unreadable ({e})"),
            }
            Ok(())
        }
    }
}

fn render_url_check(urls: &[String]) -> String {
    let mut out = String::new();
    for url in urls {
        let normalized = normalize_url(url);
        let verdict = if is_valid_url(&normalized) {
            "valid"
        } else {
            "invalid"
        };
        out.push_str(&format!("{url} -> {normalized} ({verdict})\n"));
    }
    out
}
