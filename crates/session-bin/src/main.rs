//! LearnHub session client - interactive driver for the auth session lifecycle.

mod app;
mod shell;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use session_config_and_utils::{init_logging, Config, Paths};

/// LearnHub session command-line interface.
#[derive(Parser)]
#[command(name = "learnhub-session")]
#[command(about = "Sign in to LearnHub and keep the session alive")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Log level (trace, debug, info, warn, error). Overrides LEARNHUB_LOG_LEVEL
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// Base directory for client files (config, storage, logs). Defaults to ~/.learnhub
    #[arg(long, global = true)]
    base_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Bootstrap the session and read commands from stdin
    Shell,
    /// Bootstrap and print the session state as JSON
    Status,
    /// Log out and clear stored session data
    Logout,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let paths = match cli.base_dir {
        Some(base) => Paths::with_base_dir(base),
        None => Paths::new()?,
    };
    let config = Config::load(&paths)?;

    let log_level = cli.log_level.unwrap_or_else(|| config.log_level.clone());
    init_logging(&log_level, &paths);

    let store = app::build_store(&config, &paths)?;

    match cli.command {
        Some(Commands::Shell) | None => {
            shell::run_shell(store).await?;
        }
        Some(Commands::Status) => {
            app::print_status(&store).await?;
        }
        Some(Commands::Logout) => {
            app::logout(&store).await;
        }
    }

    Ok(())
}
