//! Interactive shell: one process plays the part of one browser tab.

use crate::app::describe;
use auth_session::{Credentials, SessionStore, TrialStatus};
use std::io::Write;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;

const HELP: &str = "\
Commands:
  login <email> <password> [--remember]   sign in
  logout                                  sign out and clear stored session
  refresh                                 renew the session now
  status                                  show the current session
  remember on|off                         set the remember-me preference
  activity                                record user activity
  trial                                   show trial standing
  help                                    show this help
  quit                                    exit";

#[derive(Debug, PartialEq, Eq)]
pub enum Command {
    Login {
        email: String,
        password: String,
        remember_me: bool,
    },
    Logout,
    Refresh,
    Status,
    Remember(bool),
    Activity,
    Trial,
    Help,
    Quit,
    Empty,
}

/// Parse one input line.
pub fn parse_command(line: &str) -> Result<Command, String> {
    let mut words = line.split_whitespace();
    let Some(name) = words.next() else {
        return Ok(Command::Empty);
    };
    let args: Vec<&str> = words.collect();

    match (name.to_ascii_lowercase().as_str(), args.as_slice()) {
        ("login", [email, password]) => Ok(Command::Login {
            email: email.to_string(),
            password: password.to_string(),
            remember_me: false,
        }),
        ("login", [email, password, "--remember"]) => Ok(Command::Login {
            email: email.to_string(),
            password: password.to_string(),
            remember_me: true,
        }),
        ("login", _) => Err("usage: login <email> <password> [--remember]".to_string()),
        ("logout", []) => Ok(Command::Logout),
        ("refresh", []) => Ok(Command::Refresh),
        ("status", []) => Ok(Command::Status),
        ("remember", ["on"]) => Ok(Command::Remember(true)),
        ("remember", ["off"]) => Ok(Command::Remember(false)),
        ("remember", _) => Err("usage: remember on|off".to_string()),
        ("activity", []) => Ok(Command::Activity),
        ("trial", []) => Ok(Command::Trial),
        ("help", _) | ("?", _) => Ok(Command::Help),
        ("quit", []) | ("exit", []) => Ok(Command::Quit),
        (other, _) => Err(format!("unknown command '{}', try 'help'", other)),
    }
}

fn describe_trial(status: &TrialStatus, full_access: bool) -> String {
    let standing = match status {
        TrialStatus::NotOnTrial => "Not on a trial".to_string(),
        TrialStatus::Active {
            ends_at,
            days_remaining,
        } => format!(
            "Trial active, {} day(s) left (ends {})",
            days_remaining,
            ends_at.to_rfc3339()
        ),
        TrialStatus::Expired { ended_at } => {
            format!("Trial expired on {}", ended_at.to_rfc3339())
        }
    };
    let access = if full_access { "full access" } else { "limited access" };
    format!("{}; {}", standing, access)
}

fn prompt() {
    print!("learnhub> ");
    let _ = std::io::stdout().flush();
}

/// Run a command against the store. Returns false when the shell should exit.
async fn execute(store: &SessionStore, command: Command) -> bool {
    match command {
        Command::Login {
            email,
            password,
            remember_me,
        } => {
            let outcome = store
                .login(&Credentials::new(email, password, remember_me))
                .await;
            if outcome.success {
                println!("{}", describe(&store.snapshot()));
            } else if !outcome.field_errors.is_empty() {
                for error in &outcome.field_errors {
                    println!("  {}", error);
                }
            } else if let Some(error) = outcome.error {
                println!("{}", error);
            }
        }
        Command::Logout => {
            store.logout().await;
            println!("{}", describe(&store.snapshot()));
        }
        Command::Refresh => {
            let renewed = store.refresh_session().await;
            if !renewed {
                println!("Refresh did not renew the session");
            }
            println!("{}", describe(&store.snapshot()));
        }
        Command::Status => println!("{}", describe(&store.snapshot())),
        Command::Remember(remember_me) => {
            store.set_remember_me(remember_me);
            println!("Remember me {}", if remember_me { "on" } else { "off" });
        }
        Command::Activity => {
            store.record_activity();
            match store.state().last_activity_at {
                Some(at) => println!("Activity recorded at {}", at.to_rfc3339()),
                None => println!("Not signed in"),
            }
        }
        Command::Trial => {
            println!(
                "{}",
                describe_trial(&store.trial_status(), store.has_full_access())
            );
        }
        Command::Help => println!("{}", HELP),
        Command::Quit => return false,
        Command::Empty => {}
    }
    true
}

/// Bootstrap, then serve commands from stdin until `quit`, EOF or Ctrl-C.
pub async fn run_shell(store: Arc<SessionStore>) -> std::io::Result<()> {
    let snapshot = store.bootstrap().await;
    println!("{}", describe(&snapshot));
    println!("Type 'help' for commands.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        prompt();
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                match parse_command(&line) {
                    Ok(command) => {
                        if !execute(&store, command).await {
                            break;
                        }
                    }
                    Err(message) => println!("{}", message),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                println!();
                break;
            }
        }
    }

    store.shutdown();
    info!("Shell exited");
    Ok(())
}
