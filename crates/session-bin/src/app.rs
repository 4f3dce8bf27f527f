//! Store wiring and one-shot commands.

use auth_session::{HttpAuthBackend, SessionConfig, SessionSnapshot, SessionStore};
use chrono::Utc;
use session_config_and_utils::{Config, Paths};
use session_storage::{FileStorage, MemoryStorage, SessionPersistence};
use std::sync::Arc;
use tracing::{debug, info};

/// Build a store over the configured backend.
///
/// The durable tier is a file under the base directory; the session tier
/// lives in memory and ends with the process.
pub fn build_store(
    config: &Config,
    paths: &Paths,
) -> Result<Arc<SessionStore>, Box<dyn std::error::Error>> {
    paths.ensure_dirs()?;

    let durable = FileStorage::open(paths.durable_storage_file());
    let persistence = SessionPersistence::new(Box::new(durable), Box::new(MemoryStorage::new()))
        .with_durable_threshold(chrono::Duration::hours(config.durable_threshold_hours));
    let backend = HttpAuthBackend::new(config)?;
    info!(api_base_url = %backend.base_url(), "Session client configured");

    let store = SessionStore::new(
        Arc::new(backend),
        persistence,
        SessionConfig::from_config(config),
    );
    store.set_state_callback(Box::new(|snapshot: &SessionSnapshot| {
        debug!(
            phase = %snapshot.phase,
            authenticated = snapshot.state.is_authenticated,
            loading = snapshot.state.is_loading,
            "Session state changed"
        );
    }));
    Ok(store)
}

/// One-line human summary of a snapshot.
pub fn describe(snapshot: &SessionSnapshot) -> String {
    let state = &snapshot.state;
    let mut line = match (&state.user, state.is_authenticated) {
        (Some(user), true) => {
            let expires = state
                .expires_in_secs(Utc::now())
                .map(|secs| format!(", expires in {}s", secs))
                .unwrap_or_default();
            format!("Signed in as {}{}", user.display_name(), expires)
        }
        _ => "Not signed in".to_string(),
    };

    if snapshot.phase.is_in_flight() {
        line.push_str(&format!(" ({})", snapshot.phase));
    }

    if let Some(next) = snapshot.next_refresh_at {
        line.push_str(&format!(", next refresh at {}", next.to_rfc3339()));
    }
    if state.remember_me {
        line.push_str(" [remember me]");
    }
    if let Some(error) = &state.error {
        line.push_str(&format!("\n  {}", error));
    }
    line
}

pub async fn print_status(store: &SessionStore) -> Result<(), Box<dyn std::error::Error>> {
    let snapshot = store.bootstrap().await;
    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    store.shutdown();
    Ok(())
}

pub async fn logout(store: &SessionStore) {
    store.logout().await;
    println!("{}", describe(&store.snapshot()));
    store.shutdown();
}
