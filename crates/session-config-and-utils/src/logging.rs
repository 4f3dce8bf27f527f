//! Logging initialization for the session client.
//!
//! Thin wrapper over the observability crate: structured JSONL to
//! `<base_dir>/logs/client.jsonl` plus a compact stderr stream.

use crate::Paths;

/// Service name used when the caller does not pick one.
const DEFAULT_SERVICE_NAME: &str = "session-client";

/// Initialize the logging system with the default service name.
///
/// `RUST_LOG` takes precedence over `level`.
///
/// ```ignore
/// init_logging("info", &paths);
/// tracing::info!("client started");
/// ```
pub fn init_logging(level: &str, paths: &Paths) {
    init_logging_for_service(DEFAULT_SERVICE_NAME, level, paths);
}

/// Initialize logging with a custom service name.
pub fn init_logging_for_service(service_name: &str, level: &str, paths: &Paths) {
    observability::init_with_config(observability::LogConfig {
        service_name: service_name.into(),
        default_level: parse_level(level).to_string().to_ascii_lowercase(),
        log_path: Some(paths.log_file()),
        also_stderr: std::env::var("LEARNHUB_LOG_STDERR")
            .map(|v| v != "0" && !v.eq_ignore_ascii_case("false"))
            .unwrap_or(false),
    });
}

/// Parse a log level string into a tracing Level. Unknown values map to INFO.
pub fn parse_level(level: &str) -> tracing::Level {
    match level.to_lowercase().as_str() {
        "trace" => tracing::Level::TRACE,
        "debug" => tracing::Level::DEBUG,
        "info" => tracing::Level::INFO,
        "warn" | "warning" => tracing::Level::WARN,
        "error" => tracing::Level::ERROR,
        _ => tracing::Level::INFO,
    }
}
