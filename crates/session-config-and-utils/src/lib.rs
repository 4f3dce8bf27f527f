//! Core types, configuration, and utilities for the LearnHub session client.

mod config;
mod error;
mod logging;
mod paths;

pub use config::{
    Config, DEFAULT_API_BASE_URL, DEFAULT_DURABLE_THRESHOLD_HOURS,
    DEFAULT_FALLBACK_SESSION_LIFETIME_SECS, DEFAULT_LOG_LEVEL, DEFAULT_REFRESH_LEAD_SECS,
    DEFAULT_REQUEST_TIMEOUT_SECS, DEFAULT_SITE_ORIGIN,
};
pub use error::{CoreError, CoreResult};
pub use logging::{init_logging, init_logging_for_service, parse_level};
pub use paths::Paths;
