//! Storage key constants.

/// Fixed keys used by the session client.
pub struct StorageKeys;

impl StorageKeys {
    /// Session metadata (JSON)
    pub const SESSION_METADATA: &'static str = "learnhub.session.metadata";

    /// Remember-me preference ("true" / "false")
    pub const REMEMBER_ME: &'static str = "learnhub.session.remember_me";

    /// Last known user profile (JSON), stored next to the metadata
    pub const CACHED_USER: &'static str = "learnhub.session.user";

    /// Persistent cookies of the backend session (cookie_store JSON)
    pub const SESSION_COOKIES: &'static str = "learnhub.session.cookies";

    /// Per-installation device identifier
    pub const DEVICE_ID: &'static str = "learnhub.device_id";
}
