//! Persistence adapter for session metadata.
//!
//! Picks the storage tier from the session's remaining lifetime, reads back
//! whichever tier holds a record, and heals itself when a stored record
//! cannot be parsed.

use crate::{KeyValueStorage, SessionMetadata, StorageKeys, StorageResult, StorageTier};
use chrono::{DateTime, Duration, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info, warn};

/// Sessions with more remaining lifetime than this are stored durably.
pub const DEFAULT_DURABLE_THRESHOLD_HOURS: i64 = 24;

const TIERS: [StorageTier; 2] = [StorageTier::Durable, StorageTier::Session];

const SESSION_KEYS: [&str; 3] = [
    StorageKeys::SESSION_METADATA,
    StorageKeys::CACHED_USER,
    StorageKeys::SESSION_COOKIES,
];

/// Durable mirror of session metadata across restarts.
pub struct SessionPersistence {
    durable: Box<dyn KeyValueStorage>,
    session: Box<dyn KeyValueStorage>,
    durable_threshold: Duration,
}

impl SessionPersistence {
    /// Create an adapter over a durable and a session-scoped store.
    pub fn new(durable: Box<dyn KeyValueStorage>, session: Box<dyn KeyValueStorage>) -> Self {
        Self {
            durable,
            session,
            durable_threshold: Duration::hours(DEFAULT_DURABLE_THRESHOLD_HOURS),
        }
    }

    /// Override the lifetime above which metadata goes to durable storage.
    pub fn with_durable_threshold(mut self, threshold: Duration) -> Self {
        self.durable_threshold = threshold;
        self
    }

    pub fn durable_threshold(&self) -> Duration {
        self.durable_threshold
    }

    fn store(&self, tier: StorageTier) -> &dyn KeyValueStorage {
        match tier {
            StorageTier::Durable => self.durable.as_ref(),
            StorageTier::Session => self.session.as_ref(),
        }
    }

    fn other(tier: StorageTier) -> StorageTier {
        match tier {
            StorageTier::Durable => StorageTier::Session,
            StorageTier::Session => StorageTier::Durable,
        }
    }

    /// Tier a record belongs in: durable only when its remaining lifetime
    /// strictly exceeds the threshold.
    pub fn tier_for(&self, meta: &SessionMetadata, now: DateTime<Utc>) -> StorageTier {
        if meta.remaining_at(now) > self.durable_threshold {
            StorageTier::Durable
        } else {
            StorageTier::Session
        }
    }

    /// Persist metadata, returning the tier it was written to.
    pub fn persist(&self, meta: &SessionMetadata) -> StorageResult<StorageTier> {
        self.persist_at(meta, Utc::now())
    }

    /// Persist metadata as of `now`. The copy in the other tier (and a
    /// cached user profile living there) is moved so only one tier ever
    /// holds the session.
    pub fn persist_at(
        &self,
        meta: &SessionMetadata,
        now: DateTime<Utc>,
    ) -> StorageResult<StorageTier> {
        let tier = self.tier_for(meta, now);
        let other = Self::other(tier);

        self.store(tier)
            .set(StorageKeys::SESSION_METADATA, &serde_json::to_string(meta)?)?;
        self.store(other).delete(StorageKeys::SESSION_METADATA)?;

        if let Some(user) = self.store(other).get(StorageKeys::CACHED_USER)? {
            self.store(tier).set(StorageKeys::CACHED_USER, &user)?;
            self.store(other).delete(StorageKeys::CACHED_USER)?;
        }

        debug!(
            session_id = %meta.session_id,
            tier = %tier,
            expires_at = %meta.expires_at.to_rfc3339(),
            "Session metadata persisted"
        );
        Ok(tier)
    }

    /// Read the stored metadata, durable tier first.
    ///
    /// Never fails: read errors are logged and treated as absent, and an
    /// unparsable record clears both tiers before returning `None`.
    pub fn read(&self) -> Option<SessionMetadata> {
        for tier in TIERS {
            let raw = match self.store(tier).get(StorageKeys::SESSION_METADATA) {
                Ok(Some(raw)) => raw,
                Ok(None) => continue,
                Err(e) => {
                    warn!(tier = %tier, error = %e, "Failed to read session metadata");
                    continue;
                }
            };

            match serde_json::from_str::<SessionMetadata>(&raw) {
                Ok(meta) => return Some(meta),
                Err(e) => {
                    warn!(tier = %tier, error = %e, "Stored session metadata is corrupt, clearing");
                    if let Err(e) = self.clear() {
                        warn!(error = %e, "Failed to clear corrupt session metadata");
                    }
                    return None;
                }
            }
        }
        None
    }

    /// Tier currently holding session metadata, if any.
    pub fn stored_tier(&self) -> Option<StorageTier> {
        TIERS.into_iter().find(|tier| {
            self.store(*tier)
                .has(StorageKeys::SESSION_METADATA)
                .unwrap_or(false)
        })
    }

    /// Remove metadata, cached user and session cookies from both tiers.
    ///
    /// Both tiers are always cleared so a record that migrated between tiers
    /// cannot survive. The first error is reported after every delete has
    /// been attempted.
    pub fn clear(&self) -> StorageResult<()> {
        let mut first_error = None;
        for tier in TIERS {
            for key in SESSION_KEYS {
                if let Err(e) = self.store(tier).delete(key) {
                    warn!(tier = %tier, key, error = %e, "Failed to clear stored session data");
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => {
                info!("Session metadata cleared");
                Ok(())
            }
        }
    }

    /// Cache the user profile next to the metadata.
    pub fn cache_user<T: Serialize>(&self, user: &T) -> StorageResult<()> {
        let tier = self.stored_tier().unwrap_or(StorageTier::Session);
        self.store(tier)
            .set(StorageKeys::CACHED_USER, &serde_json::to_string(user)?)?;
        self.store(Self::other(tier)).delete(StorageKeys::CACHED_USER)?;
        Ok(())
    }

    /// Last cached user profile. A corrupt entry is dropped.
    pub fn cached_user<T: DeserializeOwned>(&self) -> Option<T> {
        for tier in TIERS {
            let raw = match self.store(tier).get(StorageKeys::CACHED_USER) {
                Ok(Some(raw)) => raw,
                Ok(None) => continue,
                Err(e) => {
                    warn!(tier = %tier, error = %e, "Failed to read cached user");
                    continue;
                }
            };

            match serde_json::from_str(&raw) {
                Ok(user) => return Some(user),
                Err(e) => {
                    warn!(tier = %tier, error = %e, "Cached user is corrupt, dropping it");
                    let _ = self.store(tier).delete(StorageKeys::CACHED_USER);
                }
            }
        }
        None
    }

    /// Remember-me preference. Anything but `"true"` reads as false.
    pub fn remember_me(&self) -> bool {
        match self.durable.get(StorageKeys::REMEMBER_ME) {
            Ok(value) => value.as_deref() == Some("true"),
            Err(e) => {
                warn!(error = %e, "Failed to read remember-me preference");
                false
            }
        }
    }

    pub fn set_remember_me(&self, remember_me: bool) -> StorageResult<()> {
        self.durable
            .set(StorageKeys::REMEMBER_ME, if remember_me { "true" } else { "false" })
    }

    /// Serialized cookie jar of the backend session, if one was saved.
    pub fn session_cookies(&self) -> Option<String> {
        match self.durable.get(StorageKeys::SESSION_COOKIES) {
            Ok(jar) => jar,
            Err(e) => {
                warn!(error = %e, "Failed to read session cookies");
                None
            }
        }
    }

    /// Keep the cookie jar durably so a restarted client still holds the
    /// session cookie.
    pub fn save_session_cookies(&self, jar: &str) -> StorageResult<()> {
        self.durable.set(StorageKeys::SESSION_COOKIES, jar)?;
        debug!(bytes = jar.len(), "Session cookies saved");
        Ok(())
    }

    /// Return the installation's device id, generating one on first use.
    pub fn ensure_device_id(&self) -> StorageResult<String> {
        if let Some(id) = self.durable.get(StorageKeys::DEVICE_ID)? {
            return Ok(id);
        }
        let id = uuid::Uuid::new_v4().to_string();
        self.durable.set(StorageKeys::DEVICE_ID, &id)?;
        info!(device_id = %id, "Generated device id");
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MemoryStorage, StorageError};
    use std::sync::Arc;

    /// A tier whose reads always fail.
    struct Broken;

    impl KeyValueStorage for Broken {
        fn set(&self, _key: &str, _value: &str) -> StorageResult<()> {
            Err(StorageError::Backend("unavailable".to_string()))
        }

        fn get(&self, _key: &str) -> StorageResult<Option<String>> {
            Err(StorageError::Backend("unavailable".to_string()))
        }

        fn delete(&self, _key: &str) -> StorageResult<bool> {
            Err(StorageError::Backend("unavailable".to_string()))
        }
    }

    fn create_persistence() -> (SessionPersistence, Arc<MemoryStorage>, Arc<MemoryStorage>) {
        let durable = Arc::new(MemoryStorage::new());
        let session = Arc::new(MemoryStorage::new());
        let persistence = SessionPersistence::new(
            Box::new(durable.clone()),
            Box::new(session.clone()),
        );
        (persistence, durable, session)
    }

    fn meta_expiring_in(now: DateTime<Utc>, lifetime: Duration) -> SessionMetadata {
        SessionMetadata::new("s1", now, now + lifetime).with_device_id(Some("dev-1".to_string()))
    }

    #[test]
    fn short_sessions_go_to_session_tier() {
        let (persistence, durable, session) = create_persistence();
        let now = Utc::now();

        let tier = persistence
            .persist_at(&meta_expiring_in(now, Duration::hours(1)), now)
            .unwrap();

        assert_eq!(tier, StorageTier::Session);
        assert!(session.has(StorageKeys::SESSION_METADATA).unwrap());
        assert!(!durable.has(StorageKeys::SESSION_METADATA).unwrap());
    }

    #[test]
    fn long_sessions_go_to_durable_tier() {
        let (persistence, durable, session) = create_persistence();
        let now = Utc::now();

        let tier = persistence
            .persist_at(&meta_expiring_in(now, Duration::days(30)), now)
            .unwrap();

        assert_eq!(tier, StorageTier::Durable);
        assert!(durable.has(StorageKeys::SESSION_METADATA).unwrap());
        assert!(!session.has(StorageKeys::SESSION_METADATA).unwrap());
    }

    #[test]
    fn exactly_threshold_stays_in_session_tier() {
        let (persistence, _, _) = create_persistence();
        let now = Utc::now();

        let meta = meta_expiring_in(now, Duration::hours(24));
        assert_eq!(persistence.tier_for(&meta, now), StorageTier::Session);

        let meta = meta_expiring_in(now, Duration::hours(24) + Duration::seconds(1));
        assert_eq!(persistence.tier_for(&meta, now), StorageTier::Durable);
    }

    #[test]
    fn threshold_is_configurable() {
        let (persistence, _, _) = create_persistence();
        let persistence = persistence.with_durable_threshold(Duration::minutes(30));
        let now = Utc::now();

        let meta = meta_expiring_in(now, Duration::hours(1));
        assert_eq!(persistence.tier_for(&meta, now), StorageTier::Durable);
    }

    #[test]
    fn persist_then_read_round_trips() {
        let (persistence, _, _) = create_persistence();
        let now = Utc::now();
        let meta = meta_expiring_in(now, Duration::days(2));

        persistence.persist_at(&meta, now).unwrap();

        assert_eq!(persistence.read(), Some(meta));
    }

    #[test]
    fn tier_migration_removes_old_copy_and_moves_user() {
        let (persistence, durable, session) = create_persistence();
        let now = Utc::now();

        persistence
            .persist_at(&meta_expiring_in(now, Duration::days(7)), now)
            .unwrap();
        persistence.cache_user(&serde_json::json!({ "id": "u1" })).unwrap();
        assert!(durable.has(StorageKeys::CACHED_USER).unwrap());

        persistence
            .persist_at(&meta_expiring_in(now, Duration::minutes(10)), now)
            .unwrap();

        assert!(!durable.has(StorageKeys::SESSION_METADATA).unwrap());
        assert!(!durable.has(StorageKeys::CACHED_USER).unwrap());
        assert!(session.has(StorageKeys::SESSION_METADATA).unwrap());
        assert!(session.has(StorageKeys::CACHED_USER).unwrap());
        assert_eq!(persistence.stored_tier(), Some(StorageTier::Session));
    }

    #[test]
    fn read_prefers_durable_tier() {
        let (persistence, durable, session) = create_persistence();
        let now = Utc::now();
        let durable_meta = SessionMetadata::new("durable", now, now + Duration::days(3));
        let session_meta = SessionMetadata::new("session", now, now + Duration::hours(1));

        durable
            .set(StorageKeys::SESSION_METADATA, &serde_json::to_string(&durable_meta).unwrap())
            .unwrap();
        session
            .set(StorageKeys::SESSION_METADATA, &serde_json::to_string(&session_meta).unwrap())
            .unwrap();

        assert_eq!(persistence.read().unwrap().session_id, "durable");
    }

    #[test]
    fn corrupt_metadata_self_heals() {
        let (persistence, durable, session) = create_persistence();
        session.set(StorageKeys::SESSION_METADATA, "{broken").unwrap();
        session.set(StorageKeys::CACHED_USER, r#"{"id":"u1"}"#).unwrap();
        durable.set(StorageKeys::REMEMBER_ME, "true").unwrap();

        assert!(persistence.read().is_none());

        assert!(!session.has(StorageKeys::SESSION_METADATA).unwrap());
        assert!(!session.has(StorageKeys::CACHED_USER).unwrap());
        assert!(persistence.remember_me());
    }

    #[test]
    fn clear_removes_both_tiers() {
        let (persistence, durable, session) = create_persistence();
        durable.set(StorageKeys::SESSION_METADATA, "{}").unwrap();
        session.set(StorageKeys::SESSION_METADATA, "{}").unwrap();
        session.set(StorageKeys::CACHED_USER, "{}").unwrap();

        persistence.clear().unwrap();

        assert!(!durable.has(StorageKeys::SESSION_METADATA).unwrap());
        assert!(!session.has(StorageKeys::SESSION_METADATA).unwrap());
        assert!(!session.has(StorageKeys::CACHED_USER).unwrap());
        assert!(persistence.read().is_none());
        assert!(persistence.stored_tier().is_none());
    }

    #[test]
    fn unreadable_tier_is_treated_as_absent() {
        let session = Arc::new(MemoryStorage::new());
        let persistence =
            SessionPersistence::new(Box::new(Broken), Box::new(session.clone()));
        let now = Utc::now();
        let meta = SessionMetadata::new("s1", now, now + Duration::hours(1));
        session
            .set(StorageKeys::SESSION_METADATA, &serde_json::to_string(&meta).unwrap())
            .unwrap();

        assert_eq!(persistence.read(), Some(meta));
        assert!(!persistence.remember_me());
        assert!(persistence.clear().is_err());
    }

    #[test]
    fn remember_me_round_trip() {
        let (persistence, durable, _) = create_persistence();
        assert!(!persistence.remember_me());

        persistence.set_remember_me(true).unwrap();
        assert!(persistence.remember_me());
        assert_eq!(
            durable.get(StorageKeys::REMEMBER_ME).unwrap(),
            Some("true".to_string())
        );

        persistence.set_remember_me(false).unwrap();
        assert!(!persistence.remember_me());
    }

    #[test]
    fn corrupt_cached_user_is_dropped() {
        let (persistence, _, session) = create_persistence();
        session.set(StorageKeys::CACHED_USER, "not json").unwrap();

        let user: Option<serde_json::Value> = persistence.cached_user();
        assert!(user.is_none());
        assert!(!session.has(StorageKeys::CACHED_USER).unwrap());
    }

    #[test]
    fn device_id_is_stable() {
        let (persistence, durable, _) = create_persistence();
        assert!(!durable.has(StorageKeys::DEVICE_ID).unwrap());

        let first = persistence.ensure_device_id().unwrap();
        let second = persistence.ensure_device_id().unwrap();

        assert_eq!(first, second);
        assert_eq!(durable.get(StorageKeys::DEVICE_ID).unwrap(), Some(first));
    }

    #[test]
    fn session_cookies_are_durable_until_cleared() {
        let (persistence, durable, session) = create_persistence();
        assert!(persistence.session_cookies().is_none());

        persistence.save_session_cookies(r#"[{"name":"sid"}]"#).unwrap();
        assert_eq!(
            persistence.session_cookies().as_deref(),
            Some(r#"[{"name":"sid"}]"#)
        );
        assert!(durable.has(StorageKeys::SESSION_COOKIES).unwrap());
        assert!(!session.has(StorageKeys::SESSION_COOKIES).unwrap());

        persistence.set_remember_me(true).unwrap();
        persistence.clear().unwrap();
        assert!(persistence.session_cookies().is_none());
        assert!(persistence.remember_me());
    }
}
