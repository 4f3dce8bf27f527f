//! Persisted session metadata.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Cached record of the current session.
///
/// Serialized as `{ sessionId, issuedAt, expiresAt, deviceId?, ipAddress?,
/// userAgent?, location? }` with ISO 8601 timestamps. This mirror is a
/// cache: the backend's view of the session is authoritative.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionMetadata {
    pub session_id: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

impl SessionMetadata {
    pub fn new(
        session_id: impl Into<String>,
        issued_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            issued_at,
            expires_at,
            device_id: None,
            ip_address: None,
            user_agent: None,
            location: None,
        }
    }

    pub fn with_device_id(mut self, device_id: Option<String>) -> Self {
        self.device_id = device_id;
        self
    }

    pub fn with_user_agent(mut self, user_agent: Option<String>) -> Self {
        self.user_agent = user_agent;
        self
    }

    /// Copy of this record for a renewed token: new id (if the backend
    /// rotated it) and timestamps, same device details.
    pub fn renewed(
        &self,
        session_id: Option<String>,
        issued_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            session_id: session_id.unwrap_or_else(|| self.session_id.clone()),
            issued_at,
            expires_at,
            ..self.clone()
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// Remaining lifetime; negative once expired.
    pub fn remaining_at(&self, now: DateTime<Utc>) -> Duration {
        self.expires_at - now
    }
}
