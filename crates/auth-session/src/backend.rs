//! Backend seam: the session authority the store coordinates with.

use crate::{AuthResult, User};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Upper bound on a backend-reported session lifetime.
pub const MAX_SESSION_LIFETIME_DAYS: i64 = 400;

fn max_session_lifetime() -> Duration {
    Duration::days(MAX_SESSION_LIFETIME_DAYS)
}

/// Body of `POST /auth/login`.
#[derive(Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
    pub remember_me: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
}

impl fmt::Debug for LoginRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginRequest")
            .field("email", &self.email)
            .field("password", &"[REDACTED]")
            .field("remember_me", &self.remember_me)
            .field("device_id", &self.device_id)
            .finish()
    }
}

/// One entry of the `errors` array. The backend sends either bare strings
/// or objects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ApiError {
    Message(String),
    Detailed {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        field: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        code: Option<String>,
    },
}

impl ApiError {
    pub fn message(&self) -> &str {
        match self {
            ApiError::Message(message) => message,
            ApiError::Detailed { message, .. } => message,
        }
    }
}

/// Response shape shared by login, refresh and session check.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub user: Option<User>,
    #[serde(default)]
    pub access_token: Option<String>,
    /// Session lifetime in seconds.
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub errors: Option<Vec<ApiError>>,
}

impl AuthResponse {
    /// Successful response carrying `user`.
    pub fn authenticated(user: User, expires_in: Option<i64>, session_id: Option<&str>) -> Self {
        Self {
            success: true,
            user: Some(user),
            expires_in,
            session_id: session_id.map(str::to_string),
            ..Self::default()
        }
    }

    /// Failed response with the given error messages.
    pub fn rejected<I, S>(messages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            success: false,
            errors: Some(
                messages
                    .into_iter()
                    .map(|message| ApiError::Message(message.into()))
                    .collect(),
            ),
            ..Self::default()
        }
    }

    /// First non-blank server-reported error message.
    pub fn first_error(&self) -> Option<&str> {
        self.errors
            .as_deref()?
            .iter()
            .map(|error| error.message().trim())
            .find(|message| !message.is_empty())
    }

    /// Lifetime reported by the backend, or `fallback` when absent or not
    /// positive. Capped at [`MAX_SESSION_LIFETIME_DAYS`].
    pub fn lifetime_or(&self, fallback: Duration) -> Duration {
        let max = max_session_lifetime();
        match self.expires_in {
            Some(secs) if secs > 0 => Duration::try_seconds(secs).map_or(max, |d| d.min(max)),
            _ => fallback.min(max),
        }
    }

    /// Absolute expiry: `now + expiresIn`, saturating at the latest
    /// representable instant.
    pub fn expires_at(&self, now: DateTime<Utc>, fallback: Duration) -> DateTime<Utc> {
        now.checked_add_signed(self.lifetime_or(fallback))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}

/// Session authority.
///
/// Rejections the backend explains in its body (`success: false`) come back
/// as `Ok`; `Err` is reserved for transport failures and responses that
/// cannot be read.
#[async_trait]
pub trait AuthBackend: Send + Sync {
    /// `POST /auth/login`.
    async fn login(&self, request: &LoginRequest) -> AuthResult<AuthResponse>;

    /// `POST /auth/refresh`, authenticated by the session cookie.
    async fn refresh(&self) -> AuthResult<AuthResponse>;

    /// `GET /auth/session`. `None` when the backend holds no active session.
    async fn check_session(&self) -> AuthResult<Option<AuthResponse>>;

    /// `POST /auth/logout`.
    async fn logout(&self) -> AuthResult<()>;

    /// Serialized persistent cookies, for carrying the session across
    /// restarts. `None` when the backend keeps no cookies.
    fn export_cookies(&self) -> Option<String> {
        None
    }

    /// Load cookies previously returned by [`export_cookies`](Self::export_cookies).
    fn import_cookies(&self, _jar: &str) {}

    /// Forget every session cookie.
    fn clear_cookies(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_login_request_wire_format() {
        let request = LoginRequest {
            email: "a@b.com".to_string(),
            password: "Valid1!".to_string(),
            remember_me: true,
            device_id: None,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "email": "a@b.com", "password": "Valid1!", "rememberMe": true })
        );
        assert!(!format!("{:?}", request).contains("Valid1!"));
    }

    #[test]
    fn test_parses_success_response() {
        let raw = r#"{
            "success": true,
            "user": { "id": "u1", "email": "a@b.com" },
            "accessToken": "tok",
            "expiresIn": 3600,
            "sessionId": "s1"
        }"#;
        let response: AuthResponse = serde_json::from_str(raw).unwrap();
        assert!(response.success);
        assert_eq!(response.user.as_ref().map(|u| u.id.as_str()), Some("u1"));
        assert_eq!(response.expires_in, Some(3600));
        assert_eq!(response.session_id.as_deref(), Some("s1"));
        assert!(response.first_error().is_none());
    }

    #[test]
    fn test_parses_mixed_error_shapes() {
        let raw = r#"{
            "success": false,
            "errors": [
                { "message": "  ", "code": "blank" },
                { "message": "Invalid email or password", "field": "password" },
                "Account locked"
            ]
        }"#;
        let response: AuthResponse = serde_json::from_str(raw).unwrap();
        assert!(!response.success);
        assert_eq!(response.first_error(), Some("Invalid email or password"));

        let errors = response.errors.unwrap();
        assert_eq!(errors[2], ApiError::Message("Account locked".to_string()));
    }

    #[test]
    fn test_null_and_missing_fields() {
        let response: AuthResponse =
            serde_json::from_str(r#"{ "success": true, "errors": null, "user": null }"#).unwrap();
        assert!(response.user.is_none());
        assert!(response.first_error().is_none());

        let response: AuthResponse = serde_json::from_str("{}").unwrap();
        assert!(!response.success);
    }

    #[test]
    fn test_expiry_uses_fallback_when_missing() {
        let now = Utc::now();
        let fallback = Duration::minutes(15);

        let with = AuthResponse::authenticated(User::new("u"), Some(3600), None);
        assert_eq!(with.expires_at(now, fallback), now + Duration::seconds(3600));

        let without = AuthResponse::authenticated(User::new("u"), None, None);
        assert_eq!(without.expires_at(now, fallback), now + fallback);

        let zero = AuthResponse::authenticated(User::new("u"), Some(0), None);
        assert_eq!(zero.lifetime_or(fallback), fallback);
    }

    #[test]
    fn test_huge_expires_in_is_capped() {
        let response: AuthResponse = serde_json::from_str(
            r#"{"success":true,"user":{"id":"u1"},"expiresIn":9223372036854775807}"#,
        )
        .unwrap();
        let now = Utc::now();
        let fallback = Duration::minutes(15);

        assert_eq!(response.lifetime_or(fallback), Duration::days(MAX_SESSION_LIFETIME_DAYS));
        assert_eq!(
            response.expires_at(now, fallback),
            now + Duration::days(MAX_SESSION_LIFETIME_DAYS)
        );

        let just_over = AuthResponse::authenticated(User::new("u"), Some(i64::MAX / 1000 + 1), None);
        assert_eq!(just_over.lifetime_or(fallback), Duration::days(MAX_SESSION_LIFETIME_DAYS));
    }

    #[test]
    fn test_expiry_saturates_near_the_end_of_time() {
        let response = AuthResponse::authenticated(User::new("u"), Some(3600), None);
        let late = DateTime::<Utc>::MAX_UTC - Duration::seconds(10);
        assert_eq!(
            response.expires_at(late, Duration::minutes(15)),
            DateTime::<Utc>::MAX_UTC
        );
    }

    #[test]
    fn test_rejected_helper() {
        let response = AuthResponse::rejected(["Bad password"]);
        assert!(!response.success);
        assert_eq!(response.first_error(), Some("Bad password"));
    }
}
