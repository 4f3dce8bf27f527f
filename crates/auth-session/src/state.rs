//! Public session state and the reducer that drives it.
//!
//! Every change to [`SessionState`] is expressed as a [`SessionAction`] and
//! applied by [`reduce`], a pure function of the previous state plus the
//! action payload.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Subscription status that grants access regardless of trial dates.
const PAID_SUBSCRIPTION_STATUSES: &[&str] = &["active", "paid"];

/// Profile record returned by the backend.
///
/// Fields the client does not interpret are kept in `extra` so that the
/// cached copy round-trips whatever the backend sent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trial_ends_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscription_status: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl User {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            email: None,
            name: None,
            role: None,
            trial_ends_at: None,
            subscription_status: None,
            extra: Map::new(),
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn with_trial_ends_at(mut self, ends_at: DateTime<Utc>) -> Self {
        self.trial_ends_at = Some(ends_at);
        self
    }

    pub fn with_subscription_status(mut self, status: impl Into<String>) -> Self {
        self.subscription_status = Some(status.into());
        self
    }

    /// Name to show in prompts: name, then email, then id.
    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .or(self.email.as_deref())
            .unwrap_or(&self.id)
    }

    pub fn has_paid_subscription(&self) -> bool {
        self.subscription_status
            .as_deref()
            .map(|status| {
                PAID_SUBSCRIPTION_STATUSES
                    .iter()
                    .any(|paid| status.eq_ignore_ascii_case(paid))
            })
            .unwrap_or(false)
    }

    pub fn trial_status_at(&self, now: DateTime<Utc>) -> TrialStatus {
        match self.trial_ends_at {
            None => TrialStatus::NotOnTrial,
            Some(ends_at) if ends_at > now => {
                let remaining = ends_at - now;
                // Partial days count as a full day left.
                let mut days_remaining = remaining.num_days();
                if remaining > chrono::Duration::days(days_remaining) {
                    days_remaining += 1;
                }
                TrialStatus::Active {
                    ends_at,
                    days_remaining,
                }
            }
            Some(ended_at) => TrialStatus::Expired { ended_at },
        }
    }

    /// Trial-expiry gate: a paid subscription always passes, an expired
    /// trial never does.
    pub fn has_full_access_at(&self, now: DateTime<Utc>) -> bool {
        self.has_paid_subscription() || !self.trial_status_at(now).is_expired()
    }
}

/// Trial standing derived from [`User::trial_ends_at`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TrialStatus {
    NotOnTrial,
    Active {
        ends_at: DateTime<Utc>,
        days_remaining: i64,
    },
    Expired {
        ended_at: DateTime<Utc>,
    },
}

impl TrialStatus {
    pub fn is_expired(&self) -> bool {
        matches!(self, TrialStatus::Expired { .. })
    }
}

/// Current authentication state as seen by UI consumers.
///
/// Invariant: `is_authenticated` implies `user` and `session_expiry` are set.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
    pub is_authenticated: bool,
    pub is_loading: bool,
    pub user: Option<User>,
    pub error: Option<String>,
    pub session_expiry: Option<DateTime<Utc>>,
    pub last_activity_at: Option<DateTime<Utc>>,
    pub remember_me: bool,
}

impl SessionState {
    /// Initial state with a stored remember-me preference.
    pub fn with_remember_me(remember_me: bool) -> Self {
        Self {
            remember_me,
            ..Self::default()
        }
    }

    /// Seconds until expiry; negative once expired.
    pub fn expires_in_secs(&self, now: DateTime<Utc>) -> Option<i64> {
        self.session_expiry.map(|expiry| (expiry - now).num_seconds())
    }

    pub fn trial_status_at(&self, now: DateTime<Utc>) -> TrialStatus {
        self.user
            .as_ref()
            .map(|user| user.trial_status_at(now))
            .unwrap_or(TrialStatus::NotOnTrial)
    }

    pub fn has_full_access_at(&self, now: DateTime<Utc>) -> bool {
        self.is_authenticated
            && self
                .user
                .as_ref()
                .map(|user| user.has_full_access_at(now))
                .unwrap_or(false)
    }
}

/// State change events applied by [`reduce`].
#[derive(Debug, Clone, PartialEq)]
pub enum SessionAction {
    /// A backend call started; clears any previous error.
    LoginStarted,
    /// A backend call started; everything else is left as is.
    LoadingStarted,
    Authenticated {
        user: User,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    },
    /// Token renewed. `user` replaces the cached profile when present.
    Refreshed {
        user: Option<User>,
        expires_at: DateTime<Utc>,
    },
    /// Error-annotated anonymous state.
    Failed { message: String },
    /// Back to initial state, keeping `remember_me`.
    SignedOut,
    RememberMeChanged(bool),
    ErrorChanged(Option<String>),
    ActivityRecorded(DateTime<Utc>),
}

/// Apply `action` to `state`.
pub fn reduce(state: SessionState, action: &SessionAction) -> SessionState {
    match action {
        SessionAction::LoginStarted => SessionState {
            is_loading: true,
            error: None,
            ..state
        },
        SessionAction::LoadingStarted => SessionState {
            is_loading: true,
            ..state
        },
        SessionAction::Authenticated {
            user,
            expires_at,
            now,
        } => SessionState {
            is_authenticated: true,
            is_loading: false,
            user: Some(user.clone()),
            error: None,
            session_expiry: Some(*expires_at),
            last_activity_at: Some(*now),
            remember_me: state.remember_me,
        },
        SessionAction::Refreshed { user, expires_at } => {
            let user = user.clone().or(state.user);
            match user {
                Some(user) => SessionState {
                    is_authenticated: true,
                    is_loading: false,
                    user: Some(user),
                    error: None,
                    session_expiry: Some(*expires_at),
                    ..state
                },
                // Nothing to be authenticated as
                None => SessionState {
                    is_loading: false,
                    ..SessionState::with_remember_me(state.remember_me)
                },
            }
        }
        SessionAction::Failed { message } => SessionState {
            error: Some(message.clone()),
            ..SessionState::with_remember_me(state.remember_me)
        },
        SessionAction::SignedOut => SessionState::with_remember_me(state.remember_me),
        SessionAction::RememberMeChanged(remember_me) => SessionState {
            remember_me: *remember_me,
            ..state
        },
        SessionAction::ErrorChanged(error) => SessionState {
            error: error.clone(),
            ..state
        },
        SessionAction::ActivityRecorded(at) if state.is_authenticated => SessionState {
            last_activity_at: Some(*at),
            ..state
        },
        SessionAction::ActivityRecorded(_) => state,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn signed_in(now: DateTime<Utc>) -> SessionState {
        reduce(
            SessionState::with_remember_me(true),
            &SessionAction::Authenticated {
                user: User::new("u1").with_email("a@b.com"),
                expires_at: now + Duration::hours(1),
                now,
            },
        )
    }

    fn holds_invariant(state: &SessionState) -> bool {
        !state.is_authenticated || (state.user.is_some() && state.session_expiry.is_some())
    }

    #[test]
    fn test_user_parses_known_and_unknown_fields() {
        let raw = r#"{
            "id": "u1",
            "email": "a@b.com",
            "trialEndsAt": "2026-05-01T00:00:00Z",
            "subscriptionStatus": "trialing",
            "tenantId": "acme"
        }"#;
        let user: User = serde_json::from_str(raw).unwrap();
        assert_eq!(user.id, "u1");
        assert_eq!(user.subscription_status.as_deref(), Some("trialing"));
        assert!(user.trial_ends_at.is_some());
        assert_eq!(user.extra["tenantId"], "acme");

        let back = serde_json::to_value(&user).unwrap();
        assert_eq!(back["tenantId"], "acme");
        assert_eq!(back["trialEndsAt"], "2026-05-01T00:00:00Z");
        assert!(back.get("name").is_none());
    }

    #[test]
    fn test_display_name_falls_back() {
        let mut user = User::new("u1");
        assert_eq!(user.display_name(), "u1");
        user.email = Some("a@b.com".to_string());
        assert_eq!(user.display_name(), "a@b.com");
        user.name = Some("Ada".to_string());
        assert_eq!(user.display_name(), "Ada");
    }

    #[test]
    fn test_trial_status() {
        let now = Utc::now();
        assert_eq!(User::new("u").trial_status_at(now), TrialStatus::NotOnTrial);

        let ends_at = now + Duration::hours(36);
        let active = User::new("u").with_trial_ends_at(ends_at);
        assert_eq!(
            active.trial_status_at(now),
            TrialStatus::Active {
                ends_at,
                days_remaining: 2
            }
        );
        assert!(active.has_full_access_at(now));

        let ended_at = now - Duration::minutes(1);
        let expired = User::new("u").with_trial_ends_at(ended_at);
        assert_eq!(expired.trial_status_at(now), TrialStatus::Expired { ended_at });
        assert!(!expired.has_full_access_at(now));
    }

    #[test]
    fn test_paid_subscription_overrides_expired_trial() {
        let now = Utc::now();
        let user = User::new("u")
            .with_trial_ends_at(now - Duration::days(3))
            .with_subscription_status("Active");
        assert!(user.trial_status_at(now).is_expired());
        assert!(user.has_full_access_at(now));
    }

    #[test]
    fn test_anonymous_state_has_no_access() {
        let now = Utc::now();
        assert!(!SessionState::default().has_full_access_at(now));
        assert!(signed_in(now).has_full_access_at(now));
    }

    #[test]
    fn test_authenticated_sets_user_expiry_and_clears_error() {
        let now = Utc::now();
        let loading = reduce(
            SessionState {
                error: Some("old".to_string()),
                ..SessionState::default()
            },
            &SessionAction::LoginStarted,
        );
        assert!(loading.is_loading);
        assert!(loading.error.is_none());

        let state = signed_in(now);
        assert!(state.is_authenticated);
        assert!(!state.is_loading);
        assert_eq!(state.session_expiry, Some(now + Duration::hours(1)));
        assert_eq!(state.last_activity_at, Some(now));
        assert!(state.remember_me);
        assert_eq!(state.expires_in_secs(now), Some(3600));
    }

    #[test]
    fn test_refreshed_keeps_user_when_none_given() {
        let now = Utc::now();
        let new_expiry = now + Duration::hours(2);
        let state = reduce(
            signed_in(now),
            &SessionAction::Refreshed {
                user: None,
                expires_at: new_expiry,
            },
        );
        assert!(state.is_authenticated);
        assert_eq!(state.user.as_ref().map(|u| u.id.as_str()), Some("u1"));
        assert_eq!(state.session_expiry, Some(new_expiry));
    }

    #[test]
    fn test_refreshed_without_any_user_stays_anonymous() {
        let state = reduce(
            SessionState::default(),
            &SessionAction::Refreshed {
                user: None,
                expires_at: Utc::now(),
            },
        );
        assert!(!state.is_authenticated);
        assert!(state.session_expiry.is_none());
        assert!(holds_invariant(&state));
    }

    #[test]
    fn test_failed_is_anonymous_with_error() {
        let state = reduce(
            signed_in(Utc::now()),
            &SessionAction::Failed {
                message: "Your session has expired.".to_string(),
            },
        );
        assert!(!state.is_authenticated);
        assert!(state.user.is_none());
        assert!(state.session_expiry.is_none());
        assert_eq!(state.error.as_deref(), Some("Your session has expired."));
        assert!(state.remember_me);
    }

    #[test]
    fn test_signed_out_keeps_remember_me_only() {
        let state = reduce(signed_in(Utc::now()), &SessionAction::SignedOut);
        assert_eq!(state, SessionState::with_remember_me(true));
    }

    #[test]
    fn test_activity_only_recorded_when_authenticated() {
        let now = Utc::now();
        let later = now + Duration::minutes(5);

        let anonymous = reduce(SessionState::default(), &SessionAction::ActivityRecorded(later));
        assert!(anonymous.last_activity_at.is_none());

        let state = reduce(signed_in(now), &SessionAction::ActivityRecorded(later));
        assert_eq!(state.last_activity_at, Some(later));
    }

    #[test]
    fn test_setters() {
        let state = reduce(SessionState::default(), &SessionAction::RememberMeChanged(true));
        assert!(state.remember_me);
        let state = reduce(state, &SessionAction::ErrorChanged(Some("x".to_string())));
        assert_eq!(state.error.as_deref(), Some("x"));
        let state = reduce(state, &SessionAction::ErrorChanged(None));
        assert!(state.error.is_none());
        assert!(state.remember_me);
    }

    #[test]
    fn test_invariant_holds_across_action_sequence() {
        let now = Utc::now();
        let actions = [
            SessionAction::LoadingStarted,
            SessionAction::Authenticated {
                user: User::new("u1"),
                expires_at: now + Duration::minutes(15),
                now,
            },
            SessionAction::ActivityRecorded(now),
            SessionAction::Refreshed {
                user: Some(User::new("u1")),
                expires_at: now + Duration::minutes(30),
            },
            SessionAction::ErrorChanged(Some("transient".to_string())),
            SessionAction::Failed {
                message: "expired".to_string(),
            },
            SessionAction::Refreshed {
                user: None,
                expires_at: now,
            },
            SessionAction::SignedOut,
        ];

        let mut state = SessionState::default();
        for action in &actions {
            state = reduce(state, action);
            assert!(holds_invariant(&state), "broken after {:?}", action);
        }
    }

    #[test]
    fn test_state_serializes_camel_case() {
        let json = serde_json::to_value(signed_in(Utc::now())).unwrap();
        assert_eq!(json["isAuthenticated"], true);
        assert_eq!(json["rememberMe"], true);
        assert_eq!(json["user"]["email"], "a@b.com");
        assert!(json.get("sessionExpiry").is_some());
    }
}
