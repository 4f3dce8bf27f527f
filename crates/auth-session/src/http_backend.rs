//! HTTP implementation of [`AuthBackend`].
//!
//! All calls go through one `reqwest::Client` backed by a shared cookie
//! store, so the session cookie set by login is sent with refresh, session
//! check and logout. The store's persistent cookies can be exported and
//! imported as JSON to outlive the process.

use crate::backend::{AuthBackend, AuthResponse, LoginRequest};
use crate::{AuthError, AuthResult};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use reqwest_cookie_store::{CookieStore, CookieStoreMutex};
use session_config_and_utils::Config;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use tracing::{debug, warn};
use url::Url;

const LOGIN_PATH: &str = "auth/login";
const REFRESH_PATH: &str = "auth/refresh";
const SESSION_PATH: &str = "auth/session";
const LOGOUT_PATH: &str = "auth/logout";

/// User agent sent with every request and stored in session metadata.
pub const USER_AGENT: &str = concat!("learnhub-session/", env!("CARGO_PKG_VERSION"));

/// Response bodies can carry tokens; only their size and digest are logged.
fn summarize_response_body(body: &str) -> String {
    let mut hasher = DefaultHasher::new();
    body.hash(&mut hasher);
    format!("len={},digest={:016x}", body.len(), hasher.finish())
}

/// Backend client speaking the `/auth/*` JSON contract.
#[derive(Clone)]
pub struct HttpAuthBackend {
    http_client: Client,
    cookies: Arc<CookieStoreMutex>,
    base_url: Url,
}

impl HttpAuthBackend {
    /// Build a client for the configured API base URL.
    pub fn new(config: &Config) -> AuthResult<Self> {
        let base_url = config.api_base_url()?;
        let cookies = Arc::new(CookieStoreMutex::new(CookieStore::default()));
        let http_client = Client::builder()
            .cookie_provider(Arc::clone(&cookies))
            .timeout(config.request_timeout())
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self {
            http_client,
            cookies,
            base_url,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> AuthResult<Url> {
        Ok(self.base_url.join(path)?)
    }

    async fn read_auth_response(
        &self,
        response: reqwest::Response,
        operation: &'static str,
    ) -> AuthResult<AuthResponse> {
        let status = response.status();
        let body = response.text().await?;
        debug!(
            operation,
            status = status.as_u16(),
            body = %summarize_response_body(&body),
            "Auth response received"
        );
        parse_auth_response(status, &body)
    }
}

/// Interpret a login/refresh/session response.
///
/// Client errors with a readable body are rejections (`Ok` with
/// `success: false`); server errors and unreadable bodies are `Err`.
pub(crate) fn parse_auth_response(status: StatusCode, body: &str) -> AuthResult<AuthResponse> {
    if status.is_server_error() {
        return Err(AuthError::Backend {
            status: status.as_u16(),
            message: status
                .canonical_reason()
                .unwrap_or("server error")
                .to_string(),
        });
    }

    let parsed = serde_json::from_str::<AuthResponse>(body);

    if status.is_success() {
        return Ok(parsed?);
    }

    match parsed {
        Ok(mut response) => {
            response.success = false;
            Ok(response)
        }
        Err(_) if status == StatusCode::UNAUTHORIZED => {
            Err(AuthError::InvalidCredentials(status.to_string()))
        }
        Err(_) => Err(AuthError::Backend {
            status: status.as_u16(),
            message: status
                .canonical_reason()
                .unwrap_or("unexpected response")
                .to_string(),
        }),
    }
}

/// A bare 401/403 on refresh speaks about the session, not credentials.
fn refresh_error(error: AuthError) -> AuthError {
    match error {
        AuthError::InvalidCredentials(_) => AuthError::SessionExpired,
        AuthError::Backend { status: 403, message } => AuthError::SessionInvalid(message),
        other => other,
    }
}

/// `true` for statuses that mean "no active session" on `/auth/session`.
pub(crate) fn is_no_session_status(status: StatusCode) -> bool {
    status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN
}

#[async_trait]
impl AuthBackend for HttpAuthBackend {
    async fn login(&self, request: &LoginRequest) -> AuthResult<AuthResponse> {
        let url = self.endpoint(LOGIN_PATH)?;
        debug!(url = %url, email = %request.email, "Attempting login");

        let response = self.http_client.post(url).json(request).send().await?;
        self.read_auth_response(response, "login").await
    }

    async fn refresh(&self) -> AuthResult<AuthResponse> {
        let url = self.endpoint(REFRESH_PATH)?;
        debug!(url = %url, "Refreshing session");

        let response = self.http_client.post(url).send().await?;
        self.read_auth_response(response, "refresh")
            .await
            .map_err(refresh_error)
    }

    async fn check_session(&self) -> AuthResult<Option<AuthResponse>> {
        let url = self.endpoint(SESSION_PATH)?;
        debug!(url = %url, "Checking backend session");

        let response = self.http_client.get(url).send().await?;
        if is_no_session_status(response.status()) {
            return Ok(None);
        }

        let parsed = self.read_auth_response(response, "session").await?;
        Ok(parsed.success.then_some(parsed))
    }

    async fn logout(&self) -> AuthResult<()> {
        let url = self.endpoint(LOGOUT_PATH)?;
        let response = self.http_client.post(url).send().await?;

        let status = response.status();
        if status.is_success() {
            debug!(status = status.as_u16(), "Backend logout acknowledged");
            Ok(())
        } else {
            warn!(status = status.as_u16(), "Backend logout rejected");
            Err(AuthError::Backend {
                status: status.as_u16(),
                message: "logout rejected".to_string(),
            })
        }
    }

    fn export_cookies(&self) -> Option<String> {
        let Ok(store) = self.cookies.lock() else {
            warn!("Cookie store lock poisoned, not exporting cookies");
            return None;
        };
        let mut jar = Vec::new();
        if let Err(e) = cookie_store::serde::json::save(&store, &mut jar) {
            warn!("Failed to serialize cookies: {}", e);
            return None;
        }
        String::from_utf8(jar).ok()
    }

    fn import_cookies(&self, jar: &str) {
        let loaded = match cookie_store::serde::json::load(jar.as_bytes()) {
            Ok(loaded) => loaded,
            Err(e) => {
                warn!("Saved cookies are unreadable, ignoring them: {}", e);
                return;
            }
        };
        match self.cookies.lock() {
            Ok(mut store) => {
                *store = loaded;
                debug!("Session cookies restored");
            }
            Err(_) => warn!("Cookie store lock poisoned, not importing cookies"),
        }
    }

    fn clear_cookies(&self) {
        match self.cookies.lock() {
            Ok(mut store) => store.clear(),
            Err(_) => warn!("Cookie store lock poisoned, cookies not cleared"),
        }
    }
}
