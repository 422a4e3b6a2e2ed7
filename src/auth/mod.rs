//! Request authentication.
//!
//! Every request is classified with a fixed precedence chain, first match wins:
//! 1. Setup-mode bypass (`STATUSD_ENV=test|setup`)
//! 2. API secret in the `api` query parameter
//! 3. API secret in the `Authorization` header
//! 4. Signed session token in the `statping_auth` cookie
//!
//! All queries are pure: token failures become negative answers and nothing is
//! cached between requests.

pub mod credentials;
pub mod session;

use std::sync::Arc;

use axum::extract::Query;
use axum_extra::extract::CookieJar;
use chrono::Utc;
use http::header::AUTHORIZATION;
use http::request::Parts;
use http::{HeaderMap, Request, Uri};
use serde::{Deserialize, Serialize};

use crate::config::{AuthConfig, UserConfig, SESSION_COOKIE};

pub use session::{removal_cookie, session_cookie, SessionClaims, SessionKey};

/// Error type for authentication operations
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Session token rejected: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),

    #[error("Session has expired")]
    Expired,

    #[error("Session is not valid yet")]
    NotYetValid,

    #[error("Session expires before it was issued")]
    InvalidTimeWindow,

    #[error("Invalid username or password")]
    InvalidCredentials,

    #[error("Stored password hash for user '{0}' is malformed")]
    PasswordHash(String),

    #[error("Password hashing failed: {0}")]
    Hashing(String),

    #[error("OS random source unavailable: {0}")]
    Entropy(String),
}

/// Privilege tier of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthContext {
    Unauthenticated,
    User,
    Admin,
}

impl AuthContext {
    /// Scope label used to decide which private fields an API response carries.
    pub fn scope_name(self) -> &'static str {
        match self {
            AuthContext::Unauthenticated => "",
            AuthContext::User => "user",
            AuthContext::Admin => "admin",
        }
    }
}

/// The link of the precedence chain that authenticated a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credential {
    SetupMode,
    ApiQuery,
    AuthorizationHeader,
    Session(SessionClaims),
}

/// The parts of a request the resolver looks at.
#[derive(Debug, Clone, Copy)]
pub struct AuthRequest<'a> {
    uri: &'a Uri,
    headers: &'a HeaderMap,
}

impl<'a> AuthRequest<'a> {
    pub fn new(uri: &'a Uri, headers: &'a HeaderMap) -> Self {
        Self { uri, headers }
    }
}

impl<'a, B> From<&'a Request<B>> for AuthRequest<'a> {
    fn from(request: &'a Request<B>) -> Self {
        Self::new(request.uri(), request.headers())
    }
}

impl<'a> From<&'a Parts> for AuthRequest<'a> {
    fn from(parts: &'a Parts) -> Self {
        Self::new(&parts.uri, &parts.headers)
    }
}

#[derive(Debug, Deserialize)]
struct ApiQuery {
    api: Option<String>,
}

type Check = for<'a> fn(&Authenticator, AuthRequest<'a>) -> Option<Credential>;

/// Checks that carry a privilege scope, in precedence order.
const SCOPED_CHECKS: [Check; 3] = [
    Authenticator::check_api_query,
    Authenticator::check_authorization_header,
    Authenticator::check_session,
];

/// Resolves requests to credentials and scopes.
///
/// Cheap to clone; all state is immutable and shared.
#[derive(Clone)]
pub struct Authenticator {
    inner: Arc<Inner>,
}

struct Inner {
    config: AuthConfig,
    sessions: SessionKey,
}

impl Authenticator {
    pub fn new(config: &AuthConfig, sessions: SessionKey) -> Self {
        if config.setup_mode {
            tracing::warn!("Setup mode active - authentication checks are bypassed");
        }
        Self {
            inner: Arc::new(Inner {
                config: config.clone(),
                sessions,
            }),
        }
    }

    pub fn sessions(&self) -> &SessionKey {
        &self.inner.sessions
    }

    pub fn setup_mode(&self) -> bool {
        self.inner.config.setup_mode
    }

    /// First credential of the full chain, bypass included.
    pub fn credential<'a>(&self, request: impl Into<AuthRequest<'a>>) -> Option<Credential> {
        let request = request.into();
        self.check_setup_mode(request)
            .or_else(|| self.scoped_credential(request))
    }

    /// Privilege scope of the request. The setup bypass carries no scope.
    pub fn context<'a>(&self, request: impl Into<AuthRequest<'a>>) -> AuthContext {
        match self.scoped_credential(request.into()) {
            Some(Credential::ApiQuery | Credential::AuthorizationHeader) => AuthContext::Admin,
            Some(Credential::Session(claims)) if claims.admin => AuthContext::Admin,
            Some(Credential::Session(_)) => AuthContext::User,
            _ => AuthContext::Unauthenticated,
        }
    }

    /// Read-level access (e.g. viewing a dashboard).
    pub fn is_read_authenticated<'a>(&self, request: impl Into<AuthRequest<'a>>) -> bool {
        self.credential(request).is_some()
    }

    /// Access to dashboard-mutating routes.
    pub fn is_full_authenticated<'a>(&self, request: impl Into<AuthRequest<'a>>) -> bool {
        self.credential(request).is_some()
    }

    /// `""`, `"user"` or `"admin"`.
    pub fn scope_name<'a>(&self, request: impl Into<AuthRequest<'a>>) -> &'static str {
        self.context(request).scope_name()
    }

    /// Only a verified session with the admin flag qualifies.
    pub fn is_admin<'a>(&self, request: impl Into<AuthRequest<'a>>) -> bool {
        self.session_claims(request.into())
            .is_some_and(|claims| claims.admin)
    }

    /// Setup bypass, or a session that re-validates against the current time.
    pub fn is_user<'a>(&self, request: impl Into<AuthRequest<'a>>) -> bool {
        if self.setup_mode() {
            return true;
        }
        self.session_claims(request.into())
            .is_some_and(|claims| claims.validate(Utc::now().timestamp()).is_ok())
    }

    /// Check a username and password against the configured users.
    pub fn authenticate_user(&self, username: &str, password: &str) -> Result<&UserConfig, AuthError> {
        let Some(user) = self.inner.config.find_user(username) else {
            credentials::verify_dummy(password);
            return Err(AuthError::InvalidCredentials);
        };
        if credentials::verify_password(user, password)? {
            Ok(user)
        } else {
            Err(AuthError::InvalidCredentials)
        }
    }

    /// Issue a session token for a configured user.
    pub fn issue_session(&self, user: &UserConfig) -> Result<String, AuthError> {
        self.inner
            .sessions
            .issue(&user.username, user.admin, self.inner.config.session_lifetime())
    }

    fn scoped_credential(&self, request: AuthRequest<'_>) -> Option<Credential> {
        SCOPED_CHECKS
            .iter()
            .find_map(|check| check(self, request))
    }

    fn session_claims(&self, request: AuthRequest<'_>) -> Option<SessionClaims> {
        match self.check_session(request) {
            Some(Credential::Session(claims)) => Some(claims),
            _ => None,
        }
    }

    fn check_setup_mode(&self, _request: AuthRequest<'_>) -> Option<Credential> {
        self.setup_mode().then_some(Credential::SetupMode)
    }

    fn check_api_query(&self, request: AuthRequest<'_>) -> Option<Credential> {
        let query = Query::<ApiQuery>::try_from_uri(request.uri).ok()?;
        let presented = query.0.api?;
        credentials::matches_api_secret(&self.inner.config.api_secret, &presented)
            .then_some(Credential::ApiQuery)
    }

    fn check_authorization_header(&self, request: AuthRequest<'_>) -> Option<Credential> {
        let value = request.headers.get(AUTHORIZATION)?.to_str().ok()?;
        let presented = credentials::authorization_credential(value);
        credentials::matches_api_secret(&self.inner.config.api_secret, presented)
            .then_some(Credential::AuthorizationHeader)
    }

    fn check_session(&self, request: AuthRequest<'_>) -> Option<Credential> {
        let jar = CookieJar::from_headers(request.headers);
        let cookie = jar.get(SESSION_COOKIE)?;
        match self.inner.sessions.verify(cookie.value()) {
            Ok(claims) => Some(Credential::Session(claims)),
            Err(e) => {
                tracing::debug!(error = %e, key = %self.inner.sessions.id(), "Session cookie rejected");
                None
            }
        }
    }
}
