//! Session routes.
//!
//! Routes:
//! - GET /api/session - How the current request resolves
//! - POST /api/login - Verify a configured user and set the session cookie
//! - POST /api/logout - Clear the session cookie

use axum::{
    extract::State,
    http::{HeaderMap, Uri},
    Json,
};
use axum_extra::extract::CookieJar;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::auth::{removal_cookie, session_cookie, AuthContext, AuthRequest, Credential};
use crate::error::AppError;
use crate::state::AppState;

/// Login request body
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub admin: bool,
}

/// Resolution of the current request against every query.
#[derive(Debug, Serialize)]
pub struct SessionStatus {
    pub scope: String,
    pub context: AuthContext,
    pub read: bool,
    pub full: bool,
    pub admin: bool,
    pub user: bool,
    pub subject: Option<String>,
}

#[instrument(name = "auth::session", skip_all)]
pub async fn session(State(state): State<AppState>, uri: Uri, headers: HeaderMap) -> Json<SessionStatus> {
    let request = AuthRequest::new(&uri, &headers);
    let auth = &state.auth;

    let subject = match auth.credential(request) {
        Some(Credential::Session(claims)) => Some(claims.sub),
        _ => None,
    };

    Json(SessionStatus {
        scope: auth.scope_name(request).to_string(),
        context: auth.context(request),
        read: auth.is_read_authenticated(request),
        full: auth.is_full_authenticated(request),
        admin: auth.is_admin(request),
        user: auth.is_user(request),
        subject,
    })
}

#[instrument(name = "auth::login", skip_all)]
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(body): Json<LoginRequest>,
) -> Result<(CookieJar, Json<LoginResponse>), AppError> {
    let auth = state.auth.clone();
    let username = body.username.clone();

    // Argon2 verification blocks
    let user = tokio::task::spawn_blocking(move || {
        auth.authenticate_user(&body.username, &body.password)
            .cloned()
    })
    .await
    .map_err(|e| AppError::Internal(format!("Login task failed: {}", e)))?
    .inspect_err(|e| tracing::warn!(username = %username, error = %e, "Login rejected"))?;

    let token = state.auth.issue_session(&user)?;
    let cookie = session_cookie(
        token.clone(),
        state.config.auth.session_lifetime(),
        state.transport.is_tls(),
    );

    tracing::info!(username = %user.username, admin = user.admin, "Session issued");

    Ok((
        jar.add(cookie),
        Json(LoginResponse {
            token,
            admin: user.admin,
        }),
    ))
}

#[instrument(name = "auth::logout", skip_all)]
pub async fn logout(jar: CookieJar) -> CookieJar {
    jar.remove(removal_cookie())
}
