//! Server information routes.
//!
//! `GET /api/server` is read-gated; its private fields are serialized only for
//! requests whose scope is `admin`. `GET /api/server/settings` requires full
//! authentication.

use axum::{
    extract::State,
    http::{HeaderMap, Uri},
    Json,
};
use serde::Serialize;

use crate::auth::AuthRequest;
use crate::config::PublicSettings;
use crate::http::TransportMode;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct ServerInfo {
    pub version: &'static str,
    pub transport: TransportMode,
    pub scheme: &'static str,
    pub scope: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub private: Option<PrivateServerInfo>,
}

/// Fields only shown to admin-scoped requests.
#[derive(Debug, Serialize)]
pub struct PrivateServerInfo {
    pub directory: String,
    pub domains: Vec<String>,
    pub acme_email: Option<String>,
    pub session_key: String,
}

pub async fn info(State(state): State<AppState>, uri: Uri, headers: HeaderMap) -> Json<ServerInfo> {
    let scope = state.auth.scope_name(AuthRequest::new(&uri, &headers));

    let private = (scope == "admin").then(|| PrivateServerInfo {
        directory: state.config.directory.display().to_string(),
        domains: state.config.tls.letsencrypt_domains.clone(),
        acme_email: state.config.tls.letsencrypt_email.clone(),
        session_key: state.auth.sessions().id().to_string(),
    });

    Json(ServerInfo {
        version: env!("CARGO_PKG_VERSION"),
        transport: state.transport,
        scheme: state.transport.scheme(),
        scope,
        private,
    })
}

pub async fn settings(State(state): State<AppState>) -> Json<PublicSettings> {
    Json(state.config.public_settings())
}
