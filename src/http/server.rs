//! HTTP/HTTPS server startup logic.
//!
//! The transport is picked once per process:
//! - AutoTls: Let's Encrypt certificates via ACME (`LETSENCRYPT_ENABLE`)
//! - StaticTls: `server.key` + `server.crt` found in the application directory
//! - Plain: everything else

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::Router;
use axum_server::tls_rustls::RustlsConfig;
use axum_server::Handle;
use futures::StreamExt;
use rustls_acme::caches::DirCache;
use rustls_acme::AcmeConfig;
use serde::Serialize;
use tower_http::timeout::TimeoutLayer;

use crate::auth::{AuthError, Authenticator, SessionKey};
use crate::config::{
    AppConfig, ConfigError, TlsConfig, REQUEST_TIMEOUT, SHUTDOWN_GRACE, TLS_CERT_FILE, TLS_KEY_FILE,
};
use crate::routes::create_router;
use crate::state::AppState;

use super::redirect;
use super::shutdown;

/// Server startup error
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Invalid listener configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Failed to bind or serve: {0}")]
    Bind(#[from] std::io::Error),

    #[error("Failed to load TLS configuration: {0}")]
    TlsConfig(String),

    #[error("Failed to create session key: {0}")]
    Session(#[from] AuthError),
}

/// Transport chosen for the lifetime of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportMode {
    Plain,
    StaticTls,
    AutoTls,
}

impl TransportMode {
    /// Automatic provisioning wins over static files, static files over plain.
    pub fn select(autotls: bool, static_files: bool) -> Self {
        if autotls {
            TransportMode::AutoTls
        } else if static_files {
            TransportMode::StaticTls
        } else {
            TransportMode::Plain
        }
    }

    pub fn is_tls(self) -> bool {
        !matches!(self, TransportMode::Plain)
    }

    pub fn scheme(self) -> &'static str {
        if self.is_tls() {
            "https"
        } else {
            "http"
        }
    }
}

/// Key/certificate pair discovered in the application directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsFiles {
    pub key: PathBuf,
    pub cert: PathBuf,
}

impl TlsFiles {
    /// Returns the pair only if both files exist.
    pub fn probe(directory: &Path) -> Option<Self> {
        let key = directory.join(TLS_KEY_FILE);
        let cert = directory.join(TLS_CERT_FILE);
        (key.is_file() && cert.is_file()).then_some(Self { key, cert })
    }
}

/// Resolved transport plus whatever it needs to start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transport {
    Plain,
    StaticTls(TlsFiles),
    AutoTls,
}

impl Transport {
    pub fn resolve(config: &AppConfig) -> Self {
        let files = TlsFiles::probe(&config.directory);
        match (TransportMode::select(config.tls.letsencrypt_enable, files.is_some()), files) {
            (TransportMode::AutoTls, _) => Transport::AutoTls,
            (TransportMode::StaticTls, Some(files)) => Transport::StaticTls(files),
            _ => Transport::Plain,
        }
    }

    pub fn mode(&self) -> TransportMode {
        match self {
            Transport::Plain => TransportMode::Plain,
            Transport::StaticTls(_) => TransportMode::StaticTls,
            Transport::AutoTls => TransportMode::AutoTls,
        }
    }
}

/// Handle to the running listeners.
///
/// The HTTP->HTTPS redirect listener has its own handle so `listening()`
/// always reports the main address; `stop()` shuts down both.
#[derive(Clone)]
pub struct ServerHandle {
    inner: Handle,
    redirect: Handle,
}

impl Default for ServerHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerHandle {
    pub fn new() -> Self {
        Self {
            inner: Handle::new(),
            redirect: Handle::new(),
        }
    }

    /// Stop accepting connections; in-flight requests get the shutdown grace period.
    pub fn stop(&self) {
        tracing::info!(
            grace_secs = SHUTDOWN_GRACE.as_secs(),
            "Stopping HTTP server"
        );
        self.inner.graceful_shutdown(Some(SHUTDOWN_GRACE));
        self.redirect.graceful_shutdown(Some(SHUTDOWN_GRACE));
    }

    /// Resolves to the bound address once listening, or `None` if binding failed.
    pub async fn listening(&self) -> Option<SocketAddr> {
        self.inner.listening().await
    }

    /// Like `listening`, for the redirect listener. Never resolves unless a
    /// TLS mode started with `tls.redirect_http`.
    pub async fn redirect_listening(&self) -> Option<SocketAddr> {
        self.redirect.listening().await
    }
}

/// Rotate the session signing key.
///
/// Session cookies issued before this call no longer verify.
pub fn reset_sessions() -> Result<SessionKey, AuthError> {
    let key = SessionKey::generate()?;
    tracing::info!(key = %key.id(), "Session signing key rotated, previous sessions invalidated");
    Ok(key)
}

/// Start the HTTP/HTTPS server based on configuration.
///
/// Blocks until the server shuts down. Returns `Ok(())` immediately when the
/// listener is disabled.
pub async fn run_http_server(config: Arc<AppConfig>, handle: ServerHandle) -> Result<(), ServerError> {
    if config.http.disable {
        tracing::info!("HTTP listener disabled (DISABLE_HTTP), not serving");
        return Ok(());
    }

    let transport = Transport::resolve(&config);
    let mode = transport.mode();

    let auth = Authenticator::new(&config.auth, reset_sessions()?);
    let state = AppState::new(config.clone(), auth, mode);
    let app = create_router(state).layer(TimeoutLayer::new(REQUEST_TIMEOUT));

    match transport {
        Transport::Plain => {
            let addr = config.http.plain_addr()?;
            start_plain_server(app, addr, handle).await
        }
        Transport::StaticTls(files) => {
            let addr = config.http.tls_addr()?;
            if config.tls.redirect_http {
                redirect::spawn_redirect_server(
                    config.http.plain_addr()?,
                    handle.inner.clone(),
                    handle.redirect.clone(),
                );
            }
            start_static_tls_server(app, addr, &files, handle).await
        }
        Transport::AutoTls => {
            let addr = config.http.tls_addr()?;
            if config.tls.redirect_http {
                redirect::spawn_redirect_server(
                    config.http.plain_addr()?,
                    handle.inner.clone(),
                    handle.redirect.clone(),
                );
            }
            start_acme_server(app, addr, &config.tls, handle).await
        }
    }
}

/// Start a plain HTTP server (no TLS).
async fn start_plain_server(
    app: Router,
    addr: SocketAddr,
    handle: ServerHandle,
) -> Result<(), ServerError> {
    tracing::info!(%addr, "HTTP server running on http://{}", addr);

    axum_server::bind(addr)
        .handle(handle.inner)
        .serve(app.into_make_service())
        .await?;
    Ok(())
}

/// Start HTTPS server with the discovered key/certificate pair.
async fn start_static_tls_server(
    app: Router,
    addr: SocketAddr,
    files: &TlsFiles,
    handle: ServerHandle,
) -> Result<(), ServerError> {
    tracing::info!(
        %addr,
        cert = %files.cert.display(),
        key = %files.key.display(),
        "server.crt and server.key found, starting HTTPS server"
    );

    install_crypto_provider();

    let rustls_config = RustlsConfig::from_pem_file(&files.cert, &files.key)
        .await
        .map_err(|e| ServerError::TlsConfig(format!("Failed to load certificates: {}", e)))?;

    shutdown::setup_reload_handler(rustls_config.clone(), files.clone());

    axum_server::bind_rustls(addr, rustls_config)
        .handle(handle.inner)
        .serve(app.into_make_service())
        .await?;
    Ok(())
}

/// Start HTTPS server with automatic ACME (Let's Encrypt) certificates.
async fn start_acme_server(
    app: Router,
    addr: SocketAddr,
    tls_config: &TlsConfig,
    handle: ServerHandle,
) -> Result<(), ServerError> {
    let domains = tls_config.letsencrypt_domains.clone();
    let email = tls_config
        .letsencrypt_email
        .clone()
        .ok_or_else(|| ServerError::TlsConfig("Let's Encrypt contact email is not set".to_string()))?;
    let cache_dir = tls_config.acme_cache_dir.clone();
    let production = !tls_config.letsencrypt_staging;

    let env_name = if production { "production" } else { "staging" };
    tracing::info!(
        %addr,
        domains = ?domains,
        email = %email,
        cache = %cache_dir.display(),
        environment = %env_name,
        "Starting HTTPS server (Let's Encrypt)"
    );

    if !production {
        tracing::warn!(
            "Using Let's Encrypt staging environment - certificates will NOT be trusted by browsers"
        );
    }

    std::fs::create_dir_all(&cache_dir).map_err(|e| {
        ServerError::TlsConfig(format!(
            "Failed to create ACME cache directory '{}': {}",
            cache_dir.display(),
            e
        ))
    })?;

    install_crypto_provider();

    let mut acme_state = AcmeConfig::new(domains)
        .contact_push(format!("mailto:{}", email))
        .cache(DirCache::new(cache_dir))
        .directory_lets_encrypt(production)
        .state();

    let acceptor = acme_state.axum_acceptor(acme_state.default_rustls_config());

    // Drives issuance and renewal
    tokio::spawn(async move {
        loop {
            match acme_state.next().await {
                Some(Ok(event)) => {
                    tracing::info!(event = ?event, "ACME event");
                }
                Some(Err(err)) => {
                    tracing::error!(error = %err, "ACME error");
                }
                None => {
                    tracing::debug!("ACME state stream ended");
                    break;
                }
            }
        }
    });

    axum_server::bind(addr)
        .handle(handle.inner)
        .acceptor(acceptor)
        .serve(app.into_make_service())
        .await?;
    Ok(())
}

/// rustls needs exactly one process-wide crypto provider; a second install is a no-op.
fn install_crypto_provider() {
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
}
