//! Signal handling.
//!
//! Handles:
//! - SIGTERM/SIGINT: stop the listener
//! - SIGHUP: certificate reload (static TLS mode only)

use axum_server::tls_rustls::RustlsConfig;

use super::server::{ServerHandle, TlsFiles};

/// Stop the server on SIGTERM or SIGINT.
pub fn setup_shutdown_handler(handle: ServerHandle) {
    tokio::spawn(async move {
        let ctrl_c = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to install Ctrl+C handler");
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut signal) => {
                    signal.recv().await;
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to install SIGTERM handler");
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {
                tracing::info!("Received Ctrl+C");
            }
            _ = terminate => {
                tracing::info!("Received SIGTERM");
            }
        }

        handle.stop();
    });
}

/// Reload the key/certificate pair from disk on SIGHUP.
#[cfg(unix)]
pub fn setup_reload_handler(tls_config: RustlsConfig, files: TlsFiles) {
    tokio::spawn(async move {
        let mut sighup =
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::hangup()) {
                Ok(signal) => signal,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to install SIGHUP handler");
                    return;
                }
            };

        loop {
            sighup.recv().await;
            tracing::info!("Received SIGHUP, reloading TLS certificates");

            match tls_config
                .reload_from_pem_file(&files.cert, &files.key)
                .await
            {
                Ok(()) => {
                    tracing::info!(
                        cert = %files.cert.display(),
                        key = %files.key.display(),
                        "TLS certificates reloaded"
                    );
                }
                Err(e) => {
                    tracing::error!(
                        error = %e,
                        cert = %files.cert.display(),
                        key = %files.key.display(),
                        "Failed to reload TLS certificates"
                    );
                }
            }
        }
    });
}

/// No-op reload handler for non-Unix platforms.
#[cfg(not(unix))]
pub fn setup_reload_handler(_tls_config: RustlsConfig, _files: TlsFiles) {
    tracing::warn!("Certificate hot-reload via SIGHUP not supported on this platform");
}
