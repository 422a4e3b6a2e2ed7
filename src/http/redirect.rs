//! HTTP to HTTPS redirect listener.
//!
//! In TLS modes the plain HTTP port can answer every request with a permanent
//! redirect to the HTTPS port.

use std::net::SocketAddr;

use axum::http::{StatusCode, Uri};
use axum::response::Redirect;
use axum::routing::any;
use axum::Router;
use axum_extra::extract::Host;
use axum_server::Handle;

/// Spawn the redirect listener in the background.
///
/// Waits for the HTTPS listener behind `tls` to bind and redirects to its
/// port; stops with `handle`.
pub fn spawn_redirect_server(addr: SocketAddr, tls: Handle, handle: Handle) {
    tokio::spawn(async move {
        let Some(https_addr) = tls.listening().await else {
            tracing::debug!("HTTPS listener did not bind, redirect server not started");
            return;
        };
        let https_port = https_addr.port();

        tracing::info!(
            %addr,
            https_port = %https_port,
            "Starting HTTP->HTTPS redirect server"
        );

        let app = Router::new().fallback(any(move |Host(host): Host, uri: Uri| async move {
            redirect_to_https(&host, &uri, https_port)
        }));

        match axum_server::bind(addr)
            .handle(handle)
            .serve(app.into_make_service())
            .await
        {
            Ok(()) => {
                tracing::debug!("HTTP redirect server stopped");
            }
            Err(e) => {
                tracing::error!(error = %e, "HTTP redirect server failed");
            }
        }
    });
}

fn redirect_to_https(host: &str, uri: &Uri, https_port: u16) -> Result<Redirect, StatusCode> {
    let target = https_url(host, uri, https_port);
    tracing::debug!(from = %uri, to = %target, "Redirecting HTTP to HTTPS");
    Ok(Redirect::permanent(&target))
}

fn https_url(host: &str, uri: &Uri, https_port: u16) -> String {
    let host_without_port = strip_port(host);
    let path = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");

    if https_port == 443 {
        format!("https://{}{}", host_without_port, path)
    } else {
        format!("https://{}:{}{}", host_without_port, https_port, path)
    }
}

/// Drop a trailing `:port`, leaving bracketed IPv6 literals intact.
fn strip_port(host: &str) -> &str {
    if let Some(end) = host.find(']') {
        return &host[..=end];
    }
    host.split(':').next().unwrap_or(host)
}
