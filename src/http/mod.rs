//! HTTP server bootstrap with TLS support.
//!
//! Picks one transport per process:
//! - **AutoTls**: automatic certificate provisioning via Let's Encrypt
//! - **StaticTls**: `server.key` / `server.crt` from the application directory
//! - **Plain**: plain HTTP
//!
//! Also provides:
//! - HTTP to HTTPS redirect (optional, TLS modes)
//! - Shutdown on SIGTERM/SIGINT
//! - Certificate hot-reload via SIGHUP (static TLS)

mod redirect;
mod server;
mod shutdown;

pub use server::{
    reset_sessions, run_http_server, ServerError, ServerHandle, TlsFiles, Transport, TransportMode,
};
pub use shutdown::setup_shutdown_handler;
