//! Shared application state for request handlers.

use std::sync::Arc;

use crate::auth::Authenticator;
use crate::config::AppConfig;
use crate::http::TransportMode;

/// Shared application state, cloneable across handlers.
///
/// Built once per server start. Contains the configuration, the request
/// authenticator (with this start's session key) and the resolved transport.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub auth: Authenticator,
    pub transport: TransportMode,
}

impl AppState {
    pub fn new(config: Arc<AppConfig>, auth: Authenticator, transport: TransportMode) -> Self {
        Self {
            config,
            auth,
            transport,
        }
    }
}
