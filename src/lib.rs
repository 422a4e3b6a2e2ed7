//! statusd: request authentication and server bootstrap for a status page service.
//!
//! Two cooperating pieces:
//! - [`auth`]: classifies each request as anonymous, user or admin
//! - [`http`]: picks plain HTTP, static TLS or Let's Encrypt at startup and runs
//!   the listener

pub mod auth;
pub mod config;
pub mod error;
pub mod http;
pub mod middleware;
pub mod routes;
pub mod state;

pub use error::AppError;
