//! Request middleware.
//!
//! - `request_id_layer`: generates a UUID v4 per request and wraps the request
//!   in a span carrying the id and the resolved auth scope, so every log line
//!   emitted while handling it can be correlated.
//! - `require_read` / `require_full`: reject requests the authenticator does
//!   not admit, before the handler runs.

use std::time::Instant;

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use tracing::Instrument;
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;

/// Extension type for accessing request ID in handlers if needed.
#[derive(Clone, Debug)]
pub struct RequestId(pub Uuid);

/// Middleware that generates a request ID and creates a request span.
///
/// This should be the outermost middleware layer so the span wraps
/// all request processing, including other middleware and handlers.
pub async fn request_id_layer(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let request_id = Uuid::new_v4();
    let scope = state.auth.scope_name(&request);

    let span = tracing::info_span!(
        "request",
        request_id = %request_id,
        method = %request.method(),
        path = %request.uri().path(),
        scope = %scope,
        duration_ms = tracing::field::Empty,
    );

    let start = Instant::now();
    request.extensions_mut().insert(RequestId(request_id));

    async move {
        let response = next.run(request).await;
        let duration_ms = start.elapsed().as_millis() as u64;

        tracing::Span::current().record("duration_ms", duration_ms);
        tracing::info!(
            status = response.status().as_u16(),
            duration_ms,
            "Request completed"
        );

        response
    }
    .instrument(span)
    .await
}

/// Admit requests with read-level access.
pub async fn require_read(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    if !state.auth.is_read_authenticated(&request) {
        tracing::debug!("Read access denied");
        return Err(AppError::Unauthorized);
    }
    Ok(next.run(request).await)
}

/// Admit requests allowed to reach dashboard-mutating routes.
pub async fn require_full(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    if !state.auth.is_full_authenticated(&request) {
        tracing::debug!("Full access denied");
        return Err(AppError::Unauthorized);
    }
    Ok(next.run(request).await)
}
