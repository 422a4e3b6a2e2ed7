//! Liveness probe.

/// Returns "ok" whenever the process can answer HTTP.
pub async fn health() -> &'static str {
    "ok"
}
