//! HTTP routes.
//!
//! A deliberately small surface that consumes the authenticator: liveness,
//! session introspection, login/logout and scope-aware server information.
//! Every request runs inside a request-id span; TLS modes add HSTS.

pub mod auth;
pub mod health;
pub mod server;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use http::header::{HeaderValue, CACHE_CONTROL, STRICT_TRANSPORT_SECURITY};
use tower_http::set_header::SetResponseHeaderLayer;

use crate::config::{CACHE_CONTROL_API, HSTS_HEADER_VALUE};
use crate::middleware::{request_id_layer, require_full, require_read};
use crate::state::AppState;

/// Creates the Axum router with all routes and response headers.
pub fn create_router(state: AppState) -> Router {
    // Session endpoints - open, the handlers decide
    let session_routes = Router::new()
        .route("/api/session", get(auth::session))
        .route("/api/login", post(auth::login))
        .route("/api/logout", post(auth::logout));

    // Read access
    let read_routes = Router::new()
        .route("/api/server", get(server::info))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_read));

    // Full access
    let full_routes = Router::new()
        .route("/api/server/settings", get(server::settings))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_full));

    let api_routes = Router::new()
        .merge(session_routes)
        .merge(read_routes)
        .merge(full_routes)
        .layer(SetResponseHeaderLayer::overriding(
            CACHE_CONTROL,
            HeaderValue::from_static(CACHE_CONTROL_API),
        ));

    // Health check - always fresh for liveness probes
    let health_routes = Router::new().route("/health", get(health::health));

    let router = Router::new()
        .merge(api_routes)
        .merge(health_routes)
        .with_state(state.clone());

    let router = if state.transport.is_tls() {
        router.layer(SetResponseHeaderLayer::if_not_present(
            STRICT_TRANSPORT_SECURITY,
            HeaderValue::from_static(HSTS_HEADER_VALUE),
        ))
    } else {
        router
    };

    // Request ID middleware - outermost, wraps everything in the request span
    router.layer(middleware::from_fn_with_state(state, request_id_layer))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, OnceLock};
    use std::time::Duration;

    use axum::body::{to_bytes, Body};
    use http::header::{AUTHORIZATION, COOKIE, SET_COOKIE};
    use http::{Request, StatusCode};
    use tower::ServiceExt;

    use crate::auth::{credentials, Authenticator, SessionKey};
    use crate::config::{AppConfig, UserConfig, SESSION_COOKIE};
    use crate::http::TransportMode;

    const SECRET: &str = "api-secret";

    fn password_hashes() -> &'static (String, String) {
        static HASHES: OnceLock<(String, String)> = OnceLock::new();
        HASHES.get_or_init(|| {
            (
                credentials::hash_password("rootpw").unwrap(),
                credentials::hash_password("viewpw").unwrap(),
            )
        })
    }

    fn state(transport: TransportMode, setup_mode: bool) -> AppState {
        let mut config = AppConfig::default();
        config.auth.api_secret = SECRET.to_string();
        config.auth.setup_mode = setup_mode;
        let (root_hash, viewer_hash) = password_hashes().clone();
        config.auth.users = vec![
            UserConfig {
                username: "root".to_string(),
                password_hash: root_hash,
                admin: true,
            },
            UserConfig {
                username: "viewer".to_string(),
                password_hash: viewer_hash,
                admin: false,
            },
        ];
        config.tls.letsencrypt_email = Some("ops@example.com".to_string());
        let auth = Authenticator::new(&config.auth, SessionKey::generate().unwrap());
        AppState::new(Arc::new(config), auth, transport)
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn login_request(username: &str, password: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api/login")
            .header("content-type", "application/json")
            .body(Body::from(
                serde_json::json!({ "username": username, "password": password }).to_string(),
            ))
            .unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let app = create_router(state(TransportMode::Plain, false));
        let response = app.oneshot(get("/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().get(STRICT_TRANSPORT_SECURITY).is_none());
    }

    #[tokio::test]
    async fn test_hsts_in_tls_modes() {
        for mode in [TransportMode::StaticTls, TransportMode::AutoTls] {
            let app = create_router(state(mode, false));
            let response = app.oneshot(get("/health")).await.unwrap();
            assert_eq!(
                response.headers().get(STRICT_TRANSPORT_SECURITY).unwrap(),
                "max-age=63072000; includeSubDomains"
            );
        }
    }

    #[tokio::test]
    async fn test_server_info_requires_read_access() {
        let app = create_router(state(TransportMode::Plain, false));
        let response = app.oneshot(get("/api/server")).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(response.headers().get(CACHE_CONTROL).unwrap(), "no-store");

        let body = body_json(response).await;
        assert_eq!(body["status"], 401);
    }

    #[tokio::test]
    async fn test_server_info_private_fields_for_admin_scope() {
        let app = create_router(state(TransportMode::Plain, false));
        let response = app
            .oneshot(get(&format!("/api/server?api={}", SECRET)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["scope"], "admin");
        assert_eq!(body["transport"], "plain");
        assert_eq!(body["private"]["acme_email"], "ops@example.com");
    }

    #[tokio::test]
    async fn test_server_info_hides_private_fields_for_user_scope() {
        let state = state(TransportMode::Plain, false);
        let token = state
            .auth
            .sessions()
            .issue("viewer", false, Duration::from_secs(60))
            .unwrap();
        let app = create_router(state);

        let request = Request::builder()
            .uri("/api/server")
            .header(COOKIE, format!("{}={}", SESSION_COOKIE, token))
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["scope"], "user");
        assert!(body.get("private").is_none());
    }

    #[tokio::test]
    async fn test_setup_mode_admits_without_private_fields() {
        let app = create_router(state(TransportMode::Plain, true));
        let response = app.oneshot(get("/api/server")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["scope"], "");
        assert!(body.get("private").is_none());
    }

    #[tokio::test]
    async fn test_settings_require_full_access() {
        let app = create_router(state(TransportMode::Plain, false));
        let response = app.clone().oneshot(get("/api/server/settings")).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let request = Request::builder()
            .uri("/api/server/settings")
            .header(AUTHORIZATION, format!("Bearer {}", SECRET))
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["api_secret_set"], true);
        assert_eq!(body["users"], 2);
        assert!(!body.to_string().contains(SECRET));
    }

    #[tokio::test]
    async fn test_login_sets_cookie() {
        let app = create_router(state(TransportMode::Plain, false));
        let response = app.clone().oneshot(login_request("root", "rootpw")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let set_cookie = response
            .headers()
            .get(SET_COOKIE)
            .unwrap()
            .to_str()
            .unwrap()
            .to_string();
        assert!(set_cookie.starts_with("statping_auth="));
        assert!(set_cookie.contains("HttpOnly"));
        assert!(!set_cookie.contains("Secure"));

        let body = body_json(response).await;
        assert_eq!(body["admin"], true);
        let token = body["token"].as_str().unwrap().to_string();

        let request = Request::builder()
            .uri("/api/session")
            .header(COOKIE, format!("{}={}", SESSION_COOKIE, token))
            .body(Body::empty())
            .unwrap();
        let body = body_json(app.oneshot(request).await.unwrap()).await;
        assert_eq!(body["scope"], "admin");
        assert_eq!(body["context"], "admin");
        assert_eq!(body["admin"], true);
        assert_eq!(body["subject"], "root");
    }

    #[tokio::test]
    async fn test_login_secure_cookie_in_tls_mode() {
        let app = create_router(state(TransportMode::StaticTls, false));
        let response = app.oneshot(login_request("viewer", "viewpw")).await.unwrap();
        let set_cookie = response.headers().get(SET_COOKIE).unwrap().to_str().unwrap();
        assert!(set_cookie.contains("Secure"));
    }

    #[tokio::test]
    async fn test_login_rejects_bad_password() {
        let app = create_router(state(TransportMode::Plain, false));
        let response = app.oneshot(login_request("root", "nope")).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(response.headers().get(SET_COOKIE).is_none());
    }

    #[tokio::test]
    async fn test_logout_clears_cookie() {
        let app = create_router(state(TransportMode::Plain, false));
        let request = Request::builder()
            .method("POST")
            .uri("/api/logout")
            .header(COOKIE, format!("{}=whatever", SESSION_COOKIE))
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        let set_cookie = response.headers().get(SET_COOKIE).unwrap().to_str().unwrap();
        assert!(set_cookie.starts_with("statping_auth="));
        assert!(set_cookie.contains("Max-Age=0"));
    }

    #[tokio::test]
    async fn test_anonymous_session_status() {
        let app = create_router(state(TransportMode::Plain, false));
        let body = body_json(app.oneshot(get("/api/session")).await.unwrap()).await;
        assert_eq!(body["scope"], "");
        assert_eq!(body["context"], "unauthenticated");
        assert_eq!(body["read"], false);
        assert_eq!(body["full"], false);
        assert_eq!(body["admin"], false);
        assert_eq!(body["user"], false);
        assert!(body["subject"].is_null());
    }
}
