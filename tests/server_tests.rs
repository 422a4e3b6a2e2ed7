//! End-to-end tests against a live listener.
//!
//! Each test starts the server in-process on an ephemeral port with a fresh
//! application directory. Plain mode unless the test writes a self-signed
//! `server.key` / `server.crt` pair into it.
//!
//! Run with: cargo test --test server_tests
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{COOKIE, LOCATION, SET_COOKIE, STRICT_TRANSPORT_SECURITY};
use reqwest::StatusCode;
use serde_json::Value;
use tokio::task::JoinHandle;

use statusd::auth::credentials::hash_password;
use statusd::config::{AppConfig, UserConfig, SESSION_COOKIE};
use statusd::http::{run_http_server, ServerError, ServerHandle};

/// A running server plus the handle used to stop it.
struct TestServer {
    addr: SocketAddr,
    handle: ServerHandle,
    task: JoinHandle<Result<(), ServerError>>,
}

impl TestServer {
    async fn start(config: Arc<AppConfig>) -> Self {
        let handle = ServerHandle::new();
        let task = tokio::spawn(run_http_server(config, handle.clone()));
        let addr = tokio::time::timeout(Duration::from_secs(10), handle.listening())
            .await
            .expect("server did not start in time")
            .expect("server failed to bind");
        Self { addr, handle, task }
    }

    fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    async fn stop(self) {
        self.handle.stop();
        let result = tokio::time::timeout(Duration::from_secs(10), self.task)
            .await
            .expect("server did not stop in time")
            .expect("server task panicked");
        assert!(result.is_ok(), "server exited with {:?}", result);
    }
}

fn config(directory: &Path) -> AppConfig {
    let mut config = AppConfig::default();
    config.directory = directory.to_path_buf();
    config.http.host = "127.0.0.1".to_string();
    config.http.port = 0;
    config.auth.api_secret = "integration-secret".to_string();
    config.auth.users = vec![UserConfig {
        username: "admin".to_string(),
        password_hash: hash_password("hunter2").unwrap(),
        admin: true,
    }];
    config
}

fn write_self_signed(dir: &Path) {
    let rcgen::CertifiedKey { cert, key_pair } =
        rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
    std::fs::write(dir.join("server.crt"), cert.pem()).unwrap();
    std::fs::write(dir.join("server.key"), key_pair.serialize_pem()).unwrap();
}

fn tls_config(directory: &Path) -> AppConfig {
    write_self_signed(directory);
    let mut config = config(directory);
    config.http.https_port = 0;
    config
}

fn insecure_client() -> reqwest::Client {
    reqwest::Client::builder()
        .danger_accept_invalid_certs(true)
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .unwrap()
}

async fn login(client: &reqwest::Client, server: &TestServer) -> String {
    let response = client
        .post(server.url("/api/login"))
        .json(&serde_json::json!({ "username": "admin", "password": "hunter2" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response
        .headers()
        .get(SET_COOKIE)
        .unwrap()
        .to_str()
        .unwrap()
        .starts_with(SESSION_COOKIE));

    let body: Value = response.json().await.unwrap();
    body["token"].as_str().unwrap().to_string()
}

async fn session_scope(client: &reqwest::Client, server: &TestServer, token: &str) -> Value {
    let response = client
        .get(server.url("/api/session"))
        .header(COOKIE, format!("{}={}", SESSION_COOKIE, token))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    body["scope"].clone()
}

#[tokio::test]
async fn test_health_over_plain_http() {
    let dir = tempfile::tempdir().unwrap();
    let server = TestServer::start(Arc::new(config(dir.path()))).await;

    let response = reqwest::get(server.url("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().get("strict-transport-security").is_none());
    assert_eq!(response.text().await.unwrap(), "ok");

    server.stop().await;
}

#[tokio::test]
async fn test_login_then_admin_scope() {
    let dir = tempfile::tempdir().unwrap();
    let server = TestServer::start(Arc::new(config(dir.path()))).await;
    let client = reqwest::Client::new();

    let token = login(&client, &server).await;
    assert_eq!(session_scope(&client, &server, &token).await, "admin");

    let response = client
        .get(server.url("/api/server"))
        .header(COOKIE, format!("{}={}", SESSION_COOKIE, token))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["transport"], "plain");
    assert_eq!(body["scheme"], "http");
    assert!(body["private"].is_object());

    server.stop().await;
}

#[tokio::test]
async fn test_api_query_grants_admin() {
    let dir = tempfile::tempdir().unwrap();
    let server = TestServer::start(Arc::new(config(dir.path()))).await;

    let response = reqwest::get(server.url("/api/server/settings?api=integration-secret"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = reqwest::get(server.url("/api/server/settings?api=wrong"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    server.stop().await;
}

#[tokio::test]
async fn test_restart_invalidates_sessions() {
    let dir = tempfile::tempdir().unwrap();
    let config = Arc::new(config(dir.path()));
    let client = reqwest::Client::new();

    let server = TestServer::start(config.clone()).await;
    let token = login(&client, &server).await;
    assert_eq!(session_scope(&client, &server, &token).await, "admin");
    server.stop().await;

    let server = TestServer::start(config).await;
    assert_eq!(session_scope(&client, &server, &token).await, "");

    let response = client
        .get(server.url("/api/server"))
        .header(COOKIE, format!("{}={}", SESSION_COOKIE, token))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    server.stop().await;
}

#[tokio::test]
async fn test_disabled_listener_returns_immediately() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config(dir.path());
    config.http.disable = true;

    let result = tokio::time::timeout(
        Duration::from_secs(5),
        run_http_server(Arc::new(config), ServerHandle::new()),
    )
    .await
    .unwrap();
    assert!(result.is_ok());
}

#[tokio::test]
async fn test_static_tls_serves_discovered_pair() {
    let dir = tempfile::tempdir().unwrap();
    let server = TestServer::start(Arc::new(tls_config(dir.path()))).await;
    let client = insecure_client();

    let response = client
        .get(format!("https://{}/health", server.addr))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(STRICT_TRANSPORT_SECURITY).unwrap(),
        "max-age=63072000; includeSubDomains"
    );

    let response = client
        .get(format!("https://{}/api/server?api=integration-secret", server.addr))
        .send()
        .await
        .unwrap();
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["transport"], "static_tls");
    assert_eq!(body["scheme"], "https");

    // plain HTTP is not served on the TLS port
    assert!(client
        .get(format!("http://{}/health", server.addr))
        .send()
        .await
        .map(|r| r.status() != StatusCode::OK)
        .unwrap_or(true));

    server.stop().await;
}

#[tokio::test]
async fn test_stop_releases_redirect_listener() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = tls_config(dir.path());
    config.tls.redirect_http = true;
    let server = TestServer::start(Arc::new(config)).await;

    let redirect_addr = tokio::time::timeout(Duration::from_secs(10), server.handle.redirect_listening())
        .await
        .expect("redirect listener did not start in time")
        .expect("redirect listener failed to bind");

    let response = insecure_client()
        .get(format!("http://{}/status?page=2", redirect_addr))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::PERMANENT_REDIRECT);
    assert_eq!(
        response.headers().get(LOCATION).unwrap().to_str().unwrap(),
        format!("https://127.0.0.1:{}/status?page=2", server.addr.port())
    );

    server.stop().await;

    let mut released = false;
    for _ in 0..50 {
        if tokio::net::TcpStream::connect(redirect_addr).await.is_err() {
            released = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    assert!(released, "redirect listener still accepting on {}", redirect_addr);
}
