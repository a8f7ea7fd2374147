//! Shared fixtures for unit tests.

use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use axum::Router;
use axum::extract::State;
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE, HeaderName};
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde_json::{Value, json};

use crate::auth::{AuthEndpoints, LoginCredentials, Registration};
use crate::credentials::CredentialPair;
use crate::error::ApiError;

/// An unsigned JWT-shaped token carrying `payload`.
pub fn token_with(payload: &Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(r#"{"alg":"HS256","typ":"JWT"}"#);
    let body = URL_SAFE_NO_PAD.encode(payload.to_string());
    format!("{header}.{body}.signature")
}

/// An access token for `email` expiring an hour from now.
pub fn access_for(email: &str) -> String {
    token_with(&json!({
        "id": 1,
        "email": email,
        "first_name": "Test",
        "last_name": "User",
        "exp": crate::credentials::now_secs() + 3_600,
    }))
}

pub fn pair_for(email: &str) -> CredentialPair {
    CredentialPair::new(access_for(email), format!("refresh-{email}"))
}

/// A second pair for `email` whose access token differs from [`pair_for`].
pub fn fresh_pair_for(email: &str) -> CredentialPair {
    let access = token_with(&json!({
        "id": 1,
        "email": email,
        "jti": "rotated",
        "exp": crate::credentials::now_secs() + 3_600,
    }));
    CredentialPair::new(access, format!("rotated-{email}"))
}

/// A fresh path under the system temp dir; the parent is not created.
pub fn temp_path(name: &str) -> PathBuf {
    std::env::temp_dir()
        .join(format!("portal-gateway-{}", uuid::Uuid::new_v4()))
        .join(format!("{name}.json"))
}

// =============================================================================
// MOCK AUTH
// =============================================================================

/// Scripted [`AuthEndpoints`]. Each call pops the next queued result; an empty
/// queue answers with a 500.
#[derive(Default)]
pub struct MockAuth {
    pub logins: Mutex<VecDeque<Result<CredentialPair, ApiError>>>,
    pub refreshes: Mutex<VecDeque<Result<CredentialPair, ApiError>>>,
    pub registrations: Mutex<VecDeque<Result<(), ApiError>>>,
    pub login_calls: Mutex<Vec<LoginCredentials>>,
    pub refresh_calls: Mutex<Vec<String>>,
    pub google_calls: Mutex<Vec<String>>,
}

impl MockAuth {
    pub fn with_login(result: Result<CredentialPair, ApiError>) -> Self {
        let mock = Self::default();
        mock.logins.lock().unwrap().push_back(result);
        mock
    }

    pub fn with_refresh(result: Result<CredentialPair, ApiError>) -> Self {
        let mock = Self::default();
        mock.refreshes.lock().unwrap().push_back(result);
        mock
    }

    pub fn refresh_count(&self) -> usize {
        self.refresh_calls.lock().unwrap().len()
    }
}

fn unscripted<T>() -> Result<T, ApiError> {
    Err(ApiError::new(Some(500), "server_error", "unscripted mock call"))
}

#[async_trait::async_trait]
impl AuthEndpoints for MockAuth {
    async fn login(&self, credentials: &LoginCredentials) -> Result<CredentialPair, ApiError> {
        self.login_calls.lock().unwrap().push(credentials.clone());
        self.logins.lock().unwrap().pop_front().unwrap_or_else(unscripted)
    }

    async fn refresh(&self, refresh_token: &str) -> Result<CredentialPair, ApiError> {
        self.refresh_calls.lock().unwrap().push(refresh_token.to_owned());
        self.refreshes.lock().unwrap().pop_front().unwrap_or_else(unscripted)
    }

    async fn google_login(&self, access_token: &str) -> Result<CredentialPair, ApiError> {
        self.google_calls.lock().unwrap().push(access_token.to_owned());
        self.logins.lock().unwrap().pop_front().unwrap_or_else(unscripted)
    }

    async fn register(&self, _registration: &Registration) -> Result<(), ApiError> {
        self.registrations.lock().unwrap().pop_front().unwrap_or_else(unscripted)
    }
}

// =============================================================================
// MOCK BACKEND
// =============================================================================

/// One request seen by the mock backend.
#[derive(Debug, Clone)]
pub struct Hit {
    pub method: String,
    pub path: String,
    pub query: Option<String>,
    pub authorization: Option<String>,
    pub content_type: Option<String>,
    pub body: String,
}

/// Behaviour knobs for [`spawn_backend`].
///
/// Protected routes accept only `Bearer <valid_access>`. The refresh endpoint
/// answers `refresh_status`; on 200 it hands out `issue` and makes its access
/// token the valid one.
pub struct Backend {
    pub valid_access: Mutex<String>,
    pub refresh_status: Mutex<u16>,
    pub issue: Mutex<Option<CredentialPair>>,
    pub hits: Mutex<Vec<Hit>>,
}

impl Default for Backend {
    fn default() -> Self {
        Self {
            valid_access: Mutex::new(String::new()),
            refresh_status: Mutex::new(200),
            issue: Mutex::new(None),
            hits: Mutex::new(Vec::new()),
        }
    }
}

impl Backend {
    pub fn hits_to(&self, path: &str) -> Vec<Hit> {
        self.hits.lock().unwrap().iter().filter(|h| h.path == path).cloned().collect()
    }

    fn record(&self, method: &Method, uri: &Uri, headers: &HeaderMap, body: &str) {
        let header = |name: HeaderName| headers.get(name).and_then(|v| v.to_str().ok()).map(str::to_owned);
        self.hits.lock().unwrap().push(Hit {
            method: method.to_string(),
            path: uri.path().to_owned(),
            query: uri.query().map(str::to_owned),
            authorization: header(AUTHORIZATION),
            content_type: header(CONTENT_TYPE),
            body: body.to_owned(),
        });
    }

    fn authorized(&self, headers: &HeaderMap) -> bool {
        let expected = format!("Bearer {}", self.valid_access.lock().unwrap());
        headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok()) == Some(expected.as_str())
    }
}

/// Serve `backend` on an ephemeral loopback port; returns the base URL.
pub async fn spawn_backend(backend: Arc<Backend>) -> String {
    let app = Router::new()
        .route("/user/login/", post(login))
        .route("/admin-user/login/", post(admin_login))
        .route("/user/token-refresh/", post(refresh))
        .fallback(protected)
        .with_state(backend);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

/// A base URL on which nothing is listening.
pub async fn dead_url() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}")
}

/// A server that promises a longer body than it sends, then hangs up.
pub async fn truncating_url() -> String {
    use tokio::io::{AsyncReadExt as _, AsyncWriteExt as _};

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let mut request = [0_u8; 4096];
            let _ = socket.read(&mut request).await;
            let head = "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: 64\r\n\r\n{\"ok\":";
            let _ = socket.write_all(head.as_bytes()).await;
            let _ = socket.shutdown().await;
        }
    });
    format!("http://{addr}")
}

fn reply(status: u16, body: &Value) -> Response {
    let status = StatusCode::from_u16(status).unwrap();
    (status, axum::Json(body.clone())).into_response()
}

fn parse_form(body: &str) -> HashMap<String, String> {
    reqwest::Url::parse(&format!("http://form.invalid/?{body}"))
        .unwrap()
        .query_pairs()
        .into_owned()
        .collect()
}

fn issue_login(backend: &Backend, email: &str) -> Response {
    let pair = pair_for(email);
    *backend.valid_access.lock().unwrap() = pair.access.clone();
    reply(200, &json!({ "access": pair.access, "refresh": pair.refresh }))
}

async fn login(State(backend): State<Arc<Backend>>, method: Method, uri: Uri, headers: HeaderMap, body: String) -> Response {
    backend.record(&method, &uri, &headers, &body);
    let form = parse_form(&body);
    if form.get("password").map(String::as_str) != Some("pw") {
        return reply(401, &json!({ "detail": "No active account found with the given credentials" }));
    }
    issue_login(&backend, form.get("email").map_or("", String::as_str))
}

async fn admin_login(State(backend): State<Arc<Backend>>, method: Method, uri: Uri, headers: HeaderMap, body: String) -> Response {
    backend.record(&method, &uri, &headers, &body);
    let form = parse_form(&body);
    let email = form.get("email").map_or("", String::as_str);
    if form.get("password").map(String::as_str) != Some("pw") {
        return reply(401, &json!({ "detail": "No active account found with the given credentials" }));
    }
    if !email.starts_with("admin") {
        return reply(403, &json!({ "detail": "You do not have permission to perform this action." }));
    }
    issue_login(&backend, email)
}

async fn refresh(State(backend): State<Arc<Backend>>, method: Method, uri: Uri, headers: HeaderMap, body: String) -> Response {
    backend.record(&method, &uri, &headers, &body);
    let status = *backend.refresh_status.lock().unwrap();
    if status >= 500 {
        return StatusCode::from_u16(status).unwrap().into_response();
    }
    let issued = backend.issue.lock().unwrap().clone();
    match issued {
        Some(pair) if status == 200 => {
            *backend.valid_access.lock().unwrap() = pair.access.clone();
            reply(200, &json!({ "access": pair.access, "refresh": pair.refresh }))
        }
        _ => reply(401, &json!({ "detail": "Token is invalid or expired", "code": "token_not_valid" })),
    }
}

async fn protected(State(backend): State<Arc<Backend>>, method: Method, uri: Uri, headers: HeaderMap, body: String) -> Response {
    backend.record(&method, &uri, &headers, &body);
    match uri.path() {
        "/boom/" => return reply(500, &json!({ "detail": "Database unavailable" })),
        "/validation/" => {
            return reply(400, &json!({ "errors": { "email": ["Enter a valid email address."] } }));
        }
        "/public/" => return reply(200, &json!({ "public": true })),
        "/user/login/google/" => {
            let sent: Value = serde_json::from_str(&body).unwrap_or(Value::Null);
            if sent["access_token"] != "google-ok" {
                return reply(400, &json!({ "detail": "Invalid Google token" }));
            }
            return issue_login(&backend, "google@example.com");
        }
        "/user/register/" => {
            let sent: Value = serde_json::from_str(&body).unwrap_or(Value::Null);
            if sent["email"].as_str().is_some_and(|e| e.starts_with("taken")) {
                return reply(400, &json!({ "errors": { "email": ["user with this email already exists."] } }));
            }
            return reply(201, &json!({ "email": sent["email"] }));
        }
        _ => {}
    }
    if uri.path() == "/always-401/" || !backend.authorized(&headers) {
        return reply(401, &json!({ "detail": "Given token not valid for any token type", "code": "token_not_valid" }));
    }
    match uri.path() {
        "/user/user-data/" => reply(
            200,
            &json!({
                "date_joined": "2024-03-01T10:00:00Z",
                "phone_number": "+49 30 1234567",
                "city": "Berlin",
                "street": "Hauptstr. 1",
                "zip": "10115",
                "image_url": null,
            }),
        ),
        "/user/update/" => reply(200, &json!({ "updated": parse_form(&body) })),
        "/echo/" => reply(
            200,
            &json!({
                "method": method.to_string(),
                "query": uri.query(),
                "body": serde_json::from_str::<Value>(&body).unwrap_or(Value::Null),
            }),
        ),
        path => reply(200, &json!({ "ok": true, "path": path })),
    }
}
