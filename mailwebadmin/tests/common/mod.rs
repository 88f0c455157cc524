//! Test harness: the full router over an in-memory database, driven with
//! `oneshot`, carrying cookies and the CSRF token between requests.

#![allow(dead_code)]

use axum::body::Body;
use axum::http::{header, HeaderMap, Method, Request, StatusCode};
use axum::Router;
use axum_extra::extract::cookie::Key;
use cookie::Cookie;
use mailwebadmin::admin::backup::run_cleanup;
use mailwebadmin::admin::{CleanupJob, CleanupOutcome, CleanupPolicy, JobQueue, Subject};
use mailwebadmin::api::{router, AppState};
use mailwebadmin::security::{AdminUsers, SessionController};
use mailwebadmin::storage::MailDb;
use serde_json::Value;
use sqlx::sqlite::SqlitePoolOptions;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tower::ServiceExt;

pub const ADMIN: &str = "admin";
pub const ADMIN_PASSWORD: &str = "password123";

/// Runs cleanup jobs right away and records the outcome.
pub struct SyncQueue {
    policy: CleanupPolicy,
    pub outcomes: Mutex<Vec<(Subject, CleanupOutcome)>>,
}

impl JobQueue for SyncQueue {
    fn submit(&self, job: CleanupJob) {
        let subject = job.subject;
        let outcome = run_cleanup(&self.policy, job);
        self.outcomes.lock().unwrap().push((subject, outcome));
    }
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl TestResponse {
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body).unwrap()
    }

    pub fn location(&self) -> Option<&str> {
        self.headers
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok())
    }

    pub fn set_cookies(&self) -> Vec<String> {
        self.headers
            .get_all(header::SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .map(str::to_string)
            .collect()
    }
}

pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub queue: Arc<SyncQueue>,
    pub temp_dir: TempDir,
    cookies: HashMap<String, String>,
    csrf: Option<String>,
}

impl TestApp {
    pub async fn new(delete_dirs: bool) -> Self {
        let temp_dir = TempDir::new().unwrap();
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();

        let mail = MailDb::new(pool.clone());
        let admins = AdminUsers::new(pool.clone());
        let sessions = SessionController::new(pool, Duration::from_secs(3600));
        mail.init().await.unwrap();
        admins.init().await.unwrap();
        sessions.init().await.unwrap();
        admins.insert(ADMIN, ADMIN_PASSWORD).await.unwrap();

        let queue = Arc::new(SyncQueue {
            policy: CleanupPolicy {
                maildir: format!("{}/vmail/%d/%n", temp_dir.path().display()),
                backup: Some(temp_dir.path().join("backup")),
            },
            outcomes: Mutex::new(Vec::new()),
        });

        let state = AppState::new(
            mail,
            admins,
            sessions,
            queue.clone(),
            delete_dirs,
            Key::generate(),
        );
        let router = router(state.clone(), &temp_dir.path().join("static"));

        Self {
            router,
            state,
            queue,
            temp_dir,
            cookies: HashMap::new(),
            csrf: None,
        }
    }

    /// A fresh app with the default admin logged in.
    pub async fn logged_in(delete_dirs: bool) -> Self {
        let mut app = Self::new(delete_dirs).await;
        let response = app.login(ADMIN, ADMIN_PASSWORD, true).await;
        assert_eq!(response.status, StatusCode::FOUND);
        app
    }

    pub fn maildir(&self, domain: &str, user: &str) -> PathBuf {
        self.temp_dir.path().join("vmail").join(domain).join(user)
    }

    pub fn backup_file(&self, name: &str) -> PathBuf {
        self.temp_dir.path().join("backup").join(name)
    }

    pub fn outcomes(&self) -> Vec<(Subject, CleanupOutcome)> {
        self.queue.outcomes.lock().unwrap().clone()
    }

    /// Start over as a fresh browser.
    pub fn forget_cookies(&mut self) {
        self.cookies.clear();
        self.csrf = None;
    }

    pub fn cookies(&self) -> HashMap<String, String> {
        self.cookies.clone()
    }

    pub fn restore_cookies(&mut self, cookies: HashMap<String, String>) {
        self.cookies = cookies;
    }

    pub fn has_cookie(&self, name: &str) -> bool {
        self.cookies.contains_key(name)
    }

    pub async fn request(&mut self, method: &str, uri: &str, body: Option<Value>) -> TestResponse {
        match body {
            Some(json) => self.send(method, uri, Body::from(json.to_string()), true).await,
            None => self.send(method, uri, Body::empty(), false).await,
        }
    }

    /// Body sent as is, for malformed payloads.
    pub async fn raw_request(&mut self, method: &str, uri: &str, body: &'static str) -> TestResponse {
        self.send(method, uri, Body::from(body), true).await
    }

    async fn send(&mut self, method: &str, uri: &str, body: Body, json: bool) -> TestResponse {
        let mut builder = Request::builder()
            .method(Method::from_bytes(method.as_bytes()).unwrap())
            .uri(uri);

        if !self.cookies.is_empty() {
            let cookie_header = self
                .cookies
                .iter()
                .map(|(name, value)| format!("{}={}", name, value))
                .collect::<Vec<_>>()
                .join("; ");
            builder = builder.header(header::COOKIE, cookie_header);
        }
        if let Some(token) = &self.csrf {
            builder = builder.header("X-CSRF-Token", token.as_str());
        }
        if json {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
        }

        let response = self
            .router
            .clone()
            .oneshot(builder.body(body).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap()
            .to_vec();

        let response = TestResponse {
            status,
            headers,
            body,
        };
        self.absorb(&response);
        response
    }

    /// Send without the CSRF header.
    pub async fn request_without_csrf(&mut self, method: &str, uri: &str, body: Option<Value>) -> TestResponse {
        let saved = self.csrf.take();
        let response = self.request(method, uri, body).await;
        if self.csrf.is_none() {
            self.csrf = saved;
        }
        response
    }

    pub async fn login(&mut self, username: &str, password: &str, remember_me: bool) -> TestResponse {
        if self.csrf.is_none() {
            let response = self.request("GET", "/login", None).await;
            assert_eq!(response.status, StatusCode::OK);
        }
        self.request(
            "POST",
            "/login",
            Some(serde_json::json!({
                "username": username,
                "password": password,
                "remember-me": remember_me,
            })),
        )
        .await
    }

    fn absorb(&mut self, response: &TestResponse) {
        for raw in response.set_cookies() {
            let Ok(cookie) = Cookie::parse(raw) else {
                continue;
            };
            let removed = cookie
                .max_age()
                .map(|age| age.is_zero() || age.is_negative())
                .unwrap_or(false);
            if removed {
                self.cookies.remove(cookie.name());
            } else {
                self.cookies
                    .insert(cookie.name().to_string(), cookie.value().to_string());
            }
        }

        if let Some(token) = response
            .headers
            .get("x-csrf-token")
            .and_then(|v| v.to_str().ok())
        {
            self.csrf = Some(token.to_string());
        }
    }
}
