#![allow(dead_code)]

use axum::{
    Router,
    body::Body,
    extract::ConnectInfo,
    http::{Request, Response, StatusCode, header},
};
use gatehouse::api::AppState;
use gatehouse::config::Config;
use http_body_util::BodyExt;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceExt;

pub const SETUP_TOKEN: &str = "setup-token-0123456789abcdef0123456789";
pub const ADMIN_EMAIL: &str = "owner@example.com";
pub const ADMIN_PASSWORD: &str = "Owner!Passw0rd";
pub const STRONG_PASSWORD: &str = "Fresh#Passw0rd9";

pub struct TestApp {
    pub router: Router,
    pub state: Arc<AppState>,
}

pub fn test_config() -> Config {
    let mut config = Config::default();
    let path = std::env::temp_dir().join(format!("gatehouse-test-{}.db", uuid::Uuid::new_v4()));
    config.general.database_path = format!("sqlite:{}", path.display());
    config.auth.access_token_secret = "access-secret-for-tests-0123456789abcdef".to_string();
    config.auth.refresh_token_secret = "refresh-secret-for-tests-0123456789abcdef".to_string();
    config.auth.setup_token = SETUP_TOKEN.to_string();
    config.auth.default_admin_email = ADMIN_EMAIL.to_string();
    // Cheap hashing keeps the suite fast.
    config.security.argon2_memory_cost_kib = 1024;
    config.security.argon2_time_cost = 1;
    config.security.argon2_parallelism = 1;
    config
}

pub async fn spawn_app_with(config: Config) -> TestApp {
    spawn_app_with_routes(config, Router::new()).await
}

pub async fn spawn_app() -> TestApp {
    spawn_app_with(test_config()).await
}

pub async fn spawn_app_with_routes(config: Config, extra: Router<Arc<AppState>>) -> TestApp {
    let state = gatehouse::api::create_app_state_from_config(config, None)
        .await
        .expect("Failed to create app state");
    let router = gatehouse::api::router_with(state.clone(), extra);
    TestApp { router, state }
}

/// Cookies as a browser would hold them after a response.
#[derive(Clone, Debug, Default)]
pub struct Session {
    pub cookies: HashMap<String, String>,
}

impl Session {
    pub fn absorb(&mut self, response: &Response<Body>) {
        for value in response.headers().get_all(header::SET_COOKIE) {
            let raw = value.to_str().unwrap();
            let pair = raw.split(';').next().unwrap();
            let (name, value) = pair.split_once('=').unwrap();
            if value.is_empty() {
                self.cookies.remove(name);
            } else {
                self.cookies.insert(name.to_string(), value.to_string());
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }

    pub fn access_token(&self) -> &str {
        self.get("accessToken").expect("access cookie")
    }

    pub fn refresh_token(&self) -> &str {
        self.get("refreshToken").expect("refresh cookie")
    }

    pub fn csrf(&self) -> &str {
        self.get("XSRF-TOKEN").expect("csrf cookie")
    }

    pub fn cookie_header(&self) -> String {
        self.cookies
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

pub fn build(builder: axum::http::request::Builder, body: Option<&Value>) -> Request<Body> {
    match body {
        Some(body) => builder.body(Body::from(body.to_string())).unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

impl TestApp {
    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router.clone().oneshot(request).await.unwrap()
    }

    /// Request carrying the session cookies and, for unsafe methods, the CSRF header.
    pub async fn send_as(
        &self,
        session: &Session,
        method: &str,
        uri: &str,
        body: Option<Value>,
    ) -> Response<Body> {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::COOKIE, session.cookie_header());
        if method != "GET" {
            if let Some(csrf) = session.get("XSRF-TOKEN") {
                builder = builder.header("x-csrf-token", csrf);
            }
        }
        if body.is_some() {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
        }
        self.send(build(builder, body.as_ref())).await
    }

    pub async fn post_json(&self, uri: &str, body: Value) -> Response<Body> {
        let request = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        self.send(request).await
    }

    pub async fn post_json_from(&self, ip: &str, uri: &str, body: Value) -> Response<Body> {
        let addr: SocketAddr = format!("{ip}:40000").parse().unwrap();
        let mut request = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        request.extensions_mut().insert(ConnectInfo(addr));
        self.send(request).await
    }

    pub async fn get(&self, uri: &str) -> Response<Body> {
        self.send(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
    }

    pub async fn complete_setup(&self) {
        let response = self
            .post_json(
                "/api/auth/setup",
                json!({
                    "setupToken": SETUP_TOKEN,
                    "email": ADMIN_EMAIL,
                    "name": "Owner",
                    "password": ADMIN_PASSWORD,
                }),
            )
            .await;
        assert_eq!(response.status(), StatusCode::CREATED);
    }

    pub async fn login(&self, email: &str, password: &str) -> (Response<Body>, Session) {
        let response = self
            .post_json(
                "/api/auth/login",
                json!({ "email": email, "password": password }),
            )
            .await;
        let mut session = Session::default();
        session.absorb(&response);
        (response, session)
    }

    pub async fn login_admin(&self) -> Session {
        self.complete_setup().await;
        let (response, session) = self.login(ADMIN_EMAIL, ADMIN_PASSWORD).await;
        assert_eq!(response.status(), StatusCode::OK);
        session
    }

    /// POST /api/auth/refresh with the given cookies; updates them from the response.
    pub async fn refresh(&self, session: &mut Session) -> Response<Body> {
        let response = self
            .send_as(session, "POST", "/api/auth/refresh", None)
            .await;
        session.absorb(&response);
        response
    }
}

pub async fn body_json(response: Response<Body>) -> Value {
    let body = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&body).unwrap()
}
