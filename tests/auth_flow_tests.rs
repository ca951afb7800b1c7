mod common;

use axum::{
    body::Body,
    http::{Request, StatusCode, header},
};
use common::{
    ADMIN_EMAIL, ADMIN_PASSWORD, SETUP_TOKEN, STRONG_PASSWORD, Session, body_json, spawn_app,
};
use serde_json::json;

#[tokio::test]
async fn test_setup_flow() {
    let app = spawn_app().await;

    let response = app.get("/api/auth/setup-status").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["data"]["setupRequired"], true);

    let attempt = |token: &'static str, email: &'static str, password: &'static str| {
        json!({ "setupToken": token, "email": email, "password": password })
    };

    let response = app
        .post_json(
            "/api/auth/setup",
            attempt(
                "wrong-token-wrong-token-wrong-token-0000",
                ADMIN_EMAIL,
                ADMIN_PASSWORD,
            ),
        )
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(body_json(response).await["error"], "Invalid setup credentials");

    let response = app
        .post_json(
            "/api/auth/setup",
            attempt(SETUP_TOKEN, "intruder@example.com", ADMIN_PASSWORD),
        )
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .post_json("/api/auth/setup", attempt("short", ADMIN_EMAIL, ADMIN_PASSWORD))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["success"], false);
    assert!(body["errors"]["setupToken"].is_string());

    let response = app
        .post_json("/api/auth/setup", attempt(SETUP_TOKEN, ADMIN_EMAIL, "weakpass"))
        .await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    // Email comparison ignores case and surrounding whitespace.
    let response = app
        .post_json(
            "/api/auth/setup",
            attempt(SETUP_TOKEN, " Owner@Example.com ", ADMIN_PASSWORD),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(body_json(response).await["data"]["setupCompleted"], true);

    let response = app.get("/api/auth/setup-status").await;
    assert_eq!(body_json(response).await["data"]["setupRequired"], false);

    let response = app
        .post_json("/api/auth/setup", attempt(SETUP_TOKEN, ADMIN_EMAIL, ADMIN_PASSWORD))
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(body_json(response).await["error"], "Setup already completed");
}

#[tokio::test]
async fn test_login_sets_cookies_and_resolves_me() {
    let app = spawn_app().await;
    app.complete_setup().await;

    let (response, session) = app.login(ADMIN_EMAIL, ADMIN_PASSWORD).await;
    assert_eq!(response.status(), StatusCode::OK);

    let cookies: Vec<String> = response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .map(|v| v.to_str().unwrap().to_string())
        .collect();
    assert!(cookies.iter().any(|c| c.starts_with("accessToken=") && c.contains("HttpOnly") && c.contains("Path=/api")));
    assert!(cookies.iter().any(|c| c.starts_with("refreshToken=") && c.contains("Path=/api/auth")));
    assert!(cookies.iter().any(|c| c.starts_with("XSRF-TOKEN=") && !c.contains("HttpOnly")));

    let body = body_json(response).await;
    assert_eq!(body["data"]["user"]["email"], ADMIN_EMAIL);
    assert_eq!(body["data"]["user"]["role"], "ADMIN");
    assert!(body["data"]["user"].get("passwordHash").is_none());

    let response = app.send_as(&session, "GET", "/api/auth/me", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["data"]["name"], "Owner");

    let response = app
        .send(
            Request::builder()
                .uri("/api/auth/me")
                .header(header::AUTHORIZATION, format!("Bearer {}", session.access_token()))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app.get("/api/auth/me").await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await["error"], "Unauthenticated");

    // Access tokens are not refresh tokens and vice versa.
    let response = app
        .send(
            Request::builder()
                .uri("/api/auth/me")
                .header(header::AUTHORIZATION, format!("Bearer {}", session.refresh_token()))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_repeated_failures_lock_account_and_throttle() {
    let app = spawn_app().await;
    app.complete_setup().await;

    for _ in 0..5 {
        let (response, _) = app.login(ADMIN_EMAIL, "Wrong!Passw0rd").await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_json(response).await["error"], "Invalid credentials");
    }

    let (response, _) = app.login(ADMIN_EMAIL, ADMIN_PASSWORD).await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(response.headers().contains_key(header::RETRY_AFTER));
    assert_eq!(
        body_json(response).await["error"],
        "Too many login attempts, try again later"
    );

    // With the limiter cleared the persisted lock still refuses the right
    // password, and the answer is indistinguishable from a wrong one.
    app.state.limiters().reset();
    let (response, session) = app.login(ADMIN_EMAIL, ADMIN_PASSWORD).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await["error"], "Invalid credentials");
    assert!(session.get("accessToken").is_none());

    // The attempt made while locked did not count as a new failure.
    let user = app
        .state
        .store()
        .users()
        .find_by_email(ADMIN_EMAIL)
        .await
        .unwrap()
        .unwrap();
    assert!(user.lock_until.is_some());
    assert_eq!(user.failed_login_count, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_failures_still_lock_account() {
    let app = spawn_app().await;
    app.complete_setup().await;

    let mut handles = Vec::new();
    for i in 0..5 {
        let router = app.router.clone();
        handles.push(tokio::spawn(async move {
            use tower::ServiceExt;
            let addr: std::net::SocketAddr = format!("198.51.100.{}:4000", i + 1).parse().unwrap();
            let mut request = Request::builder()
                .method("POST")
                .uri("/api/auth/login")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(
                    json!({ "email": ADMIN_EMAIL, "password": "Wrong!Passw0rd" }).to_string(),
                ))
                .unwrap();
            request
                .extensions_mut()
                .insert(axum::extract::ConnectInfo(addr));
            router.oneshot(request).await.unwrap().status()
        }));
    }
    for handle in handles {
        assert_eq!(handle.await.unwrap(), StatusCode::UNAUTHORIZED);
    }

    let user = app
        .state
        .store()
        .users()
        .find_by_email(ADMIN_EMAIL)
        .await
        .unwrap()
        .unwrap();
    assert!(user.lock_until.is_some(), "count {}", user.failed_login_count);
    assert_eq!(user.failed_login_count, 0);
}

#[tokio::test]
async fn test_unknown_email_is_generic_failure() {
    let app = spawn_app().await;
    app.complete_setup().await;

    let (response, _) = app.login("nobody@example.com", ADMIN_PASSWORD).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await["error"], "Invalid credentials");

    let response = app
        .post_json("/api/auth/login", json!({ "email": "not-an-email", "password": "" }))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert!(body["errors"]["email"].is_string());
    assert!(body["errors"]["password"].is_string());
}

#[tokio::test]
async fn test_ip_limiter_counts_every_attempt() {
    let app = spawn_app().await;
    app.complete_setup().await;

    for i in 0..3 {
        let response = app
            .post_json_from(
                "203.0.113.7",
                "/api/auth/login",
                json!({ "email": format!("stranger{i}@example.com"), "password": "Wrong!Passw0rd" }),
            )
            .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    // Successful logins use up the same budget.
    for _ in 0..2 {
        let response = app
            .post_json_from(
                "203.0.113.7",
                "/api/auth/login",
                json!({ "email": ADMIN_EMAIL, "password": ADMIN_PASSWORD }),
            )
            .await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response = app
        .post_json_from(
            "203.0.113.7",
            "/api/auth/login",
            json!({ "email": ADMIN_EMAIL, "password": ADMIN_PASSWORD }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(response.headers().contains_key(header::RETRY_AFTER));

    let response = app
        .post_json_from(
            "198.51.100.20",
            "/api/auth/login",
            json!({ "email": ADMIN_EMAIL, "password": ADMIN_PASSWORD }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_csrf_required_for_cookie_auth() {
    let app = spawn_app().await;
    let session = app.login_admin().await;

    let new_user = json!({
        "name": "Alice",
        "email": "alice@example.com",
        "role": "STAFF",
    });

    let mut forged = session.clone();
    forged.cookies.insert("XSRF-TOKEN".to_string(), "attacker".to_string());
    let response = app
        .send(
            Request::builder()
                .method("POST")
                .uri("/api/users")
                .header(header::COOKIE, session.cookie_header())
                .header("x-csrf-token", forged.csrf())
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(new_user.to_string()))
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(body_json(response).await["error"], "CSRF validation failed");

    let response = app
        .send(
            Request::builder()
                .method("POST")
                .uri("/api/auth/refresh")
                .header(header::COOKIE, session.cookie_header())
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    // Safe methods pass without the header.
    let response = app
        .send(
            Request::builder()
                .uri("/api/users")
                .header(header::COOKIE, session.cookie_header())
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    // Bearer credentials cannot be attached cross-site, so no double-submit.
    let response = app
        .send(
            Request::builder()
                .method("POST")
                .uri("/api/users")
                .header(header::AUTHORIZATION, format!("Bearer {}", session.access_token()))
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(new_user.to_string()))
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
}

#[tokio::test]
async fn test_change_password_bumps_generation() {
    let app = spawn_app().await;
    let session = app.login_admin().await;
    let old = session.clone();

    let response = app
        .send_as(
            &session,
            "POST",
            "/api/auth/change-password",
            Some(json!({ "oldPassword": "Not!ThePassw0rd", "newPassword": STRONG_PASSWORD })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body_json(response).await["error"], "Current password is incorrect");

    let response = app
        .send_as(
            &session,
            "POST",
            "/api/auth/change-password",
            Some(json!({ "oldPassword": ADMIN_PASSWORD, "newPassword": "short" })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let response = app
        .send_as(
            &session,
            "POST",
            "/api/auth/change-password",
            Some(json!({ "oldPassword": ADMIN_PASSWORD, "newPassword": STRONG_PASSWORD })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let mut fresh = Session::default();
    fresh.absorb(&response);
    assert_eq!(body_json(response).await["data"]["user"]["mustChangePassword"], false);

    // The old access token carries the previous generation.
    let response = app.send_as(&old, "GET", "/api/auth/me", None).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app.send_as(&fresh, "GET", "/api/auth/me", None).await;
    assert_eq!(response.status(), StatusCode::OK);

    let mut stale = old.clone();
    let response = app.refresh(&mut stale).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let (response, _) = app.login(ADMIN_EMAIL, STRONG_PASSWORD).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_logout_revokes_session_and_clears_cookies() {
    let app = spawn_app().await;
    let session = app.login_admin().await;

    let response = app
        .send_as(&session, "POST", "/api/auth/logout", None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let mut after = session.clone();
    after.absorb(&response);
    assert!(after.get("accessToken").is_none());
    assert!(after.get("refreshToken").is_none());
    assert_eq!(body_json(response).await["data"]["loggedOut"], true);

    let mut replay = session.clone();
    let response = app.refresh(&mut replay).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .send(
            Request::builder()
                .method("POST")
                .uri("/api/auth/logout")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    // No cookies means no CSRF pair either.
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_health_and_security_headers() {
    let app = spawn_app().await;

    let response = app.get("/api/health").await;
    assert_eq!(response.status(), StatusCode::OK);
    let headers = response.headers().clone();
    assert_eq!(headers["x-content-type-options"], "nosniff");
    assert_eq!(headers["x-frame-options"], "DENY");
    assert!(headers.contains_key("referrer-policy"));
    assert_eq!(body_json(response).await["data"]["status"], "ok");
}
