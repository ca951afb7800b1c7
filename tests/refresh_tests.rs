mod common;

use axum::http::StatusCode;
use common::{body_json, spawn_app};
use gatehouse::entities::audit_logs;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, QueryOrder};

async fn reuse_events(app: &common::TestApp) -> Vec<audit_logs::Model> {
    audit_logs::Entity::find()
        .filter(audit_logs::Column::ActionType.eq("TOKEN_REUSE_DETECTED"))
        .order_by_asc(audit_logs::Column::Id)
        .all(&app.state.store().conn)
        .await
        .unwrap()
}

#[tokio::test]
async fn test_refresh_rotates_session() {
    let app = spawn_app().await;
    let first = app.login_admin().await;

    let mut session = first.clone();
    let response = app.refresh(&mut session).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["data"]["user"]["role"], "ADMIN");

    assert_ne!(session.refresh_token(), first.refresh_token());
    assert_ne!(session.csrf(), first.csrf());

    // The rotated token keeps working, and so does the new access token.
    let response = app.send_as(&session, "GET", "/api/auth/me", None).await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app.refresh(&mut session).await;
    assert_eq!(response.status(), StatusCode::OK);

    let user = app
        .state
        .store()
        .users()
        .find_by_email(common::ADMIN_EMAIL)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        app.state
            .store()
            .sessions()
            .count_active_for_user(user.id)
            .await
            .unwrap(),
        1
    );
    assert!(reuse_events(&app).await.is_empty());
}

#[tokio::test]
async fn test_replayed_refresh_token_revokes_everything() {
    let app = spawn_app().await;
    let stolen = app.login_admin().await;

    // A second device, to prove containment is user-wide.
    let (response, mut laptop) = app
        .login(common::ADMIN_EMAIL, common::ADMIN_PASSWORD)
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let mut legit = stolen.clone();
    let response = app.refresh(&mut legit).await;
    assert_eq!(response.status(), StatusCode::OK);

    let mut attacker = stolen.clone();
    let response = app.refresh(&mut attacker).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await["error"], "Unauthenticated");
    assert!(attacker.get("refreshToken").is_none());

    // Every session of the user is gone, including the rotated one.
    let response = app.refresh(&mut legit).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let response = app.refresh(&mut laptop).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let events = reuse_events(&app).await;
    assert!(!events.is_empty());
    let after = events[0].after.clone().unwrap();
    assert_eq!(after["reason"], "REVOKED");
    assert!(after["revokedSessions"].as_u64().unwrap() >= 2);

    // Fresh credentials still work.
    let (response, _) = app
        .login(common::ADMIN_EMAIL, common::ADMIN_PASSWORD)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_garbage_refresh_token_is_plain_unauthenticated() {
    let app = spawn_app().await;
    let mut session = app.login_admin().await;
    session
        .cookies
        .insert("refreshToken".to_string(), "not-a-jwt".to_string());

    let response = app.refresh(&mut session).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(reuse_events(&app).await.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_refresh_has_one_winner() {
    let app = spawn_app().await;
    let session = app.login_admin().await;

    let mut handles = Vec::new();
    for _ in 0..2 {
        let router = app.router.clone();
        let cookies = session.cookie_header();
        let csrf = session.csrf().to_string();
        handles.push(tokio::spawn(async move {
            use tower::ServiceExt;
            let request = axum::http::Request::builder()
                .method("POST")
                .uri("/api/auth/refresh")
                .header(axum::http::header::COOKIE, cookies)
                .header("x-csrf-token", csrf)
                .body(axum::body::Body::empty())
                .unwrap();
            router.oneshot(request).await.unwrap().status()
        }));
    }

    let mut statuses = Vec::new();
    for handle in handles {
        statuses.push(handle.await.unwrap());
    }

    let ok = statuses.iter().filter(|s| **s == StatusCode::OK).count();
    let denied = statuses
        .iter()
        .filter(|s| **s == StatusCode::UNAUTHORIZED)
        .count();
    assert_eq!(ok, 1, "statuses: {statuses:?}");
    assert_eq!(denied, 1, "statuses: {statuses:?}");
    assert!(!reuse_events(&app).await.is_empty());

    // Containment also reaches the session the winner just opened.
    let user = app
        .state
        .store()
        .users()
        .find_by_email(common::ADMIN_EMAIL)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        app.state
            .store()
            .sessions()
            .count_active_for_user(user.id)
            .await
            .unwrap(),
        0
    );
}
