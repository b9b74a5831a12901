//! End-to-end flows over the account router: register, login, gated access,
//! refresh rotation, logout, channel profiles and watch history.

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, Response, StatusCode, header};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;

use vidtide_api::token::TokenService;
use vidtide_api::{AppState, AppStateInner, router};
use vidtide_db::models::NewUser;
use vidtide_db::{AccountStore, Database};
use vidtide_media::DiskMediaStore;

const BOUNDARY: &str = "vidtide-test-boundary";

struct TestApp {
    app: Router,
    db: Arc<Database>,
    _media_dir: tempfile::TempDir,
    _spool_dir: tempfile::TempDir,
}

async fn test_app() -> TestApp {
    test_app_with_access_ttl(3600).await
}

async fn test_app_with_access_ttl(access_ttl_secs: i64) -> TestApp {
    let db = Arc::new(Database::open_in_memory().unwrap());
    let media_dir = tempfile::tempdir().unwrap();
    let spool_dir = tempfile::tempdir().unwrap();

    let media = DiskMediaStore::new(media_dir.path().to_path_buf(), "/media")
        .await
        .unwrap();

    let state: AppState = Arc::new(AppStateInner {
        store: db.clone(),
        media: Arc::new(media),
        tokens: TokenService::new(
            "test-access-secret",
            "test-refresh-secret",
            access_ttl_secs,
            86400,
        ),
        spool_dir: spool_dir.path().to_path_buf(),
    });

    TestApp {
        app: router(state),
        db,
        _media_dir: media_dir,
        _spool_dir: spool_dir,
    }
}

fn multipart_body(fields: &[(&str, Option<&str>, &[u8])]) -> (String, Vec<u8>) {
    let mut body = Vec::new();
    for (name, filename, data) in fields {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        match filename {
            Some(f) => body.extend_from_slice(
                format!(
                    "Content-Disposition: form-data; name=\"{name}\"; filename=\"{f}\"\r\n\
                     Content-Type: application/octet-stream\r\n\r\n"
                )
                .as_bytes(),
            ),
            None => body.extend_from_slice(
                format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes(),
            ),
        }
        body.extend_from_slice(data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    (format!("multipart/form-data; boundary={BOUNDARY}"), body)
}

async fn register(app: &TestApp, handle: &str, email: &str, with_avatar: bool) -> Response<Body> {
    let mut fields: Vec<(&str, Option<&str>, &[u8])> = vec![
        ("displayName", None, b"Alice Example".as_slice()),
        ("email", None, email.as_bytes()),
        ("handle", None, handle.as_bytes()),
        ("password", None, b"correct-horse-battery".as_slice()),
    ];
    if with_avatar {
        fields.push(("avatar", Some("avatar.png"), b"fake avatar bytes".as_slice()));
    }
    let (content_type, body) = multipart_body(&fields);

    app.app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/register")
                .header(header::CONTENT_TYPE, content_type)
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap()
}

async fn post_json(app: &TestApp, uri: &str, body: Value) -> Response<Body> {
    app.app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap()
}

async fn get_with_bearer(app: &TestApp, uri: &str, token: &str) -> Response<Body> {
    app.app
        .clone()
        .oneshot(
            Request::builder()
                .method("GET")
                .uri(uri)
                .header(header::AUTHORIZATION, format!("Bearer {token}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap()
}

async fn body_json(response: Response<Body>) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

async fn login(app: &TestApp, identifier: &str, password: &str) -> (StatusCode, Value) {
    let response = post_json(
        app,
        "/login",
        json!({ "identifier": identifier, "password": password }),
    )
    .await;
    let status = response.status();
    (status, body_json(response).await)
}

fn seed_user(db: &Database, handle: &str) -> String {
    let row = db
        .create_user(&NewUser {
            id: uuid_for(handle),
            handle: handle.to_string(),
            email: format!("{handle}@example.com"),
            display_name: format!("User {handle}"),
            password: "seed-hash".to_string(),
            avatar_url: format!("/media/{handle}.png"),
            cover_image_url: String::new(),
        })
        .unwrap();
    row.id
}

fn uuid_for(handle: &str) -> String {
    // Deterministic per-handle ids keep seeding readable.
    let mut bytes = [0u8; 16];
    for (i, b) in handle.bytes().enumerate().take(16) {
        bytes[i] = b;
    }
    uuid::Builder::from_random_bytes(bytes).into_uuid().to_string()
}

#[tokio::test]
async fn register_returns_sanitized_user() {
    let app = test_app().await;

    let response = register(&app, "Alice", "alice@example.com", true).await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let body = body_json(response).await;
    assert_eq!(body["status"], 201);

    let data = body["data"].as_object().unwrap();
    assert_eq!(data["handle"], "alice");
    assert_eq!(data["email"], "alice@example.com");
    assert!(data["avatar"].as_str().unwrap().starts_with("/media/"));
    assert!(!data.contains_key("password"));
    assert!(!data.contains_key("refreshToken"));
}

#[tokio::test]
async fn register_without_avatar_is_rejected() {
    let app = test_app().await;
    let response = register(&app, "alice", "alice@example.com", false).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn duplicate_handle_any_case_conflicts() {
    let app = test_app().await;
    assert_eq!(
        register(&app, "alice", "alice@example.com", true).await.status(),
        StatusCode::CREATED
    );
    assert_eq!(
        register(&app, "ALICE", "other@example.com", true).await.status(),
        StatusCode::CONFLICT
    );
}

#[tokio::test]
async fn duplicate_email_conflicts() {
    let app = test_app().await;
    register(&app, "alice", "alice@example.com", true).await;
    assert_eq!(
        register(&app, "bob", "alice@example.com", true).await.status(),
        StatusCode::CONFLICT
    );
}

#[tokio::test]
async fn login_sets_session_cookies_and_returns_tokens() {
    let app = test_app().await;
    register(&app, "alice", "alice@example.com", true).await;

    let response = post_json(
        &app,
        "/login",
        json!({ "identifier": "alice", "password": "correct-horse-battery" }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let cookies: Vec<String> = response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .map(|v| v.to_str().unwrap().to_string())
        .collect();
    assert!(cookies.iter().any(|c| c.starts_with("accessToken=")
        && c.contains("HttpOnly")
        && c.contains("Secure")));
    assert!(cookies.iter().any(|c| c.starts_with("refreshToken=")
        && c.contains("HttpOnly")
        && c.contains("Secure")));

    let body = body_json(response).await;
    assert!(body["data"]["accessToken"].is_string());
    assert!(body["data"]["refreshToken"].is_string());
    assert_eq!(body["data"]["user"]["handle"], "alice");
}

#[tokio::test]
async fn login_unknown_identity_is_not_found() {
    let app = test_app().await;
    let (status, _) = login(&app, "ghost", "whatever-pass").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn login_wrong_password_is_unauthorized() {
    let app = test_app().await;
    register(&app, "alice", "alice@example.com", true).await;
    let (status, _) = login(&app, "alice", "wrong-password").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn login_rejects_unknown_body_fields() {
    let app = test_app().await;
    let response = post_json(
        &app,
        "/login",
        json!({ "identifier": "alice", "password": "x", "admin": true }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn gated_endpoint_honors_and_rejects_tokens() {
    let app = test_app().await;
    register(&app, "alice", "alice@example.com", true).await;
    let (_, body) = login(&app, "alice", "correct-horse-battery").await;
    let token = body["data"]["accessToken"].as_str().unwrap();

    let response = get_with_bearer(&app, "/current-user", token).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["data"]["handle"], "alice");

    // No token at all.
    let response = app
        .app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/current-user")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // Garbage token.
    let response = get_with_bearer(&app, "/current-user", "not-a-jwt").await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn expired_access_token_is_rejected() {
    let app = test_app_with_access_ttl(-300).await;
    register(&app, "alice", "alice@example.com", true).await;
    let (_, body) = login(&app, "alice", "correct-horse-battery").await;
    let token = body["data"]["accessToken"].as_str().unwrap();

    let response = get_with_bearer(&app, "/current-user", token).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn refresh_rotates_and_detects_reuse() {
    let app = test_app().await;
    register(&app, "alice", "alice@example.com", true).await;
    let (_, body) = login(&app, "alice", "correct-horse-battery").await;
    let first = body["data"]["refreshToken"].as_str().unwrap().to_string();

    // Exchange the first token.
    let response = post_json(&app, "/refresh-token", json!({ "refreshToken": first })).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    let second = body["data"]["refreshToken"].as_str().unwrap().to_string();
    assert_ne!(first, second);

    // Replaying the rotated-away token must fail.
    let response = post_json(&app, "/refresh-token", json!({ "refreshToken": first })).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // The newest token still works.
    let response = post_json(&app, "/refresh-token", json!({ "refreshToken": second })).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn refresh_accepts_the_cookie_transport() {
    let app = test_app().await;
    register(&app, "alice", "alice@example.com", true).await;
    let (_, body) = login(&app, "alice", "correct-horse-battery").await;
    let refresh = body["data"]["refreshToken"].as_str().unwrap();

    let response = app
        .app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/refresh-token")
                .header(header::COOKIE, format!("refreshToken={refresh}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn logout_invalidates_outstanding_refresh_tokens() {
    let app = test_app().await;
    register(&app, "alice", "alice@example.com", true).await;
    let (_, body) = login(&app, "alice", "correct-horse-battery").await;
    let access = body["data"]["accessToken"].as_str().unwrap().to_string();
    let refresh = body["data"]["refreshToken"].as_str().unwrap().to_string();

    let response = app
        .app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/logout")
                .header(header::AUTHORIZATION, format!("Bearer {access}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // Both cookies are cleared.
    let cookies: Vec<String> = response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .map(|v| v.to_str().unwrap().to_string())
        .collect();
    assert!(cookies.iter().any(|c| c.starts_with("accessToken=")));
    assert!(cookies.iter().any(|c| c.starts_with("refreshToken=")));

    let response = post_json(&app, "/refresh-token", json!({ "refreshToken": refresh })).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn channel_profile_aggregates_counts_for_the_viewer() {
    let app = test_app().await;
    register(&app, "alice", "alice@example.com", true).await;
    let alice_id = app
        .db
        .find_by_handle_or_email("alice")
        .unwrap()
        .unwrap()
        .id;

    let creator = seed_user(&app.db, "creator");
    let sub_b = seed_user(&app.db, "subscriber-b");
    let sub_c = seed_user(&app.db, "subscriber-c");

    // Three subscribers, alice among them; creator follows two channels.
    app.db.add_subscription("s1", &alice_id, &creator).unwrap();
    app.db.add_subscription("s2", &sub_b, &creator).unwrap();
    app.db.add_subscription("s3", &sub_c, &creator).unwrap();
    app.db.add_subscription("s4", &creator, &sub_b).unwrap();
    app.db.add_subscription("s5", &creator, &sub_c).unwrap();

    let (_, body) = login(&app, "alice", "correct-horse-battery").await;
    let token = body["data"]["accessToken"].as_str().unwrap();

    let response = get_with_bearer(&app, "/c/creator", token).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["data"]["subscribersCount"], 3);
    assert_eq!(body["data"]["channelsSubscribedCount"], 2);
    assert_eq!(body["data"]["isSubscribed"], true);

    let response = get_with_bearer(&app, "/c/ghost", token).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn watch_history_is_ordered_with_owner_projection() {
    let app = test_app().await;
    register(&app, "alice", "alice@example.com", true).await;
    let alice_id = app
        .db
        .find_by_handle_or_email("alice")
        .unwrap()
        .unwrap()
        .id;

    let owner = seed_user(&app.db, "creator");
    app.db
        .insert_video("video-a", &owner, "First", "/media/a.mp4", "/media/a.png", 120)
        .unwrap();
    app.db
        .insert_video("video-b", &owner, "Second", "/media/b.mp4", "/media/b.png", 90)
        .unwrap();
    app.db.push_watch_history(&alice_id, "video-a").unwrap();
    app.db.push_watch_history(&alice_id, "video-b").unwrap();

    let (_, body) = login(&app, "alice", "correct-horse-battery").await;
    let token = body["data"]["accessToken"].as_str().unwrap();

    let response = get_with_bearer(&app, "/history", token).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;

    let history = body["data"].as_array().unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0]["title"], "First");
    assert_eq!(history[1]["title"], "Second");

    // Owner carries exactly the public projection.
    let owner = history[0]["owner"].as_object().unwrap();
    assert_eq!(owner["handle"], "creator");
    assert_eq!(owner["displayName"], "User creator");
    assert_eq!(owner["avatar"], "/media/creator.png");
    assert_eq!(owner.len(), 3);
}
