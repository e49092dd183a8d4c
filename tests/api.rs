use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use friendchat::{app, store::Store, AppState, Config};
use serde_json::{json, Value};
use tower::ServiceExt;

async fn server() -> Router {
    let store = Store::memory().await.unwrap();
    app(AppState::new(store), &Config::default())
}

async fn call(app: &Router, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
    let mut request = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        request = request.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    let request = match body {
        Some(body) => request
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => request.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap() };
    (status, value)
}

async fn register(app: &Router, username: &str) -> (String, String) {
    let (status, body) = call(
        app,
        Method::POST,
        "/register",
        None,
        Some(json!({ "username": username, "firstName": username, "lastName": "Test" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    (
        body["token"].as_str().unwrap().to_owned(),
        body["user"]["id"].as_str().unwrap().to_owned(),
    )
}

async fn befriend(app: &Router, a: &str, b: &str, b_name: &str) {
    let (status, body) = call(app, Method::POST, "/friends/requests", Some(a), Some(json!({ "username": b_name }))).await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    let request_id = body["requestId"].as_str().unwrap().to_owned();
    let (status, _) = call(app, Method::POST, &format!("/friends/requests/{request_id}/accept"), Some(b), None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn health_reports_ok() {
    let app = server().await;
    let (status, body) = call(&app, Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["onlineUsers"], 0);
}

#[tokio::test]
async fn anonymous_calls_are_rejected() {
    let app = server().await;
    let (status, body) = call(&app, Method::GET, "/friends", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "authentication");
    assert_eq!(body["retryable"], false);

    let (status, _) = call(&app, Method::GET, "/friends", Some("forged"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = call(&app, Method::GET, "/ws", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn friend_request_lifecycle() {
    let app = server().await;
    let (alice, _) = register(&app, "alice").await;
    let (bob, bob_id) = register(&app, "bob").await;

    let (status, body) = call(&app, Method::POST, "/friends/requests", Some(&alice), Some(json!({ "username": "bob" }))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["targetUser"]["id"], bob_id);
    let request_id = body["requestId"].as_str().unwrap().to_owned();

    let (status, body) = call(&app, Method::POST, "/friends/requests", Some(&bob), Some(json!({ "username": "alice" }))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "conflict");

    let (_, body) = call(&app, Method::GET, "/friends/requests", Some(&bob), None).await;
    assert_eq!(body["incoming"].as_array().unwrap().len(), 1);
    assert_eq!(body["incoming"][0]["id"], request_id);

    let (status, body) = call(&app, Method::POST, &format!("/friends/requests/{request_id}/accept"), Some(&bob), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["action"], "accepted");

    let (_, friends) = call(&app, Method::GET, "/friends", Some(&alice), None).await;
    assert_eq!(friends[0]["id"], bob_id);

    let (status, _) = call(&app, Method::DELETE, &format!("/friends/requests/{request_id}"), Some(&alice), None).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = call(&app, Method::DELETE, &format!("/friends/{bob_id}"), Some(&alice), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (_, friends) = call(&app, Method::GET, "/friends", Some(&alice), None).await;
    assert_eq!(friends, json!([]));
}

#[tokio::test]
async fn self_and_unknown_requests_fail() {
    let app = server().await;
    let (alice, _) = register(&app, "alice").await;

    let (status, body) = call(&app, Method::POST, "/friends/requests", Some(&alice), Some(json!({ "username": "alice" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation");

    let (status, _) = call(&app, Method::POST, "/friends/requests", Some(&alice), Some(json!({ "username": "ghost" }))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn messaging_requires_friendship() {
    let app = server().await;
    let (alice, _) = register(&app, "alice").await;
    let (_, bob_id) = register(&app, "bob").await;

    let (status, body) = call(
        &app,
        Method::POST,
        "/chat/messages",
        Some(&alice),
        Some(json!({ "receiverId": bob_id, "content": "hi" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "authorization");

    let (status, _) = call(&app, Method::GET, &format!("/chat/conversations/{bob_id}"), Some(&alice), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn offline_message_waits_in_history() {
    let app = server().await;
    let (alice, alice_id) = register(&app, "alice").await;
    let (bob, bob_id) = register(&app, "bob").await;
    befriend(&app, &alice, &bob, "bob").await;

    for content in ["one", "two", "three"] {
        let (status, body) = call(
            &app,
            Method::POST,
            "/chat/messages",
            Some(&alice),
            Some(json!({ "receiverId": bob_id, "content": content })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["status"], "sent");
        assert_eq!(body["message"]["isRead"], false);
    }

    let (_, body) = call(&app, Method::GET, "/chat/unread-count", Some(&bob), None).await;
    assert_eq!(body["count"], 3);

    let (_, conversations) = call(&app, Method::GET, "/chat/conversations", Some(&bob), None).await;
    assert_eq!(conversations[0]["friend"]["id"], alice_id);
    assert_eq!(conversations[0]["unreadCount"], 3);
    assert_eq!(conversations[0]["lastMessage"]["content"], "three");

    let (status, page) = call(&app, Method::GET, &format!("/chat/conversations/{alice_id}?limit=2"), Some(&bob), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["hasMore"], true);
    assert_eq!(page["messages"][0]["content"], "two");
    assert_eq!(page["messages"][1]["content"], "three");

    // opening the conversation read it
    let (_, body) = call(&app, Method::GET, "/chat/unread-count", Some(&bob), None).await;
    assert_eq!(body["count"], 0);
}

#[tokio::test]
async fn deleted_message_stays_resolvable() {
    let app = server().await;
    let (alice, _) = register(&app, "alice").await;
    let (bob, bob_id) = register(&app, "bob").await;
    befriend(&app, &alice, &bob, "bob").await;

    let (_, body) = call(
        &app,
        Method::POST,
        "/chat/messages",
        Some(&alice),
        Some(json!({ "receiverId": bob_id, "content": "regret" })),
    )
    .await;
    let message_id = body["message"]["id"].as_str().unwrap().to_owned();

    let (status, _) = call(&app, Method::DELETE, &format!("/chat/messages/{message_id}"), Some(&bob), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = call(&app, Method::DELETE, &format!("/chat/messages/{message_id}"), Some(&alice), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["messageId"], message_id);

    let (_, body) = call(&app, Method::GET, "/chat/unread-count", Some(&bob), None).await;
    assert_eq!(body["count"], 0);

    let (status, body) = call(&app, Method::GET, &format!("/chat/messages/{message_id}"), Some(&bob), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["isDeleted"], true);
    assert_eq!(body["content"], "");
}

#[tokio::test]
async fn login_opens_a_cookie_session() {
    let app = server().await;
    let (token, user_id) = register(&app, "alice").await;

    let request = Request::builder()
        .method(Method::POST)
        .uri("/login")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(json!({ "token": token }).to_string()))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .unwrap()
        .to_str()
        .unwrap()
        .split(';')
        .next()
        .unwrap()
        .to_owned();

    let request = Request::builder()
        .uri("/me")
        .header(header::COOKIE, &cookie)
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let me: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(me["id"], user_id);

    let (status, _) = call(&app, Method::POST, "/login", None, Some(json!({ "token": "bogus" }))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn duplicate_username_is_a_conflict() {
    let app = server().await;
    register(&app, "alice").await;

    let (status, body) = call(
        &app,
        Method::POST,
        "/register",
        None,
        Some(json!({ "username": "alice", "firstName": "Other", "lastName": "Alice" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "conflict");
}

#[tokio::test]
async fn profiles_need_friendship() {
    let app = server().await;
    let (alice, alice_id) = register(&app, "alice").await;
    let (bob, _) = register(&app, "bob").await;
    let (carol, _) = register(&app, "carol").await;
    befriend(&app, &alice, &bob, "bob").await;

    let (status, body) = call(&app, Method::PATCH, "/me", Some(&alice), Some(json!({ "bio": "hi there" }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["bio"], "hi there");

    let (status, body) = call(&app, Method::PATCH, "/me", Some(&alice), Some(json!({ "firstName": "" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation");

    let (status, body) = call(&app, Method::GET, &format!("/users/{alice_id}"), Some(&bob), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["bio"], "hi there");
    assert_eq!(body["firstName"], "alice");

    let (status, body) = call(&app, Method::GET, &format!("/users/{alice_id}"), Some(&carol), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "authorization");

    let (_, body) = call(&app, Method::GET, "/me", Some(&alice), None).await;
    assert_eq!(body["id"], alice_id);
}
