//! End-to-end calls through the HTTP router, in process.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use keeper_core::crypto::HashCost;
use keeper_core::{Clock, ManualClock, Repositories, SystemClock};
use keeper_server::config::ServerConfig;
use keeper_server::gateway;
use keeper_server::state::AppState;
use serde_json::{Value, json};
use tower::ServiceExt;

fn app_with_clock(clock: Arc<dyn Clock>) -> Router {
    let mut config = ServerConfig::default();
    config.hash_cost = HashCost {
        memory_kib: 8,
        iterations: 1,
    };
    let state = AppState::build(&config, Repositories::in_memory(), clock).unwrap();
    gateway::router(Arc::new(state))
}

fn app() -> Router {
    app_with_clock(Arc::new(SystemClock))
}

async fn call(app: &Router, method: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
    let mut request = Request::post(format!("/keeper.KeeperService/{method}"))
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        request = request.header("token", token);
    }
    let response = app
        .clone()
        .oneshot(request.body(Body::from(body.to_string())).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

async fn register(app: &Router, login: &str) -> String {
    let (status, body) = call(
        app,
        "Register",
        None,
        json!({"login": login, "password": "correct horse"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    body["token"].as_str().unwrap().to_owned()
}

fn item(name: &str, data: &str) -> Value {
    json!({
        "item": {
            "name": name,
            "type": "password",
            "data": data,
            "metadata": [{"key": "site", "value": "example.com"}]
        }
    })
}

#[tokio::test]
async fn register_login_and_item_lifecycle() {
    let app = app();
    let token = register(&app, "alice").await;
    assert!(token.starts_with("kpr_"));

    let (status, body) = call(
        &app,
        "Login",
        None,
        json!({"login": "alice", "password": "correct horse"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let token = body["token"].as_str().unwrap().to_owned();

    let (status, body) = call(&app, "CreateItem", Some(&token), item("mail", "AAEC")).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body, json!({}));

    let (status, body) = call(&app, "GetItem", Some(&token), json!({"name": "mail"})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["item"]["type"], "password");
    assert_eq!(body["item"]["data"], "AAEC");
    assert_eq!(body["item"]["metadata"][0]["value"], "example.com");

    let (status, _) = call(&app, "UpdateItem", Some(&token), item("mail", "AwQF")).await;
    assert_eq!(status, StatusCode::OK);
    let (_, body) = call(&app, "GetItem", Some(&token), json!({"name": "mail"})).await;
    assert_eq!(body["item"]["data"], "AwQF");

    call(&app, "CreateItem", Some(&token), item("bank", "AA==")).await;
    let (status, body) = call(&app, "ListItems", Some(&token), json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"names": ["bank", "mail"]}));

    let (status, _) = call(&app, "DeleteItem", Some(&token), json!({"name": "mail"})).await;
    assert_eq!(status, StatusCode::OK);
    let (status, body) = call(&app, "GetItem", Some(&token), json!({"name": "mail"})).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");
}

#[tokio::test]
async fn items_are_scoped_to_their_owner() {
    let app = app();
    let alice = register(&app, "alice").await;
    let bob = register(&app, "bob").await;

    call(&app, "CreateItem", Some(&alice), item("mail", "AAEC")).await;

    let (status, _) = call(&app, "GetItem", Some(&bob), json!({"name": "mail"})).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (_, body) = call(&app, "ListItems", Some(&bob), json!({})).await;
    assert_eq!(body, json!({"names": []}));

    // Same name in another namespace is fine.
    let (status, _) = call(&app, "CreateItem", Some(&bob), item("mail", "AAEC")).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn duplicates_conflict() {
    let app = app();
    let token = register(&app, "alice").await;

    let (status, body) = call(
        &app,
        "Register",
        None,
        json!({"login": "alice", "password": "another password"}),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "ALREADY_EXISTS");

    call(&app, "CreateItem", Some(&token), item("mail", "AAEC")).await;
    let (status, _) = call(&app, "CreateItem", Some(&token), item("mail", "AAEC")).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn validation_reports_every_field() {
    let app = app();
    let (status, body) = call(&app, "Register", None, json!({"login": "al", "password": "short"})).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_ARGUMENT");
    let fields: Vec<&str> = body["details"]
        .as_array()
        .unwrap()
        .iter()
        .map(|d| d["field"].as_str().unwrap())
        .collect();
    assert_eq!(fields, vec!["login", "password"]);
}

#[tokio::test]
async fn login_failures_look_identical() {
    let app = app();
    register(&app, "alice").await;

    let (s1, b1) = call(&app, "Login", None, json!({"login": "alice", "password": "wrong password"})).await;
    let (s2, b2) = call(&app, "Login", None, json!({"login": "nobody", "password": "wrong password"})).await;

    assert_eq!(s1, StatusCode::UNAUTHORIZED);
    assert_eq!(s2, StatusCode::UNAUTHORIZED);
    assert_eq!(b1, b2);
    assert_eq!(b1["message"], "invalid login or password");
}

#[tokio::test]
async fn protected_methods_need_a_token() {
    let app = app();

    let (status, body) = call(&app, "ListItems", None, json!({})).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "UNAUTHENTICATED");

    let (status, _) = call(&app, "ListItems", Some("kpr_forged"), json!({})).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn expired_token_stops_working() {
    let clock = Arc::new(ManualClock::default());
    let app = app_with_clock(clock.clone());
    let token = register(&app, "alice").await;

    let (status, _) = call(&app, "ListItems", Some(&token), json!({})).await;
    assert_eq!(status, StatusCode::OK);

    clock.advance(chrono::Duration::hours(24));

    for _ in 0..2 {
        let (status, _) = call(&app, "ListItems", Some(&token), json!({})).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
}

#[tokio::test]
async fn unknown_method_is_unimplemented() {
    let app = app();
    let (status, body) = call(&app, "DropDatabase", None, json!({})).await;
    assert_eq!(status, StatusCode::NOT_IMPLEMENTED);
    assert_eq!(body["code"], "UNIMPLEMENTED");
}

#[tokio::test]
async fn malformed_body_is_invalid_argument() {
    let app = app();
    let (status, body) = call(&app, "Login", None, json!({"login": 42})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_ARGUMENT");
}

#[tokio::test]
async fn responses_carry_hardening_headers() {
    let app = app();
    let response = app
        .oneshot(
            Request::post("/keeper.KeeperService/ListItems")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.headers()[header::X_CONTENT_TYPE_OPTIONS], "nosniff");
    assert_eq!(response.headers()[header::CACHE_CONTROL], "no-store");
}
