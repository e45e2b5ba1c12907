use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use httpmock::Method::POST;
use httpmock::MockServer;
use serde_json::{json, Value};
use tempfile::tempdir;
use tower::ServiceExt;

use wayfarer::config::{AiConfig, CloudStoreConfig, Config, MapConfig, VoiceConfig};
use wayfarer::providers::{LocalStore, OpenAiProvider};
use wayfarer::server::{build_router, AppState};

fn test_config(server: &MockServer) -> Config {
    Config {
        secret_key: "test-secret".to_string(),
        ai: AiConfig {
            api_key: "test-key".to_string(),
            model: "test-model".to_string(),
            base_url: Some(server.base_url()),
        },
        voice: VoiceConfig {
            app_id: "voice-app".to_string(),
            api_key: "voice-key".to_string(),
            api_secret: "voice-secret".to_string(),
        },
        map: MapConfig {
            api_key: "map-key".to_string(),
            secret_key: "map-secret".to_string(),
        },
        cloud: CloudStoreConfig {
            url: String::new(),
            key: String::new(),
        },
    }
}

async fn make_app(server: &MockServer, dir: &tempfile::TempDir) -> Router {
    let config = test_config(server);
    let db_path = dir.path().join("server-test.db");
    let storage = Arc::new(
        LocalStore::new(db_path.to_string_lossy().to_string())
            .await
            .unwrap(),
    );
    let llm = Arc::new(OpenAiProvider::new(
        config.ai.api_key.clone(),
        config.ai.model.clone(),
        config.ai.base_url.clone(),
    ));
    build_router(AppState::new(&config, storage, llm))
}

async fn mock_chat(server: &MockServer, content: &str) {
    let content = content.to_string();
    server
        .mock_async(move |when, then| {
            when.method(POST).path("/chat/completions");
            then.status(200).json_body(json!({
                "id": "chatcmpl-test",
                "object": "chat.completion",
                "created": 1,
                "model": "test-model",
                "choices": [{
                    "index": 0,
                    "message": {"role": "assistant", "content": content},
                    "finish_reason": "stop"
                }]
            }));
        })
        .await;
}

fn post_json(uri: &str, cookie: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(cookie) = cookie {
        builder = builder.header("cookie", cookie);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn get_request(uri: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header("cookie", cookie);
    }
    builder.body(Body::empty()).unwrap()
}

fn delete_request(uri: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("DELETE").uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header("cookie", cookie);
    }
    builder.body(Body::empty()).unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

async fn register_and_login(app: &Router, username: &str, email: &str) -> String {
    let response = app
        .clone()
        .oneshot(post_json(
            "/register",
            None,
            json!({"username": username, "email": email, "password": "pw1"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(post_json(
            "/login",
            None,
            json!({"username": username, "password": "pw1"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .expect("login should set a session cookie")
        .to_str()
        .unwrap();
    cookie.split(';').next().unwrap().to_string()
}

#[tokio::test]
async fn pages_and_public_config_need_no_session() {
    let server = MockServer::start_async().await;
    let dir = tempdir().unwrap();
    let app = make_app(&server, &dir).await;

    let response = app.clone().oneshot(get_request("/", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(get_request("/login", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(get_request("/api/voice-config", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let value = body_json(response).await;
    assert_eq!(value["app_id"], "voice-app");
    assert_eq!(value["api_key"], "voice-key");
    assert!(value.get("api_secret").is_none());

    let response = app
        .clone()
        .oneshot(get_request("/api/map-config", None))
        .await
        .unwrap();
    let value = body_json(response).await;
    assert_eq!(value["amap_key"], "map-key");
    assert_eq!(value["amap_secret"], "map-secret");

    let response = app
        .clone()
        .oneshot(get_request("/api/voice-signature", None))
        .await
        .unwrap();
    let value = body_json(response).await;
    assert!(value["ts"].as_str().unwrap().parse::<i64>().is_ok());
    assert!(!value["signa"].as_str().unwrap().is_empty());
}

#[tokio::test]
async fn anonymous_requests_are_rejected() {
    let server = MockServer::start_async().await;
    let dir = tempdir().unwrap();
    let app = make_app(&server, &dir).await;

    let response = app
        .clone()
        .oneshot(get_request("/api/my-plans", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .clone()
        .oneshot(post_json("/api/generate-plan", None, json!({"input": "x"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .clone()
        .oneshot(get_request("/planner", None))
        .await
        .unwrap();
    assert!(response.status().is_redirection());

    // A forged cookie is as anonymous as none at all.
    let response = app
        .clone()
        .oneshot(get_request(
            "/api/my-plans",
            Some("wayfarer_session=forged-token"),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn login_rejects_bad_credentials_and_duplicates_report() {
    let server = MockServer::start_async().await;
    let dir = tempdir().unwrap();
    let app = make_app(&server, &dir).await;

    register_and_login(&app, "alice", "a@x.com").await;

    let response = app
        .clone()
        .oneshot(post_json(
            "/register",
            None,
            json!({"username": "alice", "email": "b@x.com", "password": "pw2"}),
        ))
        .await
        .unwrap();
    let value = body_json(response).await;
    assert_eq!(value["success"], false);
    assert!(value["message"].as_str().unwrap().contains("already"));

    let response = app
        .clone()
        .oneshot(post_json(
            "/login",
            None,
            json!({"username": "alice", "password": "wrong"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn full_plan_lifecycle() {
    let server = MockServer::start_async().await;
    mock_chat(
        &server,
        r#"{"destination": "Kyoto", "duration": "3", "tips": ["carry cash"]}"#,
    )
    .await;
    let dir = tempdir().unwrap();
    let app = make_app(&server, &dir).await;

    let alice = register_and_login(&app, "alice", "a@x.com").await;
    let bob = register_and_login(&app, "bob", "b@x.com").await;

    // Generate and persist a plan for Alice.
    let response = app
        .clone()
        .oneshot(post_json(
            "/api/generate-plan",
            Some(&alice),
            json!({"input": "three days in Kyoto"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let value = body_json(response).await;
    assert_eq!(value["success"], true);
    assert_eq!(value["plan"]["destination"], "Kyoto");
    let plan_id = value["plan_id"].as_i64().unwrap();

    let response = app
        .clone()
        .oneshot(get_request("/api/my-plans", Some(&alice)))
        .await
        .unwrap();
    let value = body_json(response).await;
    assert_eq!(value["plans"][0]["title"], "Kyoto");

    let response = app
        .clone()
        .oneshot(get_request(&format!("/api/plan/{plan_id}"), Some(&alice)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let value = body_json(response).await;
    assert_eq!(value["plan"]["plan_data"]["destination"], "Kyoto");

    // Bob sees, deletes, and appends nothing.
    let response = app
        .clone()
        .oneshot(get_request(&format!("/api/plan/{plan_id}"), Some(&bob)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app
        .clone()
        .oneshot(delete_request(&format!("/api/plan/{plan_id}"), Some(&bob)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app
        .clone()
        .oneshot(post_json(
            "/api/expense",
            Some(&bob),
            json!({"plan_id": plan_id, "expense": {
                "category": "food", "amount": 10.0, "date": "2026-05-01"
            }}),
        ))
        .await
        .unwrap();
    let value = body_json(response).await;
    assert_eq!(value["success"], false);

    // Alice records an expense and asks for an analysis.
    let response = app
        .clone()
        .oneshot(post_json(
            "/api/expense",
            Some(&alice),
            json!({"plan_id": plan_id, "expense": {
                "category": "food", "amount": 25.5, "date": "2026-05-01",
                "description": "ramen"
            }}),
        ))
        .await
        .unwrap();
    let value = body_json(response).await;
    assert_eq!(value["success"], true);

    let response = app
        .clone()
        .oneshot(post_json(
            "/api/analyze-budget",
            Some(&alice),
            json!({"plan_id": plan_id, "budget": 1000.0}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let value = body_json(response).await;
    assert_eq!(value["success"], true);
    assert!(!value["analysis"].as_str().unwrap().is_empty());

    // Delete and verify it is gone.
    let response = app
        .clone()
        .oneshot(delete_request(&format!("/api/plan/{plan_id}"), Some(&alice)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(get_request(&format!("/api/plan/{plan_id}"), Some(&alice)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn model_failure_still_returns_a_saved_plan() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/chat/completions");
            then.status(500).body("upstream exploded");
        })
        .await;
    let dir = tempdir().unwrap();
    let app = make_app(&server, &dir).await;

    let alice = register_and_login(&app, "alice", "a@x.com").await;
    let response = app
        .clone()
        .oneshot(post_json(
            "/api/generate-plan",
            Some(&alice),
            json!({"input": "anywhere"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let value = body_json(response).await;
    assert_eq!(value["success"], true);
    assert_eq!(value["plan"]["destination"], "unknown");
    assert!(value["plan"]["error"].as_str().is_some());

    // The degraded plan is persisted like any other.
    let plan_id = value["plan_id"].as_i64().unwrap();
    let response = app
        .clone()
        .oneshot(get_request(&format!("/api/plan/{plan_id}"), Some(&alice)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn logout_clears_the_session_cookie() {
    let server = MockServer::start_async().await;
    let dir = tempdir().unwrap();
    let app = make_app(&server, &dir).await;

    register_and_login(&app, "alice", "a@x.com").await;
    let response = app
        .clone()
        .oneshot(get_request("/logout", None))
        .await
        .unwrap();
    assert!(response.status().is_redirection());
    let cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .unwrap()
        .to_str()
        .unwrap();
    assert!(cookie.contains("Max-Age=0"));
}
