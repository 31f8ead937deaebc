//! HTTP surface tests driven through the router with `oneshot`.

mod common;

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode, header};
use serde_json::{Value, json};
use tower::ServiceExt;

use common::{FakeBehavior, TestEnv};
use media_fetch::api::jwt::JwtService;
use media_fetch::api::{ApiServer, ApiServerConfig, AppState};

const SECRET: &str = "integration-secret-32-characters!";

struct Harness {
    env: TestEnv,
    router: Router,
    jwt: Arc<JwtService>,
}

impl Harness {
    async fn new(behavior: FakeBehavior) -> Self {
        let env = TestEnv::new(behavior).await;
        let jwt = Arc::new(JwtService::new(SECRET, "media-fetch", "media-fetch-api", Some(3600)));
        let state = AppState::new(env.service.clone()).with_jwt_service(jwt.clone());
        let router = ApiServer::with_state(ApiServerConfig::default(), state).router();
        Self { env, router, jwt }
    }

    fn token(&self, user_id: &str, name: &str) -> String {
        self.jwt.generate_token(user_id, Some(name), vec![]).unwrap()
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    async fn get(&self, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
        let mut builder = Request::builder().uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        self.send(builder.body(Body::empty()).unwrap()).await
    }

    async fn post(&self, uri: &str, token: &str, body: Value) -> (StatusCode, Value) {
        let request = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {}", token))
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        self.send(request).await
    }
}

#[tokio::test]
async fn health_needs_no_token() {
    let h = Harness::new(FakeBehavior::Nothing).await;
    let (status, body) = h.get("/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["queue_running"], true);
}

#[tokio::test]
async fn api_rejects_missing_and_bad_tokens() {
    let h = Harness::new(FakeBehavior::Nothing).await;

    let (status, body) = h.get("/api/download_logs", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "UNAUTHORIZED");

    let (status, _) = h.get("/api/download_logs", Some("not-a-jwt")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let other = JwtService::new("a-different-secret-of-32-chars!!", "media-fetch", "media-fetch-api", None);
    let forged = other.generate_token("1", Some("alice"), vec![]).unwrap();
    let (status, _) = h.get("/api/download_logs", Some(&forged)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn submit_then_poll_until_success() {
    let h = Harness::new(FakeBehavior::Write(vec!["Sample.mp3", "Sample.webm"])).await;
    let token = h.token("1", "alice");

    let (status, body) = h
        .post(
            "/api/download",
            &token,
            json!({
                "url": "https://video.example.com/watch?v=abc",
                "format_code": "bestaudio_convert_mp3",
                "format_type": "audio"
            }),
        )
        .await;
    assert_eq!(status, StatusCode::ACCEPTED, "{}", body);
    let task_id = body["task_id"].as_str().unwrap().to_string();
    let log_id = body["log_id"].as_str().unwrap().to_string();

    let mut last = Value::Null;
    for _ in 0..500 {
        let (status, body) = h
            .get(&format!("/api/task_status/{}", task_id), Some(&token))
            .await;
        assert_eq!(status, StatusCode::OK);
        if body["status"] == "SUCCESS" || body["status"] == "FAILURE" {
            last = body;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(last["status"], "SUCCESS", "{}", last);
    assert_eq!(last["result"][0]["filename"], "Sample.mp3");

    h.env.wait_for_log(&log_id).await;
    let (status, log) = h
        .get(&format!("/api/download_logs/{}", log_id), Some(&token))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(log["status"], "SUCCESS");
    assert_eq!(log["result_manifest"][0]["filename"], "Sample.mp3");

    let (status, logs) = h.get("/api/download_logs?limit=5", Some(&token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(logs.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn submit_validates_the_body() {
    let h = Harness::new(FakeBehavior::Nothing).await;
    let token = h.token("1", "alice");

    let (status, body) = h
        .post("/api/download", &token, json!({ "url": "https://video.example.com/v" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Missing url, format_code, or format_type");

    let (status, body) = h
        .post(
            "/api/download",
            &token,
            json!({ "url": "ftp://example.com/v", "format_code": "best", "format_type": "video" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn get_formats_lists_fixed_entries_first() {
    let h = Harness::new(FakeBehavior::Nothing).await;
    let token = h.token("1", "alice");

    let (status, body) = h
        .post(
            "/api/get_formats",
            &token,
            json!({ "url": "https://video.example.com/watch?v=abc" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let formats = body["formats"].as_array().unwrap();
    assert_eq!(
        formats[0]["code"],
        "bestvideo[ext=mp4]+bestaudio[ext=m4a]/best[ext=mp4]/best"
    );
    assert_eq!(formats[0]["type"], "video");

    let (status, body) = h
        .post(
            "/api/get_formats",
            &token,
            json!({ "url": "https://video.example.com/unsupported" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "EXTRACTOR_ERROR");
}

#[tokio::test]
async fn logs_of_other_users_are_hidden() {
    let h = Harness::new(FakeBehavior::Block).await;
    let alice = h.token("1", "alice");
    let bob = h.token("2", "bob");

    let (_, body) = h
        .post(
            "/api/download",
            &alice,
            json!({
                "url": "https://video.example.com/watch?v=abc",
                "format_code": "best",
                "format_type": "video"
            }),
        )
        .await;
    let log_id = body["log_id"].as_str().unwrap().to_string();
    let task_id = body["task_id"].as_str().unwrap().to_string();

    let (status, _) = h
        .get(&format!("/api/download_logs/{}", log_id), Some(&bob))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, logs) = h.get("/api/download_logs", Some(&bob)).await;
    assert!(logs.as_array().unwrap().is_empty());

    let (status, _) = h
        .post(&format!("/api/task_status/{}/revoke", task_id), &bob, json!({}))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = h
        .post(&format!("/api/task_status/{}/revoke", task_id), &alice, json!({}))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "REVOKED");
}
