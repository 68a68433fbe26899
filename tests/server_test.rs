// HTTP surface tests driving the axum router directly with tower's oneshot.

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tower::ServiceExt;

use sommelier::cache::IdentificationCache;
use sommelier::config::EscalationConfig;
use sommelier::identify::{EscalationController, Tier, TierBinding};
use sommelier::providers::{
    Capability, CompletionOptions, CompletionResponse, ErrorKind, LlmProvider, ProviderError,
};
use sommelier::server::{create_router, AppState};
use sommelier::usage::{UsageHandle, UsageRecorder};

struct ScriptedProvider {
    replies: Mutex<VecDeque<Result<String, ErrorKind>>>,
}

impl ScriptedProvider {
    fn new(replies: Vec<Result<String, ErrorKind>>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
        })
    }

    fn next(&self) -> Result<CompletionResponse, ProviderError> {
        let reply = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .expect("scripted provider ran out of replies");
        match reply {
            Ok(content) => Ok(CompletionResponse {
                content,
                model: "scripted-model".to_string(),
                input_tokens: 100,
                output_tokens: 40,
                cost_usd: 0.001,
                latency_ms: 5,
            }),
            Err(kind) => Err(ProviderError::new(kind, "scripted failure")),
        }
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    async fn complete(
        &self,
        _prompt: &str,
        _opts: &CompletionOptions,
    ) -> Result<CompletionResponse, ProviderError> {
        self.next()
    }

    async fn complete_with_image(
        &self,
        _prompt: &str,
        _image: &[u8],
        _mime_type: &str,
        _opts: &CompletionOptions,
    ) -> Result<CompletionResponse, ProviderError> {
        self.next()
    }

    fn name(&self) -> &str {
        "scripted"
    }

    fn default_model(&self) -> &str {
        "scripted-model"
    }

    fn supports(&self, _capability: Capability) -> bool {
        true
    }
}

struct TestServer {
    router: axum::Router,
    _cache_dir: tempfile::TempDir,
    _usage_dir: tempfile::TempDir,
}

fn test_server(replies: Vec<Result<String, ErrorKind>>) -> TestServer {
    let provider = ScriptedProvider::new(replies);
    let ladder = [Tier::Tier1, Tier::Tier1_5, Tier::Tier2, Tier::Tier3]
        .into_iter()
        .map(|tier| TierBinding {
            tier,
            provider: provider.clone(),
            model: "scripted-model".to_string(),
            timeout: Duration::from_secs(30),
            thinking: false,
        })
        .collect();

    let cache_dir = tempfile::tempdir().unwrap();
    let usage_dir = tempfile::tempdir().unwrap();
    let cache =
        Arc::new(IdentificationCache::new(cache_dir.path().to_path_buf(), 30).unwrap());
    let recorder = UsageRecorder::new(usage_dir.path().to_path_buf()).unwrap();

    let controller = Arc::new(EscalationController::new(
        ladder,
        EscalationConfig::default(),
        cache,
        UsageHandle::disabled(),
    ));
    let state = AppState {
        controller,
        recorder: Arc::new(recorder),
    };
    TestServer {
        router: create_router(state, 8 * 1024 * 1024),
        _cache_dir: cache_dir,
        _usage_dir: usage_dir,
    }
}

fn payload(confidence: u8) -> String {
    format!(
        r#"{{"producer": "Penfolds", "wineName": "Grange", "vintage": 2016, "confidence": {}}}"#,
        confidence
    )
}

async fn post_json(router: axum::Router, uri: &str, body: &str) -> (StatusCode, serde_json::Value) {
    let response = router
        .oneshot(
            Request::post(uri)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = serde_json::from_slice(&bytes).unwrap();
    (status, json)
}

#[tokio::test]
async fn identify_text_returns_outcome() {
    let server = test_server(vec![Ok(payload(92))]);
    let (status, json) = post_json(
        server.router,
        "/identify",
        r#"{"inputType": "text", "text": "Penfolds Grange 2016"}"#,
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["success"], true);
    assert_eq!(json["data"]["finalAction"], "auto_populate");
    assert_eq!(json["data"]["finalTier"], "tier1");
    assert_eq!(json["data"]["finalConfidence"], 92);
    assert_eq!(json["data"]["result"]["producer"], "Penfolds");
    assert_eq!(json["data"]["attempts"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn identify_escalates_across_tiers() {
    let server = test_server(vec![Ok(payload(40)), Ok(payload(75))]);
    let (status, json) = post_json(
        server.router,
        "/identify",
        r#"{"inputType": "text", "text": "that Grange from a while back"}"#,
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["finalAction"], "suggest");
    assert_eq!(json["data"]["attempts"].as_array().unwrap().len(), 2);
    assert_eq!(json["data"]["attempts"][1]["tier"], "tier1_5");
}

#[tokio::test]
async fn identify_image_accepts_base64() {
    let server = test_server(vec![Ok(payload(90))]);
    let (status, json) = post_json(
        server.router,
        "/identify",
        r#"{"inputType": "image", "imageBase64": "/9j/4AAQ", "mimeType": "image/jpeg"}"#,
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["finalAction"], "auto_populate");
}

#[tokio::test]
async fn identify_rejects_bad_base64() {
    let server = test_server(vec![]);
    let (status, json) = post_json(
        server.router,
        "/identify",
        r#"{"inputType": "image", "imageBase64": "!!not-base64!!"}"#,
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["success"], false);
}

#[tokio::test]
async fn identify_rejects_empty_text() {
    let server = test_server(vec![]);
    let (status, json) = post_json(
        server.router,
        "/identify",
        r#"{"inputType": "text", "text": "   "}"#,
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["success"], false);
}

#[tokio::test]
async fn identify_rejects_unknown_input_type() {
    let server = test_server(vec![]);
    let (status, _) = post_json(server.router, "/identify", r#"{"inputType": "audio"}"#).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn deeper_endpoint_runs_tier3() {
    let server = test_server(vec![Ok(payload(88))]);
    let (status, json) = post_json(
        server.router,
        "/identify/deeper",
        r#"{"inputType": "text", "text": "obscure garagiste bottling"}"#,
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["finalTier"], "tier3");
    assert_eq!(json["data"]["attempts"][0]["tier"], "tier3");
}

#[tokio::test]
async fn health_endpoint_reports_ok() {
    let server = test_server(vec![]);
    let response = server
        .router
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(json["status"], "ok");
}

#[tokio::test]
async fn usage_summary_empty_day() {
    let server = test_server(vec![]);
    let response = server
        .router
        .oneshot(
            Request::get("/usage/summary?date=1999-01-01")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(json["total_requests"], 0);
    assert_eq!(json["date"], "1999-01-01");
}
