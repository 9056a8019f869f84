#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use scantest_backend::{
    config::AgentConfig,
    domain::{DifficultyAssessment, ImageInput, Question},
    error::PipelineError,
    routes::build_router,
    service::PromptService,
    state::AppState,
};
use serde_json::Value;
use tower::ServiceExt;

/// 1x1 transparent PNG as a data URI.
pub const PNG_DATA_URI: &str = "data:image/png;base64,iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJAAAADUlEQVR42mNkYPhfDwAChwGA60e6kgAAAABJRU5ErkJggg==";

/// Deterministic prompt service: fixed page text, ten questions whose correct
/// answer is `i % 4`, and question 3 judged off-level.
pub struct FakeService {
    pub text: String,
}

impl Default for FakeService {
    fn default() -> Self {
        Self { text: "Photosynthesis converts light energy into chemical energy.".into() }
    }
}

#[async_trait]
impl PromptService for FakeService {
    async fn extract_text(&self, _image: &ImageInput) -> Result<String, PipelineError> {
        Ok(self.text.clone())
    }

    async fn generate_questions(&self, _extracted_text: &str) -> Result<Vec<Question>, PipelineError> {
        Ok((0..10)
            .map(|i| Question {
                question: format!("Question {i}?"),
                options: ["A".into(), "B".into(), "C".into(), "D".into()],
                correct_answer_index: (i % 4) as u8,
                difficulty_assessment: None,
            })
            .collect())
    }

    async fn assess_difficulty(
        &self,
        question: &str,
        _options: &[String],
        _extracted_text: &str,
    ) -> Result<DifficultyAssessment, PipelineError> {
        let off_level = question == "Question 3?";
        Ok(DifficultyAssessment {
            meets_target_difficulty: !off_level,
            reasoning: if off_level { "Pure recall.".into() } else { "Exam level.".into() },
        })
    }

    fn name(&self) -> &str {
        "fake"
    }
}

pub fn test_state(service: Arc<dyn PromptService>) -> AppState {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();

    AppState::with_service(AgentConfig::default(), service, "./static".into())
}

pub fn create_test_app_with(service: Arc<dyn PromptService>) -> Router {
    build_router(Arc::new(test_state(service)))
}

pub fn create_test_app_with_upload_limit(max_upload_bytes: usize) -> Router {
    let mut state = test_state(Arc::new(FakeService::default()));
    state.max_upload_bytes = max_upload_bytes;
    build_router(Arc::new(state))
}

/// A JPEG data URI whose base64 payload is `payload_len` characters long.
pub fn jpeg_data_uri(payload_len: usize) -> String {
    format!("data:image/jpeg;base64,{}", "A".repeat(payload_len / 4 * 4))
}

pub fn create_test_app() -> Router {
    create_test_app_with(Arc::new(FakeService::default()))
}

pub async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    send_raw(app, method, uri, body.map(|json| json.to_string())).await
}

/// Like `send`, with the body passed through untouched (sent as JSON content).
pub async fn send_raw(app: &Router, method: &str, uri: &str, body: Option<String>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(text) => {
            builder = builder.header("content-type", "application/json");
            Body::from(text)
        }
        None => Body::empty(),
    };
    let response = app.clone().oneshot(builder.body(body).unwrap()).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| {
            panic!("non-JSON body {} for {method} {uri}", String::from_utf8_lossy(&bytes))
        })
    };
    (status, json)
}

pub async fn create_session(app: &Router) -> String {
    let (status, json) = send(app, "POST", "/api/v1/sessions", None).await;
    assert_eq!(status, StatusCode::CREATED);
    json["sessionId"].as_str().unwrap().to_string()
}

/// Poll the session snapshot until the run leaves the running stages.
pub async fn wait_until_settled(app: &Router, session_id: &str) -> Value {
    for _ in 0..200 {
        let (status, json) = send(app, "GET", &format!("/api/v1/sessions/{session_id}"), None).await;
        assert_eq!(status, StatusCode::OK);
        if matches!(json["stage"].as_str(), Some("succeeded" | "failed" | "idle")) {
            return json;
        }
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }
    panic!("generation for {session_id} did not settle");
}

/// Create a session and run generation to completion.
pub async fn generated_session(app: &Router) -> String {
    let id = create_session(app).await;
    let (status, _) = send(
        app,
        "POST",
        &format!("/api/v1/sessions/{id}/generate"),
        Some(serde_json::json!({ "imageDataUri": PNG_DATA_URI })),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let snap = wait_until_settled(app, &id).await;
    assert_eq!(snap["stage"], "succeeded");
    id
}
