//! Minimal OpenAI client for our use-cases.
//!
//! We only call chat.completions and request either plain text (page
//! transcription, with the image attached as a data URI) or a strict JSON
//! object (question generation, difficulty assessment).
//! Calls are instrumented and log model names, latencies, and response sizes (not contents).
//!
//! NOTE: We never log the API key or the image payload.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument};

use crate::config::{AgentConfig, ExamProfile, Prompts};
use crate::domain::{
  validate_question_set, DifficultyAssessment, ImageInput, Question, RawQuestionSet, QUESTION_COUNT,
};
use crate::error::PipelineError;
use crate::service::PromptService;
use crate::util::{fill_template, trunc_for_log};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_TIMEOUT_SECS: u64 = 60;

#[derive(Clone)]
pub struct OpenAI {
  pub client: reqwest::Client,
  pub api_key: String,
  pub base_url: String,
  pub vision_model: String,
  pub text_model: String,
  pub prompts: Prompts,
  pub exam: ExamProfile,
}

impl OpenAI {
  /// Construct the client if we find OPENAI_API_KEY; `Ok(None)` when it is unset.
  /// Fails only when the HTTP client itself cannot be built.
  pub fn from_env(cfg: &AgentConfig) -> Result<Option<Self>, reqwest::Error> {
    let Some(api_key) = std::env::var("OPENAI_API_KEY").ok().filter(|k| !k.trim().is_empty()) else {
      return Ok(None);
    };
    let base_url = std::env::var("OPENAI_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.into());
    let vision_model = std::env::var("OPENAI_VISION_MODEL").unwrap_or_else(|_| "gpt-4o".into());
    let text_model = std::env::var("OPENAI_TEXT_MODEL").unwrap_or_else(|_| "gpt-4o-mini".into());
    let timeout_secs = std::env::var("OPENAI_TIMEOUT_SECS")
      .ok()
      .and_then(|s| s.parse::<u64>().ok())
      .unwrap_or(DEFAULT_TIMEOUT_SECS);

    Self::new(api_key, base_url, vision_model, text_model, Duration::from_secs(timeout_secs), cfg).map(Some)
  }

  pub fn new(
    api_key: String,
    base_url: String,
    vision_model: String,
    text_model: String,
    timeout: Duration,
    cfg: &AgentConfig,
  ) -> Result<Self, reqwest::Error> {
    let client = reqwest::Client::builder().timeout(timeout).build()?;
    Ok(Self {
      client,
      api_key,
      base_url: base_url.trim_end_matches('/').to_string(),
      vision_model,
      text_model,
      prompts: cfg.prompts.clone(),
      exam: cfg.exam.clone(),
    })
  }

  fn exam_pairs(&self) -> [(&str, &str); 2] {
    [("exam", self.exam.name.as_str()), ("exam_description", self.exam.description.as_str())]
  }

  /// Send one chat completion and return the first choice's text.
  #[instrument(level = "info", skip(self, req), fields(model = %req.model, json = req.response_format.is_some()))]
  async fn send_chat(&self, req: &ChatCompletionRequest) -> Result<String, PipelineError> {
    let url = format!("{}/chat/completions", self.base_url);
    let start = Instant::now();

    let res = self
      .client
      .post(&url)
      .header(USER_AGENT, "scantest-backend/0.1")
      .header(CONTENT_TYPE, "application/json")
      .header(AUTHORIZATION, format!("Bearer {}", self.api_key))
      .json(req)
      .send()
      .await
      .map_err(|e| PipelineError::Service(e.to_string()))?;

    if !res.status().is_success() {
      let status = res.status();
      let body = res.text().await.unwrap_or_default();
      let msg = extract_openai_error(&body).unwrap_or_else(|| trunc_for_log(&body, 200));
      error!(?status, elapsed = ?start.elapsed(), "OpenAI call rejected");
      return Err(PipelineError::Service(format!("OpenAI HTTP {}: {}", status, msg)));
    }

    let body: ChatCompletionResponse = res
      .json()
      .await
      .map_err(|e| PipelineError::Service(format!("unreadable completion body: {e}")))?;
    if let Some(usage) = &body.usage {
      info!(prompt_tokens = ?usage.prompt_tokens, completion_tokens = ?usage.completion_tokens, total_tokens = ?usage.total_tokens, "OpenAI usage");
    }
    let text = body
      .choices
      .into_iter()
      .next()
      .and_then(|c| c.message.content)
      .unwrap_or_default();
    info!(elapsed = ?start.elapsed(), response_len = text.len(), "Model response received");
    Ok(text)
  }

  /// JSON-object chat completion. Generic over the target type T.
  async fn chat_json<T: for<'a> Deserialize<'a>>(
    &self,
    system: &str,
    user: &str,
    temperature: f32,
  ) -> Result<T, PipelineError> {
    let req = ChatCompletionRequest {
      model: self.text_model.clone(),
      messages: vec![ChatMessageReq::text("system", system), ChatMessageReq::text("user", user)],
      temperature,
      response_format: Some(ResponseFormat { r#type: "json_object".into() }),
    };
    let text = self.send_chat(&req).await?;
    parse_model_json(&text)
  }
}

/// Parse the model's JSON content; shape mismatches are schema violations.
fn parse_model_json<T: for<'a> Deserialize<'a>>(text: &str) -> Result<T, PipelineError> {
  serde_json::from_str::<T>(text.trim())
    .map_err(|e| PipelineError::SchemaViolation(format!("JSON parse error: {}", e)))
}

fn format_choices(options: &[String]) -> String {
  options.iter().map(|o| format!("- {o}")).collect::<Vec<_>>().join("\n")
}

#[async_trait]
impl PromptService for OpenAI {
  #[instrument(level = "info", skip(self, image), fields(mime = %image.mime, image_bytes = image.bytes.len(), model = %self.vision_model))]
  async fn extract_text(&self, image: &ImageInput) -> Result<String, PipelineError> {
    if image.bytes.is_empty() {
      return Err(PipelineError::NoInput);
    }
    let req = ChatCompletionRequest {
      model: self.vision_model.clone(),
      messages: vec![
        ChatMessageReq::text("system", &self.prompts.extract_system),
        ChatMessageReq {
          role: "user".into(),
          content: MessageContent::Parts(vec![
            ContentPart::ImageUrl { image_url: ImageUrl { url: image.to_data_uri() } },
            ContentPart::Text { text: self.prompts.extract_user.clone() },
          ]),
        },
      ],
      temperature: 0.0,
      response_format: None,
    };
    let text = self.send_chat(&req).await?;
    Ok(text.trim().to_string())
  }

  #[instrument(level = "info", skip(self, extracted_text), fields(text_len = extracted_text.len(), model = %self.text_model))]
  async fn generate_questions(&self, extracted_text: &str) -> Result<Vec<Question>, PipelineError> {
    let count = QUESTION_COUNT.to_string();
    let [exam, exam_description] = self.exam_pairs();
    let system = fill_template(&self.prompts.generate_system, &[exam, exam_description]);
    let user = fill_template(
      &self.prompts.generate_user_template,
      &[exam, exam_description, ("count", count.as_str()), ("extracted_text", extracted_text)],
    );
    let set: RawQuestionSet = self.chat_json(&system, &user, 0.7).await?;
    let questions = validate_question_set(set.questions)?;
    info!(count = questions.len(), "Question set validated");
    Ok(questions)
  }

  #[instrument(level = "info", skip(self, question, options, extracted_text), fields(question_len = question.len(), options = options.len()))]
  async fn assess_difficulty(
    &self,
    question: &str,
    options: &[String],
    extracted_text: &str,
  ) -> Result<DifficultyAssessment, PipelineError> {
    let choices = format_choices(options);
    let [exam, exam_description] = self.exam_pairs();
    let system = fill_template(&self.prompts.assess_system, &[exam, exam_description]);
    let user = fill_template(
      &self.prompts.assess_user_template,
      &[
        exam,
        exam_description,
        ("extracted_text", extracted_text),
        ("question", question),
        ("choices", choices.as_str()),
      ],
    );
    self.chat_json(&system, &user, 0.2).await
  }

  fn name(&self) -> &str {
    "openai"
  }
}

// --- Chat DTOs ---

#[derive(Serialize)]
struct ChatCompletionRequest {
  model: String,
  messages: Vec<ChatMessageReq>,
  temperature: f32,
  #[serde(skip_serializing_if = "Option::is_none")]
  response_format: Option<ResponseFormat>,
}
#[derive(Serialize)]
struct ChatMessageReq {
  role: String,
  content: MessageContent,
}
impl ChatMessageReq {
  fn text(role: &str, content: &str) -> Self {
    Self { role: role.into(), content: MessageContent::Text(content.into()) }
  }
}
#[derive(Serialize)]
#[serde(untagged)]
enum MessageContent {
  Text(String),
  Parts(Vec<ContentPart>),
}
#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart {
  Text { text: String },
  ImageUrl { image_url: ImageUrl },
}
#[derive(Serialize)]
struct ImageUrl { url: String }
#[derive(Serialize)]
struct ResponseFormat { #[serde(rename = "type")] r#type: String }

#[derive(Deserialize)]
struct ChatCompletionResponse {
  choices: Vec<ChatChoice>,
  #[serde(default)] usage: Option<Usage>,
}
#[derive(Deserialize)]
struct ChatChoice { message: ChatMessageResp }
#[derive(Deserialize)]
struct ChatMessageResp { content: Option<String> }
#[derive(Deserialize)]
struct Usage {
  #[serde(default)] prompt_tokens: Option<u32>,
  #[serde(default)] completion_tokens: Option<u32>,
  #[serde(default)] total_tokens: Option<u32>,
}

/// Try to extract a clean error message from OpenAI error body.
fn extract_openai_error(body: &str) -> Option<String> {
  #[derive(Deserialize)]
  struct EWrap { error: EObj }
  #[derive(Deserialize)]
  struct EObj { message: String }
  match serde_json::from_str::<EWrap>(body) {
    Ok(w) => Some(w.error.message),
    Err(_) => None,
  }
}
