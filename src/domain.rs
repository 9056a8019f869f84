//! Domain models: the uploaded page image, generated questions and their
//! difficulty assessments, plus the schema checks applied to model output.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

/// Every question offers exactly this many options.
pub const OPTION_COUNT: usize = 4;
/// Every generation run asks for (and insists on) this many questions.
pub const QUESTION_COUNT: usize = 10;

/// Photo of a book page as received from the client.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImageInput {
  pub bytes: Vec<u8>,
  pub mime: String,
}

impl ImageInput {
  /// Parse a `data:<mime>;base64,<payload>` URI.
  pub fn from_data_uri(uri: &str) -> Result<Self, PipelineError> {
    let uri = uri.trim();
    if uri.is_empty() {
      return Err(PipelineError::NoInput);
    }
    let rest = uri
      .strip_prefix("data:")
      .ok_or_else(|| PipelineError::InvalidImage("expected a data: URI".into()))?;
    let (header, payload) = rest
      .split_once(',')
      .ok_or_else(|| PipelineError::InvalidImage("data URI has no payload".into()))?;
    let mime = header
      .strip_suffix(";base64")
      .ok_or_else(|| PipelineError::InvalidImage("data URI is not base64 encoded".into()))?;
    Self::from_base64(payload, mime)
  }

  /// Decode a raw base64 payload with an explicit mime type.
  pub fn from_base64(payload: &str, mime: &str) -> Result<Self, PipelineError> {
    let payload = payload.trim();
    if payload.is_empty() {
      return Err(PipelineError::NoInput);
    }
    let mime = mime.trim().to_ascii_lowercase();
    if !mime.starts_with("image/") {
      return Err(PipelineError::InvalidImage(format!("unsupported type '{mime}'")));
    }
    let bytes = STANDARD
      .decode(payload)
      .map_err(|e| PipelineError::InvalidImage(e.to_string()))?;
    if bytes.is_empty() {
      return Err(PipelineError::NoInput);
    }
    Ok(Self { bytes, mime })
  }

  pub fn to_data_uri(&self) -> String {
    format!("data:{};base64,{}", self.mime, STANDARD.encode(&self.bytes))
  }
}

/// Model verdict on whether a question matches the target exam's level.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DifficultyAssessment {
  #[serde(alias = "isNeetLevel", alias = "meets_target_difficulty")]
  pub meets_target_difficulty: bool,
  pub reasoning: String,
}

/// A validated multiple-choice question.
///
/// The option array length is fixed by the type; `correct_answer_index` is
/// checked against it when built from model output.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Question {
  pub question: String,
  pub options: [String; OPTION_COUNT],
  pub correct_answer_index: u8,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub difficulty_assessment: Option<DifficultyAssessment>,
}

impl Question {
  /// True when an assessment exists and says the question is off-level.
  pub fn is_off_level(&self) -> bool {
    matches!(&self.difficulty_assessment, Some(a) if !a.meets_target_difficulty)
  }
}

/// Question exactly as the model returned it, before any checks.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RawQuestion {
  pub question: String,
  pub options: Vec<String>,
  pub correct_answer_index: i64,
}

/// Envelope of the question-generation response.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct RawQuestionSet {
  pub questions: Vec<RawQuestion>,
}

impl TryFrom<RawQuestion> for Question {
  type Error = PipelineError;

  fn try_from(raw: RawQuestion) -> Result<Self, Self::Error> {
    let text = raw.question.trim().to_string();
    if text.is_empty() {
      return Err(PipelineError::SchemaViolation("question text is empty".into()));
    }
    let count = raw.options.len();
    let options: [String; OPTION_COUNT] = raw.options.try_into().map_err(|_| {
      PipelineError::SchemaViolation(format!(
        "expected {OPTION_COUNT} options, got {count}"
      ))
    })?;
    let correct_answer_index = u8::try_from(raw.correct_answer_index)
      .ok()
      .filter(|i| (*i as usize) < OPTION_COUNT)
      .ok_or_else(|| {
        PipelineError::SchemaViolation(format!(
          "correctAnswerIndex {} is outside 0..=3",
          raw.correct_answer_index
        ))
      })?;
    Ok(Question {
      question: text,
      options,
      correct_answer_index,
      difficulty_assessment: None,
    })
  }
}

/// Check a generated question set: exactly `QUESTION_COUNT` well-formed questions.
pub fn validate_question_set(raw: Vec<RawQuestion>) -> Result<Vec<Question>, PipelineError> {
  if raw.len() != QUESTION_COUNT {
    return Err(PipelineError::SchemaViolation(format!(
      "expected {QUESTION_COUNT} questions, got {}",
      raw.len()
    )));
  }
  raw
    .into_iter()
    .enumerate()
    .map(|(i, q)| {
      Question::try_from(q).map_err(|e| match e {
        PipelineError::SchemaViolation(m) => {
          PipelineError::SchemaViolation(format!("question {}: {m}", i + 1))
        }
        other => other,
      })
    })
    .collect()
}
