//! The prompt service contract: three request/response operations against a
//! hosted model. The pipeline depends only on this trait.

use async_trait::async_trait;

use crate::domain::{DifficultyAssessment, ImageInput, Question};
use crate::error::PipelineError;

#[async_trait]
pub trait PromptService: Send + Sync {
  /// Transcribe the page. Blank output means the page could not be read and
  /// is treated as a failure by the caller.
  async fn extract_text(&self, image: &ImageInput) -> Result<String, PipelineError>;

  /// Generate the question set. Implementations validate the model output and
  /// fail with `SchemaViolation` rather than return malformed questions.
  async fn generate_questions(&self, extracted_text: &str) -> Result<Vec<Question>, PipelineError>;

  /// Judge one question against the target exam level. Calls are independent.
  async fn assess_difficulty(
    &self,
    question: &str,
    options: &[String],
    extracted_text: &str,
  ) -> Result<DifficultyAssessment, PipelineError>;

  /// Human-readable backend name for logs and health output.
  fn name(&self) -> &str;
}

/// Stand-in used when no model credentials are configured.
#[derive(Clone, Debug, Default)]
pub struct Unconfigured;

const NOT_CONFIGURED: &str = "prompt service is not configured (set OPENAI_API_KEY)";

#[async_trait]
impl PromptService for Unconfigured {
  async fn extract_text(&self, _image: &ImageInput) -> Result<String, PipelineError> {
    Err(PipelineError::Service(NOT_CONFIGURED.into()))
  }

  async fn generate_questions(&self, _extracted_text: &str) -> Result<Vec<Question>, PipelineError> {
    Err(PipelineError::Service(NOT_CONFIGURED.into()))
  }

  async fn assess_difficulty(
    &self,
    _question: &str,
    _options: &[String],
    _extracted_text: &str,
  ) -> Result<DifficultyAssessment, PipelineError> {
    Err(PipelineError::Service(NOT_CONFIGURED.into()))
  }

  fn name(&self) -> &str {
    "unconfigured"
  }
}
