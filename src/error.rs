//! Error taxonomy for the generation pipeline, the quiz session store and results.
//!
//! Every `PipelineError` aborts the current run; its `Display` text is what the
//! user sees as the session error.

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PipelineError {
  #[error("No image supplied. Please upload an image of a book page.")]
  NoInput,

  #[error("The uploaded image could not be read: {0}")]
  InvalidImage(String),

  #[error("No text could be extracted from the image. Please try a clearer image.")]
  ExtractionEmpty,

  #[error("The model returned an unexpected response: {0}")]
  SchemaViolation(String),

  #[error("The prompt service failed: {0}")]
  Service(String),
}

impl PipelineError {
  /// Short stable name for logs and the wire.
  pub fn kind(&self) -> &'static str {
    match self {
      PipelineError::NoInput => "no_input",
      PipelineError::InvalidImage(_) => "invalid_image",
      PipelineError::ExtractionEmpty => "extraction_empty",
      PipelineError::SchemaViolation(_) => "schema_violation",
      PipelineError::Service(_) => "service",
    }
  }
}

/// Rejected transitions of the quiz session state.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SessionError {
  #[error("question index {index} is out of range (quiz has {len} questions)")]
  QuestionOutOfRange { index: usize, len: usize },

  #[error("option index {0} is out of range (expected 0..=3)")]
  OptionOutOfRange(usize),

  #[error("no questions have been generated for this session")]
  NoQuestions,

  #[error("the quiz has not been started")]
  NotStarted,

  #[error("the quiz has already been submitted")]
  AlreadySubmitted,

  #[error("a test is already being generated for this session")]
  GenerationInProgress,

  #[error("event belongs to generation run {event_run}, session is on run {current_run}")]
  StaleRun { event_run: u64, current_run: u64 },
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ResultsError {
  #[error("results are not available until a generated quiz has been started and submitted")]
  NotReady,
}

/// Why a generation run could not be opened.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StartError {
  #[error(transparent)]
  Input(#[from] PipelineError),

  #[error(transparent)]
  Session(#[from] SessionError),
}

/// Failures of quiz-runner operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum QuizError {
  #[error(transparent)]
  Session(#[from] SessionError),

  #[error(transparent)]
  Results(#[from] ResultsError),
}
