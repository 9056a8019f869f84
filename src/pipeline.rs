//! Generation pipeline: image → extracted text → questions → assessed questions.
//!
//! Stages run strictly in sequence. The assessment stage fans out one task per
//! question on a `JoinSet` and joins them all; the first failure aborts the
//! remaining tasks (dropping the set) and fails the whole run. Progress and
//! status are written to the session as each step completes.
//!
//! No retries: each failure is reported once and the run ends.

use std::sync::Arc;

use tokio::task::JoinSet;
use tracing::{error, info, instrument, warn};

use crate::domain::{DifficultyAssessment, ImageInput, Question, OPTION_COUNT, QUESTION_COUNT};
use crate::error::{PipelineError, SessionError, StartError};
use crate::service::PromptService;
use crate::session::{PipelineStage, SessionHandle};

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineOutcome {
  /// Questions installed in the session.
  Succeeded { questions: usize },
  /// Failure recorded in the session.
  Failed(PipelineError),
  /// The session moved on (reset or new run) while this run was in flight.
  Superseded,
}

enum Abort {
  Failed(PipelineError),
  Superseded,
}

impl From<PipelineError> for Abort {
  fn from(e: PipelineError) -> Self {
    Abort::Failed(e)
  }
}

impl From<SessionError> for Abort {
  fn from(e: SessionError) -> Self {
    warn!(target: "pipeline", error = %e, "session no longer accepts this run");
    Abort::Superseded
  }
}

#[derive(Clone)]
pub struct GenerationPipeline {
  service: Arc<dyn PromptService>,
}

impl GenerationPipeline {
  pub fn new(service: Arc<dyn PromptService>) -> Self {
    Self { service }
  }

  /// Open a new run on `session`: clears the previous quiz and keeps the new
  /// image as preview. The returned run does the work when executed.
  #[instrument(level = "info", skip(self, session, image), fields(session = %session.id(), has_image = image.is_some()))]
  pub fn begin(&self, session: &SessionHandle, image: Option<ImageInput>) -> Result<PipelineRun, StartError> {
    let image = image.ok_or(PipelineError::NoInput)?;
    if image.bytes.is_empty() {
      return Err(PipelineError::NoInput.into());
    }
    let run = session.begin_generation(image.to_data_uri())?;
    info!(target: "pipeline", run, mime = %image.mime, image_bytes = image.bytes.len(), "Generation run opened");
    Ok(PipelineRun {
      service: Arc::clone(&self.service),
      session: session.clone(),
      run,
      image,
    })
  }

  /// `begin` followed by `execute`.
  pub async fn start(&self, session: &SessionHandle, image: Option<ImageInput>) -> Result<PipelineOutcome, StartError> {
    let run = self.begin(session, image)?;
    Ok(run.execute().await)
  }
}

/// One opened generation run, ready to execute.
pub struct PipelineRun {
  service: Arc<dyn PromptService>,
  session: SessionHandle,
  run: u64,
  image: ImageInput,
}

impl PipelineRun {
  pub fn run_id(&self) -> u64 {
    self.run
  }

  #[instrument(level = "info", skip(self), fields(session = %self.session.id(), run = self.run, service = %self.service.name()))]
  pub async fn execute(self) -> PipelineOutcome {
    match self.stages().await {
      Ok(questions) => {
        let count = questions.len();
        match self.session.install_questions(self.run, questions) {
          Ok(()) => {
            info!(target: "pipeline", questions = count, "Test generated");
            PipelineOutcome::Succeeded { questions: count }
          }
          Err(e) => {
            warn!(target: "pipeline", error = %e, "Discarding questions from a superseded run");
            PipelineOutcome::Superseded
          }
        }
      }
      Err(Abort::Failed(e)) => {
        error!(target: "pipeline", kind = e.kind(), error = %e, "Generation failed");
        match self.session.fail_generation(self.run, e.to_string()) {
          Ok(()) => PipelineOutcome::Failed(e),
          Err(_) => PipelineOutcome::Superseded,
        }
      }
      Err(Abort::Superseded) => PipelineOutcome::Superseded,
    }
  }

  async fn stages(&self) -> Result<Vec<Question>, Abort> {
    self.session.enter_stage(self.run, PipelineStage::ExtractingText)?;
    let text = self.service.extract_text(&self.image).await?;
    if text.trim().is_empty() {
      return Err(PipelineError::ExtractionEmpty.into());
    }
    info!(target: "pipeline", text_len = text.len(), "Text extracted");

    self.session.enter_stage(self.run, PipelineStage::GeneratingQuestions)?;
    let questions = self.service.generate_questions(&text).await?;
    check_installable(&questions)?;
    info!(target: "pipeline", count = questions.len(), "Questions generated");

    self.session.enter_stage(self.run, PipelineStage::AssessingDifficulty)?;
    self.assess_all(questions, text).await
  }

  /// Fan out one assessment per question; fan in preserving question order.
  async fn assess_all(&self, questions: Vec<Question>, text: String) -> Result<Vec<Question>, Abort> {
    let total = questions.len();
    let text: Arc<str> = Arc::from(text);
    let mut set = JoinSet::new();
    for (index, q) in questions.iter().enumerate() {
      let service = Arc::clone(&self.service);
      let text = Arc::clone(&text);
      let prompt = q.question.clone();
      let options = q.options.clone();
      set.spawn(async move { (index, service.assess_difficulty(&prompt, &options, &text).await) });
    }

    let mut assessments: Vec<Option<DifficultyAssessment>> = vec![None; total];
    let mut completed = 0usize;
    while let Some(joined) = set.join_next().await {
      let (index, result) =
        joined.map_err(|e| PipelineError::Service(format!("assessment task failed: {e}")))?;
      // An early return drops `set`, which aborts the assessments still in flight.
      let assessment = result?;
      assessments[index] = Some(assessment);
      completed += 1;
      self.session.report_assessments(self.run, completed, total)?;
    }

    let off_level = assessments
      .iter()
      .flatten()
      .filter(|a| !a.meets_target_difficulty)
      .count();
    info!(target: "pipeline", total, off_level, "Difficulty assessed");

    Ok(
      questions
        .into_iter()
        .zip(assessments)
        .map(|(q, assessment)| Question { difficulty_assessment: assessment, ..q })
        .collect(),
    )
  }
}

/// Re-check what the service returned before anything is installed.
fn check_installable(questions: &[Question]) -> Result<(), PipelineError> {
  if questions.len() != QUESTION_COUNT {
    return Err(PipelineError::SchemaViolation(format!(
      "expected {QUESTION_COUNT} questions, got {}",
      questions.len()
    )));
  }
  if let Some(pos) = questions
    .iter()
    .position(|q| q.correct_answer_index as usize >= OPTION_COUNT)
  {
    return Err(PipelineError::SchemaViolation(format!(
      "question {}: correctAnswerIndex {} is outside 0..=3",
      pos + 1,
      questions[pos].correct_answer_index
    )));
  }
  Ok(())
}
