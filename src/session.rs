//! Quiz session state: one per browser tab.
//!
//! All mutation goes through [`QuizSession::apply`], a total transition
//! function from (state, event) to the complete next state. Every arm builds
//! the whole struct, so no field is carried over by omission.
//!
//! [`SessionHandle`] wraps the state in a `tokio::sync::watch` channel. Each
//! accepted transition is applied under the channel's lock and then published
//! to subscribers (the WebSocket progress stream), one update at a time.

use std::sync::{
  atomic::{AtomicU64, Ordering},
  Arc,
};

use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, instrument};

use crate::domain::{Question, OPTION_COUNT};
use crate::error::SessionError;
use crate::util::now_ms;

/// Generation progress checkpoints (percent).
pub mod checkpoint {
  pub const START: u8 = 0;
  pub const EXTRACTING: u8 = 10;
  pub const GENERATING: u8 = 40;
  pub const ASSESSING: u8 = 70;
  pub const DONE: u8 = 100;
}

/// User-facing status lines.
pub mod status {
  pub const STARTING: &str = "Starting test generation...";
  pub const EXTRACTING: &str = "Extracting text from image...";
  pub const GENERATING: &str = "Generating questions...";
  pub const ASSESSING: &str = "Assessing question difficulty...";
  pub const SUCCEEDED: &str = "Test generated successfully!";
  pub const FAILED: &str = "Failed. Please try again.";
}

#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
  Idle,
  ExtractingText,
  GeneratingQuestions,
  AssessingDifficulty,
  Succeeded,
  Failed,
}

impl PipelineStage {
  pub fn is_running(self) -> bool {
    matches!(
      self,
      PipelineStage::ExtractingText
        | PipelineStage::GeneratingQuestions
        | PipelineStage::AssessingDifficulty
    )
  }

  pub fn is_terminal(self) -> bool {
    matches!(self, PipelineStage::Succeeded | PipelineStage::Failed)
  }

  fn entry(self) -> (u8, &'static str) {
    match self {
      PipelineStage::Idle => (checkpoint::START, ""),
      PipelineStage::ExtractingText => (checkpoint::EXTRACTING, status::EXTRACTING),
      PipelineStage::GeneratingQuestions => (checkpoint::GENERATING, status::GENERATING),
      PipelineStage::AssessingDifficulty => (checkpoint::ASSESSING, status::ASSESSING),
      PipelineStage::Succeeded => (checkpoint::DONE, status::SUCCEEDED),
      PipelineStage::Failed => (checkpoint::START, status::FAILED),
    }
  }
}

#[derive(Clone, Debug, PartialEq)]
pub struct QuizSession {
  /// Generation run counter; pipeline events carry the run they belong to.
  pub run: u64,
  pub stage: PipelineStage,
  pub progress: u8,
  pub status: String,
  pub error: Option<String>,
  pub image_preview: Option<String>,
  pub questions: Vec<Question>,
  /// Parallel to `questions`: chosen option per question.
  pub answers: Vec<Option<u8>>,
  pub current_index: usize,
  pub started_at_ms: Option<u64>,
  pub ended_at_ms: Option<u64>,
}

impl Default for QuizSession {
  fn default() -> Self {
    Self {
      run: 0,
      stage: PipelineStage::Idle,
      progress: checkpoint::START,
      status: String::new(),
      error: None,
      image_preview: None,
      questions: Vec::new(),
      answers: Vec::new(),
      current_index: 0,
      started_at_ms: None,
      ended_at_ms: None,
    }
  }
}

#[derive(Clone, Debug, PartialEq)]
pub enum SessionEvent {
  GenerationStarted { image_preview: String },
  StageEntered { run: u64, stage: PipelineStage },
  AssessmentProgress { run: u64, completed: usize, total: usize },
  QuestionsInstalled { run: u64, questions: Vec<Question> },
  GenerationFailed { run: u64, message: String },
  AnswerRecorded { question_index: usize, option_index: usize },
  Navigated { index: usize },
  QuizStarted { at_ms: u64 },
  QuizSubmitted { at_ms: u64 },
  Reset,
}

/// Linear interpolation from the assessing checkpoint to 100, rounded half up.
pub fn assessment_progress(completed: usize, total: usize) -> u8 {
  if total == 0 {
    return checkpoint::DONE;
  }
  let span = (checkpoint::DONE - checkpoint::ASSESSING) as usize;
  let completed = completed.min(total);
  let step = (2 * span * completed + total) / (2 * total);
  checkpoint::ASSESSING + step as u8
}

impl QuizSession {
  pub fn answered_count(&self) -> usize {
    self.answers.iter().filter(|a| a.is_some()).count()
  }

  pub fn is_submitted(&self) -> bool {
    self.ended_at_ms.is_some()
  }

  fn check_run(&self, event_run: u64) -> Result<(), SessionError> {
    if event_run == self.run && self.stage.is_running() {
      Ok(())
    } else {
      Err(SessionError::StaleRun { event_run, current_run: self.run })
    }
  }

  fn require_questions(&self) -> Result<(), SessionError> {
    if self.questions.is_empty() {
      Err(SessionError::NoQuestions)
    } else {
      Ok(())
    }
  }

  fn check_question_index(&self, index: usize) -> Result<(), SessionError> {
    self.require_questions()?;
    if index < self.questions.len() {
      Ok(())
    } else {
      Err(SessionError::QuestionOutOfRange { index, len: self.questions.len() })
    }
  }

  /// Compute the complete next state for `event`, or reject it.
  pub fn apply(&self, event: SessionEvent) -> Result<QuizSession, SessionError> {
    let QuizSession {
      run,
      stage,
      progress,
      status: current_status,
      error,
      image_preview,
      questions,
      answers,
      current_index,
      started_at_ms,
      ended_at_ms,
    } = self;

    match event {
      SessionEvent::GenerationStarted { image_preview: preview } => {
        if stage.is_running() {
          return Err(SessionError::GenerationInProgress);
        }
        Ok(QuizSession {
          run: run + 1,
          stage: PipelineStage::ExtractingText,
          progress: checkpoint::START,
          status: status::STARTING.into(),
          error: None,
          image_preview: Some(preview),
          questions: Vec::new(),
          answers: Vec::new(),
          current_index: 0,
          started_at_ms: None,
          ended_at_ms: None,
        })
      }

      SessionEvent::StageEntered { run: event_run, stage: next } => {
        self.check_run(event_run)?;
        let (next_progress, next_status) = next.entry();
        Ok(QuizSession {
          run: *run,
          stage: next,
          progress: next_progress,
          status: next_status.into(),
          error: error.clone(),
          image_preview: image_preview.clone(),
          questions: questions.clone(),
          answers: answers.clone(),
          current_index: *current_index,
          started_at_ms: *started_at_ms,
          ended_at_ms: *ended_at_ms,
        })
      }

      SessionEvent::AssessmentProgress { run: event_run, completed, total } => {
        self.check_run(event_run)?;
        Ok(QuizSession {
          run: *run,
          stage: *stage,
          progress: assessment_progress(completed, total).max(*progress),
          status: current_status.clone(),
          error: error.clone(),
          image_preview: image_preview.clone(),
          questions: questions.clone(),
          answers: answers.clone(),
          current_index: *current_index,
          started_at_ms: *started_at_ms,
          ended_at_ms: *ended_at_ms,
        })
      }

      SessionEvent::QuestionsInstalled { run: event_run, questions: installed } => {
        self.check_run(event_run)?;
        let (done_progress, done_status) = PipelineStage::Succeeded.entry();
        Ok(QuizSession {
          run: *run,
          stage: PipelineStage::Succeeded,
          progress: done_progress,
          status: done_status.into(),
          error: None,
          image_preview: image_preview.clone(),
          answers: vec![None; installed.len()],
          questions: installed,
          current_index: 0,
          started_at_ms: None,
          ended_at_ms: None,
        })
      }

      SessionEvent::GenerationFailed { run: event_run, message } => {
        self.check_run(event_run)?;
        let (failed_progress, failed_status) = PipelineStage::Failed.entry();
        Ok(QuizSession {
          run: *run,
          stage: PipelineStage::Failed,
          progress: failed_progress,
          status: failed_status.into(),
          error: Some(message),
          image_preview: image_preview.clone(),
          questions: Vec::new(),
          answers: Vec::new(),
          current_index: 0,
          started_at_ms: None,
          ended_at_ms: None,
        })
      }

      SessionEvent::AnswerRecorded { question_index, option_index } => {
        self.check_question_index(question_index)?;
        if self.is_submitted() {
          return Err(SessionError::AlreadySubmitted);
        }
        if option_index >= OPTION_COUNT {
          return Err(SessionError::OptionOutOfRange(option_index));
        }
        let mut next_answers = answers.clone();
        next_answers[question_index] = Some(option_index as u8);
        Ok(QuizSession {
          run: *run,
          stage: *stage,
          progress: *progress,
          status: current_status.clone(),
          error: error.clone(),
          image_preview: image_preview.clone(),
          questions: questions.clone(),
          answers: next_answers,
          current_index: *current_index,
          started_at_ms: *started_at_ms,
          ended_at_ms: *ended_at_ms,
        })
      }

      SessionEvent::Navigated { index } => {
        self.check_question_index(index)?;
        Ok(QuizSession {
          run: *run,
          stage: *stage,
          progress: *progress,
          status: current_status.clone(),
          error: error.clone(),
          image_preview: image_preview.clone(),
          questions: questions.clone(),
          answers: answers.clone(),
          current_index: index,
          started_at_ms: *started_at_ms,
          ended_at_ms: *ended_at_ms,
        })
      }

      SessionEvent::QuizStarted { at_ms } => {
        self.require_questions()?;
        Ok(QuizSession {
          run: *run,
          stage: *stage,
          progress: *progress,
          status: current_status.clone(),
          error: error.clone(),
          image_preview: image_preview.clone(),
          questions: questions.clone(),
          answers: answers.clone(),
          current_index: *current_index,
          // First start wins; revisiting the quiz keeps the clock running.
          started_at_ms: Some(started_at_ms.unwrap_or(at_ms)),
          ended_at_ms: *ended_at_ms,
        })
      }

      SessionEvent::QuizSubmitted { at_ms } => {
        self.require_questions()?;
        if started_at_ms.is_none() {
          return Err(SessionError::NotStarted);
        }
        if ended_at_ms.is_some() {
          return Err(SessionError::AlreadySubmitted);
        }
        Ok(QuizSession {
          run: *run,
          stage: *stage,
          progress: *progress,
          status: current_status.clone(),
          error: error.clone(),
          image_preview: image_preview.clone(),
          questions: questions.clone(),
          answers: answers.clone(),
          current_index: *current_index,
          started_at_ms: *started_at_ms,
          ended_at_ms: Some(at_ms),
        })
      }

      // The run counter survives a reset so that a pipeline still in flight
      // cannot write into the cleared session.
      SessionEvent::Reset => Ok(QuizSession { run: *run, ..QuizSession::default() }),
    }
  }
}

/// Shared, observable handle to one session's state.
#[derive(Clone, Debug)]
pub struct SessionHandle {
  id: String,
  tx: watch::Sender<QuizSession>,
  last_seen_ms: Arc<AtomicU64>,
}

impl SessionHandle {
  pub fn new(id: impl Into<String>) -> Self {
    let (tx, _rx) = watch::channel(QuizSession::default());
    Self { id: id.into(), tx, last_seen_ms: Arc::new(AtomicU64::new(now_ms())) }
  }

  pub fn id(&self) -> &str {
    &self.id
  }

  /// Record client activity at `at_ms`. Never moves backwards.
  pub fn touch(&self, at_ms: u64) {
    self.last_seen_ms.fetch_max(at_ms, Ordering::Relaxed);
  }

  pub fn last_seen_ms(&self) -> u64 {
    self.last_seen_ms.load(Ordering::Relaxed)
  }

  /// Clone of the current state.
  pub fn snapshot(&self) -> QuizSession {
    self.tx.borrow().clone()
  }

  /// Receiver that is notified after every accepted transition.
  pub fn subscribe(&self) -> watch::Receiver<QuizSession> {
    self.tx.subscribe()
  }

  /// Apply one event atomically; rejected events leave the state untouched.
  #[instrument(level = "debug", skip(self, event), fields(session = %self.id))]
  pub fn dispatch(&self, event: SessionEvent) -> Result<QuizSession, SessionError> {
    let mut outcome = Err(SessionError::NoQuestions);
    self.tx.send_if_modified(|state| match state.apply(event) {
      Ok(next) => {
        *state = next.clone();
        outcome = Ok(next);
        true
      }
      Err(e) => {
        outcome = Err(e);
        false
      }
    });
    match &outcome {
      Ok(s) => debug!(target: "quiz", stage = ?s.stage, progress = s.progress, "session updated"),
      Err(e) => debug!(target: "quiz", error = %e, "session event rejected"),
    }
    outcome
  }

  /// Open a new generation run; returns its run id.
  pub fn begin_generation(&self, image_preview: String) -> Result<u64, SessionError> {
    self.dispatch(SessionEvent::GenerationStarted { image_preview }).map(|s| s.run)
  }

  pub fn enter_stage(&self, run: u64, stage: PipelineStage) -> Result<(), SessionError> {
    self.dispatch(SessionEvent::StageEntered { run, stage }).map(|_| ())
  }

  pub fn report_assessments(&self, run: u64, completed: usize, total: usize) -> Result<(), SessionError> {
    self.dispatch(SessionEvent::AssessmentProgress { run, completed, total }).map(|_| ())
  }

  /// Replace the question set; answers are reset in the same update.
  pub fn install_questions(&self, run: u64, questions: Vec<Question>) -> Result<(), SessionError> {
    self.dispatch(SessionEvent::QuestionsInstalled { run, questions }).map(|_| ())
  }

  pub fn fail_generation(&self, run: u64, message: String) -> Result<(), SessionError> {
    self.dispatch(SessionEvent::GenerationFailed { run, message }).map(|_| ())
  }

  pub fn record_answer(&self, question_index: usize, option_index: usize) -> Result<QuizSession, SessionError> {
    self.dispatch(SessionEvent::AnswerRecorded { question_index, option_index })
  }

  pub fn navigate(&self, index: usize) -> Result<QuizSession, SessionError> {
    self.dispatch(SessionEvent::Navigated { index })
  }

  pub fn mark_started(&self, at_ms: u64) -> Result<QuizSession, SessionError> {
    self.dispatch(SessionEvent::QuizStarted { at_ms })
  }

  /// One-shot: a second submission is rejected and the first end time stands.
  pub fn mark_ended(&self, at_ms: u64) -> Result<QuizSession, SessionError> {
    self.dispatch(SessionEvent::QuizSubmitted { at_ms })
  }

  pub fn reset(&self) -> QuizSession {
    // Reset is accepted from every state.
    self.dispatch(SessionEvent::Reset).unwrap_or_default()
  }
}
