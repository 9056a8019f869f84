//! Quiz runner: one question at a time over a session's installed question set.
//!
//! The first view starts the clock. Answers can be changed freely until the
//! quiz is submitted; submission is one-shot and yields the results.

use serde::Serialize;
use tracing::{info, instrument};

use crate::domain::OPTION_COUNT;
use crate::error::{QuizError, SessionError};
use crate::results::QuizResults;
use crate::session::{QuizSession, SessionHandle};
use crate::util::{elapsed_secs, format_mmss};

/// What the quiz page renders for the current question. Never carries the answer key.
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct QuestionView {
  pub index: usize,
  pub total: usize,
  pub question: String,
  pub options: [String; OPTION_COUNT],
  pub selected: Option<u8>,
  /// Model reasoning, present only when the question was judged off-level.
  pub difficulty_note: Option<String>,
  pub answered_count: usize,
  pub elapsed_secs: u64,
  pub elapsed: String,
  pub is_first: bool,
  pub is_last: bool,
  pub submitted: bool,
}

impl QuestionView {
  fn build(s: &QuizSession, now_ms: u64) -> Option<Self> {
    let index = s.current_index;
    let q = s.questions.get(index)?;
    let secs = s
      .started_at_ms
      .map(|start| elapsed_secs(start, s.ended_at_ms.unwrap_or(now_ms)))
      .unwrap_or(0);
    let difficulty_note = q
      .difficulty_assessment
      .as_ref()
      .filter(|a| !a.meets_target_difficulty)
      .map(|a| a.reasoning.clone());
    Some(Self {
      index,
      total: s.questions.len(),
      question: q.question.clone(),
      options: q.options.clone(),
      selected: s.answers.get(index).copied().flatten(),
      difficulty_note,
      answered_count: s.answered_count(),
      elapsed_secs: secs,
      elapsed: format_mmss(secs),
      is_first: index == 0,
      is_last: index + 1 == s.questions.len(),
      submitted: s.is_submitted(),
    })
  }
}

pub struct QuizRunner {
  session: SessionHandle,
}

impl QuizRunner {
  pub fn new(session: SessionHandle) -> Self {
    Self { session }
  }

  fn view_of(s: &QuizSession, now_ms: u64) -> Result<QuestionView, QuizError> {
    QuestionView::build(s, now_ms).ok_or_else(|| SessionError::NoQuestions.into())
  }

  /// Current question; starts the timer on first call.
  #[instrument(level = "debug", skip(self), fields(session = %self.session.id()))]
  pub fn current(&self, now_ms: u64) -> Result<QuestionView, QuizError> {
    let s = self.session.mark_started(now_ms)?;
    Self::view_of(&s, now_ms)
  }

  /// Move forward one question; stays on the last one.
  pub fn next(&self, now_ms: u64) -> Result<QuestionView, QuizError> {
    let s = self.session.mark_started(now_ms)?;
    let target = (s.current_index + 1).min(s.questions.len().saturating_sub(1));
    let s = self.session.navigate(target)?;
    Self::view_of(&s, now_ms)
  }

  /// Move back one question; stays on the first one.
  pub fn previous(&self, now_ms: u64) -> Result<QuestionView, QuizError> {
    let s = self.session.mark_started(now_ms)?;
    let s = self.session.navigate(s.current_index.saturating_sub(1))?;
    Self::view_of(&s, now_ms)
  }

  pub fn goto(&self, index: usize, now_ms: u64) -> Result<QuestionView, QuizError> {
    self.session.mark_started(now_ms)?;
    let s = self.session.navigate(index)?;
    Self::view_of(&s, now_ms)
  }

  /// Record `option` for `question` (defaults to the current question).
  /// A rejected answer leaves the clock untouched.
  #[instrument(level = "info", skip(self), fields(session = %self.session.id()))]
  pub fn answer(&self, question: Option<usize>, option: usize, now_ms: u64) -> Result<QuestionView, QuizError> {
    let index = question.unwrap_or_else(|| self.session.snapshot().current_index);
    self.session.record_answer(index, option)?;
    let s = self.session.mark_started(now_ms)?;
    info!(target: "quiz", question = index, option, answered = s.answered_count(), "Answer recorded");
    Self::view_of(&s, now_ms)
  }

  /// End the quiz and compute results. A second submission is rejected.
  #[instrument(level = "info", skip(self), fields(session = %self.session.id()))]
  pub fn submit(&self, now_ms: u64) -> Result<QuizResults, QuizError> {
    let s = self.session.mark_ended(now_ms)?;
    let results = QuizResults::from_session(&s)?;
    info!(
      target: "quiz",
      score = results.score,
      correct = results.correct_answers_count,
      total = results.total_questions,
      elapsed = %results.time_taken_formatted,
      "Quiz submitted"
    );
    Ok(results)
  }

  /// Results of the submitted quiz.
  pub fn results(&self) -> Result<QuizResults, QuizError> {
    Ok(QuizResults::from_session(&self.session.snapshot())?)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::fixtures::questions;
  use crate::domain::DifficultyAssessment;
  use crate::error::ResultsError;

  fn ready_session() -> SessionHandle {
    let session = SessionHandle::new("q");
    let run = session.begin_generation("img".into()).unwrap();
    let mut qs = questions(10);
    qs[1].difficulty_assessment = Some(DifficultyAssessment {
      meets_target_difficulty: false,
      reasoning: "Recall only.".into(),
    });
    qs[2].difficulty_assessment = Some(DifficultyAssessment {
      meets_target_difficulty: true,
      reasoning: "Fine.".into(),
    });
    session.install_questions(run, qs).unwrap();
    session
  }

  #[test]
  fn first_view_starts_the_clock_once() {
    let session = ready_session();
    let runner = QuizRunner::new(session.clone());
    let v = runner.current(1_000).unwrap();
    assert_eq!((v.index, v.total, v.elapsed.as_str()), (0, 10, "00:00"));
    assert!(v.is_first && !v.is_last);
    let v = runner.current(66_000).unwrap();
    assert_eq!(v.elapsed, "01:05");
    assert_eq!(session.snapshot().started_at_ms, Some(1_000));
  }

  #[test]
  fn navigation_clamps_at_both_ends() {
    let runner = QuizRunner::new(ready_session());
    assert_eq!(runner.previous(0).unwrap().index, 0);
    for _ in 0..15 {
      runner.next(0).unwrap();
    }
    let v = runner.next(0).unwrap();
    assert_eq!(v.index, 9);
    assert!(v.is_last);
    assert_eq!(runner.goto(4, 0).unwrap().index, 4);
    assert!(matches!(
      runner.goto(10, 0),
      Err(QuizError::Session(SessionError::QuestionOutOfRange { .. }))
    ));
  }

  #[test]
  fn difficulty_note_only_for_off_level_questions() {
    let runner = QuizRunner::new(ready_session());
    assert_eq!(runner.goto(1, 0).unwrap().difficulty_note.as_deref(), Some("Recall only."));
    assert_eq!(runner.goto(2, 0).unwrap().difficulty_note, None);
    assert_eq!(runner.goto(3, 0).unwrap().difficulty_note, None);
  }

  #[test]
  fn answering_defaults_to_current_question() {
    let runner = QuizRunner::new(ready_session());
    runner.goto(3, 0).unwrap();
    let v = runner.answer(None, 2, 0).unwrap();
    assert_eq!(v.selected, Some(2));
    let v = runner.answer(Some(5), 1, 0).unwrap();
    assert_eq!(v.index, 3);
    assert_eq!(v.answered_count, 2);
  }

  #[test]
  fn rejected_answer_does_not_start_the_clock() {
    let session = ready_session();
    let runner = QuizRunner::new(session.clone());
    assert_eq!(
      runner.answer(None, 4, 1_000),
      Err(QuizError::Session(SessionError::OptionOutOfRange(4)))
    );
    assert!(runner.answer(Some(12), 0, 1_000).is_err());
    assert_eq!(session.snapshot().started_at_ms, None);

    let v = runner.answer(None, 1, 2_000).unwrap();
    assert_eq!(v.selected, Some(1));
    assert_eq!(session.snapshot().started_at_ms, Some(2_000));
  }

  #[test]
  fn submit_is_one_shot_and_freezes_answers() {
    let session = ready_session();
    let runner = QuizRunner::new(session.clone());
    assert_eq!(runner.results(), Err(QuizError::Results(ResultsError::NotReady)));
    let qs = session.snapshot().questions;
    for i in [0, 2, 4] {
      runner.answer(Some(i), qs[i].correct_answer_index as usize, 10_000).unwrap();
    }
    let r = runner.submit(135_000).unwrap();
    assert_eq!(r.score, 30);
    assert_eq!(r.correct_answers_count, 3);
    assert_eq!(r.time_taken_formatted, "02:05");

    assert_eq!(runner.submit(999_000), Err(QuizError::Session(SessionError::AlreadySubmitted)));
    assert!(runner.answer(Some(1), 0, 0).is_err());
    assert_eq!(runner.results().unwrap(), r);
    assert!(runner.current(500_000).unwrap().submitted);
  }

  #[test]
  fn runner_without_questions_reports_no_questions() {
    let runner = QuizRunner::new(SessionHandle::new("empty"));
    assert_eq!(runner.current(0), Err(QuizError::Session(SessionError::NoQuestions)));
    assert_eq!(runner.submit(0), Err(QuizError::Session(SessionError::NoQuestions)));
  }
}
