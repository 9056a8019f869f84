//! Results of a submitted quiz. Pure functions over the session data.

use serde::Serialize;

use crate::domain::{DifficultyAssessment, Question, OPTION_COUNT};
use crate::error::ResultsError;
use crate::session::QuizSession;
use crate::util::{elapsed_secs, format_mmss};

/// Scores at or above this count as a pass.
pub const PASS_MARK: u32 = 50;

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct QuestionOutcome {
  pub index: usize,
  pub question: String,
  pub options: [String; OPTION_COUNT],
  pub correct_answer_index: u8,
  pub user_answer: Option<u8>,
  pub is_correct: bool,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub difficulty_assessment: Option<DifficultyAssessment>,
}

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct QuizResults {
  pub score: u32,
  pub correct_answers_count: usize,
  pub total_questions: usize,
  pub elapsed_secs: u64,
  pub time_taken_formatted: String,
  pub passed: bool,
  pub breakdown: Vec<QuestionOutcome>,
}

/// round(100 * correct / total), halves rounded up.
pub fn score_percent(correct: usize, total: usize) -> u32 {
  if total == 0 {
    return 0;
  }
  ((200 * correct + total) / (2 * total)) as u32
}

/// Results for a quiz that has questions and both timestamps; anything else is `NotReady`.
pub fn compute_results(
  questions: &[Question],
  answers: &[Option<u8>],
  started_at_ms: Option<u64>,
  ended_at_ms: Option<u64>,
) -> Result<QuizResults, ResultsError> {
  let (Some(start), Some(end)) = (started_at_ms, ended_at_ms) else {
    return Err(ResultsError::NotReady);
  };
  if questions.is_empty() {
    return Err(ResultsError::NotReady);
  }

  let breakdown: Vec<QuestionOutcome> = questions
    .iter()
    .enumerate()
    .map(|(index, q)| {
      let user_answer = answers.get(index).copied().flatten();
      QuestionOutcome {
        index,
        question: q.question.clone(),
        options: q.options.clone(),
        correct_answer_index: q.correct_answer_index,
        user_answer,
        is_correct: user_answer == Some(q.correct_answer_index),
        difficulty_assessment: q.difficulty_assessment.clone(),
      }
    })
    .collect();

  let correct = breakdown.iter().filter(|o| o.is_correct).count();
  let total = questions.len();
  let score = score_percent(correct, total);
  let secs = elapsed_secs(start, end);

  Ok(QuizResults {
    score,
    correct_answers_count: correct,
    total_questions: total,
    elapsed_secs: secs,
    time_taken_formatted: format_mmss(secs),
    passed: score >= PASS_MARK,
    breakdown,
  })
}

impl QuizResults {
  pub fn from_session(s: &QuizSession) -> Result<Self, ResultsError> {
    compute_results(&s.questions, &s.answers, s.started_at_ms, s.ended_at_ms)
  }
}
