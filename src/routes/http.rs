//! HTTP endpoint handlers. These are thin wrappers that forward to the session,
//! pipeline and quiz runner. Each handler is instrumented; failures map to a
//! JSON `{ error, kind }` body with a matching status code.

use std::sync::Arc;

use axum::{
  extract::{rejection::JsonRejection, FromRequest, Path, State},
  http::StatusCode,
  response::{IntoResponse, Response},
  Json,
};
use tracing::{info, instrument, warn};

use crate::error::{PipelineError, QuizError, ResultsError, SessionError, StartError};
use crate::protocol::*;
use crate::quiz::QuizRunner;
use crate::session::SessionHandle;
use crate::state::AppState;
use crate::util::now_ms;

#[derive(Debug)]
pub struct ApiError {
  status: StatusCode,
  kind: &'static str,
  message: String,
}

impl ApiError {
  fn unknown_session(id: &str) -> Self {
    Self {
      status: StatusCode::NOT_FOUND,
      kind: "unknown_session",
      message: format!("Unknown session: {id}"),
    }
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    (self.status, Json(ErrorOut { error: self.message, kind: self.kind })).into_response()
  }
}

/// `Json` body extractor whose rejections use the `{ error, kind }` shape.
#[derive(FromRequest)]
#[from_request(via(Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);

impl From<JsonRejection> for ApiError {
  fn from(rejection: JsonRejection) -> Self {
    let (status, kind) = match rejection.status() {
      StatusCode::PAYLOAD_TOO_LARGE => (StatusCode::PAYLOAD_TOO_LARGE, "payload_too_large"),
      _ => (StatusCode::BAD_REQUEST, "bad_request"),
    };
    warn!(target: "scantest_backend", %status, error = %rejection.body_text(), "Request body rejected");
    Self { status, kind, message: rejection.body_text() }
  }
}

impl From<PipelineError> for ApiError {
  fn from(e: PipelineError) -> Self {
    let status = match e {
      PipelineError::NoInput | PipelineError::InvalidImage(_) => StatusCode::BAD_REQUEST,
      PipelineError::ExtractionEmpty | PipelineError::SchemaViolation(_) => StatusCode::UNPROCESSABLE_ENTITY,
      PipelineError::Service(_) => StatusCode::BAD_GATEWAY,
    };
    Self { status, kind: e.kind(), message: e.to_string() }
  }
}

impl From<SessionError> for ApiError {
  fn from(e: SessionError) -> Self {
    let (status, kind) = match e {
      SessionError::QuestionOutOfRange { .. } => (StatusCode::BAD_REQUEST, "question_out_of_range"),
      SessionError::OptionOutOfRange(_) => (StatusCode::BAD_REQUEST, "option_out_of_range"),
      SessionError::NoQuestions => (StatusCode::CONFLICT, "no_questions"),
      SessionError::NotStarted => (StatusCode::CONFLICT, "not_started"),
      SessionError::AlreadySubmitted => (StatusCode::CONFLICT, "already_submitted"),
      SessionError::GenerationInProgress => (StatusCode::CONFLICT, "generation_in_progress"),
      SessionError::StaleRun { .. } => (StatusCode::CONFLICT, "stale_run"),
    };
    Self { status, kind, message: e.to_string() }
  }
}

impl From<ResultsError> for ApiError {
  fn from(e: ResultsError) -> Self {
    Self { status: StatusCode::CONFLICT, kind: "results_not_ready", message: e.to_string() }
  }
}

impl From<StartError> for ApiError {
  fn from(e: StartError) -> Self {
    match e {
      StartError::Input(e) => e.into(),
      StartError::Session(e) => e.into(),
    }
  }
}

impl From<QuizError> for ApiError {
  fn from(e: QuizError) -> Self {
    match e {
      QuizError::Session(e) => e.into(),
      QuizError::Results(e) => e.into(),
    }
  }
}

async fn session_of(state: &AppState, id: &str) -> Result<SessionHandle, ApiError> {
  state.session(id).await.ok_or_else(|| ApiError::unknown_session(id))
}

async fn quiz_of(state: &AppState, id: &str) -> Result<QuizRunner, ApiError> {
  state.quiz(id).await.ok_or_else(|| ApiError::unknown_session(id))
}

#[instrument(level = "info", skip(state))]
pub async fn http_health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
  Json(HealthOut {
    ok: true,
    prompt_service: state.service.name().to_string(),
    exam: state.config.exam.name.clone(),
  })
}

#[instrument(level = "info", skip(state))]
pub async fn http_create_session(State(state): State<Arc<AppState>>) -> impl IntoResponse {
  let handle = state.create_session().await;
  (StatusCode::CREATED, Json(CreateSessionOut { session_id: handle.id().to_string() }))
}

#[instrument(level = "info", skip(state), fields(%id))]
pub async fn http_get_session(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
) -> Result<Json<SessionSnapshotOut>, ApiError> {
  let handle = session_of(&state, &id).await?;
  Ok(Json(to_snapshot(&id, &handle.snapshot())))
}

#[instrument(level = "info", skip(state), fields(%id))]
pub async fn http_delete_session(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
  if state.remove_session(&id).await {
    Ok(StatusCode::NO_CONTENT)
  } else {
    Err(ApiError::unknown_session(&id))
  }
}

/// Open a generation run and execute it in the background; progress is polled
/// via `GET /sessions/:id` or streamed over `/ws`.
#[instrument(level = "info", skip(state, body), fields(%id))]
pub async fn http_post_generate(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
  ApiJson(body): ApiJson<GenerateIn>,
) -> Result<impl IntoResponse, ApiError> {
  let handle = session_of(&state, &id).await?;
  let image = body.into_image()?;
  let run = state.pipeline().begin(&handle, image)?;
  let out = GenerateOut { session_id: id.clone(), run: run.run_id(), stage: handle.snapshot().stage };
  tokio::spawn(async move {
    let outcome = run.execute().await;
    info!(target: "pipeline", session = %id, ?outcome, "Background generation finished");
  });
  Ok((StatusCode::ACCEPTED, Json(out)))
}

#[instrument(level = "info", skip(state), fields(%id))]
pub async fn http_post_reset(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
) -> Result<Json<SessionSnapshotOut>, ApiError> {
  let handle = session_of(&state, &id).await?;
  let s = handle.reset();
  info!(target: "quiz", session = %id, "Session reset");
  Ok(Json(to_snapshot(&id, &s)))
}

#[instrument(level = "info", skip(state), fields(%id))]
pub async fn http_get_quiz(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
  let quiz = quiz_of(&state, &id).await?;
  Ok(Json(quiz.current(now_ms())?))
}

#[instrument(level = "info", skip(state), fields(%id))]
pub async fn http_post_next(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
  let quiz = quiz_of(&state, &id).await?;
  Ok(Json(quiz.next(now_ms())?))
}

#[instrument(level = "info", skip(state), fields(%id))]
pub async fn http_post_previous(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
  let quiz = quiz_of(&state, &id).await?;
  Ok(Json(quiz.previous(now_ms())?))
}

#[instrument(level = "info", skip(state, body), fields(%id, index = body.index))]
pub async fn http_post_goto(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
  ApiJson(body): ApiJson<GotoIn>,
) -> Result<impl IntoResponse, ApiError> {
  let quiz = quiz_of(&state, &id).await?;
  Ok(Json(quiz.goto(body.index, now_ms())?))
}

#[instrument(level = "info", skip(state, body), fields(%id, question = ?body.question_index, option = body.option_index))]
pub async fn http_post_answer(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
  ApiJson(body): ApiJson<AnswerIn>,
) -> Result<impl IntoResponse, ApiError> {
  let quiz = quiz_of(&state, &id).await?;
  Ok(Json(quiz.answer(body.question_index, body.option_index, now_ms())?))
}

#[instrument(level = "info", skip(state), fields(%id))]
pub async fn http_post_submit(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
  let quiz = quiz_of(&state, &id).await?;
  match quiz.submit(now_ms()) {
    Ok(results) => Ok(Json(results)),
    Err(e) => {
      warn!(target: "quiz", session = %id, error = %e, "Submit rejected");
      Err(e.into())
    }
  }
}

#[instrument(level = "info", skip(state), fields(%id))]
pub async fn http_get_results(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
  let quiz = quiz_of(&state, &id).await?;
  Ok(Json(quiz.results()?))
}
