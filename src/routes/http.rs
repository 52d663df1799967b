//! HTTP endpoint handlers. These are thin wrappers that forward to core logic.
//! Each handler is instrumented; errors map to status codes via `StudyError`.

use std::sync::Arc;

use axum::{
  extract::{Query, State},
  response::IntoResponse,
  Json,
};
use tracing::{info, instrument};

use crate::errors::StudyError;
use crate::logic::*;
use crate::protocol::*;
use crate::state::AppState;

#[instrument(level = "info")]
pub async fn http_health() -> impl IntoResponse {
  Json(HealthOut { ok: true })
}

#[instrument(level = "info", skip(state))]
pub async fn http_start_session(State(state): State<Arc<AppState>>) -> impl IntoResponse {
  let view = start_session(&state).await;
  info!(target: "study", student_id = %view.student_id, "HTTP session created");
  Json(view)
}

#[instrument(level = "debug", skip(state), fields(%q.session_id))]
pub async fn http_get_state(
  State(state): State<Arc<AppState>>,
  Query(q): Query<SessionRef>,
) -> Result<Json<SessionView>, StudyError> {
  get_state(&state, &q.session_id).await.map(Json)
}

#[instrument(level = "info", skip(state, body), fields(%body.session_id, agree = body.agree))]
pub async fn http_post_consent(
  State(state): State<Arc<AppState>>,
  Json(body): Json<ConsentIn>,
) -> Result<Json<SessionView>, StudyError> {
  give_consent(&state, &body.session_id, body.agree).await.map(Json)
}

#[instrument(level = "info", skip(state, body), fields(%body.session_id))]
pub async fn http_post_demographics(
  State(state): State<Arc<AppState>>,
  Json(body): Json<DemographicsBody>,
) -> Result<Json<SessionView>, StudyError> {
  submit_demographics(&state, &body.session_id, body.demographics).await.map(Json)
}

#[instrument(level = "info", skip(state, body), fields(%body.session_id))]
pub async fn http_post_instructions(
  State(state): State<Arc<AppState>>,
  Json(body): Json<SessionRef>,
) -> Result<Json<SessionView>, StudyError> {
  confirm_instructions(&state, &body.session_id).await.map(Json)
}

#[instrument(level = "info", skip(state, body), fields(%body.session_id, attempt_len = body.attempt.len()))]
pub async fn http_post_attempt(
  State(state): State<Arc<AppState>>,
  Json(body): Json<AttemptIn>,
) -> Result<Json<SessionView>, StudyError> {
  submit_attempt(&state, &body.session_id, &body.attempt).await.map(Json)
}

#[instrument(level = "info", skip(state, body), fields(%body.session_id))]
pub async fn http_post_initial_rubric(
  State(state): State<Arc<AppState>>,
  Json(body): Json<RubricBody>,
) -> Result<Json<SessionView>, StudyError> {
  submit_initial_rubric(&state, &body.session_id, body.ratings).await.map(Json)
}

#[instrument(level = "info", skip(state, body), fields(%body.session_id, text_len = body.text.len()))]
pub async fn http_post_reply(
  State(state): State<Arc<AppState>>,
  Json(body): Json<ReplyIn>,
) -> Result<Json<SessionView>, StudyError> {
  send_reply(&state, &body.session_id, &body.text).await.map(Json)
}

#[instrument(level = "info", skip(state, body), fields(%body.session_id))]
pub async fn http_post_finish(
  State(state): State<Arc<AppState>>,
  Json(body): Json<SessionRef>,
) -> Result<Json<SessionView>, StudyError> {
  finish_dialogue(&state, &body.session_id).await.map(Json)
}

#[instrument(level = "info", skip(state, body), fields(%body.session_id))]
pub async fn http_post_rubric(
  State(state): State<Arc<AppState>>,
  Json(body): Json<RubricBody>,
) -> Result<Json<SessionView>, StudyError> {
  submit_rubric(&state, &body.session_id, body.ratings).await.map(Json)
}

#[instrument(level = "info", skip(state, body), fields(%body.session_id, answer_len = body.answer.len()))]
pub async fn http_post_followup(
  State(state): State<Arc<AppState>>,
  Json(body): Json<FollowupIn>,
) -> Result<Json<SessionView>, StudyError> {
  submit_followup(&state, &body.session_id, &body.answer).await.map(Json)
}

#[instrument(level = "info", skip(state, body), fields(%body.session_id))]
pub async fn http_post_next_task(
  State(state): State<Arc<AppState>>,
  Json(body): Json<SessionRef>,
) -> Result<Json<SessionView>, StudyError> {
  next_task(&state, &body.session_id).await.map(Json)
}

#[instrument(level = "info", skip(state, body), fields(%body.session_id, text_len = body.text.len()))]
pub async fn http_post_comments(
  State(state): State<Arc<AppState>>,
  Json(body): Json<CommentsIn>,
) -> Result<Json<SessionView>, StudyError> {
  submit_comments(&state, &body.session_id, &body.text).await.map(Json)
}

#[instrument(level = "info", skip(state, body), fields(%body.session_id))]
pub async fn http_post_save(
  State(state): State<Arc<AppState>>,
  Json(body): Json<SessionRef>,
) -> Result<Json<SessionView>, StudyError> {
  save_session(&state, &body.session_id).await.map(Json)
}
