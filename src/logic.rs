//! Core behaviors shared by both HTTP and WebSocket handlers.
//!
//! Each function locks the participant's session for the whole transition,
//! including any external call. That lock is the re-entrancy guard: a
//! second trigger for the same session waits instead of interleaving, and
//! no two transitions ever run concurrently for one session.
//!
//! External calls happen between validation and commit. A failed or empty
//! tutor reply therefore commits nothing: the session stays at the
//! pre-call state and the same action can be retried.

use tracing::{info, instrument, warn};

use crate::domain::Rubric;
use crate::errors::StudyError;
use crate::protocol::{view_of, DemographicsIn, RubricIn, SessionView};
use crate::session::{Mode, Phase, Session};
use crate::state::AppState;
use crate::util::{fill_template, reveals_solution, trunc_for_log};

fn require_mode(s: &Session, mode: Mode, event: &'static str) -> Result<(), StudyError> {
  match &s.current {
    Some(t) if t.mode == mode => Ok(()),
    _ => Err(StudyError::OrderingViolation { event, state: s.state_name() }),
  }
}

/// Materialize the active task for the current slot if none exists yet.
fn ensure_active_task(state: &AppState, s: &mut Session) -> Result<(), StudyError> {
  if s.phase != Phase::Tasks || s.current.is_some() {
    return Ok(());
  }
  let spec = state
    .task_list
    .get(s.task_index)
    .ok_or_else(|| StudyError::ExternalCall(format!("no task configured for slot {}", s.task_index)))?;
  let card = state
    .problems
    .get(spec.row)
    .ok_or_else(|| StudyError::ExternalCall(format!("problem row {} is missing", spec.row)))?;
  s.begin_task(&spec.label, card)?;
  info!(target: "study", student_id = %s.student_id, task = %spec.label, row = spec.row, "Task activated");
  Ok(())
}

#[instrument(level = "info", skip(state))]
pub async fn start_session(state: &AppState) -> SessionView {
  let (_, handle) = state.create_session().await;
  let s = handle.lock().await;
  view_of(&s, state.task_count())
}

#[instrument(level = "debug", skip(state), fields(%session_id))]
pub async fn get_state(state: &AppState, session_id: &str) -> Result<SessionView, StudyError> {
  let handle = state.session(session_id).await?;
  let s = handle.lock().await;
  Ok(view_of(&s, state.task_count()))
}

#[instrument(level = "info", skip(state), fields(%session_id, agree))]
pub async fn give_consent(
  state: &AppState,
  session_id: &str,
  agree: bool,
) -> Result<SessionView, StudyError> {
  let handle = state.session(session_id).await?;
  let mut s = handle.lock().await;
  s.give_consent(agree)?;
  info!(target: "study", student_id = %s.student_id, "Consent recorded");
  Ok(view_of(&s, state.task_count()))
}

#[instrument(level = "info", skip(state, demographics), fields(%session_id))]
pub async fn submit_demographics(
  state: &AppState,
  session_id: &str,
  demographics: DemographicsIn,
) -> Result<SessionView, StudyError> {
  let handle = state.session(session_id).await?;
  let mut s = handle.lock().await;
  s.submit_demographics(demographics.into())?;
  info!(target: "study", student_id = %s.student_id, "Demographics recorded");
  Ok(view_of(&s, state.task_count()))
}

#[instrument(level = "info", skip(state), fields(%session_id))]
pub async fn confirm_instructions(
  state: &AppState,
  session_id: &str,
) -> Result<SessionView, StudyError> {
  let handle = state.session(session_id).await?;
  let mut s = handle.lock().await;
  s.confirm_instructions()?;
  ensure_active_task(state, &mut s)?;
  Ok(view_of(&s, state.task_count()))
}

#[instrument(level = "info", skip(state, attempt), fields(%session_id, attempt_len = attempt.len()))]
pub async fn submit_attempt(
  state: &AppState,
  session_id: &str,
  attempt: &str,
) -> Result<SessionView, StudyError> {
  let handle = state.session(session_id).await?;
  let mut s = handle.lock().await;
  ensure_active_task(state, &mut s)?;

  let attempt = attempt.trim();
  if attempt.is_empty() {
    return Err(StudyError::InputRejected("attempt must not be empty"));
  }
  require_mode(&s, Mode::AwaitingFirstAttempt, "submit_attempt")?;

  let (problem, solution) = {
    let t = s.current.as_ref().ok_or_else(|| StudyError::OrderingViolation {
      event: "submit_attempt",
      state: s.state_name(),
    })?;
    (t.problem.clone(), t.correct_solution.clone())
  };

  let tutor = state
    .tutor
    .as_ref()
    .ok_or_else(|| StudyError::ExternalCall("tutor backend not configured (set OPENAI_API_KEY)".into()))?;
  let feedback = tutor
    .initial_feedback(&state.prompts, &problem, attempt, &solution)
    .await
    .map_err(StudyError::ExternalCall)?;

  let system_ctx = format!(
    "{}\n\n{}",
    state.prompts.tutor_system,
    fill_template(&state.prompts.tutoring_context_template, &[
      ("problem", problem.as_str()),
      ("attempt", attempt),
      ("solution", solution.as_str()),
    ]),
  );
  let attempt_ctx = fill_template(&state.prompts.attempt_context_template, &[
    ("problem", problem.as_str()),
    ("attempt", attempt),
  ]);

  s.open_dialogue(attempt, feedback, system_ctx, attempt_ctx)?;
  info!(target: "study", student_id = %s.student_id, "Initial feedback delivered");
  Ok(view_of(&s, state.task_count()))
}

#[instrument(level = "info", skip(state, ratings), fields(%session_id))]
pub async fn submit_initial_rubric(
  state: &AppState,
  session_id: &str,
  ratings: RubricIn,
) -> Result<SessionView, StudyError> {
  let handle = state.session(session_id).await?;
  let mut s = handle.lock().await;
  require_mode(&s, Mode::InitialFeedback, "submit_initial_rubric")?;
  let rubric = Rubric::try_from(ratings)?;
  s.set_initial_rubric(rubric)?;
  info!(target: "study", student_id = %s.student_id, "Initial rubric recorded; reply input unlocked");
  Ok(view_of(&s, state.task_count()))
}

#[instrument(level = "info", skip(state, text), fields(%session_id, text_len = text.len()))]
pub async fn send_reply(
  state: &AppState,
  session_id: &str,
  text: &str,
) -> Result<SessionView, StudyError> {
  let handle = state.session(session_id).await?;
  let mut s = handle.lock().await;

  let text = text.trim();
  if text.is_empty() {
    return Err(StudyError::InputRejected("reply must not be empty"));
  }
  require_mode(&s, Mode::Main, "reply")?;

  let (scaffold, solution) = {
    let t = s.current.as_ref().ok_or_else(|| StudyError::OrderingViolation {
      event: "reply",
      state: s.state_name(),
    })?;
    (t.scaffold_with(text), t.correct_solution.clone())
  };

  let tutor = state
    .tutor
    .as_ref()
    .ok_or_else(|| StudyError::ExternalCall("tutor backend not configured (set OPENAI_API_KEY)".into()))?;
  let reply = tutor.continue_dialogue(&scaffold).await.map_err(StudyError::ExternalCall)?;

  // Monitoring only: the dialogue system prompt forbids revealing the
  // official solution, but a verbatim quote is worth flagging.
  if reveals_solution(&reply, &solution) {
    warn!(target: "tutor", student_id = %s.student_id, reply = %trunc_for_log(&reply, 120), "Tutor reply quotes the official solution verbatim");
  }

  s.append_exchange(text, reply)?;
  Ok(view_of(&s, state.task_count()))
}

#[instrument(level = "info", skip(state), fields(%session_id))]
pub async fn finish_dialogue(
  state: &AppState,
  session_id: &str,
) -> Result<SessionView, StudyError> {
  let handle = state.session(session_id).await?;
  let mut s = handle.lock().await;
  s.finish_dialogue()?;
  Ok(view_of(&s, state.task_count()))
}

#[instrument(level = "info", skip(state, ratings), fields(%session_id))]
pub async fn submit_rubric(
  state: &AppState,
  session_id: &str,
  ratings: RubricIn,
) -> Result<SessionView, StudyError> {
  let handle = state.session(session_id).await?;
  let mut s = handle.lock().await;
  require_mode(&s, Mode::Evaluation, "submit_rubric")?;
  let rubric = Rubric::try_from(ratings)?;
  s.set_rubric(rubric)?;
  Ok(view_of(&s, state.task_count()))
}

#[instrument(level = "info", skip(state, answer), fields(%session_id, answer_len = answer.len()))]
pub async fn submit_followup(
  state: &AppState,
  session_id: &str,
  answer: &str,
) -> Result<SessionView, StudyError> {
  let handle = state.session(session_id).await?;
  let mut s = handle.lock().await;

  let answer = answer.trim();
  if answer.is_empty() {
    return Err(StudyError::InputRejected("follow-up answer must not be empty"));
  }
  require_mode(&s, Mode::Followup, "submit_followup")?;

  let (similar_problem, similar_solution) = {
    let t = s.current.as_ref().ok_or_else(|| StudyError::OrderingViolation {
      event: "submit_followup",
      state: s.state_name(),
    })?;
    (t.similar_problem.clone(), t.similar_solution.clone())
  };

  let tutor = state
    .tutor
    .as_ref()
    .ok_or_else(|| StudyError::ExternalCall("tutor backend not configured (set OPENAI_API_KEY)".into()))?;
  let feedback = tutor
    .evaluate_followup(&state.prompts, &similar_problem, answer, &similar_solution)
    .await
    .map_err(StudyError::ExternalCall)?;

  s.record_followup(answer, feedback)?;

  // Close the task log: appended exactly once, then dumped for diagnosis.
  if s.append_completed()? {
    if let Some(record) = s.tasks.last() {
      state.audit.dump_task(&s.student_id, record).await;
      state.audit.dump_followup(&s.student_id, record).await;
    }
    info!(target: "study", student_id = %s.student_id, completed = s.tasks.len(), "Task appended to session log");
  }
  Ok(view_of(&s, state.task_count()))
}

#[instrument(level = "info", skip(state), fields(%session_id))]
pub async fn next_task(state: &AppState, session_id: &str) -> Result<SessionView, StudyError> {
  let handle = state.session(session_id).await?;
  let mut s = handle.lock().await;
  s.advance_task(state.task_count())?;
  ensure_active_task(state, &mut s)?;
  Ok(view_of(&s, state.task_count()))
}

#[instrument(level = "info", skip(state, text), fields(%session_id, text_len = text.len()))]
pub async fn submit_comments(
  state: &AppState,
  session_id: &str,
  text: &str,
) -> Result<SessionView, StudyError> {
  let handle = state.session(session_id).await?;
  let mut s = handle.lock().await;
  s.set_comments(text, state.task_count())?;
  Ok(view_of(&s, state.task_count()))
}

/// Flatten the session and push it through every configured sink, then mark
/// the session saved. Partial failure leaves the in-memory session ahead of
/// the persisted record; there is no rollback, only a retry-able error.
#[instrument(level = "info", skip(state), fields(%session_id))]
pub async fn save_session(state: &AppState, session_id: &str) -> Result<SessionView, StudyError> {
  let handle = state.session(session_id).await?;
  let mut s = handle.lock().await;
  if s.tasks.len() != state.task_count() {
    return Err(StudyError::OrderingViolation { event: "save", state: s.state_name() });
  }

  let record = crate::session::flatten_session(&s);
  for sink in &state.sinks {
    sink
      .append_row(&record)
      .await
      .map_err(|e| StudyError::ExternalCall(format!("{} sink: {}", sink.name(), e)))?;
  }

  s.mark_saved(state.task_count())?;
  info!(target: "study", student_id = %s.student_id, columns = record.len(), "Session saved");
  Ok(view_of(&s, state.task_count()))
}
