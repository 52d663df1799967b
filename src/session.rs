//! The session/task state machine and its logging contract.
//!
//! A `Session` is an explicit value owned by the in-memory store; every
//! mutation goes through the transition methods here, which enforce the
//! phase and mode ordering. Handlers never poke fields directly.
//!
//! Per-task mode order:
//! awaiting_first_attempt -> initial_feedback (initial-rubric gate) -> main
//! -> evaluation -> followup -> feedback_shown -> done.
//!
//! Task-advance ordering is clear-then-advance: the per-task transient
//! state is discarded first, then `task_index` is incremented; a fresh task
//! is created on demand for the new index.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::domain::{ChatMessage, Demographics, ProblemCard, Rubric, Turn};
use crate::errors::StudyError;

/// Session-level progression. Demographics always precede tutoring.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
  Consent,
  Demographics,
  Instructions,
  Tasks,
  Done,
}

/// Per-task sub-mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
  AwaitingFirstAttempt,
  InitialFeedback,
  Main,
  Evaluation,
  Followup,
  FeedbackShown,
  Done,
}

/// The active task instance. Created fresh when its slot becomes active,
/// discarded at task advance; the durable snapshot is `TaskRecord`.
#[derive(Clone, Debug)]
pub struct Task {
  pub label: String,
  pub problem: String,
  pub correct_solution: String,
  pub similar_problem: String,
  pub similar_solution: String,

  pub mode: Mode,
  pub student_attempt: String,
  pub initial_feedback: String,

  /// Full prompt buffer sent to the tutor backend, including the system
  /// scaffolding that carries the official solution.
  pub scaffold: Vec<ChatMessage>,
  /// Human-visible turns only. Appended in lockstep with `scaffold` during
  /// `main`; the seeding scaffolding never appears here.
  pub transcript: Vec<Turn>,

  pub initial_rubric: Option<Rubric>,
  pub rubric: Option<Rubric>,

  pub followup_response: String,
  pub followup_feedback: String,
  pub completed_at: Option<DateTime<Utc>>,

  /// Set once the snapshot has been appended to `Session::tasks`.
  pub completed: bool,
}

impl Task {
  fn new(label: &str, card: &ProblemCard) -> Self {
    Self {
      label: label.to_string(),
      problem: card.problem_statement.clone(),
      correct_solution: card.problem_solution.clone(),
      similar_problem: card.new_problem.clone(),
      similar_solution: card.new_solution.clone(),
      mode: Mode::AwaitingFirstAttempt,
      student_attempt: String::new(),
      initial_feedback: String::new(),
      scaffold: Vec::new(),
      transcript: Vec::new(),
      initial_rubric: None,
      rubric: None,
      followup_response: String::new(),
      followup_feedback: String::new(),
      completed_at: None,
      completed: false,
    }
  }

  /// The prompt buffer with a pending student message appended, for the
  /// dialogue-continuation call. Nothing is committed here.
  pub fn scaffold_with(&self, student_msg: &str) -> Vec<ChatMessage> {
    let mut msgs = self.scaffold.clone();
    msgs.push(ChatMessage::user(student_msg));
    msgs
  }
}

/// Immutable snapshot of a completed task, appended to the session log
/// exactly once. The transcript is copied in so later tasks cannot alias it.
#[derive(Clone, Debug, Serialize)]
pub struct TaskRecord {
  pub label: String,
  pub problem: String,
  pub student_attempt: String,
  pub correct_solution: String,
  pub initial_feedback: String,
  pub messages: Vec<Turn>,
  pub initial_rubrics: Rubric,
  pub rubrics: Rubric,
  pub similar_problem: String,
  pub similar_solution: String,
  pub followup_response: String,
  pub followup_feedback: String,
  pub timestamp: String,
}

/// One participant run.
#[derive(Clone, Debug)]
pub struct Session {
  pub student_id: String,
  pub phase: Phase,
  pub demographics: Option<Demographics>,
  pub task_index: usize,
  pub current: Option<Task>,
  pub tasks: Vec<TaskRecord>,
  pub additional_comments: Option<String>,
  pub saved: bool,
  pub created_at: DateTime<Utc>,
}

impl Session {
  pub fn new() -> Self {
    let now = Utc::now();
    let short = Uuid::new_v4().simple().to_string();
    Self {
      student_id: format!("user_{}_{}", now.format("%Y%m%d_%H%M%S"), &short[..8]),
      phase: Phase::Consent,
      demographics: None,
      task_index: 0,
      current: None,
      tasks: Vec::new(),
      additional_comments: None,
      saved: false,
      created_at: now,
    }
  }

  /// Human-readable state tag for ordering-violation messages.
  pub fn state_name(&self) -> String {
    match &self.current {
      Some(t) => format!("{:?}/{:?}", self.phase, t.mode),
      None => format!("{:?}", self.phase),
    }
  }

  fn ordering(&self, event: &'static str) -> StudyError {
    StudyError::OrderingViolation { event, state: self.state_name() }
  }

  // ----- session-level phases -----

  pub fn give_consent(&mut self, agree: bool) -> Result<(), StudyError> {
    if self.phase != Phase::Consent {
      return Err(self.ordering("consent"));
    }
    if !agree {
      return Err(StudyError::InputRejected("consent must be affirmative to proceed"));
    }
    self.phase = Phase::Demographics;
    Ok(())
  }

  pub fn submit_demographics(&mut self, d: Demographics) -> Result<(), StudyError> {
    if self.phase != Phase::Demographics {
      return Err(self.ordering("demographics"));
    }
    d.validate().map_err(StudyError::InputRejected)?;
    self.demographics = Some(d);
    self.phase = Phase::Instructions;
    Ok(())
  }

  pub fn confirm_instructions(&mut self) -> Result<(), StudyError> {
    if self.phase != Phase::Instructions {
      return Err(self.ordering("instructions"));
    }
    self.phase = Phase::Tasks;
    Ok(())
  }

  // ----- task lifecycle -----

  /// Create the active task for the current slot. Always starts with a
  /// fresh transcript; nothing leaks from a previous task.
  pub fn begin_task(&mut self, label: &str, card: &ProblemCard) -> Result<(), StudyError> {
    if self.phase != Phase::Tasks {
      return Err(self.ordering("begin_task"));
    }
    if self.current.is_some() {
      return Err(self.ordering("begin_task"));
    }
    self.current = Some(Task::new(label, card));
    Ok(())
  }

  fn task_in_mode(&mut self, event: &'static str, mode: Mode) -> Result<&mut Task, StudyError> {
    let err = self.ordering(event);
    match self.current.as_mut() {
      Some(t) if t.mode == mode => Ok(t),
      _ => Err(err),
    }
  }

  /// Commit the first attempt and its initial feedback: seed the prompt
  /// buffer with the tutoring context and the feedback as the tutor's first
  /// turn. Immutable afterwards — the mode gate makes a second submission
  /// an ordering violation.
  pub fn open_dialogue(
    &mut self,
    attempt: &str,
    feedback: String,
    system_ctx: String,
    attempt_ctx: String,
  ) -> Result<(), StudyError> {
    let task = self.task_in_mode("submit_attempt", Mode::AwaitingFirstAttempt)?;
    task.student_attempt = attempt.to_string();
    task.scaffold = vec![
      ChatMessage::system(system_ctx),
      ChatMessage::user(attempt_ctx),
      ChatMessage::assistant(feedback.clone()),
    ];
    task.initial_feedback = feedback;
    task.mode = Mode::InitialFeedback;
    Ok(())
  }

  /// Record the initial rubric and unlock the reply input.
  pub fn set_initial_rubric(&mut self, rubric: Rubric) -> Result<(), StudyError> {
    let task = self.task_in_mode("submit_initial_rubric", Mode::InitialFeedback)?;
    task.initial_rubric = Some(rubric);
    task.mode = Mode::Main;
    Ok(())
  }

  /// Commit one completed exchange: the student turn and the tutor's reply,
  /// appended to both buffers in lockstep. Called only after the tutor call
  /// succeeded, so a failed call commits nothing.
  pub fn append_exchange(&mut self, student: &str, tutor: String) -> Result<(), StudyError> {
    let task = self.task_in_mode("reply", Mode::Main)?;
    task.scaffold.push(ChatMessage::user(student));
    task.scaffold.push(ChatMessage::assistant(tutor.clone()));
    task.transcript.push(Turn::student(student));
    task.transcript.push(Turn::tutor(tutor));
    Ok(())
  }

  pub fn finish_dialogue(&mut self) -> Result<(), StudyError> {
    let task = self.task_in_mode("finish", Mode::Main)?;
    task.mode = Mode::Evaluation;
    Ok(())
  }

  pub fn set_rubric(&mut self, rubric: Rubric) -> Result<(), StudyError> {
    let task = self.task_in_mode("submit_rubric", Mode::Evaluation)?;
    task.rubric = Some(rubric);
    task.mode = Mode::Followup;
    Ok(())
  }

  /// Store the follow-up answer and its feedback, stamping completion time.
  pub fn record_followup(&mut self, response: &str, feedback: String) -> Result<(), StudyError> {
    let task = self.task_in_mode("submit_followup", Mode::Followup)?;
    task.followup_response = response.to_string();
    task.followup_feedback = feedback;
    task.completed_at = Some(Utc::now());
    task.mode = Mode::FeedbackShown;
    Ok(())
  }

  /// Append the completed task's snapshot to the session log. Idempotent:
  /// the snapshot is appended exactly once; repeat calls are no-ops.
  /// Returns whether an append happened.
  pub fn append_completed(&mut self) -> Result<bool, StudyError> {
    let err = self.ordering("append_completed");
    let task = match self.current.as_mut() {
      Some(t) if matches!(t.mode, Mode::FeedbackShown | Mode::Done) => t,
      _ => return Err(err),
    };
    if task.completed {
      return Ok(false);
    }
    let (Some(initial_rubrics), Some(rubrics)) = (task.initial_rubric, task.rubric) else {
      return Err(err);
    };
    let record = TaskRecord {
      label: task.label.clone(),
      problem: task.problem.clone(),
      student_attempt: task.student_attempt.clone(),
      correct_solution: task.correct_solution.clone(),
      initial_feedback: task.initial_feedback.clone(),
      messages: task.transcript.clone(),
      initial_rubrics,
      rubrics,
      similar_problem: task.similar_problem.clone(),
      similar_solution: task.similar_solution.clone(),
      followup_response: task.followup_response.clone(),
      followup_feedback: task.followup_feedback.clone(),
      timestamp: task
        .completed_at
        .map(|t| t.to_rfc3339())
        .unwrap_or_default(),
    };
    task.completed = true;
    self.tasks.push(record);
    Ok(true)
  }

  /// Advance to the next task slot: clear the per-task transient state
  /// first, then increment the index. Only valid after the snapshot was
  /// appended and only while further tasks remain.
  pub fn advance_task(&mut self, total: usize) -> Result<(), StudyError> {
    let err = self.ordering("next_task");
    match &self.current {
      Some(t) if t.mode == Mode::FeedbackShown && t.completed => {}
      _ => return Err(err),
    }
    if self.task_index + 1 >= total {
      return Err(err);
    }
    self.current = None;
    self.task_index += 1;
    Ok(())
  }

  pub fn is_last_task(&self, total: usize) -> bool {
    self.task_index + 1 >= total
  }

  /// Final comments, allowed once after every task is appended.
  pub fn set_comments(&mut self, text: &str, total: usize) -> Result<(), StudyError> {
    if self.tasks.len() != total || self.additional_comments.is_some() {
      return Err(self.ordering("comments"));
    }
    self.additional_comments = Some(text.trim().to_string());
    Ok(())
  }

  /// Mark the final save done. Append is at-least-once upstream, so a
  /// repeated save is allowed; the phase moves to done either way.
  pub fn mark_saved(&mut self, total: usize) -> Result<(), StudyError> {
    if self.tasks.len() != total {
      return Err(self.ordering("save"));
    }
    if let Some(t) = self.current.as_mut() {
      t.mode = Mode::Done;
    }
    self.saved = true;
    self.phase = Phase::Done;
    Ok(())
  }
}

impl Default for Session {
  fn default() -> Self {
    Self::new()
  }
}

/// Flatten the nested session into the ordered flat record appended to the
/// persistence sinks. Pure and idempotent: flattening the same session
/// twice yields byte-identical output.
pub fn flatten_session(session: &Session) -> Vec<(String, String)> {
  let mut flat: Vec<(String, String)> = Vec::new();
  flat.push(("student_id".into(), session.student_id.clone()));

  if let Some(d) = &session.demographics {
    flat.push(("age".into(), d.age.to_string()));
    flat.push(("gender".into(), d.gender.clone()));
    flat.push(("academic_background".into(), d.academic_background.clone()));
    flat.push(("academic_level".into(), d.academic_level.clone()));
  }

  for (i, task) in session.tasks.iter().enumerate() {
    let prefix = format!("task_{}_", i + 1);
    flat.push((format!("{prefix}problem"), task.problem.clone()));
    flat.push((format!("{prefix}attempt"), task.student_attempt.clone()));
    flat.push((format!("{prefix}initial_feedback"), task.initial_feedback.clone()));
    flat.push((
      format!("{prefix}initial_rubrics"),
      serde_json::to_string(&task.initial_rubrics).ok().unwrap_or_else(|| "{}".into()),
    ));
    flat.push((
      format!("{prefix}messages"),
      serde_json::to_string(&task.messages).ok().unwrap_or_else(|| "[]".into()),
    ));
    flat.push((
      format!("{prefix}rubrics"),
      serde_json::to_string(&task.rubrics).ok().unwrap_or_else(|| "{}".into()),
    ));
    flat.push((format!("{prefix}followup_problem"), task.similar_problem.clone()));
    flat.push((format!("{prefix}followup_response"), task.followup_response.clone()));
    flat.push((format!("{prefix}followup_feedback"), task.followup_feedback.clone()));
  }

  flat.push((
    "additional_comments".into(),
    session.additional_comments.clone().unwrap_or_default(),
  ));
  flat
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::Role;

  fn card() -> ProblemCard {
    ProblemCard {
      problem_statement: "How many ways to arrange BANANA?".into(),
      problem_solution: "6!/(3!2!) = 60".into(),
      new_problem: "How many ways to arrange COFFEE?".into(),
      new_solution: "6!/(2!2!) = 180".into(),
    }
  }

  fn demographics() -> Demographics {
    Demographics {
      age: 24,
      gender: "Non-binary".into(),
      academic_background: "Mathematics".into(),
      academic_level: "Bachelor".into(),
      other_details: String::new(),
    }
  }

  fn rubric(a: u8, b: u8, c: u8, d: u8, e: u8) -> Rubric {
    Rubric::new(a, b, c, d, e).unwrap()
  }

  /// Walk a fresh session up to an active task awaiting its first attempt.
  fn session_at_task() -> Session {
    let mut s = Session::new();
    s.give_consent(true).unwrap();
    s.submit_demographics(demographics()).unwrap();
    s.confirm_instructions().unwrap();
    s.begin_task("Problem 1: Easy", &card()).unwrap();
    s
  }

  /// Drive one task from attempt through follow-up feedback.
  fn complete_current_task(s: &mut Session) {
    s.open_dialogue(
      "I think there are 5 ways because...",
      "Good start, can you justify the count?".into(),
      "system ctx".into(),
      "attempt ctx".into(),
    )
    .unwrap();
    s.set_initial_rubric(rubric(3, 4, 5, 4, 5)).unwrap();
    s.append_exchange("can you give a hint?", "Think about repeated letters.".into()).unwrap();
    s.finish_dialogue().unwrap();
    s.set_rubric(rubric(3, 4, 5, 4, 5)).unwrap();
    s.record_followup("10 ways by symmetry", "Close, recheck the repeats.".into()).unwrap();
    s.append_completed().unwrap();
  }

  #[test]
  fn phases_advance_in_order() {
    let mut s = Session::new();
    assert_eq!(s.phase, Phase::Consent);
    // Demographics before consent is an ordering violation.
    assert!(matches!(
      s.submit_demographics(demographics()),
      Err(StudyError::OrderingViolation { .. })
    ));
    s.give_consent(true).unwrap();
    assert_eq!(s.phase, Phase::Demographics);
    s.submit_demographics(demographics()).unwrap();
    assert_eq!(s.phase, Phase::Instructions);
    s.confirm_instructions().unwrap();
    assert_eq!(s.phase, Phase::Tasks);
  }

  #[test]
  fn declined_consent_does_not_advance() {
    let mut s = Session::new();
    assert!(matches!(s.give_consent(false), Err(StudyError::InputRejected(_))));
    assert_eq!(s.phase, Phase::Consent);
  }

  #[test]
  fn reply_is_rejected_until_initial_rubric_is_recorded() {
    let mut s = session_at_task();
    s.open_dialogue("a substantive first attempt here", "feedback".into(), "sys".into(), "ctx".into())
      .unwrap();
    // Gate: no exchange before the initial rubric.
    assert!(matches!(
      s.append_exchange("hello?", "reply".into()),
      Err(StudyError::OrderingViolation { .. })
    ));
    s.set_initial_rubric(rubric(1, 2, 3, 4, 5)).unwrap();
    s.append_exchange("hello?", "reply".into()).unwrap();
    let t = s.current.as_ref().unwrap();
    assert_eq!(t.transcript.len(), 2);
  }

  #[test]
  fn attempt_and_feedback_are_immutable_once_set() {
    let mut s = session_at_task();
    s.open_dialogue("first attempt text goes here", "first feedback".into(), "sys".into(), "ctx".into())
      .unwrap();
    let err = s.open_dialogue("second attempt", "other feedback".into(), "sys".into(), "ctx".into());
    assert!(matches!(err, Err(StudyError::OrderingViolation { .. })));
    let t = s.current.as_ref().unwrap();
    assert_eq!(t.student_attempt, "first attempt text goes here");
    assert_eq!(t.initial_feedback, "first feedback");
  }

  #[test]
  fn buffers_append_in_lockstep_and_display_omits_scaffolding() {
    let mut s = session_at_task();
    s.open_dialogue("an attempt with actual steps", "fb".into(), "sys".into(), "ctx".into()).unwrap();
    s.set_initial_rubric(rubric(5, 5, 5, 5, 5)).unwrap();
    let t = s.current.as_ref().unwrap();
    // Scaffold carries system + context + feedback; the display transcript none of it.
    assert_eq!(t.scaffold.len(), 3);
    assert!(t.transcript.is_empty());

    s.append_exchange("why is my count off?", "Recount the repeats.".into()).unwrap();
    let t = s.current.as_ref().unwrap();
    assert_eq!(t.scaffold.len(), 5);
    assert_eq!(t.transcript.len(), 2);
    assert_eq!(t.transcript[0].role, Role::Student);
    assert_eq!(t.transcript[1].role, Role::Tutor);
  }

  #[test]
  fn scaffold_with_does_not_commit() {
    let mut s = session_at_task();
    s.open_dialogue("an attempt with actual steps", "fb".into(), "sys".into(), "ctx".into()).unwrap();
    s.set_initial_rubric(rubric(5, 5, 5, 5, 5)).unwrap();
    let t = s.current.as_ref().unwrap();
    let msgs = t.scaffold_with("pending question");
    assert_eq!(msgs.len(), t.scaffold.len() + 1);
    assert_eq!(t.scaffold.len(), 3);
    assert!(t.transcript.is_empty());
  }

  #[test]
  fn task_snapshot_is_appended_exactly_once() {
    let mut s = session_at_task();
    complete_current_task(&mut s);
    assert_eq!(s.tasks.len(), 1);
    // Second append is a no-op, not an error.
    assert!(!s.append_completed().unwrap());
    assert_eq!(s.tasks.len(), 1);
  }

  #[test]
  fn completed_scenario_records_rubrics_and_followup() {
    let mut s = session_at_task();
    complete_current_task(&mut s);
    let rec = &s.tasks[0];
    assert_eq!(rec.rubrics, rubric(3, 4, 5, 4, 5));
    assert_eq!(rec.followup_response, "10 ways by symmetry");
    assert_eq!(rec.messages.len(), 2);
    assert!(!rec.timestamp.is_empty());
  }

  #[test]
  fn followup_before_evaluation_rubric_is_ignored() {
    let mut s = session_at_task();
    s.open_dialogue("an attempt with actual steps", "fb".into(), "sys".into(), "ctx".into()).unwrap();
    s.set_initial_rubric(rubric(5, 5, 5, 5, 5)).unwrap();
    s.finish_dialogue().unwrap();
    // Still in evaluation; the follow-up answer must not corrupt state.
    let err = s.record_followup("answer", "feedback".into());
    assert!(matches!(err, Err(StudyError::OrderingViolation { .. })));
    assert_eq!(s.current.as_ref().unwrap().mode, Mode::Evaluation);
  }

  #[test]
  fn advance_clears_transients_then_increments() {
    let mut s = session_at_task();
    complete_current_task(&mut s);
    s.advance_task(3).unwrap();
    assert_eq!(s.task_index, 1);
    assert!(s.current.is_none());

    // A new task starts with a fresh transcript; no leakage.
    s.begin_task("Problem 2: Medium", &card()).unwrap();
    let t = s.current.as_ref().unwrap();
    assert!(t.transcript.is_empty());
    assert!(t.scaffold.is_empty());
    assert_eq!(t.mode, Mode::AwaitingFirstAttempt);
  }

  #[test]
  fn advance_past_the_last_task_is_rejected() {
    let mut s = session_at_task();
    complete_current_task(&mut s);
    assert!(s.is_last_task(1));
    assert!(matches!(s.advance_task(1), Err(StudyError::OrderingViolation { .. })));
  }

  #[test]
  fn comments_only_after_all_tasks_and_only_once() {
    let mut s = session_at_task();
    assert!(matches!(s.set_comments("too early", 1), Err(StudyError::OrderingViolation { .. })));
    complete_current_task(&mut s);
    s.set_comments("smooth run", 1).unwrap();
    assert!(matches!(s.set_comments("again", 1), Err(StudyError::OrderingViolation { .. })));
  }

  #[test]
  fn save_requires_all_tasks_appended() {
    let mut s = session_at_task();
    assert!(matches!(s.mark_saved(1), Err(StudyError::OrderingViolation { .. })));
    complete_current_task(&mut s);
    s.mark_saved(1).unwrap();
    assert!(s.saved);
    assert_eq!(s.phase, Phase::Done);
  }

  fn session_with_three_tasks() -> Session {
    let mut s = session_at_task();
    complete_current_task(&mut s);
    s.advance_task(3).unwrap();
    s.begin_task("Problem 2: Medium", &card()).unwrap();
    complete_current_task(&mut s);
    s.advance_task(3).unwrap();
    s.begin_task("Problem 3: Hard", &card()).unwrap();
    complete_current_task(&mut s);
    s
  }

  #[test]
  fn flatten_produces_one_prefixed_group_per_task() {
    let s = session_with_three_tasks();
    let flat = flatten_session(&s);
    for i in 1..=3 {
      for field in [
        "problem",
        "attempt",
        "initial_feedback",
        "initial_rubrics",
        "messages",
        "rubrics",
        "followup_problem",
        "followup_response",
        "followup_feedback",
      ] {
        let key = format!("task_{i}_{field}");
        assert!(flat.iter().any(|(k, _)| *k == key), "missing {key}");
      }
    }
    assert!(!flat.iter().any(|(k, _)| k.starts_with("task_4_")));
    assert_eq!(flat[0].0, "student_id");
    assert_eq!(flat.last().unwrap().0, "additional_comments");
  }

  #[test]
  fn flatten_is_pure_and_idempotent() {
    let s = session_with_three_tasks();
    let a = flatten_session(&s);
    let b = flatten_session(&s);
    assert_eq!(a, b);
  }

  #[test]
  fn flatten_serializes_roles_human_readably() {
    let mut s = session_at_task();
    complete_current_task(&mut s);
    let flat = flatten_session(&s);
    let (_, messages) = flat.iter().find(|(k, _)| k == "task_1_messages").unwrap();
    assert!(messages.contains("\"Student\""));
    assert!(messages.contains("\"Tutor\""));
    let (_, rubrics) = flat.iter().find(|(k, _)| k == "task_1_rubrics").unwrap();
    assert!(rubrics.contains("\"Diagnostic\":3"));
  }
}
