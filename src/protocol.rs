//! Public protocol structs for WebSocket and HTTP endpoints (serde ready).
//! Keep this small and stable to evolve backend and frontend independently.
//!
//! The snapshot sent to the client never contains the official solutions;
//! those stay server-side in the scaffold buffer.

use serde::{Deserialize, Serialize};

use crate::domain::{Demographics, Rubric, Turn};
use crate::errors::StudyError;
use crate::session::{Mode, Phase, Session};

/// Messages the client can send over WebSocket.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientWsMessage {
    Ping,
    StartSession,
    GetState {
        #[serde(rename = "sessionId")]
        session_id: String,
    },
    Consent {
        #[serde(rename = "sessionId")]
        session_id: String,
        agree: bool,
    },
    Demographics {
        #[serde(rename = "sessionId")]
        session_id: String,
        demographics: DemographicsIn,
    },
    InstructionsRead {
        #[serde(rename = "sessionId")]
        session_id: String,
    },
    SubmitAttempt {
        #[serde(rename = "sessionId")]
        session_id: String,
        attempt: String,
    },
    SubmitInitialRubric {
        #[serde(rename = "sessionId")]
        session_id: String,
        ratings: RubricIn,
    },
    Reply {
        #[serde(rename = "sessionId")]
        session_id: String,
        text: String,
    },
    FinishDialogue {
        #[serde(rename = "sessionId")]
        session_id: String,
    },
    SubmitRubric {
        #[serde(rename = "sessionId")]
        session_id: String,
        ratings: RubricIn,
    },
    SubmitFollowup {
        #[serde(rename = "sessionId")]
        session_id: String,
        answer: String,
    },
    NextTask {
        #[serde(rename = "sessionId")]
        session_id: String,
    },
    Comments {
        #[serde(rename = "sessionId")]
        session_id: String,
        text: String,
    },
    SaveSession {
        #[serde(rename = "sessionId")]
        session_id: String,
    },
}

/// Messages the server sends back over WebSocket.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerWsMessage {
    Pong,
    State { session: SessionView },
    Error { message: String },
}

/// Rubric ratings as submitted by the client. All five criteria are
/// required; anything missing or out of range keeps the gate open.
#[derive(Clone, Copy, Debug, Deserialize)]
pub struct RubricIn {
    #[serde(default)]
    pub diagnostic: Option<u8>,
    #[serde(default)]
    pub correctness: Option<u8>,
    #[serde(default, rename = "notRevealing")]
    pub not_revealing: Option<u8>,
    #[serde(default)]
    pub applicable: Option<u8>,
    #[serde(default)]
    pub positive: Option<u8>,
}

impl TryFrom<RubricIn> for Rubric {
    type Error = StudyError;

    fn try_from(r: RubricIn) -> Result<Self, StudyError> {
        match (r.diagnostic, r.correctness, r.not_revealing, r.applicable, r.positive) {
            (Some(d), Some(c), Some(n), Some(a), Some(p)) => {
                Rubric::new(d, c, n, a, p).ok_or(StudyError::IncompleteGate)
            }
            _ => Err(StudyError::IncompleteGate),
        }
    }
}

/// Demographics as submitted by the client.
#[derive(Clone, Debug, Deserialize)]
pub struct DemographicsIn {
    pub age: u8,
    pub gender: String,
    #[serde(rename = "academicBackground")]
    pub academic_background: String,
    #[serde(rename = "academicLevel")]
    pub academic_level: String,
    #[serde(default, rename = "otherDetails")]
    pub other_details: String,
}

impl From<DemographicsIn> for Demographics {
    fn from(d: DemographicsIn) -> Self {
        Demographics {
            age: d.age,
            gender: d.gender,
            academic_background: d.academic_background,
            academic_level: d.academic_level,
            other_details: d.other_details,
        }
    }
}

//
// HTTP request/response DTOs
//

#[derive(Debug, Deserialize)]
pub struct SessionRef {
    #[serde(rename = "sessionId")]
    pub session_id: String,
}

#[derive(Debug, Deserialize)]
pub struct ConsentIn {
    #[serde(rename = "sessionId")]
    pub session_id: String,
    pub agree: bool,
}

#[derive(Debug, Deserialize)]
pub struct DemographicsBody {
    #[serde(rename = "sessionId")]
    pub session_id: String,
    #[serde(flatten)]
    pub demographics: DemographicsIn,
}

#[derive(Debug, Deserialize)]
pub struct AttemptIn {
    #[serde(rename = "sessionId")]
    pub session_id: String,
    pub attempt: String,
}

#[derive(Debug, Deserialize)]
pub struct RubricBody {
    #[serde(rename = "sessionId")]
    pub session_id: String,
    pub ratings: RubricIn,
}

#[derive(Debug, Deserialize)]
pub struct ReplyIn {
    #[serde(rename = "sessionId")]
    pub session_id: String,
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub struct FollowupIn {
    #[serde(rename = "sessionId")]
    pub session_id: String,
    pub answer: String,
}

#[derive(Debug, Deserialize)]
pub struct CommentsIn {
    #[serde(rename = "sessionId")]
    pub session_id: String,
    #[serde(default)]
    pub text: String,
}

#[derive(Serialize)]
pub struct HealthOut {
    pub ok: bool,
}

/// Client-facing snapshot of a session. Rendering reads this only.
#[derive(Debug, Serialize)]
pub struct SessionView {
    pub student_id: String,
    pub phase: Phase,
    pub mode: Option<Mode>,
    pub task_index: usize,
    pub task_count: usize,
    pub task_label: String,
    pub problem: String,
    pub initial_feedback: String,
    pub transcript: Vec<Turn>,
    pub initial_rubric_done: bool,
    pub rubric_done: bool,
    pub followup_problem: String,
    pub followup_feedback: String,
    pub completed_tasks: usize,
    pub is_last_task: bool,
    pub saved: bool,
}

/// Convert the internal `Session` to the public snapshot. The follow-up
/// problem only appears once the dialogue has closed.
pub fn view_of(session: &Session, task_count: usize) -> SessionView {
    let task = session.current.as_ref();
    let in_followup = task
        .map(|t| matches!(t.mode, Mode::Followup | Mode::FeedbackShown | Mode::Done))
        .unwrap_or(false);
    SessionView {
        student_id: session.student_id.clone(),
        phase: session.phase,
        mode: task.map(|t| t.mode),
        task_index: session.task_index,
        task_count,
        task_label: task.map(|t| t.label.clone()).unwrap_or_default(),
        problem: task.map(|t| t.problem.clone()).unwrap_or_default(),
        initial_feedback: task.map(|t| t.initial_feedback.clone()).unwrap_or_default(),
        transcript: task.map(|t| t.transcript.clone()).unwrap_or_default(),
        initial_rubric_done: task.map(|t| t.initial_rubric.is_some()).unwrap_or(false),
        rubric_done: task.map(|t| t.rubric.is_some()).unwrap_or(false),
        followup_problem: if in_followup {
            task.map(|t| t.similar_problem.clone()).unwrap_or_default()
        } else {
            String::new()
        },
        followup_feedback: task.map(|t| t.followup_feedback.clone()).unwrap_or_default(),
        completed_tasks: session.tasks.len(),
        is_last_task: session.is_last_task(task_count),
        saved: session.saved,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rubric_in_requires_all_five_ratings() {
        let complete = RubricIn {
            diagnostic: Some(3),
            correctness: Some(4),
            not_revealing: Some(5),
            applicable: Some(4),
            positive: Some(5),
        };
        assert!(Rubric::try_from(complete).is_ok());

        let missing = RubricIn { positive: None, ..complete };
        assert!(matches!(Rubric::try_from(missing), Err(StudyError::IncompleteGate)));

        let out_of_range = RubricIn { diagnostic: Some(0), ..complete };
        assert!(matches!(Rubric::try_from(out_of_range), Err(StudyError::IncompleteGate)));
    }

    #[test]
    fn ws_messages_parse_with_camel_case_ids() {
        let msg: ClientWsMessage = serde_json::from_str(
            r#"{"type": "reply", "sessionId": "user_1", "text": "hint please"}"#,
        )
        .unwrap();
        assert!(matches!(msg, ClientWsMessage::Reply { .. }));

        let msg: ClientWsMessage = serde_json::from_str(
            r#"{"type": "submit_initial_rubric", "sessionId": "u",
                "ratings": {"diagnostic": 1, "correctness": 2, "notRevealing": 3,
                            "applicable": 4, "positive": 5}}"#,
        )
        .unwrap();
        match msg {
            ClientWsMessage::SubmitInitialRubric { ratings, .. } => {
                assert_eq!(ratings.not_revealing, Some(3));
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn view_never_leaks_solutions() {
        // The snapshot type simply has no field for the solutions; assert the
        // serialized form stays clean for a session mid-dialogue.
        let mut s = Session::new();
        s.give_consent(true).unwrap();
        s.submit_demographics(crate::domain::Demographics {
            age: 30,
            gender: "Male".into(),
            academic_background: "Physics".into(),
            academic_level: "PhD".into(),
            other_details: String::new(),
        })
        .unwrap();
        s.confirm_instructions().unwrap();
        s.begin_task("Problem 1: Easy", &crate::domain::ProblemCard {
            problem_statement: "count the ways".into(),
            problem_solution: "SECRET-SOLUTION-42".into(),
            new_problem: "similar".into(),
            new_solution: "SECRET-FOLLOWUP-43".into(),
        })
        .unwrap();
        s.open_dialogue(
            "a long enough first attempt",
            "feedback".into(),
            "scaffold with SECRET-SOLUTION-42".into(),
            "ctx".into(),
        )
        .unwrap();

        let view = view_of(&s, 3);
        let json = serde_json::to_string(&view).unwrap();
        assert!(!json.contains("SECRET-SOLUTION-42"));
        assert!(!json.contains("SECRET-FOLLOWUP-43"));
    }
}
