//! Study error taxonomy.
//!
//! Every failure either declines the current transition (retry-able by
//! re-triggering the same action) or is cosmetic; none is fatal to the
//! process. `OrderingViolation` covers defensive rejection of events that
//! arrive for a state that does not expect them.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StudyError {
    /// Empty/whitespace submission. No state change, no external call.
    #[error("input rejected: {0}")]
    InputRejected(&'static str),

    /// Rubric submitted with a missing or out-of-range rating.
    #[error("rubric incomplete: every criterion needs a rating from 1 to 5")]
    IncompleteGate,

    /// Event arrived for a state that does not expect it.
    #[error("'{event}' is not valid while the session is in {state}")]
    OrderingViolation {
        event: &'static str,
        state: String,
    },

    /// TutorClient or persistence sink failed or timed out.
    /// The triggering transition did not commit; the user may retry.
    #[error("external call failed: {0}")]
    ExternalCall(String),

    /// No session for the supplied id (expired or bogus).
    #[error("unknown session: {0}")]
    UnknownSession(String),
}

impl StudyError {
    fn status(&self) -> StatusCode {
        match self {
            StudyError::InputRejected(_) | StudyError::IncompleteGate => StatusCode::UNPROCESSABLE_ENTITY,
            StudyError::OrderingViolation { .. } => StatusCode::CONFLICT,
            StudyError::ExternalCall(_) => StatusCode::BAD_GATEWAY,
            StudyError::UnknownSession(_) => StatusCode::NOT_FOUND,
        }
    }
}

impl IntoResponse for StudyError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = Json(json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}
