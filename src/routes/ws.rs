//! WebSocket upgrade + message loop. Each client message is parsed as JSON and
//! forwarded to core logic. We reply with a single JSON message per request.

use std::sync::Arc;

use axum::{
  extract::{
    ws::{Message, WebSocket},
    State, WebSocketUpgrade,
  },
  response::IntoResponse,
};
use tracing::{debug, error, info, instrument};

use crate::logic::*;
use crate::protocol::{ClientWsMessage, ServerWsMessage};
use crate::state::AppState;

#[instrument(level = "info", skip(state))]
pub async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
  info!(target: "tutorlab_backend", "WebSocket upgrade requested");
  ws.on_upgrade(move |socket| handle_ws(socket, state))
}

#[instrument(level = "info", skip(socket, state))]
async fn handle_ws(mut socket: WebSocket, state: Arc<AppState>) {
  info!(target: "tutorlab_backend", "WebSocket connected");
  while let Some(Ok(msg)) = socket.recv().await {
    match msg {
      Message::Text(txt) => {
        // Parse, dispatch, serialize response.
        let reply_msg = match serde_json::from_str::<ClientWsMessage>(&txt) {
          Ok(incoming) => {
            debug!(target: "tutorlab_backend", "WS received: {:?}", &incoming);
            handle_client_ws(incoming, &state).await
          }
          Err(e) => ServerWsMessage::Error { message: format!("Invalid JSON: {}", e) },
        };

        let out = serde_json::to_string(&reply_msg).unwrap_or_else(|e| {
          serde_json::json!({ "type": "error", "message": format!("Serialization error: {}", e) }).to_string()
        });

        if let Err(e) = socket.send(Message::Text(out)).await {
          error!(target: "tutorlab_backend", error = %e, "WS send error");
          break;
        }
      }
      Message::Ping(payload) => { let _ = socket.send(Message::Pong(payload)).await; }
      Message::Close(_) => break,
      _ => {}
    }
  }
  info!(target: "tutorlab_backend", "WebSocket disconnected");
}

/// Every transition replies with a full state snapshot (or an error), so the
/// client re-renders from the latest state only.
#[instrument(level = "info", skip(msg, state))]
async fn handle_client_ws(msg: ClientWsMessage, state: &AppState) -> ServerWsMessage {
  let result = match msg {
    ClientWsMessage::Ping => return ServerWsMessage::Pong,

    ClientWsMessage::StartSession => {
      let view = start_session(state).await;
      info!(target: "study", student_id = %view.student_id, "WS session created");
      Ok(view)
    }

    ClientWsMessage::GetState { session_id } => get_state(state, &session_id).await,

    ClientWsMessage::Consent { session_id, agree } => {
      give_consent(state, &session_id, agree).await
    }

    ClientWsMessage::Demographics { session_id, demographics } => {
      submit_demographics(state, &session_id, demographics).await
    }

    ClientWsMessage::InstructionsRead { session_id } => {
      confirm_instructions(state, &session_id).await
    }

    ClientWsMessage::SubmitAttempt { session_id, attempt } => {
      submit_attempt(state, &session_id, &attempt).await
    }

    ClientWsMessage::SubmitInitialRubric { session_id, ratings } => {
      submit_initial_rubric(state, &session_id, ratings).await
    }

    ClientWsMessage::Reply { session_id, text } => send_reply(state, &session_id, &text).await,

    ClientWsMessage::FinishDialogue { session_id } => finish_dialogue(state, &session_id).await,

    ClientWsMessage::SubmitRubric { session_id, ratings } => {
      submit_rubric(state, &session_id, ratings).await
    }

    ClientWsMessage::SubmitFollowup { session_id, answer } => {
      submit_followup(state, &session_id, &answer).await
    }

    ClientWsMessage::NextTask { session_id } => next_task(state, &session_id).await,

    ClientWsMessage::Comments { session_id, text } => {
      submit_comments(state, &session_id, &text).await
    }

    ClientWsMessage::SaveSession { session_id } => save_session(state, &session_id).await,
  };

  match result {
    Ok(view) => ServerWsMessage::State { session: view },
    Err(e) => ServerWsMessage::Error { message: e.to_string() },
  }
}
