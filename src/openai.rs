//! Minimal OpenAI client for our use-cases.
//!
//! We only call chat.completions and request plain text. Calls are
//! instrumented and log model names, latencies, and response sizes (not
//! contents).
//!
//! NOTE: We never log the API key and we keep payload truncations short to
//! avoid PII leaks.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::config::Prompts;
use crate::domain::ChatMessage;
use crate::util::fill_template;

/// Attempts matching one of these (case-insensitively, trimmed) carry no
/// usable content even when they pass the length check.
const FILLER_TOKENS: &[&str] = &["", "idk", "?", "hmm", "i don't know", "na"];

/// Minimum trimmed length for an attempt to be worth critiquing.
const MIN_SUBSTANTIVE_LEN: usize = 20;

/// A first attempt too sparse to critique substantively. Such attempts are
/// routed through the stricter feedback template that forbids critiquing
/// non-existent steps and asks starter questions instead.
pub fn is_low_information(attempt: &str) -> bool {
  let trimmed = attempt.trim();
  if trimmed.chars().count() < MIN_SUBSTANTIVE_LEN {
    return true;
  }
  let lowered = trimmed.to_lowercase();
  FILLER_TOKENS.iter().any(|t| lowered == *t)
}

/// Select and fill the (system, user) prompt pair for the initial feedback
/// call, routing low-information attempts through the stricter template.
pub fn initial_prompt_parts(
  prompts: &Prompts,
  problem: &str,
  attempt: &str,
  solution: &str,
) -> (String, String) {
  if is_low_information(attempt) {
    let user = fill_template(&prompts.low_info_template, &[
      ("problem", problem),
      ("attempt", attempt),
    ]);
    (prompts.low_info_system.clone(), user)
  } else {
    let user = fill_template(&prompts.initial_feedback_template, &[
      ("problem", problem),
      ("attempt", attempt),
      ("solution", solution),
    ]);
    (prompts.initial_feedback_system.clone(), user)
  }
}

/// The three prompt-driven tutor operations. The production implementation
/// talks to the chat-completion API; tests script this seam instead.
#[async_trait]
pub trait Tutor: Send + Sync {
  /// Initial feedback for a first attempt. Never echoes the solution.
  async fn initial_feedback(
    &self,
    prompts: &Prompts,
    problem: &str,
    attempt: &str,
    solution: &str,
  ) -> Result<String, String>;

  /// Next tutor turn given the full prompt-message history.
  async fn continue_dialogue(&self, scaffold: &[ChatMessage]) -> Result<String, String>;

  /// Bounded-length objective feedback on the follow-up answer.
  async fn evaluate_followup(
    &self,
    prompts: &Prompts,
    problem: &str,
    response: &str,
    solution: &str,
  ) -> Result<String, String>;
}

#[derive(Clone)]
pub struct OpenAI {
  pub client: reqwest::Client,
  pub api_key: String,
  pub base_url: String,
  pub fast_model: String,
  pub strong_model: String,
}

impl OpenAI {
  /// Construct the client if we find OPENAI_API_KEY; otherwise return None.
  pub fn from_env() -> Option<Self> {
    let api_key = std::env::var("OPENAI_API_KEY").ok()?;
    let base_url =
      std::env::var("OPENAI_BASE_URL").unwrap_or_else(|_| "https://api.openai.com/v1".into());
    let fast_model =
      std::env::var("OPENAI_FAST_MODEL").unwrap_or_else(|_| "gpt-4o-mini".into());
    let strong_model =
      std::env::var("OPENAI_STRONG_MODEL").unwrap_or_else(|_| "gpt-4o".into());

    let client = reqwest::Client::builder()
      .timeout(Duration::from_secs(30))
      .build()
      .ok()?;

    Some(Self { client, api_key, base_url, fast_model, strong_model })
  }

  /// Plain-text chat completion.
  #[instrument(level = "info", skip(self, messages), fields(model = %model, turns = messages.len()))]
  async fn chat_plain(
    &self,
    model: &str,
    messages: Vec<ChatMessage>,
    temperature: f32,
  ) -> Result<String, String> {
    let url = format!("{}/chat/completions", self.base_url);
    let req = ChatCompletionRequest {
      model: model.to_string(),
      messages,
      temperature,
    };

    let res = self.client.post(&url)
      .header(USER_AGENT, "tutorlab-backend/0.1")
      .header(CONTENT_TYPE, "application/json")
      .header(AUTHORIZATION, format!("Bearer {}", self.api_key))
      .json(&req).send().await.map_err(|e| e.to_string())?;

    if !res.status().is_success() {
      let status = res.status();
      let body = res.text().await.unwrap_or_default();
      let msg = extract_openai_error(&body).unwrap_or_else(|| body);
      return Err(format!("OpenAI HTTP {}: {}", status, msg));
    }

    let body: ChatCompletionResponse = res.json().await.map_err(|e| e.to_string())?;
    if let Some(usage) = &body.usage {
      info!(prompt_tokens = ?usage.prompt_tokens, completion_tokens = ?usage.completion_tokens, total_tokens = ?usage.total_tokens, "OpenAI usage");
    }
    let text = body.choices.first()
      .and_then(|c| c.message.content.clone())
      .unwrap_or_default().trim().to_string();

    if text.is_empty() {
      return Err("empty completion".into());
    }
    Ok(text)
  }
}

#[async_trait]
impl Tutor for OpenAI {
  #[instrument(level = "info", skip_all, fields(model = %self.strong_model, attempt_len = attempt.len(), low_info = is_low_information(attempt)))]
  async fn initial_feedback(
    &self,
    prompts: &Prompts,
    problem: &str,
    attempt: &str,
    solution: &str,
  ) -> Result<String, String> {
    let (system, user) = initial_prompt_parts(prompts, problem, attempt, solution);
    let start = std::time::Instant::now();
    let result = self
      .chat_plain(
        &self.strong_model,
        vec![ChatMessage::system(system), ChatMessage::user(user)],
        0.7,
      )
      .await;
    info!(elapsed = ?start.elapsed(), ok = result.is_ok(), "Initial feedback call finished");
    result
  }

  #[instrument(level = "info", skip_all, fields(model = %self.fast_model, turns = scaffold.len()))]
  async fn continue_dialogue(&self, scaffold: &[ChatMessage]) -> Result<String, String> {
    self.chat_plain(&self.fast_model, scaffold.to_vec(), 0.7).await
  }

  #[instrument(level = "info", skip_all, fields(model = %self.strong_model, response_len = response.len()))]
  async fn evaluate_followup(
    &self,
    prompts: &Prompts,
    problem: &str,
    response: &str,
    solution: &str,
  ) -> Result<String, String> {
    let user = fill_template(&prompts.followup_eval_template, &[
      ("problem", problem.trim()),
      ("solution", solution.trim()),
      ("response", response.trim()),
    ]);
    self
      .chat_plain(
        &self.strong_model,
        vec![ChatMessage::system(prompts.followup_eval_system.clone()), ChatMessage::user(user)],
        0.2,
      )
      .await
  }
}

// --- Chat DTOs ---

#[derive(Serialize)]
struct ChatCompletionRequest {
  model: String,
  messages: Vec<ChatMessage>,
  temperature: f32,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
  choices: Vec<ChatChoice>,
  #[serde(default)] usage: Option<Usage>,
}
#[derive(Deserialize)]
struct ChatChoice { message: ChatMessageResp }
#[derive(Deserialize)]
struct ChatMessageResp { content: Option<String> }
#[derive(Deserialize)]
struct Usage {
  #[serde(default)] prompt_tokens: Option<u32>,
  #[serde(default)] completion_tokens: Option<u32>,
  #[serde(default)] total_tokens: Option<u32>,
}

/// Try to extract a clean error message from an OpenAI error body.
fn extract_openai_error(body: &str) -> Option<String> {
  #[derive(Deserialize)]
  struct EWrap { error: EObj }
  #[derive(Deserialize)]
  struct EObj { message: String }
  match serde_json::from_str::<EWrap>(body) {
    Ok(w) => Some(w.error.message),
    Err(_) => None,
  }
}
