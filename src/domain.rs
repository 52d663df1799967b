//! Domain models used by the backend: dialogue turns, rubrics, demographics,
//! problem cards, and the fixed task list entries.

use serde::{Deserialize, Serialize};

/// Who produced a visible dialogue turn.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
  Student,
  Tutor,
}

/// One human-visible turn of the tutoring dialogue.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Turn {
  pub role: Role,
  pub content: String,
}

impl Turn {
  pub fn student(content: impl Into<String>) -> Self {
    Self { role: Role::Student, content: content.into() }
  }
  pub fn tutor(content: impl Into<String>) -> Self {
    Self { role: Role::Tutor, content: content.into() }
  }
}

/// One message of the prompt buffer sent to the chat-completion API.
/// Unlike `Turn`, this includes the system/instructional scaffolding.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
  pub role: String, // "system" | "user" | "assistant"
  pub content: String,
}

impl ChatMessage {
  pub fn system(content: impl Into<String>) -> Self {
    Self { role: "system".into(), content: content.into() }
  }
  pub fn user(content: impl Into<String>) -> Self {
    Self { role: "user".into(), content: content.into() }
  }
  pub fn assistant(content: impl Into<String>) -> Self {
    Self { role: "assistant".into(), content: content.into() }
  }
}

/// Fixed five-criterion rating, each 1..=5. Serialized field names match the
/// labels shown to participants so persisted blobs read naturally.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rubric {
  #[serde(rename = "Diagnostic")]
  pub diagnostic: u8,
  #[serde(rename = "Correctness")]
  pub correctness: u8,
  #[serde(rename = "Not Revealing")]
  pub not_revealing: u8,
  #[serde(rename = "Applicable")]
  pub applicable: u8,
  #[serde(rename = "Positive")]
  pub positive: u8,
}

impl Rubric {
  /// Accept only a complete rubric with every rating in 1..=5.
  pub fn new(
    diagnostic: u8,
    correctness: u8,
    not_revealing: u8,
    applicable: u8,
    positive: u8,
  ) -> Option<Self> {
    let all = [diagnostic, correctness, not_revealing, applicable, positive];
    if all.iter().all(|r| (1..=5).contains(r)) {
      Some(Self { diagnostic, correctness, not_revealing, applicable, positive })
    } else {
      None
    }
  }
}

/// Participant demographics, collected once before tutoring begins.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Demographics {
  pub age: u8,
  pub gender: String,
  pub academic_background: String,
  pub academic_level: String,
  #[serde(default)]
  pub other_details: String,
}

impl Demographics {
  /// Boundary validation: age within the study's eligible range and the
  /// required free-text fields non-empty.
  pub fn validate(&self) -> Result<(), &'static str> {
    if !(18..=100).contains(&self.age) {
      return Err("age must be between 18 and 100");
    }
    if self.gender.trim().is_empty() {
      return Err("gender is required");
    }
    if self.academic_background.trim().is_empty() {
      return Err("academic background is required");
    }
    if self.academic_level.trim().is_empty() {
      return Err("academic level is required");
    }
    Ok(())
  }
}

/// One row of the problem dataset: the tutored problem plus the similar
/// follow-up problem used to measure transfer.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProblemCard {
  pub problem_statement: String,
  pub problem_solution: String,
  pub new_problem: String,
  pub new_solution: String,
}

/// One entry of the fixed task list: a display label and the dataset row
/// it maps to (e.g. "Problem 1: Easy" -> row 5).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TaskSpec {
  pub label: String,
  pub row: usize,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn rubric_accepts_full_in_range_ratings() {
    assert!(Rubric::new(1, 2, 3, 4, 5).is_some());
    assert!(Rubric::new(5, 5, 5, 5, 5).is_some());
  }

  #[test]
  fn rubric_rejects_out_of_range_ratings() {
    assert!(Rubric::new(0, 2, 3, 4, 5).is_none());
    assert!(Rubric::new(1, 2, 3, 4, 6).is_none());
  }

  #[test]
  fn rubric_serializes_with_participant_facing_labels() {
    let r = Rubric::new(3, 4, 5, 4, 5).unwrap();
    let json = serde_json::to_string(&r).unwrap();
    assert!(json.contains("\"Diagnostic\":3"));
    assert!(json.contains("\"Not Revealing\":5"));
  }

  #[test]
  fn demographics_validation() {
    let base = Demographics {
      age: 25,
      gender: "Female".into(),
      academic_background: "CS".into(),
      academic_level: "Masters".into(),
      other_details: String::new(),
    };
    assert!(base.validate().is_ok());
    assert!(Demographics { age: 17, ..base.clone() }.validate().is_err());
    assert!(Demographics { gender: "  ".into(), ..base.clone() }.validate().is_err());
    assert!(Demographics { academic_level: String::new(), ..base }.validate().is_err());
  }
}
