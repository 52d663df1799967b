//! Optional plain-text audit dumps: one file per completed task under
//! `tutoring_logs/` and one per follow-up under `checkup_logs/`, named by
//! timestamp. Purely diagnostic; failures are logged and swallowed so they
//! can never block a study transition.

use std::path::PathBuf;

use chrono::Utc;
use tracing::{debug, error};

use crate::domain::Role;
use crate::session::TaskRecord;

#[derive(Clone, Debug)]
pub struct AuditLog {
    base: PathBuf,
}

impl AuditLog {
    /// Base directory from AUDIT_LOG_DIR, defaulting to the working dir.
    pub fn from_env() -> Self {
        let base = std::env::var("AUDIT_LOG_DIR").unwrap_or_else(|_| ".".into());
        Self { base: PathBuf::from(base) }
    }

    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    fn stamp() -> String {
        Utc::now().format("%Y-%m-%d_%H-%M-%S").to_string()
    }

    /// Dump the full tutoring exchange for one completed task.
    pub async fn dump_task(&self, student_id: &str, record: &TaskRecord) {
        let mut body = String::from("=== Main Tutoring Session ===\n");
        body.push_str(&format!("Student: {}\n", student_id));
        body.push_str(&format!("Task: {}\n\n", record.label));
        body.push_str(&format!("Problem: {}\n\n", record.problem));
        body.push_str(&format!("Student Attempt: {}\n\n", record.student_attempt));
        body.push_str(&format!("Correct Solution: {}\n\n", record.correct_solution));
        body.push_str(&format!("Initial Feedback: {}\n\n", record.initial_feedback));
        body.push_str("Dialogue:\n");
        for turn in &record.messages {
            let who = match turn.role {
                Role::Student => "Student",
                Role::Tutor => "Tutor",
            };
            body.push_str(&format!("{}: {}\n\n", who, turn.content));
        }

        let dir = self.base.join("tutoring_logs");
        let file = dir.join(format!("session_{}.txt", Self::stamp()));
        self.write(dir, file, body).await;
    }

    /// Dump the follow-up exchange for one completed task.
    pub async fn dump_followup(&self, student_id: &str, record: &TaskRecord) {
        let mut body = String::from("=== Similar Problem Evaluation ===\n");
        body.push_str(&format!("Student: {}\n\n", student_id));
        body.push_str(&format!("Problem: {}\n\n", record.similar_problem));
        body.push_str(&format!("Student Response: {}\n\n", record.followup_response));
        body.push_str(&format!("Correct Solution: {}\n\n", record.similar_solution));
        body.push_str(&format!("Tutor Feedback:\n{}\n", record.followup_feedback));

        let dir = self.base.join("checkup_logs");
        let file = dir.join(format!("followup_{}.txt", Self::stamp()));
        self.write(dir, file, body).await;
    }

    async fn write(&self, dir: PathBuf, file: PathBuf, body: String) {
        if let Err(e) = tokio::fs::create_dir_all(&dir).await {
            error!(target: "study", dir = %dir.display(), error = %e, "Audit dir creation failed");
            return;
        }
        match tokio::fs::write(&file, body).await {
            Ok(()) => debug!(target: "study", file = %file.display(), "Audit dump written"),
            Err(e) => {
                error!(target: "study", file = %file.display(), error = %e, "Audit dump failed")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Rubric, Turn};

    fn record() -> TaskRecord {
        TaskRecord {
            label: "Problem 1: Easy".into(),
            problem: "count the codes".into(),
            student_attempt: "4*4*4".into(),
            correct_solution: "4^3 = 64".into(),
            initial_feedback: "promising".into(),
            messages: vec![Turn::student("hint?"), Turn::tutor("think per slot")],
            initial_rubrics: Rubric::new(3, 3, 3, 3, 3).unwrap(),
            rubrics: Rubric::new(4, 4, 4, 4, 4).unwrap(),
            similar_problem: "count more codes".into(),
            similar_solution: "5^2 = 25".into(),
            followup_response: "25".into(),
            followup_feedback: "correct but justify".into(),
            timestamp: "2026-01-01T00:00:00Z".into(),
        }
    }

    #[tokio::test]
    async fn task_dump_lands_in_tutoring_logs() {
        let dir = tempfile::tempdir().unwrap();
        let audit = AuditLog::new(dir.path());
        audit.dump_task("user_1", &record()).await;

        let entries: Vec<_> = std::fs::read_dir(dir.path().join("tutoring_logs"))
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect();
        assert_eq!(entries.len(), 1);
        let body = std::fs::read_to_string(&entries[0]).unwrap();
        assert!(body.contains("=== Main Tutoring Session ==="));
        assert!(body.contains("Student: hint?"));
        assert!(body.contains("Tutor: think per slot"));
    }

    #[tokio::test]
    async fn followup_dump_lands_in_checkup_logs() {
        let dir = tempfile::tempdir().unwrap();
        let audit = AuditLog::new(dir.path());
        audit.dump_followup("user_1", &record()).await;

        let entries: Vec<_> = std::fs::read_dir(dir.path().join("checkup_logs"))
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect();
        assert_eq!(entries.len(), 1);
        let body = std::fs::read_to_string(&entries[0]).unwrap();
        assert!(body.contains("Similar Problem Evaluation"));
        assert!(body.contains("correct but justify"));
    }
}
