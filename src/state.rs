//! Application state: the in-memory session store, problem repository,
//! prompts, tutor client, and persistence sinks.
//!
//! This module owns:
//!   - the session store (one independent Session per participant, each
//!     behind its own async mutex — the per-session re-entrancy guard)
//!   - the problem repository and the fixed task list
//!   - the prompts struct (from TOML or defaults)
//!   - the optional tutor client and the persistence sinks

use std::{collections::HashMap, sync::Arc};

use tokio::sync::{Mutex, RwLock};
use tracing::{error, info, instrument};

use crate::audit::AuditLog;
use crate::config::{load_study_config_from_env, Prompts};
use crate::domain::TaskSpec;
use crate::errors::StudyError;
use crate::openai::{OpenAI, Tutor};
use crate::problems::ProblemRepository;
use crate::seeds::default_task_list;
use crate::session::Session;
use crate::sink::{FileSink, RecordSink, SheetClient};

#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<RwLock<HashMap<String, Arc<Mutex<Session>>>>>,
    pub problems: ProblemRepository,
    pub task_list: Vec<TaskSpec>,
    pub prompts: Prompts,
    pub tutor: Option<Arc<dyn Tutor>>,
    pub sinks: Vec<Arc<dyn RecordSink>>,
    pub audit: AuditLog,
}

impl AppState {
    /// Build state from env: load config, build the problem repository and
    /// task list, init the tutor client and sinks.
    #[instrument(level = "info", skip_all)]
    pub fn new() -> Self {
        let cfg_opt = load_study_config_from_env();
        let prompts = cfg_opt
            .as_ref()
            .map(|c| c.prompts.clone())
            .unwrap_or_default();

        let problems = ProblemRepository::new(cfg_opt.as_ref());

        // Config-provided task list, falling back to the built-in
        // Easy/Medium/Hard progression. Entries pointing at a missing
        // dataset row are skipped with an error.
        let configured: Vec<TaskSpec> = cfg_opt
            .as_ref()
            .filter(|c| !c.tasks.is_empty())
            .map(|c| c.tasks.iter().map(TaskSpec::from).collect())
            .unwrap_or_else(default_task_list);
        let task_list: Vec<TaskSpec> = configured
            .into_iter()
            .filter(|spec| {
                let present = problems.get(spec.row).is_some();
                if !present {
                    error!(target: "study", label = %spec.label, row = spec.row, "Skipping task: no such problem row");
                }
                present
            })
            .collect();
        let task_list = if task_list.is_empty() {
            error!(target: "study", "No usable configured tasks; using the built-in progression");
            default_task_list()
        } else {
            task_list
        };
        info!(target: "study", tasks = task_list.len(), problems = problems.len(), "Task list ready");

        // Build the optional tutor client (if API key present).
        let tutor: Option<Arc<dyn Tutor>> = match OpenAI::from_env() {
            Some(oa) => {
                info!(target: "tutor", base_url = %oa.base_url, fast_model = %oa.fast_model, strong_model = %oa.strong_model, "OpenAI enabled.");
                Some(Arc::new(oa))
            }
            None => {
                info!(target: "tutor", "OpenAI disabled (no OPENAI_API_KEY). Tutor transitions will fail until configured.");
                None
            }
        };

        // Local file sink is always on; the remote sheet sink joins when
        // SHEET_ENDPOINT is configured.
        let mut sinks: Vec<Arc<dyn RecordSink>> = vec![Arc::new(FileSink::from_env())];
        if let Some(sheet) = SheetClient::from_env() {
            info!(target: "study", "Sheet sink enabled.");
            sinks.push(Arc::new(sheet));
        }

        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            problems,
            task_list,
            prompts,
            tutor,
            sinks,
            audit: AuditLog::from_env(),
        }
    }

    pub fn task_count(&self) -> usize {
        self.task_list.len()
    }

    /// Create a fresh session and register it in the store.
    #[instrument(level = "info", skip(self))]
    pub async fn create_session(&self) -> (String, Arc<Mutex<Session>>) {
        let session = Session::new();
        let id = session.student_id.clone();
        let handle = Arc::new(Mutex::new(session));
        self.sessions.write().await.insert(id.clone(), handle.clone());
        info!(target: "study", student_id = %id, "Session created");
        (id, handle)
    }

    /// Look up a session handle by id.
    pub async fn session(&self, id: &str) -> Result<Arc<Mutex<Session>>, StudyError> {
        self.sessions
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| StudyError::UnknownSession(id.to_string()))
    }

    /// Drop a session from the store (navigation away without save).
    #[instrument(level = "debug", skip(self))]
    pub async fn discard_session(&self, id: &str) -> bool {
        self.sessions.write().await.remove(id).is_some()
    }
}
