//! Agent tasks: generation intents captured from conversation, queued until
//! the scheduler has a free worker slot.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::job::Job;
use crate::request::{GenerationRequest, JobKind, Target};
use crate::types::{TaskId, Timestamp};

/// Words in an intent that select LookML output. Matched against whole
/// words only, so "overview" or "review" do not count as "view".
const LOOKML_KEYWORDS: [&str; 6] = ["lookml", "view", "views", "explore", "explores", "looker"];

/// Conversation a task came from. The session itself lives with the agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRef {
    pub user_id: String,
    pub session_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Connection,
    Database,
    Schema,
    Table,
}

/// A warehouse object mentioned in the conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRef {
    pub kind: EntityKind,
    pub name: String,
}

/// Body of `POST /agent/tasks`.
///
/// `submission` is optional: when the agent did not build one, it is derived
/// from `intent` and `entities`.
#[derive(Debug, Clone, Deserialize)]
pub struct TaskDraft {
    pub session: SessionRef,
    pub intent: String,
    #[serde(default)]
    pub entities: Vec<EntityRef>,
    #[serde(default)]
    pub submission: Option<GenerationRequest>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub session: SessionRef,
    pub intent: String,
    pub entities: Vec<EntityRef>,
    pub submission: GenerationRequest,
    pub enqueued_at: Timestamp,
}

/// Queue listing entry for `GET /agent/tasks`.
#[derive(Debug, Clone, Serialize)]
pub struct TaskSummary {
    pub task_id: TaskId,
    pub session: SessionRef,
    pub intent: String,
    pub kind: JobKind,
    pub target: String,
    pub enqueued_at: Timestamp,
}

impl Task {
    /// Validate a draft and fix its submission parameters.
    pub fn from_draft(draft: TaskDraft, now: Timestamp) -> Result<Self, CoreError> {
        if draft.intent.trim().is_empty() {
            return Err(CoreError::Validation("intent must not be empty".into()));
        }
        if draft.session.user_id.trim().is_empty() || draft.session.session_id.trim().is_empty() {
            return Err(CoreError::Validation(
                "session.user_id and session.session_id are required".into(),
            ));
        }

        let submission = match draft.submission {
            Some(submission) => submission,
            None => GenerationRequest::new(
                derive_kind(&draft.intent),
                derive_target(&draft.entities),
            ),
        };
        submission.validate()?;

        Ok(Self {
            id: uuid::Uuid::now_v7(),
            session: draft.session,
            intent: draft.intent,
            entities: draft.entities,
            submission,
            enqueued_at: now,
        })
    }

    /// The pending job this task turns into when drained.
    pub fn into_job(&self, now: Timestamp) -> Job {
        let mut job = Job::new(self.submission.clone(), now);
        job.source_task_id = Some(self.id);
        job
    }

    pub fn summary(&self) -> TaskSummary {
        TaskSummary {
            task_id: self.id,
            session: self.session.clone(),
            intent: self.intent.clone(),
            kind: self.submission.kind,
            target: self.submission.target.describe(),
            enqueued_at: self.enqueued_at,
        }
    }
}

/// Pick the job kind from the wording of an intent.
pub fn derive_kind(intent: &str) -> JobKind {
    let lowered = intent.to_lowercase();
    let mut words = lowered.split(|c: char| !c.is_alphanumeric());
    if words.any(|word| LOOKML_KEYWORDS.contains(&word)) {
        JobKind::LookmlGeneration
    } else {
        JobKind::MetadataGeneration
    }
}

/// Build a target from extracted entities. The first connection, database
/// and schema win; every table entity is included.
pub fn derive_target(entities: &[EntityRef]) -> Target {
    let first = |kind: EntityKind| {
        entities
            .iter()
            .find(|e| e.kind == kind)
            .map(|e| e.name.trim().to_string())
    };

    Target {
        connection: first(EntityKind::Connection),
        database: first(EntityKind::Database),
        schema: first(EntityKind::Schema),
        tables: entities
            .iter()
            .filter(|e| e.kind == EntityKind::Table)
            .map(|e| e.name.trim().to_string())
            .collect(),
    }
}
