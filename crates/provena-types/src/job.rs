use serde::{Deserialize, Serialize};

/// Status of a queued job as seen by a polling caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Pending,
    InProgress,
    Succeeded,
    Failed,
}

impl JobStatus {
    /// Queued or running.
    pub fn is_active(self) -> bool {
        matches!(self, JobStatus::Pending | JobStatus::InProgress)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobKind {
    RegisterModelRun,
    RelodgeModelRun,
}

/// Steps of a model run registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RegistrationState {
    Received,
    Validating,
    ValidationFailed,
    MintingIdentity,
    SeedingRegistry,
    BuildingGraph,
    MergingGraph,
    UpdatingRegistry,
    Complete,
    Failed,
}

impl RegistrationState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RegistrationState::ValidationFailed
                | RegistrationState::Complete
                | RegistrationState::Failed
        )
    }
}

/// Durable status record for one queued job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: String,
    pub kind: JobKind,
    pub status: JobStatus,
    /// Last registration state reached by the job.
    #[serde(default)]
    pub stage: Option<RegistrationState>,
    /// Human readable failure detail.
    #[serde(default)]
    pub info: Option<String>,
    pub payload: serde_json::Value,
    #[serde(default)]
    pub result: Option<serde_json::Value>,
    pub created_timestamp: i64,
    pub updated_timestamp: i64,
}

impl JobRecord {
    /// A fresh `PENDING` record stamped with the current time.
    pub fn pending(id: impl Into<String>, kind: JobKind, payload: serde_json::Value) -> Self {
        let now = chrono::Utc::now().timestamp();
        Self {
            id: id.into(),
            kind,
            status: JobStatus::Pending,
            stage: Some(RegistrationState::Received),
            info: None,
            payload,
            result: None,
            created_timestamp: now,
            updated_timestamp: now,
        }
    }

    pub fn touch(&mut self) {
        self.updated_timestamp = chrono::Utc::now().timestamp();
    }
}
