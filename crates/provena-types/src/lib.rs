//! Shared types and errors for the Provena provenance core.
//!
//! This crate provides the foundational types used across all other Provena crates:
//! - `ProvenaError`, the unified error taxonomy
//! - registry items, resolution outcomes and the model run record
//! - job records and registration states
//! - the node-link lineage response model

mod job;
mod lineage;
mod model_run;
mod registry;

pub use job::{JobKind, JobRecord, JobStatus, RegistrationState};
pub use lineage::{LineageGraph, LineageLink, LineageNode};
pub use model_run::{AssociationInfo, DatasetType, ModelRunRecord, TemplatedDataset};
pub use registry::{
    Dataset, DatasetTemplate, DeferredResource, DefinedResource, ItemCategory, ItemSubtype,
    Model, ModelRunItem, Organisation, Person, RegistryItem, Resolution, ResourceUsageType,
    Study, TemplateResource, WorkflowTemplate, WorkflowTemplateAnnotations,
};

/// Unified error type for all Provena subsystems.
#[derive(Debug, thiserror::Error)]
pub enum ProvenaError {
    // === Caller input errors ===
    #[error("Model run validation failed: {0}")]
    ValidationError(String),

    #[error("Invalid lineage query: {0}")]
    QueryInputError(String),

    // === Collaborator errors ===
    #[error("{service} returned HTTP {status}: {message}")]
    UpstreamService {
        service: String,
        status: u16,
        message: String,
    },

    // === Core invariants ===
    #[error("Provenance graph build failed: {0}")]
    BuildInvariantError(String),

    // === Jobs ===
    #[error("Job '{id}' not found")]
    JobNotFound { id: String },

    // === Generic ===
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl ProvenaError {
    /// Shorthand for an upstream failure that never produced an HTTP status.
    pub fn transport(service: impl Into<String>, message: impl ToString) -> Self {
        ProvenaError::UpstreamService {
            service: service.into(),
            status: 0,
            message: message.to_string(),
        }
    }

    /// Returns `true` if the caller may retry the operation unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ProvenaError::UpstreamService { .. })
    }

    /// Returns `true` if the error is permanent and retrying will not help.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ProvenaError::ValidationError(_)
                | ProvenaError::QueryInputError(_)
                | ProvenaError::BuildInvariantError(_)
        )
    }

    /// Maps the error to an HTTP status code for the API boundary.
    pub fn http_status(&self) -> Option<u16> {
        match self {
            ProvenaError::ValidationError(_) => Some(400),
            ProvenaError::QueryInputError(_) => Some(422),
            ProvenaError::UpstreamService { .. } => Some(502),
            ProvenaError::BuildInvariantError(_) => Some(500),
            ProvenaError::JobNotFound { .. } => Some(404),
            _ => None,
        }
    }
}

/// A convenience alias for `Result<T, ProvenaError>`.
pub type Result<T> = std::result::Result<T, ProvenaError>;
