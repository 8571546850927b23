//! `/model_run/*` and `/admin/model_run/*` handlers.

use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;

use provena_prov::RegistrationOutcome;
use provena_types::{JobRecord, ModelRunRecord};

use crate::{ApiError, AppState};

/// Validate, lodge and link a model run, answering once it is complete.
pub async fn register(
    State(state): State<AppState>,
    Json(record): Json<ModelRunRecord>,
) -> Result<Json<RegistrationOutcome>, ApiError> {
    tracing::debug!(display_name = %record.display_name, "Synchronous registration");
    let outcome = state.orchestrator.register(record).await?;
    Ok(Json(outcome))
}

/// Queue a registration and return its job record for polling.
pub async fn register_async(
    State(state): State<AppState>,
    Json(record): Json<ModelRunRecord>,
) -> Result<Json<JobRecord>, ApiError> {
    let job = state.jobs.submit_registration(record).await?;
    tracing::info!(job_id = %job.id, "Registration queued");
    Ok(Json(job))
}

#[derive(Debug, Deserialize)]
pub struct JobQuery {
    pub id: String,
}

pub async fn job(
    State(state): State<AppState>,
    Query(query): Query<JobQuery>,
) -> Result<Json<JobRecord>, ApiError> {
    Ok(Json(state.jobs.status(&query.id).await?))
}

#[derive(Debug, Deserialize)]
pub struct RelodgeRequest {
    pub record_id: String,
    /// Replacement record. When absent the record lodged in the registry
    /// is rebuilt as is.
    #[serde(default)]
    pub record: Option<ModelRunRecord>,
}

/// Queue a rebuild of an existing model run's graph and registry record.
pub async fn relodge(
    State(state): State<AppState>,
    Json(request): Json<RelodgeRequest>,
) -> Result<Json<JobRecord>, ApiError> {
    let record = match request.record {
        Some(record) => record,
        None => state.orchestrator.lodged_record(&request.record_id).await?,
    };
    let job = state.jobs.submit_relodge(request.record_id, record).await?;
    tracing::info!(job_id = %job.id, status = ?job.status, "Relodge requested");
    Ok(Json(job))
}
