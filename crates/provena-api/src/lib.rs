//! HTTP boundary for the provenance core.
//!
//! Handlers only translate between HTTP and the core: every request is
//! forwarded to the [`LifecycleOrchestrator`], the [`JobQueue`] or the
//! [`LineageQueryEngine`] held in [`AppState`].

pub mod error;
pub mod explore;
pub mod model_run;

use axum::routing::{get, post};
use axum::Router;

use provena_prov::{JobQueue, LifecycleOrchestrator, LineageQueryEngine};

pub use error::ApiError;

/// Shared application state accessible from Axum routes.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: LifecycleOrchestrator,
    pub lineage: LineageQueryEngine,
    pub jobs: JobQueue,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/model_run/register", post(model_run::register))
        .route("/model_run/register_async", post(model_run::register_async))
        .route("/model_run/job", get(model_run::job))
        .route("/admin/model_run/relodge", post(model_run::relodge))
        .route("/explore/upstream", get(explore::upstream))
        .route("/explore/downstream", get(explore::downstream))
        .route(
            "/explore/special/contributing_datasets",
            get(explore::contributing_datasets),
        )
        .route(
            "/explore/special/effected_datasets",
            get(explore::effected_datasets),
        )
        .route(
            "/explore/special/contributing_agents",
            get(explore::contributing_agents),
        )
        .route(
            "/explore/special/effected_agents",
            get(explore::effected_agents),
        )
        .with_state(state)
}
