//! Model run registration lifecycle.
//!
//! [`LifecycleOrchestrator::execute`] is the single state machine behind
//! both the synchronous endpoint and the job queue. The two differ only in
//! the [`TransitionSink`] they pass: the queue records every transition on
//! the durable job record, the synchronous path records nothing.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use provena_types::{
    ItemSubtype, ModelRunRecord, ProvenaError, RegistrationState, RegistryItem, Resolution, Result,
};

use crate::builder::build_graph;
use crate::events::{EventEmitter, LifecycleEvent};
use crate::resolver::{EntityResolver, ModelRunRegistry};
use crate::store::GraphStoreManager;
use crate::validation::{resolve_references, validate_or_raise, ResolvedModelRun};

// ---------------------------------------------------------------------------
// Requests and outcomes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RegistrationRequest {
    /// Validate, mint a new handle and lodge the record.
    New { record: ModelRunRecord },
    /// Rebuild and re-lodge a record that already has a handle.
    Relodge {
        record_id: String,
        record: ModelRunRecord,
    },
    /// Finish a new registration whose handle was minted by an earlier
    /// attempt. The handle is seeded only if the registry does not hold it.
    Resume {
        record_id: String,
        record: ModelRunRecord,
    },
}

impl RegistrationRequest {
    pub fn record(&self) -> &ModelRunRecord {
        match self {
            RegistrationRequest::New { record }
            | RegistrationRequest::Relodge { record, .. }
            | RegistrationRequest::Resume { record, .. } => record,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistrationOutcome {
    pub record_id: String,
    pub nodes: usize,
    pub edges: usize,
    /// The PROV-JSON document lodged on the registry item.
    pub prov_document: serde_json::Value,
}

/// Receives every state the registration enters.
#[async_trait]
pub trait TransitionSink: Send + Sync {
    async fn record(
        &self,
        state: RegistrationState,
        record_id: Option<&str>,
        info: Option<&str>,
    ) -> Result<()>;
}

/// Sink for callers that only need the final result.
pub struct NoTransitions;

#[async_trait]
impl TransitionSink for NoTransitions {
    async fn record(&self, _: RegistrationState, _: Option<&str>, _: Option<&str>) -> Result<()> {
        Ok(())
    }
}

struct Progress<'a> {
    correlation_id: &'a str,
    record_id: Option<String>,
    state: RegistrationState,
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct LifecycleOrchestrator {
    resolver: Arc<dyn EntityResolver>,
    registry: Arc<dyn ModelRunRegistry>,
    store: GraphStoreManager,
    events: EventEmitter,
}

impl LifecycleOrchestrator {
    pub fn new(
        resolver: Arc<dyn EntityResolver>,
        registry: Arc<dyn ModelRunRegistry>,
        store: GraphStoreManager,
    ) -> Self {
        Self {
            resolver,
            registry,
            store,
            events: EventEmitter::default(),
        }
    }

    pub fn with_events(mut self, events: EventEmitter) -> Self {
        self.events = events;
        self
    }

    pub fn events(&self) -> &EventEmitter {
        &self.events
    }

    /// Register a new model run and wait for the result.
    pub async fn register(&self, record: ModelRunRecord) -> Result<RegistrationOutcome> {
        let correlation_id = uuid::Uuid::new_v4().to_string();
        self.execute(
            &RegistrationRequest::New { record },
            &correlation_id,
            &NoTransitions,
        )
        .await
    }

    /// Rebuild and re-lodge an existing record and wait for the result.
    pub async fn relodge(
        &self,
        record_id: impl Into<String>,
        record: ModelRunRecord,
    ) -> Result<RegistrationOutcome> {
        let correlation_id = uuid::Uuid::new_v4().to_string();
        let request = RegistrationRequest::Relodge {
            record_id: record_id.into(),
            record,
        };
        self.execute(&request, &correlation_id, &NoTransitions).await
    }

    /// The record currently lodged on registry item `record_id`.
    pub async fn lodged_record(&self, record_id: &str) -> Result<ModelRunRecord> {
        match self.resolver.resolve(record_id, ItemSubtype::ModelRun).await? {
            Resolution::Complete(RegistryItem::ModelRun(item)) => item.record.ok_or_else(|| {
                ProvenaError::ValidationError(format!(
                    "Model run '{record_id}' has no lodged record"
                ))
            }),
            Resolution::Seed => Err(ProvenaError::ValidationError(format!(
                "Model run '{record_id}' is an incomplete seed"
            ))),
            Resolution::WrongType { actual } => Err(ProvenaError::ValidationError(format!(
                "Item '{record_id}' is a {actual}, not a model run"
            ))),
            _ => Err(ProvenaError::ValidationError(format!(
                "Model run '{record_id}' not found"
            ))),
        }
    }

    /// Drive one registration through every state, reporting each to `sink`.
    ///
    /// A rejected record ends in `VALIDATION_FAILED` and returns
    /// [`ProvenaError::ValidationError`]; any other error ends in `FAILED`.
    pub async fn execute(
        &self,
        request: &RegistrationRequest,
        correlation_id: &str,
        sink: &dyn TransitionSink,
    ) -> Result<RegistrationOutcome> {
        let started = Instant::now();
        let mut progress = Progress {
            correlation_id,
            record_id: None,
            state: RegistrationState::Received,
        };
        self.enter(&mut progress, RegistrationState::Received, sink)
            .await?;

        match self.run_states(request, &mut progress, sink).await {
            Ok(outcome) => {
                self.enter(&mut progress, RegistrationState::Complete, sink)
                    .await?;
                let duration_ms = started.elapsed().as_millis() as u64;
                tracing::info!(
                    record_id = %outcome.record_id,
                    nodes = outcome.nodes,
                    edges = outcome.edges,
                    duration_ms,
                    "Model run registered"
                );
                self.events.emit(LifecycleEvent::RegistrationCompleted {
                    correlation_id: correlation_id.to_string(),
                    record_id: outcome.record_id.clone(),
                    nodes: outcome.nodes,
                    edges: outcome.edges,
                    duration_ms,
                });
                Ok(outcome)
            }
            Err(err) => {
                let failed_in = progress.state;
                let terminal = match &err {
                    ProvenaError::ValidationError(_) => RegistrationState::ValidationFailed,
                    _ => RegistrationState::Failed,
                };
                let info = err.to_string();
                tracing::warn!(
                    correlation_id,
                    record_id = ?progress.record_id,
                    state = ?failed_in,
                    error = %info,
                    "Model run registration failed"
                );
                progress.state = terminal;
                if let Err(sink_err) = sink
                    .record(terminal, progress.record_id.as_deref(), Some(&info))
                    .await
                {
                    tracing::error!(error = %sink_err, "Failed to record registration failure");
                }
                self.events.emit(LifecycleEvent::RegistrationFailed {
                    correlation_id: correlation_id.to_string(),
                    record_id: progress.record_id.clone(),
                    state: failed_in,
                    error: info,
                });
                Err(err)
            }
        }
    }

    async fn run_states(
        &self,
        request: &RegistrationRequest,
        progress: &mut Progress<'_>,
        sink: &dyn TransitionSink,
    ) -> Result<RegistrationOutcome> {
        let (resolved, record_id): (ResolvedModelRun, String) = match request {
            RegistrationRequest::New { record } => {
                self.enter(progress, RegistrationState::Validating, sink)
                    .await?;
                let resolved = validate_or_raise(record, self.resolver.as_ref()).await?;

                self.enter(progress, RegistrationState::MintingIdentity, sink)
                    .await?;
                let record_id = self.registry.mint_identity().await?;
                progress.record_id = Some(record_id.clone());

                self.enter(progress, RegistrationState::SeedingRegistry, sink)
                    .await?;
                self.registry.seed_model_run(&record_id).await?;

                self.enter(progress, RegistrationState::BuildingGraph, sink)
                    .await?;
                (resolved, record_id)
            }
            RegistrationRequest::Relodge { record_id, record } => {
                progress.record_id = Some(record_id.clone());
                self.enter(progress, RegistrationState::BuildingGraph, sink)
                    .await?;
                let resolved = resolve_references(record, self.resolver.as_ref()).await?;
                (resolved, record_id.clone())
            }
            RegistrationRequest::Resume { record_id, record } => {
                progress.record_id = Some(record_id.clone());
                match self.resolver.resolve(record_id, ItemSubtype::ModelRun).await? {
                    Resolution::NotFound => {
                        self.enter(progress, RegistrationState::SeedingRegistry, sink)
                            .await?;
                        self.registry.seed_model_run(record_id).await?;
                    }
                    Resolution::WrongType { actual } => {
                        return Err(ProvenaError::Other(format!(
                            "Minted handle '{record_id}' now holds a {actual}"
                        )));
                    }
                    Resolution::Seed | Resolution::Complete(_) => {}
                }
                self.enter(progress, RegistrationState::BuildingGraph, sink)
                    .await?;
                let resolved = resolve_references(record, self.resolver.as_ref()).await?;
                (resolved, record_id.clone())
            }
        };

        // The graph is fully built before anything is written to the store.
        let graph = build_graph(&resolved, &record_id)?;
        let prov_document = graph.to_prov_json();

        self.enter(progress, RegistrationState::MergingGraph, sink)
            .await?;
        self.store.merge_graph(&graph).await?;

        self.enter(progress, RegistrationState::UpdatingRegistry, sink)
            .await?;
        self.registry
            .update_model_run(&record_id, &resolved.record, &prov_document.to_string())
            .await?;

        Ok(RegistrationOutcome {
            record_id,
            nodes: graph.node_count(),
            edges: graph.edge_count(),
            prov_document,
        })
    }

    async fn enter(
        &self,
        progress: &mut Progress<'_>,
        state: RegistrationState,
        sink: &dyn TransitionSink,
    ) -> Result<()> {
        progress.state = state;
        tracing::debug!(
            correlation_id = progress.correlation_id,
            record_id = ?progress.record_id,
            state = ?state,
            "Registration state entered"
        );
        self.events.emit(LifecycleEvent::StateEntered {
            correlation_id: progress.correlation_id.to_string(),
            record_id: progress.record_id.clone(),
            state,
        });
        sink.record(state, progress.record_id.as_deref(), None).await
    }
}
