//! Provenance core: record validation, graph building, graph store
//! management, lineage queries and the registration lifecycle.
//!
//! Collaborators are passed in explicitly: an [`EntityResolver`] and
//! [`ModelRunRegistry`] for the registry, and a [`GraphDatabase`] behind the
//! [`GraphStoreManager`]. In-memory implementations of each live in
//! [`memory`] and [`memory_graph`].

pub mod builder;
pub mod config;
pub mod events;
pub mod graph;
pub mod jobs;
pub mod lineage;
pub mod memory;
pub mod memory_graph;
pub mod orchestrator;
pub mod query;
pub mod resolver;
pub mod store;
pub mod validation;

#[cfg(test)]
mod fixtures;

pub use builder::build_graph;
pub use config::{GraphBackend, ProvConfig, RegistryBackend};
pub use events::{EventEmitter, LifecycleEvent};
pub use graph::{ProvEdge, ProvNode, ProvRelation, ProvenanceGraph};
pub use jobs::{FileJobStore, JobQueue, JobStore};
pub use lineage::{paths_to_graph, LineageQueryEngine, DEFAULT_MAX_DEPTH};
pub use memory::InMemoryRegistry;
pub use memory_graph::InMemoryGraphDatabase;
pub use orchestrator::{
    LifecycleOrchestrator, NoTransitions, RegistrationOutcome, RegistrationRequest,
    TransitionSink,
};
pub use query::{
    CypherQuery, GraphStatement, NodeConstraint, RawNode, RawPath, RawRelationship,
    StatementResult, TraversalDirection, TraversalPattern,
};
pub use resolver::{EntityResolver, ModelRunRegistry};
pub use store::{GraphDatabase, GraphSession, GraphStoreManager};
pub use validation::{
    resolve_references, validate_model_run, validate_or_raise, ResolvedModelRun,
    ValidationOutcome,
};
