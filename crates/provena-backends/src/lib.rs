//! Network implementations of the provenance core's collaborators, and the
//! wiring that picks between them and the in-memory ones from configuration.

pub mod connect;
pub mod neo4j;
pub mod registry;

pub use connect::Backends;
pub use neo4j::Neo4jHttpDatabase;
pub use registry::RegistryHttpClient;
