//! Graph store manager and the graph database interface it drives.

use std::sync::Arc;

use async_trait::async_trait;

use provena_types::{ProvenaError, Result};

use crate::graph::ProvenanceGraph;
use crate::query::{merge_statements, GraphStatement, RawPath, StatementResult, TraversalPattern};

/// A graph database reachable by opening short-lived sessions.
#[async_trait]
pub trait GraphDatabase: Send + Sync {
    async fn open_session(&self) -> Result<Box<dyn GraphSession>>;
}

/// One connection to the graph database.
#[async_trait]
pub trait GraphSession: Send {
    /// Run `statements` as a single transaction and return one result per
    /// statement. On error nothing is applied.
    async fn run(&mut self, statements: &[GraphStatement]) -> Result<Vec<StatementResult>>;

    /// Release the connection, rolling back anything left uncommitted.
    async fn close(self: Box<Self>) -> Result<()>;
}

/// Merges provenance graphs into the store and runs lineage traversals.
///
/// Every operation opens its own session and closes it before returning,
/// whether or not the operation succeeded.
#[derive(Clone)]
pub struct GraphStoreManager {
    database: Arc<dyn GraphDatabase>,
}

impl GraphStoreManager {
    pub fn new(database: Arc<dyn GraphDatabase>) -> Self {
        Self { database }
    }

    /// Upsert every node and relation of `graph`. Never deletes anything.
    pub async fn merge_graph(&self, graph: &ProvenanceGraph) -> Result<()> {
        let statements = merge_statements(graph.nodes(), graph.edges());
        tracing::debug!(statements = statements.len(), "Merging provenance graph");
        self.execute(&statements).await?;
        tracing::info!(
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            "Provenance graph merged"
        );
        Ok(())
    }

    /// Run a traversal and return its raw paths, nulls included.
    pub async fn query(&self, pattern: TraversalPattern) -> Result<Vec<Option<RawPath>>> {
        let statement = GraphStatement::MatchPaths(pattern);
        let mut results = self.execute(std::slice::from_ref(&statement)).await?;
        match results.pop() {
            Some(result) if results.is_empty() => Ok(result.paths),
            _ => Err(ProvenaError::transport(
                "graph database",
                "expected exactly one result for a single statement",
            )),
        }
    }

    async fn execute(&self, statements: &[GraphStatement]) -> Result<Vec<StatementResult>> {
        let mut session = self.database.open_session().await?;
        let outcome = session.run(statements).await;
        let closed = session.close().await;
        match (outcome, closed) {
            (Ok(results), Ok(())) => Ok(results),
            (Ok(_), Err(close_err)) => Err(close_err),
            (Err(err), Ok(())) => Err(err),
            (Err(err), Err(close_err)) => {
                tracing::warn!(error = %close_err, "Failed to close graph session after error");
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_graph::InMemoryGraphDatabase;
    use crate::query::TraversalDirection;
    use provena_types::ItemSubtype;

    use crate::graph::ProvRelation;

    fn graph_a() -> ProvenanceGraph {
        let mut g = ProvenanceGraph::new();
        g.add_node("run-a", ItemSubtype::ModelRun).unwrap();
        g.add_node("data-1", ItemSubtype::Dataset).unwrap();
        g.add_edge("run-a", "data-1", ProvRelation::Used).unwrap();
        g
    }

    fn graph_b() -> ProvenanceGraph {
        let mut g = ProvenanceGraph::new();
        g.add_node("run-b", ItemSubtype::ModelRun).unwrap();
        g.add_node("data-2", ItemSubtype::Dataset).unwrap();
        g.add_edge("data-2", "run-b", ProvRelation::WasGeneratedBy).unwrap();
        g
    }

    fn graph_sharing_data_1() -> ProvenanceGraph {
        let mut g = ProvenanceGraph::new();
        g.add_node("run-c", ItemSubtype::ModelRun).unwrap();
        g.add_node("data-1", ItemSubtype::Dataset).unwrap();
        g.add_edge("data-1", "run-c", ProvRelation::WasGeneratedBy).unwrap();
        g
    }

    fn manager() -> (Arc<InMemoryGraphDatabase>, GraphStoreManager) {
        let db = Arc::new(InMemoryGraphDatabase::new());
        (db.clone(), GraphStoreManager::new(db))
    }

    #[tokio::test]
    async fn merge_is_idempotent() {
        let (db, store) = manager();
        store.merge_graph(&graph_a()).await.unwrap();
        let once = db.snapshot().await;
        store.merge_graph(&graph_a()).await.unwrap();
        assert_eq!(db.snapshot().await, once);
        assert_eq!(once.node_count(), 2);
        assert_eq!(once.relationship_count(), 1);
    }

    #[tokio::test]
    async fn merge_is_order_independent() {
        let (db_ab, ab) = manager();
        ab.merge_graph(&graph_a()).await.unwrap();
        ab.merge_graph(&graph_b()).await.unwrap();

        let (db_ba, ba) = manager();
        ba.merge_graph(&graph_b()).await.unwrap();
        ba.merge_graph(&graph_a()).await.unwrap();

        assert_eq!(db_ab.snapshot().await, db_ba.snapshot().await);
    }

    #[tokio::test]
    async fn shared_entity_keeps_both_activities_edges() {
        let (db, store) = manager();
        store.merge_graph(&graph_a()).await.unwrap();
        store.merge_graph(&graph_sharing_data_1()).await.unwrap();
        let snapshot = db.snapshot().await;
        assert_eq!(snapshot.node_count(), 3);
        assert_eq!(snapshot.relationship_count(), 2);
    }

    #[tokio::test]
    async fn sessions_are_released_after_success_and_failure() {
        let (db, store) = manager();
        store.merge_graph(&graph_a()).await.unwrap();
        assert_eq!(db.open_sessions(), 0);

        db.fail_statements(true);
        assert!(store.merge_graph(&graph_b()).await.is_err());
        assert_eq!(db.open_sessions(), 0);
        assert_eq!(db.sessions_opened(), 2);
    }

    #[tokio::test]
    async fn failed_merge_applies_nothing() {
        let (db, store) = manager();
        db.fail_statements(true);
        assert!(store.merge_graph(&graph_a()).await.is_err());
        db.fail_statements(false);
        assert_eq!(db.snapshot().await.node_count(), 0);
    }

    #[tokio::test]
    async fn unavailable_database_is_a_typed_error() {
        let (db, store) = manager();
        db.set_unavailable(true);
        let err = store
            .query(TraversalPattern::new("x", TraversalDirection::Upstream, 1))
            .await
            .unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(db.open_sessions(), 0);
    }

    #[tokio::test]
    async fn query_returns_null_path_when_nothing_matches() {
        let (_db, store) = manager();
        let paths = store
            .query(TraversalPattern::new("nobody", TraversalDirection::Upstream, 3))
            .await
            .unwrap();
        assert_eq!(paths, vec![None]);
    }
}
