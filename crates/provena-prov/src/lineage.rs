//! Bounded-depth lineage traversal over the provenance store.

use std::collections::HashSet;

use provena_types::{
    ItemCategory, ItemSubtype, LineageGraph, LineageLink, LineageNode, ProvenaError, Result,
};

use crate::query::{
    NodeConstraint, RawNode, RawPath, TraversalDirection, TraversalPattern, CATEGORY_PROPERTY,
    ID_PROPERTY, SUBTYPE_PROPERTY,
};
use crate::store::GraphStoreManager;

/// Default upper bound on traversal depth.
pub const DEFAULT_MAX_DEPTH: u32 = 10;

/// Runs upstream/downstream traversals and folds the resulting paths into
/// a node-link [`LineageGraph`].
#[derive(Clone)]
pub struct LineageQueryEngine {
    store: GraphStoreManager,
    max_depth: u32,
    retain_parallel_relations: bool,
}

impl LineageQueryEngine {
    pub fn new(store: GraphStoreManager) -> Self {
        Self {
            store,
            max_depth: DEFAULT_MAX_DEPTH,
            retain_parallel_relations: false,
        }
    }

    pub fn with_max_depth(mut self, max_depth: u32) -> Self {
        self.max_depth = max_depth.max(1);
        self
    }

    /// Keep every relation type between a node pair instead of only the first.
    pub fn with_parallel_relations(mut self, retain: bool) -> Self {
        self.retain_parallel_relations = retain;
        self
    }

    pub fn max_depth(&self) -> u32 {
        self.max_depth
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// Everything `start_id` was derived from, up to `depth` hops.
    pub async fn upstream(&self, start_id: &str, depth: i64) -> Result<LineageGraph> {
        let depth = self.check_input(start_id, depth)?;
        self.traverse(TraversalPattern::new(start_id, TraversalDirection::Upstream, depth))
            .await
    }

    /// Everything derived from `start_id`, up to `depth` hops.
    pub async fn downstream(&self, start_id: &str, depth: i64) -> Result<LineageGraph> {
        let depth = self.check_input(start_id, depth)?;
        self.traverse(TraversalPattern::new(start_id, TraversalDirection::Downstream, depth))
            .await
    }

    /// Upstream paths that end at a dataset.
    pub async fn upstream_datasets(&self, start_id: &str, depth: i64) -> Result<LineageGraph> {
        let depth = self.check_input(start_id, depth)?;
        self.traverse(
            TraversalPattern::new(start_id, TraversalDirection::Upstream, depth)
                .ending_at(NodeConstraint::Subtype(ItemSubtype::Dataset)),
        )
        .await
    }

    /// Downstream paths that end at a dataset.
    pub async fn downstream_datasets(&self, start_id: &str, depth: i64) -> Result<LineageGraph> {
        let depth = self.check_input(start_id, depth)?;
        self.traverse(
            TraversalPattern::new(start_id, TraversalDirection::Downstream, depth)
                .ending_at(NodeConstraint::Subtype(ItemSubtype::Dataset)),
        )
        .await
    }

    /// Upstream paths that end at an agent.
    pub async fn upstream_agents(&self, start_id: &str, depth: i64) -> Result<LineageGraph> {
        let depth = self.check_input(start_id, depth)?;
        self.traverse(
            TraversalPattern::new(start_id, TraversalDirection::Upstream, depth)
                .ending_at(NodeConstraint::Category(ItemCategory::Agent)),
        )
        .await
    }

    /// Agents attached to anything downstream of `start_id`.
    ///
    /// Downstream paths are extended by one outgoing hop into an agent, so
    /// agents associated with a derived activity or attributed a derived
    /// entity are reached.
    pub async fn downstream_agents(&self, start_id: &str, depth: i64) -> Result<LineageGraph> {
        let depth = self.check_input(start_id, depth)?;
        self.traverse(
            TraversalPattern::new(start_id, TraversalDirection::Downstream, depth)
                .with_trailing_hop(NodeConstraint::Category(ItemCategory::Agent)),
        )
        .await
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn check_input(&self, start_id: &str, depth: i64) -> Result<u32> {
        if start_id.trim().is_empty() {
            return Err(ProvenaError::QueryInputError(
                "starting_id must not be empty".into(),
            ));
        }
        if start_id.chars().any(char::is_control) {
            return Err(ProvenaError::QueryInputError(
                "starting_id must not contain control characters".into(),
            ));
        }
        if depth < 1 {
            return Err(ProvenaError::QueryInputError(format!(
                "depth must be a positive integer, got {depth}"
            )));
        }
        if depth > i64::from(self.max_depth) {
            return Err(ProvenaError::QueryInputError(format!(
                "depth must not exceed {}, got {depth}",
                self.max_depth
            )));
        }
        u32::try_from(depth)
            .map_err(|_| ProvenaError::QueryInputError(format!("depth {depth} is out of range")))
    }

    async fn traverse(&self, pattern: TraversalPattern) -> Result<LineageGraph> {
        let start_id = pattern.start_id.clone();
        let direction = pattern.direction;
        let depth = pattern.max_hops;
        let paths = self.store.query(pattern).await?;
        let graph = paths_to_graph(paths, self.retain_parallel_relations)?;
        tracing::debug!(
            start_id = %start_id,
            ?direction,
            depth,
            nodes = graph.nodes.len(),
            links = graph.links.len(),
            "Lineage query complete"
        );
        Ok(graph)
    }
}

// ---------------------------------------------------------------------------
// Path folding
// ---------------------------------------------------------------------------

fn malformed(message: String) -> ProvenaError {
    ProvenaError::UpstreamService {
        service: "graph database".into(),
        status: 0,
        message,
    }
}

fn lineage_node(raw: &RawNode) -> Result<LineageNode> {
    let id = raw
        .property(ID_PROPERTY)
        .ok_or_else(|| malformed(format!("node {} has no id property", raw.element_id)))?;
    let category = raw
        .property(CATEGORY_PROPERTY)
        .and_then(ItemCategory::parse)
        .ok_or_else(|| malformed(format!("node '{id}' has no valid item_category")))?;
    let subtype = raw
        .property(SUBTYPE_PROPERTY)
        .and_then(ItemSubtype::parse)
        .ok_or_else(|| malformed(format!("node '{id}' has no valid item_subtype")))?;
    Ok(LineageNode {
        id: id.to_string(),
        item_category: category,
        item_subtype: subtype,
    })
}

/// Fold raw paths into one graph.
///
/// Null paths are skipped. Nodes are added the first time they are seen.
/// Unless `retain_parallel` is set, only the first relation between a
/// given (source, target) pair is kept, whatever its type.
pub fn paths_to_graph(
    paths: impl IntoIterator<Item = Option<RawPath>>,
    retain_parallel: bool,
) -> Result<LineageGraph> {
    let mut graph = LineageGraph::empty(retain_parallel);
    let mut seen_nodes: HashSet<String> = HashSet::new();
    let mut seen_links: HashSet<(String, String, Option<String>)> = HashSet::new();

    for path in paths.into_iter().flatten() {
        let index = path.node_index();
        for rel in &path.relationships {
            let mut ends = Vec::with_capacity(2);
            for element_id in [&rel.start_node, &rel.end_node] {
                let raw = index.get(element_id.as_str()).ok_or_else(|| {
                    malformed(format!(
                        "relationship {} references node {element_id} missing from its path",
                        rel.rel_type
                    ))
                })?;
                let node = lineage_node(raw)?;
                if seen_nodes.insert(node.id.clone()) {
                    graph.nodes.push(node.clone());
                }
                ends.push(node.id);
            }
            let target = ends.pop().unwrap_or_default();
            let source = ends.pop().unwrap_or_default();

            let key = (
                source.clone(),
                target.clone(),
                retain_parallel.then(|| rel.rel_type.clone()),
            );
            if seen_links.insert(key) {
                graph.links.push(LineageLink {
                    source,
                    target,
                    relation: rel.rel_type.clone(),
                });
            }
        }
    }
    Ok(graph)
}
