//! In-process graph database interpreting [`GraphStatement`]s directly.
//!
//! Follows the same matching rules as the Cypher the Neo4j backend sends:
//! a relation is used at most once per path, hop counts are inclusive and
//! an optional match with no hits yields a single null path.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::RwLock;

use provena_types::{ProvenaError, Result};

use crate::query::{
    GraphStatement, NodeConstraint, RawNode, RawPath, RawRelationship, StatementResult,
    TraversalDirection, TraversalPattern, CATEGORY_PROPERTY, ID_PROPERTY, SUBTYPE_PROPERTY,
};
use crate::store::{GraphDatabase, GraphSession};

const SERVICE: &str = "graph database";

// ---------------------------------------------------------------------------
// Stored state
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct StoredNode {
    pub label: String,
    pub properties: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct StoredRelationship {
    pub from: String,
    pub to: String,
    pub rel_type: String,
}

/// Full contents of the store, keyed by node identifier.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GraphState {
    pub nodes: BTreeMap<String, StoredNode>,
    pub relationships: BTreeSet<StoredRelationship>,
}

impl GraphState {
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn relationship_count(&self) -> usize {
        self.relationships.len()
    }

    fn apply(&mut self, statement: &GraphStatement) -> StatementResult {
        match statement {
            GraphStatement::MergeNode(node) => {
                let mut properties = Map::new();
                properties.insert(ID_PROPERTY.into(), Value::String(node.identifier.clone()));
                properties.insert(
                    CATEGORY_PROPERTY.into(),
                    Value::String(node.category().as_str().into()),
                );
                properties.insert(
                    SUBTYPE_PROPERTY.into(),
                    Value::String(node.subtype.as_str().into()),
                );
                let entry = self
                    .nodes
                    .entry(node.identifier.clone())
                    .or_insert_with(|| StoredNode {
                        label: node.category().label().to_string(),
                        properties: Map::new(),
                    });
                entry.properties.extend(properties);
                StatementResult::empty()
            }
            GraphStatement::MergeRelation(edge) => {
                // MATCH on missing endpoints yields no rows, so nothing is merged.
                if self.nodes.contains_key(&edge.from) && self.nodes.contains_key(&edge.to) {
                    self.relationships.insert(StoredRelationship {
                        from: edge.from.clone(),
                        to: edge.to.clone(),
                        rel_type: edge.relation.as_str().to_string(),
                    });
                }
                StatementResult::empty()
            }
            GraphStatement::MatchPaths(_) => self.read(statement),
        }
    }

    fn read(&self, statement: &GraphStatement) -> StatementResult {
        match statement {
            GraphStatement::MatchPaths(pattern) => StatementResult {
                paths: PathFinder::new(self, pattern).run(),
            },
            _ => StatementResult::empty(),
        }
    }
}

// ---------------------------------------------------------------------------
// Path matching
// ---------------------------------------------------------------------------

struct PathFinder<'a> {
    state: &'a GraphState,
    pattern: &'a TraversalPattern,
    relationships: Vec<&'a StoredRelationship>,
    found: Vec<RawPath>,
}

impl<'a> PathFinder<'a> {
    fn new(state: &'a GraphState, pattern: &'a TraversalPattern) -> Self {
        Self {
            state,
            pattern,
            relationships: state.relationships.iter().collect(),
            found: Vec::new(),
        }
    }

    fn run(mut self) -> Vec<Option<RawPath>> {
        let start = self.pattern.start_id.as_str();
        if self.state.nodes.contains_key(start) {
            let mut nodes = vec![start];
            let mut used = Vec::new();
            self.walk(start, &mut nodes, &mut used);
        }
        if self.found.is_empty() {
            vec![None]
        } else {
            self.found.into_iter().map(Some).collect()
        }
    }

    fn satisfies(&self, id: &str, constraint: Option<NodeConstraint>) -> bool {
        match (constraint, self.state.nodes.get(id)) {
            (None, Some(_)) => true,
            (Some(c), Some(node)) => c.matches(&node.properties),
            (_, None) => false,
        }
    }

    fn walk(&mut self, node: &'a str, nodes: &mut Vec<&'a str>, used: &mut Vec<usize>) {
        let hops = used.len() as u32;
        if hops >= self.pattern.min_hops && self.satisfies(node, self.pattern.terminal) {
            self.emit(node, nodes, used);
        }
        if hops >= self.pattern.max_hops {
            return;
        }
        for index in 0..self.relationships.len() {
            if used.contains(&index) {
                continue;
            }
            let rel = self.relationships[index];
            let next = match self.pattern.direction {
                TraversalDirection::Upstream if rel.from == node => rel.to.as_str(),
                TraversalDirection::Downstream if rel.to == node => rel.from.as_str(),
                _ => continue,
            };
            used.push(index);
            nodes.push(next);
            self.walk(next, nodes, used);
            nodes.pop();
            used.pop();
        }
    }

    fn emit(&mut self, end: &'a str, nodes: &[&'a str], used: &[usize]) {
        let Some(trailing) = self.pattern.trailing_hop else {
            let path = self.raw_path(nodes, used);
            self.found.push(path);
            return;
        };
        for index in 0..self.relationships.len() {
            let rel = self.relationships[index];
            if used.contains(&index) || rel.from != end || !self.satisfies(&rel.to, Some(trailing))
            {
                continue;
            }
            let mut ext_nodes = nodes.to_vec();
            ext_nodes.push(rel.to.as_str());
            let mut ext_used = used.to_vec();
            ext_used.push(index);
            let path = self.raw_path(&ext_nodes, &ext_used);
            self.found.push(path);
        }
    }

    fn raw_path(&self, nodes: &[&str], used: &[usize]) -> RawPath {
        let mut path = RawPath::default();
        for id in nodes {
            if path.nodes.iter().any(|n| n.element_id == *id) {
                continue;
            }
            if let Some(stored) = self.state.nodes.get(*id) {
                path.nodes.push(RawNode {
                    element_id: id.to_string(),
                    labels: vec![stored.label.clone()],
                    properties: stored.properties.clone(),
                });
            }
        }
        path.relationships = used
            .iter()
            .map(|i| {
                let rel = self.relationships[*i];
                RawRelationship {
                    rel_type: rel.rel_type.clone(),
                    start_node: rel.from.clone(),
                    end_node: rel.to.clone(),
                }
            })
            .collect();
        path
    }
}

// ---------------------------------------------------------------------------
// Database and sessions
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Shared {
    state: RwLock<GraphState>,
    open_sessions: AtomicUsize,
    sessions_opened: AtomicUsize,
    unavailable: AtomicBool,
    fail_statements: AtomicBool,
}

/// A graph database held in memory, for tests and local runs.
#[derive(Clone, Default)]
pub struct InMemoryGraphDatabase {
    shared: Arc<Shared>,
}

impl InMemoryGraphDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn snapshot(&self) -> GraphState {
        self.shared.state.read().await.clone()
    }

    /// Sessions opened and not yet closed.
    pub fn open_sessions(&self) -> usize {
        self.shared.open_sessions.load(Ordering::SeqCst)
    }

    pub fn sessions_opened(&self) -> usize {
        self.shared.sessions_opened.load(Ordering::SeqCst)
    }

    /// Make `open_session` fail as if the server were unreachable.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.shared.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Make every transaction fail after the session is opened.
    pub fn fail_statements(&self, fail: bool) {
        self.shared.fail_statements.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl GraphDatabase for InMemoryGraphDatabase {
    async fn open_session(&self) -> Result<Box<dyn GraphSession>> {
        if self.shared.unavailable.load(Ordering::SeqCst) {
            return Err(ProvenaError::transport(SERVICE, "connection refused"));
        }
        self.shared.open_sessions.fetch_add(1, Ordering::SeqCst);
        self.shared.sessions_opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemorySession {
            shared: self.shared.clone(),
        }))
    }
}

struct MemorySession {
    shared: Arc<Shared>,
}

#[async_trait]
impl GraphSession for MemorySession {
    async fn run(&mut self, statements: &[GraphStatement]) -> Result<Vec<StatementResult>> {
        if self.shared.fail_statements.load(Ordering::SeqCst) {
            return Err(ProvenaError::UpstreamService {
                service: SERVICE.into(),
                status: 500,
                message: "transaction failed".into(),
            });
        }
        if statements.iter().all(GraphStatement::is_read) {
            let state = self.shared.state.read().await;
            return Ok(statements.iter().map(|s| state.read(s)).collect());
        }
        let mut state = self.shared.state.write().await;
        let mut working = state.clone();
        let results = statements.iter().map(|s| working.apply(s)).collect();
        *state = working;
        Ok(results)
    }

    async fn close(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}

impl Drop for MemorySession {
    fn drop(&mut self) {
        self.shared.open_sessions.fetch_sub(1, Ordering::SeqCst);
    }
}
