//! Typed graph statements and the raw results a graph database returns.
//!
//! Statements are backend neutral. The Neo4j backend renders them with
//! [`GraphStatement::to_cypher`]; the in-memory backend interprets them
//! directly.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use provena_types::{ItemCategory, ItemSubtype};

use crate::graph::{ProvEdge, ProvNode, ProvRelation};

/// Property holding a node's registry handle.
pub const ID_PROPERTY: &str = "id";
pub const CATEGORY_PROPERTY: &str = "item_category";
pub const SUBTYPE_PROPERTY: &str = "item_subtype";

// ---------------------------------------------------------------------------
// Traversal patterns
// ---------------------------------------------------------------------------

/// Direction of a lineage walk relative to stored PROV relations.
///
/// Relations point from the derived item to its source (`used` runs
/// activity to entity, `wasGeneratedBy` entity to activity). Upstream from a
/// model run therefore reaches its inputs, and downstream from an input
/// reaches the run that used it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TraversalDirection {
    /// Follow relations from the start node outwards (what it came from).
    Upstream,
    /// Follow relations pointing at the start node (what came from it).
    Downstream,
}

/// Restriction on the node a path ends at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeConstraint {
    Category(ItemCategory),
    Subtype(ItemSubtype),
}

impl NodeConstraint {
    pub fn matches(&self, properties: &Map<String, Value>) -> bool {
        match self {
            NodeConstraint::Category(c) => {
                properties.get(CATEGORY_PROPERTY).and_then(Value::as_str) == Some(c.as_str())
            }
            NodeConstraint::Subtype(s) => {
                properties.get(SUBTYPE_PROPERTY).and_then(Value::as_str) == Some(s.as_str())
            }
        }
    }
}

/// A bounded variable-length path match anchored at one node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraversalPattern {
    pub start_id: String,
    pub direction: TraversalDirection,
    pub min_hops: u32,
    pub max_hops: u32,
    /// Constraint on the last node of the variable-length segment.
    pub terminal: Option<NodeConstraint>,
    /// One extra outgoing hop after the variable-length segment, ending at
    /// a node that satisfies this constraint.
    pub trailing_hop: Option<NodeConstraint>,
}

impl TraversalPattern {
    pub fn new(start_id: impl Into<String>, direction: TraversalDirection, depth: u32) -> Self {
        Self {
            start_id: start_id.into(),
            direction,
            min_hops: 1,
            max_hops: depth,
            terminal: None,
            trailing_hop: None,
        }
    }

    pub fn ending_at(mut self, constraint: NodeConstraint) -> Self {
        self.terminal = Some(constraint);
        self
    }

    pub fn with_trailing_hop(mut self, constraint: NodeConstraint) -> Self {
        self.trailing_hop = Some(constraint);
        self
    }
}

// ---------------------------------------------------------------------------
// Statements
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum GraphStatement {
    /// Create the node if absent, otherwise overwrite its properties.
    MergeNode(ProvNode),
    /// Create the relation between two identifier-keyed nodes if absent.
    MergeRelation(ProvEdge),
    /// Return every path matching the pattern, or a single null path.
    MatchPaths(TraversalPattern),
}

/// A parameterised Cypher statement.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CypherQuery {
    #[serde(rename = "statement")]
    pub text: String,
    pub parameters: Map<String, Value>,
}

impl GraphStatement {
    pub fn is_read(&self) -> bool {
        matches!(self, GraphStatement::MatchPaths(_))
    }

    pub fn to_cypher(&self) -> CypherQuery {
        let mut parameters = Map::new();
        let text = match self {
            GraphStatement::MergeNode(node) => {
                parameters.insert("id".into(), Value::String(node.identifier.clone()));
                parameters.insert(
                    "item_category".into(),
                    Value::String(node.category().as_str().into()),
                );
                parameters.insert(
                    "item_subtype".into(),
                    Value::String(node.subtype.as_str().into()),
                );
                format!(
                    "MERGE (n:{label} {{{ID_PROPERTY}: $id}}) \
                     SET n.{CATEGORY_PROPERTY} = $item_category, n.{SUBTYPE_PROPERTY} = $item_subtype",
                    label = node.category().label()
                )
            }
            GraphStatement::MergeRelation(edge) => {
                parameters.insert("from".into(), Value::String(edge.from.clone()));
                parameters.insert("to".into(), Value::String(edge.to.clone()));
                format!(
                    "MATCH (a {{{ID_PROPERTY}: $from}}), (b {{{ID_PROPERTY}: $to}}) \
                     MERGE (a)-[:{relation}]->(b)",
                    relation = edge.relation.as_str()
                )
            }
            GraphStatement::MatchPaths(pattern) => {
                parameters.insert("start_id".into(), Value::String(pattern.start_id.clone()));
                let hops = format!("[*{}..{}]", pattern.min_hops, pattern.max_hops);
                let segment = match pattern.direction {
                    TraversalDirection::Upstream => format!("-{hops}->"),
                    TraversalDirection::Downstream => format!("<-{hops}-"),
                };
                let terminal = render_constraint("n", pattern.terminal, "end", &mut parameters);
                let tail = match pattern.trailing_hop {
                    Some(c) => format!(
                        "-[]->{}",
                        render_constraint("t", Some(c), "trailing", &mut parameters)
                    ),
                    None => String::new(),
                };
                format!(
                    "OPTIONAL MATCH p = (start {{{ID_PROPERTY}: $start_id}}){segment}{terminal}{tail} RETURN p"
                )
            }
        };
        CypherQuery { text, parameters }
    }
}

fn render_constraint(
    var: &str,
    constraint: Option<NodeConstraint>,
    param_prefix: &str,
    parameters: &mut Map<String, Value>,
) -> String {
    match constraint {
        None => format!("({var})"),
        Some(NodeConstraint::Category(c)) => format!("({var}:{})", c.label()),
        Some(NodeConstraint::Subtype(s)) => {
            let name = format!("{param_prefix}_subtype");
            parameters.insert(name.clone(), Value::String(s.as_str().into()));
            format!("({var} {{{SUBTYPE_PROPERTY}: ${name}}})")
        }
    }
}

/// Statements merging every node of a graph, then every relation.
pub fn merge_statements<'a>(
    nodes: impl IntoIterator<Item = &'a ProvNode>,
    edges: impl IntoIterator<Item = &'a ProvEdge>,
) -> Vec<GraphStatement> {
    nodes
        .into_iter()
        .cloned()
        .map(GraphStatement::MergeNode)
        .chain(edges.into_iter().cloned().map(GraphStatement::MergeRelation))
        .collect()
}

// ---------------------------------------------------------------------------
// Raw results
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawNode {
    /// Database-internal node id, used only to join relations to nodes.
    pub element_id: String,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub properties: Map<String, Value>,
}

impl RawNode {
    pub fn property(&self, name: &str) -> Option<&str> {
        self.properties.get(name).and_then(Value::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRelationship {
    pub rel_type: String,
    pub start_node: String,
    pub end_node: String,
}

/// One matched path: its nodes and the relations between them, in hop order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawPath {
    pub nodes: Vec<RawNode>,
    pub relationships: Vec<RawRelationship>,
}

impl RawPath {
    pub fn node_index(&self) -> BTreeMap<&str, &RawNode> {
        self.nodes
            .iter()
            .map(|n| (n.element_id.as_str(), n))
            .collect()
    }
}

/// Result of one statement. Merge statements return no paths.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatementResult {
    /// `None` entries are rows where an optional match found nothing.
    pub paths: Vec<Option<RawPath>>,
}

impl StatementResult {
    pub fn empty() -> Self {
        Self::default()
    }
}

/// Typed relation name of a raw relationship, if it is one we write.
pub fn relation_of(raw: &RawRelationship) -> Option<ProvRelation> {
    ProvRelation::parse(&raw.rel_type)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_node_cypher_uses_category_label() {
        let q = GraphStatement::MergeNode(ProvNode::new("10378.1/5", ItemSubtype::Dataset))
            .to_cypher();
        assert_eq!(
            q.text,
            "MERGE (n:Entity {id: $id}) SET n.item_category = $item_category, n.item_subtype = $item_subtype"
        );
        assert_eq!(q.parameters["id"], "10378.1/5");
        assert_eq!(q.parameters["item_category"], "ENTITY");
        assert_eq!(q.parameters["item_subtype"], "DATASET");
    }

    #[test]
    fn merge_relation_cypher() {
        let q = GraphStatement::MergeRelation(ProvEdge {
            from: "a".into(),
            to: "b".into(),
            relation: ProvRelation::WasGeneratedBy,
        })
        .to_cypher();
        assert_eq!(
            q.text,
            "MATCH (a {id: $from}), (b {id: $to}) MERGE (a)-[:wasGeneratedBy]->(b)"
        );
        assert_eq!(q.parameters["from"], "a");
    }

    #[test]
    fn upstream_match_cypher() {
        let q = GraphStatement::MatchPaths(TraversalPattern::new(
            "x",
            TraversalDirection::Upstream,
            3,
        ))
        .to_cypher();
        assert_eq!(
            q.text,
            "OPTIONAL MATCH p = (start {id: $start_id})-[*1..3]->(n) RETURN p"
        );
        assert_eq!(q.parameters["start_id"], "x");
    }

    #[test]
    fn downstream_dataset_match_cypher() {
        let q = GraphStatement::MatchPaths(
            TraversalPattern::new("x", TraversalDirection::Downstream, 2)
                .ending_at(NodeConstraint::Subtype(ItemSubtype::Dataset)),
        )
        .to_cypher();
        assert_eq!(
            q.text,
            "OPTIONAL MATCH p = (start {id: $start_id})<-[*1..2]-(n {item_subtype: $end_subtype}) RETURN p"
        );
        assert_eq!(q.parameters["end_subtype"], "DATASET");
    }

    #[test]
    fn trailing_hop_cypher() {
        let q = GraphStatement::MatchPaths(
            TraversalPattern::new("x", TraversalDirection::Downstream, 2)
                .with_trailing_hop(NodeConstraint::Category(ItemCategory::Agent)),
        )
        .to_cypher();
        assert_eq!(
            q.text,
            "OPTIONAL MATCH p = (start {id: $start_id})<-[*1..2]-(n)-[]->(t:Agent) RETURN p"
        );
    }

    #[test]
    fn constraint_matching_reads_properties() {
        let mut props = Map::new();
        props.insert("item_category".into(), "AGENT".into());
        props.insert("item_subtype".into(), "PERSON".into());
        assert!(NodeConstraint::Category(ItemCategory::Agent).matches(&props));
        assert!(NodeConstraint::Subtype(ItemSubtype::Person).matches(&props));
        assert!(!NodeConstraint::Subtype(ItemSubtype::Dataset).matches(&props));
    }

    #[test]
    fn merge_statements_put_nodes_first() {
        let nodes = [ProvNode::new("a", ItemSubtype::ModelRun)];
        let edges = [ProvEdge {
            from: "a".into(),
            to: "a".into(),
            relation: ProvRelation::WasInformedBy,
        }];
        let statements = merge_statements(&nodes, &edges);
        assert!(matches!(statements[0], GraphStatement::MergeNode(_)));
        assert!(matches!(statements[1], GraphStatement::MergeRelation(_)));
        assert!(!statements[0].is_read());
    }
}
