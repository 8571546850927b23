//! In-memory provenance graph produced by the builder.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use provena_types::{ItemCategory, ItemSubtype, ProvenaError, Result};

/// Namespace prefix written into PROV-JSON documents.
pub const HANDLE_NAMESPACE: &str = "http://hdl.handle.net/";

// ---------------------------------------------------------------------------
// Relations
// ---------------------------------------------------------------------------

/// The PROV-O relations this system writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ProvRelation {
    #[serde(rename = "used")]
    Used,
    #[serde(rename = "wasGeneratedBy")]
    WasGeneratedBy,
    #[serde(rename = "wasAssociatedWith")]
    WasAssociatedWith,
    #[serde(rename = "wasAttributedTo")]
    WasAttributedTo,
    #[serde(rename = "actedOnBehalfOf")]
    ActedOnBehalfOf,
    #[serde(rename = "wasInformedBy")]
    WasInformedBy,
}

impl ProvRelation {
    pub const ALL: [ProvRelation; 6] = [
        ProvRelation::Used,
        ProvRelation::WasGeneratedBy,
        ProvRelation::WasAssociatedWith,
        ProvRelation::WasAttributedTo,
        ProvRelation::ActedOnBehalfOf,
        ProvRelation::WasInformedBy,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ProvRelation::Used => "used",
            ProvRelation::WasGeneratedBy => "wasGeneratedBy",
            ProvRelation::WasAssociatedWith => "wasAssociatedWith",
            ProvRelation::WasAttributedTo => "wasAttributedTo",
            ProvRelation::ActedOnBehalfOf => "actedOnBehalfOf",
            ProvRelation::WasInformedBy => "wasInformedBy",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|r| r.as_str() == value)
    }

    /// PROV-JSON attribute names for the (source, target) ends.
    fn prov_json_roles(self) -> (&'static str, &'static str) {
        match self {
            ProvRelation::Used => ("prov:activity", "prov:entity"),
            ProvRelation::WasGeneratedBy => ("prov:entity", "prov:activity"),
            ProvRelation::WasAssociatedWith => ("prov:activity", "prov:agent"),
            ProvRelation::WasAttributedTo => ("prov:entity", "prov:agent"),
            ProvRelation::ActedOnBehalfOf => ("prov:delegate", "prov:responsible"),
            ProvRelation::WasInformedBy => ("prov:informed", "prov:informant"),
        }
    }

    /// Categories the (source, target) ends must belong to.
    pub fn endpoint_categories(self) -> (ItemCategory, ItemCategory) {
        use ItemCategory::*;
        match self {
            ProvRelation::Used => (Activity, Entity),
            ProvRelation::WasGeneratedBy => (Entity, Activity),
            ProvRelation::WasAssociatedWith => (Activity, Agent),
            ProvRelation::WasAttributedTo => (Entity, Agent),
            ProvRelation::ActedOnBehalfOf => (Agent, Agent),
            ProvRelation::WasInformedBy => (Activity, Activity),
        }
    }
}

impl fmt::Display for ProvRelation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Nodes and edges
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvNode {
    /// Registry handle; the merge key in the graph store.
    pub identifier: String,
    pub subtype: ItemSubtype,
}

impl ProvNode {
    pub fn new(identifier: impl Into<String>, subtype: ItemSubtype) -> Self {
        Self {
            identifier: identifier.into(),
            subtype,
        }
    }

    pub fn category(&self) -> ItemCategory {
        self.subtype.category()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProvEdge {
    pub from: String,
    pub to: String,
    pub relation: ProvRelation,
}

// ---------------------------------------------------------------------------
// ProvenanceGraph
// ---------------------------------------------------------------------------

/// Typed nodes keyed by identifier plus directed relations between them.
///
/// Nodes iterate in identifier order and edges in insertion order, so two
/// graphs built from the same input compare and serialise identically.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProvenanceGraph {
    nodes: BTreeMap<String, ProvNode>,
    edges: Vec<ProvEdge>,
}

impl ProvenanceGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node, or confirm an existing node has the same subtype.
    pub fn add_node(&mut self, identifier: &str, subtype: ItemSubtype) -> Result<()> {
        match self.nodes.get(identifier) {
            Some(existing) if existing.subtype != subtype => {
                Err(ProvenaError::BuildInvariantError(format!(
                    "'{identifier}' appears as both {} and {subtype}",
                    existing.subtype
                )))
            }
            Some(_) => Ok(()),
            None => {
                self.nodes
                    .insert(identifier.to_string(), ProvNode::new(identifier, subtype));
                Ok(())
            }
        }
    }

    /// Add a relation between two existing nodes. Duplicates are ignored.
    pub fn add_edge(&mut self, from: &str, to: &str, relation: ProvRelation) -> Result<()> {
        let (from_category, to_category) = relation.endpoint_categories();
        for (id, category) in [(from, from_category), (to, to_category)] {
            let node = self.nodes.get(id).ok_or_else(|| {
                ProvenaError::BuildInvariantError(format!(
                    "{relation} references '{id}' which is not a node of the graph"
                ))
            })?;
            if node.category() != category {
                return Err(ProvenaError::BuildInvariantError(format!(
                    "{relation} requires '{id}' to be an {category} but it is a {}",
                    node.subtype
                )));
            }
        }

        let edge = ProvEdge {
            from: from.to_string(),
            to: to.to_string(),
            relation,
        };
        if !self.edges.contains(&edge) {
            self.edges.push(edge);
        }
        Ok(())
    }

    pub fn node(&self, identifier: &str) -> Option<&ProvNode> {
        self.nodes.get(identifier)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &ProvNode> {
        self.nodes.values()
    }

    pub fn edges(&self) -> &[ProvEdge] {
        &self.edges
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn nodes_in(&self, category: ItemCategory) -> impl Iterator<Item = &ProvNode> {
        self.nodes.values().filter(move |n| n.category() == category)
    }

    pub fn edges_of(&self, relation: ProvRelation) -> impl Iterator<Item = &ProvEdge> {
        self.edges.iter().filter(move |e| e.relation == relation)
    }

    pub fn has_edge(&self, from: &str, to: &str, relation: ProvRelation) -> bool {
        self.edges
            .iter()
            .any(|e| e.from == from && e.to == to && e.relation == relation)
    }

    // -----------------------------------------------------------------------
    // PROV-JSON
    // -----------------------------------------------------------------------

    /// Serialise as a PROV-JSON document.
    pub fn to_prov_json(&self) -> Value {
        let mut doc = Map::new();
        doc.insert("prefix".into(), json!({ "default": HANDLE_NAMESPACE }));

        for (category, section) in [
            (ItemCategory::Entity, "entity"),
            (ItemCategory::Activity, "activity"),
            (ItemCategory::Agent, "agent"),
        ] {
            let members: Map<String, Value> = self
                .nodes_in(category)
                .map(|n| {
                    (
                        n.identifier.clone(),
                        json!({
                            "item_category": category.as_str(),
                            "item_subtype": n.subtype.as_str(),
                        }),
                    )
                })
                .collect();
            if !members.is_empty() {
                doc.insert(section.into(), Value::Object(members));
            }
        }

        for (index, edge) in self.edges.iter().enumerate() {
            let (source_role, target_role) = edge.relation.prov_json_roles();
            let section = doc
                .entry(edge.relation.as_str())
                .or_insert_with(|| Value::Object(Map::new()));
            if let Value::Object(members) = section {
                members.insert(
                    format!("_:id{}", index + 1),
                    json!({ source_role: edge.from, target_role: edge.to }),
                );
            }
        }

        Value::Object(doc)
    }

    /// [`to_prov_json`](Self::to_prov_json) rendered as a string.
    pub fn to_prov_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.to_prov_json())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ProvenanceGraph {
        let mut graph = ProvenanceGraph::new();
        graph.add_node("run", ItemSubtype::ModelRun).unwrap();
        graph.add_node("in", ItemSubtype::Dataset).unwrap();
        graph.add_node("out", ItemSubtype::Dataset).unwrap();
        graph.add_node("ada", ItemSubtype::Person).unwrap();
        graph.add_edge("run", "in", ProvRelation::Used).unwrap();
        graph.add_edge("out", "run", ProvRelation::WasGeneratedBy).unwrap();
        graph.add_edge("run", "ada", ProvRelation::WasAssociatedWith).unwrap();
        graph
    }

    #[test]
    fn relation_names_round_trip() {
        for relation in ProvRelation::ALL {
            assert_eq!(ProvRelation::parse(relation.as_str()), Some(relation));
            assert_eq!(
                serde_json::to_value(relation).unwrap(),
                Value::String(relation.as_str().into())
            );
        }
        assert_eq!(ProvRelation::parse("derivedFrom"), None);
    }

    #[test]
    fn duplicate_nodes_and_edges_are_collapsed() {
        let mut graph = sample();
        graph.add_node("in", ItemSubtype::Dataset).unwrap();
        graph.add_edge("run", "in", ProvRelation::Used).unwrap();
        assert_eq!(graph.node_count(), 4);
        assert_eq!(graph.edge_count(), 3);
    }

    #[test]
    fn conflicting_subtype_is_an_invariant_error() {
        let mut graph = sample();
        let err = graph.add_node("in", ItemSubtype::Model).unwrap_err();
        assert!(matches!(err, ProvenaError::BuildInvariantError(_)));
    }

    #[test]
    fn edge_to_unknown_node_fails() {
        let mut graph = sample();
        let err = graph
            .add_edge("run", "ghost", ProvRelation::Used)
            .unwrap_err();
        assert!(err.to_string().contains("ghost"));
    }

    #[test]
    fn edge_with_wrong_endpoint_category_fails() {
        let mut graph = sample();
        let err = graph
            .add_edge("in", "run", ProvRelation::Used)
            .unwrap_err();
        assert!(matches!(err, ProvenaError::BuildInvariantError(_)));
    }

    #[test]
    fn category_filters() {
        let graph = sample();
        assert_eq!(graph.nodes_in(ItemCategory::Entity).count(), 2);
        assert_eq!(graph.nodes_in(ItemCategory::Agent).count(), 1);
        assert_eq!(graph.edges_of(ProvRelation::Used).count(), 1);
        assert!(graph.has_edge("out", "run", ProvRelation::WasGeneratedBy));
    }

    #[test]
    fn prov_json_has_sections_per_category_and_relation() {
        let doc = sample().to_prov_json();
        assert_eq!(doc["prefix"]["default"], HANDLE_NAMESPACE);
        assert_eq!(doc["activity"]["run"]["item_subtype"], "MODEL_RUN");
        assert_eq!(doc["entity"]["in"]["item_category"], "ENTITY");
        assert_eq!(doc["agent"]["ada"]["item_subtype"], "PERSON");
        assert_eq!(doc["used"]["_:id1"]["prov:activity"], "run");
        assert_eq!(doc["used"]["_:id1"]["prov:entity"], "in");
        assert_eq!(doc["wasGeneratedBy"]["_:id2"]["prov:entity"], "out");
        assert_eq!(doc["wasAssociatedWith"]["_:id3"]["prov:agent"], "ada");
        assert!(doc.get("actedOnBehalfOf").is_none());
    }

    #[test]
    fn graph_serde_is_stable() {
        let graph = sample();
        let json = serde_json::to_string(&graph).unwrap();
        let back: ProvenanceGraph = serde_json::from_str(&json).unwrap();
        assert_eq!(back, graph);
    }
}
