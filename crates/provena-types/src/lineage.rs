use serde::{Deserialize, Serialize};

use crate::registry::{ItemCategory, ItemSubtype};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineageNode {
    pub id: String,
    pub item_category: ItemCategory,
    pub item_subtype: ItemSubtype,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineageLink {
    pub source: String,
    pub target: String,
    /// Name of the PROV relation, e.g. `used`.
    #[serde(rename = "type")]
    pub relation: String,
}

/// Node-link serialisation of a lineage query result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineageGraph {
    pub directed: bool,
    /// `true` when parallel relations between a node pair are kept.
    pub multigraph: bool,
    pub nodes: Vec<LineageNode>,
    pub links: Vec<LineageLink>,
}

impl LineageGraph {
    pub fn empty(multigraph: bool) -> Self {
        Self {
            directed: true,
            multigraph,
            nodes: Vec::new(),
            links: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.links.is_empty()
    }

    pub fn node(&self, id: &str) -> Option<&LineageNode> {
        self.nodes.iter().find(|n| n.id == id)
    }
}
