use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Where a referenced dataset lives. Only the data store is supported.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DatasetType {
    #[default]
    DataStore,
}

/// A dataset bound to the dataset template slot it fills.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplatedDataset {
    pub dataset_template_id: String,
    pub dataset_id: String,
    #[serde(default)]
    pub dataset_type: DatasetType,
    /// Deferred resource key -> path inside the dataset.
    #[serde(default)]
    pub resources: Option<BTreeMap<String, String>>,
}

impl TemplatedDataset {
    pub fn resource_keys(&self) -> impl Iterator<Item = &str> {
        self.resources
            .iter()
            .flat_map(|r| r.keys().map(String::as_str))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssociationInfo {
    pub modeller_id: String,
    #[serde(default)]
    pub requesting_organisation_id: Option<String>,
}

/// A submitted description of one model run.
///
/// Times are epoch seconds. Once accepted a record is never mutated; a
/// later update lodges a new version of the registry item instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelRunRecord {
    pub workflow_template_id: String,
    #[serde(default)]
    pub inputs: Vec<TemplatedDataset>,
    #[serde(default)]
    pub outputs: Vec<TemplatedDataset>,
    #[serde(default)]
    pub annotations: Option<BTreeMap<String, String>>,
    pub display_name: String,
    pub description: String,
    #[serde(default)]
    pub study_id: Option<String>,
    pub associations: AssociationInfo,
    pub start_time: i64,
    pub end_time: i64,
}

impl ModelRunRecord {
    /// Inputs then outputs.
    pub fn all_datasets(&self) -> impl Iterator<Item = &TemplatedDataset> {
        self.inputs.iter().chain(self.outputs.iter())
    }

    /// Modeller first, then the requesting organisation if distinct.
    pub fn agent_ids(&self) -> Vec<&str> {
        let mut ids = vec![self.associations.modeller_id.as_str()];
        if let Some(org) = self.associations.requesting_organisation_id.as_deref() {
            if !ids.contains(&org) {
                ids.push(org);
            }
        }
        ids
    }
}
