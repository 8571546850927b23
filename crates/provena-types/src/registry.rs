//! Registry items as seen by the provenance core.
//!
//! The registry stores many item kinds; the core only cares about the
//! handful referenced from a model run. Each kind is one variant of
//! [`RegistryItem`], discriminated by its `item_subtype`.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::model_run::ModelRunRecord;

// ---------------------------------------------------------------------------
// Category / subtype
// ---------------------------------------------------------------------------

/// PROV-O top level class of a registry item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ItemCategory {
    Activity,
    Agent,
    Entity,
}

impl ItemCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            ItemCategory::Activity => "ACTIVITY",
            ItemCategory::Agent => "AGENT",
            ItemCategory::Entity => "ENTITY",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "ACTIVITY" => Some(ItemCategory::Activity),
            "AGENT" => Some(ItemCategory::Agent),
            "ENTITY" => Some(ItemCategory::Entity),
            _ => None,
        }
    }

    /// Graph database label used for nodes of this category.
    pub fn label(self) -> &'static str {
        match self {
            ItemCategory::Activity => "Activity",
            ItemCategory::Agent => "Agent",
            ItemCategory::Entity => "Entity",
        }
    }
}

impl fmt::Display for ItemCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ItemSubtype {
    Organisation,
    Person,
    ModelRun,
    Study,
    Model,
    ModelRunWorkflowTemplate,
    DatasetTemplate,
    Dataset,
}

impl ItemSubtype {
    pub const ALL: [ItemSubtype; 8] = [
        ItemSubtype::Organisation,
        ItemSubtype::Person,
        ItemSubtype::ModelRun,
        ItemSubtype::Study,
        ItemSubtype::Model,
        ItemSubtype::ModelRunWorkflowTemplate,
        ItemSubtype::DatasetTemplate,
        ItemSubtype::Dataset,
    ];

    pub fn category(self) -> ItemCategory {
        match self {
            ItemSubtype::Organisation | ItemSubtype::Person => ItemCategory::Agent,
            ItemSubtype::ModelRun | ItemSubtype::Study => ItemCategory::Activity,
            ItemSubtype::Model
            | ItemSubtype::ModelRunWorkflowTemplate
            | ItemSubtype::DatasetTemplate
            | ItemSubtype::Dataset => ItemCategory::Entity,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ItemSubtype::Organisation => "ORGANISATION",
            ItemSubtype::Person => "PERSON",
            ItemSubtype::ModelRun => "MODEL_RUN",
            ItemSubtype::Study => "STUDY",
            ItemSubtype::Model => "MODEL",
            ItemSubtype::ModelRunWorkflowTemplate => "MODEL_RUN_WORKFLOW_TEMPLATE",
            ItemSubtype::DatasetTemplate => "DATASET_TEMPLATE",
            ItemSubtype::Dataset => "DATASET",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.as_str() == value)
    }
}

impl fmt::Display for ItemSubtype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Item payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Organisation {
    pub id: String,
    pub display_name: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub ror: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Person {
    pub id: String,
    pub display_name: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub orcid: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Study {
    pub id: String,
    pub display_name: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// The software/model a workflow template runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Model {
    pub id: String,
    pub display_name: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub documentation_url: Option<String>,
    #[serde(default)]
    pub source_url: Option<String>,
}

/// A dataset template slot on a workflow template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateResource {
    pub template_id: String,
    #[serde(default)]
    pub optional: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowTemplateAnnotations {
    #[serde(default)]
    pub required: Vec<String>,
    #[serde(default)]
    pub optional: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowTemplate {
    pub id: String,
    pub display_name: String,
    pub software_id: String,
    #[serde(default)]
    pub input_templates: Vec<TemplateResource>,
    #[serde(default)]
    pub output_templates: Vec<TemplateResource>,
    #[serde(default)]
    pub annotations: Option<WorkflowTemplateAnnotations>,
}

impl WorkflowTemplate {
    /// Input then output template slots, in declaration order.
    pub fn all_templates(&self) -> impl Iterator<Item = &TemplateResource> {
        self.input_templates.iter().chain(self.output_templates.iter())
    }

    pub fn required_annotations(&self) -> &[String] {
        self.annotations
            .as_ref()
            .map(|a| a.required.as_slice())
            .unwrap_or(&[])
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResourceUsageType {
    ParameterFile,
    ConfigFile,
    ForcingData,
    GeneralData,
}

/// A resource whose path is fixed by the template itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DefinedResource {
    pub path: String,
    #[serde(default)]
    pub description: String,
    pub usage_type: ResourceUsageType,
    #[serde(default)]
    pub optional: bool,
    #[serde(default)]
    pub is_folder: bool,
    #[serde(default)]
    pub additional_metadata: Option<BTreeMap<String, String>>,
}

/// A resource whose path is supplied per model run, keyed by `key`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeferredResource {
    pub key: String,
    #[serde(default)]
    pub description: String,
    pub usage_type: ResourceUsageType,
    #[serde(default)]
    pub optional: bool,
    #[serde(default)]
    pub is_folder: bool,
    #[serde(default)]
    pub additional_metadata: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetTemplate {
    pub id: String,
    pub display_name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub defined_resources: Vec<DefinedResource>,
    #[serde(default)]
    pub deferred_resources: Vec<DeferredResource>,
}

impl DatasetTemplate {
    /// Deferred keys a submission must provide.
    pub fn required_keys(&self) -> impl Iterator<Item = &str> {
        self.deferred_resources
            .iter()
            .filter(|r| !r.optional)
            .map(|r| r.key.as_str())
    }

    /// Every deferred key a submission may provide.
    pub fn valid_keys(&self) -> impl Iterator<Item = &str> {
        self.deferred_resources.iter().map(|r| r.key.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub id: String,
    pub display_name: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// The registry record a model run registration lodges into.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelRunItem {
    pub id: String,
    pub display_name: String,
    #[serde(default)]
    pub record: Option<ModelRunRecord>,
    #[serde(default)]
    pub prov_serialisation: Option<String>,
    /// Incremented on every update; history is never rewritten in place.
    #[serde(default)]
    pub version: u32,
}

// ---------------------------------------------------------------------------
// RegistryItem
// ---------------------------------------------------------------------------

/// A complete registry item, discriminated by `item_subtype`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "item_subtype", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RegistryItem {
    Organisation(Organisation),
    Person(Person),
    ModelRun(ModelRunItem),
    Study(Study),
    Model(Model),
    ModelRunWorkflowTemplate(WorkflowTemplate),
    DatasetTemplate(DatasetTemplate),
    Dataset(Dataset),
}

impl RegistryItem {
    pub fn subtype(&self) -> ItemSubtype {
        match self {
            RegistryItem::Organisation(_) => ItemSubtype::Organisation,
            RegistryItem::Person(_) => ItemSubtype::Person,
            RegistryItem::ModelRun(_) => ItemSubtype::ModelRun,
            RegistryItem::Study(_) => ItemSubtype::Study,
            RegistryItem::Model(_) => ItemSubtype::Model,
            RegistryItem::ModelRunWorkflowTemplate(_) => ItemSubtype::ModelRunWorkflowTemplate,
            RegistryItem::DatasetTemplate(_) => ItemSubtype::DatasetTemplate,
            RegistryItem::Dataset(_) => ItemSubtype::Dataset,
        }
    }

    pub fn category(&self) -> ItemCategory {
        self.subtype().category()
    }

    pub fn id(&self) -> &str {
        match self {
            RegistryItem::Organisation(i) => &i.id,
            RegistryItem::Person(i) => &i.id,
            RegistryItem::ModelRun(i) => &i.id,
            RegistryItem::Study(i) => &i.id,
            RegistryItem::Model(i) => &i.id,
            RegistryItem::ModelRunWorkflowTemplate(i) => &i.id,
            RegistryItem::DatasetTemplate(i) => &i.id,
            RegistryItem::Dataset(i) => &i.id,
        }
    }

    pub fn display_name(&self) -> &str {
        match self {
            RegistryItem::Organisation(i) => &i.display_name,
            RegistryItem::Person(i) => &i.display_name,
            RegistryItem::ModelRun(i) => &i.display_name,
            RegistryItem::Study(i) => &i.display_name,
            RegistryItem::Model(i) => &i.display_name,
            RegistryItem::ModelRunWorkflowTemplate(i) => &i.display_name,
            RegistryItem::DatasetTemplate(i) => &i.display_name,
            RegistryItem::Dataset(i) => &i.display_name,
        }
    }
}

// ---------------------------------------------------------------------------
// Resolution
// ---------------------------------------------------------------------------

/// Outcome of looking up an id with an expected subtype.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// The item exists, is complete, and has the expected subtype.
    Complete(RegistryItem),
    /// The id exists but only as an incomplete seed.
    Seed,
    NotFound,
    WrongType { actual: ItemSubtype },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_subtype_round_trips_through_parse() {
        for subtype in ItemSubtype::ALL {
            assert_eq!(ItemSubtype::parse(subtype.as_str()), Some(subtype));
            let json = serde_json::to_string(&subtype).unwrap();
            assert_eq!(json, format!("\"{}\"", subtype.as_str()));
        }
        assert_eq!(ItemSubtype::parse("CREATE"), None);
    }

    #[test]
    fn subtype_categories() {
        assert_eq!(ItemSubtype::Person.category(), ItemCategory::Agent);
        assert_eq!(ItemSubtype::Organisation.category(), ItemCategory::Agent);
        assert_eq!(ItemSubtype::ModelRun.category(), ItemCategory::Activity);
        assert_eq!(ItemSubtype::Study.category(), ItemCategory::Activity);
        assert_eq!(ItemSubtype::Dataset.category(), ItemCategory::Entity);
        assert_eq!(ItemSubtype::Model.category(), ItemCategory::Entity);
    }

    #[test]
    fn registry_item_deserializes_by_subtype_tag() {
        let json = serde_json::json!({
            "item_subtype": "MODEL_RUN_WORKFLOW_TEMPLATE",
            "item_category": "ENTITY",
            "id": "10378.1/200",
            "display_name": "Hydrology workflow",
            "software_id": "10378.1/300",
            "input_templates": [{"template_id": "10378.1/400"}],
            "output_templates": [{"template_id": "10378.1/401", "optional": true}],
            "annotations": {"required": ["run_tag"]}
        });
        let item: RegistryItem = serde_json::from_value(json).unwrap();
        assert_eq!(item.subtype(), ItemSubtype::ModelRunWorkflowTemplate);
        assert_eq!(item.category(), ItemCategory::Entity);
        assert_eq!(item.id(), "10378.1/200");
        match item {
            RegistryItem::ModelRunWorkflowTemplate(t) => {
                assert_eq!(t.software_id, "10378.1/300");
                assert!(!t.input_templates[0].optional);
                assert!(t.output_templates[0].optional);
                assert_eq!(t.required_annotations(), ["run_tag".to_string()]);
            }
            other => panic!("unexpected item: {other:?}"),
        }
    }

    #[test]
    fn unknown_subtype_tag_is_rejected() {
        let json = serde_json::json!({
            "item_subtype": "CREATE",
            "id": "10378.1/1",
            "display_name": "x"
        });
        assert!(serde_json::from_value::<RegistryItem>(json).is_err());
    }

    #[test]
    fn dataset_template_key_sets() {
        let template = DatasetTemplate {
            id: "t".into(),
            display_name: "t".into(),
            description: None,
            defined_resources: vec![],
            deferred_resources: vec![
                DeferredResource {
                    key: "parameters".into(),
                    description: String::new(),
                    usage_type: ResourceUsageType::ParameterFile,
                    optional: false,
                    is_folder: false,
                    additional_metadata: None,
                },
                DeferredResource {
                    key: "notes".into(),
                    description: String::new(),
                    usage_type: ResourceUsageType::GeneralData,
                    optional: true,
                    is_folder: false,
                    additional_metadata: None,
                },
            ],
        };
        assert_eq!(template.required_keys().collect::<Vec<_>>(), ["parameters"]);
        assert_eq!(template.valid_keys().collect::<Vec<_>>(), ["parameters", "notes"]);
    }
}
