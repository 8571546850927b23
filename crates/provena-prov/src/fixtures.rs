//! Shared registry contents for unit tests.

use std::collections::BTreeMap;

use provena_types::{
    AssociationInfo, Dataset, DatasetTemplate, DatasetType, DeferredResource, Model,
    ModelRunRecord, Organisation, Person, RegistryItem, ResourceUsageType, Study,
    TemplateResource, TemplatedDataset, WorkflowTemplate,
};

use crate::memory::InMemoryRegistry;

pub const ORGANISATION: &str = "10378.1/100";
pub const MODELLER: &str = "10378.1/101";
pub const STUDY: &str = "10378.1/102";
pub const MODEL: &str = "10378.1/200";
pub const WORKFLOW: &str = "10378.1/300";
pub const INPUT_TEMPLATE: &str = "10378.1/400";
pub const OUTPUT_TEMPLATE: &str = "10378.1/401";
pub const INPUT_DATASET: &str = "10378.1/500";
pub const OUTPUT_DATASET: &str = "10378.1/501";

pub fn workflow_template() -> WorkflowTemplate {
    WorkflowTemplate {
        id: WORKFLOW.into(),
        display_name: "Catchment workflow".into(),
        software_id: MODEL.into(),
        input_templates: vec![TemplateResource {
            template_id: INPUT_TEMPLATE.into(),
            optional: false,
        }],
        output_templates: vec![TemplateResource {
            template_id: OUTPUT_TEMPLATE.into(),
            optional: false,
        }],
        annotations: None,
    }
}

pub fn items() -> Vec<RegistryItem> {
    vec![
        RegistryItem::Organisation(Organisation {
            id: ORGANISATION.into(),
            display_name: "Water Agency".into(),
            name: "Water Agency".into(),
            ror: None,
        }),
        RegistryItem::Person(Person {
            id: MODELLER.into(),
            display_name: "Ada Lovelace".into(),
            first_name: "Ada".into(),
            last_name: "Lovelace".into(),
            email: None,
            orcid: None,
        }),
        RegistryItem::Study(Study {
            id: STUDY.into(),
            display_name: "Catchment study".into(),
            description: None,
        }),
        RegistryItem::Model(Model {
            id: MODEL.into(),
            display_name: "Catchment model".into(),
            name: "catchment".into(),
            description: None,
            documentation_url: None,
            source_url: None,
        }),
        RegistryItem::ModelRunWorkflowTemplate(workflow_template()),
        RegistryItem::DatasetTemplate(DatasetTemplate {
            id: INPUT_TEMPLATE.into(),
            display_name: "Forcing inputs".into(),
            description: None,
            defined_resources: vec![],
            deferred_resources: vec![DeferredResource {
                key: "parameters".into(),
                description: "Parameter file".into(),
                usage_type: ResourceUsageType::ParameterFile,
                optional: false,
                is_folder: false,
                additional_metadata: None,
            }],
        }),
        RegistryItem::DatasetTemplate(DatasetTemplate {
            id: OUTPUT_TEMPLATE.into(),
            display_name: "Run outputs".into(),
            description: None,
            defined_resources: vec![],
            deferred_resources: vec![],
        }),
        RegistryItem::Dataset(Dataset {
            id: INPUT_DATASET.into(),
            display_name: "Rainfall 2020".into(),
            description: None,
        }),
        RegistryItem::Dataset(Dataset {
            id: OUTPUT_DATASET.into(),
            display_name: "Streamflow 2020".into(),
            description: None,
        }),
    ]
}

pub fn registry() -> InMemoryRegistry {
    InMemoryRegistry::from_items(items())
}

pub fn record() -> ModelRunRecord {
    let mut resources = BTreeMap::new();
    resources.insert("parameters".to_string(), "inputs/params.csv".to_string());
    ModelRunRecord {
        workflow_template_id: WORKFLOW.into(),
        inputs: vec![TemplatedDataset {
            dataset_template_id: INPUT_TEMPLATE.into(),
            dataset_id: INPUT_DATASET.into(),
            dataset_type: DatasetType::DataStore,
            resources: Some(resources),
        }],
        outputs: vec![TemplatedDataset {
            dataset_template_id: OUTPUT_TEMPLATE.into(),
            dataset_id: OUTPUT_DATASET.into(),
            dataset_type: DatasetType::DataStore,
            resources: None,
        }],
        annotations: None,
        display_name: "Catchment run 1".into(),
        description: "Calibration run".into(),
        study_id: None,
        associations: AssociationInfo {
            modeller_id: MODELLER.into(),
            requesting_organisation_id: Some(ORGANISATION.into()),
        },
        start_time: 1_700_000_000,
        end_time: 1_700_003_600,
    }
}
