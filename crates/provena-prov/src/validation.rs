//! Model run record validation.
//!
//! Checks run in a fixed order and stop at the first failure. Call
//! [`validate_model_run`] to get a [`ValidationOutcome`] or
//! [`validate_or_raise`] to turn a rejection into
//! [`ProvenaError::ValidationError`].

use std::collections::{BTreeMap, BTreeSet};

use provena_types::{
    DatasetTemplate, ItemSubtype, ModelRunRecord, ProvenaError, RegistryItem, Resolution, Result,
    TemplateResource, TemplatedDataset, WorkflowTemplate,
};

use crate::resolver::EntityResolver;

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// A record together with everything resolved while checking it.
#[derive(Debug, Clone)]
pub struct ResolvedModelRun {
    pub record: ModelRunRecord,
    pub workflow_template: WorkflowTemplate,
    pub dataset_templates: BTreeMap<String, DatasetTemplate>,
    /// Registry subtype of every id the record references.
    pub subtypes: BTreeMap<String, ItemSubtype>,
}

#[derive(Debug, Clone)]
pub enum ValidationOutcome {
    Valid(Box<ResolvedModelRun>),
    Invalid { reason: String },
}

impl ValidationOutcome {
    pub fn is_valid(&self) -> bool {
        matches!(self, ValidationOutcome::Valid(_))
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            ValidationOutcome::Valid(_) => None,
            ValidationOutcome::Invalid { reason } => Some(reason),
        }
    }
}

// ---------------------------------------------------------------------------
// Rejection plumbing
// ---------------------------------------------------------------------------

enum Rejection {
    Invalid(String),
    Upstream(ProvenaError),
}

impl From<ProvenaError> for Rejection {
    fn from(err: ProvenaError) -> Self {
        Rejection::Upstream(err)
    }
}

type Check<T> = std::result::Result<T, Rejection>;

fn invalid<T>(reason: impl Into<String>) -> Check<T> {
    Err(Rejection::Invalid(reason.into()))
}

#[derive(Clone, Copy)]
enum Direction {
    Input,
    Output,
}

impl Direction {
    fn as_str(self) -> &'static str {
        match self {
            Direction::Input => "input",
            Direction::Output => "output",
        }
    }
}

/// Resolve `id` and require a complete item of the expected subtype.
async fn require_complete(
    resolver: &dyn EntityResolver,
    field: &str,
    id: &str,
    expected: ItemSubtype,
) -> Check<RegistryItem> {
    match resolver.resolve(id, expected).await? {
        Resolution::Complete(item) => Ok(item),
        Resolution::Seed => invalid(format!(
            "{field} '{id}' is an incomplete seed item; complete it before referencing it"
        )),
        Resolution::NotFound => invalid(format!(
            "{field} '{id}' was not found in the registry (expected {expected})"
        )),
        Resolution::WrongType { actual } => invalid(format!(
            "{field} '{id}' is a {actual} but must be a {expected}"
        )),
    }
}

/// Resolve `id` and require only that an item of the expected subtype exists.
async fn require_exists(
    resolver: &dyn EntityResolver,
    field: &str,
    id: &str,
    expected: ItemSubtype,
) -> Check<()> {
    match resolver.resolve(id, expected).await? {
        Resolution::Complete(_) | Resolution::Seed => Ok(()),
        Resolution::NotFound => invalid(format!(
            "{field} '{id}' was not found in the registry (expected {expected})"
        )),
        Resolution::WrongType { actual } => invalid(format!(
            "{field} '{id}' is a {actual} but must be a {expected}"
        )),
    }
}

fn join(keys: &[&str]) -> String {
    keys.join(", ")
}

// ---------------------------------------------------------------------------
// Checks
// ---------------------------------------------------------------------------

fn check_fields(record: &ModelRunRecord) -> Check<()> {
    if record.end_time < record.start_time {
        return invalid(format!(
            "end_time ({}) is before start_time ({})",
            record.end_time, record.start_time
        ));
    }
    if record.display_name.trim().is_empty() {
        return invalid("display_name must not be empty");
    }
    if record.description.trim().is_empty() {
        return invalid("description must not be empty");
    }
    Ok(())
}

fn check_required_templates(
    direction: Direction,
    declared: &[TemplateResource],
    submitted: &[TemplatedDataset],
) -> Check<()> {
    for template in declared.iter().filter(|t| !t.optional) {
        let provided = submitted
            .iter()
            .any(|d| d.dataset_template_id == template.template_id);
        if !provided {
            return invalid(format!(
                "No {} dataset provided for required dataset template '{}'",
                direction.as_str(),
                template.template_id
            ));
        }
    }
    Ok(())
}

fn check_resources(
    direction: Direction,
    dataset: &TemplatedDataset,
    template: &DatasetTemplate,
) -> Check<()> {
    let provided: BTreeSet<&str> = dataset.resource_keys().collect();
    let valid: BTreeSet<&str> = template.valid_keys().collect();

    let missing: Vec<&str> = template
        .required_keys()
        .filter(|k| !provided.contains(k))
        .collect();
    if !missing.is_empty() {
        return invalid(format!(
            "{} dataset '{}' is missing required deferred resource key(s) [{}] declared by dataset template '{}'",
            direction.as_str(),
            dataset.dataset_id,
            join(&missing),
            template.id
        ));
    }

    let unexpected: Vec<&str> = provided.difference(&valid).copied().collect();
    if !unexpected.is_empty() {
        return invalid(format!(
            "{} dataset '{}' provides resource key(s) [{}] not declared by dataset template '{}'",
            direction.as_str(),
            dataset.dataset_id,
            join(&unexpected),
            template.id
        ));
    }
    Ok(())
}

async fn check_datasets(
    resolver: &dyn EntityResolver,
    direction: Direction,
    declared: &[TemplateResource],
    submitted: &[TemplatedDataset],
    templates: &BTreeMap<String, DatasetTemplate>,
    subtypes: &mut BTreeMap<String, ItemSubtype>,
) -> Check<()> {
    for dataset in submitted {
        let field = format!("{} dataset", direction.as_str());
        require_exists(resolver, &field, &dataset.dataset_id, ItemSubtype::Dataset).await?;
        subtypes.insert(dataset.dataset_id.clone(), ItemSubtype::Dataset);

        let declared_here = declared
            .iter()
            .any(|t| t.template_id == dataset.dataset_template_id);
        let template = match templates.get(&dataset.dataset_template_id) {
            Some(t) if declared_here => t,
            _ => {
                return invalid(format!(
                    "{} dataset '{}' uses dataset template '{}' which the workflow template does not declare as an {}",
                    direction.as_str(),
                    dataset.dataset_id,
                    dataset.dataset_template_id,
                    direction.as_str()
                ));
            }
        };
        check_resources(direction, dataset, template)?;
    }
    Ok(())
}

fn check_annotations(record: &ModelRunRecord, workflow: &WorkflowTemplate) -> Check<()> {
    let required = workflow.required_annotations();
    if required.is_empty() {
        return Ok(());
    }
    let missing: Vec<&str> = required
        .iter()
        .map(String::as_str)
        .filter(|key| {
            !record
                .annotations
                .as_ref()
                .is_some_and(|a| a.contains_key(*key))
        })
        .collect();
    if !missing.is_empty() {
        return invalid(format!(
            "Missing required annotation(s) declared by workflow template '{}': {}",
            workflow.id,
            join(&missing)
        ));
    }
    Ok(())
}

async fn run_checks(
    record: &ModelRunRecord,
    resolver: &dyn EntityResolver,
) -> Check<ResolvedModelRun> {
    let mut subtypes = BTreeMap::new();

    // 1. Plain fields
    check_fields(record)?;

    // 2. Workflow template
    let workflow = match require_complete(
        resolver,
        "workflow_template_id",
        &record.workflow_template_id,
        ItemSubtype::ModelRunWorkflowTemplate,
    )
    .await?
    {
        RegistryItem::ModelRunWorkflowTemplate(t) => t,
        other => {
            return invalid(format!(
                "workflow_template_id '{}' resolved to a {}",
                record.workflow_template_id,
                other.subtype()
            ))
        }
    };
    subtypes.insert(workflow.id.clone(), ItemSubtype::ModelRunWorkflowTemplate);

    // 3. Dataset templates declared by the workflow
    let mut dataset_templates = BTreeMap::new();
    for slot in workflow.all_templates() {
        if dataset_templates.contains_key(&slot.template_id) {
            continue;
        }
        let field = format!("Dataset template on workflow template '{}'", workflow.id);
        match require_complete(resolver, &field, &slot.template_id, ItemSubtype::DatasetTemplate)
            .await?
        {
            RegistryItem::DatasetTemplate(t) => {
                subtypes.insert(t.id.clone(), ItemSubtype::DatasetTemplate);
                dataset_templates.insert(slot.template_id.clone(), t);
            }
            other => {
                return invalid(format!(
                    "Dataset template '{}' resolved to a {}",
                    slot.template_id,
                    other.subtype()
                ))
            }
        }
    }

    // 4. Required template slots are filled
    check_required_templates(Direction::Input, &workflow.input_templates, &record.inputs)?;
    check_required_templates(Direction::Output, &workflow.output_templates, &record.outputs)?;

    // 5. Each submitted dataset exists and matches its template's resources
    check_datasets(
        resolver,
        Direction::Input,
        &workflow.input_templates,
        &record.inputs,
        &dataset_templates,
        &mut subtypes,
    )
    .await?;
    check_datasets(
        resolver,
        Direction::Output,
        &workflow.output_templates,
        &record.outputs,
        &dataset_templates,
        &mut subtypes,
    )
    .await?;

    // 6. Software
    require_complete(
        resolver,
        "Workflow template software_id",
        &workflow.software_id,
        ItemSubtype::Model,
    )
    .await?;
    subtypes.insert(workflow.software_id.clone(), ItemSubtype::Model);

    // 7. Associations
    let modeller = &record.associations.modeller_id;
    require_complete(resolver, "associations.modeller_id", modeller, ItemSubtype::Person).await?;
    subtypes.insert(modeller.clone(), ItemSubtype::Person);

    if let Some(org) = &record.associations.requesting_organisation_id {
        require_complete(
            resolver,
            "associations.requesting_organisation_id",
            org,
            ItemSubtype::Organisation,
        )
        .await?;
        subtypes.insert(org.clone(), ItemSubtype::Organisation);
    }

    if let Some(study) = &record.study_id {
        require_complete(resolver, "study_id", study, ItemSubtype::Study).await?;
        subtypes.insert(study.clone(), ItemSubtype::Study);
    }

    // 8. Annotations
    check_annotations(record, &workflow)?;

    Ok(ResolvedModelRun {
        record: record.clone(),
        workflow_template: workflow,
        dataset_templates,
        subtypes,
    })
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Validate `record` against the registry.
///
/// Only a failing registry call produces `Err`; every rejection is reported
/// as [`ValidationOutcome::Invalid`] with a reason naming the offending id.
pub async fn validate_model_run(
    record: &ModelRunRecord,
    resolver: &dyn EntityResolver,
) -> Result<ValidationOutcome> {
    match run_checks(record, resolver).await {
        Ok(resolved) => Ok(ValidationOutcome::Valid(Box::new(resolved))),
        Err(Rejection::Invalid(reason)) => {
            tracing::info!(reason = %reason, "Model run record rejected");
            Ok(ValidationOutcome::Invalid { reason })
        }
        Err(Rejection::Upstream(err)) => Err(err),
    }
}

/// Validate `record`; return `Err(ValidationError)` if it is rejected.
pub async fn validate_or_raise(
    record: &ModelRunRecord,
    resolver: &dyn EntityResolver,
) -> Result<ResolvedModelRun> {
    match validate_model_run(record, resolver).await? {
        ValidationOutcome::Valid(resolved) => Ok(*resolved),
        ValidationOutcome::Invalid { reason } => Err(ProvenaError::ValidationError(reason)),
    }
}

/// Resolve the ids a record references without enforcing any constraint.
///
/// Used when re-lodging a record that was accepted earlier. Only the
/// workflow template must still resolve; other ids record whatever subtype
/// the registry reports so graph building can detect inconsistencies.
pub async fn resolve_references(
    record: &ModelRunRecord,
    resolver: &dyn EntityResolver,
) -> Result<ResolvedModelRun> {
    let workflow = match resolver
        .resolve(&record.workflow_template_id, ItemSubtype::ModelRunWorkflowTemplate)
        .await?
    {
        Resolution::Complete(RegistryItem::ModelRunWorkflowTemplate(t)) => t,
        other => {
            return Err(ProvenaError::BuildInvariantError(format!(
                "workflow template '{}' no longer resolves ({other:?})",
                record.workflow_template_id
            )))
        }
    };

    let mut subtypes = BTreeMap::new();
    subtypes.insert(workflow.id.clone(), ItemSubtype::ModelRunWorkflowTemplate);

    let mut dataset_templates = BTreeMap::new();
    for slot in workflow.all_templates() {
        if let Resolution::Complete(RegistryItem::DatasetTemplate(t)) = resolver
            .resolve(&slot.template_id, ItemSubtype::DatasetTemplate)
            .await?
        {
            subtypes.insert(t.id.clone(), ItemSubtype::DatasetTemplate);
            dataset_templates.insert(slot.template_id.clone(), t);
        }
    }

    let mut lookups: Vec<(&str, ItemSubtype)> = record
        .all_datasets()
        .map(|d| (d.dataset_id.as_str(), ItemSubtype::Dataset))
        .collect();
    lookups.push((workflow.software_id.as_str(), ItemSubtype::Model));
    lookups.push((record.associations.modeller_id.as_str(), ItemSubtype::Person));
    if let Some(org) = record.associations.requesting_organisation_id.as_deref() {
        lookups.push((org, ItemSubtype::Organisation));
    }
    if let Some(study) = record.study_id.as_deref() {
        lookups.push((study, ItemSubtype::Study));
    }

    for (id, expected) in lookups {
        let found = match resolver.resolve(id, expected).await? {
            Resolution::Complete(item) => Some(item.subtype()),
            Resolution::Seed => Some(expected),
            Resolution::WrongType { actual } => Some(actual),
            Resolution::NotFound => None,
        };
        if let Some(subtype) = found {
            subtypes.insert(id.to_string(), subtype);
        }
    }

    Ok(ResolvedModelRun {
        record: record.clone(),
        workflow_template: workflow,
        dataset_templates,
        subtypes,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
