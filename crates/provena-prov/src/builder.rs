//! Turns a validated model run into a [`ProvenanceGraph`].

use provena_types::{ItemSubtype, ProvenaError, Result};

use crate::graph::{ProvRelation, ProvenanceGraph};
use crate::validation::ResolvedModelRun;

/// Build the provenance graph for `run`, whose activity node is `record_id`.
///
/// Deterministic for a given input. Any id without a known subtype, or
/// whose subtype does not fit the role it plays, is a
/// [`ProvenaError::BuildInvariantError`]; nothing is returned in that case.
pub fn build_graph(run: &ResolvedModelRun, record_id: &str) -> Result<ProvenanceGraph> {
    let record = &run.record;
    let workflow = &run.workflow_template;
    let mut graph = ProvenanceGraph::new();

    graph.add_node(record_id, ItemSubtype::ModelRun)?;

    // Agents
    let modeller = record.associations.modeller_id.as_str();
    let organisation = record
        .associations
        .requesting_organisation_id
        .as_deref()
        .filter(|org| *org != modeller);

    require(run, modeller, "modeller", ItemSubtype::Person)?;
    graph.add_node(modeller, ItemSubtype::Person)?;
    if let Some(org) = organisation {
        require(run, org, "requesting organisation", ItemSubtype::Organisation)?;
        graph.add_node(org, ItemSubtype::Organisation)?;
    }
    for agent in record.agent_ids() {
        graph.add_edge(record_id, agent, ProvRelation::WasAssociatedWith)?;
    }
    if let Some(org) = organisation {
        graph.add_edge(modeller, org, ProvRelation::ActedOnBehalfOf)?;
    }

    // Datasets
    for input in &record.inputs {
        let id = input.dataset_id.as_str();
        require(run, id, "input dataset", ItemSubtype::Dataset)?;
        graph.add_node(id, ItemSubtype::Dataset)?;
        graph.add_edge(record_id, id, ProvRelation::Used)?;
    }
    for output in &record.outputs {
        let id = output.dataset_id.as_str();
        require(run, id, "output dataset", ItemSubtype::Dataset)?;
        graph.add_node(id, ItemSubtype::Dataset)?;
        graph.add_edge(id, record_id, ProvRelation::WasGeneratedBy)?;
        graph.add_edge(id, modeller, ProvRelation::WasAttributedTo)?;
    }

    // Software and workflow template
    let software = workflow.software_id.as_str();
    require(run, software, "model", ItemSubtype::Model)?;
    graph.add_node(software, ItemSubtype::Model)?;
    graph.add_edge(record_id, software, ProvRelation::Used)?;

    require(
        run,
        &workflow.id,
        "workflow template",
        ItemSubtype::ModelRunWorkflowTemplate,
    )?;
    graph.add_node(&workflow.id, ItemSubtype::ModelRunWorkflowTemplate)?;
    graph.add_edge(record_id, &workflow.id, ProvRelation::Used)?;

    // Study
    if let Some(study) = record.study_id.as_deref() {
        require(run, study, "study", ItemSubtype::Study)?;
        graph.add_node(study, ItemSubtype::Study)?;
        graph.add_edge(record_id, study, ProvRelation::WasInformedBy)?;
    }

    tracing::debug!(
        record_id,
        nodes = graph.node_count(),
        edges = graph.edge_count(),
        "Provenance graph built"
    );
    Ok(graph)
}

fn require(run: &ResolvedModelRun, id: &str, role: &str, expected: ItemSubtype) -> Result<()> {
    match run.subtypes.get(id) {
        Some(actual) if *actual == expected => Ok(()),
        Some(actual) => Err(ProvenaError::BuildInvariantError(format!(
            "{role} '{id}' is registered as {actual}, expected {expected}"
        ))),
        None => Err(ProvenaError::BuildInvariantError(format!(
            "no registry subtype known for {role} '{id}'"
        ))),
    }
}
