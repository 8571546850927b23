//! CLI binary for validating, registering and exploring model run provenance.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand, ValueEnum};

use provena_backends::Backends;
use provena_prov::{
    build_graph, validate_model_run, FileJobStore, JobStore, ProvConfig, ValidationOutcome,
};
use provena_types::{JobRecord, LineageGraph, ModelRunRecord};

#[derive(Parser)]
#[command(name = "provena", version, about = "Model run provenance tooling")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// TOML configuration file
    #[arg(short, long, global = true, env = "PROVENA_CONFIG")]
    config: Option<PathBuf>,

    /// JSON array of registry items to resolve against (in-memory registry)
    #[arg(long, global = true)]
    fixture: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a model run record against the registry
    Validate {
        /// Path to the model run record JSON
        record: PathBuf,
    },

    /// Validate a record and print its PROV-JSON document
    Build {
        /// Path to the model run record JSON
        record: PathBuf,

        /// Identifier to give the model run activity
        #[arg(long, default_value = "draft")]
        record_id: String,
    },

    /// Register one or more model run records
    Register {
        /// Paths to model run record JSON files
        #[arg(required = true)]
        records: Vec<PathBuf>,
    },

    /// Query lineage around an item
    Explore {
        #[arg(value_enum)]
        query: ExploreQuery,

        /// Identifier of the item to start from
        #[arg(long)]
        starting_id: String,

        /// Maximum number of hops
        #[arg(long, default_value = "1")]
        depth: i64,

        /// Records to register first (useful with the in-memory graph)
        #[arg(long)]
        preload: Vec<PathBuf>,
    },

    /// Show queued job records
    Job {
        /// Job id; all jobs are listed when omitted
        id: Option<String>,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ExploreQuery {
    Upstream,
    Downstream,
    ContributingDatasets,
    EffectedDatasets,
    ContributingAgents,
    EffectedAgents,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let mut config = ProvConfig::load(cli.config.as_deref())?;
    if let Some(fixture) = cli.fixture {
        config.registry.fixture = Some(fixture);
    }

    match cli.command {
        Commands::Validate { record } => cmd_validate(&config, &record).await?,
        Commands::Build { record, record_id } => cmd_build(&config, &record, &record_id).await?,
        Commands::Register { records } => cmd_register(&config, &records).await?,
        Commands::Explore {
            query,
            starting_id,
            depth,
            preload,
        } => cmd_explore(&config, query, &starting_id, depth, &preload).await?,
        Commands::Job { id } => cmd_job(&config, id.as_deref()).await?,
    }

    Ok(())
}

fn load_record(path: &Path) -> anyhow::Result<ModelRunRecord> {
    let source = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("cannot read {}: {e}", path.display()))?;
    Ok(serde_json::from_str(&source)?)
}

async fn cmd_validate(config: &ProvConfig, path: &Path) -> anyhow::Result<()> {
    let record = load_record(path)?;
    let backends = Backends::from_config(config).await?;

    match validate_model_run(&record, backends.resolver.as_ref()).await? {
        ValidationOutcome::Valid(_) => {
            println!("Model run record is valid");
            Ok(())
        }
        ValidationOutcome::Invalid { reason } => {
            println!("[ERROR] {reason}");
            std::process::exit(1);
        }
    }
}

async fn cmd_build(config: &ProvConfig, path: &Path, record_id: &str) -> anyhow::Result<()> {
    let record = load_record(path)?;
    let backends = Backends::from_config(config).await?;

    let resolved = match validate_model_run(&record, backends.resolver.as_ref()).await? {
        ValidationOutcome::Valid(resolved) => resolved,
        ValidationOutcome::Invalid { reason } => anyhow::bail!("record is invalid: {reason}"),
    };
    let graph = build_graph(&resolved, record_id)?;
    eprintln!(
        "Nodes: {}  Edges: {}",
        graph.node_count(),
        graph.edge_count()
    );
    println!("{}", graph.to_prov_json_string()?);
    Ok(())
}

async fn cmd_register(config: &ProvConfig, paths: &[PathBuf]) -> anyhow::Result<()> {
    let backends = Backends::from_config(config).await?;
    let orchestrator = backends.orchestrator();

    for path in paths {
        let record = load_record(path)?;
        let outcome = orchestrator.register(record).await?;
        println!(
            "{} -> {} ({} nodes, {} edges)",
            path.display(),
            outcome.record_id,
            outcome.nodes,
            outcome.edges
        );
    }
    Ok(())
}

async fn cmd_explore(
    config: &ProvConfig,
    query: ExploreQuery,
    starting_id: &str,
    depth: i64,
    preload: &[PathBuf],
) -> anyhow::Result<()> {
    let backends = Backends::from_config(config).await?;

    if !preload.is_empty() {
        let orchestrator = backends.orchestrator();
        for path in preload {
            let outcome = orchestrator.register(load_record(path)?).await?;
            eprintln!("Preloaded {} as {}", path.display(), outcome.record_id);
        }
    }

    let lineage = backends.lineage(&config.lineage);
    let graph = match query {
        ExploreQuery::Upstream => lineage.upstream(starting_id, depth).await?,
        ExploreQuery::Downstream => lineage.downstream(starting_id, depth).await?,
        ExploreQuery::ContributingDatasets => {
            lineage.upstream_datasets(starting_id, depth).await?
        }
        ExploreQuery::EffectedDatasets => lineage.downstream_datasets(starting_id, depth).await?,
        ExploreQuery::ContributingAgents => lineage.upstream_agents(starting_id, depth).await?,
        ExploreQuery::EffectedAgents => lineage.downstream_agents(starting_id, depth).await?,
    };
    print_lineage(&graph);
    println!("{}", serde_json::to_string_pretty(&graph)?);
    Ok(())
}

fn print_lineage(graph: &LineageGraph) {
    eprintln!("Nodes: {}", graph.nodes.len());
    for node in &graph.nodes {
        eprintln!("  {} [{}/{}]", node.id, node.item_category, node.item_subtype);
    }
    eprintln!("Links: {}", graph.links.len());
    for link in &graph.links {
        eprintln!("  {} -{}-> {}", link.source, link.relation, link.target);
    }
}

async fn cmd_job(config: &ProvConfig, id: Option<&str>) -> anyhow::Result<()> {
    let store = FileJobStore::new(&config.jobs.root);
    match id {
        Some(id) => match store.get(id).await? {
            Some(job) => println!("{}", serde_json::to_string_pretty(&job)?),
            None => anyhow::bail!("job '{id}' not found under {}", config.jobs.root.display()),
        },
        None => {
            let jobs = store.list().await?;
            if jobs.is_empty() {
                println!("No jobs under {}", config.jobs.root.display());
            }
            for job in &jobs {
                print_job_line(job);
            }
        }
    }
    Ok(())
}

fn print_job_line(job: &JobRecord) {
    let updated = chrono::DateTime::from_timestamp(job.updated_timestamp, 0)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_default();
    let stage = job
        .stage
        .map(|s| format!("{s:?}"))
        .unwrap_or_else(|| "-".into());
    println!(
        "{}  {:?}  {:?}  {}  {}",
        job.id, job.kind, job.status, stage, updated
    );
    if let Some(info) = &job.info {
        println!("    {info}");
    }
}
