//! Provena provenance API server.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use provena_api::{router, AppState};
use provena_backends::Backends;
use provena_prov::{FileJobStore, JobQueue, ProvConfig};

#[derive(Parser)]
#[command(name = "provena-api", version, about = "Model run registration and lineage API")]
struct Args {
    /// TOML configuration file
    #[arg(short, long, env = "PROVENA_CONFIG")]
    config: Option<PathBuf>,

    /// Address to listen on (overrides server.listen_addr)
    #[arg(short, long)]
    listen: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let mut config = ProvConfig::load(args.config.as_deref())?;
    if let Some(listen) = args.listen {
        config.server.listen_addr = listen;
    }

    let backends = Backends::from_config(&config).await?;
    let orchestrator = backends.orchestrator();
    let store = Arc::new(FileJobStore::new(&config.jobs.root));
    let (jobs, _worker) =
        JobQueue::start(orchestrator.clone(), store, config.jobs.queue_capacity).await?;

    let state = AppState {
        orchestrator,
        lineage: backends.lineage(&config.lineage),
        jobs,
    };
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&config.server.listen_addr).await?;
    tracing::info!("listening on http://{}", config.server.listen_addr);
    axum::serve(listener, app).await?;
    Ok(())
}
