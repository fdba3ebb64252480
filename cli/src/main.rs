//! Tripgraph CLI: load geofenced taxi trips into a graph store

use anyhow::Context;
use clap::{Parser, Subcommand};
use comfy_table::{ContentArrangement, Table};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tripgraph::{
    CancellationToken, ConnectionManager, GraphConnector, HttpConnector, LoadReport, MemoryStore,
    Pipeline, PipelineConfig,
};

#[derive(Parser)]
#[command(name = "tripgraph", version, about = "Load geofenced taxi trips into a graph store")]
struct Cli {
    /// YAML configuration file
    #[arg(long, global = true, env = "TRIPGRAPH_CONFIG")]
    config: Option<PathBuf>,

    /// Graph store HTTP address
    #[arg(long, global = true, env = "TRIPGRAPH_STORE_URL")]
    url: Option<String>,

    /// Graph store user
    #[arg(long, global = true, env = "TRIPGRAPH_STORE_USER")]
    user: Option<String>,

    /// Graph store password
    #[arg(long, global = true, env = "TRIPGRAPH_STORE_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Filter a Parquet trip file and bulk-load it
    Load {
        /// Parquet file with trip records
        input: PathBuf,

        /// Store import directory the artifact is written to
        #[arg(long, env = "TRIPGRAPH_STAGING_DIR")]
        staging_dir: Option<PathBuf>,

        /// Load into an in-process store instead of a server (dry run)
        #[arg(long)]
        in_memory: bool,
    },
    /// Check that the graph store accepts queries
    Ping,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    if let Err(e) = run(Cli::parse()).await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = match &cli.config {
        Some(path) => PipelineConfig::from_yaml_file(path)?,
        None => PipelineConfig::default(),
    };
    if let Some(url) = cli.url {
        config.store.address = url;
    }
    if let Some(user) = cli.user {
        config.store.username = user;
    }
    if let Some(password) = cli.password {
        config.store.password = password;
    }

    match cli.command {
        Commands::Load {
            input,
            staging_dir,
            in_memory,
        } => {
            if let Some(dir) = staging_dir {
                config.staging.dir = dir;
            }
            config.validate()?;
            run_load(config, &input, in_memory).await
        }
        Commands::Ping => run_ping(config).await,
    }
}

async fn run_load(config: PipelineConfig, input: &Path, in_memory: bool) -> anyhow::Result<()> {
    let records = tripgraph::reader::read_parquet(input, &config.columns)
        .with_context(|| format!("reading {}", input.display()))?;

    let memory = in_memory.then(|| {
        MemoryStore::new(&config.staging.dir).with_import_uri_base(config.staging.import_uri_base.clone())
    });
    let connector: Arc<dyn GraphConnector> = match &memory {
        Some(store) => Arc::new(store.clone()),
        None => Arc::new(HttpConnector::default()),
    };

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received, cancelling");
            on_interrupt.cancel();
        }
    });

    let pipeline = Pipeline::new(Arc::new(config), connector).with_cancellation(cancel);
    let report = pipeline.run(records).await?;
    print_report(&report);

    if let Some(store) = memory {
        let graph = store.graph().await;
        println!(
            "In-memory graph: {} node(s), {} edge(s)",
            graph.node_count(),
            graph.edge_count()
        );
    }
    Ok(())
}

async fn run_ping(config: PipelineConfig) -> anyhow::Result<()> {
    let manager = ConnectionManager::new(Arc::new(HttpConnector::default()));
    let session = manager.connect(&config.store).await?;
    session.close().await?;
    println!("{} is reachable", config.store.address);
    Ok(())
}

fn print_report(report: &LoadReport) {
    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["metric", "value"]);
    table.add_row(vec!["records accepted".to_string(), report.accepted.to_string()]);
    table.add_row(vec!["records rejected".to_string(), report.rejected.to_string()]);
    table.add_row(vec!["TRIP edges loaded".to_string(), report.edges_loaded.to_string()]);
    table.add_row(vec!["Location nodes created".to_string(), report.nodes_created.to_string()]);
    table.add_row(vec!["connection attempts".to_string(), report.attempts.to_string()]);
    table.add_row(vec![
        "staging artifact".to_string(),
        report.staging_path.display().to_string(),
    ]);
    println!("{}", table);
}
