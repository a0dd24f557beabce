//! Graphloom CLI - source-tree analysis into a graph engine.
//!
//! Usage:
//!   graphloom analyze [PATHS..] --calls --out graph.json   # Analyze to JSON
//!   graphloom analyze src --raw                            # Per-file results
//!   graphloom ingest [PATHS..] --mode stream               # Analyze + ingest
//!   graphloom query "MATCH (f:function) RETURN f.name"     # Query the engine
//!   graphloom handshake                                    # Check the engine

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use graphloom::{
    analyze_files, collect_source_files, to_graph, AnalysisOptions, GraphloomConfig, IngestClient,
    IngestMode, IngestSettings, ProjectHierarchy, TransformOptions,
};
use std::fs;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "graphloom")]
#[command(about = "Graphloom - analyze source trees into a graph engine", long_about = None)]
struct Cli {
    /// Project root directory (default: current directory)
    #[arg(short, long, default_value = ".")]
    root: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze files and print the graph as JSON
    Analyze {
        #[command(flatten)]
        analysis: AnalysisArgs,

        /// Write JSON here instead of stdout
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Emit per-file analysis results instead of the graph
        #[arg(long)]
        raw: bool,
    },

    /// Analyze files and ingest the graph into the engine
    Ingest {
        #[command(flatten)]
        analysis: AnalysisArgs,

        #[command(flatten)]
        engine: EngineArgs,

        /// Transfer mode: auto, file, stream or bulk
        #[arg(short, long)]
        mode: Option<IngestMode>,

        /// Entities or relationships per stream/bulk batch
        #[arg(long)]
        batch_size: Option<usize>,
    },

    /// Run a query against the engine
    Query {
        /// Query text, passed to the engine verbatim
        cypher: String,

        #[command(flatten)]
        engine: EngineArgs,
    },

    /// Check that the engine is installed and ready
    Handshake {
        #[command(flatten)]
        engine: EngineArgs,
    },
}

#[derive(Args)]
struct AnalysisArgs {
    /// Files or directories (default: the project root)
    paths: Vec<PathBuf>,

    /// Collect call expressions
    #[arg(long)]
    calls: bool,

    /// Collect type information
    #[arg(long)]
    types: bool,

    /// Lines of context to attach around each entity
    #[arg(long)]
    context: Option<usize>,

    /// Emit dependency nodes from the project hierarchy
    #[arg(long)]
    include_deps: bool,

    /// Project hierarchy JSON (applications, packages, dependencies)
    #[arg(long)]
    hierarchy: Option<PathBuf>,
}

#[derive(Args)]
struct EngineArgs {
    /// Database path (overrides config and GRAPHLOOM_DB_PATH)
    #[arg(long)]
    db: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    // Logs go to stderr; stdout carries JSON output
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let root = cli.root.canonicalize().unwrap_or(cli.root);
    let config = GraphloomConfig::load(&root);

    match cli.command {
        Commands::Analyze { analysis, out, raw } => {
            let options = analysis_options(&config, &analysis);
            let files = expand_paths(&root, &analysis.paths);
            let results = analyze_files(&files, &options);
            let json = if raw {
                serde_json::to_string_pretty(&results)?
            } else {
                let hierarchy = load_hierarchy(analysis.hierarchy.as_deref())?;
                let data = to_graph(&results, hierarchy.as_ref(), &transform_options(&root, &options));
                eprint!("{}", data.summary());
                serde_json::to_string_pretty(&data)?
            };
            match out {
                Some(path) => {
                    fs::write(&path, json)
                        .with_context(|| format!("failed to write {}", path.display()))?;
                    info!(out = %path.display(), "analysis written");
                }
                None => println!("{}", json),
            }
        }

        Commands::Ingest {
            analysis,
            engine,
            mode,
            batch_size,
        } => {
            let options = analysis_options(&config, &analysis);
            let files = expand_paths(&root, &analysis.paths);
            let results = analyze_files(&files, &options);
            let hierarchy = load_hierarchy(analysis.hierarchy.as_deref())?;
            let data = to_graph(&results, hierarchy.as_ref(), &transform_options(&root, &options));
            eprint!("{}", data.summary());

            let mut settings = engine_settings(&config, &root, &engine)?;
            if let Some(batch_size) = batch_size {
                settings = settings.with_batch_size(batch_size);
            }
            let mut client = IngestClient::new(settings);
            client.initialize().await?;
            let stats = client
                .ingest(&data, mode.unwrap_or(config.ingest.mode))
                .await?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }

        Commands::Query { cypher, engine } => {
            let mut client = IngestClient::new(engine_settings(&config, &root, &engine)?);
            client.initialize().await?;
            let rows = client.query(&cypher).await?;
            println!("{}", serde_json::to_string_pretty(&rows)?);
        }

        Commands::Handshake { engine } => {
            let mut client = IngestClient::new(engine_settings(&config, &root, &engine)?);
            let ack = client.initialize().await?;
            println!(
                "engine ready (version {}, capabilities: {})",
                ack.version.as_deref().unwrap_or("unknown"),
                if ack.capabilities.is_empty() {
                    "none".to_string()
                } else {
                    ack.capabilities.join(", ")
                }
            );
        }
    }

    Ok(())
}

/// Config values, with any CLI flag taking precedence.
fn analysis_options(config: &GraphloomConfig, args: &AnalysisArgs) -> AnalysisOptions {
    let base = config.analysis.options();
    AnalysisOptions {
        calls: args.calls || base.calls,
        types: args.types || base.types,
        context: args.context.or(base.context),
        include_deps: args.include_deps || base.include_deps,
    }
}

fn transform_options(root: &Path, options: &AnalysisOptions) -> TransformOptions {
    TransformOptions {
        root: Some(root.to_path_buf()),
        include_deps: options.include_deps,
    }
}

/// Directories expand to every file under them; the root is used when no
/// paths are given.
fn expand_paths(root: &Path, paths: &[PathBuf]) -> Vec<PathBuf> {
    if paths.is_empty() {
        return collect_source_files(root);
    }
    let mut files = Vec::new();
    for path in paths {
        let path = if path.is_absolute() {
            path.clone()
        } else {
            root.join(path)
        };
        if path.is_dir() {
            files.extend(collect_source_files(&path));
        } else {
            files.push(path);
        }
    }
    files
}

fn load_hierarchy(path: Option<&Path>) -> Result<Option<ProjectHierarchy>> {
    path.map(|p| {
        ProjectHierarchy::load(p).with_context(|| format!("failed to load hierarchy {}", p.display()))
    })
    .transpose()
}

fn engine_settings(config: &GraphloomConfig, root: &Path, args: &EngineArgs) -> Result<IngestSettings> {
    let mut settings = config.ingest_settings(root)?;
    if let Some(db) = &args.db {
        settings.db_path = db.clone();
    }

    let token = CancellationToken::new();
    let on_signal = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling");
            on_signal.cancel();
        }
    });
    Ok(settings.with_cancellation(token))
}
