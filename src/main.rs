//! archintel CLI - ingest repositories, serve the API, ask questions

use archintel::config::{self, Config};
use archintel::pipeline::{Orchestrator, ProjectStatus};
use archintel::query::AskOutcome;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "archintel")]
#[command(version)]
#[command(about = "Repository architecture intelligence - structural graphs, grounded docs and answers")]
#[command(long_about = r#"
archintel fetches a repository, builds a structural graph of its files,
symbols and relationships, and answers questions grounded in that graph.

Example usage:
  archintel init
  archintel ingest https://github.com/owner/repo
  archintel ask <project-id> "How are requests authenticated?"
  archintel serve --port 8080
"#)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to the config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Override the database path from the config
    #[arg(short, long, global = true)]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "8080")]
        port: u16,
    },

    /// Register a repository, run the pipeline once and wait for it
    Ingest {
        /// Repository location (https, ssh, git or scp-style)
        location: String,

        /// Environment variable holding an access token for the fetch
        #[arg(long)]
        credential_env: Option<String>,

        /// Give up waiting after this many seconds
        #[arg(long, default_value = "3600")]
        wait_secs: u64,
    },

    /// Show pipeline status for one project, or list all projects
    Status {
        project: Option<Uuid>,
    },

    /// Ask a question about a project's published graph
    Ask {
        project: Uuid,
        question: String,
    },

    /// Write a config file with the default settings
    Init {
        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },
}

fn load(cli: &Cli) -> anyhow::Result<Config> {
    let mut config = config::load_config(cli.config.as_deref())?;
    if let Some(db) = &cli.database {
        config.storage.database = db.clone();
    }
    Ok(config)
}

fn open(cli: &Cli) -> anyhow::Result<Orchestrator> {
    Ok(Orchestrator::from_config(&load(cli)?)?)
}

fn print_status(status: &ProjectStatus) {
    println!("Project:   {}", status.project_id);
    println!("Location:  {}", status.source_location);
    println!("State:     {}", status.state);
    match status.last_graph_version {
        Some(v) => println!("Version:   {v}"),
        None => println!("Version:   (none published)"),
    }
    if let Some(run) = status.run_id {
        println!("Run:       {run}");
    }
    if let Some(err) = &status.last_error {
        println!("Error:     {err}");
    }
    if let Some(warning) = &status.warning {
        println!("Warning:   {warning}");
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    match &cli.command {
        Commands::Init { force } => {
            let path = cli.config.clone().unwrap_or_else(config::default_config_path);
            config::write_config(&path, &Config::default(), *force)?;
            println!("Wrote default config to {}", path.display());
        }

        Commands::Serve { port } => {
            archintel::server::start_server(*port, open(&cli)?).await?;
        }

        Commands::Ingest { location, credential_env, wait_secs } => {
            let orchestrator = open(&cli)?;
            let credential = match credential_env {
                Some(var) => Some(std::env::var(var).map_err(|_| anyhow::anyhow!("environment variable {var} is not set"))?),
                None => None,
            };

            let project = orchestrator.register_project(location, credential)?;
            println!("Registered project {}", project.id);

            let outcome = orchestrator.start_pipeline(project.id)?;
            tracing::info!(run = %outcome.run_id(), "waiting for run");
            let status = orchestrator.wait_for_run(project.id, Duration::from_secs(*wait_secs)).await?;
            print_status(&status);

            if let Ok(structure) = orchestrator.get_structure(project.id) {
                println!("Files:     {}", structure.files.len());
                println!("Symbols:   {}", structure.symbol_count());
            }
            if status.last_error.is_some() {
                anyhow::bail!("ingestion failed");
            }
        }

        Commands::Status { project: Some(id) } => {
            print_status(&open(&cli)?.get_status(*id)?);
        }

        Commands::Status { project: None } => {
            let projects = open(&cli)?.list_projects()?;
            if projects.is_empty() {
                println!("No projects registered.");
            }
            for p in projects {
                let version = p.current_version.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string());
                println!("{}  {:<12} v{:<4} {}", p.id, p.state.as_str(), version, p.source_location);
            }
        }

        Commands::Ask { project, question } => match open(&cli)?.ask(*project, question).await? {
            AskOutcome::Answered(answer) => {
                println!("{}\n", answer.answer_text.trim_end());
                println!("Sources (graph version {}):", answer.version);
                for c in &answer.citations {
                    println!("  [{}] {} {} ({}:{}-{})", c.index, c.kind, c.qualified_name, c.path, c.start_line, c.end_line);
                }
            }
            AskOutcome::NoContext { version } => {
                println!("No symbols in graph version {version} are relevant to that question.");
            }
        },
    }

    Ok(())
}
