//! Workshop CLI
//!
//! The `workshop` command runs requests through the standard workshop roster.
//!
//! ## Commands
//!
//! - `process`: run one request and print the final record as JSON
//! - `graph`: print the delegation graph edges
//! - `roles`: list roles with their tools and delegation targets

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, Level};
use workshop_core::workshop;
use workshop_core::{CapabilityRegistry, EngineConfig, WorkflowEngine, METRICS};

#[derive(Parser)]
#[command(name = "workshop")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Role-delegation workflow engine", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Engine configuration file (TOML)
    #[arg(long, global = true, env = "WORKSHOP_CONFIG")]
    config: Option<PathBuf>,

    /// Whole-workflow deadline in milliseconds
    #[arg(long, global = true)]
    deadline_ms: Option<u64>,

    /// Rework cycles allowed before a workflow fails
    #[arg(long, global = true)]
    max_rework_cycles: Option<u32>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one request through the workshop
    Process {
        /// Request text
        #[arg(required_unless_present = "file", conflicts_with = "file")]
        text: Option<String>,

        /// Read the request text from a file
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Where the response should be delivered
        #[arg(short, long)]
        contact: Option<String>,

        /// Write the final record here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print the delegation graph edges
    Graph,

    /// List roles with their tools and delegation targets
    Roles,
}

/// Defaults, then the TOML file, then `WORKSHOP_*` variables, then flags.
fn load_config(cli: &Cli) -> Result<EngineConfig> {
    let mut config = match &cli.config {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => EngineConfig::default(),
    }
    .apply_env()
    .context("Invalid WORKSHOP_* environment override")?;

    if let Some(ms) = cli.deadline_ms {
        config.deadline_ms = ms;
    }
    if let Some(n) = cli.max_rework_cycles {
        config.max_rework_cycles = n;
    }
    config.validate().context("Invalid engine configuration")?;
    Ok(config)
}

fn build_engine(config: EngineConfig) -> Result<WorkflowEngine> {
    workshop::standard_engine(CapabilityRegistry::new())
        .config(config)
        .build()
        .context("Failed to build the standard workshop")
}

fn read_request(text: Option<String>, file: Option<&Path>) -> Result<String> {
    let request = match (text, file) {
        (Some(text), _) => text,
        (None, Some(path)) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read request from {}", path.display()))?,
        (None, None) => bail!("Provide the request text or --file"),
    };
    if request.trim().is_empty() {
        bail!("Request is empty");
    }
    Ok(request)
}

async fn cmd_process(
    engine: &WorkflowEngine,
    request: &str,
    contact: Option<&str>,
    output: Option<&Path>,
) -> Result<()> {
    let record = engine.process(request, contact).await;
    info!(
        workflow_id = %record.workflow_id,
        status = %record.status,
        "workflow finished"
    );

    let json = serde_json::to_string_pretty(&record).context("Failed to serialize record")?;
    match output {
        Some(path) => {
            std::fs::write(path, json)
                .with_context(|| format!("Failed to write record to {}", path.display()))?;
            println!("{}", record.summary());
            println!("Record written to {}", path.display());
        }
        None => println!("{json}"),
    }
    Ok(())
}

fn cmd_graph(engine: &WorkflowEngine) {
    let graph = engine.graph();
    println!("entry: {}", graph.entry());
    for (from, to) in graph.edges() {
        println!("{from} -> {to}");
    }
}

fn cmd_roles(engine: &WorkflowEngine) {
    for role in engine.graph().roles() {
        println!("{}", role.id);
        if !role.description.is_empty() {
            println!("    {}", role.description);
        }
        let tools: Vec<_> = role.tools.iter().map(String::as_str).collect();
        println!("    tools: {}", tools.join(", "));
        if !role.delegates_to.is_empty() {
            let targets: Vec<_> = role.delegates_to.iter().map(|t| t.as_str()).collect();
            println!("    delegates to: {}", targets.join(", "));
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Settings may come from a .env file next to the working directory.
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    workshop_core::init_tracing(cli.json, level);

    let config = load_config(&cli)?;
    let engine = build_engine(config)?;

    let result = match cli.command {
        Commands::Process {
            text,
            file,
            contact,
            output,
        } => {
            let request = read_request(text, file.as_deref())?;
            cmd_process(&engine, &request, contact.as_deref(), output.as_deref()).await
        }
        Commands::Graph => {
            cmd_graph(&engine);
            Ok(())
        }
        Commands::Roles => {
            cmd_roles(&engine);
            Ok(())
        }
    };
    METRICS.flush();
    result
}
