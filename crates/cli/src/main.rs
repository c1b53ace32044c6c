//! Operator CLI for the application master: submission-time DAG
//! validation and a thin client for the admin HTTP surface the running
//! process exposes.

use am_core::{assign_distances, DagSpec};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "am-cli", version, about = "Application master operator CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Check a DAG spec file for cycles and print each vertex's assigned
    /// distance-from-root, without submitting anything.
    Validate {
        /// Path to a JSON-encoded `DagSpec`.
        file: PathBuf,
    },
    /// Query a running application master's admin surface.
    Status {
        /// Base URL of the admin HTTP surface, e.g. http://localhost:9090
        #[arg(long, default_value = "http://localhost:9090")]
        addr: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Validate { file } => validate(&file)?,
        Commands::Status { addr } => status(&addr).await?,
    }
    Ok(())
}

fn validate(file: &PathBuf) -> Result<()> {
    let raw = std::fs::read_to_string(file).with_context(|| format!("reading {}", file.display()))?;
    let spec: DagSpec = serde_json::from_str(&raw).with_context(|| format!("parsing {} as a DagSpec", file.display()))?;

    let distances = assign_distances(&spec)?;
    println!("dag '{}' is acyclic, {} vertices", spec.name, spec.vertices.len());
    let mut by_vertex: Vec<_> = distances.into_iter().collect();
    by_vertex.sort_by_key(|(id, _)| id.vertex);
    for (id, distance) in by_vertex {
        println!("  vertex {} at distance {distance}", id.vertex);
    }
    Ok(())
}

async fn status(addr: &str) -> Result<()> {
    let client = reqwest::Client::new();

    let health = client.get(format!("{addr}/healthz")).send().await.with_context(|| format!("GET {addr}/healthz"))?;
    println!("healthz: {} ({})", health.status(), health.text().await.unwrap_or_default());

    let metrics = client.get(format!("{addr}/metrics")).send().await.with_context(|| format!("GET {addr}/metrics"))?;
    let body = metrics.text().await.unwrap_or_default();
    println!("metrics: {} lines", body.lines().count());
    Ok(())
}
