// Copyright 2025 AgentReplay (https://github.com/agentreplay)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Medgraph CLI
//!
//! Builds community snapshots from an entity graph and routes queries
//! against them.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use medgraph_core::{EntityGraph, Linkage, MedgraphConfig};
use medgraph_index::{load_summaries, write_json_atomic, CommunityPipeline, CommunityStore};
use medgraph_query::{QueryMode, QueryRouter};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::info;

const STORE_FILE: &str = "community_store.json";
const ASSIGNMENTS_FILE: &str = "community_assignments.json";
const STATS_FILE: &str = "community_stats.json";
const SUMMARIES_FILE: &str = "community_summaries.json";

#[derive(Parser)]
#[command(name = "medgraph")]
#[command(about = "Medgraph - community detection and query routing over medical knowledge graphs", long_about = None)]
struct Cli {
    /// Configuration file (TOML)
    #[arg(short, long, env = "MEDGRAPH_CONFIG")]
    config: Option<PathBuf>,

    /// Verbose mode
    #[arg(short, long)]
    verbose: bool,

    /// Output as JSON (machine-readable)
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Detect communities and write the snapshot files
    Build {
        /// Entity graph JSON ({"nodes": [...], "edges": [...]})
        #[arg(long)]
        graph: PathBuf,

        /// Output directory
        #[arg(short, long, default_value = "./medgraph-data")]
        out_dir: PathBuf,

        /// Number of communities to cut at
        #[arg(long)]
        target_count: Option<usize>,

        /// Maximum merge distance (0.0 - 1.0]
        #[arg(long)]
        distance_threshold: Option<f64>,

        /// Linkage rule: average, complete or single
        #[arg(long)]
        linkage: Option<Linkage>,

        /// Specialty taxonomy JSON
        #[arg(long)]
        taxonomy: Option<PathBuf>,
    },

    /// Attach titles and summaries to an existing snapshot
    AttachSummaries {
        /// Snapshot directory
        #[arg(short, long, default_value = "./medgraph-data")]
        out_dir: PathBuf,

        /// JSON object keyed by community id: {"0": {"title": ..., "summary": ...}}
        #[arg(long)]
        summaries: PathBuf,
    },

    /// Select context for a question
    Query {
        /// Question text
        text: String,

        /// Entity graph JSON the snapshot was built from
        #[arg(long)]
        graph: PathBuf,

        /// Snapshot directory
        #[arg(short, long, default_value = "./medgraph-data")]
        out_dir: PathBuf,

        /// Force local or global retrieval
        #[arg(long)]
        mode: Option<QueryMode>,
    },

    /// Show snapshot statistics
    Stats {
        /// Snapshot directory
        #[arg(short, long, default_value = "./medgraph-data")]
        out_dir: PathBuf,

        /// Also report statistics for this entity graph
        #[arg(long)]
        graph: Option<PathBuf>,
    },
}

#[derive(Serialize)]
struct BuildReport<'a> {
    out_dir: &'a Path,
    entities: usize,
    communities: usize,
    silhouette_score: Option<f64>,
    auto_selected_count: Option<usize>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_level.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut config = MedgraphConfig::load(cli.config.clone()).context("Failed to load configuration")?;

    match cli.command {
        Commands::Build {
            graph,
            out_dir,
            target_count,
            distance_threshold,
            linkage,
            taxonomy,
        } => {
            if target_count.is_some() || distance_threshold.is_some() {
                config.clustering.target_count = target_count;
                config.clustering.distance_threshold = distance_threshold;
            }
            if let Some(linkage) = linkage {
                config.clustering.linkage = linkage;
            }
            if taxonomy.is_some() {
                config.specialty.taxonomy_path = taxonomy;
            }
            config.validate().context("Invalid configuration")?;

            let graph = load_graph(&graph)?;
            let pipeline = CommunityPipeline::from_config(config).context("Failed to create pipeline")?;
            let store = pipeline.build(&graph).context("Community build failed")?;
            write_snapshot(&store, &out_dir)?;

            let report = BuildReport {
                out_dir: &out_dir,
                entities: store.entity_count(),
                communities: store.community_count(),
                silhouette_score: store.silhouette(),
                auto_selected_count: store.cut().auto_selected_count,
            };
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("Built {} communities over {} entities", report.communities, report.entities);
                match report.silhouette_score {
                    Some(score) => println!("  Silhouette score: {:.4}", score),
                    None => println!("  Silhouette score: undefined"),
                }
                println!("  Output: {}", out_dir.display());
            }
        }

        Commands::AttachSummaries { out_dir, summaries } => {
            let store = load_store(&out_dir)?;
            let summaries = load_summaries(&summaries)
                .with_context(|| format!("Failed to read summaries from {:?}", summaries))?;
            let count = summaries.len();
            let store = store.with_summaries(summaries);
            write_snapshot(&store, &out_dir)?;
            info!(count, "Summaries attached");
            if cli.json {
                println!("{}", serde_json::json!({ "attached": count }));
            } else {
                println!("Attached {} summaries in {}", count, out_dir.display());
            }
        }

        Commands::Query {
            text,
            graph,
            out_dir,
            mode,
        } => {
            let graph = load_graph(&graph)?;
            let store = load_store(&out_dir)?;
            let router = QueryRouter::new(config.router.clone());

            let package = match mode {
                Some(mode) => router.route_with_mode(&text, mode, &store, &graph),
                None => router.route(&text, &store, &graph),
            }
            .with_context(|| format!("Query failed: {}", text))?;

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&package)?);
            } else {
                println!("Mode: {}{}", package.mode, if package.forced { " (forced)" } else { "" });
                if !package.matches.is_empty() {
                    let names: Vec<&str> = package.matches.iter().map(|m| m.name.as_str()).collect();
                    println!("Matched entities: {}", names.join(", "));
                }
                println!();
                print!("{}", package.render());
            }
        }

        Commands::Stats { out_dir, graph } => {
            let store = load_store(&out_dir)?;
            let graph_stats = match graph {
                Some(path) => Some(load_graph(&path)?.stats()),
                None => None,
            };

            if cli.json {
                let value = serde_json::json!({
                    "snapshot": store.stats_document(),
                    "graph": graph_stats,
                });
                println!("{}", serde_json::to_string_pretty(&value)?);
                return Ok(());
            }

            println!("Medgraph Statistics");
            println!("===================");
            println!();
            println!("Snapshot:");
            println!("  Built at: {}", store.built_at().to_rfc3339());
            println!("  Entities: {}", store.entity_count());
            println!("  Communities: {}", store.community_count());
            println!("  Linkage: {}", store.cut().linkage);
            match store.silhouette() {
                Some(score) => println!("  Silhouette score: {:.4}", score),
                None => println!("  Silhouette score: undefined"),
            }
            println!();
            println!("Communities:");
            for community in store.communities() {
                println!(
                    "  {:>3}. {} ({} entities, dominant {}, density {:.2})",
                    community.id,
                    community.title.as_deref().unwrap_or(&community.specialty),
                    community.size,
                    community.dominant_type,
                    community.density
                );
                if !community.theme.is_empty() {
                    println!("       Theme: {}", community.theme.join(", "));
                }
            }

            if let Some(stats) = graph_stats {
                println!();
                println!("Graph:");
                println!("  Entities: {} ({} with context)", stats.entity_count, stats.entities_with_context);
                println!("  Relationships: {}", stats.relationship_count);
                println!("  Average degree: {:.2}", stats.avg_degree);
                for (entity_type, count) in &stats.entity_type_distribution {
                    println!("  {}: {}", entity_type, count);
                }
            }
        }
    }

    Ok(())
}

fn load_graph(path: &Path) -> Result<EntityGraph> {
    let graph = EntityGraph::load_json(path)
        .with_context(|| format!("Failed to load entity graph from {:?}", path))?;
    info!(
        entities = graph.len(),
        relationships = graph.relationships().len(),
        "Loaded entity graph"
    );
    Ok(graph)
}

fn load_store(dir: &Path) -> Result<CommunityStore> {
    let path = dir.join(STORE_FILE);
    CommunityStore::load_json(&path).with_context(|| format!("Failed to load snapshot from {:?}", path))
}

/// Write the snapshot and its three export documents
fn write_snapshot(store: &CommunityStore, dir: &Path) -> Result<()> {
    store
        .save_json(dir.join(STORE_FILE))
        .with_context(|| format!("Failed to write {}", STORE_FILE))?;
    write_json_atomic(&dir.join(ASSIGNMENTS_FILE), &store.assignments())
        .with_context(|| format!("Failed to write {}", ASSIGNMENTS_FILE))?;
    write_json_atomic(&dir.join(STATS_FILE), &store.stats_document())
        .with_context(|| format!("Failed to write {}", STATS_FILE))?;
    write_json_atomic(&dir.join(SUMMARIES_FILE), &store.summaries_document())
        .with_context(|| format!("Failed to write {}", SUMMARIES_FILE))?;
    info!(dir = ?dir, "Wrote community snapshot");
    Ok(())
}
