// Copyright (C) 2025 Joseph Sacchini
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU Affero General Public License as published by the Free
// Software Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU Affero General Public License for more
// details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

mod config;
mod ingest;

use std::path::PathBuf;

use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use uuid::Uuid;

use cloud_inspect_core::reachability::ReachabilityQuery;
use cloud_inspect_core::store::{InMemoryStore, ResourceStore};
use cloud_inspect_core::{analyze_reachability, build_topology, run_audit, run_tag_compliance, snapshot_diff};
use cloud_inspect_types::{Snapshot, ViewType};

fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    #[cfg(distribute)]
    {
        fmt().json().with_env_filter(filter).init();
    }

    #[cfg(not(distribute))]
    {
        fmt().pretty().with_env_filter(filter).init();
    }
}

#[derive(Debug, Parser)]
#[command(name = env!("CARGO_PKG_NAME"))]
#[command(version = env!("GIT_VERSION"))]
#[command(about = "Offline inspector for cloud infrastructure JSON exports")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Path to the CLI config file
    #[arg(long, global = true, default_value = "/etc/cloud-inspect/config.toml")]
    config: PathBuf,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ViewArg {
    Network,
    Compartment,
    Dependency,
    Exposure,
}

impl From<ViewArg> for ViewType {
    fn from(arg: ViewArg) -> Self {
        match arg {
            ViewArg::Network => ViewType::Network,
            ViewArg::Compartment => ViewType::Compartment,
            ViewArg::Dependency => ViewType::Dependency,
            ViewArg::Exposure => ViewType::Exposure,
        }
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Ingest a directory of exports and run the security audit
    Audit {
        /// Directory containing `*.json` export files
        #[arg(short, long)]
        input: PathBuf,
    },

    /// Ingest a directory of exports and check tag compliance
    Tags {
        /// Directory containing `*.json` export files
        #[arg(short, long)]
        input: PathBuf,

        /// Required tag keys; falls back to the config file's defaults
        #[arg(short, long)]
        tag: Vec<String>,
    },

    /// Ingest a directory of exports and build one topology view
    Topology {
        /// Directory containing `*.json` export files
        #[arg(short, long)]
        input: PathBuf,

        /// Which view to build
        #[arg(short, long, value_enum, default_value_t = ViewArg::Network)]
        view: ViewArg,

        /// Restrict to one compartment and its descendants
        #[arg(long)]
        compartment: Option<String>,
    },

    /// Ingest a directory of exports and analyze reachability between two points
    Reachability {
        /// Directory containing `*.json` export files
        #[arg(short, long)]
        input: PathBuf,

        /// Source IP address
        #[arg(long)]
        source: Option<String>,

        /// Destination IP address, or "internet"
        #[arg(long)]
        destination: Option<String>,

        /// Decimal IP protocol number (6=TCP, 17=UDP, 1=ICMP)
        #[arg(long)]
        protocol: Option<String>,

        /// Destination port
        #[arg(long)]
        port: Option<u16>,
    },

    /// Ingest two directories of exports and diff the resulting snapshots
    Diff {
        /// Directory containing the "before" `*.json` export files
        #[arg(long)]
        input_a: PathBuf,

        /// Directory containing the "after" `*.json` export files
        #[arg(long)]
        input_b: PathBuf,
    },
}

async fn new_snapshot(store: &InMemoryStore, name: &str) -> Result<Uuid, Box<dyn std::error::Error>> {
    let snapshot = Snapshot {
        id: Uuid::new_v4(),
        name: name.to_string(),
        description: None,
        imported_at: Utc::now(),
        owner: "cloud-inspect-cli".to_string(),
    };
    let id = snapshot.id;
    store.create_snapshot(snapshot).await?;
    Ok(id)
}

async fn ingest_and_report(store: &InMemoryStore, snapshot_id: Uuid, dir: &PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let report = ingest::ingest_directory(store, snapshot_id, dir).await?;
    info!(imported = report.imported, errors = report.errors.len(), dir = %dir.display(), "ingestion complete");
    for error in &report.errors {
        error!(source = %error.source, message = %error.message, "ingest file failed");
    }
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()).expect("failed to register SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => {}
            _ = sigterm.recv() => {}
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
    }
}

/// Cancels the returned token when the process receives SIGINT/SIGTERM, so
/// a long-running analysis can unwind cooperatively (§5) instead of being
/// killed mid-walk.
fn cancellation_token() -> CancellationToken {
    let token = CancellationToken::new();
    let watched = token.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        watched.cancel();
    });
    token
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    let cli = Cli::parse();
    let cli_config = config::load(&cli.config).await?;

    let store = InMemoryStore::new();
    let cancel = cancellation_token();

    match cli.command {
        Command::Audit { input } => {
            let snapshot_id = new_snapshot(&store, "audit").await?;
            ingest_and_report(&store, snapshot_id, &input).await?;
            let report = run_audit(&store, snapshot_id, &cancel).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Tags { input, tag } => {
            let snapshot_id = new_snapshot(&store, "tags").await?;
            ingest_and_report(&store, snapshot_id, &input).await?;
            let required = if tag.is_empty() { cli_config.default_required_tags.clone() } else { tag };
            let report = run_tag_compliance(&store, snapshot_id, &required, &cancel).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Topology { input, view, compartment } => {
            let snapshot_id = new_snapshot(&store, "topology").await?;
            ingest_and_report(&store, snapshot_id, &input).await?;
            let result = build_topology(&store, snapshot_id, compartment.as_deref(), view.into(), &cancel).await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Command::Reachability {
            input,
            source,
            destination,
            protocol,
            port,
        } => {
            let snapshot_id = new_snapshot(&store, "reachability").await?;
            ingest_and_report(&store, snapshot_id, &input).await?;
            let query = ReachabilityQuery {
                source_ip: source,
                destination_ip: destination,
                protocol,
                port,
            };
            let result = analyze_reachability(&store, snapshot_id, query, &cancel).await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Command::Diff { input_a, input_b } => {
            let snapshot_a = new_snapshot(&store, "diff-a").await?;
            ingest_and_report(&store, snapshot_a, &input_a).await?;
            let snapshot_b = new_snapshot(&store, "diff-b").await?;
            ingest_and_report(&store, snapshot_b, &input_b).await?;
            let diff = snapshot_diff(&store, snapshot_a, snapshot_b, &cancel).await?;
            println!("{}", serde_json::to_string_pretty(&diff)?);
        }
    }

    Ok(())
}
