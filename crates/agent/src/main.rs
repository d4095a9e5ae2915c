//! Cluster node agent daemon
//!
//! Runs one agent per machine. Bootstraps typed configuration from the
//! fixed positional argument contract, connects the cluster metadata
//! client, constructs the agent process, and blocks on its run loop until
//! a termination signal requests an orderly stop.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use node_agent_lib::{
    assemble, Agent, AgentOptions, MetadataClient, ResourceSet, RuntimeConfig, WorkerCommand,
};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Positional argument contract, order-significant. Anything other than
/// exactly these seven aborts before any configuration work begins.
#[derive(Debug, Parser)]
#[command(name = "node-agent")]
#[command(author, version, about = "Per-node agent for the cluster", long_about = None)]
struct AgentArgs {
    /// Unix socket path the agent listens on
    agent_socket: PathBuf,

    /// Unix socket path of the shared-memory object store
    store_socket: PathBuf,

    /// IP address of this node
    node_ip: String,

    /// Address of the cluster metadata store
    metadata_addr: String,

    /// Port of the cluster metadata store
    metadata_port: u16,

    /// Command line used to launch task workers (space-tokenized)
    worker_command: String,

    /// Static resource listing, alternating name,quantity pairs
    resource_list: String,
}

fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    let args = AgentArgs::parse();
    let runtime_config = RuntimeConfig::load().context("failed to load runtime settings")?;

    let resources =
        ResourceSet::parse(&args.resource_list).context("invalid static resource listing")?;
    info!(resources = %resources, "Starting node agent");

    let worker_command = WorkerCommand::parse(&args.worker_command);
    let (node_config, object_config) = assemble(
        args.store_socket,
        worker_command,
        resources,
        &runtime_config,
    );

    // The agent owns the primary reactor; it is built here because the
    // metadata client connects on it before the agent exists.
    let primary = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to build primary reactor")?;

    let metadata = primary
        .block_on(MetadataClient::connect(
            &args.metadata_addr,
            args.metadata_port,
        ))
        .context("failed to reach the cluster metadata store")?;
    info!(client_id = %metadata.local_client_id(), "Metadata client initialized");

    let options = AgentOptions {
        agent_socket: args.agent_socket,
        node_ip: args.node_ip,
        metadata_addr: args.metadata_addr,
        metadata_port: args.metadata_port,
        status_port: runtime_config.status_port,
    };

    let mut agent = Agent::new(
        primary,
        options,
        node_config,
        object_config,
        Arc::new(metadata),
    )?;
    agent.run()?;

    info!("Node agent stopped");
    Ok(())
}
