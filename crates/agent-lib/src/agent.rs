//! Agent process lifecycle
//!
//! One `Agent` per OS process. It owns the primary reactor (control plane:
//! heartbeats, signal handling, status endpoint) and a second reactor
//! dedicated to object-transfer I/O, plus the node manager and object
//! manager constructed against their assembled configurations. `run` blocks
//! the calling thread until a stop is requested; teardown is destructor
//! driven, in reverse construction order.

use std::path::PathBuf;

use anyhow::{Context, Result};
use tokio::runtime::Runtime;
use tracing::info;

use crate::api::{self, StatusState};
use crate::config::{NodeManagerConfig, ObjectManagerConfig};
use crate::health::{subsystems, HealthRegistry};
use crate::metadata::MetadataClientHandle;
use crate::node_manager::NodeManager;
use crate::object_manager::ObjectManager;
use crate::observability::{AgentMetrics, LifecycleLogger};
use crate::proto::NodeInfo;
use crate::shutdown::{ShutdownController, ShutdownHandle};

/// Addresses and identity the agent is constructed with.
#[derive(Debug, Clone)]
pub struct AgentOptions {
    /// Unix socket this agent listens on for local clients.
    pub agent_socket: PathBuf,
    /// IP address of this node, as seen by the rest of the cluster.
    pub node_ip: String,
    /// Address of the cluster metadata store.
    pub metadata_addr: String,
    /// Port of the cluster metadata store.
    pub metadata_port: u16,
    /// Port for the health/metrics endpoint. Zero binds an ephemeral port.
    pub status_port: u16,
}

/// The per-node agent process.
pub struct Agent {
    // Field order is the teardown order, the reverse of construction:
    // subsystems release before the reactors that drove them, the primary
    // reactor last.
    object_manager: ObjectManager,
    node_manager: NodeManager,
    metadata: MetadataClientHandle,
    shutdown: ShutdownController,
    health: HealthRegistry,
    logger: LifecycleLogger,
    options: AgentOptions,
    object_reactor: Runtime,
    primary: Runtime,
}

impl Agent {
    /// Wire the subsystems against their configurations and reactors.
    ///
    /// The primary reactor is created by the caller (the metadata client is
    /// connected on it before the agent exists) and owned by the agent from
    /// here on. No events are processed until [`run`](Self::run).
    pub fn new(
        primary: Runtime,
        options: AgentOptions,
        node_config: NodeManagerConfig,
        object_config: ObjectManagerConfig,
        metadata: MetadataClientHandle,
    ) -> Result<Self> {
        let object_reactor = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .context("failed to build object transfer reactor")?;

        let metrics = AgentMetrics::new();
        let health = HealthRegistry::new();
        health.register(subsystems::NODE_MANAGER);
        health.register(subsystems::OBJECT_MANAGER);
        health.register(subsystems::METADATA_CLIENT);

        let logger = LifecycleLogger::new(options.node_ip.clone());
        let node_manager = NodeManager::new(
            node_config,
            metadata.clone(),
            metrics.clone(),
            health.clone(),
        );
        let object_manager = ObjectManager::new(object_config, metadata.clone(), metrics);

        info!(
            client_id = %metadata.local_client_id(),
            store = %format!("{}:{}", options.metadata_addr, options.metadata_port),
            "Agent subsystems wired"
        );

        Ok(Self {
            object_manager,
            node_manager,
            metadata,
            shutdown: ShutdownController::new(),
            health,
            logger,
            options,
            object_reactor,
            primary,
        })
    }

    /// Trigger for requesting a stop from outside the run loop.
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.handle()
    }

    pub fn node_manager(&self) -> &NodeManager {
        &self.node_manager
    }

    pub fn object_manager(&self) -> &ObjectManager {
        &self.object_manager
    }

    /// Run until a stop is requested.
    ///
    /// Blocks the calling thread on the primary reactor. The transfer
    /// reactor runs its loop on a scoped thread for exactly this call, so
    /// both loops are live together and both are drained before this
    /// returns. The shutdown controller is installed strictly before the
    /// loops start.
    pub fn run(&mut self) -> Result<()> {
        let Agent {
            node_manager,
            object_manager,
            metadata,
            shutdown,
            health,
            logger,
            options,
            object_reactor,
            primary,
        } = self;

        let node_info = NodeInfo {
            node_id: metadata.local_client_id().to_string(),
            node_ip: options.node_ip.clone(),
            agent_socket: options.agent_socket.display().to_string(),
            store_socket: object_manager.store_socket().display().to_string(),
            resources: node_manager.resources().to_map(),
        };

        let object_rx = shutdown.subscribe();
        let node_rx = shutdown.subscribe();
        let stop_handle = shutdown.handle();
        let status_port = options.status_port;

        logger.log_startup(metadata.local_client_id(), node_manager.resources());

        std::thread::scope(|scope| {
            let object_manager = &*object_manager;
            let transfer_loop = scope.spawn(move || {
                object_reactor.block_on(object_manager.run(object_rx));
            });

            let outcome = primary.block_on(async {
                shutdown.install()?;

                let state = StatusState {
                    health: health.clone(),
                };
                tokio::spawn(async move {
                    if let Err(e) = api::serve(status_port, state).await {
                        tracing::error!(error = %e, "Status endpoint failed");
                    }
                });

                health.set_ready(true);
                node_manager.run(node_info, node_rx).await;
                Ok::<(), anyhow::Error>(())
            });

            // Unblock the transfer loop even on an error path; on the
            // normal path the stop request has already been observed.
            stop_handle.request_stop();
            if transfer_loop.join().is_err() {
                anyhow::bail!("object transfer reactor panicked");
            }

            logger.log_shutdown("stop requested");
            outcome
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{assemble, RuntimeConfig, WorkerCommand};
    use crate::metadata::MetadataClient;
    use crate::resources::ResourceSet;
    use std::sync::Arc;
    use std::time::Duration;

    fn test_agent() -> Agent {
        let runtime = RuntimeConfig {
            heartbeat_period_ms: 20,
            status_port: 0,
        };
        let (node_config, object_config) = assemble(
            "/tmp/store.sock",
            WorkerCommand::parse("python worker.py"),
            ResourceSet::parse("CPU,4").unwrap(),
            &runtime,
        );
        let primary = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let metadata = {
            // The client connects on the primary reactor before the agent
            // exists, as in production bootstrap.
            let _guard = primary.enter();
            Arc::new(MetadataClient::connect_lazy("127.0.0.1", 1).unwrap())
        };
        let options = AgentOptions {
            agent_socket: PathBuf::from("/tmp/agent.sock"),
            node_ip: "127.0.0.1".to_string(),
            metadata_addr: "127.0.0.1".to_string(),
            metadata_port: 1,
            status_port: 0,
        };
        Agent::new(primary, options, node_config, object_config, metadata).unwrap()
    }

    #[test]
    fn construction_processes_no_events() {
        let agent = test_agent();
        // Wired but idle: nothing has been spawned or pulled yet.
        assert!(agent.node_manager().workers().is_empty());
        assert_eq!(agent.object_manager().pending_pulls(), 0);
    }

    #[test]
    fn run_returns_after_stop_request_and_drops_cleanly() {
        let mut agent = test_agent();
        let handle = agent.shutdown_handle();

        let stopper = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(200));
            handle.request_stop();
        });

        agent.run().expect("run loop failed");
        stopper.join().unwrap();

        // Normal return: the agent drops here, releasing both managers and
        // both reactors in reverse construction order.
        drop(agent);
    }
}
