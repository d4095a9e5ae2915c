//! Node-level task and resource management
//!
//! The node manager owns the worker pool and the control-plane heartbeat.
//! Scheduling policy lives elsewhere; this layer registers the node, keeps
//! its liveness fresh, and launches task workers on demand with the
//! configured command line.

use std::sync::Arc;

use anyhow::{Context, Result};
use dashmap::DashMap;
use tokio::process::Command;
use tokio::sync::broadcast;
use tokio::time::interval;
use tracing::{debug, info, warn};

use crate::config::NodeManagerConfig;
use crate::health::{subsystems, HealthRegistry};
use crate::metadata::MetadataClientHandle;
use crate::observability::AgentMetrics;
use crate::proto::{HeartbeatRequest, NodeInfo};
use crate::resources::ResourceSet;

/// A worker process launched by this node manager.
#[derive(Debug, Clone)]
pub struct WorkerRecord {
    pub pid: u32,
    pub spawned_at: i64,
}

/// Registry of live worker processes, keyed by pid.
#[derive(Debug, Clone, Default)]
pub struct WorkerRegistry {
    workers: Arc<DashMap<u32, WorkerRecord>>,
}

impl WorkerRegistry {
    fn insert(&self, pid: u32) {
        self.workers.insert(
            pid,
            WorkerRecord {
                pid,
                spawned_at: chrono::Utc::now().timestamp(),
            },
        );
    }

    fn remove(&self, pid: u32) {
        self.workers.remove(&pid);
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    pub fn pids(&self) -> Vec<u32> {
        self.workers.iter().map(|entry| entry.key().to_owned()).collect()
    }
}

/// Task and resource manager for one node.
pub struct NodeManager {
    config: NodeManagerConfig,
    metadata: MetadataClientHandle,
    workers: WorkerRegistry,
    metrics: AgentMetrics,
    health: HealthRegistry,
}

impl NodeManager {
    pub fn new(
        config: NodeManagerConfig,
        metadata: MetadataClientHandle,
        metrics: AgentMetrics,
        health: HealthRegistry,
    ) -> Self {
        Self {
            config,
            metadata,
            workers: WorkerRegistry::default(),
            metrics,
            health,
        }
    }

    /// Static resource capacity this node advertises.
    pub fn resources(&self) -> &ResourceSet {
        &self.config.resources
    }

    /// Resources currently uncommitted. Task accounting is the scheduler's
    /// concern; at this layer the full static set is available.
    pub fn available(&self) -> ResourceSet {
        self.config.resources.clone()
    }

    pub fn workers(&self) -> &WorkerRegistry {
        &self.workers
    }

    /// Launch one task worker with the configured command line, verbatim.
    ///
    /// A spawn failure is a runtime error for the caller to log; it never
    /// tears the agent down. Must run inside a reactor.
    pub fn spawn_worker(&self) -> Result<u32> {
        let argv = self.config.worker_command.argv();
        let program = argv.first().context("worker command is empty")?;

        let mut command = Command::new(program);
        command.args(&argv[1..]);
        let mut child = command
            .spawn()
            .with_context(|| format!("failed to launch worker `{program}`"))?;
        let pid = child.id().context("spawned worker has no pid")?;

        self.workers.insert(pid);
        self.metrics.inc_workers_spawned();
        self.metrics.set_workers_active(self.workers.len() as i64);
        debug!(pid, "Worker launched");

        // Reap the worker in the background so the registry stays honest.
        let workers = self.workers.clone();
        let metrics = self.metrics.clone();
        tokio::spawn(async move {
            match child.wait().await {
                Ok(status) => debug!(pid, status = %status, "Worker exited"),
                Err(e) => warn!(pid, error = %e, "Failed to await worker exit"),
            }
            workers.remove(pid);
            metrics.set_workers_active(workers.len() as i64);
        });

        Ok(pid)
    }

    /// Register the node, then heartbeat until shutdown is requested.
    ///
    /// Runs on the primary reactor. Heartbeat delivery failures are logged
    /// and counted, never fatal: the store may be restarting and the
    /// supervisor model tolerates gaps.
    pub async fn run(&self, node: NodeInfo, mut shutdown: broadcast::Receiver<()>) {
        info!(
            heartbeat_period_ms = self.config.heartbeat_period.as_millis() as u64,
            "Starting node manager loop"
        );

        for _ in 0..self.config.num_initial_workers {
            if let Err(e) = self.spawn_worker() {
                warn!(error = %e, "Failed to launch initial worker");
            }
        }

        self.register(node).await;

        let mut ticker = interval(self.config.heartbeat_period);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.send_heartbeat().await;
                }
                _ = shutdown.recv() => {
                    info!("Stopping node manager loop");
                    break;
                }
            }
        }
    }

    async fn register(&self, node: NodeInfo) {
        let node_id = node.node_id.clone();
        match self.metadata.register_node(node).await {
            Ok(reply) if reply.success => {
                info!(node_id = %node_id, "Node registered with control store");
            }
            Ok(reply) => {
                warn!(node_id = %node_id, message = %reply.message, "Control store rejected registration");
            }
            Err(e) => {
                warn!(node_id = %node_id, error = %e, "Node registration failed");
            }
        }
    }

    async fn send_heartbeat(&self) {
        let request = HeartbeatRequest {
            node_id: self.metadata.local_client_id().to_string(),
            available: self.available().to_map(),
            timestamp: Some(now_timestamp()),
        };

        match self.metadata.heartbeat(request).await {
            Ok(_) => {
                self.metrics.inc_heartbeats_sent();
                self.health.set_up(subsystems::METADATA_CLIENT);
            }
            Err(e) => {
                self.metrics.inc_heartbeat_failures();
                self.health
                    .set_degraded(subsystems::METADATA_CLIENT, e.to_string());
                debug!(error = %e, "Heartbeat delivery failed");
            }
        }
    }
}

fn now_timestamp() -> prost_types::Timestamp {
    let now = chrono::Utc::now();
    prost_types::Timestamp {
        seconds: now.timestamp(),
        nanos: now.timestamp_subsec_nanos() as i32,
    }
}
