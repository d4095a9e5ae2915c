//! Agent configuration assembly
//!
//! Turns the parsed process arguments plus the runtime settings into the two
//! configuration structures the subsystems are constructed from. Assembly is
//! a pure step: no I/O, no ambient state. The object-manager numbers are
//! compiled-in defaults; transfer tuning is not exposed on the agent's
//! external interface.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use serde::Deserialize;

use crate::resources::ResourceSet;

/// Wait before retrying a failed object pull.
pub const DEFAULT_PULL_RETRY_TIMEOUT: Duration = Duration::from_millis(100);

/// Maximum number of concurrent outbound transfers.
pub const DEFAULT_MAX_SENDS: usize = 2;

/// Maximum number of concurrent inbound transfers.
pub const DEFAULT_MAX_RECEIVES: usize = 2;

/// Chunk size, in bytes, for splitting large objects during transfer.
pub const DEFAULT_OBJECT_CHUNK_SIZE: u64 = 100_000_000;

/// Command line used to launch task-execution workers.
///
/// The raw string is split on single spaces; consecutive spaces therefore
/// produce empty tokens, which are passed verbatim into the worker argv.
/// No executability validation happens here; that belongs to the node
/// manager at spawn time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerCommand {
    argv: Vec<String>,
}

impl WorkerCommand {
    pub fn parse(raw: &str) -> Self {
        Self {
            argv: raw.split(' ').map(str::to_string).collect(),
        }
    }

    /// The ordered argument vector, executable first.
    pub fn argv(&self) -> &[String] {
        &self.argv
    }
}

/// Construction-time configuration for the node manager.
#[derive(Debug, Clone)]
pub struct NodeManagerConfig {
    /// Static resource capacity advertised by this node.
    pub resources: ResourceSet,
    /// Argument vector for launching task workers.
    pub worker_command: WorkerCommand,
    /// Workers pre-forked at startup. Zero: workers are spawned lazily.
    pub num_initial_workers: usize,
    /// Interval between heartbeats to the control store.
    pub heartbeat_period: Duration,
}

/// Construction-time configuration for the object manager.
#[derive(Debug, Clone)]
pub struct ObjectManagerConfig {
    /// Unix socket of the shared-memory object store on this node.
    pub store_socket: PathBuf,
    pub pull_retry_timeout: Duration,
    pub max_sends: usize,
    pub max_receives: usize,
    pub object_chunk_size: u64,
}

/// Process-wide runtime settings, loaded once from the environment and
/// passed by value into [`assemble`].
#[derive(Debug, Clone, Deserialize)]
pub struct RuntimeConfig {
    /// Heartbeat period in milliseconds.
    #[serde(default = "default_heartbeat_period_ms")]
    pub heartbeat_period_ms: u64,

    /// Port for the health/metrics endpoint.
    #[serde(default = "default_status_port")]
    pub status_port: u16,
}

fn default_heartbeat_period_ms() -> u64 {
    100
}

fn default_status_port() -> u16 {
    8900
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            heartbeat_period_ms: default_heartbeat_period_ms(),
            status_port: default_status_port(),
        }
    }
}

impl RuntimeConfig {
    /// Load settings from `NODE_AGENT_`-prefixed environment variables.
    pub fn load() -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::Environment::with_prefix("NODE_AGENT"))
            .build()?;

        Ok(settings.try_deserialize().unwrap_or_default())
    }
}

/// Build both subsystem configurations from the parsed inputs.
pub fn assemble(
    store_socket: impl Into<PathBuf>,
    worker_command: WorkerCommand,
    resources: ResourceSet,
    runtime: &RuntimeConfig,
) -> (NodeManagerConfig, ObjectManagerConfig) {
    let node_manager = NodeManagerConfig {
        resources,
        worker_command,
        num_initial_workers: 0,
        heartbeat_period: Duration::from_millis(runtime.heartbeat_period_ms),
    };

    let object_manager = ObjectManagerConfig {
        store_socket: store_socket.into(),
        pull_retry_timeout: DEFAULT_PULL_RETRY_TIMEOUT,
        max_sends: DEFAULT_MAX_SENDS,
        max_receives: DEFAULT_MAX_RECEIVES,
        object_chunk_size: DEFAULT_OBJECT_CHUNK_SIZE,
    };

    (node_manager, object_manager)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worker_command_tokenizes_in_argv_order() {
        let command = WorkerCommand::parse("python worker.py --x 1");
        assert_eq!(command.argv(), &["python", "worker.py", "--x", "1"]);
    }

    #[test]
    fn worker_command_preserves_empty_tokens() {
        // Splitting is literal on single spaces; a double space yields an
        // empty token that is passed through to the worker argv unchanged.
        let command = WorkerCommand::parse("python  worker.py");
        assert_eq!(command.argv(), &["python", "", "worker.py"]);
    }

    #[test]
    fn assemble_fixes_initial_worker_count_at_zero() {
        let runtime = RuntimeConfig::default();
        let (node, _) = assemble(
            "/tmp/store.sock",
            WorkerCommand::parse("python worker.py"),
            ResourceSet::parse("CPU,64").unwrap(),
            &runtime,
        );
        assert_eq!(node.num_initial_workers, 0);
    }

    #[test]
    fn assemble_uses_compiled_in_transfer_defaults() {
        let runtime = RuntimeConfig::default();
        let (_, object) = assemble(
            "/tmp/store.sock",
            WorkerCommand::parse(""),
            ResourceSet::default(),
            &runtime,
        );
        assert_eq!(object.pull_retry_timeout, Duration::from_millis(100));
        assert_eq!(object.max_sends, 2);
        assert_eq!(object.max_receives, 2);
        assert_eq!(object.object_chunk_size, 100_000_000);
    }

    #[test]
    fn assemble_derives_heartbeat_period_from_runtime_settings() {
        let runtime = RuntimeConfig {
            heartbeat_period_ms: 250,
            ..RuntimeConfig::default()
        };
        let (node, _) = assemble(
            "/tmp/store.sock",
            WorkerCommand::parse("worker"),
            ResourceSet::default(),
            &runtime,
        );
        assert_eq!(node.heartbeat_period, Duration::from_millis(250));
    }
}
