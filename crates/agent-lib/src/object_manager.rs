//! Inter-node object transfer management
//!
//! The object manager fronts the node's shared-memory object store and
//! moves objects between nodes in chunks. The transfer protocol itself
//! lives behind the admission and retry machinery here: concurrent sends
//! and receives are capped by semaphores, and unresolved pulls are retried
//! on a fixed timeout against the control store's object directory.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use dashmap::DashMap;
use tokio::sync::{broadcast, OwnedSemaphorePermit, Semaphore};
use tokio::time::interval;
use tracing::{debug, info};

use crate::config::ObjectManagerConfig;
use crate::metadata::MetadataClientHandle;
use crate::observability::AgentMetrics;

/// Direction of an admitted transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TransferDirection {
    Send,
    Receive,
}

/// Admission slot for one in-flight transfer. Dropping it frees the slot.
pub struct TransferPermit {
    _permit: OwnedSemaphorePermit,
    direction: TransferDirection,
    metrics: AgentMetrics,
}

impl Drop for TransferPermit {
    fn drop(&mut self) {
        match self.direction {
            TransferDirection::Send => self.metrics.dec_sends_in_flight(),
            TransferDirection::Receive => self.metrics.dec_receives_in_flight(),
        }
    }
}

/// A pull waiting for its object's locations to resolve.
#[derive(Debug, Clone)]
pub struct PullRequest {
    pub attempts: u32,
    pub requested_at: i64,
}

/// Object transfer manager for one node.
pub struct ObjectManager {
    config: ObjectManagerConfig,
    metadata: MetadataClientHandle,
    send_slots: Arc<Semaphore>,
    receive_slots: Arc<Semaphore>,
    pending: Arc<DashMap<String, PullRequest>>,
    metrics: AgentMetrics,
}

impl ObjectManager {
    pub fn new(
        config: ObjectManagerConfig,
        metadata: MetadataClientHandle,
        metrics: AgentMetrics,
    ) -> Self {
        let send_slots = Arc::new(Semaphore::new(config.max_sends));
        let receive_slots = Arc::new(Semaphore::new(config.max_receives));
        Self {
            config,
            metadata,
            send_slots,
            receive_slots,
            pending: Arc::new(DashMap::new()),
            metrics,
        }
    }

    /// Unix socket of the local shared-memory object store.
    pub fn store_socket(&self) -> &Path {
        &self.config.store_socket
    }

    /// Number of chunks a transfer of `object_size` bytes splits into.
    /// Empty objects still move as a single chunk.
    pub fn chunk_count(&self, object_size: u64) -> u64 {
        if object_size == 0 {
            return 1;
        }
        object_size.div_ceil(self.config.object_chunk_size)
    }

    /// Wait for an outbound transfer slot.
    pub async fn begin_send(&self) -> Result<TransferPermit> {
        let permit = self
            .send_slots
            .clone()
            .acquire_owned()
            .await
            .context("send slots closed")?;
        self.metrics.inc_sends_in_flight();
        Ok(TransferPermit {
            _permit: permit,
            direction: TransferDirection::Send,
            metrics: self.metrics.clone(),
        })
    }

    /// Wait for an inbound transfer slot.
    pub async fn begin_receive(&self) -> Result<TransferPermit> {
        let permit = self
            .receive_slots
            .clone()
            .acquire_owned()
            .await
            .context("receive slots closed")?;
        self.metrics.inc_receives_in_flight();
        Ok(TransferPermit {
            _permit: permit,
            direction: TransferDirection::Receive,
            metrics: self.metrics.clone(),
        })
    }

    /// Queue an object for pulling; retried until its locations resolve.
    pub fn request_pull(&self, object_id: impl Into<String>) {
        let object_id = object_id.into();
        self.pending.entry(object_id).or_insert_with(|| PullRequest {
            attempts: 0,
            requested_at: chrono::Utc::now().timestamp(),
        });
        self.metrics.set_pending_pulls(self.pending.len() as i64);
    }

    pub fn pending_pulls(&self) -> usize {
        self.pending.len()
    }

    /// Drive pull retries until shutdown is requested.
    ///
    /// Runs on the dedicated transfer reactor so directory lookups and
    /// chunked transfers never head-of-line block the control plane.
    pub async fn run(&self, mut shutdown: broadcast::Receiver<()>) {
        info!(
            store_socket = %self.config.store_socket.display(),
            pull_retry_ms = self.config.pull_retry_timeout.as_millis() as u64,
            "Starting object transfer loop"
        );

        let mut ticker = interval(self.config.pull_retry_timeout);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.retry_pending_pulls().await;
                }
                _ = shutdown.recv() => {
                    info!("Stopping object transfer loop");
                    break;
                }
            }
        }
    }

    async fn retry_pending_pulls(&self) {
        if self.pending.is_empty() {
            return;
        }

        let object_ids: Vec<String> = self.pending.iter().map(|e| e.key().clone()).collect();
        for object_id in object_ids {
            match self.metadata.locate_object(&object_id).await {
                Ok(reply) if !reply.node_ids.is_empty() => {
                    self.pending.remove(&object_id);
                    self.metrics.inc_pulls_resolved();
                    self.metrics.set_pending_pulls(self.pending.len() as i64);
                    debug!(
                        object_id = %object_id,
                        locations = reply.node_ids.len(),
                        "Object located"
                    );
                }
                Ok(_) => self.record_attempt(&object_id),
                Err(e) => {
                    debug!(object_id = %object_id, error = %e, "Object location lookup failed");
                    self.record_attempt(&object_id);
                }
            }
        }
    }

    fn record_attempt(&self, object_id: &str) {
        if let Some(mut entry) = self.pending.get_mut(object_id) {
            entry.attempts += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{assemble, RuntimeConfig, WorkerCommand};
    use crate::metadata::MetadataClient;
    use crate::resources::ResourceSet;
    use std::time::Duration;

    fn test_manager() -> ObjectManager {
        let runtime = RuntimeConfig::default();
        let (_, object_config) = assemble(
            "/tmp/store.sock",
            WorkerCommand::parse("worker"),
            ResourceSet::default(),
            &runtime,
        );
        let metadata = Arc::new(MetadataClient::connect_lazy("127.0.0.1", 1).unwrap());
        ObjectManager::new(object_config, metadata, AgentMetrics::new())
    }

    #[tokio::test]
    async fn chunk_count_boundaries() {
        let manager = test_manager();
        assert_eq!(manager.chunk_count(0), 1);
        assert_eq!(manager.chunk_count(1), 1);
        assert_eq!(manager.chunk_count(100_000_000), 1);
        assert_eq!(manager.chunk_count(100_000_001), 2);
        assert_eq!(manager.chunk_count(250_000_000), 3);
    }

    #[tokio::test]
    async fn transfer_admission_caps_concurrency() {
        let manager = test_manager();

        let first = manager.begin_send().await.unwrap();
        let _second = manager.begin_send().await.unwrap();

        // Both slots taken; a third send must wait.
        let third = tokio::time::timeout(Duration::from_millis(50), manager.begin_send()).await;
        assert!(third.is_err());

        // Releasing a slot admits the waiter.
        drop(first);
        let fourth = tokio::time::timeout(Duration::from_millis(50), manager.begin_send()).await;
        assert!(fourth.is_ok());
    }

    #[tokio::test]
    async fn sends_and_receives_are_independent_slots() {
        let manager = test_manager();
        let _s1 = manager.begin_send().await.unwrap();
        let _s2 = manager.begin_send().await.unwrap();

        // Send slots exhausted; receives still admitted.
        let receive = tokio::time::timeout(Duration::from_millis(50), manager.begin_receive()).await;
        assert!(receive.is_ok());
    }

    #[tokio::test]
    async fn request_pull_is_idempotent_per_object() {
        let manager = test_manager();
        manager.request_pull("object-a");
        manager.request_pull("object-a");
        manager.request_pull("object-b");
        assert_eq!(manager.pending_pulls(), 2);
    }

    #[tokio::test]
    async fn unresolved_pulls_accumulate_attempts() {
        let manager = test_manager();
        manager.request_pull("object-a");

        // The store is unreachable, so the pull stays pending.
        manager.retry_pending_pulls().await;
        manager.retry_pending_pulls().await;

        assert_eq!(manager.pending_pulls(), 1);
        let attempts = manager.pending.get("object-a").unwrap().attempts;
        assert_eq!(attempts, 2);
    }

    #[tokio::test]
    async fn run_exits_on_shutdown_request() {
        let manager = test_manager();
        let (sender, receiver) = broadcast::channel(1);

        let run = manager.run(receiver);
        tokio::pin!(run);

        tokio::time::sleep(Duration::from_millis(20)).await;
        sender.send(()).unwrap();

        tokio::time::timeout(Duration::from_secs(5), run)
            .await
            .expect("transfer loop did not exit after stop request");
    }
}
