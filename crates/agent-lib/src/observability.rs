//! Metrics and lifecycle logging for the node agent
//!
//! Prometheus metrics are registered once in the default registry and
//! exposed through the status endpoint; `AgentMetrics` is a cheap handle to
//! the global instance. `LifecycleLogger` emits the structured events that
//! mark the agent's lifetime.

use prometheus::{register_int_counter, register_int_gauge, IntCounter, IntGauge};
use std::sync::OnceLock;
use tracing::info;

use crate::resources::ResourceSet;

static GLOBAL_METRICS: OnceLock<AgentMetricsInner> = OnceLock::new();

struct AgentMetricsInner {
    heartbeats_sent: IntCounter,
    heartbeat_failures: IntCounter,
    workers_spawned: IntCounter,
    workers_active: IntGauge,
    sends_in_flight: IntGauge,
    receives_in_flight: IntGauge,
    pending_pulls: IntGauge,
    pulls_resolved: IntCounter,
}

impl AgentMetricsInner {
    fn new() -> Self {
        Self {
            heartbeats_sent: register_int_counter!(
                "node_agent_heartbeats_sent_total",
                "Heartbeats delivered to the control store"
            )
            .expect("Failed to register heartbeats_sent"),

            heartbeat_failures: register_int_counter!(
                "node_agent_heartbeat_failures_total",
                "Heartbeats that failed to reach the control store"
            )
            .expect("Failed to register heartbeat_failures"),

            workers_spawned: register_int_counter!(
                "node_agent_workers_spawned_total",
                "Task workers launched since startup"
            )
            .expect("Failed to register workers_spawned"),

            workers_active: register_int_gauge!(
                "node_agent_workers_active",
                "Task workers currently alive"
            )
            .expect("Failed to register workers_active"),

            sends_in_flight: register_int_gauge!(
                "node_agent_object_sends_in_flight",
                "Outbound object transfers currently running"
            )
            .expect("Failed to register sends_in_flight"),

            receives_in_flight: register_int_gauge!(
                "node_agent_object_receives_in_flight",
                "Inbound object transfers currently running"
            )
            .expect("Failed to register receives_in_flight"),

            pending_pulls: register_int_gauge!(
                "node_agent_pending_pulls",
                "Object pulls awaiting location resolution"
            )
            .expect("Failed to register pending_pulls"),

            pulls_resolved: register_int_counter!(
                "node_agent_pulls_resolved_total",
                "Object pulls whose locations were resolved"
            )
            .expect("Failed to register pulls_resolved"),
        }
    }
}

/// Handle to the agent's Prometheus metrics.
///
/// Clones share the single global instance.
#[derive(Clone)]
pub struct AgentMetrics {
    _private: (),
}

impl Default for AgentMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl AgentMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(AgentMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &AgentMetricsInner {
        GLOBAL_METRICS.get().expect("Metrics not initialized")
    }

    pub fn inc_heartbeats_sent(&self) {
        self.inner().heartbeats_sent.inc();
    }

    pub fn inc_heartbeat_failures(&self) {
        self.inner().heartbeat_failures.inc();
    }

    pub fn inc_workers_spawned(&self) {
        self.inner().workers_spawned.inc();
    }

    pub fn set_workers_active(&self, count: i64) {
        self.inner().workers_active.set(count);
    }

    pub fn inc_sends_in_flight(&self) {
        self.inner().sends_in_flight.inc();
    }

    pub fn dec_sends_in_flight(&self) {
        self.inner().sends_in_flight.dec();
    }

    pub fn inc_receives_in_flight(&self) {
        self.inner().receives_in_flight.inc();
    }

    pub fn dec_receives_in_flight(&self) {
        self.inner().receives_in_flight.dec();
    }

    pub fn set_pending_pulls(&self, count: i64) {
        self.inner().pending_pulls.set(count);
    }

    pub fn inc_pulls_resolved(&self) {
        self.inner().pulls_resolved.inc();
    }
}

/// Structured logging for agent lifecycle events.
#[derive(Clone)]
pub struct LifecycleLogger {
    node_ip: String,
}

impl LifecycleLogger {
    pub fn new(node_ip: impl Into<String>) -> Self {
        Self {
            node_ip: node_ip.into(),
        }
    }

    pub fn log_startup(&self, client_id: &str, resources: &ResourceSet) {
        info!(
            event = "agent_started",
            node_ip = %self.node_ip,
            client_id = %client_id,
            resources = %resources,
            "Node agent started"
        );
    }

    pub fn log_registered(&self, node_id: &str) {
        info!(
            event = "node_registered",
            node_ip = %self.node_ip,
            node_id = %node_id,
            "Node registered with control store"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "agent_shutdown",
            node_ip = %self.node_ip,
            reason = %reason,
            "Node agent shutting down"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metrics_handle_is_usable_after_init() {
        let metrics = AgentMetrics::new();
        metrics.inc_heartbeats_sent();
        metrics.inc_heartbeat_failures();
        metrics.set_workers_active(3);
        metrics.set_pending_pulls(1);
        metrics.inc_pulls_resolved();
    }

    #[test]
    fn lifecycle_logger_carries_node_ip() {
        let logger = LifecycleLogger::new("10.0.0.7");
        assert_eq!(logger.node_ip, "10.0.0.7");
    }
}
