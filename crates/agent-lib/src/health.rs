//! Subsystem health tracking for the status endpoint

use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Health of one subsystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SubsystemStatus {
    Up,
    Degraded,
    Down,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubsystemHealth {
    pub status: SubsystemStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub since: i64,
}

impl SubsystemHealth {
    fn now(status: SubsystemStatus, detail: Option<String>) -> Self {
        Self {
            status,
            detail,
            since: chrono::Utc::now().timestamp(),
        }
    }
}

/// Subsystem names tracked by the agent.
pub mod subsystems {
    pub const NODE_MANAGER: &str = "node_manager";
    pub const OBJECT_MANAGER: &str = "object_manager";
    pub const METADATA_CLIENT: &str = "metadata_client";
}

/// Aggregate health report served on `/healthz`.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: SubsystemStatus,
    pub subsystems: HashMap<String, SubsystemHealth>,
}

/// Readiness report served on `/readyz`.
#[derive(Debug, Clone, Serialize)]
pub struct Readiness {
    pub ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Default)]
struct HealthState {
    subsystems: HashMap<String, SubsystemHealth>,
    ready: bool,
}

/// Registry of subsystem health, shared between the agent and the status
/// endpoint. Lock hold times are short; no await happens under the lock.
#[derive(Debug, Clone, Default)]
pub struct HealthRegistry {
    state: Arc<RwLock<HealthState>>,
}

impl HealthRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a subsystem, initially up.
    pub fn register(&self, name: &str) {
        self.update(name, SubsystemStatus::Up, None);
    }

    pub fn set_up(&self, name: &str) {
        self.update(name, SubsystemStatus::Up, None);
    }

    pub fn set_degraded(&self, name: &str, detail: impl Into<String>) {
        self.update(name, SubsystemStatus::Degraded, Some(detail.into()));
    }

    pub fn set_down(&self, name: &str, detail: impl Into<String>) {
        self.update(name, SubsystemStatus::Down, Some(detail.into()));
    }

    fn update(&self, name: &str, status: SubsystemStatus, detail: Option<String>) {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        state
            .subsystems
            .insert(name.to_string(), SubsystemHealth::now(status, detail));
    }

    /// Flip readiness; set once construction completes.
    pub fn set_ready(&self, ready: bool) {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        state.ready = ready;
    }

    pub fn report(&self) -> HealthReport {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        let status = Self::aggregate(&state.subsystems);
        HealthReport {
            status,
            subsystems: state.subsystems.clone(),
        }
    }

    pub fn readiness(&self) -> Readiness {
        let (ready, status) = {
            let state = self.state.read().unwrap_or_else(|e| e.into_inner());
            (state.ready, Self::aggregate(&state.subsystems))
        };

        if !ready {
            Readiness {
                ready: false,
                reason: Some("agent still starting".to_string()),
            }
        } else if status == SubsystemStatus::Down {
            Readiness {
                ready: false,
                reason: Some("subsystem down".to_string()),
            }
        } else {
            Readiness {
                ready: true,
                reason: None,
            }
        }
    }

    fn aggregate(subsystems: &HashMap<String, SubsystemHealth>) -> SubsystemStatus {
        let mut degraded = false;
        for health in subsystems.values() {
            match health.status {
                SubsystemStatus::Down => return SubsystemStatus::Down,
                SubsystemStatus::Degraded => degraded = true,
                SubsystemStatus::Up => {}
            }
        }
        if degraded {
            SubsystemStatus::Degraded
        } else {
            SubsystemStatus::Up
        }
    }
}
