//! Core library for the per-node cluster agent
//!
//! This crate provides:
//! - Parsing of the process-start arguments into typed configuration
//! - Assembly of the node-manager and object-manager configurations
//! - The cluster metadata/control store client
//! - The agent process lifecycle: dual reactors, run loop, shutdown
//! - Health tracking and Prometheus metrics for the status endpoint

pub mod agent;
pub mod api;
pub mod config;
pub mod error;
pub mod health;
pub mod metadata;
pub mod node_manager;
pub mod object_manager;
pub mod observability;
pub mod proto;
pub mod resources;
pub mod shutdown;

pub use agent::{Agent, AgentOptions};
pub use config::{
    assemble, NodeManagerConfig, ObjectManagerConfig, RuntimeConfig, WorkerCommand,
};
pub use error::ConfigError;
pub use metadata::{MetadataClient, MetadataClientHandle, MetadataError};
pub use node_manager::NodeManager;
pub use object_manager::ObjectManager;
pub use observability::{AgentMetrics, LifecycleLogger};
pub use resources::ResourceSet;
pub use shutdown::{ShutdownController, ShutdownHandle};
