//! End-to-end bootstrap tests: argument parsing through agent teardown

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use node_agent_lib::{
    assemble, Agent, AgentOptions, MetadataClient, ResourceSet, RuntimeConfig, WorkerCommand,
};

#[test]
fn assembled_configs_use_fixed_defaults_regardless_of_inputs() {
    let runtime = RuntimeConfig::default();

    for (worker, resources) in [
        ("python worker.py", "CPU,4"),
        ("", ""),
        ("a b c d e f", "CPU,0.5,GPU,8,custom,1000000"),
    ] {
        let (node, object) = assemble(
            "/tmp/store.sock",
            WorkerCommand::parse(worker),
            ResourceSet::parse(resources).unwrap(),
            &runtime,
        );
        assert_eq!(node.num_initial_workers, 0);
        assert_eq!(object.object_chunk_size, 100_000_000);
        assert_eq!(object.max_sends, 2);
        assert_eq!(object.max_receives, 2);
        assert_eq!(object.pull_retry_timeout, Duration::from_millis(100));
    }
}

#[test]
fn malformed_resource_listing_fails_before_any_assembly() {
    assert!(ResourceSet::parse("CPU,4,GPU").is_err());
    assert!(ResourceSet::parse("CPU,four").is_err());
}

/// Full lifecycle without a live metadata store: construct, run both
/// reactors, request a stop from another thread, observe the run loop
/// return and the agent drop cleanly.
#[test]
fn agent_runs_and_stops_on_request() {
    let runtime = RuntimeConfig {
        heartbeat_period_ms: 20,
        status_port: 0,
    };
    let (node_config, object_config) = assemble(
        "/tmp/store.sock",
        WorkerCommand::parse("python worker.py"),
        ResourceSet::parse("CPU,2").unwrap(),
        &runtime,
    );

    let primary = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();
    // The client connects on the primary reactor before the agent exists,
    // as in production bootstrap.
    let metadata = {
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

    let mut agent = Agent::new(primary, options, node_config, object_config, metadata).unwrap();

    // Queue a pull; the store is unreachable, so it stays pending while the
    // transfer loop retries on its own reactor.
    agent.object_manager().request_pull("object-a");

    let handle = agent.shutdown_handle();
    let stopper = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(300));
        handle.request_stop();
    });

    agent.run().expect("run loop failed");
    stopper.join().unwrap();

    // Still pending: locations never resolved, and nothing panicked.
    assert_eq!(agent.object_manager().pending_pulls(), 1);
    assert!(agent.node_manager().workers().is_empty());
}
