pub mod builders;
pub mod fake_executor;

use std::sync::Once;
use std::time::Duration;

use dagrt::dag::{DagGraph, NodeId};
use tracing_subscriber::{EnvFilter, fmt};

static INIT: Once = Once::new();

pub type TestResult = Result<(), Box<dyn std::error::Error>>;

/// Initialise tracing for tests, captured per test via `with_test_writer()`.
///
/// Defaults to `info` for this crate and `warn` elsewhere; override with
/// e.g. `RUST_LOG=dagrt=trace cargo test`.
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("warn,dagrt=info"));

        fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .init();
    });
}

/// Run a future with a 5-second timeout.
pub async fn with_timeout<F, T>(f: F) -> T
where
    F: std::future::Future<Output = T>,
{
    tokio::time::timeout(Duration::from_secs(5), f)
        .await
        .expect("Test timed out after 5 seconds")
}

/// Wait until a submitted node's completion handle fires. Virtually
/// submitted nodes have no handle and return immediately.
pub async fn wait_for_node(graph: &DagGraph, node: NodeId) {
    let handle = graph
        .node(node)
        .expect("node must exist")
        .event()
        .cloned();
    if let Some(handle) = handle {
        with_timeout(handle.wait()).await;
    }
}
