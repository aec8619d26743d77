// tests/dependency_properties.rs

use std::collections::{BTreeMap, BTreeSet};

use proptest::prelude::*;

use dagrt::config::{NodeConfig, ScenarioFile, validate_config};
use dagrt::dag::{NodeId, NodeStatus};
use dagrt::engine::Runtime;
use dagrt::types::BackendId;
use dagrt_test_utils::builders::{NodeConfigBuilder, ScenarioBuilder};
use dagrt_test_utils::fake_executor::fake_registry;

const DEVICES: [&str; 3] = ["host:0", "cuda:0", "cuda:1"];
const BUFFERS: [&str; 2] = ["A", "B"];
const MODES: [&str; 5] = ["read", "write", "read_write", "discard_write", "discard_read_write"];
const LEN: usize = 16;

#[derive(Debug, Clone)]
struct AccessSpec {
    buffer: usize,
    mode: usize,
    offset: usize,
    extent: usize,
}

#[derive(Debug, Clone)]
struct NodeSpec {
    device: usize,
    accesses: Vec<AccessSpec>,
    /// Bit `j` set: depends on node `j`, for `j` below this node's index.
    after_mask: u16,
}

fn access_strategy() -> impl Strategy<Value = AccessSpec> {
    (0..BUFFERS.len(), 0..MODES.len(), 0..LEN).prop_flat_map(|(buffer, mode, offset)| {
        (1..=LEN - offset).prop_map(move |extent| AccessSpec {
            buffer,
            mode,
            offset,
            extent,
        })
    })
}

fn node_strategy() -> impl Strategy<Value = NodeSpec> {
    (
        0..DEVICES.len(),
        proptest::collection::vec(access_strategy(), 1..3),
        any::<u16>(),
    )
        .prop_map(|(device, accesses, after_mask)| NodeSpec {
            device,
            accesses,
            after_mask,
        })
}

fn name(i: usize) -> String {
    format!("n{i:02}")
}

fn scenario(specs: &[NodeSpec]) -> ScenarioFile {
    let mut builder = ScenarioBuilder::new()
        .with_device("cuda:0", 1 << 20, 0)
        .with_device("cuda:1", 1 << 20, 0);
    for buffer in BUFFERS {
        builder = builder.with_buffer(buffer, 4, &[LEN], Some("host:0"));
    }

    for (i, spec) in specs.iter().enumerate() {
        let mut node = NodeConfigBuilder::kernel(&name(i)).device(DEVICES[spec.device]);
        for j in (0..i).filter(|j| spec.after_mask & (1 << j) != 0) {
            node = node.after(&name(j));
        }
        for access in spec.accesses.iter() {
            node = node.access_window(
                BUFFERS[access.buffer],
                MODES[access.mode],
                &[access.offset],
                &[access.extent],
            );
        }
        let node: NodeConfig = node.build();
        builder = builder.with_node(&name(i), node);
    }
    builder.build()
}

fn closure(edges: &BTreeMap<NodeId, BTreeSet<NodeId>>, start: NodeId) -> BTreeSet<NodeId> {
    let mut seen = BTreeSet::new();
    let mut stack: Vec<NodeId> = edges.get(&start).into_iter().flatten().copied().collect();
    while let Some(id) = stack.pop() {
        if seen.insert(id) {
            stack.extend(edges.get(&id).into_iter().flatten().copied());
        }
    }
    seen
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Minimized dependency lists never lose an ordering constraint: every
    /// really submitted ancestor of a dispatched node is reachable through
    /// the dependencies handed to the executors.
    #[test]
    fn dependency_minimization_is_not_lossy(specs in proptest::collection::vec(node_strategy(), 1..8)) {
        let cfg = scenario(&specs);
        prop_assert!(validate_config(&cfg).is_ok());

        let (registry, log) = fake_registry(&[BackendId::Host, BackendId::Cuda], false);
        let mut runtime = Runtime::with_registry(&cfg, registry).expect("runtime");
        let summary = runtime.submit_all().expect("submission");
        prop_assert!(summary.failed.is_empty(), "{:?}", summary.failed);

        let graph = runtime.graph();
        let mut edges: BTreeMap<NodeId, BTreeSet<NodeId>> = BTreeMap::new();
        for dispatch in log.dispatches() {
            prop_assert!(
                dispatch.dependencies.windows(2).all(|w| w[0] < w[1]),
                "dependencies of {} not strictly ascending: {:?}",
                dispatch.node,
                dispatch.dependencies
            );
            for dep in dispatch.dependencies.iter() {
                prop_assert_eq!(graph.status_of(*dep), Some(NodeStatus::Submitted));
            }
            edges
                .entry(dispatch.node)
                .or_default()
                .extend(dispatch.dependencies.iter().copied());
        }

        for node in edges.keys().copied() {
            let reachable = closure(&edges, node);
            for ancestor in graph.ancestors_of(node) {
                if graph.status_of(ancestor) == Some(NodeStatus::Submitted) {
                    prop_assert!(
                        reachable.contains(&ancestor),
                        "{} lost its ordering on {}",
                        node,
                        ancestor
                    );
                }
            }
        }
    }
}
