// tests/graph_builder.rs

use dagrt::config::validate_config;
use dagrt::dag::builder::build_graph;
use dagrt::dag::{NodeId, NodeStatus, Operation};
use dagrt::errors::RuntimeError;
use dagrt::types::AccessMode;
use dagrt_test_utils::builders::{NodeConfigBuilder, ScenarioBuilder, cuda, host};
use dagrt_test_utils::{TestResult, init_tracing};

/// The access requirement is always pushed after the `after` dependencies.
fn access_requirement(graph: &dagrt::dag::DagGraph, node: NodeId) -> NodeId {
    *graph
        .requirements_of(node)
        .last()
        .expect("node has an access requirement")
}

fn sorted(mut ids: Vec<NodeId>) -> Vec<NodeId> {
    ids.sort();
    ids
}

#[test]
fn writes_wait_for_the_last_writer_and_every_reader_since() -> TestResult {
    init_tracing();
    let cfg = ScenarioBuilder::new()
        .with_device("cuda:0", 1 << 20, 0)
        .with_buffer("A", 4, &[16], Some("host:0"))
        .with_node("w1", NodeConfigBuilder::kernel("fill").device("cuda:0").access("A", "write").build())
        .with_node("r1", NodeConfigBuilder::kernel("sum").device("cuda:0").after("w1").access("A", "read").build())
        .with_node("r2", NodeConfigBuilder::kernel("max").device("host:0").after("w1").access("A", "read").build())
        .with_node(
            "w2",
            NodeConfigBuilder::kernel("scale")
                .device("cuda:0")
                .after("r1")
                .after("r2")
                .access("A", "read_write")
                .build(),
        )
        .build();
    validate_config(&cfg)?;

    let built = build_graph(&cfg)?;
    let graph = &built.graph;
    let id = |name: &str| built.node_id(name).expect("scenario node");
    let (w1, r1, r2, w2) = (id("w1"), id("r1"), id("r2"), id("w2"));

    assert_eq!(built.order.first().map(String::as_str), Some("w1"));
    assert_eq!(built.order.last().map(String::as_str), Some("w2"));

    // Reads only wait for the last writer.
    assert_eq!(graph.requirements_of(access_requirement(graph, r1)), &[w1]);
    assert_eq!(graph.requirements_of(access_requirement(graph, r2)), &[w1]);

    // The second write also waits for both readers.
    let w2_access = access_requirement(graph, w2);
    assert_eq!(
        sorted(graph.requirements_of(w2_access).to_vec()),
        sorted(vec![w1, r1, r2])
    );

    // `after` edges come first.
    assert_eq!(&graph.requirements_of(w2)[..2], &[r1, r2]);

    // Access requirements inherit the node's device.
    let r2_access = graph.node(access_requirement(graph, r2)).expect("requirement");
    assert_eq!(r2_access.hints().bound_device(), Some(host()));

    for name in ["w1", "r1", "r2", "w2"] {
        assert_eq!(graph.status_of(id(name)), Some(NodeStatus::Unsubmitted));
    }
    Ok(())
}

#[test]
fn copy_reads_its_source_and_discards_its_destination() -> TestResult {
    init_tracing();
    let cfg = ScenarioBuilder::new()
        .with_device("cuda:0", 1 << 20, 0)
        .with_buffer("A", 4, &[64], Some("host:0"))
        .with_node("upload", NodeConfigBuilder::copy("A", "host:0", "cuda:0").device("cuda:0").build())
        .build();
    validate_config(&cfg)?;

    let built = build_graph(&cfg)?;
    let graph = &built.graph;
    let upload = built.node_id("upload").expect("upload");

    let node = graph.node(upload).expect("node");
    let Operation::MemCopy(copy) = node.operation() else {
        panic!("expected a copy, got {:?}", node.operation());
    };
    assert_eq!(copy.source.device, host());
    assert_eq!(copy.dest.device, cuda(0));
    assert_eq!(copy.extent, [64, 1, 1]);

    let reqs = graph.requirements_of(upload);
    assert_eq!(reqs.len(), 2);

    let modes: Vec<_> = reqs
        .iter()
        .map(|r| {
            let req = graph.node(*r).expect("requirement");
            let access = req.operation().as_requirement().expect("buffer requirement");
            (access.mode, req.hints().bound_device())
        })
        .collect();
    assert_eq!(
        modes,
        vec![
            (AccessMode::Read, Some(host())),
            (AccessMode::DiscardWrite, Some(cuda(0))),
        ]
    );
    Ok(())
}

#[test]
fn access_windows_are_carried_into_requirements() -> TestResult {
    init_tracing();
    let cfg = ScenarioBuilder::new()
        .with_buffer("img", 4, &[32, 8], Some("host:0"))
        .with_node(
            "tile",
            NodeConfigBuilder::kernel("blur")
                .device("host:0")
                .access_window("img", "discard_write", &[8, 2], &[16, 4])
                .build(),
        )
        .build();
    validate_config(&cfg)?;

    let built = build_graph(&cfg)?;
    let graph = &built.graph;
    let tile = built.node_id("tile").expect("tile");
    let req = graph
        .node(access_requirement(graph, tile))
        .expect("requirement");
    let access = req.operation().as_requirement().expect("buffer requirement");

    assert_eq!(access.offset, [8, 2, 0]);
    assert_eq!(access.extent, [16, 4, 1]);
    assert_eq!(access.mode, AccessMode::DiscardWrite);
    assert_eq!(access.region, built.buffers["img"]);
    Ok(())
}

#[test]
fn node_without_device_has_no_binding() -> TestResult {
    init_tracing();
    let cfg = ScenarioBuilder::new()
        .with_buffer("A", 4, &[16], Some("host:0"))
        .with_node("floating", NodeConfigBuilder::kernel("k").access("A", "read").build())
        .build();
    validate_config(&cfg)?;

    let built = build_graph(&cfg)?;
    let graph = &built.graph;
    let floating = built.node_id("floating").expect("floating");

    assert_eq!(graph.node(floating).expect("node").hints().bound_device(), None);
    let req = graph.node(access_requirement(graph, floating)).expect("requirement");
    assert_eq!(req.hints().bound_device(), None);
    assert_eq!(built.name_of(floating), Some("floating"));
    Ok(())
}

#[test]
fn preferred_backend_is_attached_to_the_kernel() -> TestResult {
    init_tracing();
    let cfg = ScenarioBuilder::new()
        .with_device("hip:0", 1 << 20, 0)
        .with_node("k", NodeConfigBuilder::kernel("k").device("hip:0").preferred_backend("cuda").build())
        .build();

    let built = build_graph(&cfg)?;
    let k = built.node_id("k").expect("k");
    let op = built.graph.node(k).expect("node").operation();
    assert_eq!(op.preferred_backend(), Some(dagrt::types::BackendId::Cuda));
    Ok(())
}

#[test]
fn builder_reports_cycles_without_prior_validation() {
    init_tracing();
    let cfg = ScenarioBuilder::new()
        .with_node("a", NodeConfigBuilder::kernel("a").device("host:0").after("b").build())
        .with_node("b", NodeConfigBuilder::kernel("b").device("host:0").after("a").build())
        .build();

    let err = build_graph(&cfg).unwrap_err();
    assert!(matches!(err, RuntimeError::DagCycle(_)), "got {err:?}");
}
