// tests/scenario_runtime.rs

use std::path::PathBuf;

use tokio::runtime::Handle;

use dagrt::config::{ScenarioFile, load_and_validate, validate_config};
use dagrt::dag::NodeStatus;
use dagrt::engine::{Runtime, RuntimeOptions};
use dagrt::memory::Rect;
use dagrt_test_utils::builders::{NodeConfigBuilder, ScenarioBuilder, cuda, host};
use dagrt_test_utils::{TestResult, init_tracing, with_timeout};

fn pipeline(cuda_memory: usize) -> ScenarioFile {
    ScenarioBuilder::new()
        .with_device("cuda:0", cuda_memory, 1)
        .with_buffer("A", 4, &[256], Some("host:0"))
        .with_node(
            "scale",
            NodeConfigBuilder::kernel("scale")
                .device("cuda:0")
                .access("A", "read_write")
                .build(),
        )
        .with_node(
            "download",
            NodeConfigBuilder::copy("A", "cuda:0", "host:0")
                .device("host:0")
                .after("scale")
                .build(),
        )
        .with_node(
            "check",
            NodeConfigBuilder::kernel("check")
                .device("host:0")
                .after("download")
                .access("A", "read")
                .build(),
        )
        .build()
}

#[tokio::test]
async fn pipeline_round_trips_through_the_device() -> TestResult {
    init_tracing();
    let cfg = pipeline(1 << 20);
    validate_config(&cfg)?;

    let mut runtime = Runtime::from_config(&cfg, Handle::current())?;
    let report = with_timeout(runtime.run()).await?;

    assert!(report.is_success(), "{report}");
    // upload, scale, download, check
    assert_eq!(report.dispatches, 4);
    assert_eq!(report.transfers, 2);
    for name in ["scale", "download", "check"] {
        assert_eq!(report.status_of(name), Some(NodeStatus::Complete), "{name}");
    }

    let buffer = report.buffer("A").expect("buffer A");
    let full = Rect::from_extent([256, 1, 1]);
    let on_host = buffer.devices.iter().find(|d| d.device == host()).expect("host copy");
    assert_eq!(on_host.current, vec![full]);
    let on_cuda = buffer.devices.iter().find(|d| d.device == cuda(0)).expect("device copy");
    // The download only read the device copy.
    assert_eq!(on_cuda.valid, vec![full]);
    assert!(on_cuda.current.is_empty());

    let rendered = report.to_string();
    assert!(rendered.contains("dispatched 4 operations (2 transfers)"), "{rendered}");
    assert!(rendered.contains("scale [complete] on cuda:0"), "{rendered}");
    Ok(())
}

#[tokio::test]
async fn only_the_requested_node_and_its_ancestors_run() -> TestResult {
    init_tracing();
    let cfg = pipeline(1 << 20);

    let mut runtime = Runtime::from_config(&cfg, Handle::current())?.with_options(RuntimeOptions {
        only: Some("download".to_string()),
    });
    assert_eq!(runtime.submission_plan()?, vec!["scale", "download"]);

    let report = with_timeout(runtime.run()).await?;
    assert_eq!(report.status_of("scale"), Some(NodeStatus::Complete));
    assert_eq!(report.status_of("download"), Some(NodeStatus::Complete));
    assert_eq!(report.status_of("check"), Some(NodeStatus::Unsubmitted));
    assert_eq!(report.dispatches, 3);
    Ok(())
}

#[tokio::test]
async fn unknown_requested_node_is_a_config_error() -> TestResult {
    init_tracing();
    let cfg = pipeline(1 << 20);
    let runtime = Runtime::from_config(&cfg, Handle::current())?.with_options(RuntimeOptions {
        only: Some("nope".to_string()),
    });

    let err = runtime.submission_plan().unwrap_err();
    assert!(err.to_string().contains("unknown node 'nope'"), "{err}");
    Ok(())
}

#[tokio::test]
async fn unbound_node_fails_while_the_rest_completes() -> TestResult {
    init_tracing();
    let cfg = ScenarioBuilder::new()
        .with_buffer("A", 4, &[64], Some("host:0"))
        .with_node("first", NodeConfigBuilder::kernel("first").device("host:0").access("A", "read").build())
        .with_node("orphan", NodeConfigBuilder::kernel("orphan").after("first").access("A", "read").build())
        .build();
    validate_config(&cfg)?;

    let mut runtime = Runtime::from_config(&cfg, Handle::current())?;
    let report = with_timeout(runtime.run()).await?;

    assert!(!report.is_success());
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].name, "orphan");
    assert!(report.failures[0].message.contains("not bound to devices"));
    assert_eq!(report.status_of("orphan"), Some(NodeStatus::Cancelled));
    assert_eq!(report.status_of("first"), Some(NodeStatus::Complete));

    let errors = runtime.error_log().records();
    assert_eq!(errors.len(), 1);
    Ok(())
}

#[tokio::test]
async fn device_out_of_memory_is_reported_as_allocation_failure() -> TestResult {
    init_tracing();
    // The buffer needs 1024 bytes.
    let cfg = pipeline(512);

    let mut runtime = Runtime::from_config(&cfg, Handle::current())?;
    let report = with_timeout(runtime.run()).await?;

    assert_eq!(report.failures[0].name, "scale");
    assert!(
        report.failures[0].message.contains("allocation"),
        "{}",
        report.failures[0].message
    );
    assert_eq!(report.status_of("scale"), Some(NodeStatus::Cancelled));
    // Everything downstream depends on the cancelled node.
    assert_eq!(report.failures.len(), 3);
    assert_eq!(report.dispatches, 0);
    Ok(())
}

#[tokio::test]
async fn split_ownership_demo_gathers_both_halves() -> TestResult {
    init_tracing();
    let manifest = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    let cfg = load_and_validate(manifest.join("demos/split-ownership.toml"))?;

    let mut runtime = Runtime::from_config(&cfg, Handle::current())?;
    let report = with_timeout(runtime.run()).await?;

    assert!(report.is_success(), "{report}");
    assert_eq!(report.transfers, 2);
    assert_eq!(report.dispatches, 5);

    let field = report.buffer("field").expect("field");
    let on_host = field.devices.iter().find(|d| d.device == host()).expect("host copy");
    assert_eq!(on_host.valid, vec![Rect::from_extent([64, 4, 1])]);
    assert!(on_host.current.is_empty());
    Ok(())
}
