// tests/config_errors.rs

use std::io::Write;
use std::path::PathBuf;

use tempfile::NamedTempFile;

use dagrt::config::{load_and_validate, load_from_path};
use dagrt::errors::RuntimeError;
use dagrt_test_utils::{TestResult, init_tracing};

fn scenario(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("temp file");
    file.write_all(contents.as_bytes()).expect("write scenario");
    file
}

fn config_error(contents: &str) -> String {
    let file = scenario(contents);
    match load_and_validate(file.path()) {
        Err(RuntimeError::ConfigError(message)) => message,
        other => panic!("expected a config error, got {other:?}"),
    }
}

#[test]
fn demo_scenarios_load_and_validate() -> TestResult {
    init_tracing();
    let manifest = PathBuf::from(env!("CARGO_MANIFEST_DIR"));

    let cfg = load_and_validate(manifest.join("demos/pipeline.toml"))?;
    assert_eq!(cfg.runtime.allocation_alignment, 128);
    assert_eq!(cfg.device["cuda:0"].latency_ms, 2);
    assert_eq!(cfg.buffer["A"].initial_device.as_deref(), Some("host:0"));
    assert_eq!(cfg.node["download"].after, vec!["scale".to_string()]);

    let cfg = load_and_validate(manifest.join("demos/split-ownership.toml"))?;
    assert_eq!(cfg.node.len(), 3);
    assert_eq!(cfg.buffer["field"].num_elements(), Some([64, 4, 1]));
    Ok(())
}

#[test]
fn defaults_fill_in_missing_fields() -> TestResult {
    init_tracing();
    let file = scenario(
        r#"
[device."hip:0"]

[buffer.B]
element_size = 2
range = [8, 8]

[node.k]
kernel = "k"
device = "hip:0"
access = [{ buffer = "B" }]
"#,
    );

    let cfg = load_and_validate(file.path())?;
    assert_eq!(cfg.runtime.allocation_alignment, 128);
    assert_eq!(cfg.device["hip:0"].memory, 1 << 30);
    assert_eq!(cfg.node["k"].access[0].mode, "read_write");
    assert!(cfg.buffer["B"].initial_device.is_none());
    Ok(())
}

#[test]
fn cycle_in_after_edges_is_rejected() {
    init_tracing();
    let file = scenario(
        r#"
[node.a]
kernel = "a"
device = "host:0"
after = ["c"]

[node.b]
kernel = "b"
device = "host:0"
after = ["a"]

[node.c]
kernel = "c"
device = "host:0"
after = ["b"]
"#,
    );

    match load_and_validate(file.path()) {
        Err(RuntimeError::DagCycle(message)) => assert!(message.contains("cycle detected")),
        other => panic!("expected a cycle error, got {other:?}"),
    }
}

#[test]
fn unknown_after_dependency_is_rejected() {
    init_tracing();
    let message = config_error(
        r#"
[node.a]
kernel = "a"
device = "host:0"
after = ["ghost"]
"#,
    );
    assert!(message.contains("unknown dependency 'ghost'"), "{message}");
}

#[test]
fn self_dependency_is_rejected() {
    init_tracing();
    let message = config_error(
        r#"
[node.a]
kernel = "a"
device = "host:0"
after = ["a"]
"#,
    );
    assert!(message.contains("cannot depend on itself"), "{message}");
}

#[test]
fn node_must_be_exactly_one_of_kernel_or_copy() {
    init_tracing();
    let both = config_error(
        r#"
[buffer.A]
element_size = 4
range = [4]

[node.x]
kernel = "k"
copy = { buffer = "A", from = "host:0", to = "host:0" }
device = "host:0"
"#,
    );
    assert!(both.contains("exactly one of"), "{both}");

    let neither = config_error(
        r#"
[node.x]
device = "host:0"
"#,
    );
    assert!(neither.contains("must set one of"), "{neither}");
}

#[test]
fn unknown_buffer_is_rejected() {
    init_tracing();
    let message = config_error(
        r#"
[node.k]
kernel = "k"
device = "host:0"
access = [{ buffer = "missing", mode = "read" }]
"#,
    );
    assert!(message.contains("unknown buffer 'missing'"), "{message}");
}

#[test]
fn undeclared_device_is_rejected() {
    init_tracing();
    let message = config_error(
        r#"
[node.k]
kernel = "k"
device = "cuda:3"
"#,
    );
    assert!(message.contains("unknown device"), "{message}");
}

#[test]
fn window_outside_the_buffer_is_rejected() {
    init_tracing();
    let message = config_error(
        r#"
[buffer.A]
element_size = 4
range = [16]

[node.k]
kernel = "k"
device = "host:0"
access = [{ buffer = "A", mode = "read", offset = [8], extent = [16] }]
"#,
    );
    assert!(message.contains("does not fit"), "{message}");
}

#[test]
fn buffer_too_large_to_allocate_is_rejected() {
    init_tracing();
    let message = config_error(
        r#"
[buffer.huge]
element_size = 4
range = [1099511627776, 1099511627776]

[node.k]
kernel = "k"
device = "host:0"
access = [{ buffer = "huge", mode = "read" }]
"#,
    );
    assert!(message.contains("too large to allocate"), "{message}");
}

#[test]
fn invalid_access_mode_is_rejected() {
    init_tracing();
    let message = config_error(
        r#"
[buffer.A]
element_size = 4
range = [16]

[node.k]
kernel = "k"
device = "host:0"
access = [{ buffer = "A", mode = "sometimes" }]
"#,
    );
    assert!(message.contains("invalid access mode"), "{message}");
}

#[test]
fn alignment_must_be_a_power_of_two() {
    init_tracing();
    let message = config_error(
        r#"
[runtime]
allocation_alignment = 96

[node.k]
kernel = "k"
device = "host:0"
"#,
    );
    assert!(message.contains("power of two"), "{message}");
}

#[test]
fn scenario_without_nodes_is_rejected() {
    init_tracing();
    let message = config_error(
        r#"
[buffer.A]
element_size = 4
range = [16]
"#,
    );
    assert!(message.contains("at least one"), "{message}");
}

#[test]
fn malformed_toml_surfaces_as_toml_error() {
    init_tracing();
    let file = scenario("[node.k\nkernel = ");
    let err = load_from_path(file.path()).unwrap_err();
    assert!(matches!(err, RuntimeError::TomlError(_)), "got {err:?}");
}

#[test]
fn missing_file_surfaces_as_io_error() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let err = load_and_validate(dir.path().join("absent.toml")).unwrap_err();
    assert!(matches!(err, RuntimeError::IoError(_)), "got {err:?}");
    Ok(())
}
