// src/lib.rs

pub mod cli;
pub mod config;
pub mod dag;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod logging;
pub mod memory;
pub mod types;

use anyhow::{Result, anyhow};
use tokio::runtime::Handle;
use tracing::{debug, info};

use crate::cli::CliArgs;
use crate::config::loader::load_and_validate;
use crate::config::model::ScenarioFile;
use crate::dag::builder::build_graph;
use crate::engine::{Runtime, RuntimeOptions};

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - scenario loading and validation
/// - graph building and initial data placement
/// - the direct scheduler over simulated backends
/// - waiting for completion and printing the report
pub async fn run(args: CliArgs) -> Result<()> {
    let cfg = load_and_validate(&args.config)?;

    if args.dry_run {
        print_dry_run(&cfg)?;
        return Ok(());
    }

    let options = RuntimeOptions {
        only: args.node.clone(),
    };
    let mut runtime = Runtime::from_config(&cfg, Handle::current())?.with_options(options);
    info!(plan = ?runtime.submission_plan()?, "submitting scenario");

    let report = runtime.run().await?;
    print!("{report}");

    if !report.is_success() {
        return Err(anyhow!(
            "{} of {} node submissions failed",
            report.failures.len(),
            report.nodes.len()
        ));
    }
    Ok(())
}

/// Print devices, buffers and nodes, plus the graph the scheduler would get.
fn print_dry_run(cfg: &ScenarioFile) -> Result<()> {
    let built = build_graph(cfg)?;

    println!("dagrt dry-run");
    println!(
        "  runtime.allocation_alignment = {}",
        cfg.runtime.allocation_alignment
    );
    println!();

    println!("devices ({}):", cfg.device.len());
    for (name, device) in cfg.device.iter() {
        println!(
            "  - {name}: memory {} bytes, latency {} ms",
            device.memory, device.latency_ms
        );
    }

    println!("buffers ({}):", cfg.buffer.len());
    for (name, buffer) in cfg.buffer.iter() {
        println!(
            "  - {name}: range {:?} x {} bytes",
            buffer.range, buffer.element_size
        );
        if let Some(initial) = &buffer.initial_device {
            println!("      initial_device: {initial}");
        }
    }

    println!("nodes ({}), in submission order:", built.order.len());
    for name in built.order.iter() {
        let Some(node) = cfg.node.get(name) else {
            continue;
        };
        println!("  - {name}");
        if let Some(kernel) = &node.kernel {
            println!("      kernel: {kernel}");
        }
        if let Some(copy) = &node.copy {
            println!("      copy: {} {} -> {}", copy.buffer, copy.from, copy.to);
        }
        match &node.device {
            Some(device) => println!("      device: {device}"),
            None => println!("      device: (unbound)"),
        }
        if !node.after.is_empty() {
            println!("      after: {:?}", node.after);
        }
        for access in node.access.iter() {
            println!("      access: {} ({})", access.buffer, access.mode);
        }
        if let Some(id) = built.node_id(name) {
            println!(
                "      requirements: {}",
                built.graph.requirements_of(id).len()
            );
        }
    }

    println!("graph nodes (including implicit requirements): {}", built.graph.len());
    debug!("dry-run complete (no submission)");
    Ok(())
}
