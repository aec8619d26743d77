// src/main.rs

use dagrt::errors::RuntimeError;
use dagrt::{cli, logging, run};

/// Exit code for scenarios that could not be loaded or validated.
const EXIT_BAD_SCENARIO: i32 = 2;

#[tokio::main]
async fn main() {
    if let Err(err) = run_main().await {
        eprintln!("dagrt error: {err:?}");
        std::process::exit(exit_code(&err));
    }
}

async fn run_main() -> anyhow::Result<()> {
    let args = cli::parse();
    logging::init_logging(args.log_level)?;
    run(args).await
}

fn exit_code(err: &anyhow::Error) -> i32 {
    match err.downcast_ref::<RuntimeError>() {
        Some(
            RuntimeError::ConfigError(_)
            | RuntimeError::DagCycle(_)
            | RuntimeError::TomlError(_)
            | RuntimeError::IoError(_),
        ) => EXIT_BAD_SCENARIO,
        _ => 1,
    }
}
