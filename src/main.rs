//! # Pub/Sub Benchmark Suite - Main Entry Point
//!
//! The main function performs these key operations:
//! 1. **Parse arguments**: Processes command-line configuration
//! 2. **Initialize logging**: colored, level-filtered output via tracing
//! 3. **Create benchmark config**: Converts CLI args to a validated config
//! 4. **Run scenarios**: each against a fresh broker from the factory
//! 5. **Generate results**: prints each result and optionally writes JSON
//!
//! ## Error Handling
//!
//! Depending on the `--continue-on-error` flag, the application either stops
//! at the first failing scenario (default) or runs the remaining scenarios
//! and reports what succeeded.

use anyhow::Result;
use clap::Parser;
use pubsub_bench::{
    benchmark::{BenchmarkConfig, BenchmarkRunner},
    broker::{Broker, BrokerFactory},
    cli::Args,
    logging,
    results::ResultsManager,
};
use std::sync::Arc;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    logging::init_logging(args.verbose);

    info!("Starting Pub/Sub Benchmark Suite v{}", pubsub_bench::VERSION);

    let config = BenchmarkConfig::from_args(&args)?;
    let mut results_manager = ResultsManager::new(args.output_file.as_deref());

    let backend = config.backend;
    let queue_capacity = config.queue_capacity;
    let runner = BenchmarkRunner::new(config.clone(), backend.to_string());
    let factory = move || async move {
        Ok::<Arc<dyn Broker>, _>(BrokerFactory::create(&backend, queue_capacity))
    };

    info!("Starting benchmarks for {} (run {})...", runner.label(), runner.run_id());

    let mut failures = 0;
    for scenario in &config.scenarios {
        match runner.run_scenario(*scenario, factory).await {
            Ok(results) => {
                println!("{}", results);
                results_manager.add_results(results);
            }
            Err(e) => {
                error!("{} benchmark failed: {:#}", scenario, e);
                failures += 1;
                if !args.continue_on_error {
                    return Err(e);
                }
            }
        }
    }

    results_manager.finalize()?;

    if failures > 0 {
        anyhow::bail!("{} of {} scenarios failed", failures, config.scenarios.len());
    }
    info!("Pub/Sub Benchmark Suite completed successfully");
    Ok(())
}
