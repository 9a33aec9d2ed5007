//! # Pub/Sub Benchmark Suite Library
//!
//! Measures throughput, latency and resource consumption of publish/subscribe
//! message delivery across interchangeable broker backends.
//!
//! ## Architecture Overview
//!
//! - `broker`: the publish / subscribe / close contract and the in-process
//!   reference backend
//! - `benchmark`: scenario drivers (sequential, parallel, fan-out, full mesh)
//!   and the runner that wraps them with resource sampling
//! - `coordination`: the completion latch and latency recorder that make the
//!   exact-count completion wait race-free
//! - `resources`: the independently scheduled resource sampler
//! - `metrics`: throughput, mean latency and resource summaries
//! - `results`: printed and JSON result output
//! - `cli`, `logging`, `utils`: command line, log formatting and helpers
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use pubsub_bench::{run_benchmarks, BenchmarkConfig, Broker, InProcessBroker};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = BenchmarkConfig {
//!         msg_count: 100_000,
//!         publishers: 10,
//!         ..BenchmarkConfig::default()
//!     };
//!
//!     let results = run_benchmarks("Mono", &config, || async {
//!         Ok(Arc::new(InProcessBroker::new()) as Arc<dyn Broker>)
//!     })
//!     .await?;
//!
//!     for result in &results {
//!         println!("{}: {:?}", result.scenario, result.latency.mean());
//!     }
//!     Ok(())
//! }
//! ```

/// Scenario drivers and the benchmark runner
///
/// Each scenario subscribes, publishes a fixed number of messages, waits for
/// exactly the expected number of deliveries and closes its broker.
pub mod benchmark;

/// Broker contract and backends
pub mod broker;

/// Command-line interface and configuration
///
/// Provides argument parsing using clap, including human-readable durations
/// ("10ms", "5s") and "all" expansion for scenarios.
pub mod cli;

/// Completion latch and latency recorder
pub mod coordination;

pub mod logging;

/// Throughput, latency and resource statistics
pub mod metrics;

/// Resource sampling running alongside each scenario
pub mod resources;

/// Result collection, printing and JSON output
pub mod results;

pub mod utils;

pub use benchmark::{run_benchmarks, BenchmarkConfig, BenchmarkRunner};
pub use broker::{Broker, BrokerError, BrokerFactory, Handler, InProcessBroker, Message};
pub use cli::{Args, Backend, Scenario};
pub use coordination::{CompletionLatch, DeliveryRecorder, ScenarioError};
pub use metrics::{LatencyMetrics, ResourceSummary, ThroughputMetrics};
pub use resources::{ResourceSample, ResourceSampler};
pub use results::{BenchmarkResults, ResultsManager};

/// The current version of the pub/sub benchmark suite
///
/// Populated from Cargo.toml and written into the JSON results metadata.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default configuration values
pub mod defaults {
    use std::time::Duration;

    /// Messages published per scenario
    pub const MSG_COUNT: usize = 1_000_000;

    /// Concurrent publishers in the parallel and full-mesh scenarios
    pub const PUBLISHERS: usize = 100;

    /// Subscriptions in the fan-out and full-mesh scenarios
    pub const SUBSCRIBERS: usize = 100;

    pub const TOPIC: &str = "benchmark";

    /// Per-subscription queue depth of the in-process broker
    pub const QUEUE_CAPACITY: usize = crate::broker::in_process::DEFAULT_QUEUE_CAPACITY;

    /// Resource sampling period
    pub const SAMPLE_INTERVAL: Duration = Duration::from_millis(10);

    /// How long a scenario waits for its deliveries before giving up
    pub const COMPLETION_TIMEOUT: Duration = Duration::from_secs(300);
}
