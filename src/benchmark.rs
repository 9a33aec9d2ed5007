//! # Benchmark Engine Module
//!
//! This module contains the scenario drivers and the runner that wraps each
//! scenario with resource sampling and result aggregation.
//!
//! ## Key Components
//!
//! - **BenchmarkConfig**: explicit configuration passed into every driver
//! - **Scenario drivers**: [`run_sequential`], [`run_parallel`],
//!   [`run_fan_out`] and [`run_full_mesh`]
//! - **BenchmarkRunner**: creates a fresh broker per scenario, starts the
//!   resource sampler, drives the scenario, stops the sampler and aggregates
//!
//! ## Scenario Lifecycle
//!
//! 1. **Subscribe**: register S subscriptions whose handlers feed one shared
//!    [`DeliveryRecorder`]
//! 2. **Publish**: one or more publishers push N messages on the topic
//! 3. **Wait**: block on the completion latch until exactly N × S deliveries
//!    have been recorded, bounded by the completion timeout
//! 4. **Close**: close the broker, which joins every delivery task
//!
//! A failed subscription aborts the scenario before any load is generated.
//! Failed publishes are logged and counted; the scenario keeps going and the
//! timeout catches the deliveries that will never arrive.

use crate::{
    broker::{handler, Broker, Message},
    cli::{Args, Backend, Scenario},
    coordination::{DeliveryRecorder, ScenarioError},
    resources::ResourceSampler,
    results::{BenchmarkResults, ResultsManager},
    utils::{self, format_duration, format_message_rate, spawn_tracked},
};
use anyhow::{Context, Result};
use std::future::Future;
use std::ops::Range;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// A helper struct to provide a single source of truth for displaying the
/// per-scenario benchmark configuration.
struct BenchmarkConfigDisplay<'a> {
    config: &'a BenchmarkConfig,
    label: &'a str,
    scenario: Scenario,
}

impl<'a> std::fmt::Display for BenchmarkConfigDisplay<'a> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (publishers, subscribers) = self.config.shape(self.scenario);

        writeln!(
            f,
            "-----------------------------------------------------------------"
        )?;
        writeln!(f, "Running {} Benchmark ({})", self.scenario, self.label)?;
        writeln!(f, "  Topic:              {}", self.config.topic)?;
        writeln!(f, "  Message Count:      {}", self.config.msg_count)?;
        writeln!(f, "  Publishers:         {}", publishers)?;
        writeln!(f, "  Subscribers:        {}", subscribers)?;
        writeln!(
            f,
            "  Expected Deliveries: {}",
            self.config.msg_count.saturating_mul(subscribers)
        )?;
        writeln!(f, "  Queue Capacity:     {}", self.config.queue_capacity)?;
        writeln!(
            f,
            "  Sample Interval:    {}",
            format_duration(self.config.sample_interval)
        )?;
        writeln!(
            f,
            "  Completion Timeout: {}",
            format_duration(self.config.completion_timeout)
        )?;
        write!(
            f,
            "-----------------------------------------------------------------"
        )
    }
}

/// Configuration for benchmark execution
///
/// Every scenario driver receives this structure explicitly; nothing in the
/// engine reads process-wide settings.
#[derive(Clone, Debug)]
pub struct BenchmarkConfig {
    /// Backend the broker factory builds
    pub backend: Backend,

    /// Scenarios to run, already expanded (never contains `Scenario::All`)
    pub scenarios: Vec<Scenario>,

    /// Messages published per scenario (N)
    pub msg_count: usize,

    /// Concurrent publishers for the many-publisher scenarios (P)
    pub publishers: usize,

    /// Subscriptions for the many-subscriber scenarios (S)
    pub subscribers: usize,

    /// Topic every scenario publishes to
    pub topic: String,

    /// Per-subscription queue depth of the in-process broker
    pub queue_capacity: usize,

    /// Period of the resource sampler
    pub sample_interval: Duration,

    /// Upper bound on the completion wait
    ///
    /// Publishes that fail never produce a delivery, so without this bound a
    /// single failure would block the scenario forever.
    pub completion_timeout: Duration,
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        Self {
            backend: Backend::Mono,
            scenarios: vec![Scenario::Sequential, Scenario::Parallel],
            msg_count: crate::defaults::MSG_COUNT,
            publishers: crate::defaults::PUBLISHERS,
            subscribers: crate::defaults::SUBSCRIBERS,
            topic: crate::defaults::TOPIC.to_string(),
            queue_capacity: crate::defaults::QUEUE_CAPACITY,
            sample_interval: crate::defaults::SAMPLE_INTERVAL,
            completion_timeout: crate::defaults::COMPLETION_TIMEOUT,
        }
    }
}

impl BenchmarkConfig {
    /// Create benchmark configuration from CLI arguments
    ///
    /// ## Returns
    /// - `Ok(BenchmarkConfig)`: Valid configuration ready for use
    /// - `Err(anyhow::Error)`: Configuration validation failure
    pub fn from_args(args: &Args) -> Result<Self> {
        let config = Self {
            backend: args.backend,
            scenarios: Scenario::expand_all(args.scenarios.clone()),
            msg_count: args.msg_count,
            publishers: args.publishers,
            subscribers: args.subscribers,
            topic: args.topic.clone(),
            queue_capacity: args.queue_capacity,
            sample_interval: args.sample_interval,
            completion_timeout: args.timeout,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check every parameter against the limits in [`crate::utils`]
    pub fn validate(&self) -> Result<()> {
        utils::validate_msg_count(self.msg_count)?;
        utils::validate_concurrency("Publisher", self.publishers)?;
        utils::validate_concurrency("Subscriber", self.subscribers)?;
        utils::validate_queue_capacity(self.queue_capacity)?;
        utils::validate_sample_interval(self.sample_interval)?;

        if self.completion_timeout.is_zero() {
            anyhow::bail!("Completion timeout cannot be zero");
        }
        if self.scenarios.is_empty() {
            anyhow::bail!("At least one scenario must be selected");
        }
        for scenario in &self.scenarios {
            let (_, subscribers) = self.shape(*scenario);
            utils::validate_expected_total(self.msg_count, subscribers)
                .with_context(|| format!("Invalid configuration for {} scenario", scenario))?;
        }
        Ok(())
    }

    /// Publisher and subscriber counts a scenario runs with
    pub fn shape(&self, scenario: Scenario) -> (usize, usize) {
        match scenario {
            Scenario::Sequential => (1, 1),
            Scenario::Parallel => (self.publishers, 1),
            Scenario::FanOut => (1, self.subscribers),
            Scenario::FullMesh | Scenario::All => (self.publishers, self.subscribers),
        }
    }

    /// Total deliveries a scenario must observe before it completes
    pub fn expected_deliveries(&self, scenario: Scenario) -> usize {
        let (_, subscribers) = self.shape(scenario);
        self.msg_count.saturating_mul(subscribers)
    }
}

/// Raw timing data produced by one scenario driver
#[derive(Debug, Clone)]
pub struct ScenarioOutcome {
    /// Deliveries the scenario waited for (N × S)
    pub expected: usize,
    /// Deliveries accepted by the recorder
    pub delivered: usize,
    /// Scenario start to completion signal
    pub elapsed: Duration,
    /// Latency record, index = arrival order
    pub latencies: Vec<Duration>,
    pub publish_errors: usize,
    /// Deliveries dropped because the expected total had already been reached
    pub overflow_count: usize,
    pub completion_signals: usize,
}

/// Split `0..msg_count` into `publishers` contiguous, disjoint slices.
///
/// The first `msg_count % publishers` slices carry one extra message, so the
/// slices always cover the whole range. Returns no slices for zero publishers.
pub fn publisher_slices(msg_count: usize, publishers: usize) -> Vec<Range<usize>> {
    if publishers == 0 {
        return Vec::new();
    }

    let base = msg_count / publishers;
    let extra = msg_count % publishers;
    let mut slices = Vec::with_capacity(publishers);
    let mut start = 0;

    for i in 0..publishers {
        let len = base + usize::from(i < extra);
        slices.push(start..start + len);
        start += len;
    }
    slices
}

/// Sequential: one publisher, one subscription, messages published in order
/// by the calling task.
pub async fn run_sequential(
    broker: Arc<dyn Broker>,
    label: &str,
    config: &BenchmarkConfig,
) -> Result<ScenarioOutcome, ScenarioError> {
    drive(broker, label, config, 1, 1).await
}

/// Parallel: P concurrent publishers, one subscription.
pub async fn run_parallel(
    broker: Arc<dyn Broker>,
    label: &str,
    config: &BenchmarkConfig,
) -> Result<ScenarioOutcome, ScenarioError> {
    drive(broker, label, config, config.publishers, 1).await
}

/// Fan-out: one publisher, S subscriptions; expects N × S deliveries.
pub async fn run_fan_out(
    broker: Arc<dyn Broker>,
    label: &str,
    config: &BenchmarkConfig,
) -> Result<ScenarioOutcome, ScenarioError> {
    drive(broker, label, config, 1, config.subscribers).await
}

/// Full mesh: P publishers, S subscriptions; expects N × S deliveries.
pub async fn run_full_mesh(
    broker: Arc<dyn Broker>,
    label: &str,
    config: &BenchmarkConfig,
) -> Result<ScenarioOutcome, ScenarioError> {
    drive(broker, label, config, config.publishers, config.subscribers).await
}

/// Dispatch to the driver for `scenario`
pub async fn drive_scenario(
    scenario: Scenario,
    broker: Arc<dyn Broker>,
    label: &str,
    config: &BenchmarkConfig,
) -> Result<ScenarioOutcome, ScenarioError> {
    match scenario {
        Scenario::Sequential => run_sequential(broker, label, config).await,
        Scenario::Parallel => run_parallel(broker, label, config).await,
        Scenario::FanOut => run_fan_out(broker, label, config).await,
        Scenario::FullMesh => run_full_mesh(broker, label, config).await,
        Scenario::All => Err(ScenarioError::InvalidConfig(
            "'all' must be expanded into concrete scenarios before running".to_string(),
        )),
    }
}

async fn drive(
    broker: Arc<dyn Broker>,
    label: &str,
    config: &BenchmarkConfig,
    publishers: usize,
    subscribers: usize,
) -> Result<ScenarioOutcome, ScenarioError> {
    if config.msg_count == 0 || publishers == 0 || subscribers == 0 {
        return Err(ScenarioError::InvalidConfig(format!(
            "need at least one message, publisher and subscriber (got {}, {}, {})",
            config.msg_count, publishers, subscribers
        )));
    }
    let expected = config.msg_count.checked_mul(subscribers).ok_or_else(|| {
        ScenarioError::InvalidConfig(format!(
            "{} messages x {} subscribers overflows",
            config.msg_count, subscribers
        ))
    })?;

    let start = Instant::now();
    let recorder = Arc::new(DeliveryRecorder::new(expected, start));

    for _ in 0..subscribers {
        let recorder = recorder.clone();
        let backend = label.to_string();
        let on_message = handler(move |_message| {
            if let Err(e) = recorder.record() {
                error!("[{}] Dropped excess delivery: {}", backend, e);
            }
        });

        if let Err(source) = broker.subscribe(&config.topic, on_message).await {
            close_broker(broker.as_ref(), label).await;
            return Err(ScenarioError::Subscription {
                backend: label.to_string(),
                source,
            });
        }
    }
    debug!("[{}] {} subscription(s) registered", label, subscribers);

    let publish_errors = if publishers == 1 {
        publish_range(broker.as_ref(), &config.topic, 0..config.msg_count).await
    } else {
        publish_concurrently(&broker, &config.topic, config.msg_count, publishers).await
    };
    if publish_errors > 0 {
        warn!(
            "[{}] {} of {} publishes failed",
            label, publish_errors, config.msg_count
        );
    }

    let waited = recorder
        .latch()
        .wait_timeout(config.completion_timeout)
        .await;
    let elapsed = start.elapsed();

    close_broker(broker.as_ref(), label).await;
    waited?;

    let latch = recorder.latch();
    let overflow_count = latch.overflow_count();
    if overflow_count > 0 {
        error!(
            "[{}] {} deliveries arrived after the expected {} were recorded",
            label, overflow_count, expected
        );
    }

    Ok(ScenarioOutcome {
        expected,
        delivered: latch.observed(),
        elapsed,
        latencies: recorder.latencies(),
        publish_errors,
        overflow_count,
        completion_signals: latch.completion_signals(),
    })
}

/// Publish `range` in order from the current task; returns the failure count
async fn publish_range(broker: &dyn Broker, topic: &str, range: Range<usize>) -> usize {
    let mut failures = 0;
    for i in range {
        if let Err(e) = broker.publish(topic, Message::indexed(i)).await {
            warn!("[Publisher] Failed to send message {}: {}", i, e);
            failures += 1;
        }
    }
    failures
}

async fn publish_concurrently(
    broker: &Arc<dyn Broker>,
    topic: &str,
    msg_count: usize,
    publishers: usize,
) -> usize {
    let mut tasks = Vec::with_capacity(publishers);
    for slice in publisher_slices(msg_count, publishers) {
        let broker = broker.clone();
        let topic = topic.to_string();
        let len = slice.len();
        let task =
            spawn_tracked(async move { publish_range(broker.as_ref(), &topic, slice).await });
        tasks.push((task, len));
    }

    let mut failures = 0;
    for (task, len) in tasks {
        match task.await {
            Ok(count) => failures += count,
            Err(e) => {
                error!("Publisher task failed: {}", e);
                failures += len;
            }
        }
    }
    failures
}

async fn close_broker(broker: &dyn Broker, label: &str) {
    if let Err(e) = broker.close().await {
        warn!("[{}] Failed to close broker: {}", label, e);
    }
}

/// Benchmark runner that wraps scenario drivers with sampling and aggregation
///
/// ## Usage Pattern
///
/// ```rust,no_run
/// # use pubsub_bench::benchmark::{BenchmarkConfig, BenchmarkRunner};
/// # use pubsub_bench::broker::{Broker, InProcessBroker};
/// # use pubsub_bench::cli::Scenario;
/// # use std::sync::Arc;
/// #
/// # #[tokio::main]
/// # async fn main() -> anyhow::Result<()> {
/// let config = BenchmarkConfig {
///     msg_count: 10_000,
///     publishers: 10,
///     ..BenchmarkConfig::default()
/// };
/// let runner = BenchmarkRunner::new(config, "Mono");
/// let results = runner
///     .run_scenario(Scenario::Parallel, || async {
///         Ok(Arc::new(InProcessBroker::new()) as Arc<dyn Broker>)
///     })
///     .await?;
/// println!("{}", results);
/// # Ok(())
/// # }
/// ```
pub struct BenchmarkRunner {
    config: BenchmarkConfig,
    label: String,
    run_id: String,
}

impl BenchmarkRunner {
    /// Create a new benchmark runner
    ///
    /// ## Parameters
    /// - `config`: Benchmark configuration parameters
    /// - `label`: Backend label printed with every result
    pub fn new(config: BenchmarkConfig, label: impl Into<String>) -> Self {
        Self {
            config,
            label: label.into(),
            run_id: utils::generate_run_id(),
        }
    }

    pub fn config(&self) -> &BenchmarkConfig {
        &self.config
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Identifier shared by every result this runner produces
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Run one scenario against a freshly created broker
    ///
    /// The resource sampler runs for exactly the duration of the scenario and
    /// is stopped before the driver's outcome is inspected, so a failing
    /// scenario never leaves a sampler behind.
    pub async fn run_scenario<F, Fut>(
        &self,
        scenario: Scenario,
        factory: F,
    ) -> Result<BenchmarkResults>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Arc<dyn Broker>>>,
    {
        info!(
            "{}",
            BenchmarkConfigDisplay {
                config: &self.config,
                label: &self.label,
                scenario,
            }
        );

        let broker = factory()
            .await
            .with_context(|| format!("Failed to create {} broker", self.label))?;

        let sampler = ResourceSampler::start(self.config.sample_interval);
        let wall_start = Instant::now();
        let outcome = drive_scenario(scenario, broker, &self.label, &self.config).await;
        let wall_elapsed = wall_start.elapsed();
        let samples = sampler.stop().await?;

        let outcome = outcome
            .with_context(|| format!("{} scenario failed for {}", scenario, self.label))?;

        let results = BenchmarkResults::from_outcome(
            &self.run_id,
            &self.label,
            scenario,
            &self.config,
            &outcome,
            &samples,
        );
        info!(
            "Benchmark '{}' completed in {} ({})",
            scenario,
            format_duration(wall_elapsed),
            format_message_rate(results.throughput.messages_per_second)
        );
        Ok(results)
    }

    /// Run every configured scenario in order, creating a fresh broker each
    /// time. Stops at the first failure.
    pub async fn run<F, Fut>(
        &self,
        factory: F,
        mut results_manager: Option<&mut ResultsManager>,
    ) -> Result<Vec<BenchmarkResults>>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<Arc<dyn Broker>>>,
    {
        info!("Starting benchmarks for {}...", self.label);

        let mut all_results = Vec::with_capacity(self.config.scenarios.len());
        for scenario in &self.config.scenarios {
            let results = self.run_scenario(*scenario, &factory).await?;
            println!("{}", results);
            if let Some(manager) = results_manager.as_deref_mut() {
                manager.add_results(results.clone());
            }
            all_results.push(results);
        }
        Ok(all_results)
    }
}

/// Run every scenario in `config` against brokers produced by `factory`,
/// printing each result as it completes.
pub async fn run_benchmarks<F, Fut>(
    label: &str,
    config: &BenchmarkConfig,
    factory: F,
) -> Result<Vec<BenchmarkResults>>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<Arc<dyn Broker>>>,
{
    BenchmarkRunner::new(config.clone(), label)
        .run(factory, None)
        .await
}
