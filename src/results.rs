use crate::{
    benchmark::{BenchmarkConfig, ScenarioOutcome},
    cli::Scenario,
    metrics::{LatencyMetrics, ResourceSummary, ThroughputMetrics},
    resources::ResourceSample,
    utils::{format_bytes, format_duration, format_table_row, format_table_separator},
};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Complete results of one scenario run against one backend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkResults {
    pub run_id: String,
    pub backend: String,
    pub scenario: Scenario,
    pub test_config: TestConfiguration,
    pub expected_deliveries: usize,
    pub delivered: usize,
    pub latency: LatencyMetrics,
    pub throughput: ThroughputMetrics,
    pub publish_errors: usize,
    pub overflow_count: usize,
    /// `None` when the sampler recorded nothing
    pub resources: Option<ResourceSummary>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Test configuration used for the scenario
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestConfiguration {
    pub topic: String,
    pub msg_count: usize,
    pub publishers: usize,
    pub subscribers: usize,
    pub queue_capacity: usize,
    pub sample_interval: Duration,
    pub completion_timeout: Duration,
}

impl BenchmarkResults {
    /// Aggregate a driver outcome and the sampler's output into results
    pub fn from_outcome(
        run_id: &str,
        backend: &str,
        scenario: Scenario,
        config: &BenchmarkConfig,
        outcome: &ScenarioOutcome,
        samples: &[ResourceSample],
    ) -> Self {
        let (publishers, subscribers) = config.shape(scenario);

        Self {
            run_id: run_id.to_string(),
            backend: backend.to_string(),
            scenario,
            test_config: TestConfiguration {
                topic: config.topic.clone(),
                msg_count: config.msg_count,
                publishers,
                subscribers,
                queue_capacity: config.queue_capacity,
                sample_interval: config.sample_interval,
                completion_timeout: config.completion_timeout,
            },
            expected_deliveries: outcome.expected,
            delivered: outcome.delivered,
            latency: LatencyMetrics::from_latencies(&outcome.latencies),
            throughput: ThroughputMetrics::new(config.msg_count, outcome.elapsed),
            publish_errors: outcome.publish_errors,
            overflow_count: outcome.overflow_count,
            resources: ResourceSummary::from_samples(samples),
            timestamp: chrono::Utc::now(),
        }
    }
}

impl fmt::Display for BenchmarkResults {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f)?;
        writeln!(f, "[{} - {}] Benchmark Results:", self.backend, self.scenario)?;
        writeln!(
            f,
            "  Total Time:   {}",
            format_duration(self.throughput.elapsed())
        )?;
        writeln!(
            f,
            "  Throughput:   {:.2} msg/sec",
            self.throughput.messages_per_second
        )?;
        writeln!(f, "  Avg Latency:  {}", format_duration(self.latency.mean()))?;
        writeln!(
            f,
            "  Deliveries:   {} of {}",
            self.delivered, self.expected_deliveries
        )?;
        if self.publish_errors > 0 {
            writeln!(f, "  Publish Errors: {}", self.publish_errors)?;
        }
        if self.overflow_count > 0 {
            writeln!(f, "  Excess Deliveries Dropped: {}", self.overflow_count)?;
        }
        writeln!(f)?;

        match &self.resources {
            Some(summary) => write_resource_table(f, summary),
            None => write!(f, "No resource samples recorded."),
        }
    }
}

fn write_resource_table(f: &mut fmt::Formatter<'_>, summary: &ResourceSummary) -> fmt::Result {
    const WIDTHS: [usize; 4] = [14, 12, 12, 12];

    writeln!(f, "Resource Usage Summary ({} samples):", summary.sample_count)?;
    writeln!(f, "{}", format_table_separator(&WIDTHS))?;
    writeln!(f, "{}", format_table_row(&["Metric", "Avg", "Min", "Max"], &WIDTHS))?;
    writeln!(f, "{}", format_table_separator(&WIDTHS))?;

    let tasks = &summary.task_count;
    writeln!(
        f,
        "{}",
        format_table_row(
            &[
                "Tasks",
                &format!("{:.0}", tasks.mean),
                &tasks.min.to_string(),
                &tasks.max.to_string(),
            ],
            &WIDTHS,
        )
    )?;

    for (name, metric) in [
        ("Heap", &summary.heap_bytes),
        ("Stack", &summary.stack_bytes),
        ("System", &summary.system_bytes),
    ] {
        writeln!(
            f,
            "{}",
            format_table_row(
                &[
                    name,
                    &format_bytes(metric.mean),
                    &format_bytes(metric.min as f64),
                    &format_bytes(metric.max as f64),
                ],
                &WIDTHS,
            )
        )?;
    }
    writeln!(f, "{}", format_table_separator(&WIDTHS))?;
    write!(
        f,
        "Reclaim cycles during run: {}",
        summary.gc_cycles_during_run
    )
}

/// System information for reproducibility
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemInfo {
    pub os: String,
    pub architecture: String,
    pub cpu_cores: usize,
    pub rust_version: String,
    pub benchmark_version: String,
}

impl SystemInfo {
    pub fn collect() -> Self {
        Self {
            os: std::env::consts::OS.to_string(),
            architecture: std::env::consts::ARCH.to_string(),
            cpu_cores: crate::utils::get_cpu_cores(),
            rust_version: env!("CARGO_PKG_RUST_VERSION").to_string(),
            benchmark_version: crate::VERSION.to_string(),
        }
    }
}

/// Results manager collecting per-scenario results and writing the JSON report
pub struct ResultsManager {
    output_file: Option<PathBuf>,
    results: Vec<BenchmarkResults>,
}

impl ResultsManager {
    /// Create a new results manager; `None` keeps results in memory only
    pub fn new(output_file: Option<&Path>) -> Self {
        Self {
            output_file: output_file.map(Path::to_path_buf),
            results: Vec::new(),
        }
    }

    /// Add benchmark results
    pub fn add_results(&mut self, results: BenchmarkResults) {
        debug!(
            "Adding results for {} / {}",
            results.backend, results.scenario
        );
        self.results.push(results);
    }

    pub fn results(&self) -> &[BenchmarkResults] {
        &self.results
    }

    /// Finalize results and write the output file if one is configured.
    ///
    /// Returns the path written, if any.
    pub fn finalize(&self) -> Result<Option<PathBuf>> {
        let path = match &self.output_file {
            Some(path) => path,
            None => return Ok(None),
        };

        info!("Finalizing benchmark results");
        let final_results = FinalBenchmarkResults {
            metadata: BenchmarkMetadata {
                version: crate::VERSION.to_string(),
                timestamp: chrono::Utc::now(),
                total_tests: self.results.len(),
                system_info: SystemInfo::collect(),
            },
            results: self.results.clone(),
            summary: self.calculate_overall_summary(),
        };

        let json = serde_json::to_string_pretty(&final_results)
            .context("Failed to serialize benchmark results")?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write results to {}", path.display()))?;

        info!("Results written to: {:?}", path);
        Ok(Some(path.clone()))
    }

    /// Calculate overall summary across all runs
    fn calculate_overall_summary(&self) -> OverallSummary {
        OverallSummary {
            total_messages: self.results.iter().map(|r| r.test_config.msg_count).sum(),
            total_deliveries: self.results.iter().map(|r| r.delivered).sum(),
            total_publish_errors: self.results.iter().map(|r| r.publish_errors).sum(),
            total_overflow: self.results.iter().map(|r| r.overflow_count).sum(),
            fastest_scenario: self
                .results
                .iter()
                .max_by(|a, b| {
                    a.throughput
                        .messages_per_second
                        .partial_cmp(&b.throughput.messages_per_second)
                        .unwrap_or(Ordering::Equal)
                })
                .map(run_name),
            lowest_latency_scenario: self
                .results
                .iter()
                .filter(|r| r.latency.total_samples > 0)
                .min_by_key(|r| r.latency.mean_ns)
                .map(run_name),
        }
    }
}

fn run_name(results: &BenchmarkResults) -> String {
    format!("{} - {}", results.backend, results.scenario)
}

/// Final benchmark results structure
#[derive(Debug, Serialize, Deserialize)]
pub struct FinalBenchmarkResults {
    pub metadata: BenchmarkMetadata,
    pub results: Vec<BenchmarkResults>,
    pub summary: OverallSummary,
}

/// Benchmark metadata
#[derive(Debug, Serialize, Deserialize)]
pub struct BenchmarkMetadata {
    pub version: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub total_tests: usize,
    pub system_info: SystemInfo,
}

/// Overall summary across all runs
#[derive(Debug, Serialize, Deserialize)]
pub struct OverallSummary {
    pub total_messages: usize,
    pub total_deliveries: usize,
    pub total_publish_errors: usize,
    pub total_overflow: usize,
    pub fastest_scenario: Option<String>,
    pub lowest_latency_scenario: Option<String>,
}
