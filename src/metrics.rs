use crate::resources::ResourceSample;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Latency statistics for one scenario run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatencyMetrics {
    pub mean_ns: u64,
    pub total_samples: usize,
}

impl LatencyMetrics {
    /// Compute the mean of a latency record.
    ///
    /// An empty record yields a zero mean rather than dividing by zero.
    pub fn from_latencies(latencies: &[Duration]) -> Self {
        let total_samples = latencies.len();
        let mean_ns = if total_samples == 0 {
            0
        } else {
            let sum: u128 = latencies.iter().map(Duration::as_nanos).sum();
            (sum / total_samples as u128) as u64
        };

        Self {
            mean_ns,
            total_samples,
        }
    }

    pub fn mean(&self) -> Duration {
        Duration::from_nanos(self.mean_ns)
    }
}

/// Throughput metrics including message rate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThroughputMetrics {
    pub messages_per_second: f64,
    pub total_messages: usize,
    pub duration_ns: u64,
}

impl ThroughputMetrics {
    pub fn new(total_messages: usize, elapsed: Duration) -> Self {
        let duration_secs = elapsed.as_secs_f64();
        let messages_per_second = if duration_secs > 0.0 {
            total_messages as f64 / duration_secs
        } else {
            0.0
        };

        Self {
            messages_per_second,
            total_messages,
            duration_ns: elapsed.as_nanos() as u64,
        }
    }

    pub fn elapsed(&self) -> Duration {
        Duration::from_nanos(self.duration_ns)
    }
}

/// Mean / min / max of one resource metric across a sample sequence
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricSummary {
    pub mean: f64,
    pub min: u64,
    pub max: u64,
}

impl MetricSummary {
    /// Summarise `values`; `None` when there is nothing to summarise
    pub fn from_values<I>(values: I) -> Option<Self>
    where
        I: IntoIterator<Item = u64>,
    {
        let mut count = 0u64;
        let mut total = 0u128;
        let mut min = u64::MAX;
        let mut max = 0u64;

        for value in values {
            count += 1;
            total += value as u128;
            min = min.min(value);
            max = max.max(value);
        }

        if count == 0 {
            return None;
        }

        Some(Self {
            mean: total as f64 / count as f64,
            min,
            max,
        })
    }
}

/// Aggregate resource usage over one scenario run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceSummary {
    pub sample_count: usize,
    pub task_count: MetricSummary,
    pub heap_bytes: MetricSummary,
    pub stack_bytes: MetricSummary,
    pub gc_cycles: MetricSummary,
    pub system_bytes: MetricSummary,
    /// Growth of the cumulative cycle counter between first and last sample
    pub gc_cycles_during_run: u64,
}

impl ResourceSummary {
    /// Aggregate a sample sequence.
    ///
    /// Returns `None` for an empty sequence, which callers report as
    /// "no samples recorded".
    pub fn from_samples(samples: &[ResourceSample]) -> Option<Self> {
        let (first, last) = match (samples.first(), samples.last()) {
            (Some(first), Some(last)) => (first, last),
            _ => return None,
        };

        Some(Self {
            sample_count: samples.len(),
            task_count: MetricSummary::from_values(samples.iter().map(|s| s.task_count as u64))?,
            heap_bytes: MetricSummary::from_values(samples.iter().map(|s| s.heap_bytes))?,
            stack_bytes: MetricSummary::from_values(samples.iter().map(|s| s.stack_bytes))?,
            gc_cycles: MetricSummary::from_values(samples.iter().map(|s| s.gc_cycles))?,
            system_bytes: MetricSummary::from_values(samples.iter().map(|s| s.system_bytes))?,
            gc_cycles_during_run: last.gc_cycles.saturating_sub(first.gc_cycles),
        })
    }
}
