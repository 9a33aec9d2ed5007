//! # Utility Functions and Helper Module
//!
//! Helpers shared across the pub/sub benchmark harness:
//!
//! - **Task tracking**: spawning tasks that are counted by the resource sampler
//! - **Formatting**: human-readable durations, byte sizes and message rates
//! - **Validation**: configuration checks with clear error messages
//! - **System Information**: CPU core detection
//! - **Display Helpers**: plain-text table rendering for the resource summary
//!
//! ## Usage Examples
//!
//! ```rust
//! use pubsub_bench::utils::*;
//! use std::time::Duration;
//!
//! # fn main() -> anyhow::Result<()> {
//! let duration_str = format_duration(Duration::from_micros(1500));
//! assert_eq!(duration_str, "1.50ms");
//!
//! let rate_str = format_message_rate(2_300_000.0);
//! assert_eq!(rate_str, "2.30M msg/s");
//!
//! validate_msg_count(1000)?;
//! # Ok(())
//! # }
//! ```

use crate::resources::TaskGuard;
use anyhow::Result;
use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Spawn a task on the current Tokio runtime and count it as live.
///
/// The task is counted from the moment it is spawned until its future
/// completes or is dropped, which is what the resource sampler reports as the
/// concurrent task count. Every publisher, delivery and sampler task in the
/// harness goes through this function.
///
/// ## Panics
///
/// Panics if called outside a Tokio runtime, exactly like `tokio::spawn`.
pub fn spawn_tracked<F>(future: F) -> JoinHandle<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    let guard = TaskGuard::enter();
    tokio::spawn(async move {
        let _guard = guard;
        future.await
    })
}

/// Generate a unique identifier for a benchmark run
///
/// Creates a UUID v4 string used to correlate the printed report with the
/// JSON results file and log lines of the same invocation.
pub fn generate_run_id() -> String {
    Uuid::new_v4().to_string()
}

/// Format a duration in a human-readable way
///
/// Automatically selects the most appropriate unit:
///
/// - **Nanoseconds**: < 1,000 ns (e.g., "500ns")
/// - **Microseconds**: < 1,000,000 ns (e.g., "1.50μs")
/// - **Milliseconds**: < 1,000,000,000 ns (e.g., "25.75ms")
/// - **Seconds**: < 60 seconds (e.g., "5.25s")
/// - **Minutes and Hours**: for longer durations (e.g., "5m 30s", "2h 15m 30s")
///
/// ## Examples
///
/// ```rust
/// # use pubsub_bench::utils::format_duration;
/// # use std::time::Duration;
/// assert_eq!(format_duration(Duration::from_nanos(750)), "750ns");
/// assert_eq!(format_duration(Duration::from_nanos(1250)), "1.25μs");
/// assert_eq!(format_duration(Duration::from_micros(2500)), "2.50ms");
/// assert_eq!(format_duration(Duration::from_secs(90)), "1m 30s");
/// ```
pub fn format_duration(duration: Duration) -> String {
    let total_ns = duration.as_nanos();

    if total_ns < 1_000 {
        format!("{}ns", total_ns)
    } else if total_ns < 1_000_000 {
        format!("{:.2}μs", total_ns as f64 / 1_000.0)
    } else if total_ns < 1_000_000_000 {
        format!("{:.2}ms", total_ns as f64 / 1_000_000.0)
    } else if total_ns < 60_000_000_000 {
        format!("{:.2}s", total_ns as f64 / 1_000_000_000.0)
    } else {
        let seconds = duration.as_secs();
        let minutes = seconds / 60;
        let remaining_seconds = seconds % 60;

        if minutes < 60 {
            format!("{}m {}s", minutes, remaining_seconds)
        } else {
            let hours = minutes / 60;
            let remaining_minutes = minutes % 60;
            format!("{}h {}m {}s", hours, remaining_minutes, remaining_seconds)
        }
    }
}

/// Format bytes in a human-readable way using binary (1024-based) units
///
/// ```rust
/// # use pubsub_bench::utils::format_bytes;
/// assert_eq!(format_bytes(512.0), "512 B");
/// assert_eq!(format_bytes(1536.0), "1.50 KB");
/// assert_eq!(format_bytes(2621440.0), "2.50 MB");
/// ```
pub fn format_bytes(bytes: f64) -> String {
    if bytes < 1024.0 {
        format!("{:.0} B", bytes)
    } else if bytes < 1024.0 * 1024.0 {
        format!("{:.2} KB", bytes / 1024.0)
    } else if bytes < 1024.0 * 1024.0 * 1024.0 {
        format!("{:.2} MB", bytes / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes / (1024.0 * 1024.0 * 1024.0))
    }
}

/// Format a message rate in a human-readable way
///
/// Uses decimal scaling (powers of 1000):
/// - Messages/sec: < 1,000 (e.g., "750 msg/s")
/// - Thousands: < 1,000,000 (e.g., "15.50K msg/s")
/// - Millions: ≥ 1,000,000 (e.g., "2.30M msg/s")
pub fn format_message_rate(messages_per_second: f64) -> String {
    if messages_per_second < 1000.0 {
        format!("{:.0} msg/s", messages_per_second)
    } else if messages_per_second < 1_000_000.0 {
        format!("{:.2}K msg/s", messages_per_second / 1000.0)
    } else {
        format!("{:.2}M msg/s", messages_per_second / 1_000_000.0)
    }
}

/// Validate the number of messages a scenario publishes
///
/// ## Validation Rules
///
/// - **Minimum**: 1 message (a run with nothing to deliver measures nothing)
/// - **Maximum**: 100,000,000 messages, since the latency record is
///   pre-allocated and fan-out multiplies it by the subscriber count
pub fn validate_msg_count(msg_count: usize) -> Result<()> {
    if msg_count == 0 {
        anyhow::bail!("Message count cannot be zero");
    }
    if msg_count > 100_000_000 {
        anyhow::bail!(
            "Message count {} is too high (maximum 100000000)",
            msg_count
        );
    }
    Ok(())
}

/// Validate a publisher or subscriber count
///
/// Both must be at least 1 and at most 10,000 concurrent tasks.
pub fn validate_concurrency(label: &str, count: usize) -> Result<()> {
    if count == 0 {
        anyhow::bail!("{} count cannot be zero", label);
    }
    if count > 10_000 {
        anyhow::bail!("{} count {} is too high (maximum 10000)", label, count);
    }
    Ok(())
}

/// Validate the in-process broker's per-subscription queue depth
pub fn validate_queue_capacity(capacity: usize) -> Result<()> {
    if capacity == 0 {
        anyhow::bail!("Queue capacity cannot be zero");
    }
    if capacity > 1_000_000 {
        anyhow::bail!("Queue capacity {} is too large (maximum 1000000)", capacity);
    }
    Ok(())
}

/// Validate the resource sampling interval
///
/// Sampling faster than once per millisecond would start to perturb the
/// workload being measured.
pub fn validate_sample_interval(interval: Duration) -> Result<()> {
    if interval < Duration::from_millis(1) {
        anyhow::bail!(
            "Sample interval {:?} is too short (minimum 1ms)",
            interval
        );
    }
    Ok(())
}

/// Validate the expected-delivery total of a scenario
///
/// The latency record holds one slot per expected delivery, so the product of
/// message count and subscriber count is bounded as well.
pub fn validate_expected_total(msg_count: usize, subscribers: usize) -> Result<usize> {
    let total = msg_count
        .checked_mul(subscribers)
        .ok_or_else(|| anyhow::anyhow!("Expected delivery total overflows"))?;
    if total > 100_000_000 {
        anyhow::bail!(
            "Expected {} deliveries ({} messages x {} subscribers) exceeds the maximum of 100000000",
            total,
            msg_count,
            subscribers
        );
    }
    Ok(total)
}

/// Get the number of logical CPU cores available to this process
pub fn get_cpu_cores() -> usize {
    num_cpus::get()
}

/// Render a table row with specified column widths
///
/// ```rust
/// # use pubsub_bench::utils::{format_table_row, format_table_separator};
/// let widths = [6, 3];
/// assert_eq!(format_table_separator(&widths), "+--------+-----+");
/// assert_eq!(format_table_row(&["Metric", "Avg"], &widths), "| Metric | Avg |");
/// ```
pub fn format_table_row(columns: &[&str], widths: &[usize]) -> String {
    let mut row = String::from("|");
    for (i, column) in columns.iter().enumerate() {
        let width = widths.get(i).copied().unwrap_or(10);
        row.push_str(&format!(" {:width$} |", column, width = width));
    }
    row
}

/// Render a table separator as a string
///
/// ```text
/// +----------------+-----------+-------------+
/// ```
pub fn format_table_separator(widths: &[usize]) -> String {
    let mut line = String::from("+");
    for &width in widths {
        line.push_str(&"-".repeat(width + 2));
        line.push('+');
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Test duration formatting with various time scales
    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_nanos(500)), "500ns");
        assert_eq!(format_duration(Duration::from_nanos(1500)), "1.50μs");
        assert_eq!(format_duration(Duration::from_nanos(1_500_000)), "1.50ms");
        assert_eq!(format_duration(Duration::from_millis(1500)), "1.50s");
        assert_eq!(format_duration(Duration::from_secs(3 * 3600 + 61)), "3h 1m 1s");
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(500.0), "500 B");
        assert_eq!(format_bytes(1536.0), "1.50 KB");
        assert_eq!(format_bytes(1572864.0), "1.50 MB");
        assert_eq!(format_bytes(1610612736.0), "1.50 GB");
    }

    #[test]
    fn test_format_message_rate() {
        assert_eq!(format_message_rate(500.0), "500 msg/s");
        assert_eq!(format_message_rate(1500.0), "1.50K msg/s");
        assert_eq!(format_message_rate(1500000.0), "1.50M msg/s");
    }

    /// Test message count validation rules
    #[test]
    fn test_validate_msg_count() {
        assert!(validate_msg_count(1).is_ok());
        assert!(validate_msg_count(1_000_000).is_ok());
        assert!(validate_msg_count(0).is_err());
        assert!(validate_msg_count(100_000_001).is_err());
    }

    #[test]
    fn test_validate_concurrency() {
        assert!(validate_concurrency("Publisher", 1).is_ok());
        assert!(validate_concurrency("Publisher", 100).is_ok());
        let err = validate_concurrency("Subscriber", 0).unwrap_err();
        assert!(err.to_string().contains("Subscriber"));
        assert!(validate_concurrency("Publisher", 10_001).is_err());
    }

    #[test]
    fn test_validate_queue_capacity() {
        assert!(validate_queue_capacity(10).is_ok());
        assert!(validate_queue_capacity(0).is_err());
    }

    #[test]
    fn test_validate_sample_interval() {
        assert!(validate_sample_interval(Duration::from_millis(10)).is_ok());
        assert!(validate_sample_interval(Duration::from_micros(10)).is_err());
    }

    #[test]
    fn test_validate_expected_total() {
        assert_eq!(validate_expected_total(1000, 100).unwrap(), 100_000);
        assert!(validate_expected_total(1_000_000, 1000).is_err());
        assert!(validate_expected_total(usize::MAX, 2).is_err());
    }

    #[test]
    fn test_table_rendering() {
        assert_eq!(format_table_separator(&[3, 1]), "+-----+---+");
        assert_eq!(format_table_row(&["ab", "c"], &[3, 1]), "| ab  | c |");
    }

    #[test]
    fn test_generate_run_id_is_unique() {
        assert_ne!(generate_run_id(), generate_run_id());
    }

    #[tokio::test]
    async fn test_spawn_tracked_counts_task() {
        let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();
        let handle = spawn_tracked(async move {
            let _ = release_rx.await;
            7
        });
        assert!(crate::resources::active_tasks() >= 1);
        release_tx.send(()).unwrap();
        assert_eq!(handle.await.unwrap(), 7);
    }
}
