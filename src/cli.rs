use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Pub/Sub Benchmark Suite - measure throughput, latency and resource usage of message brokers
#[derive(Parser, Debug, Clone)]
#[clap(version, about, long_about = None)]
pub struct Args {
    /// Broker backend to benchmark
    #[clap(short = 'b', long, value_enum, default_value_t = Backend::Mono, help_heading = "Core Options")]
    pub backend: Backend,

    /// Scenarios to run (space-separated: sequential, parallel, fan-out, full-mesh, or all)
    #[clap(short = 's', long, value_enum, default_values_t = vec![Scenario::Sequential, Scenario::Parallel], num_args = 1.., help_heading = "Core Options")]
    pub scenarios: Vec<Scenario>,

    /// Number of messages published per scenario
    #[clap(short = 'n', long, default_value_t = crate::defaults::MSG_COUNT, help_heading = "Core Options")]
    pub msg_count: usize,

    /// Number of concurrent publishers (parallel and full-mesh scenarios)
    #[clap(short = 'p', long, default_value_t = crate::defaults::PUBLISHERS, help_heading = "Core Options")]
    pub publishers: usize,

    /// Number of subscriptions (fan-out and full-mesh scenarios)
    #[clap(long, default_value_t = crate::defaults::SUBSCRIBERS, help_heading = "Core Options")]
    pub subscribers: usize,

    /// Topic the scenarios publish to
    #[clap(long, default_value = crate::defaults::TOPIC)]
    pub topic: String,

    /// Per-subscription queue depth for the in-process broker
    #[clap(long, default_value_t = crate::defaults::QUEUE_CAPACITY)]
    pub queue_capacity: usize,

    /// Resource sampling interval (e.g. "10ms", "1s")
    #[clap(long, value_parser = parse_duration, default_value = "10ms")]
    pub sample_interval: Duration,

    /// Give up waiting for deliveries after this long (e.g. "30s", "5m")
    #[clap(long, value_parser = parse_duration, default_value = "300s")]
    pub timeout: Duration,

    /// Output file for results (JSON format)
    #[clap(short = 'o', long)]
    pub output_file: Option<PathBuf>,

    /// Continue running other scenarios even if one fails
    #[clap(long, default_value_t = false)]
    pub continue_on_error: bool,

    /// Verbose output (debug logging unless RUST_LOG is set)
    #[clap(short = 'v', long, default_value_t = false)]
    pub verbose: bool,
}

impl Default for Args {
    /// Arguments as if the binary had been invoked with no flags, so every
    /// clap default applies.
    fn default() -> Self {
        Self::parse_from(["pubsub-bench"])
    }
}

/// Available broker backends
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
pub enum Backend {
    /// Monolithic in-process broker using bounded channels
    #[clap(name = "mono")]
    Mono,
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Backend::Mono => write!(f, "Mono"),
        }
    }
}

/// Load patterns the harness can drive
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, ValueEnum, Serialize, Deserialize)]
pub enum Scenario {
    /// One publisher, one subscriber, messages published one at a time
    #[clap(name = "sequential")]
    Sequential,

    /// Many concurrent publishers, one subscriber
    #[clap(name = "parallel")]
    Parallel,

    /// One publisher, many subscribers
    #[clap(name = "fan-out")]
    FanOut,

    /// Many publishers, many subscribers
    #[clap(name = "full-mesh")]
    FullMesh,

    /// All scenarios
    #[clap(name = "all")]
    All,
}

impl std::fmt::Display for Scenario {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Scenario::Sequential => write!(f, "Sequential"),
            Scenario::Parallel => write!(f, "Parallel"),
            Scenario::FanOut => write!(f, "Fan-out"),
            Scenario::FullMesh => write!(f, "Full Mesh"),
            Scenario::All => write!(f, "All Scenarios"),
        }
    }
}

impl Scenario {
    /// Expand the "All" variant to every runnable scenario
    pub fn expand_all(scenarios: Vec<Scenario>) -> Vec<Scenario> {
        if scenarios.contains(&Scenario::All) {
            vec![
                Scenario::Sequential,
                Scenario::Parallel,
                Scenario::FanOut,
                Scenario::FullMesh,
            ]
        } else {
            scenarios
        }
    }
}

/// Parse duration from string (e.g., "10s", "5m", "1h")
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();

    if s.is_empty() {
        return Err("Duration cannot be empty".to_string());
    }

    let (num_str, unit) = if let Some(stripped) = s.strip_suffix("ms") {
        (stripped, "ms")
    } else if let Some(stripped) = s.strip_suffix('s') {
        (stripped, "s")
    } else if let Some(stripped) = s.strip_suffix('m') {
        (stripped, "m")
    } else if let Some(stripped) = s.strip_suffix('h') {
        (stripped, "h")
    } else {
        (s, "s") // Default to seconds
    };

    let num: f64 = num_str
        .parse()
        .map_err(|_| format!("Invalid number in duration: {}", num_str))?;

    if !num.is_finite() || num < 0.0 {
        return Err(format!("Duration must be a non-negative number: {}", s));
    }

    let nanos_per_unit = match unit {
        "ms" => 1e6,
        "s" => 1e9,
        "m" => 60.0 * 1e9,
        "h" => 3600.0 * 1e9,
        _ => return Err(format!("Invalid duration unit: {}", unit)),
    };

    Ok(Duration::from_nanos((num * nanos_per_unit).round() as u64))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("10s").unwrap(), Duration::from_secs(10));
        assert_eq!(parse_duration("5m").unwrap(), Duration::from_secs(300));
        assert_eq!(parse_duration("1h").unwrap(), Duration::from_secs(3600));
        assert_eq!(parse_duration("500ms").unwrap(), Duration::from_millis(500));
        assert_eq!(parse_duration("10").unwrap(), Duration::from_secs(10));
        assert_eq!(parse_duration("1.5s").unwrap(), Duration::from_millis(1500));

        assert!(parse_duration("").is_err());
        assert!(parse_duration("invalid").is_err());
        assert!(parse_duration("-1s").is_err());
    }

    #[test]
    fn test_scenario_display() {
        assert_eq!(Scenario::Sequential.to_string(), "Sequential");
        assert_eq!(Scenario::Parallel.to_string(), "Parallel");
        assert_eq!(Scenario::FanOut.to_string(), "Fan-out");
        assert_eq!(Scenario::FullMesh.to_string(), "Full Mesh");
        assert_eq!(Scenario::All.to_string(), "All Scenarios");
    }

    #[test]
    fn test_scenario_expand_all() {
        let all_scenarios = vec![
            Scenario::Sequential,
            Scenario::Parallel,
            Scenario::FanOut,
            Scenario::FullMesh,
        ];
        assert_eq!(Scenario::expand_all(vec![Scenario::All]), all_scenarios);
        assert_eq!(
            Scenario::expand_all(vec![Scenario::Parallel]),
            vec![Scenario::Parallel]
        );
        assert_eq!(
            Scenario::expand_all(vec![Scenario::Sequential, Scenario::All]),
            all_scenarios
        );
    }

    #[test]
    fn test_default_args_apply_clap_defaults() {
        let args = Args::default();
        assert_eq!(args.backend, Backend::Mono);
        assert_eq!(args.scenarios, vec![Scenario::Sequential, Scenario::Parallel]);
        assert_eq!(args.msg_count, crate::defaults::MSG_COUNT);
        assert_eq!(args.publishers, crate::defaults::PUBLISHERS);
        assert_eq!(args.topic, crate::defaults::TOPIC);
        assert_eq!(args.sample_interval, Duration::from_millis(10));
        assert_eq!(args.timeout, Duration::from_secs(300));
        assert!(args.output_file.is_none());
    }

    #[test]
    fn test_parse_flags() {
        let args = Args::parse_from([
            "pubsub-bench",
            "-b",
            "mono",
            "-s",
            "parallel",
            "full-mesh",
            "-n",
            "1000",
            "-p",
            "10",
            "--timeout",
            "5s",
        ]);
        assert_eq!(args.scenarios, vec![Scenario::Parallel, Scenario::FullMesh]);
        assert_eq!(args.msg_count, 1000);
        assert_eq!(args.publishers, 10);
        assert_eq!(args.timeout, Duration::from_secs(5));
    }
}
