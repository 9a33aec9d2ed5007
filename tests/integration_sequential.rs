use anyhow::Result;
use pubsub_bench::{
    benchmark::run_sequential, cli::Scenario, BenchmarkConfig, BenchmarkRunner, Broker,
    InProcessBroker,
};
use std::sync::Arc;
use std::time::Duration;

fn config(msg_count: usize) -> BenchmarkConfig {
    BenchmarkConfig {
        msg_count,
        scenarios: vec![Scenario::Sequential],
        completion_timeout: Duration::from_secs(30),
        ..BenchmarkConfig::default()
    }
}

/// Sequential run against the in-process broker records every delivery once,
/// in arrival order.
#[tokio::test]
async fn sequential_records_every_delivery() -> Result<()> {
    let broker: Arc<dyn Broker> = Arc::new(InProcessBroker::new());
    let outcome = run_sequential(broker, "Mono", &config(1000)).await?;

    assert_eq!(outcome.delivered, 1000);
    assert_eq!(outcome.latencies.len(), 1000);
    assert_eq!(outcome.completion_signals, 1);
    assert_eq!(outcome.overflow_count, 0);
    assert!(outcome.latencies.windows(2).all(|w| w[0] <= w[1]));
    assert!(outcome.elapsed >= *outcome.latencies.last().unwrap_or(&Duration::ZERO));
    Ok(())
}

/// Full runner path: fresh broker, sampler, aggregation.
#[tokio::test]
async fn sequential_runner_reports_throughput_and_latency() -> Result<()> {
    let runner = BenchmarkRunner::new(config(1000), "Mono");
    let results = runner
        .run_scenario(Scenario::Sequential, || async {
            Ok(Arc::new(InProcessBroker::new()) as Arc<dyn Broker>)
        })
        .await?;

    assert_eq!(results.delivered, 1000);
    assert_eq!(results.latency.total_samples, 1000);
    assert!(results.throughput.messages_per_second > 0.0);
    assert!(results.latency.mean() <= results.throughput.elapsed());
    assert_eq!(results.publish_errors, 0);
    Ok(())
}

/// A single message is the smallest valid run.
#[tokio::test]
async fn sequential_single_message() -> Result<()> {
    let broker: Arc<dyn Broker> = Arc::new(InProcessBroker::with_capacity(1));
    let outcome = run_sequential(broker, "Mono", &config(1)).await?;
    assert_eq!(outcome.delivered, 1);
    assert_eq!(outcome.latencies.len(), 1);
    Ok(())
}
