use anyhow::Result;
use pubsub_bench::{
    benchmark::{run_full_mesh, run_parallel},
    BenchmarkConfig, Broker, InProcessBroker,
};
use std::sync::Arc;
use std::time::Duration;

fn config(msg_count: usize, publishers: usize) -> BenchmarkConfig {
    BenchmarkConfig {
        msg_count,
        publishers,
        subscribers: 4,
        completion_timeout: Duration::from_secs(30),
        ..BenchmarkConfig::default()
    }
}

fn broker() -> Arc<dyn Broker> {
    Arc::new(InProcessBroker::new())
}

/// Ten publishers, one subscriber: exactly N deliveries, one completion.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn parallel_completes_exactly_once() -> Result<()> {
    let outcome = run_parallel(broker(), "Mono", &config(1000, 10)).await?;

    assert_eq!(outcome.delivered, 1000);
    assert_eq!(outcome.latencies.len(), 1000);
    assert_eq!(outcome.completion_signals, 1);
    assert_eq!(outcome.overflow_count, 0);
    assert_eq!(outcome.publish_errors, 0);
    Ok(())
}

/// Publisher count that does not divide N still publishes every index.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn parallel_with_remainder_covers_all_messages() -> Result<()> {
    let outcome = run_parallel(broker(), "Mono", &config(1001, 7)).await?;
    assert_eq!(outcome.delivered, 1001);
    assert_eq!(outcome.completion_signals, 1);
    Ok(())
}

/// More publishers than messages leaves some publishers idle.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn parallel_more_publishers_than_messages() -> Result<()> {
    let outcome = run_parallel(broker(), "Mono", &config(5, 16)).await?;
    assert_eq!(outcome.delivered, 5);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn full_mesh_waits_for_every_subscription() -> Result<()> {
    let outcome = run_full_mesh(broker(), "Mono", &config(500, 5)).await?;
    assert_eq!(outcome.expected, 2000);
    assert_eq!(outcome.delivered, 2000);
    assert_eq!(outcome.completion_signals, 1);
    Ok(())
}
