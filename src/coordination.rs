//! # Completion Coordination Module
//!
//! Scenario drivers publish a fixed number of messages and then block until
//! exactly that many deliveries have been observed. This module provides the
//! two primitives that make that wait race-free:
//!
//! - **CompletionLatch**: an atomic countdown initialised to the expected
//!   delivery count. Every delivery decrements it; the transition to zero fires
//!   the completion event exactly once. Decrements past zero are rejected and
//!   counted as overflow anomalies instead of wrapping.
//! - **DeliveryRecorder**: the pre-sized latency record shared by every
//!   delivery task. The slot write and the latch decrement happen under one
//!   lock, so two concurrent deliveries can never claim the same arrival index
//!   and no write ever lands outside the record.
//!
//! ## Waiting
//!
//! The coordinating task registers interest in the completion event before
//! checking the counter, so a completion that races with the start of the wait
//! is never lost.

use crate::broker::BrokerError;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::Notify;

/// Errors that abort or taint a scenario run
#[derive(Debug, Error)]
pub enum ScenarioError {
    /// Subscribing failed before any load was generated
    #[error("subscription failed for '{backend}': {source}")]
    Subscription {
        backend: String,
        #[source]
        source: BrokerError,
    },

    /// More deliveries were observed than the scenario published
    #[error("delivery overflow: more than {expected} deliveries observed")]
    Overflow { expected: usize },

    /// The completion event did not fire before the deadline
    #[error("timed out after {timeout:?} with {observed} of {expected} deliveries")]
    Timeout {
        timeout: Duration,
        observed: usize,
        expected: usize,
    },

    /// The scenario configuration cannot produce a run
    #[error("invalid scenario configuration: {0}")]
    InvalidConfig(String),
}

/// Atomic countdown that signals a single completion event
pub struct CompletionLatch {
    expected: usize,
    remaining: AtomicUsize,
    overflow: AtomicUsize,
    completions: AtomicUsize,
    notify: Notify,
}

impl CompletionLatch {
    pub fn new(expected: usize) -> Self {
        Self {
            expected,
            remaining: AtomicUsize::new(expected),
            overflow: AtomicUsize::new(0),
            completions: AtomicUsize::new(0),
            notify: Notify::new(),
        }
    }

    /// Record one delivery.
    ///
    /// Returns the zero-based arrival index of this delivery, or
    /// `ScenarioError::Overflow` if the latch had already reached zero.
    pub fn count_down(&self) -> Result<usize, ScenarioError> {
        match self
            .remaining
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |r| r.checked_sub(1))
        {
            Ok(previous) => {
                if previous == 1 {
                    self.completions.fetch_add(1, Ordering::AcqRel);
                    self.notify.notify_waiters();
                }
                Ok(self.expected - previous)
            }
            Err(_) => {
                self.overflow.fetch_add(1, Ordering::Relaxed);
                Err(ScenarioError::Overflow {
                    expected: self.expected,
                })
            }
        }
    }

    pub fn is_complete(&self) -> bool {
        self.remaining.load(Ordering::Acquire) == 0
    }

    pub fn expected(&self) -> usize {
        self.expected
    }

    /// Deliveries accepted so far (never exceeds `expected`)
    pub fn observed(&self) -> usize {
        self.expected - self.remaining.load(Ordering::Acquire)
    }

    pub fn overflow_count(&self) -> usize {
        self.overflow.load(Ordering::Relaxed)
    }

    /// How many times the completion event fired (0 or 1)
    pub fn completion_signals(&self) -> usize {
        self.completions.load(Ordering::Acquire)
    }

    /// Wait until the countdown reaches zero
    pub async fn wait(&self) {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.is_complete() {
                return;
            }
            notified.await;
        }
    }

    /// Wait for completion, giving up after `timeout`
    pub async fn wait_timeout(&self, timeout: Duration) -> Result<(), ScenarioError> {
        match tokio::time::timeout(timeout, self.wait()).await {
            Ok(()) => Ok(()),
            Err(_) => Err(ScenarioError::Timeout {
                timeout,
                observed: self.observed(),
                expected: self.expected,
            }),
        }
    }
}

/// Lock-guarded latency record indexed by arrival order
pub struct DeliveryRecorder {
    start: Instant,
    latencies: Mutex<Vec<Duration>>,
    latch: CompletionLatch,
}

impl DeliveryRecorder {
    /// Create a recorder expecting `expected` deliveries, measured from `start`
    pub fn new(expected: usize, start: Instant) -> Self {
        Self {
            start,
            latencies: Mutex::new(vec![Duration::ZERO; expected]),
            latch: CompletionLatch::new(expected),
        }
    }

    /// Record one delivery and return its arrival index
    pub fn record(&self) -> Result<usize, ScenarioError> {
        let mut latencies = self.latencies.lock();
        let index = self.latch.count_down()?;
        let elapsed = self.start.elapsed();

        match latencies.get_mut(index) {
            Some(slot) => {
                *slot = elapsed;
                Ok(index)
            }
            None => Err(ScenarioError::Overflow {
                expected: self.latch.expected(),
            }),
        }
    }

    pub fn latch(&self) -> &CompletionLatch {
        &self.latch
    }

    pub fn start(&self) -> Instant {
        self.start
    }

    /// Snapshot of the latency record
    pub fn latencies(&self) -> Vec<Duration> {
        self.latencies.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_latch_counts_down_to_single_completion() {
        let latch = CompletionLatch::new(3);
        assert_eq!(latch.count_down().unwrap(), 0);
        assert_eq!(latch.count_down().unwrap(), 1);
        assert!(!latch.is_complete());
        assert_eq!(latch.count_down().unwrap(), 2);
        assert!(latch.is_complete());
        assert_eq!(latch.completion_signals(), 1);

        assert!(matches!(
            latch.count_down(),
            Err(ScenarioError::Overflow { expected: 3 })
        ));
        assert_eq!(latch.completion_signals(), 1);
        assert_eq!(latch.overflow_count(), 1);
        assert_eq!(latch.observed(), 3);
    }

    #[tokio::test]
    async fn test_wait_returns_after_completion_already_happened() {
        let latch = CompletionLatch::new(1);
        latch.count_down().unwrap();
        latch.wait_timeout(Duration::from_millis(100)).await.unwrap();
    }

    #[tokio::test]
    async fn test_zero_expected_completes_immediately() {
        let latch = CompletionLatch::new(0);
        assert!(latch.is_complete());
        latch.wait_timeout(Duration::from_millis(100)).await.unwrap();
    }

    #[tokio::test]
    async fn test_wait_timeout_reports_progress() {
        let latch = CompletionLatch::new(5);
        latch.count_down().unwrap();
        latch.count_down().unwrap();

        match latch.wait_timeout(Duration::from_millis(20)).await {
            Err(ScenarioError::Timeout {
                observed, expected, ..
            }) => {
                assert_eq!(observed, 2);
                assert_eq!(expected, 5);
            }
            other => panic!("expected timeout, got {:?}", other),
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_count_down_signals_exactly_once() {
        let latch = Arc::new(CompletionLatch::new(1000));
        let mut workers = Vec::new();
        for _ in 0..10 {
            let latch = latch.clone();
            workers.push(tokio::spawn(async move {
                let mut overflowed = 0;
                for _ in 0..110 {
                    if latch.count_down().is_err() {
                        overflowed += 1;
                    }
                }
                overflowed
            }));
        }

        latch.wait_timeout(Duration::from_secs(5)).await.unwrap();
        let mut overflowed = 0;
        for worker in workers {
            overflowed += worker.await.unwrap();
        }

        assert_eq!(latch.observed(), 1000);
        assert_eq!(overflowed, 100);
        assert_eq!(latch.overflow_count(), 100);
        assert_eq!(latch.completion_signals(), 1);
    }

    #[test]
    fn test_recorder_fills_slots_in_arrival_order() {
        let recorder = DeliveryRecorder::new(4, Instant::now());
        for expected_index in 0..4 {
            assert_eq!(recorder.record().unwrap(), expected_index);
        }
        assert!(recorder.record().is_err());

        let latencies = recorder.latencies();
        assert_eq!(latencies.len(), 4);
        assert!(latencies.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(recorder.latch().overflow_count(), 1);
    }
}
