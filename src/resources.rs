//! # Resource Sampling Module
//!
//! Captures process-level resource usage while a scenario runs. A single
//! sampler task ticks on its own timer, independent of the publishers and
//! delivery tasks, and owns the sample sequence it builds. The sequence is
//! handed back through the task's join handle once the stop signal has been
//! observed, so nobody can read it while it is still being appended to.
//!
//! ## Metrics
//!
//! | Field          | Source                                              |
//! |----------------|-----------------------------------------------------|
//! | `task_count`   | tasks spawned through [`crate::utils::spawn_tracked`] |
//! | `heap_bytes`   | `VmData` from `/proc/self/status` (Linux)           |
//! | `stack_bytes`  | `VmStk` from `/proc/self/status` (Linux)            |
//! | `gc_cycles`    | cumulative minor page faults (`getrusage`)          |
//! | `system_bytes` | `VmRSS` from `/proc/self/status` (Linux)            |
//!
//! Rust has no garbage collector; minor page faults are the process-level
//! counter that tracks memory reclaim/remap activity, so they fill the
//! cumulative-cycles slot. Fields a platform cannot report are zero.

use crate::utils::spawn_tracked;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

static ACTIVE_TASKS: AtomicUsize = AtomicUsize::new(0);

/// Number of tracked tasks currently alive in this process
pub fn active_tasks() -> usize {
    ACTIVE_TASKS.load(Ordering::Relaxed)
}

/// Keeps a task counted in [`active_tasks`] for as long as it lives
pub struct TaskGuard {
    _private: (),
}

impl TaskGuard {
    pub fn enter() -> Self {
        ACTIVE_TASKS.fetch_add(1, Ordering::Relaxed);
        Self { _private: () }
    }
}

impl Drop for TaskGuard {
    fn drop(&mut self) {
        ACTIVE_TASKS.fetch_sub(1, Ordering::Relaxed);
    }
}

/// Point-in-time snapshot of process resource usage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceSample {
    pub timestamp: DateTime<Utc>,
    pub task_count: usize,
    pub heap_bytes: u64,
    pub stack_bytes: u64,
    pub gc_cycles: u64,
    pub system_bytes: u64,
}

/// Source of resource samples
pub trait ResourceProbe: Send + Sync {
    fn sample(&self) -> ResourceSample;
}

/// Probe reading the current process's own usage
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessProbe;

impl ResourceProbe for ProcessProbe {
    fn sample(&self) -> ResourceSample {
        let memory = read_memory_status();
        ResourceSample {
            timestamp: Utc::now(),
            task_count: active_tasks(),
            heap_bytes: memory.data_bytes,
            stack_bytes: memory.stack_bytes,
            gc_cycles: minor_page_faults(),
            system_bytes: memory.resident_bytes,
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct MemoryStatus {
    data_bytes: u64,
    stack_bytes: u64,
    resident_bytes: u64,
}

#[cfg(target_os = "linux")]
fn read_memory_status() -> MemoryStatus {
    std::fs::read_to_string("/proc/self/status")
        .map(|content| parse_memory_status(&content))
        .unwrap_or_default()
}

#[cfg(not(target_os = "linux"))]
fn read_memory_status() -> MemoryStatus {
    MemoryStatus::default()
}

/// Parse the `Vm*` lines of a `/proc/<pid>/status` file (values are in kB)
fn parse_memory_status(content: &str) -> MemoryStatus {
    let mut status = MemoryStatus::default();
    for line in content.lines() {
        let (key, rest) = match line.split_once(':') {
            Some(pair) => pair,
            None => continue,
        };
        let kb = match rest.split_whitespace().next().and_then(|v| v.parse::<u64>().ok()) {
            Some(kb) => kb,
            None => continue,
        };
        match key {
            "VmData" => status.data_bytes = kb * 1024,
            "VmStk" => status.stack_bytes = kb * 1024,
            "VmRSS" => status.resident_bytes = kb * 1024,
            _ => {}
        }
    }
    status
}

#[cfg(unix)]
fn minor_page_faults() -> u64 {
    // SAFETY: getrusage only writes into the zero-initialised struct we own.
    let mut usage: libc::rusage = unsafe { std::mem::zeroed() };
    let rc = unsafe { libc::getrusage(libc::RUSAGE_SELF, &mut usage) };
    if rc == 0 {
        usage.ru_minflt.max(0) as u64
    } else {
        0
    }
}

#[cfg(not(unix))]
fn minor_page_faults() -> u64 {
    0
}

/// Handle to a running sampler task
pub struct ResourceSampler {
    stop: CancellationToken,
    handle: JoinHandle<Vec<ResourceSample>>,
}

impl ResourceSampler {
    /// Start sampling with the process probe every `interval`
    pub fn start(interval: Duration) -> Self {
        Self::start_with_probe(interval, Arc::new(ProcessProbe))
    }

    /// Start sampling with a custom probe.
    ///
    /// The first sample is taken one full `interval` after start. Ticks missed
    /// because the runtime was busy are skipped rather than bunched up.
    pub fn start_with_probe(interval: Duration, probe: Arc<dyn ResourceProbe>) -> Self {
        let stop = CancellationToken::new();
        let token = stop.clone();

        let handle = spawn_tracked(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // interval() fires immediately; the first real sample is one period out
            ticker.tick().await;

            let mut samples = Vec::new();
            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => samples.push(probe.sample()),
                }
            }

            info!("Stopped resource monitoring.");
            debug!("Resource sampler collected {} samples", samples.len());
            samples
        });

        Self { stop, handle }
    }

    /// Signal the sampler to stop and collect its samples
    pub async fn stop(self) -> Result<Vec<ResourceSample>> {
        self.stop.cancel();
        self.handle
            .await
            .context("Resource sampler task failed to join")
    }
}
