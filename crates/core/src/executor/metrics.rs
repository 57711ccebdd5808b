//! Execution metrics
//!
//! Counters cover the executor's whole lifetime; durations are kept in a
//! `VecDeque` ring buffer of the most recent samples so average and p95
//! reflect current behavior.

use std::collections::VecDeque;
use std::time::Duration;

use faultline_domain::constants::METRICS_SAMPLE_CAPACITY;
use faultline_domain::impl_domain_status_conversions;
use serde::{Deserialize, Serialize};

/// How an execution was submitted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    Sync,
    Async,
    Batch,
}

impl_domain_status_conversions!(ExecutionMode {
    Sync => "sync",
    Async => "async",
    Batch => "batch",
});

/// Snapshot returned by `ResponseExecutor::metrics`
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExecutionMetrics {
    pub total_executions: u64,
    pub successful_executions: u64,
    pub failed_executions: u64,
    pub sync_executions: u64,
    pub async_executions: u64,
    pub batch_executions: u64,
    /// Over the retained samples
    pub average_duration_ms: f64,
    /// Over the retained samples
    pub p95_duration_ms: f64,
    pub active_executions: usize,
    pub max_concurrent_executions: usize,
}

/// Accumulates execution outcomes; the executor guards it with a mutex
#[derive(Debug)]
pub(crate) struct MetricsRecorder {
    total: u64,
    successful: u64,
    failed: u64,
    sync: u64,
    r#async: u64,
    batch: u64,
    samples: VecDeque<Duration>,
    capacity: usize,
}

impl Default for MetricsRecorder {
    fn default() -> Self {
        Self::with_capacity(METRICS_SAMPLE_CAPACITY)
    }
}

impl MetricsRecorder {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            total: 0,
            successful: 0,
            failed: 0,
            sync: 0,
            r#async: 0,
            batch: 0,
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub(crate) fn record(&mut self, mode: ExecutionMode, duration: Duration, success: bool) {
        self.total += 1;
        if success {
            self.successful += 1;
        } else {
            self.failed += 1;
        }
        match mode {
            ExecutionMode::Sync => self.sync += 1,
            ExecutionMode::Async => self.r#async += 1,
            ExecutionMode::Batch => self.batch += 1,
        }

        self.samples.push_back(duration);
        if self.samples.len() > self.capacity {
            self.samples.pop_front();
        }
    }

    /// Counter snapshot; the caller fills in the live gauges
    pub(crate) fn snapshot(&self) -> ExecutionMetrics {
        let mut millis: Vec<f64> =
            self.samples.iter().map(|duration| duration.as_secs_f64() * 1000.0).collect();
        millis.sort_by(f64::total_cmp);

        let average = if millis.is_empty() {
            0.0
        } else {
            millis.iter().sum::<f64>() / millis.len() as f64
        };

        ExecutionMetrics {
            total_executions: self.total,
            successful_executions: self.successful,
            failed_executions: self.failed,
            sync_executions: self.sync,
            async_executions: self.r#async,
            batch_executions: self.batch,
            average_duration_ms: average,
            p95_duration_ms: percentile(&millis, 0.95),
            active_executions: 0,
            max_concurrent_executions: 0,
        }
    }
}

/// Nearest-rank percentile of an ascending slice
fn percentile(sorted: &[f64], quantile: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let rank = (quantile * sorted.len() as f64).ceil() as usize;
    sorted[rank.clamp(1, sorted.len()) - 1]
}
