//! Reporting sinks for run progress

use std::time::Duration;
use tracing::{debug, error, info};
use wafreplay_common::TestResult;

use crate::policy::SkipReason;
use crate::stats::RunStats;

/// Timing of one executed stage
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StageTiming {
    /// Whole stage including marker probes
    pub stage_time: Duration,
    /// Request/response exchange only
    pub round_trip: Duration,
}

/// Receives progress events from the orchestrator. Every method defaults to
/// doing nothing.
pub trait Reporter: Send {
    fn file_started(&mut self, _name: &str) {}

    fn test_skipped(&mut self, _title: &str, _reason: SkipReason) {}

    fn test_started(&mut self, _title: &str) {}

    fn stage_finished(&mut self, _title: &str, _result: TestResult, _timing: StageTiming) {}

    fn run_finished(&mut self, _stats: &RunStats) {}
}

/// Reports nothing
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentReporter;

impl Reporter for SilentReporter {}

/// Reports through `tracing` events
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl Reporter for TracingReporter {
    fn file_started(&mut self, name: &str) {
        info!("Running tests from {}", name);
    }

    fn test_skipped(&mut self, title: &str, reason: SkipReason) {
        debug!("Skipping {} ({:?})", title, reason);
    }

    fn test_started(&mut self, title: &str) {
        debug!("Running {}", title);
    }

    fn stage_finished(&mut self, title: &str, result: TestResult, timing: StageTiming) {
        if result.is_failure() {
            error!("{} {} ({} ms)", title, result, timing.stage_time.as_millis());
        } else {
            info!("{} {} ({} ms)", title, result, timing.stage_time.as_millis());
        }
    }

    fn run_finished(&mut self, stats: &RunStats) {
        info!(
            "Run finished: {} run, {} passed, {} failed, {} skipped, {} ignored ({} ms)",
            stats.run,
            stats.count(TestResult::Success) + stats.count(TestResult::ForcePass),
            stats.failed(),
            stats.count(TestResult::Skipped),
            stats.count(TestResult::Ignored),
            stats.run_time.as_millis()
        );
    }
}
