//! Run statistics

use serde::{Serialize, Serializer};
use std::collections::BTreeMap;
use std::time::Duration;
use wafreplay_common::TestResult;

/// Per-outcome test titles plus run counters
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunStats {
    /// Titles in the order their results were recorded
    pub results: BTreeMap<TestResult, Vec<String>>,

    /// Stages that executed or had their result forced
    pub run: usize,

    /// Cumulative stage time
    #[serde(rename = "run_time_ms", serialize_with = "as_millis")]
    pub run_time: Duration,
}

impl RunStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, result: TestResult, title: &str, elapsed: Duration) {
        self.results
            .entry(result)
            .or_default()
            .push(title.to_string());

        if result.counts_as_run() {
            self.run += 1;
        }
        self.run_time += elapsed;
    }

    pub fn count(&self, kind: TestResult) -> usize {
        self.results.get(&kind).map(Vec::len).unwrap_or(0)
    }

    pub fn titles(&self, kind: TestResult) -> &[String] {
        self.results.get(&kind).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Sum of all per-kind counts
    pub fn total(&self) -> usize {
        self.results.values().map(Vec::len).sum()
    }

    /// Failed plus force-failed
    pub fn failed(&self) -> usize {
        TestResult::ALL
            .iter()
            .filter(|kind| kind.is_failure())
            .map(|kind| self.count(*kind))
            .sum()
    }

    pub fn is_success(&self) -> bool {
        self.failed() == 0
    }
}

fn as_millis<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(duration.as_millis() as u64)
}
