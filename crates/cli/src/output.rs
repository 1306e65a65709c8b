//! Output formatting for CLI

use clap::ValueEnum;
use colored::Colorize;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;
use std::time::Duration;
use wafreplay_common::TestResult;
use wafreplay_runner::{Reporter, RunStats, SkipReason, StageTiming};

/// Output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Default)]
pub enum OutputFormat {
    /// Per-test lines and a summary table
    #[default]
    Normal,
    /// A single JSON document with the run statistics
    Json,
}

/// Prints progress to stdout as the run goes
pub struct ConsoleReporter {
    show_time: bool,
}

impl ConsoleReporter {
    pub fn new(show_time: bool) -> Self {
        Self { show_time }
    }

    fn timing(&self, timing: StageTiming) -> String {
        if self.show_time {
            format!(
                " in {} (RTT {})",
                format_duration(timing.stage_time),
                format_duration(timing.round_trip)
            )
        } else {
            String::new()
        }
    }
}

impl Reporter for ConsoleReporter {
    fn file_started(&mut self, name: &str) {
        println!("👉 executing tests in file {}", name.bold());
    }

    fn test_skipped(&mut self, title: &str, reason: SkipReason) {
        // Filtered tests are silent; only disabled ones are worth a line
        if reason == SkipReason::Disabled {
            println!("\tskipping {}", title.dimmed());
        }
    }

    fn stage_finished(&mut self, title: &str, result: TestResult, timing: StageTiming) {
        let outcome = match result {
            TestResult::Success => format!("✔ passed{}", self.timing(timing)).green(),
            TestResult::Failed => format!("✘ failed{}", self.timing(timing)).red(),
            TestResult::Ignored => "ℹ test ignored".normal(),
            TestResult::ForceFail => "ℹ test forced to fail".yellow(),
            TestResult::ForcePass => "ℹ test forced to pass".yellow(),
            TestResult::Skipped => return,
        };
        println!("\trunning {}: {}", title, outcome);
    }
}

fn format_duration(d: Duration) -> String {
    if d.as_secs() > 0 {
        format!("{:.2}s", d.as_secs_f64())
    } else {
        format!("{}ms", d.as_millis())
    }
}

/// Print the final summary table
pub fn print_summary(stats: &RunStats) {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);

    table.set_header(vec!["Result", "Count"]);
    for kind in TestResult::ALL {
        table.add_row(vec![kind.to_string(), stats.count(kind).to_string()]);
    }
    table.add_row(vec!["run".to_string(), stats.run.to_string()]);
    table.add_row(vec!["total".to_string(), stats.total().to_string()]);

    println!();
    println!("{table}");

    let failed = stats.titles(TestResult::Failed);
    if !failed.is_empty() {
        println!("{} {}", "Failed tests:".red().bold(), failed.join(", "));
    }

    let summary = format!(
        "{} stage(s) run in {}",
        stats.run,
        format_duration(stats.run_time)
    );
    if stats.is_success() {
        print_success(&summary);
    } else {
        print_error(&format!("{}, {} failed", summary, stats.failed()));
    }
}

#[derive(Serialize)]
struct JsonReport<'a> {
    timestamp: String,
    success: bool,
    #[serde(flatten)]
    stats: &'a RunStats,
}

/// Print the run statistics as JSON
pub fn print_json(stats: &RunStats) -> anyhow::Result<()> {
    let report = JsonReport {
        timestamp: chrono::Utc::now().to_rfc3339(),
        success: stats.is_success(),
        stats,
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

/// Print success message
pub fn print_success(message: &str) {
    println!("✅ {}", message);
}

/// Print error message
pub fn print_error(message: &str) {
    eprintln!("❌ {}", message);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_millis(15)), "15ms");
        assert_eq!(format_duration(Duration::from_millis(1500)), "1.50s");
    }

    #[test]
    fn test_timing_hidden_unless_requested() {
        let timing = StageTiming {
            stage_time: Duration::from_millis(20),
            round_trip: Duration::from_millis(5),
        };
        assert_eq!(ConsoleReporter::new(false).timing(timing), "");
        assert_eq!(
            ConsoleReporter::new(true).timing(timing),
            " in 20ms (RTT 5ms)"
        );
    }

    #[test]
    fn test_json_report_shape() {
        let mut stats = RunStats::new();
        stats.record(TestResult::Success, "920100-1", Duration::from_millis(3));
        let report = JsonReport {
            timestamp: "2024-01-01T00:00:00+00:00".to_string(),
            success: stats.is_success(),
            stats: &stats,
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["run"], 1);
        assert_eq!(json["results"]["success"][0], "920100-1");
    }
}
