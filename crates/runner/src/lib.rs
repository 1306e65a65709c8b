//! wafreplay stage execution engine
//!
//! Replays HTTP stages against a WAF and decides each stage's result from
//! the response and from the WAF log lines written while the stage ran.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  RunContext                                                 │
//! │    ├── TestFilter / ForcedResults   (policy)                │
//! │    ├── run_stage()                                          │
//! │    │     ├── MarkerSync::mark_and_flush()  start marker     │
//! │    │     ├── Transport::connect() + send() real request     │
//! │    │     ├── MarkerSync::mark_and_flush()  end marker       │
//! │    │     └── check_result(output, outcome, LogWindow)       │
//! │    ├── RunStats                                             │
//! │    └── Reporter                                             │
//! ├─────────────────────────────────────────────────────────────┤
//! │  LogLines     tail scans of the WAF log                     │
//! │  HttpClient   raw HTTP/1.x over TCP or TLS                  │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod check;
pub mod error;
pub mod http;
pub mod loader;
pub mod marker;
pub mod policy;
pub mod report;
pub mod runner;
pub mod stats;
pub mod waflog;

#[cfg(test)]
mod testing;

pub use check::check_result;
pub use error::{RunError, RunResult};
pub use http::{HttpClient, HttpError, Transport};
pub use marker::MarkerSync;
pub use policy::{ForcedResults, SkipReason, TestFilter};
pub use report::{Reporter, SilentReporter, StageTiming, TracingReporter};
pub use runner::{run, run_with, RunContext, RunOptions};
pub use stats::RunStats;
pub use waflog::{LogLines, LogLinesConfig, LogWindow};
