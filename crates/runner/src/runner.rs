//! Run orchestration: tests, then stages, one at a time

use regex::Regex;
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};
use wafreplay_common::{
    Destination, FtwTest, Input, InputOverride, RunMode, RunnerConfig, Stage, TestResult,
};

use crate::check::check_result;
use crate::error::{RunError, RunResult};
use crate::http::{ClientConfig, HttpClient, HttpResult, Request, RequestLine, Response, Transport};
use crate::marker::MarkerSync;
use crate::policy::{apply_input_override, ForcedResults, TestFilter};
use crate::report::{Reporter, StageTiming};
use crate::stats::RunStats;
use crate::waflog::{LogLines, LogLinesConfig};

/// Per-run options that do not live in the configuration file
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Only run test titles matching this pattern
    pub include: Option<Regex>,
    /// Skip test titles matching this pattern
    pub exclude: Option<Regex>,
    /// Suppress reporter output
    pub quiet: bool,
}

/// State of one run. Stages execute strictly one after another, so the
/// client and the log reader are shared without locking.
pub struct RunContext<'r, T: Transport> {
    pub filter: TestFilter,
    pub quiet: bool,
    pub client: T,
    pub log_lines: LogLines,
    pub run_mode: RunMode,
    pub stats: RunStats,
    /// Result of the most recently finished stage
    pub last_result: Option<TestResult>,
    header_name: String,
    input_override: InputOverride,
    forced: ForcedResults,
    reporter: &'r mut dyn Reporter,
}

impl<'r, T: Transport> RunContext<'r, T> {
    pub fn new(
        config: &RunnerConfig,
        options: RunOptions,
        client: T,
        log_lines: LogLines,
        reporter: &'r mut dyn Reporter,
    ) -> RunResult<Self> {
        Ok(Self {
            filter: TestFilter::new(options.include, options.exclude),
            quiet: options.quiet,
            client,
            log_lines,
            run_mode: config.mode,
            stats: RunStats::new(),
            last_result: None,
            header_name: config.log_marker_header_name.clone(),
            input_override: config.test_override.input.clone(),
            forced: ForcedResults::compile(&config.test_override)?,
            reporter,
        })
    }

    fn report(&mut self, event: impl FnOnce(&mut dyn Reporter)) {
        if !self.quiet {
            event(&mut *self.reporter);
        }
    }

    /// Run every test; the first aborted stage stops the run
    pub async fn run_all(&mut self, tests: &[FtwTest]) -> RunResult<()> {
        for test in tests {
            self.run_test(test).await?;
        }
        Ok(())
    }

    /// Run every test, then release the log whether or not the run aborted
    pub async fn run_to_completion(&mut self, tests: &[FtwTest]) -> RunResult<()> {
        let outcome = self.run_all(tests).await;
        self.log_lines.close();
        outcome?;

        self.finish_run();
        Ok(())
    }

    /// Run the test cases of one file
    pub async fn run_test(&mut self, test: &FtwTest) -> RunResult<()> {
        let mut announced = false;

        for case in &test.tests {
            let title = case.test_title.as_str();
            if let Some(reason) = self.filter.skip_reason(title, test.meta.enabled) {
                self.stats.record(TestResult::Skipped, title, Duration::ZERO);
                self.report(|r| r.test_skipped(title, reason));
                continue;
            }

            if !announced {
                self.report(|r| r.file_started(&test.meta.name));
                announced = true;
            }

            self.report(|r| r.test_started(title));
            for entry in &case.stages {
                self.run_stage(title, &entry.stage).await?;
            }
        }
        Ok(())
    }

    /// Execute one stage and record its result
    pub async fn run_stage(&mut self, title: &str, stage: &Stage) -> RunResult<TestResult> {
        let stage_start = Instant::now();
        let expected = &stage.output;

        let mut input = stage.input.clone();
        apply_input_override(&mut input, &self.input_override);

        if !input.is_well_formed() {
            return Err(RunError::BadTestRequest);
        }

        if let Some(forced) = self.forced.forced_result(title) {
            self.finish_stage(title, forced, StageTiming::default());
            return Ok(forced);
        }

        let dest = input.destination();
        let request = build_request(&input)?;
        let use_log = self.run_mode != RunMode::Cloud;

        self.log_lines.reset_markers();
        if use_log {
            match self.mark(&dest).await {
                Ok(marker) => self.log_lines.set_start_marker(marker),
                // The real request still runs and decides the result
                Err(e) if expected.expect_error => {
                    warn!("{}: start marker not found, error expected: {}", title, e)
                }
                Err(e) => return Err(RunError::StartMarker(Box::new(e))),
            }
        }

        let (outcome, round_trip) = self.exchange(&dest, &request, expected.expect_error).await?;

        if use_log {
            match self.mark(&dest).await {
                Ok(marker) => self.log_lines.set_end_marker(marker),
                Err(e) if expected.expect_error => {
                    warn!("{}: end marker not found, error expected: {}", title, e)
                }
                Err(e) => return Err(RunError::EndMarker(Box::new(e))),
            }
        }

        let window = use_log.then(|| self.log_lines.marked_lines());
        let result = check_result(expected, self.run_mode, &outcome, window.as_ref());

        let timing = StageTiming {
            stage_time: stage_start.elapsed(),
            round_trip,
        };
        self.finish_stage(title, result, timing);
        Ok(result)
    }

    async fn mark(&mut self, dest: &Destination) -> RunResult<Vec<u8>> {
        MarkerSync::new(&self.header_name)
            .mark_and_flush(&mut self.client, &mut self.log_lines, dest)
            .await
    }

    /// Send the stage request on a fresh connection. Errors are returned as
    /// the outcome only when the stage expects one.
    async fn exchange(
        &mut self,
        dest: &Destination,
        request: &Request,
        expect_error: bool,
    ) -> RunResult<(HttpResult<Response>, Duration)> {
        if let Err(source) = self.client.connect(dest).await {
            if !expect_error {
                return Err(RunError::Connection {
                    dest: dest.clone(),
                    source,
                });
            }
            debug!("Connection to {} failed as expected: {}", dest, source);
            return Ok((Err(source), Duration::ZERO));
        }

        let start = Instant::now();
        let outcome = self.client.send(request).await;
        let round_trip = start.elapsed();

        match outcome {
            Err(source) if !expect_error => Err(RunError::Transport {
                dest: dest.clone(),
                source,
            }),
            outcome => {
                if let Ok(response) = &outcome {
                    trace!(
                        "{} answered {} with {} body bytes in {:?}",
                        dest,
                        response.status,
                        response.body.len(),
                        round_trip
                    );
                }
                Ok((outcome, round_trip))
            }
        }
    }

    fn finish_stage(&mut self, title: &str, result: TestResult, timing: StageTiming) {
        self.stats.record(result, title, timing.stage_time);
        self.last_result = Some(result);
        self.report(|r| r.stage_finished(title, result, timing));
    }

    fn finish_run(&mut self) {
        if !self.quiet {
            self.reporter.run_finished(&self.stats);
        }
    }
}

/// The stage request: raw bytes when given, otherwise assembled from parts
pub fn build_request(input: &Input) -> RunResult<Request> {
    let autocomplete = !input.stop_magic;
    if let Some(raw) = input.raw_request_bytes()? {
        return Ok(Request::raw(raw, autocomplete));
    }

    Ok(Request::new(
        RequestLine::new(input.method(), input.uri(), input.version()),
        input.headers.clone(),
        input.data_bytes(),
        autocomplete,
    ))
}

/// Run `tests` against real sockets and the configured WAF log
pub async fn run(
    tests: &[FtwTest],
    config: &RunnerConfig,
    options: RunOptions,
    reporter: &mut dyn Reporter,
) -> RunResult<RunStats> {
    config.validate()?;

    let log_lines = LogLines::open(LogLinesConfig::from_runner(config))?;
    let client = HttpClient::new(ClientConfig {
        connect_timeout: config.connect_timeout(),
        read_timeout: config.read_timeout(),
    });

    run_with(tests, config, options, client, log_lines, reporter).await
}

/// Run `tests` over any transport. The log is closed however the run ends.
pub async fn run_with<T: Transport>(
    tests: &[FtwTest],
    config: &RunnerConfig,
    options: RunOptions,
    client: T,
    log_lines: LogLines,
    reporter: &mut dyn Reporter,
) -> RunResult<RunStats> {
    info!("Running {} test file(s) in {} mode", tests.len(), config.mode);

    let mut ctx = RunContext::new(config, options, client, log_lines, reporter)?;
    ctx.run_to_completion(tests).await?;
    Ok(ctx.stats)
}
