//! Run Command

use anyhow::{Context, Result};
use clap::Args;
use regex::Regex;
use std::path::PathBuf;
use tracing::debug;
use wafreplay_common::{RunMode, RunnerConfig, DEFAULT_CONFIG_FILE};
use wafreplay_runner::{loader, Reporter, RunOptions, TracingReporter};

use crate::output::{self, ConsoleReporter, OutputFormat};

#[derive(Args)]
pub struct RunArgs {
    /// Configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,

    /// Test file or directory of test files
    #[arg(short, long, default_value = ".")]
    pub dir: PathBuf,

    /// Only run tests whose title matches this regular expression
    #[arg(short, long)]
    pub include: Option<String>,

    /// Skip tests whose title matches this regular expression
    #[arg(short, long)]
    pub exclude: Option<String>,

    /// WAF log file, overriding the configuration file
    #[arg(long, env = "WAFREPLAY_LOG_FILE")]
    pub log_file: Option<PathBuf>,

    /// Run without log access, checking responses only
    #[arg(long)]
    pub cloud: bool,

    /// Connect timeout in milliseconds
    #[arg(long)]
    pub connect_timeout_ms: Option<u64>,

    /// Read timeout in milliseconds
    #[arg(long)]
    pub read_timeout_ms: Option<u64>,

    /// Do not print per-test results
    #[arg(short, long)]
    pub quiet: bool,

    /// Show stage and round-trip times
    #[arg(short, long)]
    pub time: bool,

    /// Output format
    #[arg(short, long, value_enum, default_value = "normal")]
    pub output: OutputFormat,
}

impl RunArgs {
    /// Configuration file values with command line overrides applied
    fn runner_config(&self) -> Result<RunnerConfig> {
        let mut config = RunnerConfig::load(&self.config)
            .with_context(|| format!("loading {}", self.config.display()))?;

        if let Some(log_file) = &self.log_file {
            config.log_file = Some(log_file.clone());
        }
        if self.cloud {
            config.mode = RunMode::Cloud;
        }
        if let Some(ms) = self.connect_timeout_ms {
            config.connect_timeout_ms = ms;
        }
        if let Some(ms) = self.read_timeout_ms {
            config.read_timeout_ms = ms;
        }
        Ok(config)
    }

    fn run_options(&self) -> Result<RunOptions> {
        Ok(RunOptions {
            include: compile(self.include.as_deref(), "--include")?,
            exclude: compile(self.exclude.as_deref(), "--exclude")?,
            quiet: self.quiet,
        })
    }

    /// Quiet runs print nothing but the exit code; JSON is always printed
    fn prints_summary(&self) -> bool {
        self.output == OutputFormat::Normal && !self.quiet
    }
}

fn compile(pattern: Option<&str>, flag: &str) -> Result<Option<Regex>> {
    pattern
        .map(|p| Regex::new(p).with_context(|| format!("invalid {} pattern '{}'", flag, p)))
        .transpose()
}

/// Returns whether every executed stage passed
pub async fn execute(args: RunArgs) -> Result<bool> {
    let config = args.runner_config()?;
    let options = args.run_options()?;
    let tests = loader::load_all(&args.dir)?;
    debug!("Loaded {} test file(s) from {}", tests.len(), args.dir.display());

    let mut console = ConsoleReporter::new(args.time);
    // JSON keeps stdout for the final document; progress goes to the log
    let mut logged = TracingReporter;
    let reporter: &mut dyn Reporter = match args.output {
        OutputFormat::Normal => &mut console,
        OutputFormat::Json => &mut logged,
    };

    let stats = wafreplay_runner::run(&tests, &config, options, reporter).await?;

    if args.prints_summary() {
        output::print_summary(&stats);
    } else if args.output == OutputFormat::Json {
        output::print_json(&stats)?;
    }

    Ok(stats.is_success())
}
