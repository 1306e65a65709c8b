//! wafreplay CLI - Main Entry Point
//!
//! Replays YAML test files against a WAF and reports which stages the WAF
//! handled as expected.

use clap::{Parser, Subcommand};

mod commands;
mod output;

use commands::{check, run};

/// wafreplay - WAF regression test runner
#[derive(Parser)]
#[command(name = "wafreplay")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run tests against the WAF
    Run(run::RunArgs),

    /// Parse test files and validate every stage without sending anything
    Check(check::CheckArgs),
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Logs go to stderr so results on stdout stay clean
    let log_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let outcome = match cli.command {
        Commands::Run(args) => run::execute(args).await,
        Commands::Check(args) => check::execute(args),
    };

    match outcome {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            output::print_error(&format!("{:#}", e));
            std::process::exit(2);
        }
    }
}
