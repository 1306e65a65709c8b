//! Check Command

use anyhow::Result;
use clap::Args;
use std::path::PathBuf;
use wafreplay_runner::loader;

use crate::output::{print_error, print_success};

#[derive(Args)]
pub struct CheckArgs {
    /// Test file or directory of test files
    #[arg(short, long, default_value = ".")]
    pub dir: PathBuf,
}

pub fn execute(args: CheckArgs) -> Result<bool> {
    let tests = loader::load_all(&args.dir)?;
    let problems = loader::validate(&tests);

    for problem in &problems {
        print_error(&problem.to_string());
    }

    let cases: usize = tests.iter().map(|t| t.tests.len()).sum();
    let stages: usize = tests
        .iter()
        .flat_map(|t| &t.tests)
        .map(|c| c.stages.len())
        .sum();

    if problems.is_empty() {
        print_success(&format!(
            "Checked {} test(s) with {} stage(s) in {} file(s)",
            cases,
            stages,
            tests.len()
        ));
    }
    Ok(problems.is_empty())
}
