//! Loading YAML test files

use std::path::{Path, PathBuf};
use tracing::debug;
use wafreplay_common::FtwTest;

use crate::error::{RunError, RunResult};

/// Parse a test file from a YAML string
pub fn from_yaml(yaml: &str) -> wafreplay_common::Result<FtwTest> {
    Ok(serde_yaml::from_str(yaml)?)
}

/// Parse a test file; an unnamed file takes its name from the file stem
pub fn from_file(path: &Path) -> RunResult<FtwTest> {
    let load = || -> wafreplay_common::Result<FtwTest> {
        let content = std::fs::read_to_string(path)?;
        from_yaml(&content)
    };
    let mut test = load().map_err(|source| RunError::TestFile {
        path: path.to_path_buf(),
        source,
    })?;

    if test.meta.name.is_empty() {
        if let Some(stem) = path.file_stem() {
            test.meta.name = stem.to_string_lossy().into_owned();
        }
    }
    Ok(test)
}

/// Load a single test file, or every `.yaml`/`.yml` file below a directory
/// in path order
pub fn load_all(path: &Path) -> RunResult<Vec<FtwTest>> {
    if path.is_file() {
        return Ok(vec![from_file(path)?]);
    }

    let mut files: Vec<PathBuf> = walkdir::WalkDir::new(path)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| {
            p.extension()
                .map(|ext| ext == "yaml" || ext == "yml")
                .unwrap_or(false)
        })
        .collect();
    files.sort();

    debug!("Found {} test file(s) in {}", files.len(), path.display());
    files.iter().map(|file| from_file(file)).collect()
}

/// A stage that cannot be executed as written
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageProblem {
    pub test_title: String,
    pub stage: usize,
    pub message: String,
}

impl std::fmt::Display for StageProblem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} stage {}: {}", self.test_title, self.stage, self.message)
    }
}

/// Check every stage without sending anything
pub fn validate(tests: &[FtwTest]) -> Vec<StageProblem> {
    let mut problems = Vec::new();
    for case in tests.iter().flat_map(|t| &t.tests) {
        for (idx, entry) in case.stages.iter().enumerate() {
            let input = &entry.stage.input;
            let message = if !input.is_well_formed() {
                Some(RunError::BadTestRequest.to_string())
            } else {
                input.raw_request_bytes().err().map(|e| e.to_string())
            };

            if let Some(message) = message {
                problems.push(StageProblem {
                    test_title: case.test_title.clone(),
                    stage: idx + 1,
                    message,
                });
            }
        }
    }
    problems
}
