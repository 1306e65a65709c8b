//! Error types for stage execution

use std::path::PathBuf;
use thiserror::Error;
use wafreplay_common::Destination;

use crate::http::HttpError;

#[derive(Error, Debug)]
pub enum RunError {
    #[error("Configuration error: {0}")]
    Config(#[from] wafreplay_common::Error),

    #[error("Cannot open log file {path}: {source}")]
    LogFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot load test file {}: {source}", path.display())]
    TestFile {
        path: PathBuf,
        #[source]
        source: wafreplay_common::Error,
    },

    #[error("Bad test: choose between data, encoded_request, or raw_request")]
    BadTestRequest,

    #[error("Can't connect to destination {dest}: {source}")]
    Connection {
        dest: Destination,
        #[source]
        source: HttpError,
    },

    #[error("Failed sending request to destination {dest}: {source}")]
    Transport {
        dest: Destination,
        #[source]
        source: HttpError,
    },

    #[error("Can't find log marker. Am I reading the correct log? Log file: {}", log_file.display())]
    MarkerNotFound { log_file: PathBuf },

    #[error("Failed to find start marker: {0}")]
    StartMarker(#[source] Box<RunError>),

    #[error("Failed to find end marker: {0}")]
    EndMarker(#[source] Box<RunError>),
}

impl RunError {
    /// The error that caused a marker phase to fail
    pub fn root(&self) -> &RunError {
        match self {
            RunError::StartMarker(inner) | RunError::EndMarker(inner) => inner.root(),
            other => other,
        }
    }
}

pub type RunResult<T> = Result<T, RunError>;
