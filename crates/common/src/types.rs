//! Core types for wafreplay test definitions

use base64::Engine;
use serde::{Deserialize, Deserializer, Serialize};

use crate::{Error, Header, Result};

pub const DEFAULT_DEST_ADDR: &str = "localhost";
pub const DEFAULT_PORT: u16 = 80;
pub const DEFAULT_METHOD: &str = "GET";
pub const DEFAULT_URI: &str = "/";
pub const DEFAULT_VERSION: &str = "HTTP/1.1";

/// A test file: metadata plus the test cases it contains
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FtwTest {
    #[serde(default)]
    pub meta: TestMeta,

    #[serde(default)]
    pub tests: Vec<TestCase>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestMeta {
    #[serde(default)]
    pub author: String,

    /// Disabled files are reported as skipped without running any stage
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub description: String,
}

impl Default for TestMeta {
    fn default() -> Self {
        Self {
            author: String::new(),
            enabled: true,
            name: String::new(),
            description: String::new(),
        }
    }
}

fn default_enabled() -> bool {
    true
}

/// A single test case; its title doubles as the test id for overrides
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestCase {
    pub test_title: String,

    #[serde(default)]
    pub desc: String,

    #[serde(default)]
    pub stages: Vec<StageEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageEntry {
    pub stage: Stage,
}

/// One request plus the expectations it is checked against
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Stage {
    #[serde(default)]
    pub input: Input,

    #[serde(default)]
    pub output: Output,
}

/// Transport protocol of a destination
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    #[default]
    Http,
    Https,
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Protocol::Http => write!(f, "http"),
            Protocol::Https => write!(f, "https"),
        }
    }
}

/// Resolved network target of a stage
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Destination {
    pub dest_addr: String,
    pub port: u16,
    pub protocol: Protocol,
}

impl std::fmt::Display for Destination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}://{}:{}", self.protocol, self.dest_addr, self.port)
    }
}

/// Request side of a stage.
///
/// The body can be given in exactly one of three forms: `data` (structured
/// request), `encoded_request` (base64 of the full request) or `raw_request`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Input {
    #[serde(default)]
    pub dest_addr: Option<String>,

    #[serde(default)]
    pub port: Option<u16>,

    #[serde(default)]
    pub protocol: Option<Protocol>,

    #[serde(default)]
    pub method: Option<String>,

    #[serde(default)]
    pub uri: Option<String>,

    #[serde(default)]
    pub version: Option<String>,

    #[serde(default)]
    pub headers: Header,

    #[serde(default)]
    pub data: Option<String>,

    #[serde(default)]
    pub encoded_request: Option<String>,

    #[serde(default)]
    pub raw_request: Option<String>,

    /// Send the request exactly as written, without header completion
    #[serde(default)]
    pub stop_magic: bool,
}

impl Input {
    pub fn dest_addr(&self) -> &str {
        self.dest_addr.as_deref().unwrap_or(DEFAULT_DEST_ADDR)
    }

    pub fn port(&self) -> u16 {
        self.port.unwrap_or(DEFAULT_PORT)
    }

    pub fn protocol(&self) -> Protocol {
        self.protocol.unwrap_or_default()
    }

    pub fn method(&self) -> &str {
        self.method.as_deref().unwrap_or(DEFAULT_METHOD)
    }

    pub fn uri(&self) -> &str {
        self.uri.as_deref().unwrap_or(DEFAULT_URI)
    }

    pub fn version(&self) -> &str {
        self.version.as_deref().unwrap_or(DEFAULT_VERSION)
    }

    pub fn destination(&self) -> Destination {
        Destination {
            dest_addr: self.dest_addr().to_string(),
            port: self.port(),
            protocol: self.protocol(),
        }
    }

    /// Number of request-body forms set on this input
    pub fn request_forms(&self) -> usize {
        [
            is_set(&self.data),
            is_set(&self.encoded_request),
            is_set(&self.raw_request),
        ]
        .into_iter()
        .filter(|set| *set)
        .count()
    }

    /// At most one of data, encoded_request and raw_request may be set
    pub fn is_well_formed(&self) -> bool {
        self.request_forms() <= 1
    }

    /// Full request bytes when the input uses the encoded or raw form
    pub fn raw_request_bytes(&self) -> Result<Option<Vec<u8>>> {
        if let Some(encoded) = self.encoded_request.as_deref().filter(|s| !s.is_empty()) {
            let compact: String = encoded.split_whitespace().collect();
            let bytes = base64::engine::general_purpose::STANDARD
                .decode(compact)
                .map_err(|e| Error::BadEncodedRequest(e.to_string()))?;
            return Ok(Some(bytes));
        }
        Ok(self
            .raw_request
            .as_deref()
            .filter(|s| !s.is_empty())
            .map(|s| s.as_bytes().to_vec()))
    }

    /// Body bytes for the structured form
    pub fn data_bytes(&self) -> Option<Vec<u8>> {
        self.data
            .as_deref()
            .filter(|s| !s.is_empty())
            .map(|s| s.as_bytes().to_vec())
    }
}

fn is_set(value: &Option<String>) -> bool {
    value.as_deref().map(|s| !s.is_empty()).unwrap_or(false)
}

/// Expected side of a stage
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Output {
    #[serde(default, deserialize_with = "one_or_many")]
    pub status: Vec<u16>,

    #[serde(default)]
    pub response_contains: Option<String>,

    #[serde(default)]
    pub log_contains: Option<String>,

    #[serde(default)]
    pub no_log_contains: Option<String>,

    #[serde(default)]
    pub expect_error: bool,
}

impl Output {
    pub fn response_contains(&self) -> Option<&str> {
        self.response_contains.as_deref().filter(|s| !s.is_empty())
    }

    pub fn log_contains(&self) -> Option<&str> {
        self.log_contains.as_deref().filter(|s| !s.is_empty())
    }

    pub fn no_log_contains(&self) -> Option<&str> {
        self.no_log_contains.as_deref().filter(|s| !s.is_empty())
    }
}

fn one_or_many<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Vec<u16>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(u16),
        Many(Vec<u16>),
    }

    Ok(match Option::<OneOrMany>::deserialize(deserializer)? {
        None => Vec::new(),
        Some(OneOrMany::One(code)) => vec![code],
        Some(OneOrMany::Many(codes)) => codes,
    })
}

/// Classified outcome of a stage (or of a skipped test case)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestResult {
    Success,
    Failed,
    Skipped,
    Ignored,
    ForceFail,
    ForcePass,
}

impl TestResult {
    pub const ALL: [TestResult; 6] = [
        TestResult::Success,
        TestResult::Failed,
        TestResult::Skipped,
        TestResult::Ignored,
        TestResult::ForceFail,
        TestResult::ForcePass,
    ];

    /// Whether the outcome counts as an executed stage
    pub fn counts_as_run(&self) -> bool {
        !matches!(self, TestResult::Skipped | TestResult::Ignored)
    }

    /// Whether the outcome makes the whole run unsuccessful
    pub fn is_failure(&self) -> bool {
        matches!(self, TestResult::Failed | TestResult::ForceFail)
    }
}

impl std::fmt::Display for TestResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TestResult::Success => write!(f, "success"),
            TestResult::Failed => write!(f, "failed"),
            TestResult::Skipped => write!(f, "skipped"),
            TestResult::Ignored => write!(f, "ignored"),
            TestResult::ForceFail => write!(f, "force_fail"),
            TestResult::ForcePass => write!(f, "force_pass"),
        }
    }
}
