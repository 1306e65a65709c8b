//! Run configuration

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::{Error, Protocol, Result};

/// How the WAF log can be reached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    /// Local log file available and required
    #[default]
    Default,
    /// No log access; only the HTTP response is checked
    Cloud,
}

impl std::fmt::Display for RunMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunMode::Default => write!(f, "default"),
            RunMode::Cloud => write!(f, "cloud"),
        }
    }
}

/// Runner configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// WAF log file consulted for markers and log assertions
    pub log_file: Option<PathBuf>,

    /// Header carrying the per-stage marker on probe requests
    pub log_marker_header_name: String,

    /// Run mode
    pub mode: RunMode,

    /// How many lines from the end of the log are searched for a marker
    pub max_marker_log_lines: usize,

    /// Connect timeout in milliseconds
    pub connect_timeout_ms: u64,

    /// Read timeout in milliseconds
    pub read_timeout_ms: u64,

    /// Global overrides
    pub test_override: TestOverride,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            log_file: None,
            log_marker_header_name: "X-CRS-Test".to_string(),
            mode: RunMode::Default,
            max_marker_log_lines: 500,
            connect_timeout_ms: 3_000,
            read_timeout_ms: 1_000,
            test_override: TestOverride::default(),
        }
    }
}

/// Overrides applied to every stage, or to stages of matching test ids
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TestOverride {
    pub input: InputOverride,

    /// Test id pattern -> reason; matching tests are ignored
    pub ignore: BTreeMap<String, String>,

    /// Test id pattern -> reason; matching tests are forced to fail
    pub force_fail: BTreeMap<String, String>,

    /// Test id pattern -> reason; matching tests are forced to pass
    pub force_pass: BTreeMap<String, String>,
}

/// Destination overrides, each independently optional
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InputOverride {
    pub dest_addr: Option<String>,
    pub port: Option<u16>,
    pub protocol: Option<Protocol>,
}

impl RunnerConfig {
    /// Load configuration from file
    pub fn load(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Self = toml::from_str(&content)?;
            tracing::debug!("Loaded configuration from {}", path.display());
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Parse configuration from a TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Check the configuration before a run starts
    pub fn validate(&self) -> Result<()> {
        if !is_header_token(&self.log_marker_header_name) {
            return Err(Error::InvalidConfig(format!(
                "invalid log marker header name '{}'",
                self.log_marker_header_name
            )));
        }

        if self.max_marker_log_lines == 0 {
            return Err(Error::InvalidConfig(
                "max_marker_log_lines must be greater than zero".to_string(),
            ));
        }

        if self.mode == RunMode::Default && self.log_file.is_none() {
            return Err(Error::InvalidConfig(
                "no log file supplied; set log_file or use cloud mode".to_string(),
            ));
        }

        let overrides = &self.test_override;
        for pattern in overrides
            .ignore
            .keys()
            .chain(overrides.force_fail.keys())
            .chain(overrides.force_pass.keys())
        {
            regex::Regex::new(pattern).map_err(|source| Error::InvalidPattern {
                pattern: pattern.clone(),
                source,
            })?;
        }

        Ok(())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

fn is_header_token(name: &str) -> bool {
    !name.is_empty()
        && name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let config = RunnerConfig::from_toml(
            r#"
log_file = "/var/log/modsec_audit.log"
log_marker_header_name = "X-Marker"
mode = "default"
max_marker_log_lines = 200

[test_override.input]
dest_addr = "127.0.0.1"
port = 8080
protocol = "https"

[test_override.ignore]
"920100-4" = "known false positive"

[test_override.force_pass]
"^942.*" = "sqli rules under review"
"#,
        )
        .unwrap();

        assert_eq!(config.log_file, Some(PathBuf::from("/var/log/modsec_audit.log")));
        assert_eq!(config.log_marker_header_name, "X-Marker");
        assert_eq!(config.max_marker_log_lines, 200);
        assert_eq!(config.test_override.input.port, Some(8080));
        assert_eq!(config.test_override.input.protocol, Some(Protocol::Https));
        assert_eq!(config.test_override.ignore.len(), 1);
        assert_eq!(config.read_timeout_ms, 1_000);
        config.validate().unwrap();
    }

    #[test]
    fn test_default_mode_requires_log_file() {
        let config = RunnerConfig::default();
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));

        let cloud = RunnerConfig {
            mode: RunMode::Cloud,
            ..Default::default()
        };
        cloud.validate().unwrap();
    }

    #[test]
    fn test_invalid_override_pattern_is_rejected() {
        let mut config = RunnerConfig {
            mode: RunMode::Cloud,
            ..Default::default()
        };
        config
            .test_override
            .force_fail
            .insert("(unclosed".to_string(), "bad".to_string());
        assert!(matches!(config.validate(), Err(Error::InvalidPattern { .. })));
    }

    #[test]
    fn test_invalid_header_name_is_rejected() {
        let config = RunnerConfig {
            mode: RunMode::Cloud,
            log_marker_header_name: "X Marker".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = RunnerConfig::load(&dir.path().join("missing.toml")).unwrap();
        assert_eq!(config.log_marker_header_name, "X-CRS-Test");
        assert_eq!(config.mode, RunMode::Default);
    }
}
