//! Which tests run, and which results are forced without running

use regex::Regex;
use tracing::debug;
use wafreplay_common::{Error, Input, InputOverride, TestOverride, TestResult};

/// Why a test case did not run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Disabled,
    Filtered,
}

/// Include/exclude filters on test titles
#[derive(Debug, Clone, Default)]
pub struct TestFilter {
    pub include: Option<Regex>,
    pub exclude: Option<Regex>,
}

impl TestFilter {
    pub fn new(include: Option<Regex>, exclude: Option<Regex>) -> Self {
        Self { include, exclude }
    }

    /// `None` when the test case should run
    pub fn skip_reason(&self, title: &str, enabled: bool) -> Option<SkipReason> {
        if !enabled {
            return Some(SkipReason::Disabled);
        }

        match &self.include {
            // An explicit inclusion always wins over exclusion
            Some(include) if include.is_match(title) => None,
            Some(_) => Some(SkipReason::Filtered),
            None => match &self.exclude {
                Some(exclude) if exclude.is_match(title) => Some(SkipReason::Filtered),
                _ => None,
            },
        }
    }
}

#[derive(Debug, Clone)]
struct ForcedRule {
    pattern: Regex,
    reason: String,
}

/// Test ids whose result is decided by configuration
#[derive(Debug, Clone, Default)]
pub struct ForcedResults {
    ignore: Vec<ForcedRule>,
    force_fail: Vec<ForcedRule>,
    force_pass: Vec<ForcedRule>,
}

impl ForcedResults {
    pub fn compile(overrides: &TestOverride) -> Result<Self, Error> {
        Ok(Self {
            ignore: compile_rules(&overrides.ignore)?,
            force_fail: compile_rules(&overrides.force_fail)?,
            force_pass: compile_rules(&overrides.force_pass)?,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.ignore.is_empty() && self.force_fail.is_empty() && self.force_pass.is_empty()
    }

    /// Ignore beats force-fail, which beats force-pass
    pub fn forced_result(&self, id: &str) -> Option<TestResult> {
        let candidates = [
            (TestResult::Ignored, &self.ignore),
            (TestResult::ForceFail, &self.force_fail),
            (TestResult::ForcePass, &self.force_pass),
        ];

        for (result, rules) in candidates {
            if let Some(rule) = rules.iter().find(|r| r.pattern.is_match(id)) {
                debug!("Test {} forced to {}: {}", id, result, rule.reason);
                return Some(result);
            }
        }
        None
    }
}

fn compile_rules<'a>(
    entries: impl IntoIterator<Item = (&'a String, &'a String)>,
) -> Result<Vec<ForcedRule>, Error> {
    entries
        .into_iter()
        .map(|(pattern, reason)| {
            Regex::new(pattern)
                .map(|pattern| ForcedRule {
                    pattern,
                    reason: reason.clone(),
                })
                .map_err(|source| Error::InvalidPattern {
                    pattern: pattern.clone(),
                    source,
                })
        })
        .collect()
}

/// Apply the global destination overrides to a stage input.
/// Overriding the address also sets a Host header unless the test has one.
pub fn apply_input_override(input: &mut Input, overrides: &InputOverride) {
    if let Some(addr) = &overrides.dest_addr {
        debug!("Overriding dest_addr with {}", addr);
        input.dest_addr = Some(addr.clone());
        if !input.headers.contains("Host") {
            input.headers.set("Host", addr);
        }
    }
    if let Some(port) = overrides.port {
        debug!("Overriding port with {}", port);
        input.port = Some(port);
    }
    if let Some(protocol) = overrides.protocol {
        debug!("Overriding protocol with {}", protocol);
        input.protocol = Some(protocol);
    }
}
