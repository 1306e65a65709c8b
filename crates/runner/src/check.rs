//! Stage result evaluation
//!
//! A stage passes on the first satisfied signal: expected error, status
//! code, response body, log content, log absence. Rules run in [`RULES`]
//! order and each one either decides the outcome or defers to the next.

use tracing::debug;
use wafreplay_common::{Output, RunMode, TestResult};

use crate::http::{HttpError, Response};
use crate::waflog::LogWindow;

/// Status codes accepted in cloud mode in place of a `log_contains` check
pub const CLOUD_LOG_CONTAINS_STATUS: &[u16] = &[403];

/// Status codes accepted in cloud mode in place of a `no_log_contains` check
pub const CLOUD_NO_LOG_CONTAINS_STATUS: &[u16] = &[200, 404, 405];

/// What a single rule concluded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Pass,
    Fail,
    Next,
}

/// A named predicate in the evaluation chain
pub struct Rule {
    pub name: &'static str,
    pub apply: fn(&Check<'_>) -> Verdict,
}

/// Evaluation order
pub const RULES: &[Rule] = &[
    Rule {
        name: "expected_error",
        apply: expected_error,
    },
    Rule {
        name: "unexpected_error",
        apply: unexpected_error,
    },
    Rule {
        name: "status",
        apply: status_matches,
    },
    Rule {
        name: "response_contains",
        apply: response_contains,
    },
    Rule {
        name: "log_contains",
        apply: log_contains,
    },
    Rule {
        name: "no_log_contains",
        apply: no_log_contains,
    },
];

/// Everything the rules look at for one stage
pub struct Check<'a> {
    outcome: &'a Result<Response, HttpError>,
    status: Vec<u16>,
    response_contains: Option<&'a str>,
    log_contains: Option<&'a str>,
    no_log_contains: Option<&'a str>,
    expect_error: bool,
    log: Option<&'a LogWindow>,
}

impl<'a> Check<'a> {
    /// Build the check for a stage. In cloud mode the log is never consulted
    /// and log assertions turn into extra accepted status codes.
    pub fn new(
        expected: &'a Output,
        run_mode: RunMode,
        outcome: &'a Result<Response, HttpError>,
        log: Option<&'a LogWindow>,
    ) -> Self {
        let mut check = Self {
            outcome,
            status: expected.status.clone(),
            response_contains: expected.response_contains(),
            log_contains: expected.log_contains(),
            no_log_contains: expected.no_log_contains(),
            expect_error: expected.expect_error,
            log,
        };
        if run_mode == RunMode::Cloud {
            check.set_cloud_mode();
        }
        check
    }

    fn set_cloud_mode(&mut self) {
        self.log = None;
        if self.log_contains.take().is_some() {
            self.status.extend_from_slice(CLOUD_LOG_CONTAINS_STATUS);
            self.no_log_contains = None;
        } else if self.no_log_contains.take().is_some() {
            self.status.extend_from_slice(CLOUD_NO_LOG_CONTAINS_STATUS);
        }
    }

    /// Status codes accepted after any cloud-mode translation
    pub fn expected_status(&self) -> &[u16] {
        &self.status
    }

    /// Run the rules in order; the first decision wins
    pub fn evaluate(&self) -> TestResult {
        for rule in RULES {
            match (rule.apply)(self) {
                Verdict::Pass => {
                    debug!("Stage passed on rule {}", rule.name);
                    return TestResult::Success;
                }
                Verdict::Fail => {
                    debug!("Stage failed on rule {}", rule.name);
                    return TestResult::Failed;
                }
                Verdict::Next => {}
            }
        }
        debug!("No rule matched");
        TestResult::Failed
    }

    fn response(&self) -> Option<&Response> {
        self.outcome.as_ref().ok()
    }
}

/// Evaluate a stage outcome against its expected output
pub fn check_result(
    expected: &Output,
    run_mode: RunMode,
    outcome: &Result<Response, HttpError>,
    log: Option<&LogWindow>,
) -> TestResult {
    Check::new(expected, run_mode, outcome, log).evaluate()
}

fn expected_error(c: &Check<'_>) -> Verdict {
    if c.outcome.is_err() && c.expect_error {
        Verdict::Pass
    } else {
        Verdict::Next
    }
}

fn unexpected_error(c: &Check<'_>) -> Verdict {
    if c.outcome.is_err() {
        Verdict::Fail
    } else {
        Verdict::Next
    }
}

fn status_matches(c: &Check<'_>) -> Verdict {
    match c.response() {
        Some(response) if c.status.contains(&response.status) => Verdict::Pass,
        _ => Verdict::Next,
    }
}

fn response_contains(c: &Check<'_>) -> Verdict {
    match (c.response(), c.response_contains) {
        (Some(response), Some(needle)) if response.body_as_string().contains(needle) => Verdict::Pass,
        _ => Verdict::Next,
    }
}

fn log_contains(c: &Check<'_>) -> Verdict {
    match (c.log, c.log_contains) {
        (Some(log), Some(needle)) if log.contains(needle) => Verdict::Pass,
        _ => Verdict::Next,
    }
}

fn no_log_contains(c: &Check<'_>) -> Verdict {
    match (c.log, c.no_log_contains) {
        (Some(log), Some(needle)) if !log.contains(needle) => Verdict::Pass,
        _ => Verdict::Next,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{refused, response};

    fn output(status: &[u16]) -> Output {
        Output {
            status: status.to_vec(),
            ..Default::default()
        }
    }

    fn window(lines: &[&str]) -> LogWindow {
        LogWindow::new(lines.iter().map(|l| l.as_bytes().to_vec()).collect())
    }

    #[test]
    fn test_rule_order() {
        let names: Vec<_> = RULES.iter().map(|r| r.name).collect();
        assert_eq!(
            names,
            vec![
                "expected_error",
                "unexpected_error",
                "status",
                "response_contains",
                "log_contains",
                "no_log_contains"
            ]
        );
    }

    #[test]
    fn test_status_match_passes() {
        let outcome = Ok(response(200, ""));
        let result = check_result(&output(&[200]), RunMode::Default, &outcome, Some(&LogWindow::default()));
        assert_eq!(result, TestResult::Success);
    }

    #[test]
    fn test_status_wins_over_body() {
        let mut expected = output(&[200]);
        expected.response_contains = Some("never there".to_string());
        let outcome = Ok(response(200, "something else"));
        let check = Check::new(&expected, RunMode::Default, &outcome, None);
        assert_eq!((RULES[2].apply)(&check), Verdict::Pass);
        assert_eq!((RULES[3].apply)(&check), Verdict::Next);
        assert_eq!(check.evaluate(), TestResult::Success);
    }

    #[test]
    fn test_expected_error_observed() {
        let mut expected = output(&[]);
        expected.expect_error = true;
        let outcome = Err(refused());
        assert_eq!(
            check_result(&expected, RunMode::Default, &outcome, None),
            TestResult::Success
        );
    }

    #[test]
    fn test_unexpected_error_fails_even_with_log_match() {
        let mut expected = output(&[]);
        expected.log_contains = Some("id \"920100\"".to_string());
        let outcome = Err(refused());
        let log = window(&["id \"920100\""]);
        assert_eq!(
            check_result(&expected, RunMode::Default, &outcome, Some(&log)),
            TestResult::Failed
        );
    }

    #[test]
    fn test_expect_error_without_error_uses_other_rules() {
        let mut expected = output(&[200]);
        expected.expect_error = true;
        let outcome = Ok(response(200, ""));
        assert_eq!(
            check_result(&expected, RunMode::Default, &outcome, None),
            TestResult::Success
        );
    }

    #[test]
    fn test_response_body_match() {
        let mut expected = output(&[403]);
        expected.response_contains = Some("Access denied".to_string());
        let outcome = Ok(response(200, "<h1>Access denied</h1>"));
        assert_eq!(
            check_result(&expected, RunMode::Default, &outcome, None),
            TestResult::Success
        );
    }

    #[test]
    fn test_log_contains_passes_despite_status_mismatch() {
        let mut expected = output(&[403]);
        expected.log_contains = Some("id \"920100\"".to_string());
        let outcome = Ok(response(200, ""));
        let log = window(&["[id \"920100\"] [msg \"Invalid HTTP Request Line\"]"]);
        assert_eq!(
            check_result(&expected, RunMode::Default, &outcome, Some(&log)),
            TestResult::Success
        );
    }

    #[test]
    fn test_no_log_contains() {
        let mut expected = output(&[]);
        expected.no_log_contains = Some("id \"942100\"".to_string());
        let outcome = Ok(response(200, ""));

        let clean = window(&["id \"920100\""]);
        assert_eq!(
            check_result(&expected, RunMode::Default, &outcome, Some(&clean)),
            TestResult::Success
        );

        let dirty = window(&["id \"942100\""]);
        assert_eq!(
            check_result(&expected, RunMode::Default, &outcome, Some(&dirty)),
            TestResult::Failed
        );
    }

    #[test]
    fn test_nothing_matches_fails() {
        let mut expected = output(&[403]);
        expected.response_contains = Some("blocked".to_string());
        expected.log_contains = Some("id \"920100\"".to_string());
        let outcome = Ok(response(200, "welcome"));
        let log = window(&["nothing relevant"]);
        assert_eq!(
            check_result(&expected, RunMode::Default, &outcome, Some(&log)),
            TestResult::Failed
        );
    }

    #[test]
    fn test_cloud_mode_ignores_log() {
        let mut expected = output(&[]);
        expected.log_contains = Some("id \"920100\"".to_string());
        let outcome = Ok(response(200, ""));
        let log = window(&["id \"920100\""]);
        let check = Check::new(&expected, RunMode::Cloud, &outcome, Some(&log));
        assert_eq!(check.expected_status(), &[403]);
        assert_eq!(check.evaluate(), TestResult::Failed);
    }

    #[test]
    fn test_cloud_mode_translates_log_assertions() {
        let mut blocked = output(&[]);
        blocked.log_contains = Some("id \"920100\"".to_string());
        let forbidden = Ok(response(403, ""));
        assert_eq!(
            check_result(&blocked, RunMode::Cloud, &forbidden, None),
            TestResult::Success
        );

        let mut allowed = output(&[]);
        allowed.no_log_contains = Some("id \"920100\"".to_string());
        let check_outcome = Ok(response(404, ""));
        let check = Check::new(&allowed, RunMode::Cloud, &check_outcome, None);
        assert_eq!(check.expected_status(), &[200, 404, 405]);
        assert_eq!(check.evaluate(), TestResult::Success);
    }
}
