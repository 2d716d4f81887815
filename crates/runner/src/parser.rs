//! Result parser
//!
//! Turns a raw tool execution into a [`TestSummary`]. Three signals are
//! layered, each overriding the previous one field by field:
//!
//! 1. the exit code (coarse: passed / failed / tool error),
//! 2. summary lines in stdout (`collected 3 items`, `2 passed, 1 failed`),
//! 3. the structured JSON report, when the tool wrote one.
//!
//! The textual format is not a stable contract, so nothing here fails: an
//! unrecognized output or a broken report only costs precision, and counts
//! that cannot be known stay [`Count::Undetermined`].

use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::error::RunError;
use crate::invoker::{ExitClass, RawExecutionResult};
use crate::report::StructuredReport;
use crate::scope::TestScope;
use crate::summary::{Count, CountSource, TestStatus, TestSummary};

static COLLECTED: Lazy<Regex> = Lazy::new(|| Regex::new(r"\bcollected (\d+) items?\b").unwrap());
static ITEMS_COLLECTED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(\d+) items? collected\b").unwrap());
static SELECTED: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(\d+) selected\b").unwrap());
static PASSED: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(\d+) passed\b").unwrap());
static FAILED: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(\d+) failed\b").unwrap());
static SKIPPED: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(\d+) skipped\b").unwrap());
static ERRORS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(\d+) errors?\b").unwrap());
static SESSION_SUMMARY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b\d+ (?:passed|failed|skipped|errors?|deselected|xfailed|xpassed|warnings?)\b.* in (\d+(?:\.\d+)?)s\b")
        .unwrap()
});

/// Counts being assembled from the layers
#[derive(Debug, Clone, PartialEq)]
struct Tally {
    total: Count,
    passed: Count,
    failed: Count,
    skipped: Count,
    errored: Count,
    duration: f64,
    source: CountSource,
    /// `passed` was read from output or report, not inferred
    passed_reported: bool,
}

impl Tally {
    /// Lowest layer: what the exit code alone implies
    fn from_exit(class: ExitClass, wall_clock: f64) -> Self {
        let (passed, failed, skipped, errored) = match class {
            ExitClass::Ok => (Count::Undetermined, Count::ZERO, Count::ZERO, Count::ZERO),
            ExitClass::TestsFailed => (
                Count::Undetermined,
                Count::Undetermined,
                Count::ZERO,
                Count::ZERO,
            ),
            _ => (Count::ZERO, Count::ZERO, Count::ZERO, Count::Undetermined),
        };
        Self {
            total: Count::Undetermined,
            passed,
            failed,
            skipped,
            errored,
            duration: wall_clock,
            source: CountSource::ExitCode,
            passed_reported: false,
        }
    }

    /// Middle layer: header and summary lines. Returns whether anything
    /// was recognized.
    fn apply_output(&mut self, stdout: &str) -> bool {
        let mut matched = false;

        // Outcome counts come only from the final session summary line;
        // test chatter elsewhere ("2 failed attempts") is ignored
        if let Some(line) = stdout.lines().rev().find(|line| SESSION_SUMMARY.is_match(line)) {
            let outcomes = [&*PASSED, &*FAILED, &*SKIPPED, &*ERRORS].map(|re| last_number(re, line));
            // The summary line omits outcomes that did not occur
            let [passed, failed, skipped, errored] = outcomes.map(|n| Count::Exact(n.unwrap_or(0)));
            self.passed = passed;
            self.failed = failed;
            self.skipped = skipped;
            self.errored = errored;
            self.passed_reported = true;
            matched = true;

            if let Some(secs) = last_number_f64(&SESSION_SUMMARY, line) {
                self.duration = secs;
            }
        }

        let collected = last_number(&COLLECTED, stdout).or_else(|| last_number(&ITEMS_COLLECTED, stdout));
        if let Some(total) = last_number(&SELECTED, stdout).or(collected) {
            self.total = Count::Exact(total);
            matched = true;
        }

        if matched {
            self.source = CountSource::Output;
        }
        matched
    }

    /// Top layer: the structured report, for every field it defines
    fn apply_report(&mut self, report: &StructuredReport) {
        let s = &report.summary;
        let overrides = [
            (&mut self.total, s.total),
            (&mut self.passed, s.passed),
            (&mut self.failed, s.failed),
            (&mut self.skipped, s.skipped),
            (&mut self.errored, s.errored),
        ];
        for (field, value) in overrides {
            if let Some(n) = value {
                *field = Count::Exact(n);
            }
        }
        if let Some(duration) = report.duration() {
            self.duration = duration;
        }
        self.passed_reported |= s.passed.is_some();
        self.source = CountSource::Report;
    }

    /// Fill counts that follow arithmetically from the others
    fn normalize(&mut self) {
        let others = [self.failed, self.skipped, self.errored]
            .iter()
            .map(Count::value)
            .sum::<Option<u64>>();

        if !self.total.is_determined() {
            if let (Some(passed), Some(others)) = (self.passed.value(), others) {
                self.total = Count::Exact(passed + others);
            }
        }

        if !self.passed.is_determined() {
            if let (Some(total), Some(others)) = (self.total.value(), others) {
                if let Some(passed) = total.checked_sub(others) {
                    self.passed = Count::Exact(passed);
                }
            }
        }
    }

    /// Tool errors come from the exit code; otherwise the final counts
    /// decide, so status and `TestSummary::exit_code` always agree
    fn status(&self, class: ExitClass) -> TestStatus {
        if class.is_tool_error() {
            TestStatus::Error
        } else if self.failed.is_zero() && self.errored.is_zero() {
            TestStatus::Passed
        } else {
            TestStatus::Failed
        }
    }
}

fn last_capture<'t>(re: &Regex, text: &'t str) -> Option<&'t str> {
    re.captures_iter(text)
        .last()
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

fn last_number(re: &Regex, text: &str) -> Option<u64> {
    last_capture(re, text).and_then(|n| n.parse().ok())
}

fn last_number_f64(re: &Regex, text: &str) -> Option<f64> {
    last_capture(re, text).and_then(|n| n.parse().ok())
}

/// Build a summary from one execution and, optionally, its structured report.
///
/// The returned summary has scope [`TestScope::All`]; callers that ran a
/// narrower scope set it before handing the summary on.
pub fn parse(raw: &RawExecutionResult, report_path: Option<&Path>) -> TestSummary {
    let class = raw.exit_class();
    let mut tally = Tally::from_exit(class, raw.duration.as_secs_f64());

    if !tally.apply_output(&raw.stdout) {
        debug!("No summary lines recognized in tool output");
    }

    if let Some(report) = report_path.and_then(StructuredReport::load) {
        tally.apply_report(&report);
    }

    tally.normalize();

    let status = tally.status(class);
    let error = (status == TestStatus::Error).then(|| RunError::Tool {
        code: raw.exit_code,
    });

    let summary = TestSummary {
        scope: TestScope::All,
        status,
        total: tally.total,
        passed: tally.passed,
        failed: tally.failed,
        skipped: tally.skipped,
        errored: tally.errored,
        duration: tally.duration.max(0.0),
        source: tally.source,
        passed_reported: tally.passed_reported,
        exit_code: raw.exit_code,
        error,
        environment: None,
        finished_at: chrono::Utc::now(),
    };

    if !summary.is_consistent() {
        warn!(
            "Parsed counts are inconsistent ({} outcomes exceed {} total)",
            [summary.passed, summary.failed, summary.skipped, summary.errored]
                .iter()
                .filter_map(Count::value)
                .sum::<u64>(),
            summary.total
        );
    }
    if [summary.total, summary.passed, summary.failed, summary.skipped, summary.errored]
        .iter()
        .any(|c| !c.is_determined())
    {
        info!("Exact counts unavailable from {:?} signal: {}", summary.source, summary);
    }

    summary
}
