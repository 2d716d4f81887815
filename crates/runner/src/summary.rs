//! Test summary: the value every run returns

use canary_common::EnvironmentInfo;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::path::Path;

use crate::error::{RunError, RunnerResult};
use crate::scope::TestScope;

/// Serialized stand-in for a count the available signal could not determine
pub const UNDETERMINED: i64 = -1;

/// A test count that is either exact or undeterminable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Count {
    Exact(u64),
    #[default]
    Undetermined,
}

impl Count {
    pub const ZERO: Count = Count::Exact(0);

    pub fn value(&self) -> Option<u64> {
        match self {
            Count::Exact(n) => Some(*n),
            Count::Undetermined => None,
        }
    }

    pub fn is_determined(&self) -> bool {
        matches!(self, Count::Exact(_))
    }

    pub fn is_zero(&self) -> bool {
        *self == Count::ZERO
    }

    /// Integer form with [`UNDETERMINED`] as the sentinel
    pub fn as_i64(&self) -> i64 {
        match self {
            Count::Exact(n) => i64::try_from(*n).unwrap_or(i64::MAX),
            Count::Undetermined => UNDETERMINED,
        }
    }

    pub fn from_i64(n: i64) -> Self {
        u64::try_from(n).map(Count::Exact).unwrap_or(Count::Undetermined)
    }
}

impl From<u64> for Count {
    fn from(n: u64) -> Self {
        Count::Exact(n)
    }
}

impl fmt::Display for Count {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Count::Exact(n) => write!(f, "{}", n),
            Count::Undetermined => f.write_str("?"),
        }
    }
}

impl Serialize for Count {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(self.as_i64())
    }
}

impl<'de> Deserialize<'de> for Count {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        i64::deserialize(deserializer).map(Count::from_i64)
    }
}

/// Classification of a whole run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestStatus {
    Passed,
    Failed,
    Error,
}

impl fmt::Display for TestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TestStatus::Passed => "PASSED",
            TestStatus::Failed => "FAILED",
            TestStatus::Error => "ERROR",
        })
    }
}

/// Most precise signal that contributed counts to a summary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CountSource {
    /// The tool never completed
    None,
    ExitCode,
    Output,
    Report,
}

/// Result of one run. A snapshot: never updated after it is returned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestSummary {
    pub scope: TestScope,
    pub status: TestStatus,
    pub total: Count,
    pub passed: Count,
    pub failed: Count,
    pub skipped: Count,
    pub errored: Count,
    /// Seconds
    pub duration: f64,
    pub source: CountSource,
    /// `passed` came from a summary line or the report rather than being
    /// inferred from other counts
    #[serde(default)]
    pub passed_reported: bool,
    pub exit_code: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RunError>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<EnvironmentInfo>,
    pub finished_at: chrono::DateTime<chrono::Utc>,
}

impl TestSummary {
    /// ERROR summary for a run the tool never completed: `errored` is
    /// undetermined and nothing else is inferred.
    pub fn infrastructure_error(scope: TestScope, error: RunError, duration: f64) -> Self {
        Self {
            scope,
            status: TestStatus::Error,
            total: Count::ZERO,
            passed: Count::ZERO,
            failed: Count::ZERO,
            skipped: Count::ZERO,
            errored: Count::Undetermined,
            duration,
            source: CountSource::None,
            passed_reported: false,
            exit_code: None,
            error: Some(error),
            environment: None,
            finished_at: chrono::Utc::now(),
        }
    }

    pub fn with_environment(mut self, environment: EnvironmentInfo) -> Self {
        self.environment = Some(environment);
        self
    }

    /// Caller-facing process exit code: 0 only when nothing failed or errored
    pub fn exit_code(&self) -> i32 {
        match self.status {
            TestStatus::Error => 2,
            _ if self.failed.is_zero() && self.errored.is_zero() => 0,
            _ => 1,
        }
    }

    pub fn is_success(&self) -> bool {
        self.exit_code() == 0
    }

    /// `passed + failed + skipped + errored <= total`, checked only when every
    /// count is determined
    pub fn is_consistent(&self) -> bool {
        let counts = [self.passed, self.failed, self.skipped, self.errored];
        match (
            self.total.value(),
            counts.iter().map(Count::value).sum::<Option<u64>>(),
        ) {
            (Some(total), Some(sum)) => sum <= total,
            _ => true,
        }
    }

    /// Render the summary as a JSON report artifact
    pub fn write_json(&self, path: &Path) -> RunnerResult<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}

impl fmt::Display for TestSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} total, {} passed, {} failed, {} skipped, {} errors in {:.2}s",
            self.status, self.total, self.passed, self.failed, self.skipped, self.errored, self.duration
        )?;
        if let Some(error) = &self.error {
            write!(f, " ({})", error)?;
        }
        Ok(())
    }
}
