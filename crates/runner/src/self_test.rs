//! Self-test harness
//!
//! Runs a throwaway, always-passing test through the same invoker and parser
//! path as a real run. Each call goes PREPARE -> EXECUTE -> CLEANUP:
//!
//! - PREPARE writes one trivial test file into a fresh temporary directory
//!   (unique per call, so concurrent self-tests never collide).
//! - EXECUTE runs the executor against that single file with no scope,
//!   marker or keyword, then parses the result.
//! - CLEANUP removes the directory. The directory is owned by a
//!   [`tempfile::TempDir`], so it is also removed when EXECUTE errors or
//!   panics.
//!
//! The outcome is reported exactly once on the self-test diagnostic channel.

use canary_common::{SelfTestSettings, SELF_TEST_TARGET};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tempfile::TempDir;
use tracing::{debug, info, warn};

use crate::error::RunError;
use crate::invocation::Invocation;
use crate::invoker::TestExecutor;
use crate::parser;
use crate::scope::TestScope;
use crate::summary::{Count, TestStatus, TestSummary};

/// File name of the generated test
pub const SELF_TEST_FILE: &str = "test_canary_selftest.py";

const SELF_TEST_SOURCE: &str = "\
def test_canary_selftest():
    assert 1 + 1 == 2
";

/// Who asked for the self-test
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelfTestMode {
    Standalone,
    /// Gate in front of a dependent system's startup
    Preflight,
}

impl fmt::Display for SelfTestMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SelfTestMode::Standalone => "invoked standalone",
            SelfTestMode::Preflight => "invoked as pre-flight gate",
        })
    }
}

/// How strongly a passing self-test was confirmed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confirmation {
    /// Output or report shows exactly one passing test
    Confirmed,
    /// Only the exit code indicated success
    ExitCodeOnly,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelfTestOutcome {
    pub passed: bool,
    pub confirmation: Confirmation,
    pub mode: SelfTestMode,
    pub summary: TestSummary,
}

impl SelfTestOutcome {
    /// The single line written to the diagnostic channel
    pub fn message(&self) -> String {
        let verdict = if self.passed { "PASS" } else { "FAIL" };
        let mut message = format!("Self-test {} ({}): {}", verdict, self.mode, self.summary);
        if self.passed && self.confirmation == Confirmation::ExitCodeOnly {
            message.push_str(" [unconfirmed: exit code only]");
        }
        message
    }
}

/// Sink for the terminal PASS/FAIL message of each self-test
pub trait SelfTestChannel: Send + Sync {
    fn record(&self, outcome: &SelfTestOutcome);
}

/// Emits on the `canary::selftest` tracing target, which only the
/// self-test log layer accepts
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingChannel;

impl SelfTestChannel for TracingChannel {
    fn record(&self, outcome: &SelfTestOutcome) {
        if outcome.passed {
            info!(target: SELF_TEST_TARGET, mode = ?outcome.mode, "{}", outcome.message());
        } else {
            warn!(target: SELF_TEST_TARGET, mode = ?outcome.mode, "{}", outcome.message());
        }
    }
}

/// Keeps messages in memory
#[derive(Debug, Default)]
pub struct RecordingChannel {
    messages: Mutex<Vec<String>>,
}

impl RecordingChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().clone()
    }
}

impl SelfTestChannel for RecordingChannel {
    fn record(&self, outcome: &SelfTestOutcome) {
        self.messages.lock().push(outcome.message());
    }
}

/// The generated test and the directory that owns it
struct Artifact {
    dir: TempDir,
    file: PathBuf,
}

impl Artifact {
    fn prepare(settings: &SelfTestSettings) -> std::io::Result<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("canary-selftest-");
        let dir = match &settings.artifact_dir {
            Some(parent) => {
                std::fs::create_dir_all(parent)?;
                builder.tempdir_in(parent)?
            }
            None => builder.tempdir()?,
        };
        let file = dir.path().join(SELF_TEST_FILE);
        std::fs::write(&file, SELF_TEST_SOURCE)?;
        debug!("Self-test artifact written to {}", file.display());
        Ok(Self { dir, file })
    }

    fn cleanup(self) {
        let path = self.dir.path().to_path_buf();
        if let Err(e) = self.dir.close() {
            warn!(
                "Self-test cleanup failure: could not remove {}: {}",
                path.display(),
                e
            );
        }
    }
}

/// Runs the self-test through an executor
pub struct SelfTestHarness {
    executor: Arc<dyn TestExecutor>,
    settings: SelfTestSettings,
    channel: Arc<dyn SelfTestChannel>,
}

impl SelfTestHarness {
    pub fn new(executor: Arc<dyn TestExecutor>, settings: SelfTestSettings) -> Self {
        Self {
            executor,
            settings,
            channel: Arc::new(TracingChannel),
        }
    }

    pub fn with_channel(mut self, channel: Arc<dyn SelfTestChannel>) -> Self {
        self.channel = channel;
        self
    }

    pub async fn run(&self, mode: SelfTestMode) -> SelfTestOutcome {
        let start = Instant::now();

        let summary = match Artifact::prepare(&self.settings) {
            Ok(artifact) => {
                let summary = self.execute(&artifact, start).await;
                artifact.cleanup();
                summary
            }
            Err(e) => TestSummary::infrastructure_error(
                TestScope::All,
                RunError::Prepare {
                    message: e.to_string(),
                },
                start.elapsed().as_secs_f64(),
            ),
        };

        let outcome = self.reduce(summary, mode);
        self.channel.record(&outcome);
        outcome
    }

    async fn execute(&self, artifact: &Artifact, start: Instant) -> TestSummary {
        let invocation = Invocation::new().targets([&artifact.file]);
        match self
            .executor
            .execute(&invocation, Some(self.settings.timeout()))
            .await
        {
            Ok(raw) => parser::parse(&raw, None),
            Err(e) => {
                warn!("Self-test could not run {}: {}", self.executor.tool_name(), e);
                TestSummary::infrastructure_error(
                    TestScope::All,
                    RunError::from(&e),
                    start.elapsed().as_secs_f64(),
                )
            }
        }
    }

    fn reduce(&self, summary: TestSummary, mode: SelfTestMode) -> SelfTestOutcome {
        let confirmation = if summary.passed_reported && summary.passed == Count::Exact(1) {
            Confirmation::Confirmed
        } else {
            Confirmation::ExitCodeOnly
        };

        let exit_ok = summary.exit_code == Some(0) && summary.status == TestStatus::Passed;
        let passed = exit_ok
            && (confirmation == Confirmation::Confirmed || !self.settings.require_confirmation);

        SelfTestOutcome {
            passed,
            confirmation,
            mode,
            summary,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::InvokeError;
    use crate::invoker::RawExecutionResult;
    use async_trait::async_trait;
    use std::path::Path;
    use std::time::Duration;

    /// Answers with a canned result and remembers what it was asked to run
    struct CannedTool {
        exit_code: i32,
        stdout: &'static str,
        seen: Mutex<Vec<PathBuf>>,
    }

    impl CannedTool {
        fn new(exit_code: i32, stdout: &'static str) -> Self {
            Self {
                exit_code,
                stdout,
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl TestExecutor for CannedTool {
        fn tool_name(&self) -> &str {
            "canned"
        }

        async fn execute(
            &self,
            invocation: &Invocation,
            _deadline: Option<Duration>,
        ) -> Result<RawExecutionResult, InvokeError> {
            assert_eq!(invocation.target_list().len(), 1);
            assert!(invocation.marker_expr().is_none());
            assert!(invocation.keyword_expr().is_none());
            let target = PathBuf::from(&invocation.target_list()[0]);
            assert!(target.is_file(), "artifact must exist while executing");
            self.seen.lock().push(target);
            Ok(RawExecutionResult {
                exit_code: Some(self.exit_code),
                stdout: self.stdout.to_string(),
                stderr: String::new(),
                duration: Duration::from_millis(10),
            })
        }
    }

    /// Fails to spawn, or panics mid-execution
    struct BrokenTool {
        panic: bool,
        seen: Arc<Mutex<Vec<PathBuf>>>,
    }

    #[async_trait]
    impl TestExecutor for BrokenTool {
        fn tool_name(&self) -> &str {
            "broken"
        }

        async fn execute(
            &self,
            invocation: &Invocation,
            _deadline: Option<Duration>,
        ) -> Result<RawExecutionResult, InvokeError> {
            self.seen
                .lock()
                .push(PathBuf::from(&invocation.target_list()[0]));
            if self.panic {
                panic!("executor blew up");
            }
            Err(InvokeError::Spawn {
                program: "broken".into(),
                source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
            })
        }
    }

    fn harness(tool: Arc<dyn TestExecutor>, channel: Arc<RecordingChannel>) -> SelfTestHarness {
        SelfTestHarness::new(tool, SelfTestSettings::default()).with_channel(channel)
    }

    #[tokio::test]
    async fn test_confirmed_pass_and_cleanup() {
        let tool = Arc::new(CannedTool::new(0, "collected 1 item\n\n1 passed in 0.01s\n"));
        let channel = Arc::new(RecordingChannel::new());
        let outcome = harness(tool.clone(), channel.clone())
            .run(SelfTestMode::Standalone)
            .await;

        assert!(outcome.passed);
        assert_eq!(outcome.confirmation, Confirmation::Confirmed);
        let seen = tool.seen.lock().clone();
        assert_eq!(seen.len(), 1);
        assert!(seen[0].ends_with(SELF_TEST_FILE));
        assert!(!seen[0].exists());
        assert!(!seen[0].parent().unwrap().exists());
    }

    #[tokio::test]
    async fn test_exactly_one_message_per_call() {
        let tool = Arc::new(CannedTool::new(0, "1 passed in 0.01s\n"));
        let channel = Arc::new(RecordingChannel::new());
        let harness = harness(tool, channel.clone());

        harness.run(SelfTestMode::Preflight).await;
        let messages = channel.messages();
        assert_eq!(messages.len(), 1);
        assert!(messages[0].starts_with("Self-test PASS"));
        assert!(messages[0].contains("pre-flight gate"));

        harness.run(SelfTestMode::Standalone).await;
        assert_eq!(channel.messages().len(), 2);
    }

    #[tokio::test]
    async fn test_exit_code_only_pass() {
        let tool = Arc::new(CannedTool::new(0, ""));
        let channel = Arc::new(RecordingChannel::new());
        let outcome = harness(tool, channel.clone()).run(SelfTestMode::Standalone).await;

        assert!(outcome.passed);
        assert_eq!(outcome.confirmation, Confirmation::ExitCodeOnly);
        assert!(channel.messages()[0].contains("unconfirmed"));
    }

    #[tokio::test]
    async fn test_exit_code_only_fails_when_confirmation_required() {
        let tool = Arc::new(CannedTool::new(0, ""));
        let settings = SelfTestSettings {
            require_confirmation: true,
            ..Default::default()
        };
        let outcome = SelfTestHarness::new(tool, settings)
            .with_channel(Arc::new(RecordingChannel::new()))
            .run(SelfTestMode::Preflight)
            .await;
        assert!(!outcome.passed);
    }

    #[tokio::test]
    async fn test_collected_line_alone_is_not_confirmation() {
        let tool = Arc::new(CannedTool::new(0, "collected 1 item\n"));
        let settings = SelfTestSettings {
            require_confirmation: true,
            ..Default::default()
        };
        let outcome = SelfTestHarness::new(tool, settings)
            .with_channel(Arc::new(RecordingChannel::new()))
            .run(SelfTestMode::Preflight)
            .await;

        assert_eq!(outcome.confirmation, Confirmation::ExitCodeOnly);
        assert!(!outcome.passed);
    }

    #[tokio::test]
    async fn test_failing_tool_is_fail() {
        let tool = Arc::new(CannedTool::new(1, "1 failed in 0.01s\n"));
        let channel = Arc::new(RecordingChannel::new());
        let outcome = harness(tool, channel.clone()).run(SelfTestMode::Standalone).await;

        assert!(!outcome.passed);
        assert!(channel.messages()[0].starts_with("Self-test FAIL"));
    }

    #[tokio::test]
    async fn test_execute_error_still_cleans_up() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let tool = Arc::new(BrokenTool {
            panic: false,
            seen: seen.clone(),
        });
        let channel = Arc::new(RecordingChannel::new());
        let outcome = harness(tool, channel.clone()).run(SelfTestMode::Standalone).await;

        assert!(!outcome.passed);
        assert_eq!(outcome.summary.status, TestStatus::Error);
        assert!(matches!(outcome.summary.error, Some(RunError::Spawn { .. })));
        assert!(!seen.lock()[0].exists());
        assert_eq!(channel.messages().len(), 1);
    }

    #[tokio::test]
    async fn test_panicking_executor_still_cleans_up() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let tool = Arc::new(BrokenTool {
            panic: true,
            seen: seen.clone(),
        });
        let harness = harness(tool, Arc::new(RecordingChannel::new()));

        let result = tokio::spawn(async move { harness.run(SelfTestMode::Standalone).await }).await;
        assert!(result.unwrap_err().is_panic());

        let artifact = seen.lock()[0].clone();
        assert!(!artifact.exists());
        assert!(!artifact.parent().unwrap().exists());
    }

    #[tokio::test]
    async fn test_repeated_runs_agree() {
        let tool = Arc::new(CannedTool::new(0, "1 passed in 0.01s\n"));
        let harness = harness(tool.clone(), Arc::new(RecordingChannel::new()));

        let first = harness.run(SelfTestMode::Standalone).await;
        let second = harness.run(SelfTestMode::Standalone).await;
        assert_eq!(first.passed, second.passed);

        // Each call gets its own artifact location
        let seen = tool.seen.lock().clone();
        assert_ne!(seen[0], seen[1]);
    }

    #[tokio::test]
    async fn test_artifact_dir_is_used() {
        let parent = tempfile::tempdir().unwrap();
        let tool = Arc::new(CannedTool::new(0, "1 passed in 0.01s\n"));
        let settings = SelfTestSettings {
            artifact_dir: Some(parent.path().join("selftest")),
            ..Default::default()
        };
        SelfTestHarness::new(tool.clone(), settings)
            .with_channel(Arc::new(RecordingChannel::new()))
            .run(SelfTestMode::Standalone)
            .await;

        let seen = tool.seen.lock().clone();
        assert!(seen[0].starts_with(parent.path().join("selftest")));
        assert_eq!(
            std::fs::read_dir(parent.path().join("selftest")).unwrap().count(),
            0
        );
        assert!(Path::new(&parent.path().join("selftest")).is_dir());
    }
}
