//! Test orchestration engine: discover -> build invocation -> run -> parse -> summarize

use canary_common::{
    CanaryConfig, PlatformInfoProvider, RunnerSettings, SelfTestSettings, SystemPlatform,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::{RunError, RunnerError, RunnerResult};
use crate::invocation::{CoverageRequest, Invocation};
use crate::invoker::{ProcessInvoker, TestExecutor};
use crate::parser;
use crate::scope::{self, TestScope};
use crate::self_test::{SelfTestChannel, SelfTestHarness, SelfTestMode, SelfTestOutcome};
use crate::summary::TestSummary;

/// Per-run options
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Marker expression, passed to the tool unchanged
    pub marker: Option<String>,
    pub keyword: Option<String>,
    /// Request a structured report and parse it
    pub want_report: bool,
    pub html_report: Option<PathBuf>,
    pub coverage: Option<CoverageRequest>,
    /// Overrides the configured campaign deadline
    pub timeout: Option<Duration>,
    pub verbose: bool,
    pub extra_args: Vec<String>,
}

/// Orchestration façade over the executor, parser and self-test harness
pub struct TestEngine {
    executor: Arc<dyn TestExecutor>,
    platform: Arc<dyn PlatformInfoProvider>,
    settings: RunnerSettings,
    self_test: SelfTestHarness,
}

impl TestEngine {
    pub fn new(
        executor: Arc<dyn TestExecutor>,
        platform: Arc<dyn PlatformInfoProvider>,
        settings: RunnerSettings,
        self_test: SelfTestSettings,
    ) -> Self {
        Self {
            self_test: SelfTestHarness::new(executor.clone(), self_test),
            executor,
            platform,
            settings,
        }
    }

    /// Engine driving the configured tool, stamping summaries with the
    /// detected host platform
    pub fn from_config(config: &CanaryConfig) -> Self {
        Self::new(
            Arc::new(ProcessInvoker::new(&config.tool)),
            Arc::new(SystemPlatform::detect()),
            config.runner.clone(),
            config.self_test.clone(),
        )
    }

    pub fn with_self_test_channel(mut self, channel: Arc<dyn SelfTestChannel>) -> Self {
        self.self_test = self.self_test.with_channel(channel);
        self
    }

    pub fn test_root(&self) -> &Path {
        &self.settings.tests_dir
    }

    pub fn platform(&self) -> &dyn PlatformInfoProvider {
        self.platform.as_ref()
    }

    /// Target paths a run of `scope` would use. Touches nothing.
    pub fn discover(&self, scope: TestScope, marker: Option<&str>) -> Vec<PathBuf> {
        let resolution = scope::resolve(scope, self.test_root());
        if resolution.fell_back {
            warn!(
                "No {} directory under {}, using the whole test corpus",
                scope,
                self.test_root().display()
            );
        }
        if let Some(marker) = marker {
            debug!("Marker '{}' is applied by the test tool", marker);
        }
        resolution.targets
    }

    /// Test files a run of `scope` would collect
    pub fn list_test_files(&self, scope: TestScope) -> RunnerResult<Vec<PathBuf>> {
        let targets = self.discover(scope, None);
        scope::collect_test_files(&targets, &self.settings.test_file_pattern)
    }

    /// Run one scope. Tool failures come back as an ERROR summary, never as
    /// an `Err`; nothing is retried.
    pub async fn run(&self, scope: TestScope, options: &RunOptions) -> TestSummary {
        let targets = self.discover(scope, options.marker.as_deref());
        let invocation = Invocation::new().targets(&targets);
        self.execute(scope, invocation, options).await
    }

    /// Run a single file, or one class inside it
    pub async fn run_file(
        &self,
        file: &Path,
        class_name: Option<&str>,
        options: &RunOptions,
    ) -> RunnerResult<TestSummary> {
        if !file.is_file() {
            return Err(RunnerError::TargetNotFound(file.to_path_buf()));
        }
        let invocation = match class_name {
            Some(class_name) => Invocation::new().node(file, class_name),
            None => Invocation::new().targets([file]),
        };
        Ok(self.execute(TestScope::All, invocation, options).await)
    }

    pub async fn run_self_test(&self, mode: SelfTestMode) -> SelfTestOutcome {
        self.self_test.run(mode).await
    }

    async fn execute(
        &self,
        scope: TestScope,
        mut invocation: Invocation,
        options: &RunOptions,
    ) -> TestSummary {
        if let Some(marker) = &options.marker {
            invocation = invocation.marker(marker.clone());
        }
        if let Some(keyword) = &options.keyword {
            invocation = invocation.keyword(keyword.clone());
        }
        if let Some(html) = &options.html_report {
            invocation = invocation.html_report(html.clone());
        }
        if let Some(coverage) = &options.coverage {
            invocation = invocation.coverage(coverage.clone());
        }
        let report = options.want_report.then(|| self.report_path());
        if let Some(path) = &report {
            invocation = invocation.report_path(path.clone());
        }
        let invocation = invocation
            .verbose(options.verbose || self.settings.verbose)
            .extra_args(options.extra_args.iter().cloned());

        let deadline = options.timeout.or_else(|| self.settings.timeout());
        info!("Running {} tests with {}", scope, self.executor.tool_name());

        let start = Instant::now();
        let summary = match self.executor.execute(&invocation, deadline).await {
            Ok(raw) => {
                let class = raw.exit_class();
                if class.is_tool_error() {
                    error!("{}: {}", self.executor.tool_name(), class.describe());
                    if !raw.stderr.trim().is_empty() {
                        debug!("Tool stderr:\n{}", raw.stderr.trim_end());
                    }
                } else {
                    info!("{}: {}", self.executor.tool_name(), class.describe());
                }
                TestSummary {
                    scope,
                    ..parser::parse(&raw, report.as_deref())
                }
            }
            Err(e) => {
                error!("Test run could not complete: {}", e);
                TestSummary::infrastructure_error(
                    scope,
                    RunError::from(&e),
                    start.elapsed().as_secs_f64(),
                )
            }
        };

        if let Some(path) = &report {
            remove_report(path);
        }

        let summary = summary.with_environment(self.platform.snapshot());
        info!("{} tests finished: {}", scope, summary);
        summary
    }

    /// Unique per call so repeated or concurrent runs never share a report
    fn report_path(&self) -> PathBuf {
        let dir = match &self.settings.report_dir {
            Some(dir) => {
                if let Err(e) = std::fs::create_dir_all(dir) {
                    warn!("Cannot create report directory {}: {}", dir.display(), e);
                }
                dir.clone()
            }
            None => std::env::temp_dir(),
        };
        dir.join(format!("canary-report-{}.json", Uuid::new_v4()))
    }
}

fn remove_report(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => debug!("Removed structured report {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Could not remove structured report {}: {}", path.display(), e),
    }
}
