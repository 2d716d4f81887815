//! Description of a single test tool execution

use std::path::{Path, PathBuf};

/// Coverage collection request (`--cov` / `--cov-report=html:`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoverageRequest {
    pub package: String,
    pub html_dir: PathBuf,
}

/// One execution of the external test tool.
///
/// Built fresh for every call and never mutated once handed to an executor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Invocation {
    targets: Vec<String>,
    marker: Option<String>,
    keyword: Option<String>,
    report_path: Option<PathBuf>,
    html_report: Option<PathBuf>,
    coverage: Option<CoverageRequest>,
    verbose: bool,
    extra_args: Vec<String>,
}

impl Invocation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Target paths, in order
    pub fn targets<I, P>(mut self, targets: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        self.targets = targets
            .into_iter()
            .map(|p| p.as_ref().to_string_lossy().to_string())
            .collect();
        self
    }

    /// A node id such as `tests/test_bus.py::TestFrames`
    pub fn node(mut self, file: &Path, class_name: &str) -> Self {
        self.targets = vec![format!("{}::{}", file.display(), class_name)];
        self
    }

    pub fn marker(mut self, marker: impl Into<String>) -> Self {
        self.marker = Some(marker.into());
        self
    }

    pub fn keyword(mut self, keyword: impl Into<String>) -> Self {
        self.keyword = Some(keyword.into());
        self
    }

    /// Ask the tool to write a structured (JSON) report here
    pub fn report_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.report_path = Some(path.into());
        self
    }

    pub fn html_report(mut self, path: impl Into<PathBuf>) -> Self {
        self.html_report = Some(path.into());
        self
    }

    pub fn coverage(mut self, coverage: CoverageRequest) -> Self {
        self.coverage = Some(coverage);
        self
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn extra_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extra_args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn target_list(&self) -> &[String] {
        &self.targets
    }

    pub fn marker_expr(&self) -> Option<&str> {
        self.marker.as_deref()
    }

    pub fn keyword_expr(&self) -> Option<&str> {
        self.keyword.as_deref()
    }

    pub fn structured_report(&self) -> Option<&Path> {
        self.report_path.as_deref()
    }

    /// Tool arguments (everything after the tool's own prefix args)
    pub fn to_args(&self) -> Vec<String> {
        let mut args = Vec::new();

        if self.verbose {
            args.push("-v".to_string());
        }
        if let Some(marker) = &self.marker {
            args.push("-m".to_string());
            args.push(marker.clone());
        }
        if let Some(keyword) = &self.keyword {
            args.push("-k".to_string());
            args.push(keyword.clone());
        }
        if let Some(path) = &self.report_path {
            args.push("--json-report".to_string());
            args.push(format!("--json-report-file={}", path.display()));
        }
        if let Some(path) = &self.html_report {
            args.push(format!("--html={}", path.display()));
            args.push("--self-contained-html".to_string());
        }
        if let Some(cov) = &self.coverage {
            args.push(format!("--cov={}", cov.package));
            args.push(format!("--cov-report=html:{}", cov.html_dir.display()));
            args.push("--cov-report=term".to_string());
        }
        args.extend(self.extra_args.iter().cloned());
        args.extend(self.targets.iter().cloned());

        args
    }
}
