//! Test scopes and scope-to-target resolution

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use walkdir::WalkDir;

use crate::error::RunnerResult;

/// Named subset of the test corpus
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestScope {
    Unit,
    Integration,
    System,
    Acceptance,
    Smoke,
    #[default]
    All,
}

impl TestScope {
    pub const ALL: [TestScope; 6] = [
        TestScope::Unit,
        TestScope::Integration,
        TestScope::System,
        TestScope::Acceptance,
        TestScope::Smoke,
        TestScope::All,
    ];

    /// Lower-case name, also the subdirectory name and the marker token
    pub fn as_str(&self) -> &'static str {
        match self {
            TestScope::Unit => "unit",
            TestScope::Integration => "integration",
            TestScope::System => "system",
            TestScope::Acceptance => "acceptance",
            TestScope::Smoke => "smoke",
            TestScope::All => "all",
        }
    }

    /// Whether the scope always maps to the whole corpus
    pub fn spans_corpus(&self) -> bool {
        matches!(self, TestScope::All | TestScope::Smoke)
    }
}

impl fmt::Display for TestScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TestScope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TestScope::ALL
            .into_iter()
            .find(|scope| scope.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown test scope: {}", s))
    }
}

/// Outcome of resolving a scope against a test root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub targets: Vec<PathBuf>,
    /// The scope subdirectory was missing and the root was used instead
    pub fell_back: bool,
}

/// Map a scope to target paths. Never fails: a missing scope directory
/// degrades to the whole corpus.
pub fn resolve(scope: TestScope, test_root: &Path) -> Resolution {
    if scope.spans_corpus() {
        return Resolution {
            targets: vec![test_root.to_path_buf()],
            fell_back: false,
        };
    }

    let scoped = test_root.join(scope.as_str());
    if scoped.is_dir() {
        Resolution {
            targets: vec![scoped],
            fell_back: false,
        }
    } else {
        Resolution {
            targets: vec![test_root.to_path_buf()],
            fell_back: true,
        }
    }
}

/// Files under `targets` whose name matches `pattern`, sorted and deduplicated
pub fn collect_test_files(targets: &[PathBuf], pattern: &str) -> RunnerResult<Vec<PathBuf>> {
    let pattern = glob::Pattern::new(pattern)?;
    let mut files: Vec<PathBuf> = targets
        .iter()
        .flat_map(|target| WalkDir::new(target).follow_links(true))
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| pattern.matches(&entry.file_name().to_string_lossy()))
        .map(|entry| entry.into_path())
        .collect();
    files.sort();
    files.dedup();
    Ok(files)
}
