//! canary configuration

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};

/// Default configuration file name, looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "canary.toml";

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CanaryConfig {
    /// Test campaign settings
    pub runner: RunnerSettings,

    /// External test tool
    pub tool: ToolSettings,

    /// Self-test / pre-flight gate
    pub self_test: SelfTestSettings,

    /// Logging
    pub logging: LoggingConfig,
}

/// Test campaign settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerSettings {
    /// Root of the test corpus
    pub tests_dir: PathBuf,

    /// Glob matched against file names when listing test files
    pub test_file_pattern: String,

    /// Wall-clock deadline for a single campaign run
    pub timeout_secs: Option<u64>,

    /// Directory for transient structured reports (system temp dir if unset)
    pub report_dir: Option<PathBuf>,

    /// Pass `-v` to the test tool
    pub verbose: bool,
}

impl Default for RunnerSettings {
    fn default() -> Self {
        Self {
            tests_dir: PathBuf::from("tests"),
            test_file_pattern: "test_*.py".to_string(),
            timeout_secs: None,
            report_dir: None,
            verbose: false,
        }
    }
}

impl RunnerSettings {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

/// External test tool settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolSettings {
    /// Program name (looked up on PATH) or path to the binary
    pub program: String,

    /// Arguments placed before everything else, e.g. `["-m", "pytest"]`
    pub args: Vec<String>,

    /// Working directory for the child process
    pub working_dir: Option<PathBuf>,

    /// Extra environment variables for the child process
    pub env: HashMap<String, String>,
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self {
            program: "pytest".to_string(),
            args: Vec::new(),
            working_dir: None,
            env: HashMap::new(),
        }
    }
}

/// Self-test settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelfTestSettings {
    /// Deadline for the throwaway run
    pub timeout_secs: u64,

    /// Reject a pass that is backed by the exit code alone
    pub require_confirmation: bool,

    /// Parent directory for the throwaway artifact (system temp dir if unset)
    pub artifact_dir: Option<PathBuf>,
}

impl Default for SelfTestSettings {
    fn default() -> Self {
        Self {
            timeout_secs: 60,
            require_confirmation: false,
            artifact_dir: None,
        }
    }
}

impl SelfTestSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default level when RUST_LOG is not set
    pub level: String,

    /// Emit JSON lines instead of human-readable text
    pub json: bool,

    /// Write daily-rolling log files (and the self-test log) here
    pub log_dir: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            log_dir: None,
        }
    }
}

impl CanaryConfig {
    /// Load configuration from file, falling back to defaults when it is absent
    pub fn load(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Self = toml::from_str(&content)?;
            config.validate()?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Reject settings the engine cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.tool.program.trim().is_empty() {
            return Err(Error::InvalidConfig("tool.program must not be empty".into()));
        }
        if self.runner.timeout_secs == Some(0) {
            return Err(Error::InvalidConfig("runner.timeout_secs must be positive".into()));
        }
        if self.self_test.timeout_secs == 0 {
            return Err(Error::InvalidConfig("self_test.timeout_secs must be positive".into()));
        }
        if self.runner.test_file_pattern.trim().is_empty() {
            return Err(Error::InvalidConfig("runner.test_file_pattern must not be empty".into()));
        }
        Ok(())
    }
}
