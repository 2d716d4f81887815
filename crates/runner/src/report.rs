//! Structured report written by the test tool

use serde::Deserialize;
use std::path::Path;
use tracing::{debug, warn};

/// Top level of the JSON report. Only the summary is read.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StructuredReport {
    pub summary: ReportSummary,

    /// pytest-json-report puts the session duration here
    #[serde(default)]
    pub duration: Option<f64>,
}

/// Counts the report defines. Absent fields leave lower-precedence values alone.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ReportSummary {
    #[serde(default)]
    pub total: Option<u64>,
    #[serde(default)]
    pub passed: Option<u64>,
    #[serde(default)]
    pub failed: Option<u64>,
    #[serde(default)]
    pub skipped: Option<u64>,
    #[serde(default, alias = "error")]
    pub errored: Option<u64>,
    #[serde(default)]
    pub duration: Option<f64>,
}

impl StructuredReport {
    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }

    /// Duration from the summary, else from the top level
    pub fn duration(&self) -> Option<f64> {
        self.summary.duration.or(self.duration)
    }

    /// Read a report if one exists. A missing, unreadable or malformed file
    /// yields `None`; the caller falls back to coarser signals.
    pub fn load(path: &Path) -> Option<Self> {
        if !path.exists() {
            debug!("No structured report at {}", path.display());
            return None;
        }
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) => {
                warn!("Structured report {} unreadable: {}", path.display(), e);
                return None;
            }
        };
        match Self::from_json(&text) {
            Ok(report) => Some(report),
            Err(e) => {
                warn!(
                    "Structured report {} is malformed, falling back to output parsing: {}",
                    path.display(),
                    e
                );
                None
            }
        }
    }
}
