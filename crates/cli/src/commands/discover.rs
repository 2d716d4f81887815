//! Discover Command

use anyhow::Result;
use canary_common::CanaryConfig;
use canary_runner::{TestEngine, TestScope};
use clap::Args;
use serde::Serialize;
use std::path::PathBuf;

use crate::output::{print_list, OutputFormat, TableDisplay};

#[derive(Args)]
pub struct DiscoverArgs {
    /// Test scope (unit, integration, system, acceptance, smoke, all)
    #[arg(short, long, default_value = "all")]
    pub scope: TestScope,

    /// Marker expression the run would pass to the tool
    #[arg(short = 'm', long)]
    pub marker: Option<String>,

    /// Also list the matching test files
    #[arg(long)]
    pub files: bool,
}

#[derive(Serialize)]
struct PathDisplay {
    kind: &'static str,
    path: PathBuf,
}

impl TableDisplay for PathDisplay {
    fn headers() -> Vec<&'static str> {
        vec!["Kind", "Path"]
    }

    fn row(&self) -> Vec<String> {
        vec![self.kind.to_string(), self.path.display().to_string()]
    }
}

pub fn execute(args: DiscoverArgs, config: &CanaryConfig, format: OutputFormat) -> Result<i32> {
    let engine = TestEngine::from_config(config);

    let mut rows: Vec<PathDisplay> = engine
        .discover(args.scope, args.marker.as_deref())
        .into_iter()
        .map(|path| PathDisplay { kind: "target", path })
        .collect();

    if args.files {
        rows.extend(
            engine
                .list_test_files(args.scope)?
                .into_iter()
                .map(|path| PathDisplay { kind: "file", path }),
        );
    }

    print_list(&rows, format)?;
    Ok(0)
}
