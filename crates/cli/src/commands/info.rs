//! Info Command

use anyhow::Result;
use canary_common::{CanaryConfig, EnvironmentInfo, PlatformInfoProvider, SystemPlatform};
use canary_runner::ProcessInvoker;
use serde::Serialize;

use crate::output::{print_item, OutputFormat, TableDisplay};

#[derive(Serialize)]
struct InfoDisplay {
    version: &'static str,
    #[serde(flatten)]
    environment: EnvironmentInfo,
    recommended_can_interface: Option<String>,
    tool: String,
    tool_path: Option<String>,
    tests_dir: String,
}

impl TableDisplay for InfoDisplay {
    fn headers() -> Vec<&'static str> {
        vec!["Version", "OS", "Hardware", "CAN Interfaces", "Recommended", "Tool", "Tool Path", "Tests"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.version.to_string(),
            self.environment.os.to_string(),
            self.environment.hardware.to_string(),
            self.environment.can_interfaces.join(", "),
            self.recommended_can_interface.clone().unwrap_or_else(|| "-".into()),
            self.tool.clone(),
            self.tool_path.clone().unwrap_or_else(|| "not found".into()),
            self.tests_dir.clone(),
        ]
    }
}

pub fn execute(config: &CanaryConfig, format: OutputFormat) -> Result<i32> {
    let platform = SystemPlatform::detect();
    let tool_path = ProcessInvoker::new(&config.tool)
        .locate()
        .ok()
        .map(|path| path.display().to_string());

    let info = InfoDisplay {
        version: canary_common::VERSION,
        environment: platform.snapshot(),
        recommended_can_interface: platform.recommended_can_interface(),
        tool: config.tool.program.clone(),
        tool_path,
        tests_dir: config.runner.tests_dir.display().to_string(),
    };

    print_item(&info, format)?;
    Ok(0)
}
