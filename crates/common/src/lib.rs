//! canary Common Library
//!
//! Configuration, logging, error and platform types shared by the canary
//! test orchestration crates.

pub mod config;
pub mod error;
pub mod logging;
pub mod platform;

// Re-export commonly used types
pub use config::{CanaryConfig, LoggingConfig, RunnerSettings, SelfTestSettings, ToolSettings};
pub use error::{Error, Result};
pub use logging::SELF_TEST_TARGET;
pub use platform::{
    EnvironmentInfo, HardwareType, OsType, PlatformInfoProvider, SystemPlatform, UnknownPlatform,
};

/// canary version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
