//! Platform capability interface
//!
//! Test summaries are stamped with a snapshot of the host they ran on. The
//! engine is handed a [`PlatformInfoProvider`] at construction time: either
//! [`SystemPlatform`], which probes the running host, or [`UnknownPlatform`]
//! when detection is not wanted (tests, sandboxes).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use tracing::debug;

/// Operating system family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OsType {
    Linux,
    RaspberryPi,
    Macos,
    Windows,
    Unknown,
}

impl fmt::Display for OsType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OsType::Linux => "Linux",
            OsType::RaspberryPi => "RaspberryPi",
            OsType::Macos => "Darwin",
            OsType::Windows => "Windows",
            OsType::Unknown => "Unknown",
        };
        f.write_str(s)
    }
}

/// CPU architecture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HardwareType {
    X86_64,
    Arm,
    Arm64,
    Unknown,
}

impl HardwareType {
    pub fn from_arch(arch: &str) -> Self {
        match arch.to_ascii_lowercase().as_str() {
            "x86_64" | "amd64" => HardwareType::X86_64,
            "aarch64" | "arm64" => HardwareType::Arm64,
            a if a.starts_with("arm") => HardwareType::Arm,
            _ => HardwareType::Unknown,
        }
    }
}

impl fmt::Display for HardwareType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HardwareType::X86_64 => "x86_64",
            HardwareType::Arm => "arm",
            HardwareType::Arm64 => "aarch64",
            HardwareType::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// Snapshot of the host, attached to every test summary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentInfo {
    pub os: OsType,
    pub hardware: HardwareType,
    #[serde(default)]
    pub can_interfaces: Vec<String>,
}

/// Source of environment metadata
pub trait PlatformInfoProvider: Send + Sync {
    fn os(&self) -> OsType;

    fn hardware(&self) -> HardwareType;

    /// CAN interface names visible on this host
    fn can_interfaces(&self) -> Vec<String>;

    /// Preferred CAN interface: physical before virtual, `vcan0` on bare Linux
    fn recommended_can_interface(&self) -> Option<String> {
        let interfaces = self.can_interfaces();
        if interfaces.is_empty() {
            return match self.os() {
                OsType::Linux | OsType::RaspberryPi => Some("vcan0".to_string()),
                _ => None,
            };
        }
        interfaces
            .iter()
            .find(|name| !name.starts_with('v'))
            .or_else(|| interfaces.first())
            .cloned()
    }

    fn snapshot(&self) -> EnvironmentInfo {
        EnvironmentInfo {
            os: self.os(),
            hardware: self.hardware(),
            can_interfaces: self.can_interfaces(),
        }
    }

    /// Multi-line human readable description
    fn summary(&self) -> String {
        let mut lines = vec![
            format!("OS: {}", self.os()),
            format!("Hardware: {}", self.hardware()),
        ];
        let interfaces = self.can_interfaces();
        if !interfaces.is_empty() {
            lines.push(format!("CAN Interfaces: {}", interfaces.join(", ")));
        }
        if let Some(recommended) = self.recommended_can_interface() {
            lines.push(format!("Recommended CAN Interface: {}", recommended));
        }
        lines.join("\n")
    }
}

/// Probes the running host
#[derive(Debug, Clone)]
pub struct SystemPlatform {
    os: OsType,
    hardware: HardwareType,
    can_interfaces: Vec<String>,
}

impl SystemPlatform {
    pub fn detect() -> Self {
        let os = detect_os();
        let hardware = HardwareType::from_arch(std::env::consts::ARCH);
        let can_interfaces = match os {
            OsType::Linux | OsType::RaspberryPi => {
                scan_can_interfaces(Path::new("/sys/class/net"))
            }
            _ => Vec::new(),
        };
        debug!(%os, %hardware, ?can_interfaces, "Platform detected");
        Self {
            os,
            hardware,
            can_interfaces,
        }
    }
}

impl PlatformInfoProvider for SystemPlatform {
    fn os(&self) -> OsType {
        self.os
    }

    fn hardware(&self) -> HardwareType {
        self.hardware
    }

    fn can_interfaces(&self) -> Vec<String> {
        self.can_interfaces.clone()
    }
}

/// Null provider: reports nothing about the host
#[derive(Debug, Clone, Copy, Default)]
pub struct UnknownPlatform;

impl PlatformInfoProvider for UnknownPlatform {
    fn os(&self) -> OsType {
        OsType::Unknown
    }

    fn hardware(&self) -> HardwareType {
        HardwareType::Unknown
    }

    fn can_interfaces(&self) -> Vec<String> {
        Vec::new()
    }
}

fn detect_os() -> OsType {
    match std::env::consts::OS {
        "linux" => {
            if is_raspberry_pi() {
                OsType::RaspberryPi
            } else {
                OsType::Linux
            }
        }
        "macos" => OsType::Macos,
        "windows" => OsType::Windows,
        _ => OsType::Unknown,
    }
}

fn is_raspberry_pi() -> bool {
    std::fs::read_to_string("/proc/device-tree/model")
        .map(|model| model.contains("Raspberry Pi"))
        .unwrap_or(false)
}

/// Interface names containing "can" under a sysfs-style net directory
fn scan_can_interfaces(net_dir: &Path) -> Vec<String> {
    let Ok(entries) = std::fs::read_dir(net_dir) else {
        return Vec::new();
    };
    let mut names: Vec<String> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.file_name().to_string_lossy().to_string())
        .filter(|name| name.to_ascii_lowercase().contains("can"))
        .collect();
    names.sort();
    names
}
