//! Device primitives consumed by the provisioning workflows
//!
//! The USB transport itself lives outside this crate. Workflows only see two
//! seams: a [`DeviceLink`] that can find the device and move it between boot
//! modes, and a [`BurnDevice`] handle obtained from it once the device sits in
//! USB burn mode. The handle is borrowed mutably by exactly one workflow at a
//! time and passed explicitly through every call.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Boot mode reported by an attached device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeviceMode {
    /// Booted into the regular system
    Normal,
    /// Mask-ROM USB mode, before any bootloader runs
    Usb,
    /// U-Boot USB burn mode; raw partition and environment access available
    UsbRecovery,
}

impl DeviceMode {
    /// Whether raw I/O primitives are available in this mode
    pub fn supports_raw_io(self) -> bool {
        matches!(self, DeviceMode::UsbRecovery)
    }
}

impl std::fmt::Display for DeviceMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceMode::Normal => write!(f, "normal"),
            DeviceMode::Usb => write!(f, "usb"),
            DeviceMode::UsbRecovery => write!(f, "usb-burn"),
        }
    }
}

impl std::str::FromStr for DeviceMode {
    type Err = DeviceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "normal" => Ok(DeviceMode::Normal),
            "usb" => Ok(DeviceMode::Usb),
            "usb-burn" | "usb-recovery" | "burn" => Ok(DeviceMode::UsbRecovery),
            other => Err(DeviceError::Protocol(format!("unknown device mode '{other}'"))),
        }
    }
}

/// Errors reported by the transport primitives
#[derive(Error, Debug)]
pub enum DeviceError {
    /// A bootloader console command was rejected or could not be sent
    #[error("Command '{command}' failed: {message}")]
    CommandFailed {
        /// Command text as sent
        command: String,
        /// Transport message
        message: String,
    },

    /// Raw partition transfer failed
    #[error("Transfer of partition '{partition}' failed: {message}")]
    Transfer {
        /// Partition being read or written
        partition: String,
        /// Transport message
        message: String,
    },

    /// The environment file could not be applied
    #[error("Applying environment file failed: {0}")]
    EnvApply(String),

    /// Booting a staged image failed
    #[error("Boot failed: {0}")]
    Boot(String),

    /// The device disappeared mid-operation
    #[error("Device disconnected")]
    Disconnected,

    /// The transport returned something it should not have
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Local I/O while talking to the transport
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Mode-level access to the device: detection and transitions
///
/// Implementations must not hold on to an open burn-mode session between
/// calls; every [`DeviceLink::open_recovery`] hands out a fresh handle.
#[async_trait::async_trait]
pub trait DeviceLink: Send + Sync {
    /// Detect the attached device and its current mode, `None` when nothing is attached
    async fn detect_mode(&self) -> Result<Option<DeviceMode>, DeviceError>;

    /// Stage a secondary loader through the mask ROM so that it boots into USB burn mode
    async fn boot_secondary_loader(
        &self,
        loader_blob: &Path,
        bootloader_image: &Path,
    ) -> Result<(), DeviceError>;

    /// Open a handle to a device that is already in USB burn mode
    async fn open_recovery(&self) -> Result<Box<dyn BurnDevice>, DeviceError>;
}

/// Handle to a device in USB burn mode
///
/// Each call is a single blocking device operation; callers never issue a
/// second one before the first returned.
#[async_trait::async_trait]
pub trait BurnDevice: Send {
    /// Run one bootloader console command; no output is returned
    async fn run_command(&mut self, command: &str) -> Result<(), DeviceError>;

    /// Raw-read a named partition into a local file
    async fn dump_partition(&mut self, partition: &str, path: &Path) -> Result<(), DeviceError>;

    /// Raw-write a named partition from a local file
    async fn restore_partition(&mut self, partition: &str, path: &Path)
    -> Result<(), DeviceError>;

    /// Import a `key=value` text file into the live environment
    async fn apply_env_file(&mut self, path: &Path) -> Result<(), DeviceError>;

    /// Stage a kernel and initrd with the given environment and boot them once
    async fn boot_kernel(
        &mut self,
        env_file: &Path,
        kernel_image: &Path,
        initrd_image: &Path,
    ) -> Result<(), DeviceError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_display_matches_operator_wording() {
        assert_eq!(DeviceMode::Normal.to_string(), "normal");
        assert_eq!(DeviceMode::Usb.to_string(), "usb");
        assert_eq!(DeviceMode::UsbRecovery.to_string(), "usb-burn");
    }

    #[test]
    fn mode_parses_helper_output() -> Result<(), DeviceError> {
        assert_eq!("usb-burn\n".parse::<DeviceMode>()?, DeviceMode::UsbRecovery);
        assert_eq!("USB".parse::<DeviceMode>()?, DeviceMode::Usb);
        assert_eq!("normal".parse::<DeviceMode>()?, DeviceMode::Normal);
        assert!(matches!("dfu".parse::<DeviceMode>(), Err(DeviceError::Protocol(_))));
        Ok(())
    }

    #[test]
    fn only_burn_mode_supports_raw_io() {
        assert!(DeviceMode::UsbRecovery.supports_raw_io());
        assert!(!DeviceMode::Usb.supports_raw_io());
        assert!(!DeviceMode::Normal.supports_raw_io());
    }
}
