//! Boot-mode detection and transitions
//!
//! Raw partition and environment access needs the device in USB burn mode.
//! From the mask-ROM USB mode the controller gets there by staging the
//! bundled secondary loader; from a normally booted system it cannot, and the
//! operator has to replug the device in USB mode.

use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::device::{BurnDevice, DeviceLink, DeviceMode};
use crate::error::{ProvisionError, Result};
use crate::images::BundledImages;

/// Time the secondary loader needs to come up in USB burn mode
pub const DEFAULT_TRANSITION_WAIT: Duration = Duration::from_secs(5);

/// Bootloader command that resumes a boot paused in USB burn mode
pub const CONTINUE_BOOT_COMMAND: &str = "mw.b 0x17f89754 1";

/// Result of an explicit request to enter USB burn mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryEntry {
    /// Device already was in USB burn mode
    AlreadyInRecovery,
    /// Device was moved from USB mode into USB burn mode
    Entered,
}

/// Decides when a mode transition is needed before an operation
pub struct ModeController {
    link: Box<dyn DeviceLink>,
    images: BundledImages,
    transition_wait: Duration,
}

impl ModeController {
    /// Create a controller over `link`, staging loaders from `images`
    pub fn new(link: Box<dyn DeviceLink>, images: BundledImages) -> Self {
        Self {
            link,
            images,
            transition_wait: DEFAULT_TRANSITION_WAIT,
        }
    }

    /// Override the wait after staging the secondary loader
    pub fn with_transition_wait(mut self, wait: Duration) -> Self {
        self.transition_wait = wait;
        self
    }

    /// Current device mode, `None` when nothing is attached
    pub async fn find_device(&self) -> Result<Option<DeviceMode>> {
        let mode = self.link.detect_mode().await?;
        match mode {
            Some(mode) => info!("Found device booted in {} mode", mode),
            None => info!("No device found"),
        }
        Ok(mode)
    }

    /// Bring the device into USB burn mode and open a handle to it
    pub async fn ensure_recovery(&self) -> Result<Box<dyn BurnDevice>> {
        match self.link.detect_mode().await? {
            Some(DeviceMode::UsbRecovery) => {
                debug!("Device already in USB burn mode");
            }
            Some(DeviceMode::Usb) => self.stage_loader().await?,
            Some(DeviceMode::Normal) => {
                warn!("Device is booted normally; replug it while holding buttons 1 and 4");
                return Err(ProvisionError::UnexpectedMode {
                    expected: DeviceMode::Usb,
                    actual: DeviceMode::Normal,
                });
            }
            None => return Err(ProvisionError::DeviceNotFound),
        }
        Ok(self.link.open_recovery().await?)
    }

    /// Explicitly move the device into USB burn mode without opening a handle
    pub async fn enter_recovery(&self) -> Result<RecoveryEntry> {
        match self.link.detect_mode().await? {
            Some(DeviceMode::UsbRecovery) => {
                info!("Device already in USB burn mode");
                Ok(RecoveryEntry::AlreadyInRecovery)
            }
            Some(DeviceMode::Usb) => {
                self.stage_loader().await?;
                info!("Device is now in USB burn mode");
                Ok(RecoveryEntry::Entered)
            }
            Some(actual) => Err(ProvisionError::UnexpectedMode {
                expected: DeviceMode::Usb,
                actual,
            }),
            None => Err(ProvisionError::DeviceNotFound),
        }
    }

    /// Resume a boot paused in USB burn mode
    pub async fn continue_boot(&self) -> Result<()> {
        match self.link.detect_mode().await? {
            Some(DeviceMode::UsbRecovery) => {}
            Some(actual) => {
                return Err(ProvisionError::UnexpectedMode {
                    expected: DeviceMode::UsbRecovery,
                    actual,
                });
            }
            None => return Err(ProvisionError::DeviceNotFound),
        }
        info!("Continuing boot...");
        let mut device = self.link.open_recovery().await?;
        device.run_command(CONTINUE_BOOT_COMMAND).await?;
        Ok(())
    }

    async fn stage_loader(&self) -> Result<()> {
        info!("Entering USB burn mode");
        self.link
            .boot_secondary_loader(&self.images.bl2(), &self.images.bootloader())
            .await?;
        info!("Waiting {:?} for device...", self.transition_wait);
        tokio::time::sleep(self.transition_wait).await;

        match self.link.detect_mode().await? {
            Some(DeviceMode::UsbRecovery) => Ok(()),
            observed => {
                let observed = observed.map_or_else(|| "no device".to_string(), |m| format!("{m} mode"));
                Err(ProvisionError::RecoveryTransitionFailed { observed })
            }
        }
    }
}
