//! Boot-policy recipes
//!
//! Each policy is a fixed list of bootloader console commands. The list is
//! data: it can be inspected and tested without a device, and applying it
//! just sends the commands in order. A command is considered done once the
//! transport accepted it; the console gives no output to verify against.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::device::BurnDevice;
use crate::env_workflow::{SAVE_ENV, SELECT_ENV_STORE};
use crate::error::Result;
use crate::images::BundledImages;
use crate::partition::Slot;

/// Kernel arguments shared by the slot-lock and UART console policies
const DEBUG_INITARGS: [&str; 7] = [
    "ramoops.pstore_en=1",
    "ramoops.record_size=0x8000",
    "ramoops.console_size=0x4000",
    "rootfstype=ext4",
    "console=ttyS0,115200n8",
    "no_console_suspend",
    "earlycon=aml-uart,0xff803000",
];

/// Stock `storeargs`, rebuilt one segment at a time
const STOCK_STOREARGS: [&str; 16] = [
    r#"setenv storeargs "setenv bootargs \${initargs} \${fs_type}""#,
    r#"setenv storeargs "${storeargs} reboot_mode_android=\${reboot_mode_android}""#,
    r#"setenv storeargs "${storeargs} logo=\${display_layer},loaded,\${fb_addr}""#,
    r#"setenv storeargs "${storeargs} fb_width=\${fb_width} fb_height=\${fb_height}""#,
    r#"setenv storeargs "${storeargs} vout=\${outputmode},enable""#,
    r#"setenv storeargs "${storeargs} panel_type=\${panel_type}""#,
    r#"setenv storeargs "${storeargs} frac_rate_policy=\${frac_rate_policy}""#,
    r#"setenv storeargs "${storeargs} osd_reverse=\${osd_reverse}""#,
    r#"setenv storeargs "${storeargs} video_reverse=\${video_reverse}""#,
    r#"setenv storeargs "${storeargs} irq_check_en=\${Irq_check_en}""#,
    r#"setenv storeargs "${storeargs} androidboot.selinux=\${EnableSelinux}""#,
    r#"setenv storeargs "${storeargs} androidboot.firstboot=\${firstboot}""#,
    r#"setenv storeargs "${storeargs} jtag=\${jtag} uboot_version=\${gitver}\;""#,
    r#"setenv storeargs "${storeargs} setenv bootargs \${bootargs} androidboot.hardware=amlogic\;""#,
    r#"setenv storeargs "${storeargs} setenv avb2 0\;""#,
    SAVE_ENV,
];

/// A persisted boot-policy toggle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BootPolicy {
    /// Enter USB burn mode on every boot while a USB host is connected
    EnableBurnMode,
    /// Enter USB burn mode only while preset button 4 is held
    EnableBurnModeButton,
    /// Restore the stock boot arguments, leaving burn mode off
    DisableBurnMode,
    /// Boot straight into the system without the charger check
    DisableChargerCheck,
    /// Check for a valid charger before booting
    EnableChargerCheck,
    /// Always boot the given slot; disables AVB2 verification
    LockSlot(Slot),
    /// Route the Linux console to the UART
    EnableUartShell,
}

impl BootPolicy {
    /// Commands sent for this policy, in order
    ///
    /// Every list selects the environment store first and saves it last.
    pub fn commands(&self) -> Vec<String> {
        let mut cmds = vec![SELECT_ENV_STORE.to_string()];
        match self {
            BootPolicy::EnableBurnMode => {
                cmds.push(r#"setenv storeargs "${storeargs} run update\;""#.to_string());
                cmds.push(SAVE_ENV.to_string());
            }
            BootPolicy::EnableBurnModeButton => {
                cmds.push(
                    r#"setenv storeargs "${storeargs} if gpio input GPIOA_3; then run update; fi;""#
                        .to_string(),
                );
                cmds.push(SAVE_ENV.to_string());
            }
            BootPolicy::DisableBurnMode => {
                cmds.extend(STOCK_STOREARGS.iter().map(|c| c.to_string()));
            }
            BootPolicy::DisableChargerCheck => {
                cmds.push(r#"setenv bootcmd "run storeboot""#.to_string());
                cmds.push(SAVE_ENV.to_string());
            }
            BootPolicy::EnableChargerCheck => {
                cmds.push(r#"setenv bootcmd "run check_charger""#.to_string());
                cmds.push(SAVE_ENV.to_string());
            }
            BootPolicy::LockSlot(slot) => {
                cmds.push(r"setenv storeargs ${storeargs} setenv avb2 0\;".to_string());
                cmds.push("setenv initargs init=/sbin/pre-init".to_string());
                cmds.extend(
                    DEBUG_INITARGS
                        .iter()
                        .map(|arg| format!(r#"setenv initargs "${{initargs}} {arg}""#)),
                );
                let root = match slot {
                    Slot::A => "/dev/mmcblk0p14",
                    Slot::B => "/dev/mmcblk0p15",
                };
                cmds.push(format!(r#"setenv initargs "${{initargs}} ro root={root}""#));
                cmds.push(format!("setenv active_slot {}", slot.suffix()));
                cmds.push(format!("setenv boot_part boot{}", slot.suffix()));
                cmds.push(SAVE_ENV.to_string());
            }
            BootPolicy::EnableUartShell => {
                cmds.push("setenv initargs init=/sbin/pre-init".to_string());
                cmds.extend(
                    DEBUG_INITARGS
                        .iter()
                        .map(|arg| format!("setenv initargs ${{initargs}} {arg}")),
                );
                cmds.push(SAVE_ENV.to_string());
            }
        }
        cmds
    }

    /// One-line description of what the policy does
    pub fn describe(&self) -> String {
        match self {
            BootPolicy::EnableBurnMode => {
                "Enabling USB burn mode at every boot (if a USB host is connected)".to_string()
            }
            BootPolicy::EnableBurnModeButton => {
                "Enabling USB burn mode at boot if preset button 4 is held".to_string()
            }
            BootPolicy::DisableBurnMode => {
                "Disabling USB burn mode at every boot".to_string()
            }
            BootPolicy::DisableChargerCheck => "Disabling check for valid charger".to_string(),
            BootPolicy::EnableChargerCheck => "Enabling check for valid charger".to_string(),
            BootPolicy::LockSlot(slot) => {
                format!("Disabling A/B booting, locking to slot {slot}")
            }
            BootPolicy::EnableUartShell => "Enabling UART shell".to_string(),
        }
    }

    /// Send the policy's commands in order, stopping at the first transport error
    pub async fn apply(&self, device: &mut dyn BurnDevice) -> Result<()> {
        info!("{}", self.describe());
        for cmd in self.commands() {
            debug!("bulkcmd: {}", cmd);
            device.run_command(&cmd).await?;
        }
        Ok(())
    }
}

/// Boot the bundled debug kernel once from `slot`
///
/// Uses the slot's bundled environment for this boot only; the persisted
/// environment is left untouched.
pub async fn boot_debug_kernel(
    device: &mut dyn BurnDevice,
    images: &BundledImages,
    slot: Slot,
) -> Result<()> {
    info!("Booting debug kernel on slot {}", slot);
    device
        .boot_kernel(&images.debug_env(slot), &images.kernel(), &images.initrd())
        .await?;
    Ok(())
}
