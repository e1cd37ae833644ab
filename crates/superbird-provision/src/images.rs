//! Bundled images shipped next to the tool

use std::path::{Path, PathBuf};

use crate::partition::Slot;

/// Encrypted secondary loader staged through the mask ROM
pub const BL2_IMAGE: &str = "superbird.bl2.encrypted.bin";
/// Bootloader image booted after the secondary loader
pub const BOOTLOADER_IMAGE: &str = "superbird.bootloader.img";
/// Debug kernel booted once by the debug-boot recipe
pub const KERNEL_IMAGE: &str = "superbird.kernel.img";
/// Initrd booted together with [`KERNEL_IMAGE`]
pub const INITRD_IMAGE: &str = "superbird.initrd.img";
/// Factory environment used to restore stock settings
pub const STOCK_ENV_FILE: &str = "stock_env.txt";

/// Directory holding the bundled images
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundledImages {
    dir: PathBuf,
}

impl BundledImages {
    /// Images under `dir`
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Directory holding the images
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Secondary loader blob
    pub fn bl2(&self) -> PathBuf {
        self.dir.join(BL2_IMAGE)
    }

    /// Bootloader image paired with the secondary loader
    pub fn bootloader(&self) -> PathBuf {
        self.dir.join(BOOTLOADER_IMAGE)
    }

    /// Debug kernel image
    pub fn kernel(&self) -> PathBuf {
        self.dir.join(KERNEL_IMAGE)
    }

    /// Debug initrd image
    pub fn initrd(&self) -> PathBuf {
        self.dir.join(INITRD_IMAGE)
    }

    /// Environment used to boot the debug kernel from `slot`
    pub fn debug_env(&self, slot: Slot) -> PathBuf {
        match slot {
            Slot::A => self.dir.join("env_a.txt"),
            Slot::B => self.dir.join("env_b.txt"),
        }
    }

    /// Factory environment text file
    pub fn stock_env(&self) -> PathBuf {
        self.dir.join(STOCK_ENV_FILE)
    }
}
