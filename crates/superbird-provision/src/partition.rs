//! Partition manifest for the superbird A/B layout
//!
//! The manifest is a fixed table in dump order. Restore order is not stored
//! separately; it is derived from each partition's [`PartitionRole`].

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Redundant A/B slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Slot {
    /// Slot A
    A,
    /// Slot B
    B,
}

impl Slot {
    /// Get the other slot
    pub fn other(self) -> Self {
        match self {
            Slot::A => Slot::B,
            Slot::B => Slot::A,
        }
    }

    /// Suffix used by U-Boot variables and partition names (`_a` / `_b`)
    pub fn suffix(self) -> &'static str {
        match self {
            Slot::A => "_a",
            Slot::B => "_b",
        }
    }

    /// Parse operator input, falling back to slot A with a warning on anything but A/B
    pub fn parse_lenient(input: &str) -> Self {
        match input.parse() {
            Ok(slot) => slot,
            Err(_) => {
                warn!("Invalid slot '{}' provided, using slot A", input);
                Slot::A
            }
        }
    }
}

impl std::fmt::Display for Slot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Slot::A => write!(f, "A"),
            Slot::B => write!(f, "B"),
        }
    }
}

/// Error returned when a slot name is neither A nor B
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid slot '{0}': expected A or B")]
pub struct InvalidSlot(pub String);

impl std::str::FromStr for Slot {
    type Err = InvalidSlot;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "a" => Ok(Slot::A),
            "b" => Ok(Slot::B),
            _ => Err(InvalidSlot(s.to_string())),
        }
    }
}

/// What a partition holds; drives restore ordering and optionality
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartitionRole {
    /// Primary bootloader
    Bootloader,
    /// U-Boot environment region
    Environment,
    /// Bootable image of one slot (firmware package, kernel)
    BootImage(Slot),
    /// Verification metadata of one slot (device tree overlay, vbmeta)
    Metadata(Slot),
    /// Boot splash
    Logo,
    /// Bootloader control block
    Misc,
    /// Root filesystem of one slot
    System(Slot),
    /// Persistent settings filesystem
    Settings,
    /// User data filesystem
    Data,
}

impl PartitionRole {
    /// Rank in the restore sequence; lower ranks are written first
    ///
    /// The environment is applied before any partition write and the
    /// bootloader always comes last.
    pub fn restore_rank(self) -> u8 {
        match self {
            PartitionRole::Environment => 0,
            PartitionRole::BootImage(_) => 1,
            PartitionRole::Metadata(_) => 2,
            PartitionRole::Logo => 3,
            PartitionRole::Misc => 4,
            PartitionRole::System(_) => 5,
            PartitionRole::Data => 6,
            PartitionRole::Settings => 7,
            PartitionRole::Bootloader => 8,
        }
    }

    /// Partitions whose absence is tolerated by a full restore
    pub fn is_optional_for_restore(self) -> bool {
        matches!(
            self,
            PartitionRole::Bootloader | PartitionRole::Settings | PartitionRole::Data
        )
    }
}

/// One entry of the fixed partition manifest
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Partition {
    /// Partition name as the bootloader knows it
    pub name: &'static str,
    /// What the partition holds
    pub role: PartitionRole,
    /// Whether a full restore refuses to start without this partition's dump file
    pub required_for_restore: bool,
    /// File name used inside a dump directory
    pub dump_file: &'static str,
}

impl Partition {
    const fn new(
        name: &'static str,
        role: PartitionRole,
        required_for_restore: bool,
        dump_file: &'static str,
    ) -> Self {
        Self {
            name,
            role,
            required_for_restore,
            dump_file,
        }
    }
}

/// Name of the environment partition
pub const ENV_PARTITION: &str = "env";
/// Binary dump of the environment partition inside a dump directory
pub const ENV_DUMP_FILE: &str = "env.dump";
/// Text form of the environment inside a dump directory
pub const ENV_TEXT_FILE: &str = "env.txt";

/// Every partition of a full-device dump, in dump order
pub const MANIFEST: [Partition; 16] = [
    Partition::new("bootloader", PartitionRole::Bootloader, false, "bootloader.dump"),
    Partition::new(ENV_PARTITION, PartitionRole::Environment, false, ENV_DUMP_FILE),
    Partition::new("fip_a", PartitionRole::BootImage(Slot::A), true, "fip_a.dump"),
    Partition::new("fip_b", PartitionRole::BootImage(Slot::B), true, "fip_b.dump"),
    Partition::new("logo", PartitionRole::Logo, true, "logo.dump"),
    Partition::new("dtbo_a", PartitionRole::Metadata(Slot::A), true, "dtbo_a.dump"),
    Partition::new("dtbo_b", PartitionRole::Metadata(Slot::B), true, "dtbo_b.dump"),
    Partition::new("vbmeta_a", PartitionRole::Metadata(Slot::A), true, "vbmeta_a.dump"),
    Partition::new("vbmeta_b", PartitionRole::Metadata(Slot::B), true, "vbmeta_b.dump"),
    Partition::new("boot_a", PartitionRole::BootImage(Slot::A), true, "boot_a.dump"),
    Partition::new("boot_b", PartitionRole::BootImage(Slot::B), true, "boot_b.dump"),
    Partition::new("misc", PartitionRole::Misc, true, "misc.dump"),
    Partition::new("settings", PartitionRole::Settings, false, "settings.ext4"),
    Partition::new("system_a", PartitionRole::System(Slot::A), true, "system_a.ext2"),
    Partition::new("system_b", PartitionRole::System(Slot::B), true, "system_b.ext2"),
    Partition::new("data", PartitionRole::Data, false, "data.ext4"),
];

/// File names written by older releases, mapped to their current names
pub const LEGACY_FILE_NAMES: [(&str, &str); 4] = [
    ("system_a.dump", "system_a.ext2"),
    ("system_b.dump", "system_b.ext2"),
    ("settings.dump", "settings.ext4"),
    ("data.dump", "data.ext4"),
];

/// Partitions in dump order
pub fn dump_manifest() -> impl Iterator<Item = &'static Partition> {
    MANIFEST.iter()
}

/// Partitions in restore order, environment excluded
///
/// The sort is stable, so partitions sharing a rank keep manifest order.
pub fn restore_manifest() -> Vec<&'static Partition> {
    let mut parts: Vec<_> = MANIFEST
        .iter()
        .filter(|p| p.role != PartitionRole::Environment)
        .collect();
    parts.sort_by_key(|p| p.role.restore_rank());
    parts
}

/// Dump files that must be present before a full restore may start
pub fn required_files() -> impl Iterator<Item = &'static str> {
    MANIFEST
        .iter()
        .filter(|p| p.required_for_restore)
        .map(|p| p.dump_file)
}

/// Look up a manifest partition by name
pub fn find(name: &str) -> Option<&'static Partition> {
    MANIFEST.iter().find(|p| p.name == name)
}
