//! Dump directories and environment regions for tests.

use std::io;
use std::path::Path;

use superbird_provision::env::{EnvironmentMap, encode_as_text, encode_binary};
use superbird_provision::partition::{ENV_DUMP_FILE, ENV_TEXT_FILE, MANIFEST};
use tempfile::TempDir;

/// Region size used by fixtures; small enough to keep test dumps tiny
pub const TEST_REGION_SIZE: usize = 4096;

/// A small but realistic environment
pub fn sample_env() -> EnvironmentMap {
    [
        ("bootdelay", "1"),
        ("bootcmd", "run check_charger"),
        ("storeargs", "setenv bootargs ${initargs} ${fs_type}"),
        ("initargs", "init=/sbin/pre-init ro root=/dev/mmcblk0p14"),
        ("active_slot", "_a"),
        ("boot_part", "boot_a"),
        ("firstboot", "0"),
    ]
    .into_iter()
    .collect()
}

/// Binary region holding `map`, sized [`TEST_REGION_SIZE`]
///
/// # Panics
///
/// Panics if `map` does not fit.
pub fn env_region(map: &EnvironmentMap) -> Vec<u8> {
    crate::must(encode_binary(map, TEST_REGION_SIZE))
}

/// Temporary dump directory
pub struct DumpDir {
    dir: TempDir,
}

impl DumpDir {
    /// Empty directory
    pub fn empty() -> io::Result<Self> {
        Ok(Self {
            dir: tempfile::tempdir()?,
        })
    }

    /// Every manifest file plus `env.txt`, as a full dump writes them
    pub fn complete() -> io::Result<Self> {
        let dir = Self::empty()?;
        for part in MANIFEST.iter() {
            if part.dump_file == ENV_DUMP_FILE {
                std::fs::write(dir.path().join(ENV_DUMP_FILE), env_region(&sample_env()))?;
            } else {
                std::fs::write(
                    dir.path().join(part.dump_file),
                    format!("{} image", part.name),
                )?;
            }
        }
        std::fs::write(dir.path().join(ENV_TEXT_FILE), encode_as_text(&sample_env()))?;
        Ok(dir)
    }

    /// Remove one file
    pub fn without(self, file: &str) -> io::Result<Self> {
        std::fs::remove_file(self.path().join(file))?;
        Ok(self)
    }

    /// Write one file
    pub fn with_file(self, file: &str, contents: impl AsRef<[u8]>) -> io::Result<Self> {
        std::fs::write(self.path().join(file), contents)?;
        Ok(self)
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn contains(&self, file: &str) -> bool {
        self.path().join(file).is_file()
    }
}
