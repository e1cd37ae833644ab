//! Error types for provisioning workflows

use std::path::PathBuf;

use thiserror::Error;

use crate::device::{DeviceError, DeviceMode};
use crate::env::{EnvDecodeError, EnvEncodeError, EnvTextError};
use crate::report::RestoreReport;

/// Errors that can occur while driving a provisioning workflow
#[derive(Error, Debug)]
pub enum ProvisionError {
    /// No device is attached in any known mode
    #[error("Device not found: no superbird attached in normal, USB or USB burn mode")]
    DeviceNotFound,

    /// The device is in a mode the requested operation cannot start from
    #[error("Device is in {actual} mode, expected {expected}")]
    UnexpectedMode {
        /// Mode the operation needs
        expected: DeviceMode,
        /// Mode the device reported
        actual: DeviceMode,
    },

    /// The device did not come back in USB burn mode after the secondary loader was booted
    #[error("Failed to enter USB burn mode: device reports {observed}")]
    RecoveryTransitionFailed {
        /// Mode observed after the transition wait, if any device was found
        observed: String,
    },

    /// Restore pre-flight found required dump files missing; no device write was issued
    #[error("Missing expected dump file(s) in {}: {}", .dir.display(), .missing.join(", "))]
    MissingDumpFiles {
        /// Input directory that was checked
        dir: PathBuf,
        /// File names that were not found
        missing: Vec<String>,
    },

    /// A full-device dump stopped at the first failing partition
    #[error("Dump aborted at partition '{partition}' ({} of the set already dumped); the dump set is incomplete", .completed.len())]
    DumpAborted {
        /// Partition whose dump failed
        partition: String,
        /// Partitions dumped before the failure; their files remain on disk
        completed: Vec<String>,
        /// Underlying failure
        #[source]
        source: Box<ProvisionError>,
    },

    /// A full-device restore stopped at a partition whose write is not recoverable
    #[error("Restore aborted while writing partition '{partition}'")]
    RestoreAborted {
        /// Partition whose write failed
        partition: String,
        /// Outcomes recorded up to and including the failed step
        report: Box<RestoreReport>,
        /// Underlying transport failure
        #[source]
        source: DeviceError,
    },

    /// A device primitive failed
    #[error("Device operation failed: {0}")]
    Device(#[from] DeviceError),

    /// The environment region could not be decoded
    #[error("Failed to decode environment dump {}: {source}", .path.display())]
    EnvDecode {
        /// Dump file that was decoded
        path: PathBuf,
        /// Decode failure
        #[source]
        source: EnvDecodeError,
    },

    /// The environment text file could not be parsed
    #[error("Invalid environment text file {}: {source}", .path.display())]
    EnvText {
        /// Text file that was parsed
        path: PathBuf,
        /// Parse failure
        #[source]
        source: EnvTextError,
    },

    /// An environment file contains no entries and would wipe the device environment
    #[error("Environment file {} has no entries; refusing to replace the device environment with it", .0.display())]
    EmptyEnvironment(PathBuf),

    /// The environment map could not be encoded into a region
    #[error("Failed to encode environment region: {0}")]
    EnvEncode(#[from] EnvEncodeError),

    /// Local file system error
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        /// Path involved in the failed operation
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },
}

impl ProvisionError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ProvisionError::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether the failure happened before any device write was issued
    pub fn is_preflight(&self) -> bool {
        matches!(
            self,
            ProvisionError::MissingDumpFiles { .. }
                | ProvisionError::EnvText { .. }
                | ProvisionError::EmptyEnvironment(_)
        )
    }
}

/// Convenience result alias for provisioning operations
pub type Result<T> = std::result::Result<T, ProvisionError>;
