//! Provisioning workflows for the superbird (Spotify Car Thing)
//!
//! This crate composes the device's USB burn-mode primitives into safe,
//! ordered workflows:
//! - Full-device dump and restore over a fixed A/B partition manifest
//! - Degraded restore when the data or settings dumps are absent
//! - U-Boot environment round trip between the binary region and `key=value` text
//! - Environment get, merge and replace with an erase-settle-apply protocol
//! - Boot-policy recipes (burn mode, charger check, slot lock, UART console)
//!
//! # Architecture
//!
//! - [`device`]: Transport seams ([`DeviceLink`], [`BurnDevice`]) and device modes
//! - [`partition`]: Partition manifest and restore ordering
//! - [`env`]: Environment codec
//! - [`orchestrator`]: Full-device dump and restore
//! - [`env_workflow`]: Environment workflows against a live device
//! - [`recipes`]: Boot-policy command lists and the one-shot debug boot
//! - [`mode`]: Mode detection and transitions
//! - [`shell`]: Interactive command loop
//! - [`config`]: Tool configuration
//! - [`report`]: Per-step outcomes and advisories
//! - [`error`]: Error types
//!
//! # Concurrency
//!
//! Everything is strictly sequential. The burn-mode handle is borrowed
//! mutably by one workflow at a time and no primitive is issued before the
//! previous one returned.
//!
//! # Example
//!
//! ```ignore
//! use superbird_provision::prelude::*;
//!
//! # async fn example(link: Box<dyn DeviceLink>) -> Result<(), Box<dyn std::error::Error>> {
//! let config = ToolConfig::load().await?;
//! let modes = ModeController::new(link, config.images());
//! let mut device = modes.ensure_recovery().await?;
//!
//! let orchestrator = PartitionSetOrchestrator::new(config.env_region_size);
//! let report = orchestrator
//!     .restore_device(device.as_mut(), "dumps/".as_ref(), false)
//!     .await?;
//!
//! for advisory in &report.advisories {
//!     println!("{advisory}");
//! }
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_op_in_unsafe_fn, clippy::unwrap_used)]
#![warn(missing_docs, rust_2018_idioms)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod config;
pub mod device;
pub mod env;
pub mod env_workflow;
pub mod error;
pub mod images;
pub mod mode;
pub mod orchestrator;
pub mod partition;
pub mod prelude;
pub mod progress;
pub mod recipes;
pub mod report;
pub mod shell;

pub use config::{BurnSpeed, HelperConfig, ToolConfig};
pub use device::{BurnDevice, DeviceError, DeviceLink, DeviceMode};
pub use env::{
    DEFAULT_REGION_SIZE, EnvDecodeError, EnvEncodeError, EnvTextError, EnvironmentMap,
    convert_env_dump, decode, encode_as_text, encode_binary, parse_text,
};
pub use env_workflow::EnvWorkflow;
pub use error::{ProvisionError, Result};
pub use images::BundledImages;
pub use mode::{ModeController, RecoveryEntry};
pub use orchestrator::{PartitionSetOrchestrator, normalize_legacy_names};
pub use partition::{Partition, PartitionRole, Slot};
pub use progress::{ProgressEvent, StepPhase, Workflow};
pub use recipes::{BootPolicy, boot_debug_kernel};
pub use report::{
    Advisory, DumpReport, EnvSource, FirstBoot, LegacyRename, RenameOutcome, RestoreOutcome,
    RestoreReport,
};
pub use shell::{ShellSummary, run_shell};
