//! Convenience re-exports for common provisioning types

pub use crate::config::{BurnSpeed, ToolConfig};
pub use crate::device::{BurnDevice, DeviceError, DeviceLink, DeviceMode};
pub use crate::env::EnvironmentMap;
pub use crate::env_workflow::EnvWorkflow;
pub use crate::error::ProvisionError;
pub use crate::images::BundledImages;
pub use crate::mode::{ModeController, RecoveryEntry};
pub use crate::orchestrator::PartitionSetOrchestrator;
pub use crate::partition::Slot;
pub use crate::recipes::{BootPolicy, boot_debug_kernel};
pub use crate::report::{Advisory, DumpReport, RestoreOutcome, RestoreReport};
pub use crate::shell::{ShellSummary, run_shell};
