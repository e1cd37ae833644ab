//! Full-device dump and restore sequencing
//!
//! The orchestrator owns no device state. Every operation borrows the
//! [`BurnDevice`] handle for its whole duration and issues one primitive at a
//! time, in manifest order.

use std::path::Path;

use tracing::{debug, error, info, warn};

use crate::device::{BurnDevice, DeviceError};
use crate::env::{self, DEFAULT_REGION_SIZE};
use crate::error::{ProvisionError, Result};
use crate::partition::{
    self, ENV_DUMP_FILE, ENV_PARTITION, ENV_TEXT_FILE, LEGACY_FILE_NAMES, Partition, PartitionRole,
};
use crate::progress::{ProgressEvent, ProgressSender, StepPhase, Workflow};
use crate::report::{
    DumpReport, DumpedFile, EnvSource, FirstBoot, LegacyRename, RenameOutcome, RestoreOutcome,
    RestoreReport,
};

/// Sequences full-device dumps and restores over the fixed partition manifest
#[derive(Debug, Clone)]
pub struct PartitionSetOrchestrator {
    region_size: usize,
    progress: ProgressSender,
}

impl Default for PartitionSetOrchestrator {
    fn default() -> Self {
        Self::new(DEFAULT_REGION_SIZE)
    }
}

impl PartitionSetOrchestrator {
    /// Create an orchestrator decoding environment dumps with the given region size
    pub fn new(region_size: usize) -> Self {
        Self {
            region_size,
            progress: ProgressSender::new(),
        }
    }

    /// Subscribe to per-partition progress events
    pub fn subscribe_progress(&self) -> tokio::sync::broadcast::Receiver<ProgressEvent> {
        self.progress.subscribe()
    }

    /// Dump every manifest partition into `output_dir`, in manifest order
    ///
    /// An existing directory is reused: dump files from an earlier run are
    /// removed before the first read, anything else is left alone. Stops at
    /// the first failure. Files written before the failure are left in place
    /// and listed in the returned [`ProvisionError::DumpAborted`].
    pub async fn dump_device(
        &self,
        device: &mut dyn BurnDevice,
        output_dir: &Path,
    ) -> Result<DumpReport> {
        info!("Dumping entire device to {}", output_dir.display());
        tokio::fs::create_dir_all(output_dir)
            .await
            .map_err(|e| ProvisionError::io(output_dir, e))?;
        clear_previous_dump(output_dir).await?;

        let total = partition::MANIFEST.len();
        let env_text = output_dir.join(ENV_TEXT_FILE);
        let mut files = Vec::with_capacity(total);
        let mut completed: Vec<String> = Vec::with_capacity(total);
        let mut env_entries = 0;

        for (idx, part) in partition::dump_manifest().enumerate() {
            let index = idx.saturating_add(1);
            let path = output_dir.join(part.dump_file);
            self.progress
                .emit(Workflow::DumpDevice, StepPhase::Started, part.name, index, total);

            let step = self.dump_one(device, part, &path, &env_text).await;
            match step {
                Ok(entries) => {
                    if let Some(entries) = entries {
                        env_entries = entries;
                    }
                    self.progress
                        .emit(Workflow::DumpDevice, StepPhase::Finished, part.name, index, total);
                    completed.push(part.name.to_string());
                    files.push(DumpedFile {
                        partition: part.name.to_string(),
                        path,
                    });
                }
                Err(e) => {
                    self.progress
                        .emit(Workflow::DumpDevice, StepPhase::Failed, part.name, index, total);
                    error!(
                        "Dump of partition '{}' failed after {} of {} partitions: {}",
                        part.name,
                        completed.len(),
                        total,
                        e
                    );
                    return Err(ProvisionError::DumpAborted {
                        partition: part.name.to_string(),
                        completed,
                        source: Box::new(e),
                    });
                }
            }
        }

        info!("Device dump complete: {} partitions", files.len());
        Ok(DumpReport {
            output_dir: output_dir.to_path_buf(),
            files,
            env_text,
            env_entries,
        })
    }

    /// Dump one partition; for the environment also derive its text form
    async fn dump_one(
        &self,
        device: &mut dyn BurnDevice,
        part: &Partition,
        path: &Path,
        env_text: &Path,
    ) -> Result<Option<usize>> {
        debug!("Dumping partition '{}' to {}", part.name, path.display());
        device.dump_partition(part.name, path).await?;
        if part.role != PartitionRole::Environment {
            return Ok(None);
        }
        let map = env::convert_env_dump(path, env_text, self.region_size).await?;
        Ok(Some(map.len()))
    }

    /// Restore a full device from a dump directory
    ///
    /// Nothing is written to the device unless every required dump file and
    /// an environment input are present. The environment is applied and saved
    /// before any partition write, and the bootloader is always written last.
    pub async fn restore_device(
        &self,
        device: &mut dyn BurnDevice,
        input_dir: &Path,
        dont_reset: bool,
    ) -> Result<RestoreReport> {
        info!("Restoring entire device from dump files in {}", input_dir.display());
        let mut report = RestoreReport::new(input_dir.to_path_buf(), dont_reset);
        report.renames = normalize_legacy_names(input_dir).await;

        preflight(input_dir).await?;

        let env_txt = input_dir.join(ENV_TEXT_FILE);
        let env_source = if is_file(&env_txt).await {
            EnvSource::Text
        } else {
            info!("{} not found, deriving it from {}", ENV_TEXT_FILE, ENV_DUMP_FILE);
            env::convert_env_dump(&input_dir.join(ENV_DUMP_FILE), &env_txt, self.region_size)
                .await?;
            EnvSource::DerivedFromDump
        };
        env::read_text_file(&env_txt).await?;
        report.env_source = Some(env_source);

        let steps = partition::restore_manifest();
        let total = steps.len().saturating_add(1);

        self.progress
            .emit(Workflow::RestoreDevice, StepPhase::Started, ENV_PARTITION, 1, total);
        if let Err(e) = apply_and_save_env(device, &env_txt).await {
            return Err(self.abort(report, ENV_PARTITION, 1, total, e));
        }
        report.record(ENV_PARTITION, RestoreOutcome::Succeeded);
        self.progress
            .emit(Workflow::RestoreDevice, StepPhase::Finished, ENV_PARTITION, 1, total);

        let first_boot = FirstBoot::for_restore(dont_reset);
        for (idx, part) in steps.into_iter().enumerate() {
            let index = idx.saturating_add(2);
            let path = input_dir.join(part.dump_file);
            let present = is_file(&path).await;
            self.progress
                .emit(Workflow::RestoreDevice, StepPhase::Started, part.name, index, total);

            match part.role {
                PartitionRole::Data | PartitionRole::Settings if !present => {
                    warn!(
                        "Did not find {}, setting first-boot indicator instead of writing '{}'",
                        path.display(),
                        part.name
                    );
                    let outcome = match set_first_boot(device, first_boot).await {
                        Ok(()) => RestoreOutcome::SkippedDegraded { first_boot },
                        Err(e) => {
                            warn!("Setting first-boot indicator for '{}' failed: {}", part.name, e);
                            report.advise_factory_reset(part.name);
                            RestoreOutcome::FailedRecoverable {
                                error: e.to_string(),
                            }
                        }
                    };
                    let phase = if outcome.is_ok() {
                        StepPhase::Skipped
                    } else {
                        StepPhase::Failed
                    };
                    report.record(part.name, outcome);
                    self.progress
                        .emit(Workflow::RestoreDevice, phase, part.name, index, total);
                }
                PartitionRole::Bootloader => {
                    let outcome = if present {
                        match device.restore_partition(part.name, &path).await {
                            Ok(()) => RestoreOutcome::Succeeded,
                            Err(e) => RestoreOutcome::FailedRecoverable {
                                error: e.to_string(),
                            },
                        }
                    } else {
                        RestoreOutcome::FailedRecoverable {
                            error: format!("{} not found", part.dump_file),
                        }
                    };
                    let phase = if outcome.is_ok() {
                        StepPhase::Finished
                    } else {
                        warn!("Flashing bootloader failed: {:?}", outcome);
                        StepPhase::Failed
                    };
                    report.record(part.name, outcome);
                    self.progress
                        .emit(Workflow::RestoreDevice, phase, part.name, index, total);
                }
                _ => {
                    debug!("Restoring partition '{}' from {}", part.name, path.display());
                    if let Err(e) = device.restore_partition(part.name, &path).await {
                        return Err(self.abort(report, part.name, index, total, e));
                    }
                    report.record(part.name, RestoreOutcome::Succeeded);
                    self.progress
                        .emit(Workflow::RestoreDevice, StepPhase::Finished, part.name, index, total);
                }
            }
        }

        info!(
            "Device restore complete with {} advisories. Replug the device to start using it.",
            report.advisories.len()
        );
        Ok(report)
    }

    fn abort(
        &self,
        mut report: RestoreReport,
        partition: &str,
        index: usize,
        total: usize,
        source: DeviceError,
    ) -> ProvisionError {
        error!("Restore of partition '{}' failed, aborting: {}", partition, source);
        report.record(
            partition,
            RestoreOutcome::FailedFatal {
                error: source.to_string(),
            },
        );
        self.progress
            .emit(Workflow::RestoreDevice, StepPhase::Failed, partition, index, total);
        ProvisionError::RestoreAborted {
            partition: partition.to_string(),
            report: Box::new(report),
            source,
        }
    }

    /// Raw-read one partition; no manifest lookup
    pub async fn dump_partition(
        &self,
        device: &mut dyn BurnDevice,
        name: &str,
        path: &Path,
    ) -> Result<()> {
        info!("Dumping partition '{}' to {}", name, path.display());
        device.dump_partition(name, path).await?;
        Ok(())
    }

    /// Raw-write one partition; no manifest lookup
    pub async fn restore_partition(
        &self,
        device: &mut dyn BurnDevice,
        name: &str,
        path: &Path,
    ) -> Result<()> {
        if !is_file(path).await {
            return Err(ProvisionError::io(
                path,
                std::io::Error::from(std::io::ErrorKind::NotFound),
            ));
        }
        info!("Restoring partition '{}' from {}", name, path.display());
        device.restore_partition(name, path).await?;
        Ok(())
    }
}

/// Rename dump files written by older releases to their current names
///
/// An existing file under the current name is never overwritten. Failures
/// are logged and reported, never raised.
pub async fn normalize_legacy_names(dir: &Path) -> Vec<LegacyRename> {
    let mut renames = Vec::with_capacity(LEGACY_FILE_NAMES.len());
    for (legacy, current) in LEGACY_FILE_NAMES {
        let from = dir.join(legacy);
        let to = dir.join(current);
        let outcome = if is_file(&to).await {
            RenameOutcome::AlreadyCorrect
        } else if !is_file(&from).await {
            RenameOutcome::Absent
        } else {
            match tokio::fs::rename(&from, &to).await {
                Ok(()) => {
                    info!("Renamed {} to {}", legacy, current);
                    RenameOutcome::Renamed
                }
                Err(e) => {
                    warn!("Could not rename {} to {}: {}", legacy, current, e);
                    RenameOutcome::Failed {
                        error: e.to_string(),
                    }
                }
            }
        };
        renames.push(LegacyRename {
            legacy: legacy.to_string(),
            current: current.to_string(),
            outcome,
        });
    }
    renames
}

/// Every missing input, named in manifest order
async fn preflight(input_dir: &Path) -> Result<()> {
    let mut missing = Vec::new();
    for file in partition::required_files() {
        if !is_file(&input_dir.join(file)).await {
            missing.push(file.to_string());
        }
    }
    if !is_file(&input_dir.join(ENV_TEXT_FILE)).await
        && !is_file(&input_dir.join(ENV_DUMP_FILE)).await
    {
        missing.push(ENV_DUMP_FILE.to_string());
    }

    if missing.is_empty() {
        return Ok(());
    }
    for file in &missing {
        error!("Missing expected dump file: {}", input_dir.join(file).display());
    }
    Err(ProvisionError::MissingDumpFiles {
        dir: input_dir.to_path_buf(),
        missing,
    })
}

/// Remove dump files left by an earlier run, legacy names included
async fn clear_previous_dump(output_dir: &Path) -> Result<()> {
    let stale = partition::dump_manifest()
        .map(|p| p.dump_file)
        .chain(std::iter::once(ENV_TEXT_FILE))
        .chain(LEGACY_FILE_NAMES.iter().map(|(legacy, _)| *legacy));

    for file in stale {
        let path = output_dir.join(file);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => debug!("Removed previous dump file {}", path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(ProvisionError::io(&path, e)),
        }
    }
    Ok(())
}

async fn apply_and_save_env(
    device: &mut dyn BurnDevice,
    env_txt: &Path,
) -> std::result::Result<(), DeviceError> {
    info!("Applying environment from {}", env_txt.display());
    device.apply_env_file(env_txt).await?;
    device.run_command("env save").await
}

async fn set_first_boot(
    device: &mut dyn BurnDevice,
    first_boot: FirstBoot,
) -> std::result::Result<(), DeviceError> {
    device
        .run_command(&format!("setenv firstboot {}", first_boot.env_value()))
        .await?;
    device.run_command("saveenv").await
}

async fn is_file(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_file())
        .unwrap_or(false)
}
