//! Environment read, merge and replace against a live device
//!
//! Every workflow starts by selecting the eMMC environment store with
//! `amlmmc env` and ends with `env save`. A replace erases the store first;
//! the erase is bracketed by settle delays so the bootloader has finished
//! with the store before the next command arrives.

use std::path::Path;
use std::time::Duration;

use tracing::{debug, info};

use crate::device::BurnDevice;
use crate::env::{self, DEFAULT_REGION_SIZE, EnvironmentMap};
use crate::error::{ProvisionError, Result};
use crate::partition::ENV_PARTITION;
use crate::progress::{ProgressEvent, ProgressSender, StepPhase, Workflow};

/// Delay around the erase of the environment store
pub const DEFAULT_SETTLE_INTERVAL: Duration = Duration::from_secs(1);

/// Shortest delay accepted around the erase
pub const MIN_SETTLE_INTERVAL: Duration = Duration::from_millis(100);

/// Selects the eMMC environment store
pub const SELECT_ENV_STORE: &str = "amlmmc env";
/// Erases the selected environment store
pub const ERASE_ENV_STORE: &str = "amlmmc erase env";
/// Persists the live environment
pub const SAVE_ENV: &str = "env save";

/// Composes the environment codec with device primitives
#[derive(Debug, Clone)]
pub struct EnvWorkflow {
    settle: Duration,
    region_size: usize,
    progress: ProgressSender,
}

impl Default for EnvWorkflow {
    fn default() -> Self {
        Self::new(DEFAULT_SETTLE_INTERVAL, DEFAULT_REGION_SIZE)
    }
}

impl EnvWorkflow {
    /// Create a workflow with the given settle interval and region size
    ///
    /// Intervals below [`MIN_SETTLE_INTERVAL`] are raised to it.
    pub fn new(settle: Duration, region_size: usize) -> Self {
        Self {
            settle: settle.max(MIN_SETTLE_INTERVAL),
            region_size,
            progress: ProgressSender::new(),
        }
    }

    /// Settle interval used around the erase
    pub fn settle_interval(&self) -> Duration {
        self.settle
    }

    /// Subscribe to step progress events
    pub fn subscribe_progress(&self) -> tokio::sync::broadcast::Receiver<ProgressEvent> {
        self.progress.subscribe()
    }

    /// Dump the device environment and write its text form to `output`
    ///
    /// The raw region goes through a temporary file that is removed however
    /// the call ends.
    pub async fn get_env(
        &self,
        device: &mut dyn BurnDevice,
        output: &Path,
    ) -> Result<EnvironmentMap> {
        info!("Getting current env and writing to text file: {}", output.display());
        self.step(StepPhase::Started, "get", 1, 1);

        let scratch = tempfile::NamedTempFile::new()
            .map_err(|e| ProvisionError::io(std::env::temp_dir(), e))?;
        device.run_command(SELECT_ENV_STORE).await?;
        device.dump_partition(ENV_PARTITION, scratch.path()).await?;
        let map = env::convert_env_dump(scratch.path(), output, self.region_size).await?;

        self.step(StepPhase::Finished, "get", 1, 1);
        Ok(map)
    }

    /// Import a text file into the live environment without erasing it first
    pub async fn merge_env(&self, device: &mut dyn BurnDevice, text_path: &Path) -> Result<()> {
        info!("Importing the contents of {}", text_path.display());
        env::read_text_file(text_path).await?;

        self.step(StepPhase::Started, "merge", 1, 1);
        device.run_command(SELECT_ENV_STORE).await?;
        device.apply_env_file(text_path).await?;
        device.run_command(SAVE_ENV).await?;
        self.step(StepPhase::Finished, "merge", 1, 1);
        Ok(())
    }

    /// Erase the device environment and import a text file in its place
    ///
    /// The file is validated before any command is sent; an empty file is
    /// refused because it would leave the device without an environment.
    pub async fn replace_env(&self, device: &mut dyn BurnDevice, text_path: &Path) -> Result<()> {
        let map = env::read_text_file(text_path).await?;
        if map.is_empty() {
            return Err(ProvisionError::EmptyEnvironment(text_path.to_path_buf()));
        }

        info!("Wiping env partition");
        self.step(StepPhase::Started, "erase", 1, 2);
        device.run_command(SELECT_ENV_STORE).await?;
        self.settle().await;
        device.run_command(ERASE_ENV_STORE).await?;
        self.settle().await;
        self.step(StepPhase::Finished, "erase", 1, 2);

        info!("Importing the contents of {} ({} variables)", text_path.display(), map.len());
        self.step(StepPhase::Started, "apply", 2, 2);
        device.apply_env_file(text_path).await?;
        device.run_command(SAVE_ENV).await?;
        self.step(StepPhase::Finished, "apply", 2, 2);
        Ok(())
    }

    /// Replace the device environment with the factory one
    pub async fn restore_stock_env(
        &self,
        device: &mut dyn BurnDevice,
        stock_env: &Path,
    ) -> Result<()> {
        info!("Restoring env by first wiping env, then importing {}", stock_env.display());
        self.replace_env(device, stock_env).await
    }

    async fn settle(&self) {
        debug!("Waiting {:?} for the environment store to settle", self.settle);
        tokio::time::sleep(self.settle).await;
    }

    fn step(&self, phase: StepPhase, step: &str, index: usize, total: usize) {
        self.progress.emit(Workflow::Environment, phase, step, index, total);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settle_is_one_second() {
        assert_eq!(EnvWorkflow::default().settle_interval(), Duration::from_secs(1));
    }

    #[test]
    fn zero_settle_is_raised_to_the_minimum() {
        let workflow = EnvWorkflow::new(Duration::ZERO, DEFAULT_REGION_SIZE);
        assert_eq!(workflow.settle_interval(), MIN_SETTLE_INTERVAL);
    }
}
