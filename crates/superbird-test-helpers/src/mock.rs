//! Recording fakes for the device seams.
//!
//! [`RecordingDevice`] stands in for a burn-mode handle and [`ScriptedLink`]
//! for the mode-level link. Both append every call to a shared [`CallLog`]
//! with the tokio clock reading at the time of the call, so tests can assert
//! on order and on delays under a paused clock.

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use superbird_provision::device::{BurnDevice, DeviceError, DeviceLink, DeviceMode};
use tokio::time::Instant;

/// One primitive call observed by a fake
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceCall {
    /// Bootloader console command
    Command(String),
    /// Raw partition read
    Dump { partition: String, path: PathBuf },
    /// Raw partition write
    Restore { partition: String, path: PathBuf },
    /// Environment text import
    ApplyEnv(PathBuf),
    /// One-shot kernel boot
    BootKernel {
        env: PathBuf,
        kernel: PathBuf,
        initrd: PathBuf,
    },
    /// Secondary loader staged through the mask ROM
    BootLoader { loader: PathBuf, bootloader: PathBuf },
    /// Burn-mode handle opened
    OpenRecovery,
}

/// A call together with the tokio clock reading when it was made
#[derive(Debug, Clone)]
pub struct TimedCall {
    pub call: DeviceCall,
    pub at: Instant,
}

/// Shared, cloneable call log
#[derive(Debug, Clone, Default)]
pub struct CallLog {
    calls: Arc<Mutex<Vec<TimedCall>>>,
}

impl CallLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, call: DeviceCall) {
        self.calls.lock().push(TimedCall {
            call,
            at: Instant::now(),
        });
    }

    pub fn timed(&self) -> Vec<TimedCall> {
        self.calls.lock().clone()
    }

    pub fn calls(&self) -> Vec<DeviceCall> {
        self.calls.lock().iter().map(|c| c.call.clone()).collect()
    }

    /// Console commands in the order they were sent
    pub fn commands(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                DeviceCall::Command(cmd) => Some(cmd),
                _ => None,
            })
            .collect()
    }

    /// Partitions written, in order
    pub fn restored(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                DeviceCall::Restore { partition, .. } => Some(partition),
                _ => None,
            })
            .collect()
    }

    /// Partitions read, in order
    pub fn dumped(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                DeviceCall::Dump { partition, .. } => Some(partition),
                _ => None,
            })
            .collect()
    }

    /// Position of the first call matching `pred`
    pub fn position(&self, pred: impl Fn(&DeviceCall) -> bool) -> Option<usize> {
        self.calls().iter().position(pred)
    }

    pub fn len(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Fake burn-mode handle that records calls and fails on request
#[derive(Debug, Clone, Default)]
pub struct RecordingDevice {
    log: CallLog,
    dump_contents: HashMap<String, Vec<u8>>,
    failing_dumps: HashSet<String>,
    failing_restores: HashSet<String>,
    failing_commands: HashSet<String>,
    failing_env_apply: bool,
    failing_boot: bool,
}

impl RecordingDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record into an existing log
    pub fn with_log(mut self, log: CallLog) -> Self {
        self.log = log;
        self
    }

    /// Bytes written when `partition` is dumped
    pub fn with_dump_contents(mut self, partition: &str, bytes: Vec<u8>) -> Self {
        self.dump_contents.insert(partition.to_string(), bytes);
        self
    }

    pub fn failing_dump(mut self, partition: &str) -> Self {
        self.failing_dumps.insert(partition.to_string());
        self
    }

    pub fn failing_restore(mut self, partition: &str) -> Self {
        self.failing_restores.insert(partition.to_string());
        self
    }

    /// Reject a command with exactly this text
    pub fn failing_command(mut self, command: &str) -> Self {
        self.failing_commands.insert(command.to_string());
        self
    }

    pub fn failing_env_apply(mut self) -> Self {
        self.failing_env_apply = true;
        self
    }

    pub fn failing_boot(mut self) -> Self {
        self.failing_boot = true;
        self
    }

    pub fn log(&self) -> &CallLog {
        &self.log
    }
}

#[async_trait::async_trait]
impl BurnDevice for RecordingDevice {
    async fn run_command(&mut self, command: &str) -> Result<(), DeviceError> {
        self.log.push(DeviceCall::Command(command.to_string()));
        if self.failing_commands.contains(command) {
            return Err(DeviceError::CommandFailed {
                command: command.to_string(),
                message: "injected failure".to_string(),
            });
        }
        Ok(())
    }

    async fn dump_partition(&mut self, partition: &str, path: &Path) -> Result<(), DeviceError> {
        self.log.push(DeviceCall::Dump {
            partition: partition.to_string(),
            path: path.to_path_buf(),
        });
        if self.failing_dumps.contains(partition) {
            return Err(DeviceError::Transfer {
                partition: partition.to_string(),
                message: "injected failure".to_string(),
            });
        }
        let bytes = self
            .dump_contents
            .get(partition)
            .cloned()
            .unwrap_or_else(|| format!("{partition} image").into_bytes());
        tokio::fs::write(path, bytes).await?;
        Ok(())
    }

    async fn restore_partition(
        &mut self,
        partition: &str,
        path: &Path,
    ) -> Result<(), DeviceError> {
        self.log.push(DeviceCall::Restore {
            partition: partition.to_string(),
            path: path.to_path_buf(),
        });
        if self.failing_restores.contains(partition) {
            return Err(DeviceError::Transfer {
                partition: partition.to_string(),
                message: "injected failure".to_string(),
            });
        }
        Ok(())
    }

    async fn apply_env_file(&mut self, path: &Path) -> Result<(), DeviceError> {
        self.log.push(DeviceCall::ApplyEnv(path.to_path_buf()));
        if self.failing_env_apply {
            return Err(DeviceError::EnvApply("injected failure".to_string()));
        }
        Ok(())
    }

    async fn boot_kernel(
        &mut self,
        env_file: &Path,
        kernel_image: &Path,
        initrd_image: &Path,
    ) -> Result<(), DeviceError> {
        self.log.push(DeviceCall::BootKernel {
            env: env_file.to_path_buf(),
            kernel: kernel_image.to_path_buf(),
            initrd: initrd_image.to_path_buf(),
        });
        if self.failing_boot {
            return Err(DeviceError::Boot("injected failure".to_string()));
        }
        Ok(())
    }
}

/// Fake link answering mode detection from a script
///
/// Each detection consumes the next scripted answer; the last one repeats.
/// Opened handles are [`RecordingDevice`]s sharing the link's log.
#[derive(Debug, Clone)]
pub struct ScriptedLink {
    modes: Arc<Mutex<VecDeque<Option<DeviceMode>>>>,
    log: CallLog,
    device: RecordingDevice,
}

impl ScriptedLink {
    pub fn new(modes: impl IntoIterator<Item = Option<DeviceMode>>) -> Self {
        let log = CallLog::new();
        Self {
            modes: Arc::new(Mutex::new(modes.into_iter().collect())),
            device: RecordingDevice::new().with_log(log.clone()),
            log,
        }
    }

    /// Link whose device always reports `mode`
    pub fn fixed(mode: DeviceMode) -> Self {
        Self::new([Some(mode)])
    }

    /// Handle template returned by `open_recovery`
    pub fn with_device(mut self, device: RecordingDevice) -> Self {
        self.device = device.with_log(self.log.clone());
        self
    }

    pub fn log(&self) -> &CallLog {
        &self.log
    }
}

#[async_trait::async_trait]
impl DeviceLink for ScriptedLink {
    async fn detect_mode(&self) -> Result<Option<DeviceMode>, DeviceError> {
        let mut modes = self.modes.lock();
        let mode = if modes.len() > 1 {
            modes.pop_front().flatten()
        } else {
            modes.front().copied().flatten()
        };
        Ok(mode)
    }

    async fn boot_secondary_loader(
        &self,
        loader_blob: &Path,
        bootloader_image: &Path,
    ) -> Result<(), DeviceError> {
        self.log.push(DeviceCall::BootLoader {
            loader: loader_blob.to_path_buf(),
            bootloader: bootloader_image.to_path_buf(),
        });
        Ok(())
    }

    async fn open_recovery(&self) -> Result<Box<dyn BurnDevice>, DeviceError> {
        self.log.push(DeviceCall::OpenRecovery);
        Ok(Box::new(self.device.clone()))
    }
}
