//! USB transport backed by an external helper program
//!
//! Every primitive runs the helper once as
//! `<program> --speed <speed> <verb> [args...]`. The helper exits non-zero
//! on failure and writes the reason to stderr.

use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::process::Output;

use async_trait::async_trait;
use superbird_provision::{BurnDevice, BurnSpeed, DeviceError, DeviceLink, DeviceMode, HelperConfig};
use tokio::process::Command;
use tracing::{debug, trace};

const VERB_DETECT: &str = "detect";
const VERB_BL2_BOOT: &str = "bl2-boot";
const VERB_BULKCMD: &str = "bulkcmd";
const VERB_DUMP: &str = "dump";
const VERB_RESTORE: &str = "restore";
const VERB_SEND_ENV: &str = "send-env";
const VERB_BOOT: &str = "boot";

/// Reply of `detect` when nothing is attached
const NO_DEVICE: &str = "none";

#[derive(Debug, Clone)]
pub struct HelperTransport {
    program: PathBuf,
    speed: BurnSpeed,
}

impl HelperTransport {
    pub fn new(config: &HelperConfig) -> Self {
        Self {
            program: config.program.clone(),
            speed: config.speed,
        }
    }

    async fn invoke(&self, verb: &str, args: &[&OsStr]) -> Result<Output, DeviceError> {
        let argv = helper_args(self.speed, verb, args);
        debug!("{} {:?}", self.program.display(), argv);
        let output = Command::new(&self.program)
            .args(&argv)
            .kill_on_drop(true)
            .output()
            .await?;
        trace!("{} exited with {}", verb, output.status);
        Ok(output)
    }

    /// Run `verb` and turn a non-zero exit into the error built by `fail`
    async fn run<F>(&self, verb: &str, args: &[&OsStr], fail: F) -> Result<(), DeviceError>
    where
        F: FnOnce(String) -> DeviceError,
    {
        let output = self.invoke(verb, args).await?;
        match failure_message(&output) {
            None => Ok(()),
            Some(message) => Err(fail(message)),
        }
    }
}

fn helper_args(speed: BurnSpeed, verb: &str, args: &[&OsStr]) -> Vec<OsString> {
    let mut argv: Vec<OsString> = vec!["--speed".into(), speed.to_string().into(), verb.into()];
    argv.extend(args.iter().map(|a| a.to_os_string()));
    argv
}

fn failure_message(output: &Output) -> Option<String> {
    if output.status.success() {
        return None;
    }
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    if stderr.is_empty() {
        Some(format!("helper exited with {}", output.status))
    } else {
        Some(stderr)
    }
}

fn parse_detected(stdout: &str) -> Result<Option<DeviceMode>, DeviceError> {
    let reply = stdout.trim();
    if reply.is_empty() || reply.eq_ignore_ascii_case(NO_DEVICE) {
        return Ok(None);
    }
    reply.parse().map(Some)
}

#[async_trait]
impl DeviceLink for HelperTransport {
    async fn detect_mode(&self) -> Result<Option<DeviceMode>, DeviceError> {
        let output = self.invoke(VERB_DETECT, &[]).await?;
        if let Some(message) = failure_message(&output) {
            return Err(DeviceError::Protocol(message));
        }
        parse_detected(&String::from_utf8_lossy(&output.stdout))
    }

    async fn boot_secondary_loader(
        &self,
        loader_blob: &Path,
        bootloader_image: &Path,
    ) -> Result<(), DeviceError> {
        self.run(
            VERB_BL2_BOOT,
            &[loader_blob.as_os_str(), bootloader_image.as_os_str()],
            DeviceError::Boot,
        )
        .await
    }

    async fn open_recovery(&self) -> Result<Box<dyn BurnDevice>, DeviceError> {
        Ok(Box::new(self.clone()))
    }
}

#[async_trait]
impl BurnDevice for HelperTransport {
    async fn run_command(&mut self, command: &str) -> Result<(), DeviceError> {
        self.run(VERB_BULKCMD, &[OsStr::new(command)], |message| {
            DeviceError::CommandFailed {
                command: command.to_string(),
                message,
            }
        })
        .await
    }

    async fn dump_partition(&mut self, partition: &str, path: &Path) -> Result<(), DeviceError> {
        self.run(
            VERB_DUMP,
            &[OsStr::new(partition), path.as_os_str()],
            |message| DeviceError::Transfer {
                partition: partition.to_string(),
                message,
            },
        )
        .await
    }

    async fn restore_partition(
        &mut self,
        partition: &str,
        path: &Path,
    ) -> Result<(), DeviceError> {
        self.run(
            VERB_RESTORE,
            &[OsStr::new(partition), path.as_os_str()],
            |message| DeviceError::Transfer {
                partition: partition.to_string(),
                message,
            },
        )
        .await
    }

    async fn apply_env_file(&mut self, path: &Path) -> Result<(), DeviceError> {
        self.run(VERB_SEND_ENV, &[path.as_os_str()], DeviceError::EnvApply)
            .await
    }

    async fn boot_kernel(
        &mut self,
        env_file: &Path,
        kernel_image: &Path,
        initrd_image: &Path,
    ) -> Result<(), DeviceError> {
        self.run(
            VERB_BOOT,
            &[
                env_file.as_os_str(),
                kernel_image.as_os_str(),
                initrd_image.as_os_str(),
            ],
            DeviceError::Boot,
        )
        .await
    }
}
