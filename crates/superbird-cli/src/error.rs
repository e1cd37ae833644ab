//! Error types for the superbird CLI

use superbird_provision::ProvisionError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
}

impl CliError {
    pub fn exit_code(&self) -> u8 {
        match self {
            CliError::DeviceNotFound(_) => 2,
            CliError::InvalidConfiguration(_) => 4,
        }
    }
}

/// Exit code for a workflow failure
///
/// 2 when no usable device is attached, 3 when restore pre-flight found
/// dump files missing, 4 for rejected input files, 5 for transport failures.
pub fn provision_exit_code(error: &ProvisionError) -> u8 {
    match error {
        ProvisionError::DeviceNotFound | ProvisionError::UnexpectedMode { .. } => 2,
        ProvisionError::MissingDumpFiles { .. } => 3,
        ProvisionError::EnvDecode { .. }
        | ProvisionError::EnvText { .. }
        | ProvisionError::EmptyEnvironment(_)
        | ProvisionError::EnvEncode(_) => 4,
        ProvisionError::RecoveryTransitionFailed { .. }
        | ProvisionError::DumpAborted { .. }
        | ProvisionError::RestoreAborted { .. }
        | ProvisionError::Device(_) => 5,
        ProvisionError::Io { .. } => 1,
    }
}

/// Exit code for any error reaching `main`
pub fn exit_code(error: &anyhow::Error) -> u8 {
    if let Some(cli) = error.downcast_ref::<CliError>() {
        return cli.exit_code();
    }
    match error.downcast_ref::<ProvisionError>() {
        Some(provision) => provision_exit_code(provision),
        None => 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use superbird_provision::DeviceError;

    #[test]
    fn missing_dump_files_exit_with_three() {
        let err = anyhow::Error::new(ProvisionError::MissingDumpFiles {
            dir: PathBuf::from("dumps"),
            missing: vec!["misc.dump".to_string()],
        });
        assert_eq!(exit_code(&err), 3);
    }

    #[test]
    fn transport_failures_exit_with_five() {
        let err = anyhow::Error::new(ProvisionError::Device(DeviceError::Disconnected));
        assert_eq!(exit_code(&err), 5);
    }

    #[test]
    fn context_does_not_hide_the_classification() {
        let err = anyhow::Error::new(CliError::DeviceNotFound("nothing attached".to_string()))
            .context("find-device");
        assert_eq!(exit_code(&err), 2);
    }

    #[test]
    fn invalid_configuration_exits_with_four() {
        let err = anyhow::Error::new(CliError::InvalidConfiguration(
            "Unsupported config schema version".to_string(),
        ));
        assert_eq!(exit_code(&err), 4);
    }

    #[test]
    fn unclassified_errors_exit_with_one() {
        assert_eq!(exit_code(&anyhow::anyhow!("boom")), 1);
    }
}
