//! Per-step results of full-device workflows

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Value written to the `firstboot` variable when a filesystem dump is absent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FirstBoot {
    /// `firstboot=1`: the device formats and provisions the partition on next boot
    RequestProvisioning,
    /// `firstboot=0`: the device keeps whatever the partition holds
    SuppressProvisioning,
}

impl FirstBoot {
    /// Indicator requested by a restore with or without `dont_reset`
    pub fn for_restore(dont_reset: bool) -> Self {
        if dont_reset {
            FirstBoot::SuppressProvisioning
        } else {
            FirstBoot::RequestProvisioning
        }
    }

    /// Value stored in the environment
    pub fn env_value(self) -> &'static str {
        match self {
            FirstBoot::RequestProvisioning => "1",
            FirstBoot::SuppressProvisioning => "0",
        }
    }
}

/// Outcome of one partition step in a restore
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RestoreOutcome {
    /// Partition written from its dump file
    Succeeded,
    /// Dump file absent; the first-boot indicator was set instead
    SkippedDegraded {
        /// Indicator value that was persisted
        first_boot: FirstBoot,
    },
    /// Step failed but the run continued
    FailedRecoverable {
        /// What went wrong
        error: String,
    },
    /// Step failed and the run stopped here
    FailedFatal {
        /// What went wrong
        error: String,
    },
}

impl RestoreOutcome {
    /// Whether the step left the partition in its intended state
    pub fn is_ok(&self) -> bool {
        matches!(
            self,
            RestoreOutcome::Succeeded | RestoreOutcome::SkippedDegraded { .. }
        )
    }
}

/// One recorded restore step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionStep {
    /// Partition name
    pub partition: String,
    /// Result of the step
    pub outcome: RestoreOutcome,
}

/// Recommendation surfaced once at the end of a restore
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Advisory {
    /// A degraded path could not set the first-boot indicator
    ManualFactoryResetRecommended {
        /// Partitions whose degraded path failed
        partitions: Vec<String>,
    },
}

impl std::fmt::Display for Advisory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Advisory::ManualFactoryResetRecommended { partitions } => write!(
                f,
                "Could not set the first-boot indicator for {}. A factory reset is recommended: unplug the device, then replug it while holding preset 2 and back until the logo appears.",
                partitions.join(", ")
            ),
        }
    }
}

/// Where the environment applied by a restore came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvSource {
    /// `env.txt` was present
    Text,
    /// `env.txt` was derived from `env.dump`
    DerivedFromDump,
}

/// Result of normalizing one legacy dump file name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RenameOutcome {
    /// Legacy file renamed to its current name
    Renamed,
    /// File already carries its current name
    AlreadyCorrect,
    /// Neither the legacy nor the current name exists
    Absent,
    /// Rename was attempted and failed
    Failed {
        /// Error reported by the file system
        error: String,
    },
}

/// Rename outcome for one legacy name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegacyRename {
    /// Name written by older releases
    pub legacy: String,
    /// Current name
    pub current: String,
    /// What happened
    pub outcome: RenameOutcome,
}

/// Full report of a restore run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestoreReport {
    /// Input directory
    pub input_dir: PathBuf,
    /// Whether the run was asked to suppress provisioning
    pub dont_reset: bool,
    /// Legacy-name normalization results
    pub renames: Vec<LegacyRename>,
    /// Environment input used
    pub env_source: Option<EnvSource>,
    /// Partition steps in the order they ran
    pub steps: Vec<PartitionStep>,
    /// Recommendations for the operator
    pub advisories: Vec<Advisory>,
}

impl RestoreReport {
    pub(crate) fn new(input_dir: PathBuf, dont_reset: bool) -> Self {
        Self {
            input_dir,
            dont_reset,
            renames: Vec::new(),
            env_source: None,
            steps: Vec::new(),
            advisories: Vec::new(),
        }
    }

    pub(crate) fn record(&mut self, partition: &str, outcome: RestoreOutcome) {
        self.steps.push(PartitionStep {
            partition: partition.to_string(),
            outcome,
        });
    }

    /// Record that a degraded path failed; all such partitions share one advisory
    pub(crate) fn advise_factory_reset(&mut self, partition: &str) {
        for advisory in &mut self.advisories {
            if let Advisory::ManualFactoryResetRecommended { partitions } = advisory {
                partitions.push(partition.to_string());
                return;
            }
        }
        self.advisories.push(Advisory::ManualFactoryResetRecommended {
            partitions: vec![partition.to_string()],
        });
    }

    /// Outcome recorded for a partition, if the step ran
    pub fn outcome(&self, partition: &str) -> Option<&RestoreOutcome> {
        self.steps
            .iter()
            .find(|s| s.partition == partition)
            .map(|s| &s.outcome)
    }

    /// Whether every step reached its intended state
    pub fn is_clean(&self) -> bool {
        self.advisories.is_empty() && self.steps.iter().all(|s| s.outcome.is_ok())
    }
}

/// One file written by a full-device dump
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DumpedFile {
    /// Partition name
    pub partition: String,
    /// File written
    pub path: PathBuf,
}

/// Report of a completed full-device dump
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DumpReport {
    /// Output directory
    pub output_dir: PathBuf,
    /// Partition files in dump order
    pub files: Vec<DumpedFile>,
    /// Text form of the environment derived right after its dump
    pub env_text: PathBuf,
    /// Number of variables found in the environment
    pub env_entries: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_boot_follows_dont_reset() {
        assert_eq!(FirstBoot::for_restore(false), FirstBoot::RequestProvisioning);
        assert_eq!(FirstBoot::for_restore(true), FirstBoot::SuppressProvisioning);
        assert_eq!(FirstBoot::RequestProvisioning.env_value(), "1");
        assert_eq!(FirstBoot::SuppressProvisioning.env_value(), "0");
    }

    #[test]
    fn report_is_clean_only_without_failures_or_advisories() {
        let mut report = RestoreReport::new(PathBuf::from("dump"), false);
        report.record("fip_a", RestoreOutcome::Succeeded);
        report.record(
            "data",
            RestoreOutcome::SkippedDegraded {
                first_boot: FirstBoot::RequestProvisioning,
            },
        );
        assert!(report.is_clean());

        report.record(
            "bootloader",
            RestoreOutcome::FailedRecoverable {
                error: "stall".to_string(),
            },
        );
        assert!(!report.is_clean());
        assert_eq!(report.outcome("fip_a"), Some(&RestoreOutcome::Succeeded));
        assert!(report.outcome("misc").is_none());
    }

    #[test]
    fn factory_reset_advisory_is_surfaced_once() {
        let mut report = RestoreReport::new(PathBuf::from("dump"), false);
        report.advise_factory_reset("data");
        report.advise_factory_reset("settings");
        assert_eq!(
            report.advisories,
            vec![Advisory::ManualFactoryResetRecommended {
                partitions: vec!["data".to_string(), "settings".to_string()],
            }]
        );
        assert!(report.advisories.iter().all(|a| a.to_string().contains("factory reset")));
    }

    #[test]
    fn outcome_serializes_with_status_tag() -> Result<(), serde_json::Error> {
        let json = serde_json::to_value(RestoreOutcome::SkippedDegraded {
            first_boot: FirstBoot::RequestProvisioning,
        })?;
        assert_eq!(json["status"], "skipped_degraded");
        assert_eq!(json["first_boot"], "request_provisioning");
        Ok(())
    }
}
