//! Full-device dump and restore against a recording device

use superbird_provision::env::{encode_as_text, read_text_file};
use superbird_provision::partition::{self, MANIFEST};
use superbird_provision::progress::{StepPhase, Workflow};
use superbird_provision::{
    Advisory, EnvSource, FirstBoot, PartitionSetOrchestrator, ProvisionError, RenameOutcome,
    RestoreOutcome,
};
use superbird_test_helpers::prelude::*;
use tracing_test::traced_test;

fn orchestrator() -> PartitionSetOrchestrator {
    PartitionSetOrchestrator::new(TEST_REGION_SIZE)
}

fn restore_order() -> Vec<String> {
    partition::restore_manifest()
        .iter()
        .map(|p| p.name.to_string())
        .collect()
}

mod dump {
    use super::*;

    #[tokio::test]
    async fn writes_every_partition_in_manifest_order() -> TestResult {
        let root = tempfile::tempdir()?;
        let out = root.path().join("dump");
        let mut device =
            RecordingDevice::new().with_dump_contents("env", env_region(&sample_env()));

        let report = orchestrator().dump_device(&mut device, &out).await?;

        let expected: Vec<String> = MANIFEST.iter().map(|p| p.name.to_string()).collect();
        assert_eq!(device.log().dumped(), expected);
        assert_eq!(report.files.len(), MANIFEST.len());
        assert_eq!(report.env_entries, sample_env().len());
        for part in MANIFEST.iter() {
            assert!(out.join(part.dump_file).is_file(), "{} missing", part.dump_file);
        }
        assert_eq!(
            tokio::fs::read_to_string(out.join("env.txt")).await?,
            encode_as_text(&sample_env())
        );
        Ok(())
    }

    #[tokio::test]
    async fn stops_at_first_failure_and_keeps_partial_files() -> TestResult {
        let root = tempfile::tempdir()?;
        let out = root.path().join("dump");
        let mut device = RecordingDevice::new()
            .with_dump_contents("env", env_region(&sample_env()))
            .failing_dump("fip_a");

        let err = orchestrator().dump_device(&mut device, &out).await;

        match err {
            Err(ProvisionError::DumpAborted {
                partition,
                completed,
                ..
            }) => {
                assert_eq!(partition, "fip_a");
                assert_eq!(completed, vec!["bootloader".to_string(), "env".to_string()]);
            }
            other => return Err(format!("expected DumpAborted, got {other:?}").into()),
        }
        assert_eq!(device.log().dumped(), vec!["bootloader", "env", "fip_a"]);
        assert!(out.join("bootloader.dump").is_file());
        assert!(out.join("env.dump").is_file());
        assert!(out.join("env.txt").is_file());
        assert!(!out.join("fip_a.dump").exists());
        assert!(!out.join("fip_b.dump").exists());
        Ok(())
    }

    #[tokio::test]
    async fn corrupt_environment_aborts_the_dump() -> TestResult {
        let root = tempfile::tempdir()?;
        let mut device = RecordingDevice::new().with_dump_contents("env", vec![0xa5; 64]);

        let err = orchestrator().dump_device(&mut device, root.path()).await;

        match err {
            Err(ProvisionError::DumpAborted {
                partition,
                completed,
                source,
            }) => {
                assert_eq!(partition, "env");
                assert_eq!(completed, vec!["bootloader".to_string()]);
                assert!(matches!(*source, ProvisionError::EnvDecode { .. }));
            }
            other => return Err(format!("expected DumpAborted, got {other:?}").into()),
        }
        assert_eq!(device.log().dumped(), vec!["bootloader", "env"]);
        Ok(())
    }

    #[tokio::test]
    async fn existing_directory_is_reused() -> TestResult {
        let root = tempfile::tempdir()?;
        tokio::fs::write(root.path().join("notes.txt"), b"keep me").await?;
        let mut device =
            RecordingDevice::new().with_dump_contents("env", env_region(&sample_env()));

        orchestrator().dump_device(&mut device, root.path()).await?;
        assert!(root.path().join("notes.txt").is_file());
        Ok(())
    }

    #[tokio::test]
    async fn aborted_dump_leaves_no_files_from_an_earlier_run() -> TestResult {
        let dump = DumpDir::complete()?
            .with_file("notes.txt", b"keep me")?
            .with_file("system_a.dump", b"legacy image")?;
        let mut device = RecordingDevice::new()
            .with_dump_contents("env", env_region(&sample_env()))
            .failing_dump("fip_a");

        let err = orchestrator().dump_device(&mut device, dump.path()).await;
        assert!(matches!(err, Err(ProvisionError::DumpAborted { .. })));

        for part in MANIFEST.iter().skip(2) {
            assert!(!dump.contains(part.dump_file), "{} survived", part.dump_file);
        }
        assert!(!dump.contains("system_a.dump"));
        assert!(dump.contains("notes.txt"));

        // The partial directory must not pass as a complete dump
        let mut target = RecordingDevice::new();
        let restored = orchestrator()
            .restore_device(&mut target, dump.path(), false)
            .await;
        match restored {
            Err(ProvisionError::MissingDumpFiles { missing, .. }) => {
                assert!(missing.contains(&"fip_b.dump".to_string()));
                assert!(missing.contains(&"system_a.ext2".to_string()));
            }
            other => return Err(format!("expected MissingDumpFiles, got {other:?}").into()),
        }
        assert!(target.log().is_empty());
        Ok(())
    }
}

mod restore {
    use super::*;

    #[tokio::test]
    async fn complete_dump_restores_cleanly_in_order() -> TestResult {
        let dump = DumpDir::complete()?;
        let mut device = RecordingDevice::new();

        let report = orchestrator()
            .restore_device(&mut device, dump.path(), false)
            .await?;

        let log = device.log();
        assert_eq!(log.restored(), restore_order());
        assert!(report.is_clean());
        assert_eq!(report.env_source, Some(EnvSource::Text));
        assert_eq!(report.outcome("bootloader"), Some(&RestoreOutcome::Succeeded));

        let apply = must_some(
            log.position(|c| matches!(c, DeviceCall::ApplyEnv(_))),
            "environment applied",
        );
        let save = must_some(
            log.position(|c| *c == DeviceCall::Command("env save".to_string())),
            "environment saved",
        );
        let first_write = must_some(
            log.position(|c| matches!(c, DeviceCall::Restore { .. })),
            "partition written",
        );
        assert!(apply < save && save < first_write);
        Ok(())
    }

    #[tokio::test]
    async fn bootloader_is_written_after_every_other_partition() -> TestResult {
        let dump = DumpDir::complete()?;
        let mut device = RecordingDevice::new();

        orchestrator()
            .restore_device(&mut device, dump.path(), false)
            .await?;

        let restored = device.log().restored();
        assert_eq!(restored.last().map(String::as_str), Some("bootloader"));
        assert_eq!(restored.iter().filter(|p| *p == "bootloader").count(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn missing_required_file_aborts_before_any_device_call() -> TestResult {
        let dump = DumpDir::complete()?.without("misc.dump")?;
        let mut device = RecordingDevice::new();

        let err = orchestrator()
            .restore_device(&mut device, dump.path(), false)
            .await;

        match err {
            Err(ProvisionError::MissingDumpFiles { missing, .. }) => {
                assert_eq!(missing, vec!["misc.dump".to_string()]);
            }
            other => return Err(format!("expected MissingDumpFiles, got {other:?}").into()),
        }
        assert!(device.log().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn preflight_names_all_missing_files() -> TestResult {
        let dump = DumpDir::complete()?
            .without("boot_b.dump")?
            .without("system_a.ext2")?
            .without("env.txt")?
            .without("env.dump")?;
        let mut device = RecordingDevice::new();

        let err = orchestrator()
            .restore_device(&mut device, dump.path(), false)
            .await;

        let Err(err) = err else {
            return Err("restore should have failed".into());
        };
        assert!(err.is_preflight());
        let msg = err.to_string();
        for file in ["boot_b.dump", "system_a.ext2", "env.dump"] {
            assert!(msg.contains(file), "{file} not named in: {msg}");
        }
        assert!(device.log().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn absent_data_and_settings_request_provisioning() -> TestResult {
        let dump = DumpDir::complete()?
            .without("data.ext4")?
            .without("settings.ext4")?;
        let mut device = RecordingDevice::new();

        let report = orchestrator()
            .restore_device(&mut device, dump.path(), false)
            .await?;

        let skipped = RestoreOutcome::SkippedDegraded {
            first_boot: FirstBoot::RequestProvisioning,
        };
        assert_eq!(report.outcome("data"), Some(&skipped));
        assert_eq!(report.outcome("settings"), Some(&skipped));
        assert!(report.advisories.is_empty());

        let restored = device.log().restored();
        assert!(!restored.contains(&"data".to_string()));
        assert!(!restored.contains(&"settings".to_string()));

        let commands = device.log().commands();
        assert_eq!(
            commands,
            vec![
                "env save",
                "setenv firstboot 1",
                "saveenv",
                "setenv firstboot 1",
                "saveenv"
            ]
        );
        Ok(())
    }

    #[tokio::test]
    async fn dont_reset_suppresses_provisioning() -> TestResult {
        let dump = DumpDir::complete()?.without("data.ext4")?;
        let mut device = RecordingDevice::new();

        let report = orchestrator()
            .restore_device(&mut device, dump.path(), true)
            .await?;

        assert_eq!(
            report.outcome("data"),
            Some(&RestoreOutcome::SkippedDegraded {
                first_boot: FirstBoot::SuppressProvisioning
            })
        );
        assert_eq!(report.outcome("settings"), Some(&RestoreOutcome::Succeeded));
        assert!(device.log().commands().contains(&"setenv firstboot 0".to_string()));
        assert!(!device.log().commands().contains(&"setenv firstboot 1".to_string()));
        Ok(())
    }

    #[tokio::test]
    async fn failed_indicator_becomes_one_advisory() -> TestResult {
        let dump = DumpDir::complete()?
            .without("data.ext4")?
            .without("settings.ext4")?;
        let mut device = RecordingDevice::new().failing_command("saveenv");

        let report = orchestrator()
            .restore_device(&mut device, dump.path(), false)
            .await?;

        assert!(matches!(
            report.outcome("data"),
            Some(RestoreOutcome::FailedRecoverable { .. })
        ));
        assert!(matches!(
            report.outcome("settings"),
            Some(RestoreOutcome::FailedRecoverable { .. })
        ));
        assert_eq!(
            report.advisories,
            vec![Advisory::ManualFactoryResetRecommended {
                partitions: vec!["data".to_string(), "settings".to_string()],
            }]
        );
        assert_eq!(
            device.log().restored().last().map(String::as_str),
            Some("bootloader")
        );
        Ok(())
    }

    #[tokio::test]
    async fn bootloader_failure_is_recoverable() -> TestResult {
        let dump = DumpDir::complete()?;
        let mut device = RecordingDevice::new().failing_restore("bootloader");

        let report = orchestrator()
            .restore_device(&mut device, dump.path(), false)
            .await?;

        assert!(matches!(
            report.outcome("bootloader"),
            Some(RestoreOutcome::FailedRecoverable { .. })
        ));
        assert!(report.advisories.is_empty());
        assert!(!report.is_clean());
        Ok(())
    }

    #[tokio::test]
    async fn missing_bootloader_dump_is_recoverable() -> TestResult {
        let dump = DumpDir::complete()?.without("bootloader.dump")?;
        let mut device = RecordingDevice::new();

        let report = orchestrator()
            .restore_device(&mut device, dump.path(), false)
            .await?;

        assert!(!device.log().restored().contains(&"bootloader".to_string()));
        assert!(matches!(
            report.outcome("bootloader"),
            Some(RestoreOutcome::FailedRecoverable { .. })
        ));
        assert!(report.advisories.is_empty());
        assert_eq!(report.outcome("system_b"), Some(&RestoreOutcome::Succeeded));
        Ok(())
    }

    #[tokio::test]
    async fn only_required_files_present_yields_no_advisory() -> TestResult {
        let dump = DumpDir::complete()?
            .without("data.ext4")?
            .without("settings.ext4")?
            .without("bootloader.dump")?;
        let mut device = RecordingDevice::new();

        let report = orchestrator()
            .restore_device(&mut device, dump.path(), false)
            .await?;

        assert!(report.advisories.is_empty());
        assert!(matches!(
            report.outcome("bootloader"),
            Some(RestoreOutcome::FailedRecoverable { .. })
        ));
        assert!(matches!(
            report.outcome("data"),
            Some(RestoreOutcome::SkippedDegraded { .. })
        ));
        let restored = device.log().restored();
        for absent in ["data", "settings", "bootloader"] {
            assert!(!restored.contains(&absent.to_string()), "{absent} was written");
        }
        Ok(())
    }

    #[tokio::test]
    async fn system_write_failure_is_fatal() -> TestResult {
        let dump = DumpDir::complete()?;
        let mut device = RecordingDevice::new().failing_restore("system_b");

        let err = orchestrator()
            .restore_device(&mut device, dump.path(), false)
            .await;

        match err {
            Err(ProvisionError::RestoreAborted {
                partition, report, ..
            }) => {
                assert_eq!(partition, "system_b");
                assert!(matches!(
                    report.steps.last().map(|s| &s.outcome),
                    Some(RestoreOutcome::FailedFatal { .. })
                ));
                assert_eq!(report.outcome("system_a"), Some(&RestoreOutcome::Succeeded));
            }
            other => return Err(format!("expected RestoreAborted, got {other:?}").into()),
        }
        let restored = device.log().restored();
        assert_eq!(restored.last().map(String::as_str), Some("system_b"));
        assert!(!restored.contains(&"bootloader".to_string()));
        assert!(!restored.contains(&"data".to_string()));
        Ok(())
    }

    #[tokio::test]
    async fn environment_apply_failure_prevents_partition_writes() -> TestResult {
        let dump = DumpDir::complete()?;
        let mut device = RecordingDevice::new().failing_env_apply();

        let err = orchestrator()
            .restore_device(&mut device, dump.path(), false)
            .await;

        assert!(matches!(
            err,
            Err(ProvisionError::RestoreAborted { ref partition, .. }) if partition == "env"
        ));
        assert!(device.log().restored().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn env_text_is_derived_from_binary_dump() -> TestResult {
        let dump = DumpDir::complete()?.without("env.txt")?;
        let mut device = RecordingDevice::new();

        let report = orchestrator()
            .restore_device(&mut device, dump.path(), false)
            .await?;

        assert_eq!(report.env_source, Some(EnvSource::DerivedFromDump));
        assert_eq!(read_text_file(&dump.path().join("env.txt")).await?, sample_env());
        assert_eq!(
            device.log().calls().first(),
            Some(&DeviceCall::ApplyEnv(dump.path().join("env.txt")))
        );
        Ok(())
    }

    #[tokio::test]
    async fn corrupt_binary_env_aborts_before_any_device_call() -> TestResult {
        let dump = DumpDir::complete()?
            .without("env.txt")?
            .with_file("env.dump", vec![0u8; 512])?;
        let mut device = RecordingDevice::new();

        let err = orchestrator()
            .restore_device(&mut device, dump.path(), false)
            .await;

        assert!(matches!(err, Err(ProvisionError::EnvDecode { .. })));
        assert!(device.log().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn legacy_names_are_normalized_first() -> TestResult {
        let dump = DumpDir::complete()?
            .without("system_a.ext2")?
            .with_file("system_a.dump", b"system_a image")?;
        let mut device = RecordingDevice::new();

        let report = orchestrator()
            .restore_device(&mut device, dump.path(), false)
            .await?;

        let rename = must_some(
            report.renames.iter().find(|r| r.legacy == "system_a.dump"),
            "rename recorded",
        );
        assert_eq!(rename.outcome, RenameOutcome::Renamed);
        assert!(dump.contains("system_a.ext2"));
        assert!(device.log().restored().contains(&"system_a".to_string()));
        Ok(())
    }

    #[tokio::test]
    #[traced_test]
    async fn degraded_path_is_logged() -> TestResult {
        let dump = DumpDir::complete()?.without("settings.ext4")?;
        let mut device = RecordingDevice::new();

        orchestrator()
            .restore_device(&mut device, dump.path(), false)
            .await?;

        assert!(logs_contain("Did not find"));
        assert!(logs_contain("settings.ext4"));
        Ok(())
    }

    #[tokio::test]
    async fn progress_events_cover_every_step() -> TestResult {
        let dump = DumpDir::complete()?.without("data.ext4")?;
        let orchestrator = orchestrator();
        let mut events = orchestrator.subscribe_progress();
        let mut device = RecordingDevice::new();

        orchestrator
            .restore_device(&mut device, dump.path(), false)
            .await?;

        let mut seen = Vec::new();
        while let Ok(event) = events.try_recv() {
            assert_eq!(event.workflow, Workflow::RestoreDevice);
            seen.push((event.step, event.phase));
        }
        assert_eq!(seen.first(), Some(&("env".to_string(), StepPhase::Started)));
        assert_eq!(
            seen.last(),
            Some(&("bootloader".to_string(), StepPhase::Finished))
        );
        assert!(seen.contains(&("data".to_string(), StepPhase::Skipped)));
        Ok(())
    }
}

mod single_partition {
    use super::*;

    #[tokio::test]
    async fn pass_through_to_primitives() -> TestResult {
        let dir = tempfile::tempdir()?;
        let file = dir.path().join("custom.bin");
        let mut device = RecordingDevice::new();

        orchestrator()
            .dump_partition(&mut device, "vendor_x", &file)
            .await?;
        orchestrator()
            .restore_partition(&mut device, "vendor_x", &file)
            .await?;

        assert_eq!(device.log().dumped(), vec!["vendor_x"]);
        assert_eq!(device.log().restored(), vec!["vendor_x"]);
        Ok(())
    }

    #[tokio::test]
    async fn restore_of_missing_file_never_reaches_the_device() -> TestResult {
        let dir = tempfile::tempdir()?;
        let mut device = RecordingDevice::new();

        let err = orchestrator()
            .restore_partition(&mut device, "logo", &dir.path().join("nope.dump"))
            .await;

        assert!(matches!(err, Err(ProvisionError::Io { .. })));
        assert!(device.log().is_empty());
        Ok(())
    }
}
