//! Output formatting for CLI responses

use std::time::Duration;

use anyhow::Error;
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use serde_json::json;
use superbird_provision::{
    DeviceMode, DumpReport, EnvironmentMap, ProgressEvent, ProvisionError, RenameOutcome,
    RestoreOutcome, RestoreReport, ShellSummary, StepPhase,
};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// Print error in JSON format
pub fn print_error_json(error: &Error) {
    let mut error_json = json!({
        "success": false,
        "error": {
            "message": error.to_string(),
            "type": error_type_name(error)
        }
    });
    // A restore that aborted mid-way still carries the steps that ran
    if let Some(ProvisionError::RestoreAborted { report, .. }) =
        error.downcast_ref::<ProvisionError>()
    {
        error_json["report"] = json!(report);
    }
    print_json(&error_json);
}

/// Print error in human-readable format
pub fn print_error_human(error: &Error) {
    eprintln!("{} {}", "Error:".red().bold(), error);

    let mut source = error.source();
    while let Some(err) = source {
        eprintln!("  {} {}", "Caused by:".yellow(), err);
        source = err.source();
    }

    match error.downcast_ref::<ProvisionError>() {
        Some(ProvisionError::RestoreAborted { report, .. }) => {
            eprintln!();
            print_restore_steps(report);
            eprintln!(
                "{}",
                "The device is in an inconsistent state; re-run the restore, possibly with --slow-burn"
                    .yellow()
            );
        }
        Some(ProvisionError::DumpAborted { completed, .. }) if !completed.is_empty() => {
            eprintln!(
                "  {} {}",
                "Already dumped:".yellow(),
                completed.join(", ")
            );
        }
        _ => {}
    }
}

/// Print success message
pub fn print_success(message: &str, json: bool) {
    if json {
        print_json(&json!({
            "success": true,
            "message": message
        }));
    } else {
        println!("{} {}", "✓".green(), message);
    }
}

/// Print warning message
pub fn print_warning(message: &str, json: bool) {
    if json {
        print_json(&json!({
            "success": true,
            "warning": message
        }));
    } else {
        println!("{} {}", "⚠".yellow(), message);
    }
}

pub fn print_device_mode(mode: Option<DeviceMode>, json: bool) {
    if json {
        print_json(&json!({
            "success": true,
            "found": mode.is_some(),
            "mode": mode
        }));
        return;
    }
    match mode {
        Some(mode) => {
            println!("{} Found device booted in {} mode", "●".green(), mode.to_string().bold());
            match mode {
                DeviceMode::Normal => println!(
                    "  {}",
                    "Replug it while holding buttons 1 and 4 to reach USB mode".dimmed()
                ),
                DeviceMode::Usb => println!(
                    "  {}",
                    "Run `superbird burn-mode` to enter USB burn mode".dimmed()
                ),
                DeviceMode::UsbRecovery => {}
            }
        }
        None => println!("{}", "No device found".yellow()),
    }
}

pub fn print_dump_report(report: &DumpReport, json: bool) {
    if json {
        print_payload("dump", report);
        return;
    }
    println!(
        "{} Dumped {} partitions to {}",
        "✓".green(),
        report.files.len(),
        report.output_dir.display().to_string().bold()
    );
    for file in &report.files {
        println!("  {:<12} {}", file.partition, file.path.display().to_string().dimmed());
    }
    println!(
        "  {:<12} {} ({} variables)",
        "env text",
        report.env_text.display().to_string().dimmed(),
        report.env_entries
    );
}

pub fn print_restore_report(report: &RestoreReport, json: bool) {
    if json {
        print_payload("restore", report);
        return;
    }

    for rename in &report.renames {
        match &rename.outcome {
            RenameOutcome::Renamed => {
                println!("  Renamed {} to {}", rename.legacy, rename.current);
            }
            RenameOutcome::Failed { error } => println!(
                "  {} Could not rename {} to {}: {}",
                "⚠".yellow(),
                rename.legacy,
                rename.current,
                error
            ),
            RenameOutcome::AlreadyCorrect | RenameOutcome::Absent => {}
        }
    }

    print_restore_steps(report);

    for step in &report.steps {
        if let RestoreOutcome::FailedRecoverable { .. } = step.outcome {
            println!(
                "{} Flashing {} failed. If you encounter any issues, run the restore again.",
                "⚠".yellow(),
                step.partition
            );
        }
    }

    if report.advisories.is_empty() {
        println!(
            "{} Restored device from {}",
            "✓".green(),
            report.input_dir.display().to_string().bold()
        );
    } else {
        println!();
        for advisory in &report.advisories {
            println!("{} {}", "⚠".yellow(), advisory.to_string().yellow());
        }
    }
}

fn print_restore_steps(report: &RestoreReport) {
    for step in &report.steps {
        let status = match &step.outcome {
            RestoreOutcome::Succeeded => "written".green(),
            RestoreOutcome::SkippedDegraded { first_boot } => {
                format!("skipped, firstboot={}", first_boot.env_value()).yellow()
            }
            RestoreOutcome::FailedRecoverable { error } => {
                format!("failed (recoverable): {error}").yellow()
            }
            RestoreOutcome::FailedFatal { error } => format!("failed: {error}").red(),
        };
        println!("  {:<12} {}", step.partition, status);
    }
}

pub fn print_env(map: &EnvironmentMap, destination: &std::path::Path, json: bool) {
    if json {
        let entries: serde_json::Map<String, serde_json::Value> = map
            .iter()
            .map(|(k, v)| (k.to_string(), json!(v)))
            .collect();
        print_json(&json!({
            "success": true,
            "path": destination,
            "env": entries
        }));
    } else {
        println!(
            "{} Wrote {} variables to {}",
            "✓".green(),
            map.len(),
            destination.display().to_string().bold()
        );
    }
}

pub fn print_shell_summary(summary: &ShellSummary, json: bool) {
    if json {
        print_payload("shell", summary);
    } else if summary.failed > 0 {
        println!(
            "{} Sent {} commands, {} failed",
            "⚠".yellow(),
            summary.sent,
            summary.failed
        );
    } else {
        println!("{} Sent {} commands", "✓".green(), summary.sent);
    }
}

pub fn print_elapsed(elapsed: Duration) {
    eprintln!("{}", format!("Done, took {:.1}s", elapsed.as_secs_f64()).dimmed());
}

/// Spinner following a workflow's progress events until the channel closes
pub fn spawn_progress(mut rx: broadcast::Receiver<ProgressEvent>) -> anyhow::Result<JoinHandle<()>> {
    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::default_spinner().template("{spinner:.green} [{pos}/{len}] {msg}")?);
    pb.enable_steady_tick(Duration::from_millis(100));

    Ok(tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    pb.set_length(u64::try_from(event.total).unwrap_or(u64::MAX));
                    pb.set_position(u64::try_from(event.index).unwrap_or(u64::MAX));
                    match event.phase {
                        StepPhase::Started => pb.set_message(format!("{}...", event.step)),
                        StepPhase::Finished => pb.set_message(format!("{} done", event.step)),
                        StepPhase::Skipped => {
                            pb.println(format!("{} {} skipped", "⚠".yellow(), event.step));
                        }
                        StepPhase::Failed => {
                            pb.println(format!("{} {} failed", "✗".red(), event.step));
                        }
                    }
                }
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
        pb.finish_and_clear();
    }))
}

fn print_payload<T: Serialize>(key: &str, payload: &T) {
    let mut output = json!({ "success": true });
    output[key] = json!(payload);
    print_json(&output);
}

fn print_json(value: &serde_json::Value) {
    match serde_json::to_string_pretty(value) {
        Ok(s) => println!("{}", s),
        Err(e) => eprintln!("Failed to format output as JSON: {}", e),
    }
}

/// Get error type name for JSON output
fn error_type_name(error: &Error) -> String {
    format!("{:?}", error)
        .split(|c: char| c == '(' || c == ' ' || c == '{')
        .next()
        .unwrap_or("Unknown")
        .to_string()
}
