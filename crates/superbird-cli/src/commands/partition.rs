//! Full-device and single-partition dump and restore

use std::path::Path;

use anyhow::Result;
use dialoguer::Confirm;
use tokio::task::JoinHandle;
use tracing::debug;

use superbird_provision::{PartitionSetOrchestrator, ProgressEvent};

use crate::commands::Context;
use crate::output;

/// Dump every manifest partition into `dir`
pub async fn dump_device(ctx: &Context, dir: &Path) -> Result<()> {
    let mut device = ctx.recovery().await?;
    let orchestrator = ctx.orchestrator();
    let spinner = start_spinner(orchestrator.subscribe_progress(), ctx.json)?;

    let result = orchestrator.dump_device(device.as_mut(), dir).await;
    finish_spinner(orchestrator, spinner).await;

    output::print_dump_report(&result?, ctx.json);
    Ok(())
}

/// Restore every manifest partition from the dump files in `dir`
pub async fn restore_device(ctx: &Context, dir: &Path, dont_reset: bool, yes: bool) -> Result<()> {
    if !yes && !ctx.json {
        let prompt = format!(
            "Every partition on the device will be overwritten with the dumps in {}. Continue?",
            dir.display()
        );
        if !Confirm::new().with_prompt(prompt).interact()? {
            output::print_warning("Restore cancelled", ctx.json);
            return Ok(());
        }
    }

    let mut device = ctx.recovery().await?;
    let orchestrator = ctx.orchestrator();
    let spinner = start_spinner(orchestrator.subscribe_progress(), ctx.json)?;

    let result = orchestrator
        .restore_device(device.as_mut(), dir, dont_reset)
        .await;
    finish_spinner(orchestrator, spinner).await;

    output::print_restore_report(&result?, ctx.json);
    Ok(())
}

pub async fn dump_partition(ctx: &Context, name: &str, file: &Path) -> Result<()> {
    let mut device = ctx.recovery().await?;
    ctx.orchestrator()
        .dump_partition(device.as_mut(), name, file)
        .await?;
    output::print_success(
        &format!("Dumped partition {} to {}", name, file.display()),
        ctx.json,
    );
    Ok(())
}

pub async fn restore_partition(ctx: &Context, name: &str, file: &Path) -> Result<()> {
    let mut device = ctx.recovery().await?;
    ctx.orchestrator()
        .restore_partition(device.as_mut(), name, file)
        .await?;
    output::print_success(
        &format!("Restored partition {} from {}", name, file.display()),
        ctx.json,
    );
    Ok(())
}

fn start_spinner(
    rx: tokio::sync::broadcast::Receiver<ProgressEvent>,
    json: bool,
) -> Result<Option<JoinHandle<()>>> {
    if json {
        return Ok(None);
    }
    Ok(Some(output::spawn_progress(rx)?))
}

/// Close the progress channel and wait for the spinner to clear itself
async fn finish_spinner(orchestrator: PartitionSetOrchestrator, spinner: Option<JoinHandle<()>>) {
    drop(orchestrator);
    if let Some(handle) = spinner
        && let Err(e) = handle.await
    {
        debug!("Progress display ended abnormally: {}", e);
    }
}
