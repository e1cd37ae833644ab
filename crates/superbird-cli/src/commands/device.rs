//! Device mode and console commands

use anyhow::Result;
use superbird_provision::{RecoveryEntry, Slot, boot_debug_kernel, run_shell};
use tokio::io::BufReader;
use tracing::warn;

use crate::commands::Context;
use crate::error::CliError;
use crate::output;

/// Report the attached device and its mode
pub async fn find_device(ctx: &Context) -> Result<()> {
    let mode = ctx.modes().find_device().await?;
    output::print_device_mode(mode, ctx.json);
    match mode {
        Some(_) => Ok(()),
        None => Err(CliError::DeviceNotFound(
            "no superbird attached in normal, USB or USB burn mode".to_string(),
        )
        .into()),
    }
}

/// Move the device from USB mode into USB burn mode
pub async fn burn_mode(ctx: &Context) -> Result<()> {
    match ctx.modes().enter_recovery().await? {
        RecoveryEntry::AlreadyInRecovery => {
            output::print_success("Device already in USB burn mode", ctx.json)
        }
        RecoveryEntry::Entered => output::print_success("Device is now in USB burn mode", ctx.json),
    }
    Ok(())
}

/// Resume a boot paused in USB burn mode
pub async fn continue_boot(ctx: &Context) -> Result<()> {
    ctx.modes().continue_boot().await?;
    output::print_success("Boot continued", ctx.json);
    Ok(())
}

/// Send one bootloader console command
pub async fn bulkcmd(ctx: &Context, command: &str) -> Result<()> {
    let mut device = ctx.recovery().await?;
    device.run_command(command).await?;
    output::print_success(&format!("Sent: {command}"), ctx.json);
    Ok(())
}

/// Read console commands from stdin until end of input or Ctrl+C
pub async fn shell(ctx: &Context) -> Result<()> {
    let mut device = ctx.recovery().await?;
    if !ctx.json {
        println!("Entering bootloader command shell; Ctrl+C or Ctrl+D to exit");
    }

    let interrupted = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Cannot listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };
    let summary = run_shell(
        device.as_mut(),
        BufReader::new(tokio::io::stdin()),
        tokio::io::stdout(),
        interrupted,
    )
    .await;

    output::print_shell_summary(&summary, ctx.json);
    Ok(())
}

/// Boot the bundled debug kernel once without touching the persisted environment
pub async fn boot_debug_kernel_once(ctx: &Context, slot: &str) -> Result<()> {
    let slot = Slot::parse_lenient(slot);
    let images = ctx.config.images();
    let mut device = ctx.recovery().await?;
    boot_debug_kernel(device.as_mut(), &images, slot).await?;
    output::print_success(&format!("Booted debug kernel on slot {slot}"), ctx.json);
    Ok(())
}
