//! U-Boot environment commands

use std::path::Path;

use anyhow::Result;
use dialoguer::Confirm;
use superbird_provision::convert_env_dump;

use crate::commands::{Context, EnvCommands};
use crate::output;

/// Execute env command
pub async fn execute(cmd: &EnvCommands, ctx: &Context) -> Result<()> {
    match cmd {
        EnvCommands::Get { output } => get(ctx, output).await,
        EnvCommands::Merge { file } => merge(ctx, file).await,
        EnvCommands::Replace { file, yes } => replace(ctx, file, *yes).await,
        EnvCommands::RestoreStock { yes } => restore_stock(ctx, *yes).await,
        EnvCommands::Convert { dump, output } => convert(ctx, dump, output).await,
    }
}

async fn get(ctx: &Context, output_path: &Path) -> Result<()> {
    let mut device = ctx.recovery().await?;
    let map = ctx
        .env_workflow()
        .get_env(device.as_mut(), output_path)
        .await?;
    output::print_env(&map, output_path, ctx.json);
    Ok(())
}

async fn merge(ctx: &Context, file: &Path) -> Result<()> {
    let mut device = ctx.recovery().await?;
    ctx.env_workflow().merge_env(device.as_mut(), file).await?;
    output::print_success(
        &format!("Imported {} into the device environment", file.display()),
        ctx.json,
    );
    Ok(())
}

async fn replace(ctx: &Context, file: &Path, yes: bool) -> Result<()> {
    if !confirm_wipe(ctx, yes)? {
        return Ok(());
    }
    let mut device = ctx.recovery().await?;
    ctx.env_workflow().replace_env(device.as_mut(), file).await?;
    output::print_success(
        &format!("Replaced the device environment with {}", file.display()),
        ctx.json,
    );
    Ok(())
}

async fn restore_stock(ctx: &Context, yes: bool) -> Result<()> {
    if !confirm_wipe(ctx, yes)? {
        return Ok(());
    }
    let stock = ctx.config.images().stock_env();
    let mut device = ctx.recovery().await?;
    ctx.env_workflow()
        .restore_stock_env(device.as_mut(), &stock)
        .await?;
    output::print_success("Restored the stock environment", ctx.json);
    Ok(())
}

/// Offline: decode a raw env partition dump into its text form
async fn convert(ctx: &Context, dump: &Path, output_path: &Path) -> Result<()> {
    let map = convert_env_dump(dump, output_path, ctx.config.env_region_size).await?;
    output::print_env(&map, output_path, ctx.json);
    Ok(())
}

fn confirm_wipe(ctx: &Context, yes: bool) -> Result<bool> {
    if yes || ctx.json {
        return Ok(true);
    }
    let confirmed = Confirm::new()
        .with_prompt("The device environment will be erased before the import. Continue?")
        .interact()?;
    if !confirmed {
        output::print_warning("Environment replace cancelled", ctx.json);
    }
    Ok(confirmed)
}
