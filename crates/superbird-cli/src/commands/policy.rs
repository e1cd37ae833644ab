//! Boot-policy commands

use anyhow::Result;

use crate::commands::{Context, PolicyCommands};
use crate::output;

/// Apply one boot policy to the persisted environment
pub async fn execute(cmd: &PolicyCommands, ctx: &Context) -> Result<()> {
    let policy = cmd.policy();
    let mut device = ctx.recovery().await?;
    policy.apply(device.as_mut()).await?;
    output::print_success(&policy.describe(), ctx.json);
    Ok(())
}
