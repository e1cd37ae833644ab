//! Interactive bootloader command loop

use std::future::Future;

use serde::Serialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, warn};

use crate::device::BurnDevice;

/// Prompt written before each line is read
pub const PROMPT: &str = "bulkcmd: ";

/// Counts reported when the loop ends
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ShellSummary {
    /// Commands handed to the device
    pub sent: usize,
    /// Commands the transport rejected
    pub failed: usize,
}

/// Send one command per input line until end of input or `shutdown` resolves
///
/// The console returns no output, so nothing is echoed back. A rejected
/// command is logged and the loop carries on. `shutdown` is only polled
/// while waiting for input, so a command that was already sent always
/// completes before the loop ends.
pub async fn run_shell<R, W, S>(
    device: &mut dyn BurnDevice,
    input: R,
    mut prompt: W,
    shutdown: S,
) -> ShellSummary
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
    S: Future<Output = ()>,
{
    let mut lines = input.lines();
    let mut summary = ShellSummary::default();
    tokio::pin!(shutdown);

    loop {
        if let Err(e) = write_prompt(&mut prompt).await {
            debug!("Writing shell prompt failed: {}", e);
        }

        let line = tokio::select! {
            biased;
            () = &mut shutdown => {
                info!("Interrupted, exiting shell");
                break;
            }
            line = lines.next_line() => line,
        };

        let command = match line {
            Ok(Some(line)) => line,
            Ok(None) => {
                debug!("End of input, exiting shell");
                break;
            }
            Err(e) => {
                warn!("Reading shell input failed: {}", e);
                break;
            }
        };
        let command = command.trim();
        if command.is_empty() {
            continue;
        }

        summary.sent = summary.sent.saturating_add(1);
        if let Err(e) = device.run_command(command).await {
            summary.failed = summary.failed.saturating_add(1);
            warn!("Command '{}' failed: {}", command, e);
        }
    }

    summary
}

async fn write_prompt<W: AsyncWrite + Unpin>(out: &mut W) -> std::io::Result<()> {
    out.write_all(PROMPT.as_bytes()).await?;
    out.flush().await
}
