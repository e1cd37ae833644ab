//! superbird - USB recovery and provisioning CLI for the Spotify Car Thing
//!
//! Dumps and restores the full A/B partition set, edits the U-Boot
//! environment and toggles boot policies over USB burn mode.

#![deny(static_mut_refs)]
#![deny(unused_must_use)]
#![deny(clippy::unwrap_used)]

mod commands;
mod completion;
mod error;
mod helper;
mod output;

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;

use anyhow::Result;
use clap::{Parser, Subcommand};
use superbird_provision::{BurnSpeed, ToolConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::commands::*;
use crate::error::CliError;

#[derive(Parser, Debug)]
#[command(name = "superbird")]
#[command(about = "superbird USB recovery tool - dump, restore and configure the Car Thing")]
#[command(version)]
#[command(long_about = "
superbird talks to the Spotify Car Thing over USB. With the device in USB
mode (hold buttons 1 and 4 while plugging it in) it stages a secondary
loader to reach USB burn mode, then dumps or restores partitions, edits the
U-Boot environment and toggles boot policies.

Use --json flag for machine-readable output suitable for scripting.
")]
struct Cli {
    /// Output format (human-readable or JSON)
    #[arg(
        long,
        global = true,
        help = "Output in JSON format for machine parsing"
    )]
    json: bool,

    /// Verbose logging
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Configuration file (defaults to the platform config directory)
    #[arg(long, global = true, env = "SUPERBIRD_CONFIG")]
    config: Option<PathBuf>,

    /// Use a reduced USB transfer speed
    #[arg(long, global = true, conflicts_with = "slower_burn")]
    slow_burn: bool,

    /// Use the lowest USB transfer speed
    #[arg(long, global = true)]
    slower_burn: bool,

    /// Directory holding the bundled images
    #[arg(long, global = true)]
    images: Option<PathBuf>,

    /// USB helper program (for testing)
    #[arg(long, global = true, env = "SUPERBIRD_HELPER", hide = true)]
    helper: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Report the attached device and its boot mode
    FindDevice,

    /// Move the device from USB mode into USB burn mode
    BurnMode,

    /// Resume a boot paused in USB burn mode
    ContinueBoot,

    /// Send one bootloader console command
    Bulkcmd {
        /// Command text, sent as-is
        command: String,
    },

    /// Interactive bootloader command shell
    Shell,

    /// Boot the bundled debug kernel once from a slot
    BootDebugKernel {
        /// Slot to boot (A or B)
        slot: String,
    },

    /// Persisted boot-policy toggles
    #[command(subcommand)]
    Policy(PolicyCommands),

    /// Dump every partition into a directory
    DumpDevice {
        /// Output directory
        dir: PathBuf,
    },

    /// Restore every partition from a dump directory
    RestoreDevice {
        /// Directory written by dump-device
        dir: PathBuf,
        /// Keep the device provisioned when data or settings dumps are missing
        #[arg(long)]
        dont_reset: bool,
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Dump a single partition to a file
    DumpPartition {
        /// Partition name
        name: String,
        /// Output file
        file: PathBuf,
    },

    /// Restore a single partition from a file
    RestorePartition {
        /// Partition name
        name: String,
        /// Input file
        file: PathBuf,
    },

    /// U-Boot environment commands
    #[command(subcommand)]
    Env(EnvCommands),

    /// Generate shell completion scripts
    Completion {
        /// Shell to generate completion for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

impl Commands {
    /// Whether the command talks to a device
    fn touches_device(&self) -> bool {
        !matches!(
            self,
            Commands::Completion { .. } | Commands::Env(EnvCommands::Convert { .. })
        )
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("superbird={log_level},superbird_provision={log_level}").into()
            }),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    if cli.command.touches_device() {
        note_privileges();
    }

    let started = Instant::now();
    match execute_command(&cli).await {
        Ok(()) => {
            if cli.command.touches_device() && !cli.json {
                output::print_elapsed(started.elapsed());
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            if cli.json {
                output::print_error_json(&e);
            } else {
                output::print_error_human(&e);
            }
            ExitCode::from(error::exit_code(&e))
        }
    }
}

async fn execute_command(cli: &Cli) -> Result<()> {
    if let Commands::Completion { shell } = &cli.command {
        completion::generate_completion(*shell);
        return Ok(());
    }

    let ctx = Context::new(load_config(cli).await?, cli.json);
    match &cli.command {
        Commands::FindDevice => commands::device::find_device(&ctx).await,
        Commands::BurnMode => commands::device::burn_mode(&ctx).await,
        Commands::ContinueBoot => commands::device::continue_boot(&ctx).await,
        Commands::Bulkcmd { command } => commands::device::bulkcmd(&ctx, command).await,
        Commands::Shell => commands::device::shell(&ctx).await,
        Commands::BootDebugKernel { slot } => {
            commands::device::boot_debug_kernel_once(&ctx, slot).await
        }
        Commands::Policy(cmd) => commands::policy::execute(cmd, &ctx).await,
        Commands::DumpDevice { dir } => commands::partition::dump_device(&ctx, dir).await,
        Commands::RestoreDevice {
            dir,
            dont_reset,
            yes,
        } => commands::partition::restore_device(&ctx, dir, *dont_reset, *yes).await,
        Commands::DumpPartition { name, file } => {
            commands::partition::dump_partition(&ctx, name, file).await
        }
        Commands::RestorePartition { name, file } => {
            commands::partition::restore_partition(&ctx, name, file).await
        }
        Commands::Env(cmd) => commands::env::execute(cmd, &ctx).await,
        Commands::Completion { .. } => Ok(()),
    }
}

/// Load the configuration file and apply command-line overrides
///
/// Only device commands create a missing config file.
async fn load_config(cli: &Cli) -> Result<ToolConfig> {
    let loaded = match (&cli.config, cli.command.touches_device()) {
        (Some(path), true) => ToolConfig::load_from_path(path).await,
        (Some(path), false) => ToolConfig::read_from_path(path).await,
        (None, true) => ToolConfig::load().await,
        (None, false) => ToolConfig::read().await,
    };
    let mut config = loaded.map_err(|e| CliError::InvalidConfiguration(format!("{e:#}")))?;

    if cli.slower_burn {
        config.helper.speed = BurnSpeed::Slower;
    } else if cli.slow_burn {
        config.helper.speed = BurnSpeed::Slow;
    }
    if let Some(images) = &cli.images {
        config.images_dir = images.clone();
    }
    if let Some(helper) = &cli.helper {
        config.helper.program = helper.clone();
    }
    Ok(config)
}

/// USB access usually needs root or a udev rule on Linux
#[cfg(target_os = "linux")]
fn note_privileges() {
    let Ok(status) = std::fs::read_to_string("/proc/self/status") else {
        return;
    };
    // Uid: real effective saved filesystem
    let effective = status
        .lines()
        .find_map(|line| line.strip_prefix("Uid:"))
        .and_then(|ids| ids.split_whitespace().nth(1));
    if let Some(uid) = effective
        && uid != "0"
    {
        tracing::info!("Not running as root; USB access may require sudo or a udev rule");
    }
}

#[cfg(not(target_os = "linux"))]
fn note_privileges() {}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    // --- Global flag parsing ---

    #[test]
    fn parse_find_device_defaults() -> TestResult {
        let cli = Cli::try_parse_from(["superbird", "find-device"])?;
        assert!(!cli.json);
        assert_eq!(cli.verbose, 0);
        assert!(!cli.slow_burn);
        assert!(!cli.slower_burn);
        assert!(cli.images.is_none());
        assert!(matches!(cli.command, Commands::FindDevice));
        Ok(())
    }

    #[test]
    fn parse_global_flags_after_subcommand() -> TestResult {
        let cli = Cli::try_parse_from([
            "superbird",
            "dump-device",
            "dumps",
            "--json",
            "-vv",
            "--slow-burn",
            "--images",
            "/opt/superbird/images",
        ])?;
        assert!(cli.json);
        assert_eq!(cli.verbose, 2);
        assert!(cli.slow_burn);
        assert_eq!(cli.images, Some(PathBuf::from("/opt/superbird/images")));
        assert!(matches!(cli.command, Commands::DumpDevice { ref dir } if dir == &PathBuf::from("dumps")));
        Ok(())
    }

    #[test]
    fn burn_speeds_are_mutually_exclusive() {
        let result = Cli::try_parse_from(["superbird", "--slow-burn", "--slower-burn", "shell"]);
        assert!(matches!(
            result.map_err(|e| e.kind()),
            Err(clap::error::ErrorKind::ArgumentConflict)
        ));
    }

    // --- Subcommands ---

    #[test]
    fn parse_restore_device_flags() -> TestResult {
        let cli = Cli::try_parse_from(["superbird", "restore-device", "dumps", "--dont-reset", "-y"])?;
        match cli.command {
            Commands::RestoreDevice {
                dir,
                dont_reset,
                yes,
            } => {
                assert_eq!(dir, PathBuf::from("dumps"));
                assert!(dont_reset);
                assert!(yes);
            }
            other => return Err(format!("unexpected command {other:?}").into()),
        }
        Ok(())
    }

    #[test]
    fn parse_policy_lock_slot() -> TestResult {
        let cli = Cli::try_parse_from(["superbird", "policy", "lock-slot", "b"])?;
        match cli.command {
            Commands::Policy(cmd) => assert_eq!(
                cmd.policy(),
                superbird_provision::BootPolicy::LockSlot(superbird_provision::Slot::B)
            ),
            other => return Err(format!("unexpected command {other:?}").into()),
        }
        Ok(())
    }

    #[test]
    fn parse_env_convert_is_offline() -> TestResult {
        let cli = Cli::try_parse_from(["superbird", "env", "convert", "env.dump", "env.txt"])?;
        assert!(!cli.command.touches_device());

        let cli = Cli::try_parse_from(["superbird", "env", "get", "env.txt"])?;
        assert!(cli.command.touches_device());
        Ok(())
    }

    #[test]
    fn bulkcmd_keeps_the_command_verbatim() -> TestResult {
        let cli = Cli::try_parse_from([
            "superbird",
            "bulkcmd",
            r#"setenv bootcmd "run storeboot""#,
        ])?;
        assert!(matches!(
            cli.command,
            Commands::Bulkcmd { ref command } if command == r#"setenv bootcmd "run storeboot""#
        ));
        Ok(())
    }

    #[test]
    fn missing_subcommand_is_rejected() {
        assert!(matches!(Cli::try_parse_from(["superbird"]), Err(_)));
    }

    #[test]
    fn slot_is_required_for_debug_boot() {
        assert!(matches!(
            Cli::try_parse_from(["superbird", "boot-debug-kernel"]),
            Err(_)
        ));
    }
}
