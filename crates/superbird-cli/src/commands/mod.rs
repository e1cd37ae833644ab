//! Command implementations for the superbird CLI

pub mod device;
pub mod env;
pub mod partition;
pub mod policy;

use std::path::PathBuf;

use anyhow::Result;
use clap::Subcommand;
use superbird_provision::{
    BootPolicy, BurnDevice, EnvWorkflow, ModeController, PartitionSetOrchestrator, Slot,
    ToolConfig,
};

use crate::helper::HelperTransport;

/// Resolved configuration and output mode shared by every command
pub struct Context {
    pub config: ToolConfig,
    pub json: bool,
}

impl Context {
    pub fn new(config: ToolConfig, json: bool) -> Self {
        Self { config, json }
    }

    pub fn modes(&self) -> ModeController {
        ModeController::new(
            Box::new(HelperTransport::new(&self.config.helper)),
            self.config.images(),
        )
        .with_transition_wait(self.config.transition_wait())
    }

    /// Open a burn-mode handle, staging the secondary loader first when needed
    pub async fn recovery(&self) -> Result<Box<dyn BurnDevice>> {
        Ok(self.modes().ensure_recovery().await?)
    }

    pub fn orchestrator(&self) -> PartitionSetOrchestrator {
        PartitionSetOrchestrator::new(self.config.env_region_size)
    }

    pub fn env_workflow(&self) -> EnvWorkflow {
        EnvWorkflow::new(self.config.settle_interval(), self.config.env_region_size)
    }
}

#[derive(Subcommand, Debug)]
pub enum PolicyCommands {
    /// Enter USB burn mode at every boot while a USB host is connected
    EnableBurnMode,

    /// Enter USB burn mode at boot only while preset button 4 is held
    EnableBurnModeButton,

    /// Restore the stock boot arguments (burn mode off)
    DisableBurnMode,

    /// Boot without checking for a valid charger
    DisableChargerCheck,

    /// Check for a valid charger before booting
    EnableChargerCheck,

    /// Disable A/B booting and always boot the given slot
    LockSlot {
        /// Slot to lock to (A or B; anything else falls back to A)
        slot: String,
    },

    /// Route the Linux console to the UART
    EnableUartShell,
}

impl PolicyCommands {
    pub fn policy(&self) -> BootPolicy {
        match self {
            PolicyCommands::EnableBurnMode => BootPolicy::EnableBurnMode,
            PolicyCommands::EnableBurnModeButton => BootPolicy::EnableBurnModeButton,
            PolicyCommands::DisableBurnMode => BootPolicy::DisableBurnMode,
            PolicyCommands::DisableChargerCheck => BootPolicy::DisableChargerCheck,
            PolicyCommands::EnableChargerCheck => BootPolicy::EnableChargerCheck,
            PolicyCommands::LockSlot { slot } => BootPolicy::LockSlot(Slot::parse_lenient(slot)),
            PolicyCommands::EnableUartShell => BootPolicy::EnableUartShell,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum EnvCommands {
    /// Read the device environment into a text file
    Get {
        /// Output text file
        output: PathBuf,
    },

    /// Import a text file into the device environment, keeping other variables
    Merge {
        /// Environment text file (KEY=VALUE per line)
        file: PathBuf,
    },

    /// Erase the device environment and import a text file in its place
    Replace {
        /// Environment text file (KEY=VALUE per line)
        file: PathBuf,
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Replace the device environment with the bundled stock one
    RestoreStock {
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Convert a local env partition dump into a text file (no device needed)
    Convert {
        /// Raw env partition dump
        dump: PathBuf,
        /// Output text file
        output: PathBuf,
    },
}
