//! Progress events published by long-running workflows

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::trace;

/// Capacity of the progress channel; slow subscribers lag instead of blocking
pub const PROGRESS_CHANNEL_CAPACITY: usize = 256;

/// Workflow emitting an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Workflow {
    /// Full-device dump
    DumpDevice,
    /// Full-device restore
    RestoreDevice,
    /// Environment read, merge or replace
    Environment,
}

/// Phase of one workflow step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepPhase {
    /// Step started
    Started,
    /// Step completed
    Finished,
    /// Step skipped on a degraded path
    Skipped,
    /// Step failed
    Failed,
}

/// One progress notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEvent {
    /// Emitting workflow
    pub workflow: Workflow,
    /// Step phase
    pub phase: StepPhase,
    /// Partition or environment step name
    pub step: String,
    /// 1-based position of the step
    pub index: usize,
    /// Number of steps in the workflow
    pub total: usize,
}

/// Sending half shared by the workflows
#[derive(Debug, Clone)]
pub struct ProgressSender {
    tx: broadcast::Sender<ProgressEvent>,
}

impl ProgressSender {
    /// Create a channel with [`PROGRESS_CHANNEL_CAPACITY`]
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(PROGRESS_CHANNEL_CAPACITY);
        Self { tx }
    }

    /// Subscribe to events sent from now on
    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.tx.subscribe()
    }

    pub(crate) fn emit(
        &self,
        workflow: Workflow,
        phase: StepPhase,
        step: &str,
        index: usize,
        total: usize,
    ) {
        let event = ProgressEvent {
            workflow,
            phase,
            step: step.to_string(),
            index,
            total,
        };
        if self.tx.send(event).is_err() {
            trace!("No progress subscribers");
        }
    }
}

impl Default for ProgressSender {
    fn default() -> Self {
        Self::new()
    }
}
