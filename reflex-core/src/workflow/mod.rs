//! Containment workflows: the per-finding remediation state machines.
//!
//! A workflow is built once per finding by a registry constructor, executed
//! once, and dropped. Every variant drives the same [`ContainmentPlan`]:
//!
//! ```text
//! START -> CHECK_IN_PROGRESS -> SKIPPED
//!                            -> TAGGED -> ISOLATED -> SNAPSHOTTED -> TERMINATED -> NOTIFIED -> DONE
//!                                                  -> MANUAL_INTERVENTION_REQUIRED
//!          (any failure from TAGGED onwards)       -> FAILED
//! ```

pub mod c2;
pub mod containment;

pub use c2::{C2ActivityWorkflow, C2DnsActivityWorkflow};
pub use containment::ContainmentPlan;

use crate::config::ContainmentConfig;
use crate::error::{GatewayError, ReflexError};
use crate::finding::Finding;
use crate::gateway::ResourceGateway;
use crate::parameters::ConfigResolver;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Collaborators and settings handed to every workflow constructor.
#[derive(Clone)]
pub struct WorkflowContext {
    pub gateway: Arc<dyn ResourceGateway>,
    pub resolver: ConfigResolver,
    pub containment: ContainmentConfig,
}

impl WorkflowContext {
    pub fn new(
        gateway: Arc<dyn ResourceGateway>,
        resolver: ConfigResolver,
        containment: ContainmentConfig,
    ) -> Self {
        Self {
            gateway,
            resolver,
            containment,
        }
    }
}

/// A remediation workflow bound to one finding.
#[async_trait]
pub trait ContainmentWorkflow: Send + Sync {
    /// Short workflow name used in logs.
    fn name(&self) -> &'static str;

    /// The finding this workflow remediates.
    fn finding(&self) -> &Finding;

    /// Run the workflow to a terminal state.
    async fn execute(&self) -> Result<WorkflowReport, ReflexError>;
}

/// Builds a workflow for a finding. Fails when configuration the workflow
/// needs cannot be resolved.
pub type WorkflowConstructor = fn(
    Finding,
    WorkflowContext,
) -> BoxFuture<'static, Result<Box<dyn ContainmentWorkflow>, ReflexError>>;

/// States of the containment state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContainmentState {
    Start,
    CheckInProgress,
    Skipped,
    Tagged,
    Isolated,
    Snapshotted,
    Terminated,
    Notified,
    Done,
    ManualInterventionRequired,
    Failed,
}

impl ContainmentState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "START",
            Self::CheckInProgress => "CHECK_IN_PROGRESS",
            Self::Skipped => "SKIPPED",
            Self::Tagged => "TAGGED",
            Self::Isolated => "ISOLATED",
            Self::Snapshotted => "SNAPSHOTTED",
            Self::Terminated => "TERMINATED",
            Self::Notified => "NOTIFIED",
            Self::Done => "DONE",
            Self::ManualInterventionRequired => "MANUAL_INTERVENTION_REQUIRED",
            Self::Failed => "FAILED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Skipped | Self::Done | Self::ManualInterventionRequired | Self::Failed
        )
    }
}

impl std::fmt::Display for ContainmentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a workflow did nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// The resource already carries the remediation lock tag.
    LockHeld,
    /// The lock tag could not be read; treated as held.
    LockCheckFailed { error: GatewayError },
}

/// How a workflow ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Isolated, snapshotted, terminated and reported.
    Completed { snapshot_id: String },
    /// Another remediation is (or may be) in progress.
    Skipped { reason: SkipReason },
    /// Forensic evidence could not be secured; termination withheld.
    ManualIntervention { reason: String },
    /// A remote call failed after the lock check.
    Failed {
        last_state: ContainmentState,
        error: GatewayError,
    },
}

impl Outcome {
    /// The terminal state this outcome corresponds to.
    pub fn terminal_state(&self) -> ContainmentState {
        match self {
            Self::Completed { .. } => ContainmentState::Done,
            Self::Skipped { .. } => ContainmentState::Skipped,
            Self::ManualIntervention { .. } => ContainmentState::ManualInterventionRequired,
            Self::Failed { .. } => ContainmentState::Failed,
        }
    }
}

/// Record of one workflow execution.
#[derive(Debug, Clone)]
pub struct WorkflowReport {
    pub workflow: &'static str,
    pub finding_type: String,
    pub finding_id: Option<String>,
    pub resource_id: String,
    /// Every state visited, in order, ending with the terminal state.
    pub states: Vec<ContainmentState>,
    pub outcome: Outcome,
    /// Whether the lock tag was removed under `LockReleasePolicy::ClearOnFailure`.
    pub lock_released: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl WorkflowReport {
    pub fn terminal_state(&self) -> ContainmentState {
        self.outcome.terminal_state()
    }

    pub fn snapshot_id(&self) -> Option<&str> {
        match &self.outcome {
            Outcome::Completed { snapshot_id } => Some(snapshot_id),
            _ => None,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, Outcome::Completed { .. })
    }

    pub fn duration_ms(&self) -> i64 {
        (self.finished_at - self.started_at).num_milliseconds()
    }
}
