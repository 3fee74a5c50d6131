//! Dispatch: feed a batch of raw findings through the registry and run each
//! resolved workflow.
//!
//! Findings are processed one at a time, in order. Nothing that goes wrong
//! with one finding stops the next one, and the response is always the same
//! fixed success document.

use crate::error::{EventError, FindingError, ReflexError};
use crate::finding::{self, Finding};
use crate::registry::HandlerRegistry;
use crate::workflow::{Outcome, SkipReason, WorkflowContext, WorkflowReport};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// JSON pointer to the findings list inside the event envelope.
pub const FINDINGS_POINTER: &str = "/detail/service/additionalInfo/findings";

/// Fixed body returned for every batch.
pub const COMPLETION_BODY: &str = "Processing complete.";

/// Raw finding records unwrapped from an incoming event.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindingBatch {
    pub records: Vec<Value>,
}

impl FindingBatch {
    pub fn new(records: Vec<Value>) -> Self {
        Self { records }
    }

    /// Unwrap the findings list from an event envelope.
    pub fn from_event(event: &Value) -> Result<Self, EventError> {
        let records = event
            .pointer(FINDINGS_POINTER)
            .and_then(Value::as_array)
            .ok_or(EventError::MissingFindings {
                path: FINDINGS_POINTER,
            })?;
        Ok(Self::new(records.clone()))
    }

    /// Parse a raw event document and unwrap its findings.
    pub fn parse(raw: &str) -> Result<Self, ReflexError> {
        let event: Value = serde_json::from_str(raw)?;
        Ok(Self::from_event(&event)?)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// The fixed response shape returned to the event source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchResponse {
    pub status_code: u16,
    pub body: String,
}

impl DispatchResponse {
    pub fn complete() -> Self {
        Self {
            status_code: 200,
            body: COMPLETION_BODY.to_string(),
        }
    }
}

/// Per-batch tallies, for logs and tests only.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DispatchSummary {
    pub received: usize,
    pub parse_failures: usize,
    pub unhandled: usize,
    pub construction_failures: usize,
    pub completed: usize,
    pub skipped_lock_held: usize,
    pub skipped_lock_check_failed: usize,
    pub manual_intervention: usize,
    pub failed: usize,
}

impl DispatchSummary {
    fn record(&mut self, report: &WorkflowReport) {
        match &report.outcome {
            Outcome::Completed { .. } => self.completed += 1,
            Outcome::Skipped {
                reason: SkipReason::LockHeld,
            } => self.skipped_lock_held += 1,
            Outcome::Skipped {
                reason: SkipReason::LockCheckFailed { .. },
            } => self.skipped_lock_check_failed += 1,
            Outcome::ManualIntervention { .. } => self.manual_intervention += 1,
            Outcome::Failed { .. } => self.failed += 1,
        }
    }
}

/// Runs batches of findings against a registry.
pub struct Dispatcher {
    registry: HandlerRegistry,
    context: WorkflowContext,
}

impl Dispatcher {
    pub fn new(registry: HandlerRegistry, context: WorkflowContext) -> Self {
        Self { registry, context }
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    /// Process every finding and return the fixed completion response.
    pub async fn dispatch(&self, batch: &FindingBatch) -> DispatchResponse {
        self.dispatch_with_summary(batch).await.0
    }

    /// Process every finding, also returning the per-batch tallies.
    pub async fn dispatch_with_summary(
        &self,
        batch: &FindingBatch,
    ) -> (DispatchResponse, DispatchSummary) {
        let mut summary = DispatchSummary {
            received: batch.len(),
            ..Default::default()
        };

        for (index, raw) in batch.records.iter().enumerate() {
            self.dispatch_one(index, raw, &mut summary).await;
        }

        tracing::info!(
            received = summary.received,
            completed = summary.completed,
            skipped_lock_held = summary.skipped_lock_held,
            skipped_lock_check_failed = summary.skipped_lock_check_failed,
            manual_intervention = summary.manual_intervention,
            failed = summary.failed,
            unhandled = summary.unhandled,
            parse_failures = summary.parse_failures,
            construction_failures = summary.construction_failures,
            "Finding batch processed"
        );

        (DispatchResponse::complete(), summary)
    }

    async fn dispatch_one(&self, index: usize, raw: &Value, summary: &mut DispatchSummary) {
        let Some(finding_type) = finding::finding_type(raw) else {
            let error = FindingError::MissingField { field: "Type" };
            tracing::error!(index, error = %error, "Malformed finding, skipping");
            summary.parse_failures += 1;
            return;
        };
        tracing::info!(index, finding_type, "Processing finding");

        let Some(constructor) = self.registry.resolve(finding_type) else {
            tracing::info!(
                index,
                finding_type,
                "No handler configured for this finding type, ignoring"
            );
            summary.unhandled += 1;
            return;
        };

        let finding = match Finding::parse(raw) {
            Ok(finding) => finding,
            Err(e) => {
                tracing::error!(index, finding_type, error = %e, "Malformed finding, skipping");
                summary.parse_failures += 1;
                return;
            }
        };

        let workflow = match constructor(finding.clone(), self.context.clone()).await {
            Ok(workflow) => workflow,
            Err(e) => {
                tracing::error!(
                    index,
                    finding_type,
                    resource_id = %finding.resource_id,
                    error = %e,
                    "Failed to construct workflow"
                );
                summary.construction_failures += 1;
                return;
            }
        };

        tracing::info!(
            index,
            workflow = workflow.name(),
            resource_id = %finding.resource_id,
            "Found handler for finding"
        );

        match workflow.execute().await {
            Ok(report) => {
                tracing::info!(
                    index,
                    workflow = report.workflow,
                    resource_id = %report.resource_id,
                    terminal_state = %report.terminal_state(),
                    duration_ms = report.duration_ms(),
                    "Workflow finished"
                );
                summary.record(&report);
            }
            Err(e) => {
                tracing::error!(
                    index,
                    workflow = workflow.name(),
                    resource_id = %finding.resource_id,
                    error = %e,
                    "Workflow returned an error"
                );
                summary.failed += 1;
            }
        }
    }
}
