//! The containment plan: lock, isolate, snapshot, terminate, notify.
//!
//! Invariants:
//! - the lock tag is written before any destructive call;
//! - termination only happens once a snapshot id has been obtained;
//! - no error escapes `run`; every path ends in a terminal [`Outcome`].

use super::{ContainmentState, Outcome, SkipReason, WorkflowContext, WorkflowReport};
use crate::config::LockReleasePolicy;
use crate::error::{GatewayError, ReflexError};
use crate::finding::Finding;
use crate::gateway::{ResourceGateway, ResourceTag};
use chrono::Utc;
use std::sync::Arc;

/// Result of reading the lock tag.
enum LockStatus {
    Free,
    Held,
    Unknown(GatewayError),
}

/// Fully resolved containment plan for one finding.
pub struct ContainmentPlan {
    workflow: &'static str,
    threat_summary: &'static str,
    finding: Finding,
    quarantine_group: String,
    notification_channel: String,
    lock_tag: ResourceTag,
    lock_release: LockReleasePolicy,
    gateway: Arc<dyn ResourceGateway>,
}

impl ContainmentPlan {
    /// Resolve the quarantine group and notification channel and bind them to
    /// the finding. Fails if either parameter cannot be resolved.
    pub async fn prepare(
        workflow: &'static str,
        threat_summary: &'static str,
        finding: Finding,
        ctx: &WorkflowContext,
    ) -> Result<Self, ReflexError> {
        let settings = &ctx.containment;
        let quarantine_group = ctx
            .resolver
            .get_parameter(&settings.quarantine_group_parameter)
            .await?;
        let notification_channel = ctx
            .resolver
            .get_parameter(&settings.notification_channel_parameter)
            .await?;

        tracing::info!(
            workflow,
            resource_id = %finding.resource_id,
            remote_peer = finding.remote_peer_address.as_deref().unwrap_or("-"),
            "Initialized containment plan"
        );

        Ok(Self {
            workflow,
            threat_summary,
            finding,
            quarantine_group,
            notification_channel,
            lock_tag: ResourceTag::new(&settings.lock_tag_key, &settings.lock_tag_value),
            lock_release: settings.lock_release,
            gateway: ctx.gateway.clone(),
        })
    }

    pub fn finding(&self) -> &Finding {
        &self.finding
    }

    pub fn quarantine_group(&self) -> &str {
        &self.quarantine_group
    }

    pub fn notification_channel(&self) -> &str {
        &self.notification_channel
    }

    /// Drive the state machine to a terminal state.
    pub async fn run(&self) -> WorkflowReport {
        let started_at = Utc::now();
        let resource_id = self.finding.resource_id.as_str();
        let mut states = vec![ContainmentState::Start, ContainmentState::CheckInProgress];
        let mut lock_released = false;

        tracing::warn!(
            workflow = self.workflow,
            finding_type = %self.finding.finding_type,
            finding_id = self.finding.id_or_unknown(),
            resource_id,
            "Executing containment plan"
        );

        let outcome = match self.check_lock().await {
            LockStatus::Held => {
                tracing::info!(
                    resource_id,
                    reason = "lock_held",
                    "Remediation already in progress, skipping"
                );
                Outcome::Skipped {
                    reason: SkipReason::LockHeld,
                }
            }
            LockStatus::Unknown(error) => {
                tracing::warn!(
                    resource_id,
                    reason = "lock_check_failed",
                    error = %error,
                    "Could not read remediation lock, assuming it is held and skipping"
                );
                Outcome::Skipped {
                    reason: SkipReason::LockCheckFailed { error },
                }
            }
            LockStatus::Free => match self.acquire_lock().await {
                Err(error) => {
                    tracing::error!(resource_id, error = %error, "Failed to apply remediation lock");
                    Outcome::Failed {
                        last_state: ContainmentState::CheckInProgress,
                        error,
                    }
                }
                Ok(()) => {
                    states.push(ContainmentState::Tagged);
                    let outcome = match self.contain(&mut states).await {
                        Ok(outcome) => outcome,
                        Err(error) => {
                            let last_state =
                                states.last().copied().unwrap_or(ContainmentState::Tagged);
                            tracing::error!(
                                workflow = self.workflow,
                                resource_id,
                                last_state = %last_state,
                                operation = error.operation(),
                                error = %error,
                                "Failed to execute containment plan"
                            );
                            Outcome::Failed { last_state, error }
                        }
                    };
                    if matches!(outcome, Outcome::Failed { .. }) {
                        lock_released = self.release_lock().await;
                    }
                    outcome
                }
            },
        };

        states.push(outcome.terminal_state());

        WorkflowReport {
            workflow: self.workflow,
            finding_type: self.finding.finding_type.clone(),
            finding_id: self.finding.id.clone(),
            resource_id: self.finding.resource_id.clone(),
            states,
            outcome,
            lock_released,
            started_at,
            finished_at: Utc::now(),
        }
    }

    async fn check_lock(&self) -> LockStatus {
        match self
            .gateway
            .describe_tags(&self.finding.resource_id, &self.lock_tag.key)
            .await
        {
            Ok(tags) if tags.iter().any(|t| t.key == self.lock_tag.key) => LockStatus::Held,
            Ok(_) => LockStatus::Free,
            Err(e) => LockStatus::Unknown(e),
        }
    }

    async fn acquire_lock(&self) -> Result<(), GatewayError> {
        self.gateway
            .create_tags(&self.finding.resource_id, std::slice::from_ref(&self.lock_tag))
            .await?;
        tracing::info!(
            resource_id = %self.finding.resource_id,
            tag = %self.lock_tag.key,
            "Remediation lock applied"
        );
        Ok(())
    }

    /// Remove the lock after a failure, if policy allows. Returns whether the
    /// tag was removed.
    async fn release_lock(&self) -> bool {
        if self.lock_release != LockReleasePolicy::ClearOnFailure {
            tracing::warn!(
                resource_id = %self.finding.resource_id,
                tag = %self.lock_tag.key,
                "Remediation lock retained; clear it manually before retrying"
            );
            return false;
        }

        match self
            .gateway
            .delete_tags(
                &self.finding.resource_id,
                std::slice::from_ref(&self.lock_tag.key),
            )
            .await
        {
            Ok(()) => {
                tracing::info!(resource_id = %self.finding.resource_id, "Remediation lock cleared after failure");
                true
            }
            Err(e) => {
                tracing::error!(
                    resource_id = %self.finding.resource_id,
                    error = %e,
                    "Failed to clear remediation lock"
                );
                false
            }
        }
    }

    /// Destructive part of the plan. Gateway errors propagate to `run`;
    /// structural snapshot problems end in a manual-intervention halt.
    async fn contain(&self, states: &mut Vec<ContainmentState>) -> Result<Outcome, GatewayError> {
        self.isolate().await?;
        states.push(ContainmentState::Isolated);

        let snapshot_id = match self.snapshot().await? {
            Ok(id) => id,
            Err(reason) => {
                tracing::error!(
                    severity = "critical",
                    resource_id = %self.finding.resource_id,
                    finding_id = self.finding.id_or_unknown(),
                    reason = %reason,
                    "MANUAL INTERVENTION REQUIRED: forensic snapshot unavailable, instance left isolated and running"
                );
                return Ok(Outcome::ManualIntervention { reason });
            }
        };
        states.push(ContainmentState::Snapshotted);

        self.terminate().await?;
        states.push(ContainmentState::Terminated);

        self.notify(&snapshot_id).await?;
        states.push(ContainmentState::Notified);

        tracing::warn!(
            workflow = self.workflow,
            resource_id = %self.finding.resource_id,
            snapshot_id = %snapshot_id,
            "Successfully completed containment plan"
        );
        Ok(Outcome::Completed { snapshot_id })
    }

    async fn isolate(&self) -> Result<(), GatewayError> {
        tracing::info!(
            resource_id = %self.finding.resource_id,
            group = %self.quarantine_group,
            "Applying quarantine network group"
        );
        self.gateway
            .modify_network_membership(
                &self.finding.resource_id,
                std::slice::from_ref(&self.quarantine_group),
            )
            .await?;
        tracing::info!(resource_id = %self.finding.resource_id, "Instance isolated");
        Ok(())
    }

    /// Outer error: the gateway failed. Inner error: the evidence cannot be
    /// captured for structural reasons.
    async fn snapshot(&self) -> Result<Result<String, String>, GatewayError> {
        let resource_id = &self.finding.resource_id;
        tracing::info!(resource_id = %resource_id, "Creating snapshot of root volume");

        let description = self.gateway.describe_resource(resource_id).await?;
        let volume_id = match description.root_volume_id() {
            Ok(id) => id.to_string(),
            Err(e) => return Ok(Err(format!("root volume lookup failed: {e}"))),
        };

        let snapshot_id = self
            .gateway
            .create_snapshot(&volume_id, &self.snapshot_description())
            .await?;
        if snapshot_id.trim().is_empty() {
            return Ok(Err(format!(
                "snapshot of {volume_id} returned no snapshot id"
            )));
        }

        tracing::info!(
            resource_id = %resource_id,
            volume_id = %volume_id,
            snapshot_id = %snapshot_id,
            "Snapshot created"
        );
        Ok(Ok(snapshot_id))
    }

    async fn terminate(&self) -> Result<(), GatewayError> {
        tracing::warn!(resource_id = %self.finding.resource_id, "Terminating compromised instance");
        self.gateway
            .terminate_resource(&self.finding.resource_id)
            .await?;
        tracing::warn!(resource_id = %self.finding.resource_id, "Instance terminated");
        Ok(())
    }

    async fn notify(&self, snapshot_id: &str) -> Result<(), GatewayError> {
        tracing::info!(channel = %self.notification_channel, "Sending containment report");
        self.gateway
            .publish_message(
                &self.notification_channel,
                &self.notification_subject(),
                &self.notification_body(snapshot_id),
            )
            .await?;
        tracing::info!("Containment report sent");
        Ok(())
    }

    pub fn snapshot_description(&self) -> String {
        format!(
            "Forensic snapshot for instance {} from GuardDuty finding {}",
            self.finding.resource_id,
            self.finding.id_or_unknown()
        )
    }

    pub fn notification_subject(&self) -> String {
        format!(
            "Automated C2 Response for Instance {}",
            self.finding.resource_id
        )
    }

    pub fn notification_body(&self, snapshot_id: &str) -> String {
        let mut body = String::from("Automated SOAR Response for GuardDuty Finding\n\n");
        body.push_str(&format!("Finding Type: {}\n", self.finding.finding_type));
        body.push_str(&format!("Finding ID: {}\n", self.finding.id_or_unknown()));
        body.push_str(&format!("Instance ID: {}\n", self.finding.resource_id));
        if let Some(peer) = &self.finding.remote_peer_address {
            body.push_str(&format!("Remote Peer: {peer}\n"));
        }
        body.push_str(&format!("Description: {}\n\n", self.threat_summary));
        body.push_str("Actions Taken:\n");
        body.push_str(&format!(
            "1. Instance isolated with SG: {}\n",
            self.quarantine_group
        ));
        body.push_str(&format!("2. Forensic snapshot created: {snapshot_id}\n"));
        body.push_str("3. Instance terminated.\n\n");
        body.push_str("Please begin forensic analysis on the snapshot.");
        body
    }
}
