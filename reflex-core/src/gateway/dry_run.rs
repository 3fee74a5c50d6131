//! Dry-run gateway: logs every intended remote call and changes nothing.
//!
//! Describes every instance as untagged with a single synthetic root volume,
//! so a rehearsal walks the full containment sequence.

use super::{DescribeInstancesOutput, ResourceGateway, ResourceTag};
use crate::error::GatewayError;
use async_trait::async_trait;
use uuid::Uuid;

#[derive(Debug, Default, Clone, Copy)]
pub struct DryRunGateway;

impl DryRunGateway {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ResourceGateway for DryRunGateway {
    async fn modify_network_membership(
        &self,
        resource_id: &str,
        groups: &[String],
    ) -> Result<(), GatewayError> {
        tracing::info!(resource_id, ?groups, "[DRY RUN] Would replace network groups");
        Ok(())
    }

    async fn describe_resource(
        &self,
        resource_id: &str,
    ) -> Result<DescribeInstancesOutput, GatewayError> {
        tracing::info!(resource_id, "[DRY RUN] Describing instance with synthetic root volume");
        Ok(DescribeInstancesOutput::single_volume(
            resource_id,
            "/dev/xvda",
            format!("vol-dryrun-{resource_id}"),
        ))
    }

    async fn create_snapshot(
        &self,
        volume_id: &str,
        description: &str,
    ) -> Result<String, GatewayError> {
        let snapshot_id = format!("snap-dryrun-{}", Uuid::new_v4().simple());
        tracing::info!(
            volume_id,
            description,
            snapshot_id = %snapshot_id,
            "[DRY RUN] Would create snapshot"
        );
        Ok(snapshot_id)
    }

    async fn terminate_resource(&self, resource_id: &str) -> Result<(), GatewayError> {
        tracing::info!(resource_id, "[DRY RUN] Would terminate instance");
        Ok(())
    }

    async fn describe_tags(
        &self,
        resource_id: &str,
        key: &str,
    ) -> Result<Vec<ResourceTag>, GatewayError> {
        tracing::info!(resource_id, key, "[DRY RUN] Reporting no tags");
        Ok(Vec::new())
    }

    async fn create_tags(
        &self,
        resource_id: &str,
        tags: &[ResourceTag],
    ) -> Result<(), GatewayError> {
        tracing::info!(resource_id, ?tags, "[DRY RUN] Would tag instance");
        Ok(())
    }

    async fn delete_tags(&self, resource_id: &str, keys: &[String]) -> Result<(), GatewayError> {
        tracing::info!(resource_id, ?keys, "[DRY RUN] Would remove tags");
        Ok(())
    }

    async fn publish_message(
        &self,
        channel: &str,
        subject: &str,
        body: &str,
    ) -> Result<(), GatewayError> {
        tracing::info!(channel, subject, body_len = body.len(), "[DRY RUN] Would publish message");
        Ok(())
    }
}
