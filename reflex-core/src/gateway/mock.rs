//! Recording gateway for tests.
//!
//! Every call is appended to an ordered log. Responses (existing tags, the
//! describe output, the snapshot id) and per-operation failures are scripted
//! up front with the builder methods.

use super::{DescribeInstancesOutput, ResourceGateway, ResourceTag};
use crate::error::GatewayError;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use tokio::sync::Mutex;

/// One recorded gateway invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayCall {
    ModifyNetworkMembership {
        resource_id: String,
        groups: Vec<String>,
    },
    DescribeResource {
        resource_id: String,
    },
    CreateSnapshot {
        volume_id: String,
        description: String,
    },
    TerminateResource {
        resource_id: String,
    },
    DescribeTags {
        resource_id: String,
        key: String,
    },
    CreateTags {
        resource_id: String,
        tags: Vec<ResourceTag>,
    },
    DeleteTags {
        resource_id: String,
        keys: Vec<String>,
    },
    PublishMessage {
        channel: String,
        subject: String,
        body: String,
    },
}

impl GatewayCall {
    /// Operation name, e.g. `create-snapshot`.
    pub fn operation(&self) -> &'static str {
        match self {
            Self::ModifyNetworkMembership { .. } => "modify-network-membership",
            Self::DescribeResource { .. } => "describe-resource",
            Self::CreateSnapshot { .. } => "create-snapshot",
            Self::TerminateResource { .. } => "terminate-resource",
            Self::DescribeTags { .. } => "describe-tags",
            Self::CreateTags { .. } => "create-tags",
            Self::DeleteTags { .. } => "delete-tags",
            Self::PublishMessage { .. } => "publish-message",
        }
    }

    /// Whether the call changes remote state.
    pub fn is_mutation(&self) -> bool {
        !matches!(
            self,
            Self::DescribeResource { .. } | Self::DescribeTags { .. }
        )
    }
}

/// Scriptable in-memory gateway that records every call.
pub struct MockGateway {
    calls: Mutex<Vec<GatewayCall>>,
    tags: Mutex<HashMap<String, Vec<ResourceTag>>>,
    description: DescribeInstancesOutput,
    snapshot_id: String,
    failing: HashSet<&'static str>,
}

impl MockGateway {
    /// A gateway with no tags, an empty describe response and snapshot id
    /// `snap-mock`.
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            tags: Mutex::new(HashMap::new()),
            description: DescribeInstancesOutput::default(),
            snapshot_id: "snap-mock".to_string(),
            failing: HashSet::new(),
        }
    }

    /// Pre-attach a tag to a resource.
    pub fn with_tag(mut self, resource_id: &str, tag: ResourceTag) -> Self {
        self.tags
            .get_mut()
            .entry(resource_id.to_string())
            .or_default()
            .push(tag);
        self
    }

    /// Describe `resource_id` as having a single root volume.
    pub fn with_volume(self, resource_id: &str, volume_id: &str) -> Self {
        self.with_description(DescribeInstancesOutput::single_volume(
            resource_id,
            "/dev/xvda",
            volume_id,
        ))
    }

    /// Set the describe-resource response verbatim.
    pub fn with_description(mut self, description: DescribeInstancesOutput) -> Self {
        self.description = description;
        self
    }

    /// Set the snapshot id returned by create-snapshot.
    pub fn with_snapshot_id(mut self, snapshot_id: impl Into<String>) -> Self {
        self.snapshot_id = snapshot_id.into();
        self
    }

    /// Make an operation (by name, e.g. `terminate-resource`) fail.
    pub fn failing(mut self, operation: &'static str) -> Self {
        self.failing.insert(operation);
        self
    }

    /// Every call recorded so far, in order.
    pub async fn calls(&self) -> Vec<GatewayCall> {
        self.calls.lock().await.clone()
    }

    /// Operation names recorded so far, in order.
    pub async fn operations(&self) -> Vec<&'static str> {
        self.calls
            .lock()
            .await
            .iter()
            .map(GatewayCall::operation)
            .collect()
    }

    /// Number of recorded calls for one operation.
    pub async fn count(&self, operation: &str) -> usize {
        self.calls
            .lock()
            .await
            .iter()
            .filter(|c| c.operation() == operation)
            .count()
    }

    /// Current tags on a resource.
    pub async fn tags_of(&self, resource_id: &str) -> Vec<ResourceTag> {
        self.tags
            .lock()
            .await
            .get(resource_id)
            .cloned()
            .unwrap_or_default()
    }

    async fn record(&self, call: GatewayCall) -> Result<(), GatewayError> {
        let operation = call.operation();
        self.calls.lock().await.push(call);
        if self.failing.contains(operation) {
            return Err(GatewayError::request(operation, "injected failure"));
        }
        Ok(())
    }
}

impl Default for MockGateway {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ResourceGateway for MockGateway {
    async fn modify_network_membership(
        &self,
        resource_id: &str,
        groups: &[String],
    ) -> Result<(), GatewayError> {
        self.record(GatewayCall::ModifyNetworkMembership {
            resource_id: resource_id.to_string(),
            groups: groups.to_vec(),
        })
        .await
    }

    async fn describe_resource(
        &self,
        resource_id: &str,
    ) -> Result<DescribeInstancesOutput, GatewayError> {
        self.record(GatewayCall::DescribeResource {
            resource_id: resource_id.to_string(),
        })
        .await?;
        Ok(self.description.clone())
    }

    async fn create_snapshot(
        &self,
        volume_id: &str,
        description: &str,
    ) -> Result<String, GatewayError> {
        self.record(GatewayCall::CreateSnapshot {
            volume_id: volume_id.to_string(),
            description: description.to_string(),
        })
        .await?;
        Ok(self.snapshot_id.clone())
    }

    async fn terminate_resource(&self, resource_id: &str) -> Result<(), GatewayError> {
        self.record(GatewayCall::TerminateResource {
            resource_id: resource_id.to_string(),
        })
        .await
    }

    async fn describe_tags(
        &self,
        resource_id: &str,
        key: &str,
    ) -> Result<Vec<ResourceTag>, GatewayError> {
        self.record(GatewayCall::DescribeTags {
            resource_id: resource_id.to_string(),
            key: key.to_string(),
        })
        .await?;
        Ok(self
            .tags_of(resource_id)
            .await
            .into_iter()
            .filter(|t| t.key == key)
            .collect())
    }

    async fn create_tags(
        &self,
        resource_id: &str,
        tags: &[ResourceTag],
    ) -> Result<(), GatewayError> {
        self.record(GatewayCall::CreateTags {
            resource_id: resource_id.to_string(),
            tags: tags.to_vec(),
        })
        .await?;
        let mut all = self.tags.lock().await;
        let existing = all.entry(resource_id.to_string()).or_default();
        for tag in tags {
            existing.retain(|t| t.key != tag.key);
            existing.push(tag.clone());
        }
        Ok(())
    }

    async fn delete_tags(&self, resource_id: &str, keys: &[String]) -> Result<(), GatewayError> {
        self.record(GatewayCall::DeleteTags {
            resource_id: resource_id.to_string(),
            keys: keys.to_vec(),
        })
        .await?;
        if let Some(existing) = self.tags.lock().await.get_mut(resource_id) {
            existing.retain(|t| !keys.contains(&t.key));
        }
        Ok(())
    }

    async fn publish_message(
        &self,
        channel: &str,
        subject: &str,
        body: &str,
    ) -> Result<(), GatewayError> {
        self.record(GatewayCall::PublishMessage {
            channel: channel.to_string(),
            subject: subject.to_string(),
            body: body.to_string(),
        })
        .await
    }
}
