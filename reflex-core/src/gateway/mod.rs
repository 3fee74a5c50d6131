//! Remote resource gateway: the compute, snapshot and notification backends
//! the containment workflow acts on.
//!
//! Real backends implement [`ResourceGateway`]. Two in-crate implementations
//! exist: [`DryRunGateway`] for rehearsal runs and [`MockGateway`] for tests.

pub mod dry_run;
pub mod mock;

pub use dry_run::DryRunGateway;
pub use mock::{GatewayCall, MockGateway};

use crate::error::GatewayError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A key/value tag attached to a remote resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ResourceTag {
    pub key: String,
    pub value: String,
}

impl ResourceTag {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Response of `describe-resource`, shaped like EC2 `DescribeInstances`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DescribeInstancesOutput {
    #[serde(default)]
    pub reservations: Vec<Reservation>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Reservation {
    #[serde(default)]
    pub instances: Vec<InstanceDescription>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct InstanceDescription {
    #[serde(default)]
    pub instance_id: Option<String>,
    /// Device name of the root volume, e.g. `/dev/xvda`.
    #[serde(default)]
    pub root_device_name: Option<String>,
    #[serde(default)]
    pub block_device_mappings: Vec<BlockDeviceMapping>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct BlockDeviceMapping {
    #[serde(default)]
    pub device_name: Option<String>,
    #[serde(default)]
    pub ebs: Option<EbsBlockDevice>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct EbsBlockDevice {
    #[serde(default)]
    pub volume_id: Option<String>,
}

/// Why the root volume could not be determined from a describe response.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RootVolumeError {
    #[error("describe response contains no reservations")]
    NoReservation,
    #[error("describe response contains no instances")]
    NoInstance,
    #[error("instance has no EBS-backed block device mapping")]
    NoEbsVolume,
}

impl DescribeInstancesOutput {
    /// Convenience constructor for a single instance with one root volume.
    pub fn single_volume(
        instance_id: impl Into<String>,
        device_name: impl Into<String>,
        volume_id: impl Into<String>,
    ) -> Self {
        let device_name = device_name.into();
        Self {
            reservations: vec![Reservation {
                instances: vec![InstanceDescription {
                    instance_id: Some(instance_id.into()),
                    root_device_name: Some(device_name.clone()),
                    block_device_mappings: vec![BlockDeviceMapping {
                        device_name: Some(device_name),
                        ebs: Some(EbsBlockDevice {
                            volume_id: Some(volume_id.into()),
                        }),
                    }],
                }],
            }],
        }
    }

    /// Identify the primary storage volume of the first described instance.
    ///
    /// Uses the mapping whose device matches the reported root device. When no
    /// mapping carries that device name (or none is reported) the first
    /// EBS-backed mapping is taken.
    pub fn root_volume_id(&self) -> Result<&str, RootVolumeError> {
        let reservation = self
            .reservations
            .first()
            .ok_or(RootVolumeError::NoReservation)?;
        let instance = reservation
            .instances
            .first()
            .ok_or(RootVolumeError::NoInstance)?;

        let root_mapping = instance.root_device_name.as_deref().and_then(|root| {
            instance
                .block_device_mappings
                .iter()
                .find(|m| m.device_name.as_deref() == Some(root))
        });

        match root_mapping {
            Some(mapping) => ebs_volume_id(mapping).ok_or(RootVolumeError::NoEbsVolume),
            None => instance
                .block_device_mappings
                .iter()
                .find_map(ebs_volume_id)
                .ok_or(RootVolumeError::NoEbsVolume),
        }
    }
}

fn ebs_volume_id(mapping: &BlockDeviceMapping) -> Option<&str> {
    mapping
        .ebs
        .as_ref()
        .and_then(|ebs| ebs.volume_id.as_deref())
        .filter(|id| !id.is_empty())
}

/// Network-callable operations against the compute, snapshot and
/// notification backends.
///
/// Timeouts and retries are the implementation's concern; the workflow calls
/// each operation once and treats any error as final.
#[async_trait]
pub trait ResourceGateway: Send + Sync {
    /// Replace the network-group membership of a resource.
    async fn modify_network_membership(
        &self,
        resource_id: &str,
        groups: &[String],
    ) -> Result<(), GatewayError>;

    /// Describe a resource, including its block-device mappings.
    async fn describe_resource(
        &self,
        resource_id: &str,
    ) -> Result<DescribeInstancesOutput, GatewayError>;

    /// Request a snapshot of a volume; returns the snapshot identifier.
    async fn create_snapshot(
        &self,
        volume_id: &str,
        description: &str,
    ) -> Result<String, GatewayError>;

    /// Terminate a resource.
    async fn terminate_resource(&self, resource_id: &str) -> Result<(), GatewayError>;

    /// List the tags on a resource whose key equals `key`.
    async fn describe_tags(
        &self,
        resource_id: &str,
        key: &str,
    ) -> Result<Vec<ResourceTag>, GatewayError>;

    /// Attach tags to a resource, overwriting existing values for the same keys.
    async fn create_tags(&self, resource_id: &str, tags: &[ResourceTag])
    -> Result<(), GatewayError>;

    /// Remove tags from a resource by key.
    async fn delete_tags(&self, resource_id: &str, keys: &[String]) -> Result<(), GatewayError>;

    /// Publish a message to a notification channel.
    async fn publish_message(
        &self,
        channel: &str,
        subject: &str,
        body: &str,
    ) -> Result<(), GatewayError>;
}
