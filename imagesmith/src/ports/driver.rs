//! Cloud compute driver port.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Lifecycle status of a compute instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InstanceStatus {
    /// Resources are being allocated.
    Provisioning,
    /// The instance is booting.
    Staging,
    /// The instance is up.
    Running,
    /// The instance is shutting down.
    Stopping,
    /// The instance is stopped.
    Terminated,
}

impl fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Provisioning => write!(f, "PROVISIONING"),
            Self::Staging => write!(f, "STAGING"),
            Self::Running => write!(f, "RUNNING"),
            Self::Stopping => write!(f, "STOPPING"),
            Self::Terminated => write!(f, "TERMINATED"),
        }
    }
}

/// Everything the driver needs to create the temporary instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceConfig {
    /// Instance name.
    pub name: String,
    /// Zone to create the instance in.
    pub zone: String,
    /// Machine type, e.g. `n1-standard-1`.
    pub machine_type: String,
    /// Image the boot disk is created from.
    pub source_image: String,
    /// Network to attach to.
    pub network: String,
    /// Boot disk size in GB.
    pub disk_size_gb: u32,
    /// Network tags.
    pub tags: Vec<String>,
    /// Instance metadata, including the `sshKeys` entry.
    pub metadata: BTreeMap<String, String>,
    /// Free-form description.
    pub description: String,
}

/// Everything the driver needs to capture an image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageConfig {
    /// Image name.
    pub name: String,
    /// Image description.
    pub description: String,
    /// Zone of the source instance.
    pub zone: String,
    /// Instance whose boot disk is captured.
    pub source_instance: String,
}

/// Client for the cloud provider's compute API.
///
/// Methods that start an operation return once the provider accepted it;
/// the `wait_*` methods block until the operation has settled. Steps bound
/// every wait with the configured state timeout.
#[async_trait]
pub trait Driver: Send + Sync {
    /// Requests creation of an instance.
    async fn create_instance(&self, config: &InstanceConfig) -> anyhow::Result<()>;

    /// Waits until the instance reaches `status`.
    async fn wait_for_instance(&self, zone: &str, name: &str, status: InstanceStatus) -> anyhow::Result<()>;

    /// Returns the externally reachable IP of the instance.
    async fn instance_ip(&self, zone: &str, name: &str) -> anyhow::Result<String>;

    /// Deletes the instance and waits for the deletion to finish.
    async fn delete_instance(&self, zone: &str, name: &str) -> anyhow::Result<()>;

    /// Requests an image of the source instance's boot disk.
    async fn create_image(&self, config: &ImageConfig) -> anyhow::Result<()>;

    /// Waits until the image is ready.
    async fn wait_for_image(&self, name: &str) -> anyhow::Result<()>;

    /// Deletes an image.
    async fn delete_image(&self, name: &str) -> anyhow::Result<()>;
}
