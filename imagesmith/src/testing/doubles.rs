//! In-memory implementations of the external ports.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::time::Duration;

use crate::cancellation::CancellationToken;
use crate::ports::{
    Driver, ImageConfig, InstanceConfig, InstanceStatus, Provisioner, SshConnection, Ui,
};

/// A cloud driver that keeps instances and images in memory.
///
/// Every call is recorded as `<operation>:<name>`. Any operation can be made
/// to fail with [`fail_on`](Self::fail_on).
#[derive(Debug)]
pub struct InMemoryDriver {
    ip: String,
    calls: Mutex<Vec<String>>,
    failures: Mutex<HashMap<String, String>>,
    wait_delay: Mutex<Option<Duration>>,
    instances: Mutex<BTreeMap<String, InstanceConfig>>,
    images: Mutex<BTreeSet<String>>,
}

impl Default for InMemoryDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryDriver {
    /// Creates a driver whose instances report `10.0.0.2`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            ip: "10.0.0.2".to_string(),
            calls: Mutex::new(Vec::new()),
            failures: Mutex::new(HashMap::new()),
            wait_delay: Mutex::new(None),
            instances: Mutex::new(BTreeMap::new()),
            images: Mutex::new(BTreeSet::new()),
        }
    }

    /// Makes `operation` (e.g. `"create_image"`) fail with `message`.
    pub fn fail_on(&self, operation: &str, message: impl Into<String>) {
        self.failures.lock().insert(operation.to_string(), message.into());
    }

    /// Delays every `wait_for_instance` and `wait_for_image` call.
    pub fn set_wait_delay(&self, delay: Duration) {
        *self.wait_delay.lock() = Some(delay);
    }

    /// Returns the recorded calls, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    /// Returns true if `operation` was called at least once.
    #[must_use]
    pub fn was_called(&self, operation: &str) -> bool {
        let prefix = format!("{operation}:");
        self.calls.lock().iter().any(|c| c.starts_with(&prefix))
    }

    /// Returns the names of live instances.
    #[must_use]
    pub fn instances(&self) -> Vec<String> {
        self.instances.lock().keys().cloned().collect()
    }

    /// Returns the configuration an instance was created with.
    #[must_use]
    pub fn instance_config(&self, name: &str) -> Option<InstanceConfig> {
        self.instances.lock().get(name).cloned()
    }

    /// Returns the names of existing images.
    #[must_use]
    pub fn images(&self) -> Vec<String> {
        self.images.lock().iter().cloned().collect()
    }

    async fn delay(&self) {
        let delay = *self.wait_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }

    fn record(&self, operation: &str, name: &str) -> anyhow::Result<()> {
        self.calls.lock().push(format!("{operation}:{name}"));
        match self.failures.lock().get(operation) {
            Some(message) => Err(anyhow::anyhow!("{message}")),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl Driver for InMemoryDriver {
    async fn create_instance(&self, config: &InstanceConfig) -> anyhow::Result<()> {
        self.record("create_instance", &config.name)?;
        self.instances.lock().insert(config.name.clone(), config.clone());
        Ok(())
    }

    async fn wait_for_instance(&self, _zone: &str, name: &str, status: InstanceStatus) -> anyhow::Result<()> {
        self.record("wait_for_instance", name)?;
        self.delay().await;
        if !self.instances.lock().contains_key(name) {
            anyhow::bail!("instance {name} not found while waiting for {status}");
        }
        Ok(())
    }

    async fn instance_ip(&self, _zone: &str, name: &str) -> anyhow::Result<String> {
        self.record("instance_ip", name)?;
        if !self.instances.lock().contains_key(name) {
            anyhow::bail!("instance {name} not found");
        }
        Ok(self.ip.clone())
    }

    async fn delete_instance(&self, _zone: &str, name: &str) -> anyhow::Result<()> {
        self.record("delete_instance", name)?;
        self.instances.lock().remove(name);
        Ok(())
    }

    async fn create_image(&self, config: &ImageConfig) -> anyhow::Result<()> {
        self.record("create_image", &config.name)?;
        if !self.instances.lock().contains_key(&config.source_instance) {
            anyhow::bail!("source instance {} not found", config.source_instance);
        }
        self.images.lock().insert(config.name.clone());
        Ok(())
    }

    async fn wait_for_image(&self, name: &str) -> anyhow::Result<()> {
        self.record("wait_for_image", name)?;
        self.delay().await;
        if !self.images.lock().contains(name) {
            anyhow::bail!("image {name} not found");
        }
        Ok(())
    }

    async fn delete_image(&self, name: &str) -> anyhow::Result<()> {
        self.record("delete_image", name)?;
        self.images.lock().remove(name);
        Ok(())
    }
}

/// Severity of a collected UI message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiLevel {
    /// From [`Ui::say`].
    Say,
    /// From [`Ui::message`].
    Message,
    /// From [`Ui::error`].
    Error,
}

/// A [`Ui`] that keeps every message.
#[derive(Debug, Default)]
pub struct CollectingUi {
    messages: Mutex<Vec<(UiLevel, String)>>,
}

impl CollectingUi {
    /// Creates an empty collecting UI.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all messages, in order.
    #[must_use]
    pub fn messages(&self) -> Vec<(UiLevel, String)> {
        self.messages.lock().clone()
    }

    /// Returns the messages of one level.
    #[must_use]
    pub fn of_level(&self, level: UiLevel) -> Vec<String> {
        self.messages
            .lock()
            .iter()
            .filter(|(l, _)| *l == level)
            .map(|(_, m)| m.clone())
            .collect()
    }

    /// Returns the error messages.
    #[must_use]
    pub fn errors(&self) -> Vec<String> {
        self.of_level(UiLevel::Error)
    }

    fn push(&self, level: UiLevel, message: &str) {
        self.messages.lock().push((level, message.to_string()));
    }
}

impl Ui for CollectingUi {
    fn say(&self, message: &str) {
        self.push(UiLevel::Say, message);
    }

    fn message(&self, message: &str) {
        self.push(UiLevel::Message, message);
    }

    fn error(&self, message: &str) {
        self.push(UiLevel::Error, message);
    }
}

/// A provisioner that records the connections it was given.
#[derive(Debug, Default)]
pub struct RecordingProvisioner {
    connections: Mutex<Vec<SshConnection>>,
    connect_error: Option<String>,
    provision_error: Option<String>,
    cancel_reason: Option<String>,
}

impl RecordingProvisioner {
    /// Creates a provisioner that succeeds.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a provisioner whose `provision` fails with `message`.
    #[must_use]
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            provision_error: Some(message.into()),
            ..Self::default()
        }
    }

    /// Creates a provisioner that never manages to connect.
    #[must_use]
    pub fn unreachable(message: impl Into<String>) -> Self {
        Self {
            connect_error: Some(message.into()),
            ..Self::default()
        }
    }

    /// Creates a provisioner that cancels the build while provisioning.
    #[must_use]
    pub fn cancelling(reason: impl Into<String>) -> Self {
        Self {
            cancel_reason: Some(reason.into()),
            ..Self::default()
        }
    }

    /// Returns the connections `provision` was called with.
    #[must_use]
    pub fn connections(&self) -> Vec<SshConnection> {
        self.connections.lock().clone()
    }
}

#[async_trait]
impl Provisioner for RecordingProvisioner {
    async fn connect(&self, _connection: &SshConnection) -> anyhow::Result<()> {
        match &self.connect_error {
            Some(message) => Err(anyhow::anyhow!("{message}")),
            None => Ok(()),
        }
    }

    async fn provision(
        &self,
        ui: &dyn Ui,
        connection: &SshConnection,
        cancel: &CancellationToken,
    ) -> anyhow::Result<()> {
        self.connections.lock().push(connection.clone());
        ui.message(&format!("provisioning {}", connection.address()));
        if let Some(reason) = &self.cancel_reason {
            cancel.cancel(reason.clone());
        }
        match &self.provision_error {
            Some(message) => Err(anyhow::anyhow!("{message}")),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instance(name: &str) -> InstanceConfig {
        InstanceConfig {
            name: name.to_string(),
            zone: "us-central1-a".to_string(),
            machine_type: "n1-standard-1".to_string(),
            source_image: "debian-12".to_string(),
            network: "default".to_string(),
            disk_size_gb: 10,
            tags: Vec::new(),
            metadata: BTreeMap::new(),
            description: String::new(),
        }
    }

    #[tokio::test]
    async fn test_driver_tracks_instances_and_images() {
        let driver = InMemoryDriver::new();
        driver.create_instance(&instance("vm")).await.unwrap();
        driver
            .wait_for_instance("us-central1-a", "vm", InstanceStatus::Running)
            .await
            .unwrap();
        assert_eq!(driver.instance_ip("us-central1-a", "vm").await.unwrap(), "10.0.0.2");

        driver
            .create_image(&ImageConfig {
                name: "img".into(),
                description: String::new(),
                zone: "us-central1-a".into(),
                source_instance: "vm".into(),
            })
            .await
            .unwrap();
        driver.delete_instance("us-central1-a", "vm").await.unwrap();

        assert!(driver.instances().is_empty());
        assert_eq!(driver.images(), vec!["img"]);
        assert!(driver.was_called("wait_for_instance"));
    }

    #[tokio::test]
    async fn test_driver_failure_injection() {
        let driver = InMemoryDriver::new();
        driver.fail_on("create_instance", "quota exceeded");
        let err = driver.create_instance(&instance("vm")).await.unwrap_err();
        assert_eq!(err.to_string(), "quota exceeded");
        assert_eq!(driver.calls(), vec!["create_instance:vm"]);
    }

    #[test]
    fn test_collecting_ui() {
        let ui = CollectingUi::new();
        ui.say("one");
        ui.error("two");
        assert_eq!(ui.messages().len(), 2);
        assert_eq!(ui.errors(), vec!["two"]);
    }
}
