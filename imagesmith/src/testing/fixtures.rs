//! Test fixtures.

use std::sync::Arc;

use crate::config::Config;
use crate::ports::{Driver, Provisioner, Ui};
use crate::state::{keys, StateBag};

use super::doubles::{CollectingUi, InMemoryDriver, RecordingProvisioner};

/// A prepared configuration plus in-memory ports, ready to seed a bag.
#[derive(Debug, Clone)]
pub struct TestBuild {
    /// Prepared configuration, using small keys.
    pub config: Arc<Config>,
    /// In-memory driver.
    pub driver: Arc<InMemoryDriver>,
    /// Collecting UI.
    pub ui: Arc<CollectingUi>,
    /// Recording provisioner.
    pub provisioner: Arc<RecordingProvisioner>,
}

impl TestBuild {
    /// Creates a fixture with default test configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_provisioner(RecordingProvisioner::new())
    }

    /// Creates a fixture around a specific provisioner.
    #[must_use]
    pub fn with_provisioner(provisioner: RecordingProvisioner) -> Self {
        Self {
            config: Arc::new(Self::config()),
            driver: Arc::new(InMemoryDriver::new()),
            ui: Arc::new(CollectingUi::new()),
            provisioner: Arc::new(provisioner),
        }
    }

    /// Returns the unprepared configuration the fixture is built from.
    #[must_use]
    pub fn raw_config() -> Config {
        Config::new("test-project", "debian-12", "us-central1-a")
            .with_image_name("test-image")
            .with_instance_name("test-instance")
            .with_state_timeout("5s")
            .with_ssh_key_bits(1024)
    }

    fn config() -> Config {
        let mut config = Self::raw_config();
        // The raw configuration is statically valid.
        let _ = config.prepare();
        config
    }

    /// Creates a bag seeded with the configuration and ports.
    #[must_use]
    pub fn state(&self) -> StateBag {
        let state = StateBag::new();
        state.put(keys::CONFIG, Arc::clone(&self.config));
        state.put(keys::DRIVER, Arc::clone(&self.driver) as Arc<dyn Driver>);
        state.put(keys::UI, Arc::clone(&self.ui) as Arc<dyn Ui>);
        state.put(keys::PROVISIONER, Arc::clone(&self.provisioner) as Arc<dyn Provisioner>);
        state
    }
}

impl Default for TestBuild {
    fn default() -> Self {
        Self::new()
    }
}
