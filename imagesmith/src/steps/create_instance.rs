use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::{cloud, wait_for};
use crate::cancellation::CancellationToken;
use crate::errors::BuildError;
use crate::ports::{InstanceConfig, InstanceStatus, TracingUi};
use crate::state::{keys, StateBag};
use crate::step::{halt, Step, StepAction};

/// Metadata key the guest agent reads authorized keys from.
pub const SSH_KEYS_METADATA: &str = "sshKeys";

/// Creates the temporary instance and waits for it to run.
///
/// Cleanup deletes the instance unless [`TeardownInstance`](super::TeardownInstance)
/// already did.
#[derive(Debug, Clone, Copy, Default)]
pub struct CreateInstance;

impl CreateInstance {
    fn instance_config(state: &StateBag) -> Result<InstanceConfig, BuildError> {
        let config = state.require(keys::CONFIG)?;
        let public_key = state.require(keys::SSH_PUBLIC_KEY)?;

        let mut metadata = config.metadata.clone();
        metadata.insert(
            SSH_KEYS_METADATA.to_string(),
            format!("{}:{}", config.ssh_username, public_key.trim_end()),
        );

        Ok(InstanceConfig {
            name: config.instance_name.clone(),
            zone: config.zone.clone(),
            machine_type: config.machine_type.clone(),
            source_image: config.source_image.clone(),
            network: config.network.clone(),
            disk_size_gb: config.disk_size_gb,
            tags: config.tags.clone(),
            metadata,
            description: "New instance created by imagesmith".to_string(),
        })
    }

    async fn create(state: &StateBag, cancel: &CancellationToken) -> Result<(), BuildError> {
        let (config, driver) = cloud(state)?;
        let instance = Self::instance_config(state)?;
        let ui = TracingUi::from_state(state);

        ui.say("Creating instance...");
        driver
            .create_instance(&instance)
            .await
            .map_err(|cause| BuildError::driver("create instance", cause))?;
        // Recorded before waiting so cleanup can still delete a stuck instance.
        state.put(keys::INSTANCE_NAME, instance.name.clone());

        ui.message("Waiting for creation operation to complete...");
        wait_for(
            "instance to start",
            config.state_timeout(),
            cancel,
            driver.wait_for_instance(&instance.zone, &instance.name, InstanceStatus::Running),
        )
        .await?;

        info!(instance = %instance.name, zone = %instance.zone, "Instance is running");
        ui.message("Instance has been created!");
        Ok(())
    }
}

#[async_trait]
impl Step for CreateInstance {
    fn name(&self) -> &str {
        "create_instance"
    }

    async fn run(&self, state: &StateBag, cancel: &CancellationToken) -> StepAction {
        match Self::create(state, cancel).await {
            Ok(()) => StepAction::Continue,
            Err(err) => halt(state, err),
        }
    }

    async fn cleanup(&self, state: &StateBag) -> Result<(), BuildError> {
        let Some(name) = state.get(keys::INSTANCE_NAME) else {
            return Ok(());
        };
        if state.is_set(keys::INSTANCE_DELETED) {
            debug!(instance = %name, "Instance already deleted");
            return Ok(());
        }

        let (config, driver) = cloud(state)?;
        let ui = TracingUi::from_state(state);
        ui.say("Deleting instance...");

        let result = tokio::time::timeout(config.state_timeout(), driver.delete_instance(&config.zone, &name))
            .await
            .map_err(|_| BuildError::Timeout {
                operation: "instance deletion".to_string(),
                seconds: config.state_timeout().as_secs(),
            })
            .and_then(|r| r.map_err(|cause| BuildError::driver("delete instance", cause)));

        match result {
            Ok(()) => {
                state.put(keys::INSTANCE_DELETED, true);
                ui.message("Instance has been deleted!");
                Ok(())
            }
            Err(err) => {
                warn!(instance = %name, error = %err, "Failed to delete instance");
                ui.error(&format!(
                    "Error deleting instance. Please delete it manually.\n\nName: {name}\nError: {err}"
                ));
                Err(err)
            }
        }
    }
}
