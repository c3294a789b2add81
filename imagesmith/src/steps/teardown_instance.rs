use async_trait::async_trait;
use tracing::info;

use super::{cloud, wait_for};
use crate::cancellation::CancellationToken;
use crate::errors::BuildError;
use crate::ports::TracingUi;
use crate::state::{keys, StateBag};
use crate::step::{halt, Step, StepAction};

/// Deletes the temporary instance once the image is captured.
#[derive(Debug, Clone, Copy, Default)]
pub struct TeardownInstance;

impl TeardownInstance {
    async fn teardown(state: &StateBag, cancel: &CancellationToken) -> Result<(), BuildError> {
        let (config, driver) = cloud(state)?;
        let name = state.require(keys::INSTANCE_NAME)?;
        let ui = TracingUi::from_state(state);

        ui.say("Deleting instance...");
        wait_for(
            "instance deletion",
            config.state_timeout(),
            cancel,
            driver.delete_instance(&config.zone, &name),
        )
        .await?;
        state.put(keys::INSTANCE_DELETED, true);
        info!(instance = %name, "Instance deleted");
        ui.message("Instance has been deleted!");
        Ok(())
    }
}

#[async_trait]
impl Step for TeardownInstance {
    fn name(&self) -> &str {
        "teardown_instance"
    }

    async fn run(&self, state: &StateBag, cancel: &CancellationToken) -> StepAction {
        match Self::teardown(state, cancel).await {
            Ok(()) => StepAction::Continue,
            Err(err) => halt(state, err),
        }
    }
}
