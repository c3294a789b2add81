use async_trait::async_trait;
use tracing::info;

use super::{cloud, wait_for};
use crate::cancellation::CancellationToken;
use crate::errors::BuildError;
use crate::ports::TracingUi;
use crate::state::{keys, StateBag};
use crate::step::{halt, Step, StepAction};

/// Looks up the instance's reachable IP and stores it under `instance_ip`.
#[derive(Debug, Clone, Copy, Default)]
pub struct InstanceInfo;

impl InstanceInfo {
    async fn resolve(state: &StateBag, cancel: &CancellationToken) -> Result<String, BuildError> {
        let (config, driver) = cloud(state)?;
        let name = state.require(keys::INSTANCE_NAME)?;

        TracingUi::from_state(state).say("Waiting for the instance to report its IP address...");
        wait_for(
            "instance IP",
            config.state_timeout(),
            cancel,
            driver.instance_ip(&config.zone, &name),
        )
        .await
    }
}

#[async_trait]
impl Step for InstanceInfo {
    fn name(&self) -> &str {
        "instance_info"
    }

    async fn run(&self, state: &StateBag, cancel: &CancellationToken) -> StepAction {
        match Self::resolve(state, cancel).await {
            Ok(ip) => {
                info!(ip = %ip, "Resolved instance address");
                TracingUi::from_state(state).message(&format!("IP: {ip}"));
                state.put(keys::INSTANCE_IP, ip);
                StepAction::Continue
            }
            Err(err) => halt(state, err),
        }
    }
}
