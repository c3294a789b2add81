use async_trait::async_trait;
use tracing::info;

use crate::cancellation::CancellationToken;
use crate::errors::BuildError;
use crate::ports::{SshConnection, TracingUi};
use crate::state::{keys, StateBag};
use crate::step::{halt, halt_if_cancelled, Step, StepAction};

/// Runs the configured provisioner against the instance over SSH.
#[derive(Debug, Clone, Copy, Default)]
pub struct Provision;

impl Provision {
    fn connection(state: &StateBag) -> Result<SshConnection, BuildError> {
        let config = state.require(keys::CONFIG)?;
        Ok(SshConnection {
            host: state.require(keys::INSTANCE_IP)?,
            port: config.ssh_port,
            username: config.ssh_username.clone(),
            private_key: state.require(keys::SSH_PRIVATE_KEY)?,
        })
    }

    async fn provision(state: &StateBag, cancel: &CancellationToken) -> Result<(), BuildError> {
        let config = state.require(keys::CONFIG)?;
        let provisioner = state.require(keys::PROVISIONER)?;
        let connection = Self::connection(state)?;
        let ui = TracingUi::from_state(state);

        ui.say(&format!("Waiting for SSH to become available on {}...", connection.address()));
        let ssh_timeout = config.ssh_timeout();
        tokio::select! {
            () = cancel.cancelled() => return Err(BuildError::Cancelled(
                cancel.reason().unwrap_or_else(|| "cancelled waiting for ssh".to_string()),
            )),
            result = tokio::time::timeout(ssh_timeout, provisioner.connect(&connection)) => match result {
                Ok(Ok(())) => {}
                Ok(Err(cause)) => return Err(BuildError::Provision { cause }),
                Err(_) => return Err(BuildError::Timeout {
                    operation: "ssh".to_string(),
                    seconds: ssh_timeout.as_secs(),
                }),
            },
        }

        ui.say("Provisioning instance...");
        provisioner
            .provision(ui.as_ref(), &connection, cancel)
            .await
            .map_err(|cause| BuildError::Provision { cause })?;
        info!(host = %connection.host, "Provisioning finished");
        Ok(())
    }
}

#[async_trait]
impl Step for Provision {
    fn name(&self) -> &str {
        "provision"
    }

    async fn run(&self, state: &StateBag, cancel: &CancellationToken) -> StepAction {
        if let Some(action) = halt_if_cancelled(state, cancel) {
            return action;
        }
        if let Err(err) = Self::provision(state, cancel).await {
            return halt(state, err);
        }
        halt_if_cancelled(state, cancel).unwrap_or(StepAction::Continue)
    }
}
