use async_trait::async_trait;
use std::fmt;

use crate::cancellation::CancellationToken;
use crate::keys::public_key_from_private_pem;
use crate::ports::TracingUi;
use crate::state::{keys, StateBag};
use crate::step::{halt, Step, StepAction};

/// Uses a private key loaded from the configured key file.
///
/// Stores the key and its derived authorized-key line under the same keys
/// as [`CreateSshKey`](super::CreateSshKey).
#[derive(Clone)]
pub struct UseSshKey {
    private_key: String,
}

impl UseSshKey {
    /// Creates the step for an unencrypted PEM private key.
    #[must_use]
    pub fn new(private_key: impl Into<String>) -> Self {
        Self {
            private_key: private_key.into(),
        }
    }
}

impl fmt::Debug for UseSshKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UseSshKey").field("private_key", &"<redacted>").finish()
    }
}

#[async_trait]
impl Step for UseSshKey {
    fn name(&self) -> &str {
        "use_ssh_key"
    }

    async fn run(&self, state: &StateBag, _cancel: &CancellationToken) -> StepAction {
        TracingUi::from_state(state).say("Using configured ssh key for instance...");

        match public_key_from_private_pem(&self.private_key) {
            Ok(public_key) => {
                state.put(keys::SSH_PRIVATE_KEY, self.private_key.clone());
                state.put(keys::SSH_PUBLIC_KEY, public_key);
                StepAction::Continue
            }
            Err(err) => halt(state, err),
        }
    }
}
