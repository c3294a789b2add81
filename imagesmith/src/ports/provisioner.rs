//! Provisioning port.
//!
//! A provisioner is simply an operation performed on the running instance
//! over SSH before the image is captured.

use crate::cancellation::CancellationToken;
use async_trait::async_trait;
use std::fmt;

use super::Ui;

/// How to reach the temporary instance.
#[derive(Clone, PartialEq, Eq)]
pub struct SshConnection {
    /// Host address.
    pub host: String,
    /// SSH port.
    pub port: u16,
    /// Login user.
    pub username: String,
    /// PEM-encoded private key.
    pub private_key: String,
}

impl SshConnection {
    /// Returns `host:port`.
    #[must_use]
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Debug for SshConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SshConnection")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("private_key", &"<redacted>")
            .finish()
    }
}

/// Runs provisioning against the instance.
#[async_trait]
pub trait Provisioner: Send + Sync {
    /// Waits until the instance accepts SSH connections.
    async fn connect(&self, _connection: &SshConnection) -> anyhow::Result<()> {
        Ok(())
    }

    /// Provisions the instance.
    ///
    /// Long provisioners should check `cancel` between commands.
    async fn provision(
        &self,
        ui: &dyn Ui,
        connection: &SshConnection,
        cancel: &CancellationToken,
    ) -> anyhow::Result<()>;
}
