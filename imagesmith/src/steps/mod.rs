//! Provider steps for building an image on a cloud compute instance.
//!
//! The builder runs them in this order:
//!
//! 1. [`CreateSshKey`] or [`UseSshKey`]
//! 2. [`CreateInstance`]
//! 3. [`InstanceInfo`]
//! 4. [`Provision`]
//! 5. [`CreateImage`]
//! 6. [`TeardownInstance`]

mod create_image;
mod create_instance;
mod create_ssh_key;
mod instance_info;
mod provision;
mod teardown_instance;
mod use_ssh_key;

pub use create_image::CreateImage;
pub use create_instance::CreateInstance;
pub use create_ssh_key::CreateSshKey;
pub use instance_info::InstanceInfo;
pub use provision::Provision;
pub use teardown_instance::TeardownInstance;
pub use use_ssh_key::UseSshKey;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::cancellation::CancellationToken;
use crate::config::Config;
use crate::errors::BuildError;
use crate::ports::Driver;
use crate::state::{keys, StateBag};

/// Reads the configuration and driver every cloud step needs.
pub(crate) fn cloud(state: &StateBag) -> Result<(Arc<Config>, Arc<dyn Driver>), BuildError> {
    Ok((state.require(keys::CONFIG)?, state.require(keys::DRIVER)?))
}

/// Awaits a provider operation, bounded by `timeout` and by `cancel`.
///
/// # Errors
///
/// - [`BuildError::Cancelled`] if the token fires first,
/// - [`BuildError::Timeout`] if `timeout` elapses first,
/// - [`BuildError::Driver`] if the operation itself fails.
pub(crate) async fn wait_for<T, F>(
    operation: &str,
    timeout: Duration,
    cancel: &CancellationToken,
    fut: F,
) -> Result<T, BuildError>
where
    F: Future<Output = anyhow::Result<T>>,
{
    tokio::select! {
        () = cancel.cancelled() => Err(BuildError::Cancelled(
            cancel.reason().unwrap_or_else(|| format!("cancelled during {operation}")),
        )),
        result = tokio::time::timeout(timeout, fut) => match result {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(cause)) => Err(BuildError::driver(operation, cause)),
            Err(_) => Err(BuildError::Timeout {
                operation: operation.to_string(),
                seconds: timeout.as_secs(),
            }),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_wait_for_passes_value_through() {
        let token = CancellationToken::new();
        let value = wait_for("instance IP", Duration::from_secs(1), &token, async { Ok(7) })
            .await
            .unwrap();
        assert_eq!(value, 7);
    }

    #[tokio::test]
    async fn test_wait_for_wraps_driver_error() {
        let token = CancellationToken::new();
        let err = wait_for::<(), _>("create instance", Duration::from_secs(1), &token, async {
            Err(anyhow::anyhow!("quota exceeded"))
        })
        .await
        .unwrap_err();
        assert_eq!(err.to_string(), "create instance failed: quota exceeded");
    }

    #[tokio::test]
    async fn test_wait_for_times_out() {
        let token = CancellationToken::new();
        let err = wait_for::<(), _>("instance to start", Duration::from_millis(20), &token, async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await
        .unwrap_err();
        assert!(matches!(err, BuildError::Timeout { .. }));
    }

    #[tokio::test]
    async fn test_wait_for_observes_cancellation() {
        let token = Arc::new(CancellationToken::new());
        let canceller = Arc::clone(&token);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel("interrupted");
        });

        let err = wait_for::<(), _>("instance to start", Duration::from_secs(5), &token, async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await
        .unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(err.to_string(), "build cancelled: interrupted");
    }

    #[test]
    fn test_cloud_requires_config_and_driver() {
        let Err(err) = cloud(&StateBag::new()) else {
            panic!("expected missing state");
        };
        assert!(matches!(err, BuildError::MissingState { ref key } if key == "config"));
    }
}
