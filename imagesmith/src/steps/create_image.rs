use async_trait::async_trait;
use tracing::{info, warn};

use super::{cloud, wait_for};
use crate::cancellation::CancellationToken;
use crate::errors::BuildError;
use crate::ports::{ImageConfig, TracingUi};
use crate::state::{keys, StateBag};
use crate::step::{halt, Step, StepAction};

/// Captures an image of the instance's disk.
///
/// The image is only useful if the whole build succeeds, so cleanup deletes
/// it when a later step halts or the build is cancelled.
#[derive(Debug, Clone, Copy, Default)]
pub struct CreateImage;

impl CreateImage {
    async fn create(state: &StateBag, cancel: &CancellationToken) -> Result<(), BuildError> {
        let (config, driver) = cloud(state)?;
        let instance = state.require(keys::INSTANCE_NAME)?;
        let image = ImageConfig {
            name: config.image_name.clone(),
            description: config.image_description.clone(),
            zone: config.zone.clone(),
            source_instance: instance,
        };

        TracingUi::from_state(state).say(&format!("Creating image {}...", image.name));
        driver
            .create_image(&image)
            .await
            .map_err(|cause| BuildError::driver("image creation", cause))?;
        // The provider may finish the image even if the wait below fails.
        state.put(keys::IMAGE_NAME, image.name.clone());

        wait_for("image creation", config.state_timeout(), cancel, driver.wait_for_image(&image.name)).await?;
        info!(image = %image.name, "Image created");
        Ok(())
    }
}

#[async_trait]
impl Step for CreateImage {
    fn name(&self) -> &str {
        "create_image"
    }

    async fn run(&self, state: &StateBag, cancel: &CancellationToken) -> StepAction {
        match Self::create(state, cancel).await {
            Ok(()) => StepAction::Continue,
            Err(err) => halt(state, err),
        }
    }

    async fn cleanup(&self, state: &StateBag) -> Result<(), BuildError> {
        let Some(name) = state.get(keys::IMAGE_NAME) else {
            return Ok(());
        };

        let (_, driver) = cloud(state)?;
        let ui = TracingUi::from_state(state);
        ui.say(&format!("Deleting image {name}..."));
        if let Err(cause) = driver.delete_image(&name).await {
            warn!(image = %name, error = %cause, "Failed to delete image");
            ui.error(&format!("Error deleting image. Please delete it manually.\n\nName: {name}"));
            return Err(BuildError::driver("delete image", cause));
        }
        state.remove(keys::IMAGE_NAME.name());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::{Driver, InstanceConfig};
    use crate::testing::TestBuild;
    use std::collections::BTreeMap;
    use std::time::Duration;

    async fn with_instance(build: &TestBuild) -> StateBag {
        build
            .driver
            .create_instance(&InstanceConfig {
                name: "test-instance".into(),
                zone: "us-central1-a".into(),
                machine_type: "n1-standard-1".into(),
                source_image: "debian-12".into(),
                network: "default".into(),
                disk_size_gb: 10,
                tags: Vec::new(),
                metadata: BTreeMap::new(),
                description: String::new(),
            })
            .await
            .unwrap();
        let state = build.state();
        state.put(keys::INSTANCE_NAME, "test-instance".to_string());
        state
    }

    #[tokio::test]
    async fn test_creates_image_and_records_name() {
        let build = TestBuild::new();
        let state = with_instance(&build).await;

        assert_eq!(CreateImage.run(&state, &CancellationToken::new()).await, StepAction::Continue);
        assert_eq!(state.get(keys::IMAGE_NAME).as_deref(), Some("test-image"));
        assert_eq!(build.driver.images(), vec!["test-image"]);
    }

    #[tokio::test]
    async fn test_cleanup_deletes_image() {
        let build = TestBuild::new();
        let state = with_instance(&build).await;
        CreateImage.run(&state, &CancellationToken::new()).await;

        CreateImage.cleanup(&state).await.unwrap();
        assert!(build.driver.images().is_empty());
        assert!(state.get(keys::IMAGE_NAME).is_none());

        // Idempotent.
        CreateImage.cleanup(&state).await.unwrap();
        assert_eq!(
            build.driver.calls().iter().filter(|c| c.starts_with("delete_image")).count(),
            1
        );
    }

    #[tokio::test]
    async fn test_slow_image_times_out_and_cleanup_deletes_it() {
        let build = TestBuild::new();
        build.driver.set_wait_delay(Duration::from_secs(30));
        let state = with_instance(&build).await;

        tokio::time::pause();
        assert_eq!(CreateImage.run(&state, &CancellationToken::new()).await, StepAction::Halt);
        assert!(matches!(*state.error().unwrap(), BuildError::Timeout { .. }));
        assert_eq!(state.get(keys::IMAGE_NAME).as_deref(), Some("test-image"));

        CreateImage.cleanup(&state).await.unwrap();
        assert!(build.driver.images().is_empty());
        assert!(build.driver.was_called("delete_image"));
    }

    #[tokio::test]
    async fn test_cancelled_wait_keeps_image_for_cleanup() {
        let build = TestBuild::new();
        build.driver.set_wait_delay(Duration::from_secs(30));
        let state = with_instance(&build).await;
        let cancel = CancellationToken::new();
        cancel.cancel("interrupted");

        assert_eq!(CreateImage.run(&state, &cancel).await, StepAction::Halt);
        assert!(state.error().unwrap().is_cancelled());

        CreateImage.cleanup(&state).await.unwrap();
        assert!(build.driver.images().is_empty());
    }

    #[tokio::test]
    async fn test_failure_halts_without_image_name() {
        let build = TestBuild::new();
        build.driver.fail_on("create_image", "disk busy");
        let state = with_instance(&build).await;

        assert_eq!(CreateImage.run(&state, &CancellationToken::new()).await, StepAction::Halt);
        assert!(state.get(keys::IMAGE_NAME).is_none());
        assert_eq!(
            state.error().unwrap().to_string(),
            "image creation failed: disk busy"
        );
    }
}
