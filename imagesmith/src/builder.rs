//! Builder: validates configuration, assembles the steps, runs them, and
//! hands back the image.

use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

use crate::cancellation::CancellationToken;
use crate::config::Config;
use crate::errors::BuildError;
use crate::events::EventSink;
use crate::ports::{Driver, Provisioner, Ui};
use crate::runner::{RunOutcome, Runner};
use crate::state::{keys, StateBag};
use crate::step::Step;
use crate::steps::{
    CreateImage, CreateInstance, CreateSshKey, InstanceInfo, Provision, TeardownInstance, UseSshKey,
};

/// Identifies artifacts produced by this builder.
pub const BUILDER_ID: &str = "imagesmith.googlecompute";

/// The disk image a successful build produced.
#[derive(Clone)]
pub struct Artifact {
    image_name: String,
    project_id: String,
    driver: Arc<dyn Driver>,
}

impl Artifact {
    /// Returns the builder that produced this artifact.
    #[must_use]
    pub const fn builder_id(&self) -> &'static str {
        BUILDER_ID
    }

    /// Returns the image name.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.image_name
    }

    /// Returns the project the image lives in.
    #[must_use]
    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    /// Deletes the image.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::Driver`] if the driver fails.
    pub async fn destroy(&self) -> Result<(), BuildError> {
        info!(image = %self.image_name, "Destroying image");
        self.driver
            .delete_image(&self.image_name)
            .await
            .map_err(|cause| BuildError::driver("delete image", cause))
    }
}

impl fmt::Display for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "A disk image was created: {}", self.image_name)
    }
}

impl fmt::Debug for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Artifact")
            .field("image_name", &self.image_name)
            .field("project_id", &self.project_id)
            .finish_non_exhaustive()
    }
}

/// Builds a machine image from a validated configuration.
pub struct Builder {
    config: Arc<Config>,
    event_sink: Option<Arc<dyn EventSink>>,
}

impl fmt::Debug for Builder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Builder")
            .field("project_id", &self.config.project_id)
            .field("image_name", &self.config.image_name)
            .finish_non_exhaustive()
    }
}

impl Builder {
    /// Prepares `config` and creates a builder.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::Config`] listing every validation failure.
    pub fn new(mut config: Config) -> Result<Self, BuildError> {
        config.prepare()?;
        Ok(Self {
            config: Arc::new(config),
            event_sink: None,
        })
    }

    /// Reports runner events to `sink` instead of the process-wide sink.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.event_sink = Some(sink);
        self
    }

    /// Returns the prepared configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns the steps of a build, in order.
    #[must_use]
    pub fn steps(&self) -> Vec<Arc<dyn Step>> {
        let key_step: Arc<dyn Step> = match self.config.private_key() {
            Some(private_key) => Arc::new(UseSshKey::new(private_key)),
            None => Arc::new(CreateSshKey::new(self.config.ssh_key_bits)),
        };
        vec![
            key_step,
            Arc::new(CreateInstance),
            Arc::new(InstanceInfo),
            Arc::new(Provision),
            Arc::new(CreateImage),
            Arc::new(TeardownInstance),
        ]
    }

    fn seed_state(
        &self,
        driver: Arc<dyn Driver>,
        ui: Arc<dyn Ui>,
        provisioner: Arc<dyn Provisioner>,
    ) -> StateBag {
        let state = StateBag::new();
        state.put(keys::CONFIG, Arc::clone(&self.config));
        state.put(keys::DRIVER, driver);
        state.put(keys::UI, ui);
        state.put(keys::PROVISIONER, provisioner);
        state
    }

    /// Runs one build.
    ///
    /// Returns `Ok(None)` if the build completed without producing an image.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::Cancelled`] if `cancel` fired, otherwise the
    /// error of the step that halted the build, unchanged.
    pub async fn run(
        &self,
        driver: Arc<dyn Driver>,
        ui: Arc<dyn Ui>,
        provisioner: Arc<dyn Provisioner>,
        cancel: &CancellationToken,
    ) -> Result<Option<Artifact>, BuildError> {
        let state = self.seed_state(Arc::clone(&driver), ui, provisioner);
        let mut runner = Runner::new(self.steps());
        if let Some(sink) = &self.event_sink {
            runner = runner.with_event_sink(Arc::clone(sink));
        }

        let report = runner.run(&state, cancel).await?;
        for failure in &report.cleanup_failures {
            warn!(step = %failure.step, error = %failure.message, "Resource may need manual cleanup");
        }

        if report.outcome == RunOutcome::Cancelled {
            return Err(BuildError::Cancelled(
                cancel.reason().unwrap_or_else(|| "build was cancelled".to_string()),
            ));
        }

        if let Some(err) = state.take(keys::ERROR) {
            drop(state);
            return Err(Arc::try_unwrap(err).unwrap_or_else(|shared| BuildError::Internal(shared.to_string())));
        }

        Ok(state.get(keys::IMAGE_NAME).map(|image_name| Artifact {
            image_name,
            project_id: self.config.project_id.clone(),
            driver,
        }))
    }
}
