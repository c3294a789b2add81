//! # Imagesmith
//!
//! A step-based machine image builder for cloud compute instances.
//!
//! A build boots a temporary instance, provisions it over SSH, captures its
//! disk as an image and tears the instance down again. Each of those is a
//! [`Step`](step::Step) with a `run` and a `cleanup` operation; the
//! [`Runner`](runner::Runner) executes them in order and, when a step halts
//! or the build is cancelled, cleans up everything already started in
//! reverse order.
//!
//! - **Typed state bag**: steps exchange artifacts only through [`state::StateBag`]
//! - **Cooperative cancellation**: one [`CancellationToken`](cancellation::CancellationToken) per build
//! - **Key handling**: temporary RSA keys and legacy encrypted PEM key files
//! - **Pluggable providers**: the cloud API, provisioner and UI are traits in [`ports`]
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use imagesmith::prelude::*;
//! use std::sync::Arc;
//!
//! let config = Config::from_file("build.json")?;
//! let builder = Builder::new(config)?;
//!
//! let cancel = Arc::new(CancellationToken::new());
//! cancel.cancel_on_interrupt();
//!
//! if let Some(artifact) = builder.run(driver, ui, provisioner, &cancel).await? {
//!     println!("{artifact}");
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod builder;
pub mod cancellation;
pub mod config;
pub mod errors;
pub mod events;
pub mod keys;
pub mod observability;
pub mod ports;
pub mod runner;
pub mod state;
pub mod step;
pub mod steps;
pub mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::builder::{Artifact, Builder};
    pub use crate::cancellation::CancellationToken;
    pub use crate::config::Config;
    pub use crate::errors::{BuildError, ErrorCategory, KeyFileError};
    pub use crate::events::{EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::ports::{Driver, Provisioner, SshConnection, TracingUi, Ui};
    pub use crate::runner::{RunOutcome, RunReport, Runner};
    pub use crate::state::{keys, StateBag, StateKey};
    pub use crate::step::{Step, StepAction};
}
