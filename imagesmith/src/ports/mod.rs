//! Ports - capabilities injected into build steps.
//!
//! The cloud API client, the console, and the provisioning transport are
//! external collaborators. Steps reach them only through these traits,
//! which the builder places into the state bag.

mod driver;
mod provisioner;
mod ui;

pub use driver::{Driver, ImageConfig, InstanceConfig, InstanceStatus};
pub use provisioner::{Provisioner, SshConnection};
pub use ui::{TracingUi, Ui};
