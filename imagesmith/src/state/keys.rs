//! Well-known state bag keys.
//!
//! These names are the contract between steps: a step only needs to know
//! the keys it reads and writes, never another step's internals.

use super::StateKey;
use crate::config::Config;
use crate::errors::BuildError;
use crate::ports::{Driver, Provisioner, Ui};
use std::sync::Arc;

/// Output sink for user-facing messages.
pub const UI: StateKey<Arc<dyn Ui>> = StateKey::new("ui");

/// The fatal error of the build, written before a step halts.
pub const ERROR: StateKey<Arc<BuildError>> = StateKey::new("error");

/// PEM-encoded private key used to reach the instance.
pub const SSH_PRIVATE_KEY: StateKey<String> = StateKey::new("ssh_private_key");

/// Authorized-key encoded public key installed on the instance.
pub const SSH_PUBLIC_KEY: StateKey<String> = StateKey::new("ssh_public_key");

/// The validated builder configuration.
pub const CONFIG: StateKey<Arc<Config>> = StateKey::new("config");

/// The cloud driver.
pub const DRIVER: StateKey<Arc<dyn Driver>> = StateKey::new("driver");

/// The provisioner run against the instance.
pub const PROVISIONER: StateKey<Arc<dyn Provisioner>> = StateKey::new("provisioner");

/// Name of the temporary instance, once created.
pub const INSTANCE_NAME: StateKey<String> = StateKey::new("instance_name");

/// Reachable address of the temporary instance.
pub const INSTANCE_IP: StateKey<String> = StateKey::new("instance_ip");

/// Set once the temporary instance has been deleted.
pub const INSTANCE_DELETED: StateKey<bool> = StateKey::new("instance_deleted");

/// Name of the captured image.
pub const IMAGE_NAME: StateKey<String> = StateKey::new("image_name");

/// Set by the runner when the build was cancelled.
pub const CANCELLED: StateKey<bool> = StateKey::new("cancelled");

/// Set by the runner when a step halted the build.
pub const HALTED: StateKey<bool> = StateKey::new("halted");
