//! Builder configuration.
//!
//! A [`Config`] is deserialized from JSON, then [`prepared`](Config::prepare):
//! defaults that depend on the moment of the build are filled in, every
//! field is validated, and a configured private key file is loaded.

mod duration;

pub use duration::parse_duration;

use crate::errors::{BuildError, KeyFileError};
use crate::keys::{self, DEFAULT_KEY_BITS};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;
use tracing::debug;

const MIN_KEY_BITS: usize = 1024;
const MAX_KEY_BITS: usize = 16384;

/// Configuration for a single image build.
#[derive(Clone, Serialize, Deserialize)]
pub struct Config {
    /// Project the instance and image live in.
    #[serde(default)]
    pub project_id: String,
    /// Image the temporary instance boots from.
    #[serde(default)]
    pub source_image: String,
    /// Zone the temporary instance runs in.
    #[serde(default)]
    pub zone: String,
    /// Name of the image to create. Defaults to `imagesmith-<unix time>`.
    #[serde(default)]
    pub image_name: String,
    /// Description of the image to create.
    #[serde(default = "default_image_description")]
    pub image_description: String,
    /// Name of the temporary instance. Defaults to `imagesmith-<uuid>`.
    #[serde(default)]
    pub instance_name: String,
    /// Machine type of the temporary instance.
    #[serde(default = "default_machine_type")]
    pub machine_type: String,
    /// Network the temporary instance attaches to.
    #[serde(default = "default_network")]
    pub network: String,
    /// Boot disk size in GB.
    #[serde(default = "default_disk_size_gb")]
    pub disk_size_gb: u32,
    /// Network tags for the temporary instance.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Extra instance metadata.
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    /// User to log in as.
    #[serde(default = "default_ssh_username")]
    pub ssh_username: String,
    /// SSH port.
    #[serde(default = "default_ssh_port")]
    pub ssh_port: u16,
    /// How long to wait for SSH, e.g. `5m`.
    #[serde(default = "default_timeout")]
    pub ssh_timeout: String,
    /// How long to wait for instance and image operations, e.g. `5m`.
    #[serde(default = "default_timeout")]
    pub state_timeout: String,
    /// Size of the temporary RSA key.
    #[serde(default = "default_ssh_key_bits")]
    pub ssh_key_bits: usize,
    /// Use this key instead of generating a temporary one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_key_file: Option<PathBuf>,
    /// Passphrase for an encrypted `private_key_file`.
    #[serde(default, skip_serializing)]
    pub passphrase: Option<String>,

    #[serde(skip)]
    ssh_timeout_parsed: Duration,
    #[serde(skip)]
    state_timeout_parsed: Duration,
    #[serde(skip)]
    loaded_private_key: Option<String>,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("project_id", &self.project_id)
            .field("source_image", &self.source_image)
            .field("zone", &self.zone)
            .field("image_name", &self.image_name)
            .field("image_description", &self.image_description)
            .field("instance_name", &self.instance_name)
            .field("machine_type", &self.machine_type)
            .field("network", &self.network)
            .field("disk_size_gb", &self.disk_size_gb)
            .field("tags", &self.tags)
            .field("metadata", &self.metadata)
            .field("ssh_username", &self.ssh_username)
            .field("ssh_port", &self.ssh_port)
            .field("ssh_timeout", &self.ssh_timeout)
            .field("state_timeout", &self.state_timeout)
            .field("ssh_key_bits", &self.ssh_key_bits)
            .field("private_key_file", &self.private_key_file)
            .field("passphrase", &self.passphrase.as_ref().map(|_| "<redacted>"))
            .field("private_key", &self.loaded_private_key.as_ref().map(|_| "<redacted>"))
            .finish_non_exhaustive()
    }
}

fn default_image_description() -> String {
    "Created by imagesmith".to_string()
}

fn default_machine_type() -> String {
    "n1-standard-1".to_string()
}

fn default_network() -> String {
    "default".to_string()
}

fn default_disk_size_gb() -> u32 {
    10
}

fn default_ssh_username() -> String {
    "root".to_string()
}

fn default_ssh_port() -> u16 {
    22
}

fn default_timeout() -> String {
    "5m".to_string()
}

fn default_ssh_key_bits() -> usize {
    DEFAULT_KEY_BITS
}

fn image_name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[a-z]([-a-z0-9]{0,61}[a-z0-9])?$").unwrap_or_else(|e| panic!("invalid image name pattern: {e}"))
    })
}

impl Default for Config {
    fn default() -> Self {
        Self {
            project_id: String::new(),
            source_image: String::new(),
            zone: String::new(),
            image_name: String::new(),
            image_description: default_image_description(),
            instance_name: String::new(),
            machine_type: default_machine_type(),
            network: default_network(),
            disk_size_gb: default_disk_size_gb(),
            tags: Vec::new(),
            metadata: BTreeMap::new(),
            ssh_username: default_ssh_username(),
            ssh_port: default_ssh_port(),
            ssh_timeout: default_timeout(),
            state_timeout: default_timeout(),
            ssh_key_bits: default_ssh_key_bits(),
            private_key_file: None,
            passphrase: None,
            ssh_timeout_parsed: Duration::from_secs(300),
            state_timeout_parsed: Duration::from_secs(300),
            loaded_private_key: None,
        }
    }
}

impl Config {
    /// Creates a configuration with the three required fields set.
    #[must_use]
    pub fn new(project_id: impl Into<String>, source_image: impl Into<String>, zone: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            source_image: source_image.into(),
            zone: zone.into(),
            ..Self::default()
        }
    }

    /// Parses a configuration from JSON.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::Serialization`] for malformed JSON.
    pub fn from_json(json: &str) -> Result<Self, BuildError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Reads a configuration from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::Io`] if the file cannot be read and
    /// [`BuildError::Serialization`] for malformed JSON.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, BuildError> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        Self::from_json(&contents)
    }

    /// Sets the image name.
    #[must_use]
    pub fn with_image_name(mut self, name: impl Into<String>) -> Self {
        self.image_name = name.into();
        self
    }

    /// Sets the instance name.
    #[must_use]
    pub fn with_instance_name(mut self, name: impl Into<String>) -> Self {
        self.instance_name = name.into();
        self
    }

    /// Sets the state timeout.
    #[must_use]
    pub fn with_state_timeout(mut self, timeout: impl Into<String>) -> Self {
        self.state_timeout = timeout.into();
        self
    }

    /// Sets the SSH key size.
    #[must_use]
    pub const fn with_ssh_key_bits(mut self, bits: usize) -> Self {
        self.ssh_key_bits = bits;
        self
    }

    /// Uses an existing private key file instead of a temporary key.
    #[must_use]
    pub fn with_private_key_file(mut self, path: impl Into<PathBuf>, passphrase: Option<String>) -> Self {
        self.private_key_file = Some(path.into());
        self.passphrase = passphrase;
        self
    }

    /// Adds an instance metadata entry.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Fills in defaults, validates every field, and loads the private key file.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::Config`] listing every invalid field. The key
    /// file is only loaded once the fields are valid; its failures come back
    /// as [`BuildError::KeyFile`] so the category tells an unreadable file,
    /// a missing passphrase and a wrong passphrase apart.
    pub fn prepare(&mut self) -> Result<(), BuildError> {
        if self.image_name.is_empty() {
            self.image_name = format!("imagesmith-{}", chrono::Utc::now().timestamp());
        }
        if self.instance_name.is_empty() {
            self.instance_name = format!("imagesmith-{}", uuid::Uuid::new_v4());
        }

        let mut errors = Vec::new();

        for (field, value) in [
            ("project_id", &self.project_id),
            ("source_image", &self.source_image),
            ("zone", &self.zone),
        ] {
            if value.trim().is_empty() {
                errors.push(format!("{field} must be specified"));
            }
        }

        if !image_name_pattern().is_match(&self.image_name) {
            errors.push(format!(
                "image_name '{}' must be 1-63 lowercase letters, digits or dashes, starting with a letter",
                self.image_name
            ));
        }
        if self.ssh_port == 0 {
            errors.push("ssh_port must be non-zero".to_string());
        }
        if self.disk_size_gb == 0 {
            errors.push("disk_size_gb must be non-zero".to_string());
        }
        if !(MIN_KEY_BITS..=MAX_KEY_BITS).contains(&self.ssh_key_bits) {
            errors.push(format!(
                "ssh_key_bits must be between {MIN_KEY_BITS} and {MAX_KEY_BITS}, got {}",
                self.ssh_key_bits
            ));
        }

        match parse_duration(&self.ssh_timeout) {
            Ok(d) => self.ssh_timeout_parsed = d,
            Err(e) => errors.push(format!("failed parsing ssh_timeout: {e}")),
        }
        match parse_duration(&self.state_timeout) {
            Ok(d) => self.state_timeout_parsed = d,
            Err(e) => errors.push(format!("failed parsing state_timeout: {e}")),
        }

        if !errors.is_empty() {
            return Err(BuildError::Config { errors });
        }

        if let Some(path) = &self.private_key_file {
            let bytes = keys::process_private_key_file(path, self.passphrase.as_deref())?;
            let pem = String::from_utf8(bytes).map_err(|_| KeyFileError::Format { path: path.clone() })?;
            self.loaded_private_key = Some(pem);
        }

        debug!(image = %self.image_name, instance = %self.instance_name, "Configuration prepared");
        Ok(())
    }

    /// Returns the parsed SSH timeout.
    #[must_use]
    pub const fn ssh_timeout(&self) -> Duration {
        self.ssh_timeout_parsed
    }

    /// Returns the parsed state timeout.
    #[must_use]
    pub const fn state_timeout(&self) -> Duration {
        self.state_timeout_parsed
    }

    /// Returns the private key loaded from `private_key_file`, if any.
    #[must_use]
    pub fn private_key(&self) -> Option<&str> {
        self.loaded_private_key.as_deref()
    }
}
