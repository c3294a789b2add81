//! Error types for image builds.
//!
//! Two layers: [`KeyFileError`] covers the private-key-file loader, and
//! [`BuildError`] is what steps put into the state bag when they halt and
//! what the [`Builder`](crate::builder::Builder) hands back to its caller.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Broad failure category, so callers can react without matching every variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// A file could not be read or written.
    Io,
    /// Input was not in the expected format.
    Format,
    /// User-supplied input was rejected.
    Validation,
    /// Decryption or another cryptographic operation failed.
    Cryptographic,
    /// Key-pair generation failed.
    Generation,
    /// An external collaborator (cloud API, provisioner) failed.
    Provider,
    /// The build was cancelled.
    Cancelled,
    /// An invariant inside the crate was broken.
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io => write!(f, "io"),
            Self::Format => write!(f, "format"),
            Self::Validation => write!(f, "validation"),
            Self::Cryptographic => write!(f, "cryptographic"),
            Self::Generation => write!(f, "generation"),
            Self::Provider => write!(f, "provider"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::Internal => write!(f, "internal"),
        }
    }
}

/// Errors raised while loading a private key file.
#[derive(Debug, Error)]
pub enum KeyFileError {
    /// The key file could not be read.
    #[error("failed loading private key file {}: {source}", path.display())]
    Read {
        /// The path that was read.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// No PEM container could be decoded from the file.
    #[error("{} does not contain a valid private key", path.display())]
    Format {
        /// The offending file.
        path: PathBuf,
    },

    /// The container is encrypted but no passphrase was supplied.
    #[error("a passphrase must be specified when using an encrypted private key")]
    PassphraseRequired,

    /// The container names a cipher we cannot decrypt.
    #[error("unsupported private key encryption: {cipher}")]
    UnsupportedCipher {
        /// The cipher name from the `DEK-Info` header.
        cipher: String,
    },

    /// The encryption headers are malformed.
    #[error("invalid private key encryption header: {reason}")]
    InvalidEncryptionHeader {
        /// What was wrong with the header.
        reason: String,
    },

    /// Decryption failed (wrong passphrase or corrupt data).
    #[error("failed decrypting private key: {reason}")]
    Decrypt {
        /// Why decryption failed.
        reason: String,
    },
}

impl KeyFileError {
    /// Returns the category of this error.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::Read { .. } => ErrorCategory::Io,
            Self::Format { .. } | Self::UnsupportedCipher { .. } | Self::InvalidEncryptionHeader { .. } => {
                ErrorCategory::Format
            }
            Self::PassphraseRequired => ErrorCategory::Validation,
            Self::Decrypt { .. } => ErrorCategory::Cryptographic,
        }
    }

    pub(crate) fn decrypt(reason: impl Into<String>) -> Self {
        Self::Decrypt {
            reason: reason.into(),
        }
    }

    pub(crate) fn header(reason: impl Into<String>) -> Self {
        Self::InvalidEncryptionHeader {
            reason: reason.into(),
        }
    }
}

/// The main error type for image builds.
#[derive(Debug, Error)]
pub enum BuildError {
    /// Loading the configured private key failed.
    #[error(transparent)]
    KeyFile(#[from] KeyFileError),

    /// Generating or encoding the temporary SSH key failed.
    #[error("error creating temporary ssh key: {0}")]
    KeyGeneration(String),

    /// The configuration did not validate.
    #[error("invalid configuration:\n* {}", errors.join("\n* "))]
    Config {
        /// Every validation failure found.
        errors: Vec<String>,
    },

    /// A cloud driver operation failed.
    #[error("{operation} failed: {cause:#}")]
    Driver {
        /// The operation that failed, e.g. "create instance".
        operation: String,
        /// The driver's error.
        cause: anyhow::Error,
    },

    /// The provisioner failed.
    #[error("provisioning failed: {cause:#}")]
    Provision {
        /// The provisioner's error.
        cause: anyhow::Error,
    },

    /// A long-running operation did not finish in time.
    #[error("timed out after {seconds}s waiting for {operation}")]
    Timeout {
        /// The operation that timed out.
        operation: String,
        /// The timeout that elapsed.
        seconds: u64,
    },

    /// A step needed a state bag entry that no earlier step produced.
    #[error("required build state '{key}' is missing")]
    MissingState {
        /// The missing key.
        key: String,
    },

    /// A step panicked while running.
    #[error("step '{step}' panicked: {message}")]
    StepPanicked {
        /// The step name.
        step: String,
        /// The panic payload, if it was a string.
        message: String,
    },

    /// The build was cancelled.
    #[error("build cancelled: {0}")]
    Cancelled(String),

    /// A runner was asked to run twice.
    #[error("runner has already run; create a new runner for each build")]
    RunnerAlreadyRan,

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A generic internal error.
    #[error("internal error: {0}")]
    Internal(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BuildError {
    /// Creates a driver error for the named operation.
    pub fn driver(operation: impl Into<String>, cause: anyhow::Error) -> Self {
        Self::Driver {
            operation: operation.into(),
            cause,
        }
    }

    /// Creates a missing-state error for the given key name.
    pub fn missing_state(key: impl Into<String>) -> Self {
        Self::MissingState { key: key.into() }
    }

    /// Returns the category of this error.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::KeyFile(err) => err.category(),
            Self::KeyGeneration(_) => ErrorCategory::Generation,
            Self::Config { .. } => ErrorCategory::Validation,
            Self::Driver { .. } | Self::Provision { .. } | Self::Timeout { .. } => ErrorCategory::Provider,
            Self::Cancelled(_) => ErrorCategory::Cancelled,
            Self::Serialization(_) => ErrorCategory::Format,
            Self::Io(_) => ErrorCategory::Io,
            Self::MissingState { .. }
            | Self::StepPanicked { .. }
            | Self::RunnerAlreadyRan
            | Self::Internal(_) => ErrorCategory::Internal,
        }
    }

    /// Returns true if this error represents a cancellation.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled(_))
    }

    /// Converts to a dictionary representation for event payloads.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();
        map.insert("category".to_string(), serde_json::json!(self.category()));
        map.insert("message".to_string(), serde_json::json!(self.to_string()));
        map
    }
}

impl From<serde_json::Error> for BuildError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
