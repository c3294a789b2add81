//! Temporary SSH key pairs.

use crate::errors::BuildError;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rsa::pkcs1::{DecodeRsaPrivateKey, EncodeRsaPrivateKey, LineEnding};
use rsa::pkcs8::DecodePrivateKey;
use rsa::traits::PublicKeyParts;
use rsa::{RsaPrivateKey, RsaPublicKey};

/// Default RSA modulus size for temporary keys.
pub const DEFAULT_KEY_BITS: usize = 2048;

const SSH_RSA: &str = "ssh-rsa";

/// A freshly generated key pair, already encoded for the state bag.
#[derive(Clone, PartialEq, Eq)]
pub struct SshKeyPair {
    /// PKCS#1 PEM (`RSA PRIVATE KEY`).
    pub private_key: String,
    /// OpenSSH authorized-key line, newline terminated.
    pub public_key: String,
}

impl std::fmt::Debug for SshKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SshKeyPair")
            .field("private_key", &"<redacted>")
            .field("public_key", &self.public_key)
            .finish()
    }
}

/// Generates an RSA key pair of `bits` bits.
///
/// This draws from the OS entropy source and is CPU heavy; async callers
/// should run it on the blocking pool.
///
/// # Errors
///
/// Returns [`BuildError::KeyGeneration`] if generation or encoding fails.
pub fn generate_key_pair(bits: usize) -> Result<SshKeyPair, BuildError> {
    let private = RsaPrivateKey::new(&mut rand::rngs::OsRng, bits)
        .map_err(|e| BuildError::KeyGeneration(e.to_string()))?;
    let private_pem = private
        .to_pkcs1_pem(LineEnding::LF)
        .map_err(|e| BuildError::KeyGeneration(e.to_string()))?;
    let public_key = authorized_key(&private.to_public_key())?;

    Ok(SshKeyPair {
        private_key: private_pem.as_str().to_owned(),
        public_key,
    })
}

/// Derives the authorized-key line from a PEM-encoded RSA private key.
///
/// Accepts PKCS#1 (`RSA PRIVATE KEY`) and PKCS#8 (`PRIVATE KEY`) containers.
///
/// # Errors
///
/// Returns [`BuildError::KeyGeneration`] if the key cannot be decoded.
pub fn public_key_from_private_pem(private_pem: &str) -> Result<String, BuildError> {
    let private = RsaPrivateKey::from_pkcs1_pem(private_pem)
        .or_else(|_| RsaPrivateKey::from_pkcs8_pem(private_pem))
        .map_err(|e| BuildError::KeyGeneration(format!("cannot decode private key: {e}")))?;
    authorized_key(&private.to_public_key())
}

/// Encodes an RSA public key as `ssh-rsa <base64>\n` (RFC 4253 wire format).
///
/// # Errors
///
/// Returns [`BuildError::KeyGeneration`] for an empty modulus or exponent.
pub fn authorized_key(public: &RsaPublicKey) -> Result<String, BuildError> {
    let e = public.e().to_bytes_be();
    let n = public.n().to_bytes_be();
    if e.iter().all(|b| *b == 0) || n.iter().all(|b| *b == 0) {
        return Err(BuildError::KeyGeneration("public key has an empty component".into()));
    }

    let mut blob = Vec::with_capacity(SSH_RSA.len() + e.len() + n.len() + 16);
    put_string(&mut blob, SSH_RSA.as_bytes());
    put_mpint(&mut blob, &e);
    put_mpint(&mut blob, &n);

    Ok(format!("{SSH_RSA} {}\n", STANDARD.encode(blob)))
}

fn put_string(buf: &mut Vec<u8>, bytes: &[u8]) {
    let len = u32::try_from(bytes.len()).unwrap_or(u32::MAX);
    buf.extend_from_slice(&len.to_be_bytes());
    buf.extend_from_slice(bytes);
}

/// Positive mpint: big-endian, no leading zeros, a zero byte added when the
/// high bit is set.
fn put_mpint(buf: &mut Vec<u8>, magnitude: &[u8]) {
    let start = magnitude.iter().position(|b| *b != 0).unwrap_or(magnitude.len());
    let trimmed = &magnitude[start..];
    if trimmed.first().is_some_and(|b| b & 0x80 != 0) {
        let mut padded = Vec::with_capacity(trimmed.len() + 1);
        padded.push(0);
        padded.extend_from_slice(trimmed);
        put_string(buf, &padded);
    } else {
        put_string(buf, trimmed);
    }
}
