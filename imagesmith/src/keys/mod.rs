//! SSH key material: temporary key pairs and user-supplied key files.

mod generate;
pub mod legacy_pem;
mod private_key;

pub use generate::{
    authorized_key, generate_key_pair, public_key_from_private_pem, SshKeyPair, DEFAULT_KEY_BITS,
};
pub use legacy_pem::DekCipher;
pub use private_key::{process_private_key_file, DECRYPTED_KEY_LABEL};
