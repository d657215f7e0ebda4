//! Key provider: seal / unseal the key-info record to an asymmetric key pair
//!
//! The pipelines only see the [`KeySealer`] / [`KeyUnsealer`] traits. The
//! shipped implementation uses age X25519 recipients (age 0.11 API).

use std::fmt;
use std::str::FromStr;

use bitcrypt_core::{BitcryptError, BitcryptResult};
use secrecy::ExposeSecret;
use zeroize::Zeroizing;

pub trait KeySealer: Send + Sync {
    fn seal(&self, plaintext: &[u8]) -> BitcryptResult<Vec<u8>>;
}

pub trait KeyUnsealer: Send + Sync {
    /// Wrong key and corrupted input are both reported as `Unseal`.
    fn unseal(&self, sealed: &[u8]) -> BitcryptResult<Zeroizing<Vec<u8>>>;
}

/// Public half: seals to an age X25519 recipient (`age1...`).
#[derive(Clone)]
pub struct AgeSealer {
    recipient: age::x25519::Recipient,
}

impl AgeSealer {
    pub fn new(recipient: age::x25519::Recipient) -> Self {
        Self { recipient }
    }

    pub fn from_public_key(encoded: &str) -> BitcryptResult<Self> {
        let recipient = age::x25519::Recipient::from_str(encoded.trim())
            .map_err(|e| BitcryptError::Key(format!("invalid public key: {e}")))?;
        Ok(Self { recipient })
    }

    pub fn public_key(&self) -> String {
        self.recipient.to_string()
    }
}

impl KeySealer for AgeSealer {
    fn seal(&self, plaintext: &[u8]) -> BitcryptResult<Vec<u8>> {
        age::encrypt(&self.recipient, plaintext).map_err(|e| BitcryptError::Seal(e.to_string()))
    }
}

impl fmt::Debug for AgeSealer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgeSealer")
            .field("recipient", &self.public_key())
            .finish()
    }
}

/// Private half: opens blobs sealed to the matching recipient.
pub struct AgeUnsealer {
    identity: age::x25519::Identity,
}

impl AgeUnsealer {
    pub fn new(identity: age::x25519::Identity) -> Self {
        Self { identity }
    }

    /// Generate a new random key pair.
    pub fn generate() -> Self {
        Self {
            identity: age::x25519::Identity::generate(),
        }
    }

    /// Parse an `AGE-SECRET-KEY-1...` string.
    pub fn from_secret_key(encoded: &str) -> BitcryptResult<Self> {
        let identity = age::x25519::Identity::from_str(encoded.trim())
            .map_err(|e| BitcryptError::Key(format!("invalid private key: {e}")))?;
        Ok(Self { identity })
    }

    pub fn secret_key(&self) -> Zeroizing<String> {
        Zeroizing::new(self.identity.to_string().expose_secret().to_string())
    }

    pub fn sealer(&self) -> AgeSealer {
        AgeSealer::new(self.identity.to_public())
    }
}

impl KeyUnsealer for AgeUnsealer {
    fn unseal(&self, sealed: &[u8]) -> BitcryptResult<Zeroizing<Vec<u8>>> {
        age::decrypt(&self.identity, sealed)
            .map(Zeroizing::new)
            .map_err(|e| BitcryptError::Unseal(e.to_string()))
    }
}

impl fmt::Debug for AgeUnsealer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgeUnsealer")
            .field("identity", &"[REDACTED]")
            .field("recipient", &self.identity.to_public().to_string())
            .finish()
    }
}
