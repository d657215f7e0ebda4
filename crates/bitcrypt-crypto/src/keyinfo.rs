//! Per-file key material generation

use bitcrypt_core::{BitcryptError, BitcryptResult};
use rand::rngs::OsRng;
use rand::{CryptoRng, RngCore};

use crate::cipher::CipherParams;
use crate::container::{ClearHeader, SealedKeyInfo, IV_FIELD_SIZE, KEY_FIELD_SIZE, RANDOM_PAD_SIZE};
use crate::digest::ContentDigest;

/// Generate a fresh header pair for one file from the OS random source.
///
/// Both halves carry `digest`; `sealed_len` is left at zero until the key
/// info has been sealed.
pub fn generate(
    digest: ContentDigest,
    modified_at: i64,
    params: CipherParams,
) -> BitcryptResult<(ClearHeader, SealedKeyInfo)> {
    generate_with_rng(&mut OsRng, digest, modified_at, params)
}

/// Same as [`generate`] with an explicit secure RNG. A failing RNG is fatal.
pub fn generate_with_rng<R: RngCore + CryptoRng>(
    rng: &mut R,
    digest: ContentDigest,
    modified_at: i64,
    params: CipherParams,
) -> BitcryptResult<(ClearHeader, SealedKeyInfo)> {
    let mut info = SealedKeyInfo {
        random_pad: [0u8; RANDOM_PAD_SIZE],
        key_size: params.key_size,
        cipher_mode: params.mode,
        content_digest: digest,
        iv: [0u8; IV_FIELD_SIZE],
        key: [0u8; KEY_FIELD_SIZE],
    };

    fill(rng, &mut info.random_pad)?;
    fill(rng, &mut info.iv)?;
    fill(rng, &mut info.key)?;

    Ok((ClearHeader::new(digest, modified_at), info))
}

fn fill<R: RngCore>(rng: &mut R, buf: &mut [u8]) -> BitcryptResult<()> {
    rng.try_fill_bytes(buf)
        .map_err(|e| BitcryptError::RandomSource(e.to_string()))
}
