//! Content digest: 16 bytes of BLAKE3 output over the plaintext
//!
//! Used for change detection and for the header/key-info cross-check.
//! It is not an authenticator.

use std::fmt;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use bitcrypt_core::BitcryptResult;

use crate::DIGEST_SIZE;

#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ContentDigest([u8; DIGEST_SIZE]);

impl ContentDigest {
    pub fn from_bytes(bytes: [u8; DIGEST_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; DIGEST_SIZE] {
        &self.0
    }

    /// Lowercase hex (32 chars)
    pub fn to_hex(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in &self.0 {
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentDigest({self})")
    }
}

/// Digest a reader from its current position to EOF.
pub fn digest_reader<R: Read + ?Sized>(reader: &mut R) -> std::io::Result<ContentDigest> {
    let mut hasher = blake3::Hasher::new();
    std::io::copy(reader, &mut hasher)?;

    let mut out = [0u8; DIGEST_SIZE];
    hasher.finalize_xof().fill(&mut out);
    Ok(ContentDigest(out))
}

/// Digest a seekable stream, then rewind it so the same handle can be
/// transformed right after.
pub fn digest_stream<R: Read + Seek + ?Sized>(stream: &mut R) -> std::io::Result<ContentDigest> {
    let digest = digest_reader(stream)?;
    stream.seek(SeekFrom::Start(0))?;
    Ok(digest)
}

pub fn digest_file(path: &Path) -> BitcryptResult<ContentDigest> {
    let mut file = std::fs::File::open(path)?;
    Ok(digest_reader(&mut file)?)
}

pub fn digests_equal(a: &ContentDigest, b: &ContentDigest) -> bool {
    a.as_bytes() == b.as_bytes()
}
