//! Fixed-size little-endian records of the container format
//!
//! ClearHeader (32 bytes, cleartext):
//! ```text
//! [4: sealed_len i32][4: format_flag u32][8: modified_at i64][16: content_digest]
//! ```
//!
//! SealedKeyInfo (128 bytes, sealed to the recipient before writing):
//! ```text
//! [40: random_pad][4: key_size u32][4: cipher_mode u32][16: content_digest][32: iv][32: key]
//! ```

use std::fmt;
use std::io::Read;
use std::path::Path;

use bitcrypt_core::{BitcryptError, BitcryptResult};
use zeroize::{Zeroize, Zeroizing};

use crate::cipher::{CipherMode, KeySize};
use crate::digest::ContentDigest;
use crate::{BLOCK_SIZE, CLEAR_HEADER_SIZE, DIGEST_SIZE, FORMAT_MAGIC, KEY_INFO_SIZE, MIN_CONTAINER_SIZE};

pub const RANDOM_PAD_SIZE: usize = 40;
pub const IV_FIELD_SIZE: usize = 32;
pub const KEY_FIELD_SIZE: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClearHeader {
    pub sealed_len: i32,
    pub format_flag: u32,
    /// Source mtime before sealing, Unix seconds
    pub modified_at: i64,
    pub content_digest: ContentDigest,
}

impl ClearHeader {
    pub fn new(content_digest: ContentDigest, modified_at: i64) -> Self {
        Self {
            sealed_len: 0,
            format_flag: FORMAT_MAGIC,
            modified_at,
            content_digest,
        }
    }

    pub fn is_container(&self) -> bool {
        self.format_flag == FORMAT_MAGIC
    }

    pub fn encode(&self) -> [u8; CLEAR_HEADER_SIZE] {
        let mut out = [0u8; CLEAR_HEADER_SIZE];
        out[0..4].copy_from_slice(&self.sealed_len.to_le_bytes());
        out[4..8].copy_from_slice(&self.format_flag.to_le_bytes());
        out[8..16].copy_from_slice(&self.modified_at.to_le_bytes());
        out[16..32].copy_from_slice(self.content_digest.as_bytes());
        out
    }

    pub fn decode(bytes: &[u8]) -> BitcryptResult<Self> {
        if bytes.len() < CLEAR_HEADER_SIZE {
            return Err(BitcryptError::Format(format!(
                "clear header too short: {} bytes (expected {CLEAR_HEADER_SIZE})",
                bytes.len()
            )));
        }
        Ok(Self {
            sealed_len: i32::from_le_bytes(le_array(&bytes[0..4])),
            format_flag: u32::from_le_bytes(le_array(&bytes[4..8])),
            modified_at: i64::from_le_bytes(le_array(&bytes[8..16])),
            content_digest: ContentDigest::from_bytes(le_array(&bytes[16..32])),
        })
    }

    /// Offset of the first ciphertext byte.
    pub fn payload_offset(&self) -> u64 {
        CLEAR_HEADER_SIZE as u64 + self.sealed_len.max(0) as u64
    }
}

fn le_array<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&bytes[..N]);
    out
}

/// Read and validate the clear header of a container of `total_len` bytes.
///
/// Rejects short inputs and a wrong magic before anything else, and a
/// `sealed_len` that is not positive or runs past the end of the input.
pub fn read_header<R: Read + ?Sized>(reader: &mut R, total_len: u64) -> BitcryptResult<ClearHeader> {
    if total_len < MIN_CONTAINER_SIZE {
        return Err(BitcryptError::Format(format!(
            "not an encrypted container: {total_len} bytes is below the minimum of {MIN_CONTAINER_SIZE}"
        )));
    }

    let mut buf = [0u8; CLEAR_HEADER_SIZE];
    reader.read_exact(&mut buf)?;
    let header = ClearHeader::decode(&buf)?;

    if !header.is_container() {
        return Err(BitcryptError::Format(format!(
            "not an encrypted container: format flag {:#010x}",
            header.format_flag
        )));
    }
    if header.sealed_len <= 0 || header.payload_offset() > total_len {
        return Err(BitcryptError::Format(format!(
            "sealed key info length {} does not fit a {total_len}-byte container",
            header.sealed_len
        )));
    }
    Ok(header)
}

/// Open `path` and read its clear header without touching the sealed part.
pub fn probe_container(path: &Path) -> BitcryptResult<ClearHeader> {
    let mut file = std::fs::File::open(path)?;
    let len = file.metadata()?.len();
    read_header(&mut file, len)
}

/// Per-file key material. Zeroized on drop.
#[derive(Clone)]
pub struct SealedKeyInfo {
    pub random_pad: [u8; RANDOM_PAD_SIZE],
    pub key_size: KeySize,
    pub cipher_mode: CipherMode,
    pub content_digest: ContentDigest,
    pub iv: [u8; IV_FIELD_SIZE],
    pub key: [u8; KEY_FIELD_SIZE],
}

impl SealedKeyInfo {
    /// The `key_size` bytes actually used as the AES key
    pub fn key_bytes(&self) -> &[u8] {
        &self.key[..self.key_size.bytes()]
    }

    /// The block-sized prefix used as the IV
    pub fn iv_bytes(&self) -> &[u8] {
        &self.iv[..BLOCK_SIZE]
    }

    pub fn encode(&self) -> Zeroizing<[u8; KEY_INFO_SIZE]> {
        let mut out = Zeroizing::new([0u8; KEY_INFO_SIZE]);
        out[0..40].copy_from_slice(&self.random_pad);
        out[40..44].copy_from_slice(&(self.key_size.bytes() as u32).to_le_bytes());
        out[44..48].copy_from_slice(&self.cipher_mode.code().to_le_bytes());
        out[48..64].copy_from_slice(self.content_digest.as_bytes());
        out[64..96].copy_from_slice(&self.iv);
        out[96..128].copy_from_slice(&self.key);
        out
    }

    pub fn decode(bytes: &[u8]) -> BitcryptResult<Self> {
        if bytes.len() < KEY_INFO_SIZE {
            return Err(BitcryptError::Format(format!(
                "key info too short: {} bytes (expected {KEY_INFO_SIZE})",
                bytes.len()
            )));
        }

        let size = u32::from_le_bytes(le_array(&bytes[40..44]));
        let key_size = KeySize::from_bytes(size)
            .ok_or_else(|| BitcryptError::Format(format!("invalid key size in key info: {size}")))?;
        let code = u32::from_le_bytes(le_array(&bytes[44..48]));
        let cipher_mode = CipherMode::from_code(code)
            .ok_or_else(|| BitcryptError::Format(format!("invalid cipher mode in key info: {code}")))?;

        Ok(Self {
            random_pad: le_array(&bytes[0..40]),
            key_size,
            cipher_mode,
            content_digest: ContentDigest::from_bytes(le_array::<DIGEST_SIZE>(&bytes[48..64])),
            iv: le_array(&bytes[64..96]),
            key: le_array(&bytes[96..128]),
        })
    }
}

impl Drop for SealedKeyInfo {
    fn drop(&mut self) {
        self.random_pad.zeroize();
        self.iv.zeroize();
        self.key.zeroize();
    }
}

impl fmt::Debug for SealedKeyInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SealedKeyInfo")
            .field("key_size", &self.key_size)
            .field("cipher_mode", &self.cipher_mode)
            .field("content_digest", &self.content_digest)
            .field("iv", &"[REDACTED]")
            .field("key", &"[REDACTED]")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn sample_digest() -> ContentDigest {
        ContentDigest::from_bytes(*b"0123456789abcdef")
    }

    fn sample_key_info() -> SealedKeyInfo {
        SealedKeyInfo {
            random_pad: [0xA5; RANDOM_PAD_SIZE],
            key_size: KeySize::Aes192,
            cipher_mode: CipherMode::Ofb,
            content_digest: sample_digest(),
            iv: [0x11; IV_FIELD_SIZE],
            key: [0x22; KEY_FIELD_SIZE],
        }
    }

    #[test]
    fn test_clear_header_layout() {
        let mut header = ClearHeader::new(sample_digest(), 1_700_000_000);
        header.sealed_len = 0x0102;
        let bytes = header.encode();

        assert_eq!(&bytes[0..4], &[0x02, 0x01, 0, 0]);
        assert_eq!(&bytes[4..8], &[0x35, 0x12, 0x57, 0x32]);
        assert_eq!(&bytes[8..16], &1_700_000_000i64.to_le_bytes());
        assert_eq!(&bytes[16..32], b"0123456789abcdef");
        assert_eq!(ClearHeader::decode(&bytes).unwrap(), header);
    }

    #[test]
    fn test_negative_mtime_survives() {
        let header = ClearHeader::new(sample_digest(), -86_400);
        assert_eq!(ClearHeader::decode(&header.encode()).unwrap().modified_at, -86_400);
    }

    #[test]
    fn test_clear_header_too_short() {
        let err = ClearHeader::decode(&[0u8; 31]).unwrap_err();
        assert!(matches!(err, BitcryptError::Format(_)));
    }

    #[test]
    fn test_key_info_layout() {
        let info = sample_key_info();
        let bytes = info.encode();

        assert_eq!(&bytes[0..40], &[0xA5; 40]);
        assert_eq!(&bytes[40..44], &24u32.to_le_bytes());
        assert_eq!(&bytes[44..48], &4u32.to_le_bytes());
        assert_eq!(&bytes[48..64], b"0123456789abcdef");
        assert_eq!(&bytes[64..96], &[0x11; 32]);
        assert_eq!(&bytes[96..128], &[0x22; 32]);

        let back = SealedKeyInfo::decode(&bytes[..]).unwrap();
        assert_eq!(back.key_size, KeySize::Aes192);
        assert_eq!(back.cipher_mode, CipherMode::Ofb);
        assert_eq!(back.content_digest, sample_digest());
        assert_eq!(back.key_bytes(), &[0x22; 24]);
        assert_eq!(back.iv_bytes(), &[0x11; 16]);
    }

    #[test]
    fn test_key_info_too_short() {
        let err = SealedKeyInfo::decode(&[0u8; 127]).unwrap_err();
        assert!(matches!(err, BitcryptError::Format(_)));
    }

    #[test]
    fn test_key_info_rejects_unknown_fields() {
        let mut bytes = *sample_key_info().encode();
        bytes[40..44].copy_from_slice(&20u32.to_le_bytes());
        assert!(SealedKeyInfo::decode(&bytes).is_err());

        let mut bytes = *sample_key_info().encode();
        bytes[44..48].copy_from_slice(&3u32.to_le_bytes());
        assert!(SealedKeyInfo::decode(&bytes).is_err());
    }

    #[test]
    fn test_debug_redacts_key() {
        let s = format!("{:?}", sample_key_info());
        assert!(s.contains("REDACTED"));
        assert!(!s.contains("34, 34"));
    }

    fn container_bytes(sealed_len: i32, body: usize) -> Vec<u8> {
        let mut header = ClearHeader::new(sample_digest(), 0);
        header.sealed_len = sealed_len;
        let mut out = header.encode().to_vec();
        out.resize(CLEAR_HEADER_SIZE + body, 0);
        out
    }

    #[test]
    fn test_read_header_accepts_valid() {
        let bytes = container_bytes(200, 210);
        let header = read_header(&mut Cursor::new(&bytes), bytes.len() as u64).unwrap();
        assert_eq!(header.sealed_len, 200);
        assert_eq!(header.payload_offset(), 232);
    }

    #[test]
    fn test_read_header_rejects_short_file() {
        let bytes = container_bytes(100, 100);
        let err = read_header(&mut Cursor::new(&bytes), bytes.len() as u64).unwrap_err();
        assert!(err.to_string().contains("not an encrypted container"));
    }

    #[test]
    fn test_read_header_rejects_bad_magic() {
        let mut bytes = container_bytes(200, 300);
        bytes[4] ^= 0xFF;
        let err = read_header(&mut Cursor::new(&bytes), bytes.len() as u64).unwrap_err();
        assert!(err.to_string().contains("not an encrypted container"));
    }

    #[test]
    fn test_read_header_rejects_overlong_sealed_len() {
        let bytes = container_bytes(1_000, 300);
        assert!(read_header(&mut Cursor::new(&bytes), bytes.len() as u64).is_err());

        let bytes = container_bytes(-5, 300);
        assert!(read_header(&mut Cursor::new(&bytes), bytes.len() as u64).is_err());
    }

    #[test]
    fn test_probe_plain_file_is_not_container() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plain.txt");
        std::fs::write(&path, vec![b'x'; 4096]).unwrap();
        assert!(matches!(
            probe_container(&path).unwrap_err(),
            BitcryptError::Format(_)
        ));
    }
}
