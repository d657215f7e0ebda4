//! AES stream transforms: CFB (full block), CTR (128-bit big-endian counter), OFB
//!
//! All three modes are length-preserving, so ciphertext size equals plaintext
//! size. The AES variant follows the key length (16/24/32 bytes).

use std::fmt;
use std::io::{ErrorKind, Read, Write};
use std::str::FromStr;

use aes::cipher::{InvalidLength, KeyIvInit, StreamCipher};
use aes::{Aes128, Aes192, Aes256};
use bitcrypt_core::{BitcryptError, BitcryptResult};

/// Read buffer size for stream transforms
const STREAM_BUF_SIZE: usize = 64 * 1024;

/// Symmetric key length
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum KeySize {
    Aes128,
    Aes192,
    #[default]
    Aes256,
}

impl KeySize {
    pub fn bytes(self) -> usize {
        match self {
            KeySize::Aes128 => 16,
            KeySize::Aes192 => 24,
            KeySize::Aes256 => 32,
        }
    }

    pub fn from_bytes(n: u32) -> Option<Self> {
        match n {
            16 => Some(KeySize::Aes128),
            24 => Some(KeySize::Aes192),
            32 => Some(KeySize::Aes256),
            _ => None,
        }
    }

    /// Out-of-range sizes fall back to 32 bytes.
    pub fn normalize(n: u32) -> Self {
        Self::from_bytes(n).unwrap_or_else(|| {
            tracing::debug!(requested = n, "unsupported key size, using 32");
            KeySize::default()
        })
    }
}

/// Stream mode discriminator. On-disk codes: 1 = cfb, 2 = ctr, 4 = ofb.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CipherMode {
    #[default]
    Cfb,
    Ctr,
    Ofb,
}

impl CipherMode {
    pub fn code(self) -> u32 {
        match self {
            CipherMode::Cfb => 1,
            CipherMode::Ctr => 2,
            CipherMode::Ofb => 4,
        }
    }

    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            1 => Some(CipherMode::Cfb),
            2 => Some(CipherMode::Ctr),
            4 => Some(CipherMode::Ofb),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            CipherMode::Cfb => "cfb",
            CipherMode::Ctr => "ctr",
            CipherMode::Ofb => "ofb",
        }
    }

    /// Unrecognized names fall back to cfb.
    pub fn normalize(name: &str) -> Self {
        name.parse().unwrap_or_else(|_| {
            tracing::debug!(requested = name, "unsupported cipher mode, using cfb");
            CipherMode::default()
        })
    }
}

impl FromStr for CipherMode {
    type Err = BitcryptError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "cfb" => Ok(CipherMode::Cfb),
            "ctr" => Ok(CipherMode::Ctr),
            "ofb" => Ok(CipherMode::Ofb),
            other => Err(BitcryptError::Cipher(format!(
                "unknown cipher mode '{other}' (expected cfb, ctr or ofb)"
            ))),
        }
    }
}

impl fmt::Display for CipherMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Key size and mode requested for a new container
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CipherParams {
    pub key_size: KeySize,
    pub mode: CipherMode,
}

impl CipherParams {
    pub fn new(key_size: KeySize, mode: CipherMode) -> Self {
        Self { key_size, mode }
    }

    /// Build from user-supplied values, normalizing anything unsupported.
    pub fn from_raw(key_size: u32, mode: &str) -> Self {
        Self {
            key_size: KeySize::normalize(key_size),
            mode: CipherMode::normalize(mode),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Encrypt,
    Decrypt,
}

/// A keyed, stateful keystream applied in place over consecutive buffers.
pub struct StreamTransform {
    apply: Box<dyn FnMut(&mut [u8]) + Send>,
}

fn invalid_length(_: InvalidLength) -> BitcryptError {
    BitcryptError::Cipher("invalid key or IV length".into())
}

macro_rules! keystream {
    ($cipher:ty, $key:expr, $iv:expr, $mode:expr, $direction:expr) => {{
        let apply: Box<dyn FnMut(&mut [u8]) + Send> = match ($mode, $direction) {
            (CipherMode::Cfb, Direction::Encrypt) => {
                let mut c = cfb_mode::BufEncryptor::<$cipher>::new_from_slices($key, $iv)
                    .map_err(invalid_length)?;
                Box::new(move |buf: &mut [u8]| c.encrypt(buf))
            }
            (CipherMode::Cfb, Direction::Decrypt) => {
                let mut c = cfb_mode::BufDecryptor::<$cipher>::new_from_slices($key, $iv)
                    .map_err(invalid_length)?;
                Box::new(move |buf: &mut [u8]| c.decrypt(buf))
            }
            (CipherMode::Ctr, _) => {
                let mut c =
                    ctr::Ctr128BE::<$cipher>::new_from_slices($key, $iv).map_err(invalid_length)?;
                Box::new(move |buf: &mut [u8]| c.apply_keystream(buf))
            }
            (CipherMode::Ofb, _) => {
                let mut c =
                    ofb::Ofb::<$cipher>::new_from_slices($key, $iv).map_err(invalid_length)?;
                Box::new(move |buf: &mut [u8]| c.apply_keystream(buf))
            }
        };
        apply
    }};
}

impl StreamTransform {
    fn new(key: &[u8], iv: &[u8], mode: CipherMode, direction: Direction) -> BitcryptResult<Self> {
        let apply = match key.len() {
            16 => keystream!(Aes128, key, iv, mode, direction),
            24 => keystream!(Aes192, key, iv, mode, direction),
            32 => keystream!(Aes256, key, iv, mode, direction),
            n => {
                return Err(BitcryptError::Cipher(format!(
                    "unsupported AES key length: {n} bytes"
                )))
            }
        };
        Ok(Self { apply })
    }

    pub fn encryptor(key: &[u8], iv: &[u8], mode: CipherMode) -> BitcryptResult<Self> {
        Self::new(key, iv, mode, Direction::Encrypt)
    }

    pub fn decryptor(key: &[u8], iv: &[u8], mode: CipherMode) -> BitcryptResult<Self> {
        Self::new(key, iv, mode, Direction::Decrypt)
    }

    pub fn apply(&mut self, buf: &mut [u8]) {
        (self.apply)(buf)
    }
}

/// Encrypt everything from `reader` into `writer`. Returns the byte count.
pub fn encrypt_stream<R: Read + ?Sized, W: Write + ?Sized>(
    reader: &mut R,
    writer: &mut W,
    key: &[u8],
    iv: &[u8],
    mode: CipherMode,
) -> BitcryptResult<u64> {
    let mut transform = StreamTransform::encryptor(key, iv, mode)?;
    pump(reader, writer, &mut transform)
}

/// Decrypt everything from `reader` into `writer`. Returns the byte count.
pub fn decrypt_stream<R: Read + ?Sized, W: Write + ?Sized>(
    reader: &mut R,
    writer: &mut W,
    key: &[u8],
    iv: &[u8],
    mode: CipherMode,
) -> BitcryptResult<u64> {
    let mut transform = StreamTransform::decryptor(key, iv, mode)?;
    pump(reader, writer, &mut transform)
}

fn pump<R: Read + ?Sized, W: Write + ?Sized>(
    reader: &mut R,
    writer: &mut W,
    transform: &mut StreamTransform,
) -> BitcryptResult<u64> {
    let mut buf = vec![0u8; STREAM_BUF_SIZE];
    let mut total = 0u64;

    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        };
        transform.apply(&mut buf[..n]);
        writer.write_all(&buf[..n])?;
        total += n as u64;
    }

    writer.flush()?;
    Ok(total)
}
