//! bitcrypt-crypto: per-file hybrid encryption primitives
//!
//! Container layout on disk:
//! ```text
//! [32 bytes: ClearHeader][sealed_len bytes: sealed KeyInfo][N bytes: AES stream ciphertext]
//! ```
//!
//! Key hierarchy:
//! ```text
//! age X25519 key pair (long-lived, held by the user)
//!   └── KeyInfo (per-file, 128 bytes, sealed to the public key)
//!       └── AES-128/192/256 key + IV, CFB / CTR / OFB over the file content
//! ```
//!
//! The ClearHeader carries a 16-byte content digest in cleartext so "is the
//! destination already current" can be answered without the private key. The
//! same digest is repeated inside the sealed KeyInfo and cross-checked after
//! unsealing.

pub mod cipher;
pub mod container;
pub mod digest;
pub mod keyinfo;
pub mod seal;

pub use cipher::{decrypt_stream, encrypt_stream, CipherMode, CipherParams, KeySize};
pub use container::{probe_container, read_header, ClearHeader, SealedKeyInfo};
pub use digest::{digest_file, digest_reader, digest_stream, digests_equal, ContentDigest};
pub use keyinfo::generate;
pub use seal::{AgeSealer, AgeUnsealer, KeySealer, KeyUnsealer};

/// Size of a content digest in bytes
pub const DIGEST_SIZE: usize = 16;

/// Size of the cleartext header record
pub const CLEAR_HEADER_SIZE: usize = 32;

/// Size of the key-info record before sealing
pub const KEY_INFO_SIZE: usize = 128;

/// Anything shorter cannot hold a header plus a sealed key-info record
pub const MIN_CONTAINER_SIZE: u64 = (CLEAR_HEADER_SIZE + KEY_INFO_SIZE) as u64;

/// `format_flag` value marking a bitcrypt container
pub const FORMAT_MAGIC: u32 = 0x3257_1235;

/// AES block size; only this many IV bytes are used
pub const BLOCK_SIZE: usize = 16;
