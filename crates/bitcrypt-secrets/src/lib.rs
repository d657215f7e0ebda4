//! bitcrypt-secrets: key pair files and key discovery
//!
//! Key discovery chain (in order of precedence):
//!   1. explicit path (CLI `--key`)
//!   2. $BITCRYPT_PUBLIC_KEY_FILE / $BITCRYPT_PRIVATE_KEY_FILE
//!   3. `keys.public_key` / `keys.private_key` from bitcrypt.toml
//!   4. `keys.keys_dir` from bitcrypt.toml
//!   5. `keys/` next to the bitcrypt executable

pub mod identity;
pub mod keyfile;

pub use identity::{
    default_keys_dir, find_private_key, find_public_key, resolve_key_path, KeyKind, LoadedKey,
};
pub use keyfile::{generate_keypair, read_private_key, read_public_key, KeyPairFiles};

pub const PUBLIC_KEY_FILE: &str = "public.key";
pub const PRIVATE_KEY_FILE: &str = "private.key";
