//! bitcrypt-engine: whole-file pipelines and the directory walker
//!
//!   - `encrypt_file`: digest → fresh key info → seal → header + blob + ciphertext
//!   - `decrypt_file`: header → unseal → cross-check → decrypt to temp → verify → rename
//!   - `walk_encrypt` / `walk_decrypt`: mirror a tree through the pipelines,
//!     collecting per-entry failures instead of stopping
//!
//! The pipelines never look up keys themselves; callers pass a sealer or
//! unsealer handle.

pub mod naming;
pub mod pipeline;
pub mod walker;

pub use naming::{
    decrypted_dir_path, decrypted_file_path, encrypted_dir_path, encrypted_file_path, DIR_SUFFIX,
    FILE_SUFFIX,
};
pub use pipeline::{
    decrypt_file, encrypt_file, is_staging_name, DecryptOptions, FileReport, STAGING_PREFIX,
    STAGING_SUFFIX,
};
pub use walker::{walk_decrypt, walk_encrypt, WalkOptions, WalkReport};

/// Progress callback type (files_done, files_total, message)
pub type ProgressFn = Box<dyn Fn(u64, u64, &str) + Send + Sync>;
