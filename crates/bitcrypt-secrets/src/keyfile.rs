//! Key files on disk
//!
//! `public.key` holds one `age1...` line. `private.key` is an age identity
//! file: `#` comment lines followed by one `AGE-SECRET-KEY-1...` line. It is
//! created with mode 0600 on Unix.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use bitcrypt_core::{BitcryptError, BitcryptResult};
use bitcrypt_crypto::{AgeSealer, AgeUnsealer};
use tracing::info;

use crate::{PRIVATE_KEY_FILE, PUBLIC_KEY_FILE};

#[derive(Debug, Clone)]
pub struct KeyPairFiles {
    pub public_key: PathBuf,
    pub private_key: PathBuf,
    /// `age1...` recipient string
    pub recipient: String,
}

/// Generate a key pair into `dir`, creating the directory if needed.
///
/// Existing key files are only replaced when `force` is set.
pub fn generate_keypair(dir: &Path, force: bool) -> BitcryptResult<KeyPairFiles> {
    let public_path = dir.join(PUBLIC_KEY_FILE);
    let private_path = dir.join(PRIVATE_KEY_FILE);

    if !force {
        for path in [&public_path, &private_path] {
            if path.exists() {
                return Err(BitcryptError::Key(format!(
                    "key file already exists: {} (use --force to replace it)",
                    path.display()
                )));
            }
        }
    }

    std::fs::create_dir_all(dir)?;

    let unsealer = AgeUnsealer::generate();
    let recipient = unsealer.sealer().public_key();
    let created = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();

    let secret = unsealer.secret_key();
    let private_content = zeroize::Zeroizing::new(format!(
        "# created: {created}\n# public key: {recipient}\n{}\n",
        secret.as_str()
    ));
    write_private(&private_path, private_content.as_bytes())?;
    std::fs::write(&public_path, format!("{recipient}\n"))?;

    info!(
        public = %public_path.display(),
        private = %private_path.display(),
        "generated key pair"
    );

    Ok(KeyPairFiles {
        public_key: public_path,
        private_key: private_path,
        recipient,
    })
}

fn write_private(path: &Path, content: &[u8]) -> BitcryptResult<()> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(path)?;
    file.write_all(content)?;
    file.sync_all()?;
    Ok(())
}

/// First line that is neither blank nor a `#` comment.
fn key_line(content: &str) -> Option<&str> {
    content
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty() && !l.starts_with('#'))
}

pub fn read_public_key(path: &Path) -> BitcryptResult<AgeSealer> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| BitcryptError::Key(format!("reading public key {}: {e}", path.display())))?;
    let line = key_line(&content)
        .ok_or_else(|| BitcryptError::Key(format!("no public key in {}", path.display())))?;
    AgeSealer::from_public_key(line)
}

pub fn read_private_key(path: &Path) -> BitcryptResult<AgeUnsealer> {
    let content = zeroize::Zeroizing::new(std::fs::read_to_string(path).map_err(|e| {
        BitcryptError::Key(format!("reading private key {}: {e}", path.display()))
    })?);
    let line = key_line(&content)
        .ok_or_else(|| BitcryptError::Key(format!("no private key in {}", path.display())))?;
    AgeUnsealer::from_secret_key(line)
}
