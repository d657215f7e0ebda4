//! Key discovery chain

use std::path::{Path, PathBuf};

use bitcrypt_core::config::KeysConfig;
use bitcrypt_core::{BitcryptError, BitcryptResult};
use bitcrypt_crypto::{AgeSealer, AgeUnsealer};
use tracing::debug;

use crate::keyfile::{read_private_key, read_public_key};
use crate::{PRIVATE_KEY_FILE, PUBLIC_KEY_FILE};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyKind {
    Public,
    Private,
}

impl KeyKind {
    fn file_name(self) -> &'static str {
        match self {
            KeyKind::Public => PUBLIC_KEY_FILE,
            KeyKind::Private => PRIVATE_KEY_FILE,
        }
    }

    fn env_var(self) -> &'static str {
        match self {
            KeyKind::Public => "BITCRYPT_PUBLIC_KEY_FILE",
            KeyKind::Private => "BITCRYPT_PRIVATE_KEY_FILE",
        }
    }
}

/// A loaded key and where it came from
pub struct LoadedKey<K> {
    pub key: K,
    pub source: String,
}

/// Resolve which file holds the key, without reading it.
///
///   1. `explicit` (CLI flag)
///   2. `env_value` ($BITCRYPT_*_KEY_FILE)
///   3. config file path
///   4. config `keys_dir`
///   5. `default_dir`
///
/// Returns the path and a label naming the source.
pub fn resolve_key_path(
    kind: KeyKind,
    explicit: Option<&Path>,
    env_value: Option<String>,
    config: &KeysConfig,
    default_dir: &Path,
) -> BitcryptResult<(PathBuf, String)> {
    if let Some(path) = explicit {
        return Ok((path.to_path_buf(), format!("flag:{}", path.display())));
    }

    if let Some(value) = env_value.filter(|v| !v.is_empty()) {
        let path = PathBuf::from(value);
        return Ok((path.clone(), format!("{}:{}", kind.env_var(), path.display())));
    }

    let configured = match kind {
        KeyKind::Public => config.public_key.as_ref(),
        KeyKind::Private => config.private_key.as_ref(),
    };
    if let Some(path) = configured {
        let expanded = expand_tilde(path);
        return Ok((expanded.clone(), format!("config:{}", expanded.display())));
    }

    let candidates = config
        .keys_dir
        .as_ref()
        .map(|d| expand_tilde(d).join(kind.file_name()))
        .into_iter()
        .chain(std::iter::once(default_dir.join(kind.file_name())));

    let mut tried = Vec::new();
    for candidate in candidates {
        if candidate.exists() {
            return Ok((candidate.clone(), format!("default:{}", candidate.display())));
        }
        tried.push(candidate.display().to_string());
    }

    Err(BitcryptError::Key(format!(
        "no {} key found. Tried: ${}, config path, {}. Run: bitcrypt keygen",
        match kind {
            KeyKind::Public => "public",
            KeyKind::Private => "private",
        },
        kind.env_var(),
        tried.join(", ")
    )))
}

/// Directory holding keys when nothing else is configured: `keys/` next to the binary.
pub fn default_keys_dir() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from("."))
        .join("keys")
}

fn env_for(kind: KeyKind) -> Option<String> {
    std::env::var(kind.env_var()).ok()
}

pub fn find_public_key(
    explicit: Option<&Path>,
    config: &KeysConfig,
) -> BitcryptResult<LoadedKey<AgeSealer>> {
    let (path, source) = resolve_key_path(
        KeyKind::Public,
        explicit,
        env_for(KeyKind::Public),
        config,
        &default_keys_dir(),
    )?;
    debug!(source = %source, "loading public key");
    Ok(LoadedKey {
        key: read_public_key(&path)?,
        source,
    })
}

pub fn find_private_key(
    explicit: Option<&Path>,
    config: &KeysConfig,
) -> BitcryptResult<LoadedKey<AgeUnsealer>> {
    let (path, source) = resolve_key_path(
        KeyKind::Private,
        explicit,
        env_for(KeyKind::Private),
        config,
        &default_keys_dir(),
    )?;
    debug!(source = %source, "loading private key");
    Ok(LoadedKey {
        key: read_private_key(&path)?,
        source,
    })
}

fn home_dir() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

fn expand_tilde(path: &Path) -> PathBuf {
    match path.to_str().and_then(|s| s.strip_prefix("~/")) {
        Some(rest) => home_dir().join(rest),
        None => path.to_path_buf(),
    }
}
