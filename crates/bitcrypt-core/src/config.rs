use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{BitcryptError, BitcryptResult};

/// Top-level configuration (loaded from bitcrypt.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BitcryptConfig {
    pub keys: KeysConfig,
    pub cipher: CipherConfig,
    pub walk: WalkConfig,
    pub decrypt: DecryptConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct KeysConfig {
    /// Public key file used for encryption
    pub public_key: Option<PathBuf>,
    /// Private key file used for decryption
    pub private_key: Option<PathBuf>,
    /// Directory holding public.key / private.key (default: `keys/` next to the binary)
    pub keys_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CipherConfig {
    /// Symmetric key length in bytes: 16, 24 or 32 (anything else becomes 32)
    pub key_size: u32,
    /// Stream mode: "cfb", "ctr" or "ofb" (anything else becomes "cfb")
    pub mode: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WalkConfig {
    /// Worker thread count for directory operations (0 = cpu_count, 1 = sequential)
    pub workers: usize,
    /// Path components that mark version-control metadata; matching subtrees are skipped
    pub skip_markers: Vec<String>,
    /// Glob patterns matched against entry names to exclude
    pub exclude_patterns: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DecryptConfig {
    /// Restore the modification time recorded in the container header
    pub restore_mtime: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level (default: info)
    pub level: String,
    /// Log format: "json" or "text"
    pub format: String,
}

impl Default for CipherConfig {
    fn default() -> Self {
        Self {
            key_size: 32,
            mode: "cfb".into(),
        }
    }
}

impl Default for WalkConfig {
    fn default() -> Self {
        Self {
            workers: 1,
            skip_markers: vec![".git".into(), ".svn".into()],
            exclude_patterns: Vec::new(),
        }
    }
}

impl Default for DecryptConfig {
    fn default() -> Self {
        Self {
            restore_mtime: true,
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

impl BitcryptConfig {
    /// Load from a TOML file. A missing file yields the defaults.
    pub fn load(path: &Path) -> BitcryptResult<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "config file not found, using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
            .map_err(|e| BitcryptError::Config(format!("parsing {}: {e}", path.display())))
    }

    pub fn from_toml(content: &str) -> BitcryptResult<Self> {
        toml::from_str(content).map_err(|e| BitcryptError::Config(e.to_string()))
    }

    pub fn to_toml(&self) -> BitcryptResult<String> {
        toml::to_string_pretty(self).map_err(|e| BitcryptError::Config(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let toml_str = r#"
[keys]
public_key = "/etc/bitcrypt/public.key"
private_key = "/etc/bitcrypt/private.key"

[cipher]
key_size = 16
mode = "ctr"

[walk]
workers = 4
skip_markers = [".git", ".hg"]
exclude_patterns = ["*.tmp"]

[decrypt]
restore_mtime = false

[log]
level = "debug"
format = "json"
"#;
        let config = BitcryptConfig::from_toml(toml_str).unwrap();

        assert_eq!(
            config.keys.public_key,
            Some(PathBuf::from("/etc/bitcrypt/public.key"))
        );
        assert_eq!(config.cipher.key_size, 16);
        assert_eq!(config.cipher.mode, "ctr");
        assert_eq!(config.walk.workers, 4);
        assert_eq!(config.walk.skip_markers, vec![".git", ".hg"]);
        assert_eq!(config.walk.exclude_patterns, vec!["*.tmp"]);
        assert!(!config.decrypt.restore_mtime);
        assert_eq!(config.log.format, "json");
    }

    #[test]
    fn test_parse_defaults() {
        let config = BitcryptConfig::from_toml("").unwrap();

        assert!(config.keys.public_key.is_none());
        assert_eq!(config.cipher.key_size, 32);
        assert_eq!(config.cipher.mode, "cfb");
        assert_eq!(config.walk.workers, 1);
        assert_eq!(config.walk.skip_markers, vec![".git", ".svn"]);
        assert!(config.decrypt.restore_mtime);
        assert_eq!(config.log.level, "info");
    }

    #[test]
    fn test_parse_partial_config() {
        let config = BitcryptConfig::from_toml("[cipher]\nmode = \"ofb\"\n").unwrap();

        // Overridden
        assert_eq!(config.cipher.mode, "ofb");
        // Defaults
        assert_eq!(config.cipher.key_size, 32);
        assert_eq!(config.log.format, "text");
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let err = BitcryptConfig::from_toml("[cipher\n").unwrap_err();
        assert!(matches!(err, BitcryptError::Config(_)));
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = BitcryptConfig::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.cipher.key_size, 32);
    }

    #[test]
    fn test_serialize_roundtrip() {
        let config = BitcryptConfig::default();
        let parsed = BitcryptConfig::from_toml(&config.to_toml().unwrap()).unwrap();

        assert_eq!(config.cipher.mode, parsed.cipher.mode);
        assert_eq!(config.walk.skip_markers, parsed.walk.skip_markers);
    }
}
