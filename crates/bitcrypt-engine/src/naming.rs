//! On-disk naming conventions
//!
//! Files gain `.enc` on encrypt. Directory trees are mirrored into a sibling
//! named `<dir>_enc`.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use bitcrypt_core::BitcryptResult;

pub const FILE_SUFFIX: &str = ".enc";
pub const DIR_SUFFIX: &str = "_enc";

pub fn encrypted_file_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(FILE_SUFFIX);
    PathBuf::from(name)
}

/// Strip `.enc` when present, otherwise decrypt onto the same name.
pub fn decrypted_file_path(path: &Path) -> PathBuf {
    match path.file_name().and_then(|n| n.to_str()) {
        Some(name) if name.len() > FILE_SUFFIX.len() && name.ends_with(FILE_SUFFIX) => {
            path.with_file_name(&name[..name.len() - FILE_SUFFIX.len()])
        }
        _ => path.to_path_buf(),
    }
}

/// Sibling `<dir>_enc` of `dir`.
pub fn encrypted_dir_path(dir: &Path) -> BitcryptResult<PathBuf> {
    let dir = named(dir)?;
    let mut name = dir.file_name().map(OsString::from).unwrap_or_default();
    name.push(DIR_SUFFIX);
    Ok(dir.with_file_name(name))
}

/// `<dir>` for a `<dir>_enc` input, otherwise `dir` itself (decrypt in place).
pub fn decrypted_dir_path(dir: &Path) -> BitcryptResult<PathBuf> {
    let dir = named(dir)?;
    Ok(match dir.file_name().and_then(|n| n.to_str()) {
        Some(name) if name.len() > DIR_SUFFIX.len() && name.ends_with(DIR_SUFFIX) => {
            dir.with_file_name(&name[..name.len() - DIR_SUFFIX.len()])
        }
        _ => dir,
    })
}

/// `.` and `..` have no name to suffix, so resolve them first.
fn named(dir: &Path) -> BitcryptResult<PathBuf> {
    if dir.file_name().is_some() {
        return Ok(dir.to_path_buf());
    }
    Ok(std::fs::canonicalize(dir)?)
}
