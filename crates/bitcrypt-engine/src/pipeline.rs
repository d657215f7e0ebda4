//! Single-file hybrid encrypt / decrypt
//!
//! Both directions write into a hidden temp file beside the destination and
//! rename it over the destination only once the output is complete. A
//! failure at any step leaves the destination as it was.

use std::fs::{File, Permissions};
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use bitcrypt_core::{BitcryptError, BitcryptResult};
use bitcrypt_crypto::{
    decrypt_stream, digest_file, digest_stream, digests_equal, encrypt_stream, keyinfo,
    probe_container, read_header, CipherParams, ContentDigest, KeySealer, KeyUnsealer,
    SealedKeyInfo,
};
use tempfile::NamedTempFile;
use tracing::{debug, info};

/// Staging files are named `.bitcrypt-XXXXXX.tmp`, independent of the
/// destination name's length.
pub const STAGING_PREFIX: &str = ".bitcrypt-";
pub const STAGING_SUFFIX: &str = ".tmp";

/// Whether `name` looks like a staging file left behind by an interrupted run.
pub fn is_staging_name(name: &str) -> bool {
    name.len() > STAGING_PREFIX.len() + STAGING_SUFFIX.len()
        && name.starts_with(STAGING_PREFIX)
        && name.ends_with(STAGING_SUFFIX)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecryptOptions {
    /// Stamp the output with the mtime recorded at encryption
    pub restore_mtime: bool,
}

impl Default for DecryptOptions {
    fn default() -> Self {
        Self {
            restore_mtime: true,
        }
    }
}

/// Result of one pipeline run
#[derive(Debug, Clone)]
pub struct FileReport {
    pub source: PathBuf,
    pub dest: PathBuf,
    /// Plaintext bytes transformed
    pub bytes: u64,
    pub digest: ContentDigest,
    pub sealed_len: usize,
}

/// Encrypt `source` into a container at `dest`.
///
/// Returns `AlreadyUpToDate` without writing when `dest` is already a
/// container for the same content.
pub fn encrypt_file(
    source: &Path,
    dest: &Path,
    sealer: &dyn KeySealer,
    params: CipherParams,
) -> BitcryptResult<FileReport> {
    let mut file = File::open(source)?;
    let meta = file.metadata()?;
    if !meta.is_file() {
        return Err(not_a_regular_file(source));
    }

    let digest = digest_stream(&mut file)?;
    let modified_at = meta.modified().map(unix_seconds).unwrap_or(0);
    let (mut header, key_info) = keyinfo::generate(digest, modified_at, params)?;

    if dest.exists() {
        match probe_container(dest) {
            Ok(existing) if digests_equal(&existing.content_digest, &digest) => {
                debug!(path = %dest.display(), "skip: container already current");
                return Err(BitcryptError::AlreadyUpToDate(dest.to_path_buf()));
            }
            Ok(_) => debug!(path = %dest.display(), "replacing stale container"),
            Err(e) => debug!(path = %dest.display(), "overwriting non-container: {e}"),
        }
    }

    let sealed = sealer.seal(&key_info.encode()[..])?;
    header.sealed_len = i32::try_from(sealed.len()).map_err(|_| {
        BitcryptError::Seal(format!("sealed key info too large: {} bytes", sealed.len()))
    })?;

    let (staged, out) = StagedFile::create(dest, source)?;
    let mut writer = BufWriter::new(out);
    writer.write_all(&header.encode())?;
    writer.write_all(&sealed)?;
    let bytes = encrypt_stream(
        &mut BufReader::new(file),
        &mut writer,
        key_info.key_bytes(),
        key_info.iv_bytes(),
        key_info.cipher_mode,
    )?;
    finish(writer)?;
    staged.commit(false)?;

    info!(
        source = %source.display(),
        dest = %dest.display(),
        bytes,
        mode = key_info.cipher_mode.name(),
        key_size = key_info.key_size.bytes(),
        "encrypted"
    );

    Ok(FileReport {
        source: source.to_path_buf(),
        dest: dest.to_path_buf(),
        bytes,
        digest,
        sealed_len: sealed.len(),
    })
}

/// Decrypt the container at `source` into `dest`.
///
/// The plaintext is verified against the recorded digest before anything at
/// `dest` is touched. `dest` may equal `source` (decrypt in place).
pub fn decrypt_file(
    source: &Path,
    dest: &Path,
    unsealer: &dyn KeyUnsealer,
    options: &DecryptOptions,
) -> BitcryptResult<FileReport> {
    let file = File::open(source)?;
    let total_len = file.metadata()?.len();
    let mut reader = BufReader::new(file);

    let header = read_header(&mut reader, total_len).map_err(|e| match e {
        BitcryptError::Format(msg) => BitcryptError::Format(format!("{}: {msg}", source.display())),
        other => other,
    })?;

    let mut sealed = vec![0u8; header.sealed_len as usize];
    reader.read_exact(&mut sealed)?;
    let opened = unsealer.unseal(&sealed)?;
    let key_info = SealedKeyInfo::decode(&opened)?;
    if !digests_equal(&key_info.content_digest, &header.content_digest) {
        return Err(BitcryptError::HeaderIntegrity);
    }

    if dest.is_file() {
        if let Ok(existing) = digest_file(dest) {
            if digests_equal(&existing, &header.content_digest) {
                debug!(path = %dest.display(), "skip: plaintext already current");
                return Err(BitcryptError::AlreadyUpToDate(dest.to_path_buf()));
            }
        }
    }

    reader.seek(SeekFrom::Start(header.payload_offset()))?;

    let (staged, out) = StagedFile::create(dest, source)?;
    let mut writer = BufWriter::new(out);
    let bytes = decrypt_stream(
        &mut reader,
        &mut writer,
        key_info.key_bytes(),
        key_info.iv_bytes(),
        key_info.cipher_mode,
    )?;
    let out = finish(writer)?;
    if options.restore_mtime {
        out.set_modified(from_unix_seconds(header.modified_at))?;
    }
    drop(out);
    drop(reader);

    let actual = digest_file(staged.path())?;
    if !digests_equal(&actual, &header.content_digest) {
        return Err(BitcryptError::ChecksumMismatch {
            expected: header.content_digest.to_hex(),
            actual: actual.to_hex(),
        });
    }

    staged.commit(true)?;

    info!(
        source = %source.display(),
        dest = %dest.display(),
        bytes,
        mode = key_info.cipher_mode.name(),
        "decrypted"
    );

    Ok(FileReport {
        source: source.to_path_buf(),
        dest: dest.to_path_buf(),
        bytes,
        digest: header.content_digest,
        sealed_len: sealed.len(),
    })
}

fn finish(writer: BufWriter<File>) -> BitcryptResult<File> {
    let file = writer.into_inner().map_err(|e| e.into_error())?;
    file.sync_all()?;
    Ok(file)
}

fn not_a_regular_file(path: &Path) -> BitcryptError {
    BitcryptError::Io(std::io::Error::new(
        std::io::ErrorKind::InvalidInput,
        format!("not a regular file: {}", path.display()),
    ))
}

fn unix_seconds(t: SystemTime) -> i64 {
    match t.duration_since(UNIX_EPOCH) {
        Ok(d) => d.as_secs() as i64,
        Err(e) => -(e.duration().as_secs() as i64),
    }
}

fn from_unix_seconds(secs: i64) -> SystemTime {
    if secs >= 0 {
        UNIX_EPOCH + Duration::from_secs(secs as u64)
    } else {
        UNIX_EPOCH - Duration::from_secs(secs.unsigned_abs())
    }
}

/// Hidden temp file in the destination's directory. Removed on drop unless
/// committed.
struct StagedFile {
    temp: NamedTempFile,
    dest: PathBuf,
    /// Applied before the rename: those of an existing destination file,
    /// else those of the source
    permissions: Option<Permissions>,
}

impl StagedFile {
    fn create(dest: &Path, source: &Path) -> BitcryptResult<(Self, File)> {
        let dir = match dest.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let temp = tempfile::Builder::new()
            .prefix(STAGING_PREFIX)
            .suffix(STAGING_SUFFIX)
            .tempfile_in(dir)?;
        let file = temp.as_file().try_clone()?;
        let permissions = std::fs::metadata(dest)
            .ok()
            .filter(|m| m.is_file())
            .or_else(|| std::fs::metadata(source).ok())
            .map(|m| m.permissions());
        let staged = Self {
            temp,
            dest: dest.to_path_buf(),
            permissions,
        };
        Ok((staged, file))
    }

    fn path(&self) -> &Path {
        self.temp.path()
    }

    /// Move into place. With `replace`, an existing regular file at the
    /// destination is removed first.
    fn commit(self, replace: bool) -> BitcryptResult<()> {
        if let Some(permissions) = self.permissions {
            std::fs::set_permissions(self.temp.path(), permissions)?;
        }
        if replace && self.dest.is_file() {
            std::fs::remove_file(&self.dest)?;
        }
        self.temp.persist(&self.dest).map_err(|e| e.error)?;
        Ok(())
    }
}
