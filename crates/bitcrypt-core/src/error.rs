use std::path::PathBuf;

use thiserror::Error;

pub type BitcryptResult<T> = Result<T, BitcryptError>;

#[derive(Debug, Error)]
pub enum BitcryptError {
    /// Input is not a recognized container, or a fixed-size record is malformed.
    #[error("format error: {0}")]
    Format(String),

    /// The sealed key-info blob could not be opened (wrong key or corrupted blob).
    #[error("unseal error: {0}")]
    Unseal(String),

    #[error("seal error: {0}")]
    Seal(String),

    /// Clear header and sealed key info disagree on the content digest.
    #[error("header integrity check failed: clear header and sealed key info digests differ")]
    HeaderIntegrity,

    #[error("checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    /// Destination already holds the current content; nothing was written.
    #[error("already up to date: {}", .0.display())]
    AlreadyUpToDate(PathBuf),

    #[error("secure random source failed: {0}")]
    RandomSource(String),

    #[error("cipher error: {0}")]
    Cipher(String),

    #[error("key error: {0}")]
    Key(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl BitcryptError {
    /// The idempotency short-circuit is reported as an error but is not a failure.
    pub fn is_up_to_date(&self) -> bool {
        matches!(self, BitcryptError::AlreadyUpToDate(_))
    }

    pub fn not_a_container(path: &std::path::Path) -> Self {
        BitcryptError::Format(format!("not an encrypted container: {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn up_to_date_is_not_a_failure() {
        let err = BitcryptError::AlreadyUpToDate(PathBuf::from("a.txt.enc"));
        assert!(err.is_up_to_date());
        assert_eq!(err.to_string(), "already up to date: a.txt.enc");
        assert!(!BitcryptError::HeaderIntegrity.is_up_to_date());
    }

    #[test]
    fn io_errors_convert() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: BitcryptError = io.into();
        assert!(matches!(err, BitcryptError::Io(_)));
    }
}
