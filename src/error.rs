//! Error types and the related `ZipResult<T>`

use std::io;
use std::sync::Arc;

use thiserror::Error;

pub type ZipResult<T> = Result<T, ZipError>;

/// Everything that can go wrong while opening or reading a container.
///
/// The type is `Clone` so a single extraction result can be handed to
/// every reader waiting on the same cached entry. Foreign error sources are
/// kept behind an `Arc` for that reason.
#[derive(Debug, Clone, Error)]
pub enum ZipError {
    /// Transport or filesystem failure. The caller may retry.
    #[error("I/O error: {0}")]
    Io(#[source] Arc<io::Error>),

    /// A read asked for bytes past the end of the source.
    #[error("Range {offset}+{len} is outside of a {size} byte source")]
    Range { offset: u64, len: u64, size: u64 },

    /// The end of central directory or the central directory itself is invalid.
    #[error("Malformed ZIP archive: {0}")]
    MalformedArchive(String),

    /// The local file header disagrees with the central directory.
    #[error("Inconsistent metadata for {name}: {detail}")]
    InconsistentMetadata { name: String, detail: String },

    /// Decompression failed or produced the wrong amount of data.
    #[error("Corrupt entry {name}: {detail}")]
    CorruptEntry { name: String, detail: String },

    /// The decompressed bytes don't hash to the stored CRC-32.
    #[error("Checksum mismatch for {name}: expected {expected:#010x}, got {actual:#010x}")]
    ChecksumMismatch {
        name: String,
        expected: u32,
        actual: u32,
    },

    /// Only STORED (0) and DEFLATE (8) are supported.
    #[error("Unsupported compression method: {0}")]
    UnsupportedCompression(u16),

    /// No entry with this name in the central directory.
    #[error("No file in the archive named {0}")]
    NotFound(String),

    /// The entry is encrypted; decryption is unsupported.
    #[error("Can't read encrypted file {0}")]
    Encrypted(String),

    /// The entry declares more data than the configured limit allows.
    #[error("Entry {name} is {size} bytes, over the {limit} byte limit")]
    EntryTooLarge { name: String, size: u64, limit: u64 },

    /// Decoding an entry as UTF-8 text failed
    #[error("Invalid UTF-8 in {0}")]
    Utf8(String),

    /// The definition path doesn't have a known document extension.
    #[error("Unknown definition format for {0}")]
    UnknownDefinition(String),
}

impl ZipError {
    pub(crate) fn malformed(message: impl Into<String>) -> Self {
        ZipError::MalformedArchive(message.into())
    }

    pub(crate) fn inconsistent(name: &str, detail: impl Into<String>) -> Self {
        ZipError::InconsistentMetadata {
            name: name.to_string(),
            detail: detail.into(),
        }
    }

    pub(crate) fn corrupt(name: &str, detail: impl Into<String>) -> Self {
        ZipError::CorruptEntry {
            name: name.to_string(),
            detail: detail.into(),
        }
    }

    /// Returns true for transport failures, the only kind worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ZipError::Io(_))
    }
}

impl From<io::Error> for ZipError {
    fn from(err: io::Error) -> Self {
        ZipError::Io(Arc::new(err))
    }
}

impl From<reqwest::Error> for ZipError {
    fn from(err: reqwest::Error) -> Self {
        ZipError::Io(Arc::new(io::Error::other(err)))
    }
}
