mod http;
mod local;
mod memory;

pub use http::HttpSource;
pub use local::FileSource;
pub use memory::MemorySource;

use async_trait::async_trait;

use crate::error::{ZipError, ZipResult};

/// Random access to the bytes of an archive.
///
/// Reads carry their own offset, so one source can serve any number of
/// concurrent readers without a shared cursor.
#[async_trait]
pub trait ByteSource: Send + Sync {
    /// Read exactly `len` bytes starting at `offset`.
    ///
    /// Fails with [`ZipError::Range`] if the range runs past [`len()`](Self::len).
    async fn read_range(&self, offset: u64, len: u64) -> ZipResult<Vec<u8>>;

    /// Total size of the archive in bytes
    fn len(&self) -> u64;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Validate `[offset, offset + len)` against a source of `size` bytes,
/// returning the exclusive end.
pub(crate) fn check_range(offset: u64, len: u64, size: u64) -> ZipResult<u64> {
    match offset.checked_add(len) {
        Some(end) if end <= size => Ok(end),
        _ => Err(ZipError::Range { offset, len, size }),
    }
}
