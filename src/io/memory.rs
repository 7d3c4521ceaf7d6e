use async_trait::async_trait;

use super::{ByteSource, check_range};
use crate::error::ZipResult;

/// An archive held entirely in memory.
///
/// Reads never suspend, which is what lets
/// [`Container::open_bytes`](crate::Container::open_bytes) stay synchronous.
#[derive(Clone, Debug, Default)]
pub struct MemorySource {
    data: Vec<u8>,
}

impl MemorySource {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data }
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.data
    }
}

impl From<Vec<u8>> for MemorySource {
    fn from(data: Vec<u8>) -> Self {
        Self::new(data)
    }
}

#[async_trait]
impl ByteSource for MemorySource {
    async fn read_range(&self, offset: u64, len: u64) -> ZipResult<Vec<u8>> {
        let end = check_range(offset, len, self.len())?;
        // Both ends fit: they're bounded by data.len()
        Ok(self.data[offset as usize..end as usize].to_vec())
    }

    fn len(&self) -> u64 {
        self.data.len() as u64
    }
}
