//! Random access to the files of one ZIP archive.

use std::path::Path;
use std::sync::Arc;

use log::*;

use crate::error::{ZipError, ZipResult};
use crate::io::{ByteSource, FileSource, HttpSource, MemorySource};
use crate::options::{ContainerOptions, FetchOptions};
use crate::zip::{CentralDirectory, EntryCache, EntryIndex, ZipExtractor, ZipFileEntry, ZipParser};

/// An opened ZIP archive.
///
/// Opening parses the whole central directory once; afterwards the container
/// is immutable and every method takes `&self`, so reads can run
/// concurrently from as many tasks as needed. Entries are only fetched and
/// decompressed when asked for.
///
/// ```no_run
/// # async fn demo() -> zip_container::ZipResult<()> {
/// use zip_container::{Container, FetchOptions};
///
/// let container = Container::open_url("https://example.com/data.zip", &FetchOptions::default()).await?;
/// for name in container.list_names() {
///     println!("{}", name);
/// }
/// let readme = container.read_to_string("README.md").await?;
/// # Ok(())
/// # }
/// ```
pub struct Container<S: ByteSource> {
    source: Arc<S>,
    directory: CentralDirectory,
    index: EntryIndex,
    extractor: ZipExtractor<S>,
    cache: Option<EntryCache>,
}

impl<S: ByteSource> Container<S> {
    /// Open an archive with the default options.
    pub async fn open(source: Arc<S>) -> ZipResult<Self> {
        Self::open_with(source, ContainerOptions::default()).await
    }

    pub async fn open_with(source: Arc<S>, options: ContainerOptions) -> ZipResult<Self> {
        let directory = ZipParser::new(source.clone()).read_directory().await?;
        let index = EntryIndex::new(&directory.entries);
        debug!(
            "Opened archive: {} entries, {} names{}",
            directory.entries.len(),
            index.len(),
            if directory.zip64 { ", zip64" } else { "" }
        );

        let extractor =
            ZipExtractor::new(source.clone()).with_max_entry_size(options.max_entry_size);
        let cache = options.cache.then(EntryCache::new);
        Ok(Self {
            source,
            directory,
            index,
            extractor,
            cache,
        })
    }

    /// Names of all entries in directory order, duplicates included.
    pub fn list_names(&self) -> Vec<String> {
        self.directory
            .entries
            .iter()
            .map(|entry| entry.file_name.clone())
            .collect()
    }

    pub fn entries(&self) -> &[ZipFileEntry] {
        &self.directory.entries
    }

    /// The entry a read of `name` would return
    pub fn entry(&self, name: &str) -> Option<&ZipFileEntry> {
        self.index.get(name).map(|i| &self.directory.entries[i])
    }

    pub fn len(&self) -> usize {
        self.directory.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.directory.entries.is_empty()
    }

    /// The archive comment, as raw bytes
    pub fn comment(&self) -> &[u8] {
        &self.directory.comment
    }

    pub fn directory(&self) -> &CentralDirectory {
        &self.directory
    }

    pub fn source(&self) -> &Arc<S> {
        &self.source
    }

    /// Read and decompress the file named `name`.
    ///
    /// The returned bytes have passed the entry's CRC-32 check. Failures
    /// leave the container usable; reading again after an [`ZipError::Io`]
    /// fetches again, even with caching on.
    pub async fn read(&self, name: &str) -> ZipResult<Vec<u8>> {
        let position = self
            .index
            .get(name)
            .ok_or_else(|| ZipError::NotFound(name.to_string()))?;
        let entry = &self.directory.entries[position];

        match &self.cache {
            Some(cache) => {
                let data = cache
                    .get_or_extract(position, || self.extractor.extract(entry))
                    .await?;
                Ok(data.to_vec())
            }
            None => self.extractor.extract(entry).await,
        }
    }

    /// Read a specific entry, bypassing name lookup and the cache.
    ///
    /// This reaches entries shadowed by a later duplicate name.
    pub async fn read_entry(&self, entry: &ZipFileEntry) -> ZipResult<Vec<u8>> {
        self.extractor.extract(entry).await
    }

    /// Read `name` and decode it as UTF-8.
    pub async fn read_to_string(&self, name: &str) -> ZipResult<String> {
        let data = self.read(name).await?;
        String::from_utf8(data).map_err(|_| ZipError::Utf8(name.to_string()))
    }
}

impl Container<HttpSource> {
    /// Open a remote archive, using range requests when the server allows.
    pub async fn open_url(url: &str, options: &FetchOptions) -> ZipResult<Self> {
        let source = HttpSource::with_options(url, options).await?;
        Self::open(Arc::new(source)).await
    }
}

impl Container<FileSource> {
    pub async fn open_file(path: impl AsRef<Path>) -> ZipResult<Self> {
        let source = FileSource::open(path.as_ref())?;
        Self::open(Arc::new(source)).await
    }
}

impl Container<MemorySource> {
    /// Open an archive held in memory.
    ///
    /// Memory reads never wait, so this doesn't need a runtime.
    pub fn open_bytes(data: Vec<u8>) -> ZipResult<Self> {
        futures::executor::block_on(Self::open(Arc::new(MemorySource::new(data))))
    }
}
