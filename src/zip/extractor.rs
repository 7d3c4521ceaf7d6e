use std::io::Read;
use std::sync::Arc;

use flate2::read::DeflateDecoder;
use log::*;

use crate::error::{ZipError, ZipResult};
use crate::io::ByteSource;

use super::structures::{
    CompressionMethod, LocalFileHeader, ZIP64_SENTINEL_32, ZipFileEntry, apply_zip64_extra,
};

/// Don't trust declared sizes with more than this much up-front allocation.
const MAX_PREALLOCATION: u64 = 16 * 1024 * 1024;

/// Reads single entries out of an archive.
///
/// Holds nothing but the source, so any number of extractions can run at once.
pub struct ZipExtractor<S: ByteSource> {
    source: Arc<S>,
    max_entry_size: Option<u64>,
}

impl<S: ByteSource> ZipExtractor<S> {
    pub fn new(source: Arc<S>) -> Self {
        Self {
            source,
            max_entry_size: None,
        }
    }

    /// Refuse entries declaring more than `limit` uncompressed bytes.
    pub fn with_max_entry_size(mut self, limit: Option<u64>) -> Self {
        self.max_entry_size = limit;
        self
    }

    /// Extract file data to memory.
    ///
    /// A successful return means the bytes matched the entry's CRC-32.
    pub async fn extract(&self, entry: &ZipFileEntry) -> ZipResult<Vec<u8>> {
        let name = entry.file_name.as_str();
        if entry.is_encrypted() {
            return Err(ZipError::Encrypted(name.to_string()));
        }
        if let Some(limit) = self.max_entry_size
            && entry.uncompressed_size > limit
        {
            return Err(ZipError::EntryTooLarge {
                name: name.to_string(),
                size: entry.uncompressed_size,
                limit,
            });
        }

        let data_offset = self.data_offset(entry).await?;
        let in_bounds = data_offset
            .checked_add(entry.compressed_size)
            .is_some_and(|end| end <= self.source.len());
        if !in_bounds {
            return Err(ZipError::corrupt(
                name,
                format!(
                    "{} bytes at offset {} run past the end of the archive",
                    entry.compressed_size, data_offset
                ),
            ));
        }
        let payload = self
            .source
            .read_range(data_offset, entry.compressed_size)
            .await?;

        let data = decompress(entry, payload)?;
        verify_crc(entry, &data)?;
        Ok(data)
    }

    /// Get the actual data offset for a file entry.
    ///
    /// Reads the Local File Header, checks it against the central directory
    /// entry, and returns where the compressed data begins. The local name
    /// and extra field may differ in length from the central ones, so their
    /// lengths are taken from the local header.
    pub async fn data_offset(&self, entry: &ZipFileEntry) -> ZipResult<u64> {
        let name = entry.file_name.as_str();
        let fixed = LocalFileHeader::SIZE as u64;
        let header_fits = entry
            .lfh_offset
            .checked_add(fixed)
            .is_some_and(|end| end <= self.source.len());
        if !header_fits {
            return Err(ZipError::inconsistent(
                name,
                format!("local header offset {} is past the end of the archive", entry.lfh_offset),
            ));
        }

        let lfh_buf = self.source.read_range(entry.lfh_offset, fixed).await?;
        let lfh = LocalFileHeader::from_bytes(&lfh_buf).ok_or_else(|| {
            ZipError::inconsistent(
                name,
                format!("no local file header at offset {}", entry.lfh_offset),
            )
        })?;
        trace!("{:?}", lfh);

        let variable_start = entry.lfh_offset + fixed;
        let variable_fits = variable_start
            .checked_add(lfh.variable_len())
            .is_some_and(|end| end <= self.source.len());
        if !variable_fits {
            return Err(ZipError::inconsistent(
                name,
                "local name and extra field run past the end of the archive",
            ));
        }
        let variable = self
            .source
            .read_range(variable_start, lfh.variable_len())
            .await?;
        let extra = &variable[lfh.file_name_length as usize..];

        check_local_header(entry, &lfh, extra)?;

        // Data starts after: LFH (30 bytes) + filename + extra field
        Ok(variable_start + lfh.variable_len())
    }
}

/// Cross-check a local file header against the central directory entry.
fn check_local_header(entry: &ZipFileEntry, lfh: &LocalFileHeader, extra: &[u8]) -> ZipResult<()> {
    let name = entry.file_name.as_str();

    let local_method = CompressionMethod::from_u16(lfh.compression_method);
    if local_method != entry.compression_method {
        return Err(ZipError::inconsistent(
            name,
            format!(
                "local header says compression method {}, central directory says {}",
                local_method.as_u16(),
                entry.compression_method.as_u16()
            ),
        ));
    }

    // With a data descriptor the local sizes are typically zero; the real ones
    // follow the data.
    if lfh.has_data_descriptor() {
        return Ok(());
    }

    let mut uncompressed_size = lfh.uncompressed_size as u64;
    let mut compressed_size = lfh.compressed_size as u64;
    if uncompressed_size == ZIP64_SENTINEL_32 as u64 || compressed_size == ZIP64_SENTINEL_32 as u64
    {
        apply_zip64_extra(extra, &mut uncompressed_size, &mut compressed_size, None)
            .map_err(|detail| ZipError::inconsistent(name, format!("local header: {}", detail)))?;
    }

    if compressed_size != entry.compressed_size || uncompressed_size != entry.uncompressed_size {
        return Err(ZipError::inconsistent(
            name,
            format!(
                "local header says {}/{} bytes (compressed/uncompressed), central directory says {}/{}",
                compressed_size,
                uncompressed_size,
                entry.compressed_size,
                entry.uncompressed_size
            ),
        ));
    }
    Ok(())
}

/// Turn an entry's payload into its contents.
fn decompress(entry: &ZipFileEntry, payload: Vec<u8>) -> ZipResult<Vec<u8>> {
    let name = entry.file_name.as_str();
    match entry.compression_method {
        CompressionMethod::Stored => {
            if payload.len() as u64 != entry.uncompressed_size {
                return Err(ZipError::corrupt(
                    name,
                    format!(
                        "stored entry holds {} bytes but declares {}",
                        payload.len(),
                        entry.uncompressed_size
                    ),
                ));
            }
            Ok(payload)
        }
        CompressionMethod::Deflated => {
            let expected = entry.uncompressed_size;
            let mut data = Vec::with_capacity(expected.min(MAX_PREALLOCATION) as usize);
            // One byte past the declared size is enough to notice overlong data.
            DeflateDecoder::new(payload.as_slice())
                .take(expected.saturating_add(1))
                .read_to_end(&mut data)
                .map_err(|e| ZipError::corrupt(name, format!("inflate failed: {}", e)))?;
            if data.len() as u64 != expected {
                return Err(ZipError::corrupt(
                    name,
                    format!(
                        "inflated to {}{} bytes, expected {}",
                        if data.len() as u64 > expected { "over " } else { "" },
                        data.len(),
                        expected
                    ),
                ));
            }
            Ok(data)
        }
        CompressionMethod::Unsupported(code) => Err(ZipError::UnsupportedCompression(code)),
    }
}

fn verify_crc(entry: &ZipFileEntry, data: &[u8]) -> ZipResult<()> {
    let actual = crc32fast::hash(data);
    if actual != entry.crc32 {
        return Err(ZipError::ChecksumMismatch {
            name: entry.file_name.clone(),
            expected: entry.crc32,
            actual,
        });
    }
    Ok(())
}
