//! Low-level ZIP archive parser.
//!
//! This module handles the binary parsing of ZIP file structures,
//! reading from any source that implements the [`ByteSource`] trait.
//!
//! ## Parsing Strategy
//!
//! ZIP files are designed to be read from the end:
//! 1. Find the End of Central Directory (EOCD) at the file's end
//! 2. If ZIP64, read the ZIP64 EOCD for large file support
//! 3. Read the Central Directory to get metadata for all files
//!
//! This approach is efficient for HTTP Range requests, as we only
//! need to fetch the file's tail and the directory to list contents.

use std::io::Cursor;
use std::sync::Arc;

use byteorder::{LittleEndian, ReadBytesExt};
use log::*;

use crate::error::{ZipError, ZipResult};
use crate::io::ByteSource;

use super::structures::*;

/// Maximum ZIP comment size allowed by the format (65535 bytes).
///
/// This limits the search area when looking for EOCD with a comment.
const MAX_COMMENT_SIZE: u64 = 65535;

/// The parsed central directory of an archive.
#[derive(Debug, Clone)]
pub struct CentralDirectory {
    /// Entries in directory order
    pub entries: Vec<ZipFileEntry>,
    /// Entry count declared by the (Zip64) EOCD
    pub total_entries: u64,
    pub cd_offset: u64,
    pub cd_size: u64,
    /// Archive comment, uninterpreted
    pub comment: Vec<u8>,
    /// True if the directory was located through Zip64 records
    pub zip64: bool,
}

/// Where the EOCD says the central directory is.
struct DirectoryLocation {
    cd_offset: u64,
    cd_size: u64,
    total_entries: u64,
    /// The directory must end at or before this offset.
    limit: u64,
    zip64: bool,
}

/// Low-level ZIP file parser.
///
/// Typically used through [`Container`](crate::Container)
/// rather than directly.
///
/// ```ignore
/// let parser = ZipParser::new(source);
/// let directory = parser.read_directory().await?;
/// for entry in &directory.entries {
///     println!("{}", entry.file_name);
/// }
/// ```
pub struct ZipParser<S: ByteSource> {
    source: Arc<S>,
    /// Total size of the archive in bytes
    size: u64,
}

impl<S: ByteSource> ZipParser<S> {
    pub fn new(source: Arc<S>) -> Self {
        let size = source.len();
        Self { source, size }
    }

    /// Read the ZIP64 End of Central Directory record.
    ///
    /// Called when the regular EOCD indicates ZIP64 extensions are needed
    /// (fields set to 0xFFFF or 0xFFFFFFFF). Returns the record and its offset.
    pub async fn read_zip64_eocd(&self, eocd_offset: u64) -> ZipResult<(Zip64Eocd, u64)> {
        // The ZIP64 EOCD Locator is located immediately before the regular EOCD
        let locator_offset = eocd_offset
            .checked_sub(Zip64EocdLocator::SIZE as u64)
            .ok_or_else(|| ZipError::malformed("no room for a Zip64 locator"))?;
        let locator_buf = self
            .source
            .read_range(locator_offset, Zip64EocdLocator::SIZE as u64)
            .await?;
        let locator = Zip64EocdLocator::from_bytes(&locator_buf).ok_or_else(|| {
            ZipError::malformed("Zip64 sentinel values without a Zip64 locator")
        })?;
        trace!("{:?}", locator);

        if locator.disk_with_eocd64 != 0 || locator.total_disks > 1 {
            return Err(ZipError::malformed(format!(
                "multi-disk archives aren't supported: Zip64 locator reports {} disks",
                locator.total_disks
            )));
        }

        let record_end = locator
            .eocd64_offset
            .checked_add(Zip64Eocd::MIN_SIZE as u64)
            .filter(|end| *end <= locator_offset)
            .ok_or_else(|| ZipError::malformed("Zip64 record offset is out of bounds"))?;
        let eocd64_buf = self
            .source
            .read_range(locator.eocd64_offset, record_end - locator.eocd64_offset)
            .await?;
        let eocd64 = Zip64Eocd::from_bytes(&eocd64_buf)?;
        trace!("{:?}", eocd64);

        Ok((eocd64, locator.eocd64_offset))
    }

    /// Work out the directory's position, following Zip64 records if needed.
    async fn locate_directory(
        &self,
        eocd: &EndOfCentralDirectory,
        eocd_offset: u64,
    ) -> ZipResult<DirectoryLocation> {
        let (disk, disk_with_cd, disk_entries, location) = if eocd.is_zip64() {
            let (eocd64, eocd64_offset) = self.read_zip64_eocd(eocd_offset).await?;
            (
                eocd64.disk_number,
                eocd64.disk_with_cd,
                eocd64.disk_entries,
                DirectoryLocation {
                    cd_offset: eocd64.cd_offset,
                    cd_size: eocd64.cd_size,
                    total_entries: eocd64.total_entries,
                    limit: eocd64_offset,
                    zip64: true,
                },
            )
        } else {
            (
                eocd.disk_number as u32,
                eocd.disk_with_cd as u32,
                eocd.disk_entries as u64,
                DirectoryLocation {
                    cd_offset: eocd.cd_offset as u64,
                    cd_size: eocd.cd_size as u64,
                    total_entries: eocd.total_entries as u64,
                    limit: eocd_offset,
                    zip64: false,
                },
            )
        };

        if disk != 0 || disk_with_cd != 0 || disk_entries != location.total_entries {
            return Err(ZipError::malformed(format!(
                "multi-disk archives aren't supported: disk {}, directory on disk {}, {} of {} entries on this disk",
                disk, disk_with_cd, disk_entries, location.total_entries
            )));
        }

        let in_bounds = location
            .cd_offset
            .checked_add(location.cd_size)
            .is_some_and(|end| end <= location.limit);
        if !in_bounds {
            return Err(ZipError::malformed(format!(
                "central directory at {}+{} overlaps its end record at {}",
                location.cd_offset, location.cd_size, location.limit
            )));
        }

        // Every header is at least 46 bytes, which also caps the allocation below.
        if location.total_entries > location.cd_size / CDFH_MIN_SIZE as u64 {
            return Err(ZipError::malformed(format!(
                "{} entries can't fit in a {} byte central directory",
                location.total_entries, location.cd_size
            )));
        }

        Ok(location)
    }

    /// Locate and parse the whole central directory.
    ///
    /// Most archives have no comment, so the last 22 bytes are tried first.
    /// Otherwise the tail is searched backwards for end records whose comment
    /// length reaches exactly to the end of the file. A comment may itself
    /// contain something that looks like an end record, so a candidate wins
    /// outright only if its directory parses and ends right where the record
    /// (or its Zip64 record) begins. A record inside the comment can't meet
    /// that, since any directory it describes ends before the real record.
    /// Failing that, the first candidate from the end whose directory parses
    /// is used.
    pub async fn read_directory(&self) -> ZipResult<CentralDirectory> {
        let eocd_size = EndOfCentralDirectory::SIZE as u64;
        if self.size < eocd_size {
            return Err(ZipError::malformed(format!(
                "{} bytes is too small for an end of central directory record",
                self.size
            )));
        }

        let mut search = CandidateSearch::default();

        let offset = self.size - eocd_size;
        let tail = self.source.read_range(offset, eocd_size).await?;
        if let Some(eocd) = eocd_candidate(&tail, 0, offset) {
            let result = self.read_directory_at(eocd, offset, Vec::new()).await;
            if let Some(found) = search.settle(result, offset) {
                return found;
            }
        }

        let search_size = (MAX_COMMENT_SIZE + eocd_size).min(self.size);
        let search_start = self.size - search_size;
        let buf = self.source.read_range(search_start, search_size).await?;

        for i in scan_for_eocd(&buf, search_start) {
            let at = search_start + i as u64;
            if at == offset {
                // Already tried above
                continue;
            }
            let Some(eocd) = eocd_candidate(&buf, i, at) else {
                continue;
            };
            let comment = buf[i + EndOfCentralDirectory::SIZE..].to_vec();
            let result = self.read_directory_at(eocd, at, comment).await;
            if let Some(found) = search.settle(result, at) {
                return found;
            }
        }

        search.finish()
    }

    /// Parse the directory described by the end record at `eocd_offset`.
    async fn read_directory_at(
        &self,
        eocd: EndOfCentralDirectory,
        eocd_offset: u64,
        comment: Vec<u8>,
    ) -> ZipResult<(CentralDirectory, bool)> {
        trace!("{:?} at {}", eocd, eocd_offset);

        let location = self.locate_directory(&eocd, eocd_offset).await?;
        trace!(
            "{} entries at offset {}, {} bytes",
            location.total_entries, location.cd_offset, location.cd_size
        );

        let cd_data = self
            .source
            .read_range(location.cd_offset, location.cd_size)
            .await?;

        let mut entries = Vec::with_capacity(location.total_entries as usize);
        let mut cursor = Cursor::new(cd_data.as_slice());
        for i in 0..location.total_entries {
            let entry = parse_cdfh(&mut cursor).map_err(|e| match e {
                ZipError::MalformedArchive(detail) => ZipError::malformed(format!(
                    "central directory entry {} of {}: {}",
                    i + 1,
                    location.total_entries,
                    detail
                )),
                other => other,
            })?;
            debug!("{:?}", entry);
            entries.push(entry);
        }

        // Bounds were checked by locate_directory, so this can't overflow.
        let adjacent = location.cd_offset + location.cd_size == location.limit;
        let directory = CentralDirectory {
            entries,
            total_entries: location.total_entries,
            cd_offset: location.cd_offset,
            cd_size: location.cd_size,
            comment,
            zip64: location.zip64,
        };
        Ok((directory, adjacent))
    }
}

/// Bookkeeping while end record candidates are tried.
#[derive(Default)]
struct CandidateSearch {
    /// First parseable directory that isn't adjacent to its record
    fallback: Option<CentralDirectory>,
    first_error: Option<ZipError>,
}

impl CandidateSearch {
    /// Record the outcome of the candidate at `at`.
    ///
    /// Returns the final result once no further candidate needs trying.
    fn settle(
        &mut self,
        result: ZipResult<(CentralDirectory, bool)>,
        at: u64,
    ) -> Option<ZipResult<CentralDirectory>> {
        match result {
            Ok((directory, true)) => Some(Ok(directory)),
            Ok((directory, false)) => {
                debug!("Directory of end record at {} doesn't end at it", at);
                self.fallback.get_or_insert(directory);
                None
            }
            Err(e @ ZipError::MalformedArchive(_)) => {
                debug!("End record at {} rejected: {}", at, e);
                self.first_error.get_or_insert(e);
                None
            }
            Err(e) => Some(Err(e)),
        }
    }

    fn finish(self) -> ZipResult<CentralDirectory> {
        if let Some(directory) = self.fallback {
            return Ok(directory);
        }
        Err(self.first_error.unwrap_or_else(|| {
            ZipError::malformed("couldn't find the end of central directory record")
        }))
    }
}

/// Returns the record if `buf[i..]` holds a plausible EOCD
/// for an archive where `buf[i]` sits at absolute offset `at`.
fn eocd_candidate(buf: &[u8], i: usize, at: u64) -> Option<EndOfCentralDirectory> {
    let eocd = EndOfCentralDirectory::from_bytes(buf.get(i..)?).ok()?;

    // The comment must run exactly to the end of the file.
    if eocd.comment_len as usize != buf.len() - i - EndOfCentralDirectory::SIZE {
        return None;
    }
    // A non-Zip64 directory has to end before its own end record.
    if !eocd.is_zip64() && eocd.cd_offset as u64 + eocd.cd_size as u64 > at {
        return None;
    }
    Some(eocd)
}

/// Positions in `buf` (the tail of the archive, starting at `base`) holding a
/// plausible EOCD, from the end of the file backwards.
fn scan_for_eocd(buf: &[u8], base: u64) -> impl Iterator<Item = usize> + '_ {
    let last = buf.len().checked_sub(EndOfCentralDirectory::SIZE);
    last.into_iter()
        .flat_map(|last| (0..=last).rev())
        .filter(move |&i| eocd_candidate(buf, i, base + i as u64).is_some())
}

/// Parse a Central Directory File Header from a cursor.
///
/// The CDFH contains metadata about a file in the archive, including
/// its name, sizes, and location of the actual file data.
fn parse_cdfh(cursor: &mut Cursor<&[u8]>) -> ZipResult<ZipFileEntry> {
    let data: &[u8] = *cursor.get_ref();
    let start = cursor.position() as usize;
    let header = data
        .get(start..start + CDFH_MIN_SIZE)
        .ok_or_else(|| ZipError::malformed("directory ends inside a header"))?;
    if header[..4] != CDFH_SIGNATURE.to_le_bytes() {
        return Err(ZipError::malformed("invalid central directory header signature"));
    }

    let mut fields = Cursor::new(&header[4..]);
    let raw = RawCdfh::read(&mut fields)
        .map_err(|_| ZipError::malformed("truncated central directory header"))?;

    // Read the variable-length name, extra field and comment
    let name_start = start + CDFH_MIN_SIZE;
    let extra_start = name_start + raw.file_name_length as usize;
    let comment_start = extra_start + raw.extra_field_length as usize;
    let end = comment_start + raw.file_comment_length as usize;
    if end > data.len() {
        return Err(ZipError::malformed("directory ends inside a header's name or extra field"));
    }
    let raw_name = data[name_start..extra_start].to_vec();
    let extra = &data[extra_start..comment_start];
    cursor.set_position(end as u64);

    let file_name = decode_name(&raw_name, raw.flags)?;

    if raw.disk_number_start != 0 && raw.disk_number_start != ZIP64_SENTINEL_16 {
        return Err(ZipError::malformed(format!(
            "multi-disk archives aren't supported: {} claims to be on disk {}",
            file_name, raw.disk_number_start
        )));
    }

    // Core values win; only sentinels are replaced from the Zip64 extra field.
    let mut uncompressed_size = raw.uncompressed_size as u64;
    let mut compressed_size = raw.compressed_size as u64;
    let mut lfh_offset = raw.lfh_offset as u64;
    apply_zip64_extra(
        extra,
        &mut uncompressed_size,
        &mut compressed_size,
        Some(&mut lfh_offset),
    )
    .map_err(|detail| ZipError::malformed(format!("{}: {}", file_name, detail)))?;

    Ok(ZipFileEntry {
        file_name,
        raw_name,
        compression_method: CompressionMethod::from_u16(raw.compression_method),
        compressed_size,
        uncompressed_size,
        crc32: raw.crc32,
        lfh_offset,
        flags: raw.flags,
        version_made_by: raw.version_made_by,
        internal_attrs: raw.internal_attrs,
        external_attrs: raw.external_attrs,
        last_mod_time: raw.last_mod_time,
        last_mod_date: raw.last_mod_date,
    })
}

/// Fixed-size fields of a central directory header, after the signature.
struct RawCdfh {
    version_made_by: u16,
    flags: u16,
    compression_method: u16,
    last_mod_time: u16,
    last_mod_date: u16,
    crc32: u32,
    compressed_size: u32,
    uncompressed_size: u32,
    file_name_length: u16,
    extra_field_length: u16,
    file_comment_length: u16,
    disk_number_start: u16,
    internal_attrs: u16,
    external_attrs: u32,
    lfh_offset: u32,
}

impl RawCdfh {
    fn read(cursor: &mut Cursor<&[u8]>) -> std::io::Result<Self> {
        let version_made_by = cursor.read_u16::<LittleEndian>()?;
        let _version_needed = cursor.read_u16::<LittleEndian>()?;
        Ok(Self {
            version_made_by,
            flags: cursor.read_u16::<LittleEndian>()?,
            compression_method: cursor.read_u16::<LittleEndian>()?,
            last_mod_time: cursor.read_u16::<LittleEndian>()?,
            last_mod_date: cursor.read_u16::<LittleEndian>()?,
            crc32: cursor.read_u32::<LittleEndian>()?,
            compressed_size: cursor.read_u32::<LittleEndian>()?,
            uncompressed_size: cursor.read_u32::<LittleEndian>()?,
            file_name_length: cursor.read_u16::<LittleEndian>()?,
            extra_field_length: cursor.read_u16::<LittleEndian>()?,
            file_comment_length: cursor.read_u16::<LittleEndian>()?,
            disk_number_start: cursor.read_u16::<LittleEndian>()?,
            internal_attrs: cursor.read_u16::<LittleEndian>()?,
            external_attrs: cursor.read_u32::<LittleEndian>()?,
            lfh_offset: cursor.read_u32::<LittleEndian>()?,
        })
    }
}
