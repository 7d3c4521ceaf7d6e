use std::borrow::Cow;
use std::io::Cursor;

use byteorder::{LittleEndian, ReadBytesExt};
use codepage_437::*;

use crate::error::{ZipError, ZipResult};

/// Value stored in a 32-bit field whose real value lives in the Zip64 extra field
pub const ZIP64_SENTINEL_32: u32 = 0xFFFF_FFFF;
/// Value stored in a 16-bit count whose real value lives in the Zip64 record
pub const ZIP64_SENTINEL_16: u16 = 0xFFFF;

/// Header ID of the Zip64 extended information extra field
const ZIP64_EXTRA_ID: u16 = 0x0001;

/// General purpose flag: file is encrypted
const FLAG_ENCRYPTED: u16 = 1 << 0;
/// General purpose flag: CRC and sizes follow the data in a data descriptor
const FLAG_DATA_DESCRIPTOR: u16 = 1 << 3;
/// General purpose flag: name and comment are UTF-8 (EFS)
const FLAG_UTF8: u16 = 1 << 11;

/// ZIP compression methods
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionMethod {
    Stored,
    Deflated,
    Unsupported(u16),
}

impl CompressionMethod {
    pub fn from_u16(value: u16) -> Self {
        match value {
            0 => CompressionMethod::Stored,
            8 => CompressionMethod::Deflated,
            _ => CompressionMethod::Unsupported(value),
        }
    }

    pub fn as_u16(&self) -> u16 {
        match self {
            CompressionMethod::Stored => 0,
            CompressionMethod::Deflated => 8,
            CompressionMethod::Unsupported(v) => *v,
        }
    }
}

/// End of Central Directory (EOCD) - 22 bytes minimum
#[derive(Debug, Clone)]
pub struct EndOfCentralDirectory {
    pub disk_number: u16,
    pub disk_with_cd: u16,
    pub disk_entries: u16,
    pub total_entries: u16,
    pub cd_size: u32,
    pub cd_offset: u32,
    pub comment_len: u16,
}

impl EndOfCentralDirectory {
    pub const SIGNATURE: u32 = 0x0605_4b50;
    pub const SIZE: usize = 22;

    pub fn from_bytes(data: &[u8]) -> ZipResult<Self> {
        if data.len() < Self::SIZE || read_signature(data) != Self::SIGNATURE {
            return Err(ZipError::malformed("invalid end of central directory record"));
        }

        let mut cursor = Cursor::new(&data[4..Self::SIZE]);
        Self::read_fields(&mut cursor)
            .map_err(|_| ZipError::malformed("truncated end of central directory record"))
    }

    fn read_fields(cursor: &mut Cursor<&[u8]>) -> std::io::Result<Self> {
        Ok(Self {
            disk_number: cursor.read_u16::<LittleEndian>()?,
            disk_with_cd: cursor.read_u16::<LittleEndian>()?,
            disk_entries: cursor.read_u16::<LittleEndian>()?,
            total_entries: cursor.read_u16::<LittleEndian>()?,
            cd_size: cursor.read_u32::<LittleEndian>()?,
            cd_offset: cursor.read_u32::<LittleEndian>()?,
            comment_len: cursor.read_u16::<LittleEndian>()?,
        })
    }

    /// True if any field defers to the Zip64 end of central directory record.
    pub fn is_zip64(&self) -> bool {
        self.disk_entries == ZIP64_SENTINEL_16
            || self.total_entries == ZIP64_SENTINEL_16
            || self.cd_size == ZIP64_SENTINEL_32
            || self.cd_offset == ZIP64_SENTINEL_32
    }
}

/// ZIP64 End of Central Directory Locator - 20 bytes
#[derive(Debug, Clone)]
pub struct Zip64EocdLocator {
    pub disk_with_eocd64: u32,
    pub eocd64_offset: u64,
    pub total_disks: u32,
}

impl Zip64EocdLocator {
    pub const SIGNATURE: u32 = 0x0706_4b50;
    pub const SIZE: usize = 20;

    /// Returns `None` unless `data` starts with a locator.
    pub fn from_bytes(data: &[u8]) -> Option<Self> {
        if data.len() < Self::SIZE || read_signature(data) != Self::SIGNATURE {
            return None;
        }

        let mut cursor = Cursor::new(&data[4..Self::SIZE]);
        Some(Self {
            disk_with_eocd64: cursor.read_u32::<LittleEndian>().ok()?,
            eocd64_offset: cursor.read_u64::<LittleEndian>().ok()?,
            total_disks: cursor.read_u32::<LittleEndian>().ok()?,
        })
    }
}

/// ZIP64 End of Central Directory - 56 bytes minimum
#[derive(Debug, Clone)]
pub struct Zip64Eocd {
    pub eocd64_size: u64,
    pub version_made_by: u16,
    pub version_needed: u16,
    pub disk_number: u32,
    pub disk_with_cd: u32,
    pub disk_entries: u64,
    pub total_entries: u64,
    pub cd_size: u64,
    pub cd_offset: u64,
}

impl Zip64Eocd {
    pub const SIGNATURE: u32 = 0x0606_4b50;
    pub const MIN_SIZE: usize = 56;

    pub fn from_bytes(data: &[u8]) -> ZipResult<Self> {
        if data.len() < Self::MIN_SIZE || read_signature(data) != Self::SIGNATURE {
            return Err(ZipError::malformed(
                "invalid Zip64 end of central directory record",
            ));
        }

        let mut cursor = Cursor::new(&data[4..Self::MIN_SIZE]);
        Self::read_fields(&mut cursor)
            .map_err(|_| ZipError::malformed("truncated Zip64 end of central directory record"))
    }

    fn read_fields(cursor: &mut Cursor<&[u8]>) -> std::io::Result<Self> {
        Ok(Self {
            eocd64_size: cursor.read_u64::<LittleEndian>()?,
            version_made_by: cursor.read_u16::<LittleEndian>()?,
            version_needed: cursor.read_u16::<LittleEndian>()?,
            disk_number: cursor.read_u32::<LittleEndian>()?,
            disk_with_cd: cursor.read_u32::<LittleEndian>()?,
            disk_entries: cursor.read_u64::<LittleEndian>()?,
            total_entries: cursor.read_u64::<LittleEndian>()?,
            cd_size: cursor.read_u64::<LittleEndian>()?,
            cd_offset: cursor.read_u64::<LittleEndian>()?,
        })
    }
}

/// Central Directory File Header (CDFH) - 46 bytes minimum
pub const CDFH_SIGNATURE: u32 = 0x0201_4b50;
pub const CDFH_MIN_SIZE: usize = 46;

/// Local File Header (LFH) - 30 bytes
#[derive(Debug, Clone)]
pub struct LocalFileHeader {
    pub version_needed: u16,
    pub flags: u16,
    pub compression_method: u16,
    pub last_mod_time: u16,
    pub last_mod_date: u16,
    pub crc32: u32,
    pub compressed_size: u32,
    pub uncompressed_size: u32,
    pub file_name_length: u16,
    pub extra_field_length: u16,
}

impl LocalFileHeader {
    pub const SIGNATURE: u32 = 0x0403_4b50;
    pub const SIZE: usize = 30;

    /// Returns `None` unless `data` starts with a local file header.
    pub fn from_bytes(data: &[u8]) -> Option<Self> {
        if data.len() < Self::SIZE || read_signature(data) != Self::SIGNATURE {
            return None;
        }

        let mut cursor = Cursor::new(&data[4..Self::SIZE]);
        Some(Self {
            version_needed: cursor.read_u16::<LittleEndian>().ok()?,
            flags: cursor.read_u16::<LittleEndian>().ok()?,
            compression_method: cursor.read_u16::<LittleEndian>().ok()?,
            last_mod_time: cursor.read_u16::<LittleEndian>().ok()?,
            last_mod_date: cursor.read_u16::<LittleEndian>().ok()?,
            crc32: cursor.read_u32::<LittleEndian>().ok()?,
            compressed_size: cursor.read_u32::<LittleEndian>().ok()?,
            uncompressed_size: cursor.read_u32::<LittleEndian>().ok()?,
            file_name_length: cursor.read_u16::<LittleEndian>().ok()?,
            extra_field_length: cursor.read_u16::<LittleEndian>().ok()?,
        })
    }

    /// Length of the name and extra field following the fixed header.
    pub fn variable_len(&self) -> u64 {
        self.file_name_length as u64 + self.extra_field_length as u64
    }

    pub fn has_data_descriptor(&self) -> bool {
        self.flags & FLAG_DATA_DESCRIPTOR != 0
    }
}

/// Parsed ZIP file entry information
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZipFileEntry {
    /// Decoded name, see [`decode_name`]
    pub file_name: String,
    /// Name exactly as stored in the central directory
    pub raw_name: Vec<u8>,
    pub compression_method: CompressionMethod,
    pub compressed_size: u64,
    pub uncompressed_size: u64,
    pub crc32: u32,
    /// Absolute offset of the local file header
    pub lfh_offset: u64,
    pub flags: u16,
    pub version_made_by: u16,
    pub internal_attrs: u16,
    pub external_attrs: u32,
    pub last_mod_time: u16,
    pub last_mod_date: u16,
}

impl ZipFileEntry {
    /// Directory entries end with '/'
    pub fn is_dir(&self) -> bool {
        self.file_name.ends_with('/')
    }

    pub fn is_file(&self) -> bool {
        !self.is_dir()
    }

    pub fn is_encrypted(&self) -> bool {
        self.flags & FLAG_ENCRYPTED != 0
    }

    pub fn has_data_descriptor(&self) -> bool {
        self.flags & FLAG_DATA_DESCRIPTOR != 0
    }

    /// Unix mode bits, if the entry was archived on a Unix host.
    ///
    /// No attempt is made to translate DOS attributes.
    pub fn unix_mode(&self) -> Option<u32> {
        // Upper byte of "version made by" is the host system; 3 is Unix.
        if self.version_made_by >> 8 == 3 {
            Some(self.external_attrs >> 16)
        } else {
            None
        }
    }

    pub fn is_symlink(&self) -> bool {
        self.unix_mode()
            .is_some_and(|mode| mode & 0o170000 == 0o120000)
    }

    /// Parse modification date to (year, month, day)
    pub fn mod_date(&self) -> (u16, u8, u8) {
        let day = (self.last_mod_date & 0x1F) as u8;
        let month = ((self.last_mod_date >> 5) & 0x0F) as u8;
        let year = ((self.last_mod_date >> 9) & 0x7F) + 1980;
        (year, month, day)
    }

    /// Parse modification time to (hour, minute, second)
    pub fn mod_time(&self) -> (u8, u8, u8) {
        let second = ((self.last_mod_time & 0x1F) * 2) as u8;
        let minute = ((self.last_mod_time >> 5) & 0x3F) as u8;
        let hour = ((self.last_mod_time >> 11) & 0x1F) as u8;
        (hour, minute, second)
    }
}

fn read_signature(data: &[u8]) -> u32 {
    u32::from_le_bytes([data[0], data[1], data[2], data[3]])
}

/// Decode a stored name.
///
/// With the UTF-8 flag set the bytes must be UTF-8. Without it, names that
/// happen to be valid UTF-8 are taken as is and anything else is read as
/// code page 437.
pub fn decode_name(raw: &[u8], flags: u16) -> ZipResult<String> {
    match std::str::from_utf8(raw) {
        Ok(name) => Ok(name.to_string()),
        Err(_) if flags & FLAG_UTF8 != 0 => Err(ZipError::malformed(format!(
            "name {:?} is flagged UTF-8 but isn't",
            String::from_utf8_lossy(raw)
        ))),
        Err(_) => {
            let name: Cow<str> = Cow::borrow_from_cp437(raw, &CP437_CONTROL);
            Ok(name.into_owned())
        }
    }
}

/// Replace sentinel sizes (and optionally the header offset) with the values
/// of the Zip64 extended information extra field.
///
/// The extra field only carries the values whose core field is the sentinel,
/// in the order uncompressed size, compressed size, header offset. Core
/// fields holding a real value are never overwritten.
pub fn apply_zip64_extra(
    extra: &[u8],
    uncompressed_size: &mut u64,
    compressed_size: &mut u64,
    mut lfh_offset: Option<&mut u64>,
) -> Result<(), &'static str> {
    let sentinel = ZIP64_SENTINEL_32 as u64;
    let needs_offset = lfh_offset.as_deref().is_some_and(|o| *o == sentinel);
    if *uncompressed_size != sentinel && *compressed_size != sentinel && !needs_offset {
        return Ok(());
    }

    let Some(field) = find_extra_field(extra, ZIP64_EXTRA_ID) else {
        return Err("Zip64 sizes without a Zip64 extra field");
    };

    let mut cursor = Cursor::new(field);
    let mut take = |value: &mut u64| -> Result<(), &'static str> {
        if *value == sentinel {
            *value = cursor
                .read_u64::<LittleEndian>()
                .map_err(|_| "Zip64 extra field is too short")?;
        }
        Ok(())
    };
    take(uncompressed_size)?;
    take(compressed_size)?;
    if let Some(offset) = lfh_offset.as_deref_mut() {
        take(offset)?;
    }
    Ok(())
}

/// Find the data of the extra field with header `id`.
fn find_extra_field(mut extra: &[u8], id: u16) -> Option<&[u8]> {
    while extra.len() >= 4 {
        let header_id = u16::from_le_bytes([extra[0], extra[1]]);
        let size = u16::from_le_bytes([extra[2], extra[3]]) as usize;
        let rest = &extra[4..];
        if rest.len() < size {
            return None;
        }
        if header_id == id {
            return Some(&rest[..size]);
        }
        extra = &rest[size..];
    }
    None
}
