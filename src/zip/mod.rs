//! ZIP archive parsing and extraction.
//!
//! ## Architecture
//!
//! - [`structures`]: fixed-size records (EOCD, Zip64 records, file headers) and the entry type
//! - [`parser`]: finds and parses the central directory
//! - [`index`]: name lookup over the parsed entries
//! - [`extractor`]: local header checks, decompression and CRC verification
//! - [`cache`]: optional shared cache of decompressed entries
//!
//! ## ZIP Format Overview
//!
//! A ZIP file consists of:
//! 1. Local file headers and compressed data for each file
//! 2. Central Directory with metadata for all files
//! 3. End of Central Directory (EOCD) record at the end
//!
//! The EOCD is read first (from the end of the file), then the Central
//! Directory, so listing never touches file data. With an HTTP source that
//! means two or three range requests regardless of archive size.
//!
//! ## Supported Features
//!
//! - ZIP64 extensions for files and archives over 4GB
//! - STORED and DEFLATE compression methods
//! - UTF-8 and code page 437 file names
//!
//! ## Limitations
//!
//! - No encryption support
//! - No multi-disk archive support
//! - No BZIP2, LZMA, or other compression methods

pub mod cache;
pub mod extractor;
pub mod index;
pub mod parser;
pub mod structures;

pub use cache::EntryCache;
pub use extractor::ZipExtractor;
pub use index::EntryIndex;
pub use parser::{CentralDirectory, ZipParser};
pub use structures::{CompressionMethod, ZipFileEntry};
