//! # zip-container
//!
//! Random-access reading of ZIP archives from HTTP URLs, local files or memory.
//!
//! Opening an archive reads only its end: the end of central directory
//! record and the central directory. For remote archives this uses HTTP
//! Range requests, so listing a multi-gigabyte archive costs a few kilobytes.
//! Files are then fetched and decompressed one at a time, on demand.
//!
//! ## Features
//!
//! - Remote archives via HTTP Range requests, with a full-download fallback
//! - ZIP64 archives (entries and archives larger than 4GB)
//! - STORED and DEFLATE entries, CRC-32 checked
//! - Local header cross-checks against the central directory
//! - Optional cache so concurrent readers of one entry decompress it once
//!
//! ## Example
//!
//! ```no_run
//! use zip_container::{Container, FetchOptions};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let container =
//!         Container::open_url("https://example.com/archive.zip", &FetchOptions::default()).await?;
//!
//!     for name in container.list_names() {
//!         println!("{}", name);
//!     }
//!
//!     let data = container.read("docs/index.html").await?;
//!     println!("{} bytes", data.len());
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod container;
pub mod definition;
pub mod error;
pub mod io;
pub mod options;
pub mod zip;

pub use cli::Cli;
pub use container::Container;
pub use definition::{Definition, DefinitionKind};
pub use error::{ZipError, ZipResult};
pub use io::{ByteSource, FileSource, HttpSource, MemorySource};
pub use options::{ContainerOptions, FetchOptions};
pub use zip::{CompressionMethod, ZipFileEntry};
