//! Test-only archive writer and instrumented source.

#![allow(dead_code)]

use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use flate2::Compression;
use flate2::write::DeflateEncoder;

use zip_container::{ByteSource, MemorySource, ZipResult};

const SENTINEL_32: u32 = 0xFFFF_FFFF;
const FLAG_DATA_DESCRIPTOR: u16 = 1 << 3;
// 2021-06-15, 13:45:30
const DOS_DATE: u16 = (41 << 9) | (6 << 5) | 15;
const DOS_TIME: u16 = (13 << 11) | (45 << 5) | 15;

#[derive(Clone, Debug)]
pub struct Entry {
    pub name: Vec<u8>,
    pub method: u16,
    pub payload: Vec<u8>,
    pub crc32: u32,
    pub uncompressed_size: u64,
    pub flags: u16,
    /// Compression method written to the local header instead of `method`
    pub local_method: Option<u16>,
}

impl Entry {
    pub fn stored(name: &str, data: &[u8]) -> Self {
        Self::raw(name.as_bytes(), 0, data.to_vec(), data)
    }

    pub fn deflated(name: &str, data: &[u8]) -> Self {
        let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        Self::raw(name.as_bytes(), 8, encoder.finish().unwrap(), data)
    }

    pub fn dir(name: &str) -> Self {
        Self::stored(name, b"")
    }

    /// An entry with an arbitrary method and payload describing `data`
    pub fn raw(name: &[u8], method: u16, payload: Vec<u8>, data: &[u8]) -> Self {
        Self {
            name: name.to_vec(),
            method,
            payload,
            crc32: crc32fast::hash(data),
            uncompressed_size: data.len() as u64,
            flags: 0,
            local_method: None,
        }
    }

    pub fn with_crc(mut self, crc32: u32) -> Self {
        self.crc32 = crc32;
        self
    }

    pub fn with_flags(mut self, flags: u16) -> Self {
        self.flags = flags;
        self
    }

    pub fn with_local_method(mut self, method: u16) -> Self {
        self.local_method = Some(method);
        self
    }
}

/// Writes small but complete archives.
#[derive(Clone, Debug, Default)]
pub struct ZipBuilder {
    entries: Vec<Entry>,
    comment: Vec<u8>,
    zip64: bool,
}

impl ZipBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entry(mut self, entry: Entry) -> Self {
        self.entries.push(entry);
        self
    }

    pub fn stored(self, name: &str, data: &[u8]) -> Self {
        self.entry(Entry::stored(name, data))
    }

    pub fn deflated(self, name: &str, data: &[u8]) -> Self {
        self.entry(Entry::deflated(name, data))
    }

    pub fn comment(mut self, comment: &[u8]) -> Self {
        self.comment = comment.to_vec();
        self
    }

    /// Write every size, offset and count through Zip64 records.
    pub fn zip64(mut self) -> Self {
        self.zip64 = true;
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let mut out = Vec::new();
        let version = if self.zip64 { 45u16 } else { 20 };

        let mut offsets = Vec::with_capacity(self.entries.len());
        for e in &self.entries {
            offsets.push(out.len() as u64);
            let descriptor = e.flags & FLAG_DATA_DESCRIPTOR != 0;
            let compressed = e.payload.len() as u64;

            let (crc, local_compressed, local_uncompressed, extra) = if descriptor {
                (0, 0, 0, Vec::new())
            } else if self.zip64 {
                (
                    e.crc32,
                    SENTINEL_32,
                    SENTINEL_32,
                    zip64_extra(&[e.uncompressed_size, compressed]),
                )
            } else {
                (e.crc32, compressed as u32, e.uncompressed_size as u32, Vec::new())
            };

            out.extend_from_slice(&0x0403_4b50u32.to_le_bytes());
            put16(&mut out, version);
            put16(&mut out, e.flags);
            put16(&mut out, e.local_method.unwrap_or(e.method));
            put16(&mut out, DOS_TIME);
            put16(&mut out, DOS_DATE);
            put32(&mut out, crc);
            put32(&mut out, local_compressed);
            put32(&mut out, local_uncompressed);
            put16(&mut out, e.name.len() as u16);
            put16(&mut out, extra.len() as u16);
            out.extend_from_slice(&e.name);
            out.extend_from_slice(&extra);
            out.extend_from_slice(&e.payload);

            if descriptor {
                out.extend_from_slice(&0x0807_4b50u32.to_le_bytes());
                put32(&mut out, e.crc32);
                put32(&mut out, compressed as u32);
                put32(&mut out, e.uncompressed_size as u32);
            }
        }

        let cd_offset = out.len() as u64;
        for (e, offset) in self.entries.iter().zip(&offsets) {
            let compressed = e.payload.len() as u64;
            let (core_compressed, core_uncompressed, core_offset, extra) = if self.zip64 {
                (
                    SENTINEL_32,
                    SENTINEL_32,
                    SENTINEL_32,
                    zip64_extra(&[e.uncompressed_size, compressed, *offset]),
                )
            } else {
                (
                    compressed as u32,
                    e.uncompressed_size as u32,
                    *offset as u32,
                    Vec::new(),
                )
            };

            out.extend_from_slice(&0x0201_4b50u32.to_le_bytes());
            // Made on Unix
            put16(&mut out, (3 << 8) | version);
            put16(&mut out, version);
            put16(&mut out, e.flags);
            put16(&mut out, e.method);
            put16(&mut out, DOS_TIME);
            put16(&mut out, DOS_DATE);
            put32(&mut out, e.crc32);
            put32(&mut out, core_compressed);
            put32(&mut out, core_uncompressed);
            put16(&mut out, e.name.len() as u16);
            put16(&mut out, extra.len() as u16);
            // comment length, disk number, internal attributes
            put16(&mut out, 0);
            put16(&mut out, 0);
            put16(&mut out, 0);
            let mode: u32 = if e.name.ends_with(b"/") { 0o040755 } else { 0o100644 };
            put32(&mut out, mode << 16);
            put32(&mut out, core_offset);
            out.extend_from_slice(&e.name);
            out.extend_from_slice(&extra);
        }
        let cd_size = out.len() as u64 - cd_offset;
        let count = self.entries.len() as u64;

        if self.zip64 {
            let eocd64_offset = out.len() as u64;
            out.extend_from_slice(&0x0606_4b50u32.to_le_bytes());
            put64(&mut out, 44);
            put16(&mut out, version);
            put16(&mut out, version);
            put32(&mut out, 0);
            put32(&mut out, 0);
            put64(&mut out, count);
            put64(&mut out, count);
            put64(&mut out, cd_size);
            put64(&mut out, cd_offset);

            out.extend_from_slice(&0x0706_4b50u32.to_le_bytes());
            put32(&mut out, 0);
            put64(&mut out, eocd64_offset);
            put32(&mut out, 1);

            write_eocd(&mut out, 0xFFFF, SENTINEL_32, SENTINEL_32, &self.comment);
        } else {
            write_eocd(
                &mut out,
                count as u16,
                cd_size as u32,
                cd_offset as u32,
                &self.comment,
            );
        }
        out
    }
}

/// A bare end of central directory record
pub fn eocd(entries: u16, cd_size: u32, cd_offset: u32, comment: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    write_eocd(&mut out, entries, cd_size, cd_offset, comment);
    out
}

fn write_eocd(out: &mut Vec<u8>, entries: u16, cd_size: u32, cd_offset: u32, comment: &[u8]) {
    out.extend_from_slice(&0x0605_4b50u32.to_le_bytes());
    put16(out, 0);
    put16(out, 0);
    put16(out, entries);
    put16(out, entries);
    put32(out, cd_size);
    put32(out, cd_offset);
    put16(out, comment.len() as u16);
    out.extend_from_slice(comment);
}

fn zip64_extra(values: &[u64]) -> Vec<u8> {
    let mut extra = Vec::new();
    put16(&mut extra, 0x0001);
    put16(&mut extra, (values.len() * 8) as u16);
    for value in values {
        put64(&mut extra, *value);
    }
    extra
}

fn put16(out: &mut Vec<u8>, value: u16) {
    out.extend_from_slice(&value.to_le_bytes());
}

fn put32(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_le_bytes());
}

fn put64(out: &mut Vec<u8>, value: u64) {
    out.extend_from_slice(&value.to_le_bytes());
}

/// A memory source that counts reads and can make each one wait.
pub struct CountingSource {
    inner: MemorySource,
    delay: Option<Duration>,
    reads: AtomicUsize,
}

impl CountingSource {
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            inner: MemorySource::new(data),
            delay: None,
            reads: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ByteSource for CountingSource {
    async fn read_range(&self, offset: u64, len: u64) -> ZipResult<Vec<u8>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.inner.read_range(offset, len).await
    }

    fn len(&self) -> u64 {
        self.inner.len()
    }
}

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}
