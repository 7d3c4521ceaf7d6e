mod common;

use std::io::Write;
use std::sync::Arc;

use common::{Entry, ZipBuilder, eocd, init_logging};
use zip_container::{CompressionMethod, Container, ContainerOptions, MemorySource, ZipError};

fn open(data: Vec<u8>) -> Container<MemorySource> {
    init_logging();
    Container::open_bytes(data).unwrap()
}

#[tokio::test]
async fn stored_and_nested() {
    let zip = ZipBuilder::new()
        .stored("a.txt", b"hi")
        .deflated("b/c.txt", b"")
        .build();
    let container = open(zip);

    assert_eq!(container.list_names(), vec!["a.txt", "b/c.txt"]);
    assert_eq!(container.read("a.txt").await.unwrap(), b"hi");
    assert_eq!(container.read("b/c.txt").await.unwrap(), b"");
    assert!(matches!(
        container.read("c.txt").await,
        Err(ZipError::NotFound(name)) if name == "c.txt"
    ));
}

#[tokio::test]
async fn listing_matches_declared_count() {
    let mut builder = ZipBuilder::new();
    for i in 0..50 {
        builder = builder.stored(&format!("file-{:02}", i), format!("{}", i).as_bytes());
    }
    let container = open(builder.build());

    assert_eq!(container.len(), 50);
    assert_eq!(container.directory().total_entries, 50);
    assert_eq!(container.list_names()[49], "file-49");
    assert_eq!(container.read_to_string("file-07").await.unwrap(), "7");
}

#[tokio::test]
async fn deflated_entries_inflate_to_declared_size() {
    let text = "All work and no play makes Jack a dull boy.\n".repeat(500);
    let container = open(ZipBuilder::new().deflated("jack.txt", text.as_bytes()).build());

    let entry = container.entry("jack.txt").unwrap();
    assert_eq!(entry.compression_method, CompressionMethod::Deflated);
    assert!(entry.compressed_size < entry.uncompressed_size);

    let data = container.read("jack.txt").await.unwrap();
    assert_eq!(data.len() as u64, entry.uncompressed_size);
    assert_eq!(crc32fast::hash(&data), entry.crc32);
    assert_eq!(data, text.as_bytes());
}

#[tokio::test]
async fn every_entry_passes_its_checksum() {
    let zip = ZipBuilder::new()
        .stored("one", b"1")
        .deflated("two", &[2u8; 4096])
        .entry(Entry::dir("three/"))
        .stored("three/four", b"four")
        .build();
    let container = open(zip);

    for entry in container.entries() {
        let data = container.read_entry(entry).await.unwrap();
        assert_eq!(crc32fast::hash(&data), entry.crc32, "{}", entry.file_name);
    }
}

#[tokio::test]
async fn entry_metadata() {
    let container = open(
        ZipBuilder::new()
            .entry(Entry::dir("docs/"))
            .stored("docs/readme", b"read me")
            .build(),
    );

    let dir = container.entry("docs/").unwrap();
    assert!(dir.is_dir());
    assert_eq!(dir.unix_mode(), Some(0o040755));

    let file = container.entry("docs/readme").unwrap();
    assert!(file.is_file());
    assert!(!file.is_symlink());
    assert_eq!(file.unix_mode(), Some(0o100644));
    assert_eq!(file.mod_date(), (2021, 6, 15));
    assert_eq!(file.mod_time(), (13, 45, 30));
}

#[tokio::test]
async fn empty_archive() {
    let container = open(ZipBuilder::new().build());
    assert!(container.is_empty());
    assert!(container.list_names().is_empty());
    assert!(matches!(
        container.read("anything").await,
        Err(ZipError::NotFound(_))
    ));
}

#[test]
fn truncated_archives_are_malformed() {
    init_logging();
    let zip = ZipBuilder::new()
        .stored("a.txt", b"hi")
        .deflated("b/c.txt", b"see")
        .build();
    for len in 0..zip.len() {
        let result = Container::open_bytes(zip[..len].to_vec());
        assert!(
            matches!(result, Err(ZipError::MalformedArchive(_))),
            "prefix of {} bytes",
            len
        );
    }
}

#[tokio::test]
async fn comment_is_kept() {
    let container = open(
        ZipBuilder::new()
            .stored("a.txt", b"hi")
            .comment(b"built for tests")
            .build(),
    );
    assert_eq!(container.comment(), b"built for tests");
    assert_eq!(container.read("a.txt").await.unwrap(), b"hi");
}

#[tokio::test]
async fn fake_end_record_in_comment() {
    // A comment that ends with something shaped like an end record, pointing
    // at the local header instead of the directory.
    let fake = eocd(1, 46, 0, b"");
    let mut comment = b"trailing data: ".to_vec();
    comment.extend_from_slice(&fake);

    let zip = ZipBuilder::new()
        .stored("a.txt", b"hi")
        .comment(&comment)
        .build();
    let container = open(zip);

    assert_eq!(container.list_names(), vec!["a.txt"]);
    assert_eq!(container.comment(), comment.as_slice());
    assert_eq!(container.read("a.txt").await.unwrap(), b"hi");
}

/// Directory size and offset from the end record of a comment-less archive
fn directory_span(zip: &[u8]) -> (u32, u32) {
    let len = zip.len();
    let cd_size = u32::from_le_bytes(zip[len - 10..len - 6].try_into().unwrap());
    let cd_offset = u32::from_le_bytes(zip[len - 6..len - 2].try_into().unwrap());
    (cd_size, cd_offset)
}

#[tokio::test]
async fn parseable_fake_end_record_in_comment() {
    let builder = ZipBuilder::new().stored("a.txt", b"a").stored("b.txt", b"b");
    let (cd_size, cd_offset) = directory_span(&builder.build());

    // Skip the first 51 byte header (46 fixed + "a.txt") so the fake record
    // describes a valid one-entry directory holding only b.txt.
    let fake = eocd(1, cd_size - 51, cd_offset + 51, b"");
    let container = open(builder.comment(&fake).build());

    assert_eq!(container.list_names(), vec!["a.txt", "b.txt"]);
    assert_eq!(container.comment(), fake.as_slice());
    assert_eq!(container.read("a.txt").await.unwrap(), b"a");
}

#[tokio::test]
async fn own_end_record_copied_into_comment() {
    let builder = ZipBuilder::new().stored("a.txt", b"hi");
    let plain = builder.build();
    let copy = plain[plain.len() - 22..].to_vec();

    let container = open(builder.comment(&copy).build());
    assert_eq!(container.list_names(), vec!["a.txt"]);
    assert_eq!(container.comment().len(), 22);
    assert_eq!(container.comment(), copy.as_slice());
}

#[test]
fn directory_past_end_record_is_malformed() {
    init_logging();
    let mut zip = ZipBuilder::new().stored("a.txt", b"hi").build();
    let len = zip.len();
    // Grow the declared directory size past the end record
    zip[len - 10..len - 6].copy_from_slice(&1000u32.to_le_bytes());
    assert!(matches!(
        Container::open_bytes(zip),
        Err(ZipError::MalformedArchive(_))
    ));
}

#[test]
fn bad_directory_signature_is_malformed() {
    init_logging();
    let zip = ZipBuilder::new().stored("a.txt", b"hi").build();
    let cd_offset = 30 + 5 + 2;
    let mut broken = zip.clone();
    broken[cd_offset] = b'X';
    assert!(matches!(
        Container::open_bytes(broken),
        Err(ZipError::MalformedArchive(_))
    ));
}

#[tokio::test]
async fn zip64_archive() {
    let text = b"zip64 contents ".repeat(100);
    let zip = ZipBuilder::new()
        .stored("small.txt", b"hello")
        .deflated("big.txt", &text)
        .zip64()
        .build();
    let container = open(zip);

    assert!(container.directory().zip64);
    assert_eq!(container.list_names(), vec!["small.txt", "big.txt"]);
    let entry = container.entry("big.txt").unwrap();
    assert_eq!(entry.uncompressed_size, text.len() as u64);
    assert_ne!(entry.lfh_offset, 0xFFFF_FFFF);

    assert_eq!(container.read("small.txt").await.unwrap(), b"hello");
    assert_eq!(container.read("big.txt").await.unwrap(), text);
}

#[test]
fn zip64_sentinels_without_locator_are_malformed() {
    init_logging();
    let mut zip = ZipBuilder::new().stored("a.txt", b"hi").build();
    let len = zip.len();
    // Entry counts set to the sentinel with no Zip64 records behind them
    zip[len - 14..len - 10].copy_from_slice(&[0xFF, 0xFF, 0xFF, 0xFF]);
    assert!(matches!(
        Container::open_bytes(zip),
        Err(ZipError::MalformedArchive(_))
    ));
}

#[tokio::test]
async fn last_duplicate_wins() {
    let zip = ZipBuilder::new()
        .stored("dup.txt", b"first")
        .stored("other", b"")
        .stored("dup.txt", b"second")
        .build();
    let container = open(zip);

    assert_eq!(container.list_names(), vec!["dup.txt", "other", "dup.txt"]);
    assert_eq!(container.read("dup.txt").await.unwrap(), b"second");

    let shadowed = &container.entries()[0];
    assert_eq!(container.read_entry(shadowed).await.unwrap(), b"first");
}

#[tokio::test]
async fn local_method_mismatch_is_inconsistent() {
    let zip = ZipBuilder::new()
        .entry(Entry::stored("a.txt", b"hi").with_local_method(8))
        .stored("ok.txt", b"ok")
        .build();
    let container = open(zip);

    assert!(matches!(
        container.read("a.txt").await,
        Err(ZipError::InconsistentMetadata { name, .. }) if name == "a.txt"
    ));
    // One bad entry doesn't spoil the rest
    assert_eq!(container.read("ok.txt").await.unwrap(), b"ok");
}

#[tokio::test]
async fn missing_local_header_is_inconsistent() {
    let mut zip = ZipBuilder::new().stored("a.txt", b"hi").build();
    zip[0] = b'X';
    let container = open(zip);
    assert!(matches!(
        container.read("a.txt").await,
        Err(ZipError::InconsistentMetadata { .. })
    ));
}

#[tokio::test]
async fn data_descriptor_entries() {
    let zip = ZipBuilder::new()
        .entry(Entry::deflated("streamed.txt", b"written by a streaming zipper").with_flags(1 << 3))
        .build();
    let container = open(zip);

    let entry = container.entry("streamed.txt").unwrap();
    assert!(entry.has_data_descriptor());
    assert_eq!(
        container.read("streamed.txt").await.unwrap(),
        b"written by a streaming zipper"
    );
}

#[tokio::test]
async fn checksum_mismatch() {
    let zip = ZipBuilder::new()
        .entry(Entry::stored("a.txt", b"hi").with_crc(0xDEAD_BEEF))
        .build();
    let container = open(zip);

    match container.read("a.txt").await {
        Err(ZipError::ChecksumMismatch {
            name,
            expected,
            actual,
        }) => {
            assert_eq!(name, "a.txt");
            assert_eq!(expected, 0xDEAD_BEEF);
            assert_eq!(actual, crc32fast::hash(b"hi"));
        }
        other => panic!("expected a checksum mismatch, got {:?}", other),
    }
}

#[tokio::test]
async fn unsupported_method() {
    let zip = ZipBuilder::new()
        .entry(Entry::raw(b"x.bz2", 12, vec![0x42, 0x5a, 0x68], b"x"))
        .build();
    let container = open(zip);

    assert_eq!(
        container.entry("x.bz2").unwrap().compression_method,
        CompressionMethod::Unsupported(12)
    );
    assert!(matches!(
        container.read("x.bz2").await,
        Err(ZipError::UnsupportedCompression(12))
    ));
}

#[tokio::test]
async fn encrypted_entries_are_refused() {
    let zip = ZipBuilder::new()
        .entry(Entry::stored("secret", b"????").with_flags(1))
        .build();
    let container = open(zip);
    assert!(matches!(
        container.read("secret").await,
        Err(ZipError::Encrypted(name)) if name == "secret"
    ));
}

#[tokio::test]
async fn legacy_names_are_cp437() {
    let zip = ZipBuilder::new()
        .entry(Entry::raw(b"caf\x82.txt", 0, b"x".to_vec(), b"x"))
        .build();
    let container = open(zip);
    assert_eq!(container.list_names(), vec!["café.txt"]);
    assert_eq!(container.entries()[0].raw_name, b"caf\x82.txt");
    assert_eq!(container.read("café.txt").await.unwrap(), b"x");
}

#[test]
fn invalid_utf8_with_utf8_flag_is_malformed() {
    init_logging();
    let zip = ZipBuilder::new()
        .entry(Entry::raw(b"bad\xff", 0, b"x".to_vec(), b"x").with_flags(1 << 11))
        .build();
    assert!(matches!(
        Container::open_bytes(zip),
        Err(ZipError::MalformedArchive(_))
    ));
}

#[tokio::test]
async fn read_to_string_rejects_binary() {
    let container = open(ZipBuilder::new().stored("bin", &[0xff, 0xfe]).build());
    assert!(matches!(
        container.read_to_string("bin").await,
        Err(ZipError::Utf8(name)) if name == "bin"
    ));
}

#[tokio::test]
async fn entry_size_limit() {
    init_logging();
    let zip = ZipBuilder::new()
        .deflated("big", &[0u8; 10_000])
        .stored("small", b"ok")
        .build();
    let options = ContainerOptions::default().max_entry_size(1000);
    let container = Container::open_with(Arc::new(MemorySource::new(zip)), options)
        .await
        .unwrap();

    assert!(matches!(
        container.read("big").await,
        Err(ZipError::EntryTooLarge {
            size: 10_000,
            limit: 1000,
            ..
        })
    ));
    assert_eq!(container.read("small").await.unwrap(), b"ok");
}

#[tokio::test]
async fn concurrent_reads() {
    init_logging();
    let mut builder = ZipBuilder::new();
    for i in 0..16 {
        builder = builder.deflated(&format!("{}.txt", i), i.to_string().repeat(100).as_bytes());
    }
    let container = Arc::new(Container::open_bytes(builder.build()).unwrap());

    let tasks: Vec<_> = (0..64)
        .map(|i| {
            let container = container.clone();
            tokio::spawn(async move {
                let name = format!("{}.txt", i % 16);
                let data = container.read(&name).await.unwrap();
                assert_eq!(data, (i % 16).to_string().repeat(100).as_bytes());
            })
        })
        .collect();
    for task in tasks {
        task.await.unwrap();
    }
}

#[tokio::test]
async fn open_file() {
    init_logging();
    let zip = ZipBuilder::new()
        .stored("a.txt", b"hi")
        .deflated("b/c.txt", b"nested")
        .build();
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(&zip).unwrap();
    file.flush().unwrap();

    let container = Container::open_file(file.path()).await.unwrap();
    assert_eq!(container.list_names(), vec!["a.txt", "b/c.txt"]);
    assert_eq!(container.read("b/c.txt").await.unwrap(), b"nested");
}

#[tokio::test]
async fn open_missing_file() {
    let result = Container::open_file("/definitely/not/here.zip").await;
    assert!(matches!(result, Err(ZipError::Io(_))));
}
