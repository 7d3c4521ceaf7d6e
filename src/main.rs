//! Main entry point for the zip-container CLI application.
//!
//! Lists or reads files from ZIP archives on the local filesystem or
//! behind HTTP URLs.

use anyhow::{Context, Result, bail};
use clap::Parser;
use log::*;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;

use zip_container::{ByteSource, Cli, Container, FileSource, HttpSource, ZipFileEntry};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(cli.log_level()))
        .init();

    if cli.is_http_url() {
        let source = HttpSource::with_options(cli.file.as_str(), &cli.fetch_options()).await?;
        let transferred_before = source.transferred_bytes();
        let container = Container::open_with(Arc::new(source), cli.container_options()).await?;

        process_zip(&container, &cli).await?;

        // Display network transfer statistics for HTTP sources
        if !cli.is_quiet() {
            let transferred = container.source().transferred_bytes() - transferred_before;
            eprintln!("\nTotal bytes transferred: {}", format_size(transferred));
        }
    } else {
        let source = FileSource::open(Path::new(&cli.file))
            .with_context(|| format!("Can't open {}", cli.file))?;
        let container = Container::open_with(Arc::new(source), cli.container_options()).await?;
        process_zip(&container, &cli).await?;
    }

    Ok(())
}

/// List (`-l`, `-v`) or read the selected entries.
async fn process_zip<S: ByteSource>(container: &Container<S>, cli: &Cli) -> Result<()> {
    if cli.list || cli.verbose {
        list_files(container, cli.verbose);
        return Ok(());
    }

    let selected: Vec<&ZipFileEntry> = if cli.files.is_empty() {
        container.entries().iter().filter(|e| e.is_file()).collect()
    } else {
        cli.files
            .iter()
            .map(|name| {
                container
                    .entry(name)
                    .with_context(|| format!("No file named {} in {}", name, cli.file))
            })
            .collect::<Result<_>>()?
    };
    debug!("{} of {} entries selected", selected.len(), container.len());

    let multiple_files = cli.pipe && selected.len() > 1;
    for entry in selected {
        extract_file(container, entry, cli, multiple_files).await?;
    }

    Ok(())
}

/// Print the archive's entries, optionally as a table with sizes and dates.
fn list_files<S: ByteSource>(container: &Container<S>, verbose: bool) {
    if verbose {
        println!(
            "{:>10}  {:>10}  {:>5}  {:>10}  {:>5}  Name",
            "Length", "Size", "Cmpr", "Date", "Time"
        );
        println!("{}", "-".repeat(70));
    }

    let mut total_uncompressed = 0u64;
    let mut total_compressed = 0u64;
    let mut file_count = 0usize;

    for entry in container.entries() {
        if !verbose {
            println!("{}", entry.file_name);
            continue;
        }

        let (year, month, day) = entry.mod_date();
        let (hour, minute, _second) = entry.mod_time();
        println!(
            "{:>10}  {:>10}  {}  {:04}-{:02}-{:02}  {:02}:{:02}  {}",
            entry.uncompressed_size,
            entry.compressed_size,
            ratio(entry.compressed_size, entry.uncompressed_size),
            year,
            month,
            day,
            hour,
            minute,
            entry.file_name
        );

        if entry.is_file() {
            total_uncompressed += entry.uncompressed_size;
            total_compressed += entry.compressed_size;
            file_count += 1;
        }
    }

    if verbose {
        println!("{}", "-".repeat(70));
        println!(
            "{:>10}  {:>10}  {}  {:>21}  {} files",
            total_uncompressed,
            total_compressed,
            ratio(total_compressed, total_uncompressed),
            "",
            file_count
        );
        let comment = container.comment();
        if !comment.is_empty() {
            println!("{}", String::from_utf8_lossy(comment));
        }
    }
}

/// Space saved by compression, as a right-aligned percentage
fn ratio(compressed: u64, uncompressed: u64) -> String {
    if uncompressed > 0 && compressed <= uncompressed {
        format!("{:>4}%", 100 - (compressed * 100 / uncompressed))
    } else {
        format!("{:>4}%", 0)
    }
}

/// Write one entry to stdout (`-p`) or under the output directory.
async fn extract_file<S: ByteSource>(
    container: &Container<S>,
    entry: &ZipFileEntry,
    cli: &Cli,
    show_filename: bool,
) -> Result<()> {
    if cli.pipe {
        let data = container.read_entry(entry).await?;
        let mut stdout = tokio::io::stdout();
        if show_filename {
            stdout
                .write_all(format!("--- {} ---\n", entry.file_name).as_bytes())
                .await?;
        }
        stdout.write_all(&data).await?;
        stdout.flush().await?;
        return Ok(());
    }

    let base = PathBuf::from(cli.extract_dir.as_deref().unwrap_or("."));
    let output_path = base.join(safe_relative_path(&entry.file_name)?);

    if output_path.exists() && !cli.overwrite {
        if !cli.is_quiet() {
            eprintln!("Skipping: {} (use -o to overwrite)", entry.file_name);
        }
        return Ok(());
    }

    if entry.is_dir() {
        tokio::fs::create_dir_all(&output_path).await?;
        return Ok(());
    }

    if !cli.is_quiet() {
        println!("  extracting: {}", entry.file_name);
    }

    // Shadowed duplicates can only be reached directly
    let indexed = container
        .entry(&entry.file_name)
        .is_some_and(|e| std::ptr::eq(e, entry));
    let data = if indexed {
        container.read(&entry.file_name).await?
    } else {
        container.read_entry(entry).await?
    };
    if let Some(parent) = output_path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(&output_path, data)
        .await
        .with_context(|| format!("Can't write {}", output_path.display()))?;

    Ok(())
}

/// Refuse entry names that would land outside the output directory.
fn safe_relative_path(name: &str) -> Result<PathBuf> {
    let mut path = PathBuf::new();
    for component in Path::new(name).components() {
        match component {
            Component::Normal(part) => path.push(part),
            Component::CurDir => {}
            _ => bail!("Refusing to extract {}: path leaves the output directory", name),
        }
    }
    if path.as_os_str().is_empty() {
        bail!("Refusing to extract {}: empty path", name);
    }
    Ok(path)
}

/// Format a byte size into a human-readable string.
///
/// ```ignore
/// assert_eq!(format_size(500), "500 bytes");
/// assert_eq!(format_size(1536), "1.50 KB");
/// ```
fn format_size(size: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if size >= GB {
        format!("{:.2} GB", size as f64 / GB as f64)
    } else if size >= MB {
        format!("{:.2} MB", size as f64 / MB as f64)
    } else if size >= KB {
        format!("{:.2} KB", size as f64 / KB as f64)
    } else {
        format!("{} bytes", size)
    }
}
