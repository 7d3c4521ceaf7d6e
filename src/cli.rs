use std::time::Duration;

use clap::Parser;

use crate::options::{ContainerOptions, FetchOptions};

#[derive(Parser, Debug)]
#[command(name = "zip-container")]
#[command(version)]
#[command(about = "Read files out of local or remote ZIP archives", long_about = None)]
#[command(after_help = "Examples:\n  \
  zip-container -l https://example.com/archive.zip     list files of a remote ZIP\n  \
  zip-container -p data.zip README.md | more           send one file through a pipe\n  \
  zip-container -d out https://example.com/a.zip b/c   extract b/c into out/")]
pub struct Cli {
    /// ZIP file path or HTTP URL
    #[arg(value_name = "SOURCE")]
    pub file: String,

    /// Files to read (default: all)
    #[arg(value_name = "NAMES")]
    pub files: Vec<String>,

    /// List files (short format)
    #[arg(short = 'l')]
    pub list: bool,

    /// List verbosely with sizes, ratios and dates
    #[arg(short = 'v')]
    pub verbose: bool,

    /// Extract files to pipe, no messages
    #[arg(short = 'p')]
    pub pipe: bool,

    /// Extract files into exdir
    #[arg(short = 'd', value_name = "DIR")]
    pub extract_dir: Option<String>,

    /// Overwrite existing files
    #[arg(short = 'o')]
    pub overwrite: bool,

    /// Quiet mode (-qq => quieter)
    #[arg(short = 'q', action = clap::ArgAction::Count)]
    pub quiet: u8,

    /// Decompress each entry at most once
    #[arg(long)]
    pub cache: bool,

    /// HTTP request timeout in seconds
    #[arg(long, value_name = "SECS", default_value_t = 30)]
    pub timeout: u64,

    /// Retries for failed HTTP connections
    #[arg(long, value_name = "N", default_value_t = 10)]
    pub retries: u32,
}

impl Cli {
    pub fn is_http_url(&self) -> bool {
        self.file.starts_with("http://") || self.file.starts_with("https://")
    }

    pub fn is_quiet(&self) -> bool {
        self.quiet > 0 || self.pipe
    }

    /// Default log filter when `RUST_LOG` isn't set
    pub fn log_level(&self) -> &'static str {
        match self.quiet {
            0 => "info",
            1 => "warn",
            _ => "error",
        }
    }

    pub fn fetch_options(&self) -> FetchOptions {
        FetchOptions::default()
            .with_timeout(Duration::from_secs(self.timeout))
            .with_max_retries(self.retries)
            .with_user_agent(concat!("zip-container/", env!("CARGO_PKG_VERSION")))
    }

    pub fn container_options(&self) -> ContainerOptions {
        ContainerOptions::default().cache(self.cache)
    }
}
