use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use log::*;
use reqwest::header::{ACCEPT_RANGES, CONTENT_LENGTH, HeaderMap, RANGE};
use reqwest::{Client, Response, StatusCode};

use super::{ByteSource, MemorySource, check_range};
use crate::error::{ZipError, ZipResult};
use crate::options::FetchOptions;

/// How reads are served once the origin has been probed.
enum Mode {
    /// `Range: bytes=a-b` requests against the origin.
    Ranged,
    /// The origin can't do ranges; the whole body was downloaded once.
    Buffered(MemorySource),
}

/// Remote archive fetched over HTTP(S).
///
/// Construction sends a `HEAD` request. When the origin advertises
/// `Accept-Ranges: bytes` along with a `Content-Length`, each read becomes a
/// range request so only the directory and the requested entries travel over
/// the network. Otherwise the body is downloaded once and kept in memory.
pub struct HttpSource {
    client: Client,
    url: String,
    size: u64,
    mode: Mode,
    transferred_bytes: AtomicU64,
    max_retries: u32,
}

impl HttpSource {
    /// Probe `url` with default [`FetchOptions`].
    pub async fn new(url: impl Into<String>) -> ZipResult<Self> {
        Self::with_options(url, &FetchOptions::default()).await
    }

    pub async fn with_options(url: impl Into<String>, options: &FetchOptions) -> ZipResult<Self> {
        let url = url.into();
        let mut builder = Client::builder().timeout(options.timeout);
        if let Some(user_agent) = &options.user_agent {
            builder = builder.user_agent(user_agent.clone());
        }
        let client = builder.build()?;

        let mut source = Self {
            client,
            url,
            size: 0,
            mode: Mode::Ranged,
            transferred_bytes: AtomicU64::new(0),
            max_retries: options.max_retries,
        };

        let probe = source.send(None, true).await?;
        let ranged_size = if probe.status().is_success() {
            range_support(probe.headers())
        } else {
            debug!("HEAD {} answered {}", source.url, probe.status());
            None
        };

        match ranged_size {
            Some(size) => {
                debug!("{} supports range requests, {} bytes", source.url, size);
                source.size = size;
            }
            None => {
                warn!(
                    "{} doesn't support range requests, downloading the whole archive",
                    source.url
                );
                let body = source.fetch_all().await?;
                source.size = body.len() as u64;
                source.mode = Mode::Buffered(MemorySource::new(body));
            }
        }
        Ok(source)
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// True if reads go to the origin as range requests.
    pub fn is_ranged(&self) -> bool {
        matches!(self.mode, Mode::Ranged)
    }

    /// Get total bytes transferred from network
    pub fn transferred_bytes(&self) -> u64 {
        self.transferred_bytes.load(Ordering::Relaxed)
    }

    /// Send a request, retrying connect and timeout failures with linear back-off.
    ///
    /// `head` selects a `HEAD` probe, otherwise a `GET` with an optional
    /// inclusive byte range.
    async fn send(&self, range: Option<(u64, u64)>, head: bool) -> ZipResult<Response> {
        let mut retry_count = 0;
        loop {
            let mut request = if head {
                self.client.head(&self.url)
            } else {
                self.client.get(&self.url)
            };
            if let Some((start, end)) = range {
                request = request.header(RANGE, range_header(start, end));
            }

            match request.send().await {
                Ok(resp) => return Ok(resp),
                Err(e) if (e.is_timeout() || e.is_connect()) && retry_count < self.max_retries => {
                    retry_count += 1;
                    warn!(
                        "Connection error, retry {}/{}: {}",
                        retry_count, self.max_retries, e
                    );
                    tokio::time::sleep(Duration::from_millis(500 * retry_count as u64)).await;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    async fn fetch_all(&self) -> ZipResult<Vec<u8>> {
        let resp = self.send(None, false).await?;
        if !resp.status().is_success() {
            return Err(status_error(&self.url, resp.status()));
        }
        let bytes = resp.bytes().await?;
        self.transferred_bytes
            .fetch_add(bytes.len() as u64, Ordering::Relaxed);
        Ok(bytes.to_vec())
    }

    async fn fetch_range(&self, offset: u64, len: u64) -> ZipResult<Vec<u8>> {
        let end = offset + len - 1;
        let mut buf = Vec::with_capacity(len as usize);

        // Origins may send less than asked for; keep asking for the rest.
        while (buf.len() as u64) < len {
            let start = offset + buf.len() as u64;
            let resp = self.send(Some((start, end)), false).await?;
            if resp.status() != StatusCode::PARTIAL_CONTENT {
                return Err(status_error(&self.url, resp.status()));
            }

            let bytes = resp.bytes().await?;
            if bytes.is_empty() {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("{} sent an empty body for bytes {}-{}", self.url, start, end),
                )
                .into());
            }
            let wanted = (len as usize - buf.len()).min(bytes.len());
            buf.extend_from_slice(&bytes[..wanted]);
            self.transferred_bytes
                .fetch_add(wanted as u64, Ordering::Relaxed);
        }
        Ok(buf)
    }
}

#[async_trait]
impl ByteSource for HttpSource {
    async fn read_range(&self, offset: u64, len: u64) -> ZipResult<Vec<u8>> {
        match &self.mode {
            Mode::Buffered(memory) => memory.read_range(offset, len).await,
            Mode::Ranged => {
                check_range(offset, len, self.size)?;
                if len == 0 {
                    return Ok(Vec::new());
                }
                self.fetch_range(offset, len).await
            }
        }
    }

    fn len(&self) -> u64 {
        self.size
    }
}

/// `Range` header value for the inclusive span `start..=end`.
fn range_header(start: u64, end: u64) -> String {
    format!("bytes={}-{}", start, end)
}

/// Returns the archive size if the response headers promise byte ranges.
fn range_support(headers: &HeaderMap) -> Option<u64> {
    let accepts_bytes = headers
        .get(ACCEPT_RANGES)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.split(',').any(|unit| unit.trim() == "bytes"));
    if !accepts_bytes {
        return None;
    }
    headers
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse().ok())
}

fn status_error(url: &str, status: StatusCode) -> ZipError {
    io::Error::other(format!("{} answered with status {}", url, status)).into()
}
