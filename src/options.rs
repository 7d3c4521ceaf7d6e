//! Tunables for fetching remote archives and for reading entries.

use std::time::Duration;

/// Transport settings for [`HttpSource`](crate::io::HttpSource).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FetchOptions {
    /// Per-request timeout.
    pub timeout: Duration,
    /// How many times a connect or timeout failure is retried before giving up.
    pub max_retries: u32,
    /// Overrides reqwest's default `User-Agent` header.
    pub user_agent: Option<String>,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_retries: 10,
            user_agent: None,
        }
    }
}

impl FetchOptions {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }
}

/// Settings for an opened [`Container`](crate::Container).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ContainerOptions {
    /// Keep decompressed entries in memory, decompressing each at most once.
    pub cache: bool,
    /// Refuse to extract entries that declare more uncompressed bytes than this.
    pub max_entry_size: Option<u64>,
}

impl ContainerOptions {
    pub fn cache(mut self, cache: bool) -> Self {
        self.cache = cache;
        self
    }

    pub fn max_entry_size(mut self, limit: u64) -> Self {
        self.max_entry_size = Some(limit);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fetch_defaults() {
        let options = FetchOptions::default();
        assert_eq!(options.timeout, Duration::from_secs(30));
        assert_eq!(options.max_retries, 10);
        assert!(options.user_agent.is_none());
    }

    #[test]
    fn builders_chain() {
        let options = FetchOptions::default()
            .with_timeout(Duration::from_secs(5))
            .with_max_retries(2)
            .with_user_agent("zip-container/test");
        assert_eq!(options.timeout, Duration::from_secs(5));
        assert_eq!(options.max_retries, 2);
        assert_eq!(options.user_agent.as_deref(), Some("zip-container/test"));

        let options = ContainerOptions::default().cache(true).max_entry_size(1024);
        assert!(options.cache);
        assert_eq!(options.max_entry_size, Some(1024));
    }
}
