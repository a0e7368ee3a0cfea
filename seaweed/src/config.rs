use std::time::Duration;

/// How many chunks a file of a given size is split into.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ChunkCountPolicy {
    /// `ceil(size / chunk_size)`.
    #[default]
    Exact,
    /// `size / chunk_size + 1`. Produces a trailing empty chunk when the size
    /// is an exact multiple of the chunk size; matches manifests written by
    /// older clients.
    Legacy,
}

impl ChunkCountPolicy {
    pub fn chunk_count(self, file_size: u64, chunk_size: u64) -> u64 {
        match self {
            ChunkCountPolicy::Exact => file_size.div_ceil(chunk_size),
            ChunkCountPolicy::Legacy => file_size / chunk_size + 1,
        }
    }
}

/// Client configuration options
#[derive(Debug, Clone)]
pub struct SeaweedConfig {
    /// Master address, `host:port`
    pub master: String,
    /// Files larger than this (bytes) are uploaded as chunks plus a manifest; 0 disables chunking
    pub chunk_size: u64,
    pub chunk_count: ChunkCountPolicy,
    /// Maximum chunk uploads in flight for one file
    pub upload_concurrency: usize,
    /// Per-request timeout
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
    /// Idle connections kept per volume server
    pub max_idle_per_host: usize,
    /// How long a resolved volume location is trusted
    pub location_ttl: Duration,
    pub location_cache_capacity: u64,
}

impl Default for SeaweedConfig {
    fn default() -> Self {
        Self {
            master: "127.0.0.1:9333".to_string(),
            chunk_size: 0,
            chunk_count: ChunkCountPolicy::Exact,
            upload_concurrency: 1,
            request_timeout: Duration::from_secs(45),
            connect_timeout: Duration::from_secs(10),
            max_idle_per_host: 512,
            location_ttl: Duration::from_secs(10 * 60),
            location_cache_capacity: 10_000,
        }
    }
}

impl SeaweedConfig {
    pub fn new(master: impl Into<String>) -> Self {
        Self {
            master: master.into(),
            ..Default::default()
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: u64) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn with_chunk_count_policy(mut self, policy: ChunkCountPolicy) -> Self {
        self.chunk_count = policy;
        self
    }

    pub fn with_upload_concurrency(mut self, concurrency: usize) -> Self {
        self.upload_concurrency = concurrency.max(1);
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_location_ttl(mut self, ttl: Duration) -> Self {
        self.location_ttl = ttl;
        self
    }
}
