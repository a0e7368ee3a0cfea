use thiserror::Error;

pub type Result<T> = std::result::Result<T, SeaweedError>;

#[derive(Error, Debug)]
pub enum SeaweedError {
    // Master errors
    #[error("{0}")]
    Assign(String), // Error text returned by /dir/assign, verbatim

    #[error("failed to lookup {fid}: {reason}")]
    Lookup { fid: String, reason: String },

    #[error("invalid file id: {0}")]
    InvalidFileId(String),

    // Transport errors
    #[error("invalid url {url}: {source}")]
    Url {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url}: {status}")]
    Status {
        url: String,
        status: u16,
        body: String,
    },

    #[error("{url}: {message}")]
    Remote { url: String, message: String },

    // Decode errors
    #[error("{context}: {source}")]
    Json {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Upload orchestration errors
    #[error("chunk {index} upload failed: {source}")]
    Chunk {
        index: u64, // 1-based, matches the `<name>-<index>` chunk file name
        #[source]
        source: Box<SeaweedError>,
    },

    /// The stream ended before, or ran past, the declared file size. When it
    /// ran past, `read` counts the first byte beyond the declared size.
    #[error("file size mismatch: declared {declared} bytes, read {read}")]
    SizeMismatch { declared: u64, read: u64 },

    #[error("not all chunks deleted: {failed} of {total} deletes failed")]
    ChunksNotDeleted { failed: usize, total: usize },

    #[error("operation cancelled")]
    Cancelled,
}

impl SeaweedError {
    pub fn http(url: impl ToString, source: reqwest::Error) -> Self {
        Self::Http {
            url: url.to_string(),
            source,
        }
    }

    pub fn json(context: impl Into<String>, source: serde_json::Error) -> Self {
        Self::Json {
            context: context.into(),
            source,
        }
    }

    pub fn remote(url: impl ToString, message: impl Into<String>) -> Self {
        Self::Remote {
            url: url.to_string(),
            message: message.into(),
        }
    }

    /// Wraps a failure of the chunk at `index` (1-based). Cancellation is passed
    /// through untouched so callers can match on it directly.
    pub fn chunk(index: u64, source: SeaweedError) -> Self {
        match source {
            Self::Cancelled => Self::Cancelled,
            source => Self::Chunk {
                index,
                source: Box::new(source),
            },
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_error_keeps_cause() {
        let err = SeaweedError::chunk(6, SeaweedError::remote("http://n1/3,01", "disk full"));
        assert_eq!(
            err.to_string(),
            "chunk 6 upload failed: http://n1/3,01: disk full"
        );
        match err {
            SeaweedError::Chunk { index, source } => {
                assert_eq!(index, 6);
                assert!(matches!(*source, SeaweedError::Remote { .. }));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_chunk_error_passes_cancellation_through() {
        let err = SeaweedError::chunk(2, SeaweedError::Cancelled);
        assert!(err.is_cancelled());
    }

    #[test]
    fn test_assign_error_is_verbatim() {
        let err = SeaweedError::Assign("No free volumes left!".to_string());
        assert_eq!(err.to_string(), "No free volumes left!");
    }
}
