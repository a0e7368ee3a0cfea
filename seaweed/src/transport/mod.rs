//! Transport to the master and volume servers.
//!
//! Submodules:
//! - `http`: reqwest-backed transport with a pooled client shared by all nodes
//! - `memory`: in-process fake cluster (master + volume servers) for tests and
//!   local development
//!
//! Every call is unary: one request, one fully-buffered response.
pub mod http;
pub mod memory;

pub use http::HttpTransport;
pub use memory::InMemoryCluster;

use crate::error::{Result, SeaweedError};
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use futures::channel::mpsc;
use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

pub const OCTET_STREAM: &str = "application/octet-stream";
pub const APPLICATION_JSON: &str = "application/json";

/// Receiving end of a streamed upload body. An `Err` item aborts the upload.
pub type BodyStream = mpsc::Receiver<std::io::Result<Bytes>>;

/// Content of an upload: either already in memory or fed by a producer
/// while the request is in flight.
pub enum UploadBody {
    Full(Bytes),
    Stream { stream: BodyStream, len: u64 },
}

impl UploadBody {
    /// Declared length in bytes.
    pub fn len(&self) -> u64 {
        match self {
            UploadBody::Full(data) => data.len() as u64,
            UploadBody::Stream { len, .. } => *len,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Buffers the whole body. Fails if the producer sent an error.
    pub async fn collect(self) -> Result<Bytes> {
        match self {
            UploadBody::Full(data) => Ok(data),
            UploadBody::Stream { mut stream, len } => {
                let mut buf = BytesMut::with_capacity(len.min(1 << 20) as usize);
                while let Some(chunk) = stream.next().await {
                    buf.extend_from_slice(&chunk?);
                }
                Ok(buf.freeze())
            }
        }
    }
}

impl From<Bytes> for UploadBody {
    fn from(data: Bytes) -> Self {
        UploadBody::Full(data)
    }
}

impl fmt::Debug for UploadBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UploadBody::Full(data) => f.debug_tuple("Full").field(&data.len()).finish(),
            UploadBody::Stream { len, .. } => f.debug_struct("Stream").field("len", len).finish(),
        }
    }
}

/// A single blob to be written with a multipart POST.
#[derive(Debug)]
pub struct Upload {
    pub file_name: String,
    pub body: UploadBody,
    pub is_gzipped: bool,
    pub mime_type: Option<String>,
}

/// Volume server reply to a write.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadResult {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error: String,
}

/// A fetched object.
#[derive(Debug, Clone)]
pub struct Download {
    /// Suggested file name from `Content-Disposition`, if any
    pub file_name: Option<String>,
    /// The server sent the body with `Content-Encoding: gzip`
    pub is_gzipped: bool,
    pub data: Bytes,
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// POST an urlencoded form. The body is returned whatever the status code;
    /// the master reports failures inside the JSON reply.
    async fn post_form(&self, url: &Url, form: &[(&str, String)]) -> Result<Bytes>;

    /// GET; any status but 200 is an error.
    async fn get(&self, url: &Url) -> Result<Bytes>;

    /// Multipart POST of one blob under the form field `file`.
    async fn upload(&self, url: &Url, upload: Upload) -> Result<UploadResult>;

    /// DELETE; 200, 202 and 404 all count as success.
    async fn delete(&self, url: &Url) -> Result<()>;

    async fn download(&self, url: &Url) -> Result<Download>;
}

/// Builds `http://<host><path>?<args>`. `host` may already carry a scheme.
pub fn make_url(host: &str, path: &str, args: &[(&str, String)]) -> Result<Url> {
    let base = if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("http://{host}")
    };
    let mut url = Url::parse(&base).map_err(|source| SeaweedError::Url {
        url: base.clone(),
        source,
    })?;
    url.set_path(path);
    if !args.is_empty() {
        url.query_pairs_mut()
            .extend_pairs(args.iter().map(|(k, v)| (*k, v.as_str())));
    }
    Ok(url)
}

pub fn is_delete_success(status: u16) -> bool {
    matches!(status, 200 | 202 | 404)
}

/// Reason a volume server gave for refusing a delete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteFailure {
    /// `{"error": "..."}` body
    Structured(String),
    /// Anything else, as text
    Raw(String),
}

impl DeleteFailure {
    pub fn from_body(body: &[u8]) -> Self {
        #[derive(Deserialize)]
        struct ErrorBody {
            error: Option<String>,
        }

        match serde_json::from_slice::<ErrorBody>(body) {
            Ok(ErrorBody { error: Some(error) }) => DeleteFailure::Structured(error),
            _ => DeleteFailure::Raw(String::from_utf8_lossy(body).into_owned()),
        }
    }

    pub fn message(&self) -> &str {
        match self {
            DeleteFailure::Structured(msg) | DeleteFailure::Raw(msg) => msg,
        }
    }
}

/// Extracts the file name from a `Content-Disposition` value such as
/// `filename="a.txt"` or `inline; filename="a.txt"`.
pub fn parse_content_disposition(value: &str) -> Option<String> {
    value
        .split(';')
        .map(str::trim)
        .find_map(|part| part.strip_prefix("filename="))
        .map(|name| name.trim_matches('"').to_string())
        .filter(|name| !name.is_empty())
}
