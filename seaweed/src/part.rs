use crate::error::Result;
use crate::fid::FileId;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use std::path::Path;
use std::time::UNIX_EPOCH;
use tokio::fs::File;

/// One file to be written, plus where it ends up once assigned.
///
/// The part owns its reader. Pass `&mut R` to keep ownership with the
/// caller; an owned handle such as a [`File`] is closed when the part drops.
#[derive(Debug)]
pub struct FilePart<R> {
    pub reader: R,
    pub file_name: String,
    pub file_size: u64,
    pub is_gzipped: bool,
    /// Empty means "guess from the file name"
    pub mime_type: String,
    /// Unix seconds, 0 when unknown
    pub mod_time: i64,
    pub collection: String,
    pub ttl: String,
    /// Volume server address, filled in by assignment or lookup
    pub server: Option<String>,
    pub fid: Option<FileId>,
}

impl<R> FilePart<R> {
    pub fn new(reader: R, file_name: impl Into<String>, file_size: u64) -> Self {
        Self {
            reader,
            file_name: file_name.into(),
            file_size,
            is_gzipped: false,
            mime_type: String::new(),
            mod_time: 0,
            collection: String::new(),
            ttl: String::new(),
            server: None,
            fid: None,
        }
    }

    pub fn with_collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = collection.into();
        self
    }

    pub fn with_ttl(mut self, ttl: impl Into<String>) -> Self {
        self.ttl = ttl.into();
        self
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = mime_type.into();
        self
    }

    pub fn with_gzipped(mut self, is_gzipped: bool) -> Self {
        self.is_gzipped = is_gzipped;
        self
    }

    pub fn with_mod_time(mut self, mod_time: i64) -> Self {
        self.mod_time = mod_time;
        self
    }

    /// Writes to an existing id instead of assigning a new one.
    pub fn with_fid(mut self, fid: FileId) -> Self {
        self.fid = Some(fid);
        self
    }

    pub fn with_server(mut self, server: impl Into<String>) -> Self {
        self.server = Some(server.into());
        self
    }

    /// Last path component of `file_name`.
    pub fn base_name(&self) -> &str {
        self.file_name
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or(&self.file_name)
    }
}

impl FilePart<File> {
    /// Opens `path` and fills in size and modification time from its metadata.
    ///
    /// A `.gz` suffix marks the content as gzip-encoded and is dropped from the
    /// stored name, so `log.txt.gz` is stored as `log.txt` and typed as text.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).await?;
        let meta = file.metadata().await?;

        let mut file_name = path.to_string_lossy().into_owned();
        let is_gzipped = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("gz"));
        if is_gzipped {
            file_name.truncate(file_name.len() - ".gz".len());
        }
        let mod_time = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);

        let mut part = FilePart::new(file, file_name, meta.len())
            .with_gzipped(is_gzipped)
            .with_mod_time(mod_time);
        part.mime_type = guess_mime(part.base_name()).unwrap_or_default();
        Ok(part)
    }
}

impl FilePart<Cursor<Bytes>> {
    pub fn from_bytes(file_name: impl Into<String>, data: impl Into<Bytes>) -> Self {
        let data = data.into();
        let size = data.len() as u64;
        FilePart::new(Cursor::new(data), file_name, size)
    }
}

/// Content type for a file name, from its extension.
pub fn guess_mime(file_name: &str) -> Option<String> {
    mime_guess::from_path(file_name)
        .first()
        .map(|mime| mime.essence_str().to_string())
}

/// Outcome of one file of a batch upload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitResult {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub file_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub file_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fid: Option<FileId>,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

fn is_zero(v: &u64) -> bool {
    *v == 0
}

impl SubmitResult {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn test_base_name() {
        let part = FilePart::from_bytes("/var/data/movie.mp4", Bytes::new());
        assert_eq!(part.base_name(), "movie.mp4");
        let part = FilePart::from_bytes("plain.txt", Bytes::new());
        assert_eq!(part.base_name(), "plain.txt");
    }

    #[tokio::test]
    async fn test_from_path() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::File::create(&path)
            .unwrap()
            .write_all(b"hello world")
            .unwrap();

        let part = FilePart::from_path(&path).await.unwrap();
        assert_eq!(part.file_size, 11);
        assert_eq!(part.base_name(), "notes.txt");
        assert_eq!(part.mime_type, "text/plain");
        assert!(!part.is_gzipped);
        assert!(part.mod_time > 0);
    }

    #[tokio::test]
    async fn test_from_path_gzipped() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("report.json.gz");
        std::fs::write(&path, b"\x1f\x8b").unwrap();

        let part = FilePart::from_path(&path).await.unwrap();
        assert!(part.is_gzipped);
        assert_eq!(part.base_name(), "report.json");
        assert_eq!(part.mime_type, "application/json");
    }

    #[tokio::test]
    async fn test_from_path_missing_file() {
        let dir = tempdir().unwrap();
        assert!(FilePart::from_path(dir.path().join("nope")).await.is_err());
    }

    #[test]
    fn test_submit_result_wire_names() {
        let ret = SubmitResult {
            file_name: "a.txt".to_string(),
            file_url: "localhost:8080/3,01".to_string(),
            fid: Some(FileId::new("3,01")),
            size: 5,
            error: None,
        };
        let json: serde_json::Value = serde_json::to_value(&ret).unwrap();
        assert_eq!(json["fileName"], "a.txt");
        assert_eq!(json["fileUrl"], "localhost:8080/3,01");
        assert_eq!(json["fid"], "3,01");
        assert_eq!(json["size"], 5);
        assert!(json.get("error").is_none());
    }
}
