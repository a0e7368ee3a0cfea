use crate::config::SeaweedConfig;
use crate::error::{Result, SeaweedError};
use crate::fid::FileId;
use crate::location::LocationCache;
use crate::manifest::ChunkManifest;
use crate::part::{FilePart, SubmitResult};
use crate::transport::{Download, HttpTransport, Transport, make_url};
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Client for a master and its volume servers.
///
/// Cheap to clone; clones share the transport, the location cache and the
/// cancellation token.
pub struct Seaweed<T = HttpTransport> {
    pub(crate) config: Arc<SeaweedConfig>,
    pub(crate) transport: Arc<T>,
    pub(crate) locations: LocationCache,
    pub(crate) cancel: CancellationToken,
}

impl<T> Clone for Seaweed<T> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            transport: self.transport.clone(),
            locations: self.locations.clone(),
            cancel: self.cancel.clone(),
        }
    }
}

impl Seaweed<HttpTransport> {
    pub fn new(master: impl Into<String>) -> Result<Self> {
        Self::with_config(SeaweedConfig::new(master))
    }

    pub fn with_config(config: SeaweedConfig) -> Result<Self> {
        let transport = HttpTransport::new(&config)?;
        Ok(Self::with_transport(config, transport))
    }
}

impl<T: Transport> Seaweed<T> {
    pub fn with_transport(config: SeaweedConfig, transport: T) -> Self {
        Self::with_shared_transport(config, Arc::new(transport))
    }

    pub fn with_shared_transport(config: SeaweedConfig, transport: Arc<T>) -> Self {
        let locations = LocationCache::new(config.location_ttl, config.location_cache_capacity);
        Self {
            config: Arc::new(config),
            transport,
            locations,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_location_cache(mut self, locations: LocationCache) -> Self {
        self.locations = locations;
        self
    }

    /// Ties in-flight uploads to `token`: once it fires they roll back and
    /// return [`SeaweedError::Cancelled`].
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn config(&self) -> &SeaweedConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn location_cache(&self) -> &LocationCache {
        &self.locations
    }

    /// Runs `fut` unless the client is cancelled first.
    pub(crate) async fn guarded<F, V>(&self, fut: F) -> Result<V>
    where
        F: Future<Output = Result<V>>,
    {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(SeaweedError::Cancelled),
            ret = fut => ret,
        }
    }

    /// Deletes one object. Deleting an object that does not exist succeeds.
    pub async fn delete_file(&self, fid: &FileId, collection: &str) -> Result<()> {
        let node = self.lookup_file_id(fid, collection, true).await?;
        let url = make_url(&node, &format!("/{fid}"), &[])?;
        self.transport.delete(&url).await?;
        debug!(fid = %fid, "deleted");
        Ok(())
    }

    pub async fn download_file(&self, fid: &FileId, collection: &str) -> Result<Download> {
        let node = self
            .guarded(self.lookup_file_id(fid, collection, true))
            .await?;
        let url = make_url(&node, &format!("/{fid}"), &[])?;
        self.guarded(self.transport.download(&url)).await
    }

    /// Fetches the manifest stored under `fid` instead of the file it describes.
    pub async fn load_chunk_manifest(&self, fid: &FileId, collection: &str) -> Result<ChunkManifest> {
        let node = self
            .guarded(self.lookup_file_id(fid, collection, true))
            .await?;
        let url = make_url(&node, &format!("/{fid}"), &[("cm", "false".to_string())])?;
        let download = self.guarded(self.transport.download(&url)).await?;
        ChunkManifest::load(&download.data, download.is_gzipped)
    }

    /// Deletes a chunked file: its chunks first, then the manifest.
    ///
    /// If some chunk could not be deleted the manifest is kept so the
    /// remaining chunks can still be found.
    pub async fn delete_chunked_file(&self, fid: &FileId, collection: &str) -> Result<()> {
        let manifest = self.load_chunk_manifest(fid, collection).await?;
        if let Err(e) = self.delete_chunks(&manifest, collection).await {
            warn!(fid = %fid, error = %e, "keeping manifest, chunks remain");
            return Err(e);
        }
        self.delete_file(fid, collection).await
    }

    pub async fn upload_file(
        &self,
        path: impl AsRef<Path>,
        collection: &str,
        ttl: &str,
    ) -> Result<FileId> {
        let mut fp = FilePart::from_path(path)
            .await?
            .with_collection(collection)
            .with_ttl(ttl);
        self.upload_file_part(&mut fp).await
    }

    /// Opens every path, then uploads them as one batch. A path that cannot
    /// be opened fails the whole call before anything is assigned.
    pub async fn batch_upload_files<P>(
        &self,
        paths: &[P],
        collection: &str,
        ttl: &str,
    ) -> Result<Vec<SubmitResult>>
    where
        P: AsRef<Path>,
    {
        let mut files = Vec::with_capacity(paths.len());
        for path in paths {
            files.push(FilePart::from_path(path).await?);
        }
        Ok(self.batch_upload_file_parts(files, collection, ttl).await)
    }

    /// Overwrites the content of an existing `fid` with the file at `path`.
    pub async fn replace_file(
        &self,
        fid: &FileId,
        path: impl AsRef<Path>,
        delete_first: bool,
    ) -> Result<()> {
        let mut fp = FilePart::from_path(path).await?.with_fid(fid.clone());
        self.replace_file_part(&mut fp, delete_first).await?;
        Ok(())
    }
}
