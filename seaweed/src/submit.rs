//! Upload orchestration: single-shot and chunked writes, replace, batch.
//!
//! A file bigger than the configured chunk size is written as independent
//! chunk objects (each with its own assigned id, possibly on different
//! servers) followed by a manifest stored under the file's own id. If any
//! step fails, every chunk written so far is deleted again before the error
//! is returned, so no chunk outlives a failed upload.

use crate::client::Seaweed;
use crate::error::{Result, SeaweedError};
use crate::fid::FileId;
use crate::manifest::{ChunkInfo, ChunkManifest};
use crate::part::{FilePart, SubmitResult, guess_mime};
use crate::transport::{
    APPLICATION_JSON, OCTET_STREAM, Transport, Upload, UploadBody, make_url,
};
use bytes::Bytes;
use futures::channel::mpsc;
use futures::stream::FuturesUnordered;
use futures::{SinkExt, StreamExt};
use std::collections::BTreeMap;
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio_util::io::ReaderStream;
use tracing::{debug, info, warn};

/// Buffered pieces between the file reader and a streamed upload.
const BODY_BUFFER: usize = 4;
const BODY_PIECE: usize = 64 * 1024;

impl<T: Transport> Seaweed<T> {
    /// Writes one file, assigning an id first unless the part already has one.
    ///
    /// On success the part carries the fid and server it was written to.
    pub async fn upload_file_part<R>(&self, fp: &mut FilePart<R>) -> Result<FileId>
    where
        R: AsyncRead + Unpin + Send,
    {
        let fid = match fp.fid.clone() {
            Some(fid) => fid,
            None => {
                let ret = self
                    .guarded(self.assign(1, &fp.collection, &fp.ttl))
                    .await?;
                self.locations.put(ret.fid.as_str(), ret.url.clone()).await;
                fp.server = Some(ret.url);
                fp.fid = Some(ret.fid.clone());
                ret.fid
            }
        };
        let server = match fp.server.clone() {
            Some(server) => server,
            None => {
                let server = self
                    .guarded(self.lookup_file_id(&fid, &fp.collection, false))
                    .await?;
                fp.server = Some(server.clone());
                server
            }
        };

        let chunk_size = self.config.chunk_size;
        if chunk_size > 0 && fp.file_size > chunk_size {
            self.upload_chunked(fp, &fid, &server).await?;
        } else {
            self.upload_whole(fp, &fid, &server).await?;
        }
        Ok(fid)
    }

    /// Deletes the old content first when asked, then uploads. A failed
    /// delete does not stop the upload.
    pub async fn replace_file_part<R>(
        &self,
        fp: &mut FilePart<R>,
        delete_first: bool,
    ) -> Result<FileId>
    where
        R: AsyncRead + Unpin + Send,
    {
        if delete_first {
            if let Some(fid) = fp.fid.clone() {
                if let Err(e) = self.delete_file(&fid, &fp.collection).await {
                    warn!(fid = %fid, error = %e, "delete before replace failed");
                }
            }
        }
        self.upload_file_part(fp).await
    }

    /// Deletes every chunk of `manifest`, attempting all of them even after
    /// a failure.
    pub async fn delete_chunks(&self, manifest: &ChunkManifest, collection: &str) -> Result<()> {
        let total = manifest.chunks.len();
        let mut failed = 0;
        for chunk in &manifest.chunks {
            if let Err(e) = self.delete_file(&chunk.fid, collection).await {
                warn!(fid = %chunk.fid, error = %e, "failed to delete chunk");
                failed += 1;
            }
        }
        if failed > 0 {
            return Err(SeaweedError::ChunksNotDeleted { failed, total });
        }
        Ok(())
    }

    /// Uploads several files under one multi-count assignment.
    ///
    /// File `k` is written to `<fid>_<k>` (the first keeps the plain fid) on
    /// the assigned server. Failures are reported per file; one failed file
    /// does not stop the rest.
    pub async fn batch_upload_file_parts<R>(
        &self,
        files: Vec<FilePart<R>>,
        collection: &str,
        ttl: &str,
    ) -> Vec<SubmitResult>
    where
        R: AsyncRead + Unpin + Send,
    {
        let mut results: Vec<SubmitResult> = files
            .iter()
            .map(|file| SubmitResult {
                file_name: file.file_name.clone(),
                ..Default::default()
            })
            .collect();
        if files.is_empty() {
            return results;
        }

        let assigned = match self
            .guarded(self.assign(files.len() as u64, collection, ttl))
            .await
        {
            Ok(assigned) => assigned,
            Err(e) => {
                let message = e.to_string();
                for result in &mut results {
                    result.error = Some(message.clone());
                }
                return results;
            }
        };
        let public_url = if assigned.public_url.is_empty() {
            &assigned.url
        } else {
            &assigned.public_url
        };

        for (index, (mut file, result)) in files.into_iter().zip(results.iter_mut()).enumerate() {
            let fid = assigned.fid.with_index(index);
            self.locations.put(fid.as_str(), assigned.url.clone()).await;
            file.fid = Some(fid.clone());
            file.server = Some(assigned.url.clone());
            file.collection = collection.to_string();
            file.ttl = ttl.to_string();

            result.fid = Some(fid.clone());
            result.size = file.file_size;
            match self.upload_file_part(&mut file).await {
                Ok(_) => result.file_url = format!("{public_url}/{fid}"),
                Err(e) => {
                    warn!(fid = %fid, file = %result.file_name, error = %e, "batch upload failed");
                    result.error = Some(e.to_string());
                }
            }
        }
        results
    }

    /// Streams the file to the server as it is read; the content is never
    /// held in memory as a whole.
    async fn upload_whole<R>(&self, fp: &mut FilePart<R>, fid: &FileId, server: &str) -> Result<()>
    where
        R: AsyncRead + Unpin + Send,
    {
        let mime_type = if fp.mime_type.is_empty() {
            guess_mime(fp.base_name())
        } else {
            Some(fp.mime_type.clone())
        };
        let url = make_url(server, &format!("/{fid}"), &ts_args(fp.mod_time))?;
        let declared = fp.file_size;
        let (tx, rx) = mpsc::channel(BODY_BUFFER);
        let upload = Upload {
            file_name: fp.base_name().to_string(),
            body: UploadBody::Stream {
                stream: rx,
                len: declared,
            },
            is_gzipped: fp.is_gzipped,
            mime_type,
        };

        let (pumped, uploaded) = tokio::join!(
            self.guarded(pump_body(&mut fp.reader, declared, tx)),
            self.guarded(self.transport.upload(&url, upload)),
        );
        // a size mismatch also breaks the upload; report the cause
        pumped?;
        let ret = uploaded?;
        debug!(fid = %fid, size = ret.size, "uploaded");
        Ok(())
    }

    async fn upload_chunked<R>(&self, fp: &mut FilePart<R>, fid: &FileId, server: &str) -> Result<()>
    where
        R: AsyncRead + Unpin + Send,
    {
        let base_name = fp.base_name().to_string();
        let mut manifest = ChunkManifest::new(base_name.clone(), fp.mime_type.clone(), fp.file_size);

        let (chunks, failure) = self.upload_chunks(fp, &base_name).await;
        manifest.chunks = chunks;
        if let Some(err) = failure {
            self.rollback(&manifest, &fp.collection).await;
            return Err(err);
        }

        if let Err(err) = self.upload_manifest(&manifest, fid, server, fp.mod_time).await {
            self.rollback(&manifest, &fp.collection).await;
            return Err(err);
        }
        info!(fid = %fid, chunks = manifest.chunks.len(), size = manifest.size, "chunked upload complete");
        Ok(())
    }

    /// Reads the stream chunk by chunk in order and keeps up to
    /// `upload_concurrency` chunk uploads in flight.
    ///
    /// Returns the chunks that made it to a server, sorted by index, and the
    /// first failure if there was one. In-flight uploads are always awaited
    /// before returning.
    async fn upload_chunks<R>(
        &self,
        fp: &mut FilePart<R>,
        base_name: &str,
    ) -> (Vec<ChunkInfo>, Option<SeaweedError>)
    where
        R: AsyncRead + Unpin + Send,
    {
        let chunk_size = self.config.chunk_size;
        let declared = fp.file_size;
        let count = self.config.chunk_count.chunk_count(declared, chunk_size);
        let limit = self.config.upload_concurrency.max(1);

        let reader = &mut fp.reader;
        let collection = fp.collection.as_str();
        let ttl = fp.ttl.as_str();

        let mut slots = BTreeMap::new();
        let mut in_flight = FuturesUnordered::new();
        let mut failure = None;
        let mut next = 0u64;

        while failure.is_none() && (next < count || !in_flight.is_empty()) {
            if next < count && in_flight.len() < limit {
                let offset = next * chunk_size;
                let expected = chunk_size.min(declared.saturating_sub(offset));
                let mut data = Vec::new();
                match self.guarded(read_chunk(&mut *reader, expected, &mut data)).await {
                    Ok(()) if (data.len() as u64) < expected => {
                        failure = Some(SeaweedError::SizeMismatch {
                            declared,
                            read: offset + data.len() as u64,
                        });
                    }
                    Ok(()) => {
                        let name = format!("{base_name}-{}", next + 1);
                        in_flight.push(self.upload_chunk(next, name, Bytes::from(data), collection, ttl));
                        next += 1;
                    }
                    Err(e) => failure = Some(SeaweedError::chunk(next + 1, e)),
                }
                continue;
            }
            if let Some((index, ret)) = in_flight.next().await {
                match ret {
                    Ok(chunk) => {
                        slots.insert(index, chunk);
                    }
                    Err(e) => failure = Some(SeaweedError::chunk(index + 1, e)),
                }
            }
        }

        while let Some((index, ret)) = in_flight.next().await {
            if let Ok(chunk) = ret {
                slots.insert(index, chunk);
            }
        }
        if failure.is_none() {
            if let Err(e) = self.guarded(check_exhausted(&mut *reader, declared)).await {
                failure = Some(e);
            }
        }
        (slots.into_values().collect(), failure)
    }

    async fn upload_chunk(
        &self,
        index: u64,
        file_name: String,
        data: Bytes,
        collection: &str,
        ttl: &str,
    ) -> (u64, Result<ChunkInfo>) {
        let ret = async {
            let assigned = self.guarded(self.assign(1, collection, ttl)).await?;
            self.locations
                .put(assigned.fid.as_str(), assigned.url.clone())
                .await;

            let url = make_url(&assigned.url, &format!("/{}", assigned.fid), &[])?;
            let size = data.len() as u64;
            let upload = Upload {
                file_name,
                body: data.into(),
                is_gzipped: false,
                mime_type: Some(OCTET_STREAM.to_string()),
            };
            self.guarded(self.transport.upload(&url, upload)).await?;
            debug!(chunk = index + 1, fid = %assigned.fid, size, "chunk uploaded");

            Ok(ChunkInfo {
                fid: assigned.fid,
                offset: index * self.config.chunk_size,
                size,
            })
        }
        .await;
        (index, ret)
    }

    async fn upload_manifest(
        &self,
        manifest: &ChunkManifest,
        fid: &FileId,
        server: &str,
        mod_time: i64,
    ) -> Result<()> {
        let mut args = ts_args(mod_time);
        args.push(("cm", "true".to_string()));
        let url = make_url(server, &format!("/{fid}"), &args)?;
        let upload = Upload {
            file_name: manifest.name.clone(),
            body: Bytes::from(manifest.marshal()?).into(),
            is_gzipped: false,
            mime_type: Some(APPLICATION_JSON.to_string()),
        };
        self.guarded(self.transport.upload(&url, upload)).await?;
        Ok(())
    }

    /// Best-effort removal of chunks left behind by a failed upload.
    async fn rollback(&self, manifest: &ChunkManifest, collection: &str) {
        if manifest.chunks.is_empty() {
            return;
        }
        match self.delete_chunks(manifest, collection).await {
            Ok(()) => debug!(chunks = manifest.chunks.len(), "rolled back uploaded chunks"),
            Err(e) => warn!(name = %manifest.name, error = %e, "rollback left orphaned chunks"),
        }
    }
}

fn ts_args(mod_time: i64) -> Vec<(&'static str, String)> {
    if mod_time != 0 {
        vec![("ts", mod_time.to_string())]
    } else {
        Vec::new()
    }
}

/// Feeds exactly `declared` bytes of `reader` into an upload body. On a
/// short or long stream the error is also sent down the body so the
/// transport abandons the request instead of storing partial content.
async fn pump_body<R>(
    reader: &mut R,
    declared: u64,
    mut tx: mpsc::Sender<io::Result<Bytes>>,
) -> Result<()>
where
    R: AsyncRead + Unpin,
{
    let ret = copy_body(reader, declared, &mut tx).await;
    if let Err(e) = &ret {
        let _ = tx.send(Err(io::Error::other(e.to_string()))).await;
    }
    ret
}

async fn copy_body<R>(
    reader: &mut R,
    declared: u64,
    tx: &mut mpsc::Sender<io::Result<Bytes>>,
) -> Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut read = 0u64;
    let mut pieces = ReaderStream::with_capacity((&mut *reader).take(declared), BODY_PIECE);
    while let Some(piece) = pieces.next().await {
        let piece = piece?;
        read += piece.len() as u64;
        if tx.send(Ok(piece)).await.is_err() {
            // the upload ended early and reports its own error
            return Ok(());
        }
    }
    drop(pieces);

    if read < declared {
        return Err(SeaweedError::SizeMismatch { declared, read });
    }
    check_exhausted(reader, declared).await
}

/// Fails if `reader` still has data after `declared` bytes were consumed.
async fn check_exhausted<R>(reader: &mut R, declared: u64) -> Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut byte = [0u8; 1];
    if reader.read(&mut byte).await? > 0 {
        return Err(SeaweedError::SizeMismatch {
            declared,
            read: declared + 1,
        });
    }
    Ok(())
}

/// Reads at most `limit` bytes. Fewer means the stream ended.
async fn read_chunk<R>(reader: &mut R, limit: u64, buf: &mut Vec<u8>) -> Result<()>
where
    R: AsyncRead + Unpin,
{
    reader.take(limit).read_to_end(buf).await?;
    Ok(())
}
