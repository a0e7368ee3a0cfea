//! Chunk manifest: how a logical file maps onto chunk objects.
//!
//! The manifest is published as the content of the file's own id, flagged with
//! `cm=true`, and lists every chunk's id, offset and size as JSON. Volume
//! servers may hand it back gzip-compressed.

use crate::error::{Result, SeaweedError};
use crate::fid::FileId;
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkInfo {
    pub fid: FileId,
    pub offset: u64,
    pub size: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkManifest {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub mime: String,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub size: u64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub chunks: Vec<ChunkInfo>,
}

fn is_zero(v: &u64) -> bool {
    *v == 0
}

impl ChunkManifest {
    pub fn new(name: impl Into<String>, mime: impl Into<String>, size: u64) -> Self {
        Self {
            name: name.into(),
            mime: mime.into(),
            size,
            chunks: Vec::new(),
        }
    }

    /// Decodes a manifest; chunks come back sorted by offset whatever the wire order.
    pub fn load(buf: &[u8], is_gzipped: bool) -> Result<Self> {
        let unzipped;
        let buf = if is_gzipped {
            unzipped = gunzip(buf)?;
            unzipped.as_slice()
        } else {
            buf
        };
        let mut manifest: ChunkManifest = serde_json::from_slice(buf)
            .map_err(|e| SeaweedError::json("failed to decode chunk manifest", e))?;
        manifest.chunks.sort_by_key(|chunk| chunk.offset);
        Ok(manifest)
    }

    pub fn marshal(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self)
            .map_err(|e| SeaweedError::json("failed to encode chunk manifest", e))
    }

    pub fn marshal_gzipped(&self) -> Result<Vec<u8>> {
        gzip(&self.marshal()?)
    }

    pub fn total_chunk_size(&self) -> u64 {
        self.chunks.iter().map(|chunk| chunk.size).sum()
    }
}

pub fn gunzip(input: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    GzDecoder::new(input).read_to_end(&mut out)?;
    Ok(out)
}

pub fn gzip(input: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(input)?;
    Ok(encoder.finish()?)
}
