//! In-memory cluster: a fake master plus volume servers behind the `Transport`
//! trait. Used by the tests and for local development without a real cluster.
//!
//! Node `i` hosts volume `i + 1`; assignments rotate over the nodes so chunks
//! of one file land on different servers. Writes are rejected when they are
//! sent to a node that does not host the fid's volume.

use super::{DeleteFailure, Download, Transport, Upload, UploadResult};
use crate::error::{Result, SeaweedError};
use crate::fid::FileId;
use crate::manifest::ChunkManifest;
use crate::master::{AssignResult, LookupResult, VolumeLocation};
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};
use url::Url;

#[derive(Debug, Clone)]
pub struct StoredObject {
    pub node: String,
    pub file_name: String,
    pub data: Bytes,
    pub mime_type: Option<String>,
    pub is_gzipped: bool,
    pub is_manifest: bool,
    pub mod_time: Option<i64>,
}

/// Request counters, for asserting how the client talked to the cluster.
#[derive(Debug, Clone, Default)]
pub struct ClusterStats {
    pub assign_calls: usize,
    pub lookup_calls: usize,
    pub grow_calls: usize,
    pub uploads: usize,
    /// Every fid a delete was attempted for, in order
    pub deletes: Vec<String>,
}

#[derive(Debug, Default)]
struct Faults {
    /// Assign calls with a 0-based index >= the first value fail with the message
    assign: Option<(usize, String)>,
    /// Uploads with this file name are refused with the message
    upload: HashMap<String, String>,
    delete: HashSet<String>,
    delete_all: bool,
}

#[derive(Debug, Default)]
struct ClusterState {
    next_key: u64,
    next_node: usize,
    objects: HashMap<String, StoredObject>,
    stats: ClusterStats,
    faults: Faults,
}

pub struct InMemoryCluster {
    nodes: Vec<String>,
    state: Mutex<ClusterState>,
}

impl InMemoryCluster {
    /// A cluster with `nodes` volume servers named `volume-<n>:8080`.
    pub fn new(nodes: usize) -> Self {
        let nodes = (1..=nodes.max(1))
            .map(|n| format!("volume-{n}:8080"))
            .collect();
        Self::with_nodes(nodes)
    }

    pub fn with_nodes(nodes: Vec<String>) -> Self {
        Self {
            nodes,
            state: Mutex::new(ClusterState::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, ClusterState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn nodes(&self) -> &[String] {
        &self.nodes
    }

    pub fn stats(&self) -> ClusterStats {
        self.state().stats.clone()
    }

    pub fn object(&self, fid: &str) -> Option<StoredObject> {
        self.state().objects.get(fid).cloned()
    }

    pub fn object_count(&self) -> usize {
        self.state().objects.len()
    }

    /// Stored objects that are not manifests, sorted by fid.
    pub fn chunk_objects(&self) -> Vec<(String, StoredObject)> {
        let mut objects: Vec<_> = self
            .state()
            .objects
            .iter()
            .filter(|(_, o)| !o.is_manifest)
            .map(|(fid, o)| (fid.clone(), o.clone()))
            .collect();
        objects.sort_by(|a, b| a.0.cmp(&b.0));
        objects
    }

    /// Makes every assign call from the `from`-th (0-based) on fail.
    pub fn fail_assign_from(&self, from: usize, message: impl Into<String>) {
        self.state().faults.assign = Some((from, message.into()));
    }

    pub fn fail_assign(&self, message: impl Into<String>) {
        self.fail_assign_from(0, message);
    }

    pub fn fail_upload_named(&self, file_name: impl Into<String>, message: impl Into<String>) {
        self.state()
            .faults
            .upload
            .insert(file_name.into(), message.into());
    }

    pub fn fail_delete(&self, fid: impl Into<String>) {
        self.state().faults.delete.insert(fid.into());
    }

    pub fn fail_all_deletes(&self) {
        self.state().faults.delete_all = true;
    }

    pub fn clear_faults(&self) {
        self.state().faults = Faults::default();
    }

    fn node_of_volume(&self, vid: &str) -> Option<&String> {
        let index: usize = vid.parse().ok()?;
        self.nodes.get(index.checked_sub(1)?)
    }

    fn assign(&self, form: &[(&str, String)]) -> AssignResult {
        let count: u64 = form_value(form, "count")
            .and_then(|c| c.parse().ok())
            .unwrap_or(1);

        let mut state = self.state();
        let call = state.stats.assign_calls;
        state.stats.assign_calls += 1;

        if let Some((from, message)) = &state.faults.assign {
            if call >= *from {
                return AssignResult {
                    error: message.clone(),
                    ..Default::default()
                };
            }
        }
        if self.nodes.is_empty() {
            return AssignResult {
                error: "no writable volumes".to_string(),
                ..Default::default()
            };
        }
        if count == 0 {
            return AssignResult {
                error: "count must be positive".to_string(),
                ..Default::default()
            };
        }

        let node_index = state.next_node % self.nodes.len();
        state.next_node += 1;
        let key = state.next_key + 1;
        state.next_key += count;
        let cookie = (key.wrapping_mul(2_654_435_761) & 0xffff_ffff) as u32;
        let node = self.nodes[node_index].clone();

        AssignResult {
            fid: FileId::new(format!("{},{key:x}{cookie:08x}", node_index + 1)),
            url: node.clone(),
            public_url: node,
            count,
            error: String::new(),
        }
    }

    fn lookup(&self, url: &Url) -> Result<Bytes> {
        self.state().stats.lookup_calls += 1;
        let vid = query_value(url, "volumeId").unwrap_or_default();
        let ret = match self.node_of_volume(&vid) {
            Some(node) => LookupResult {
                volume_id: vid,
                locations: vec![VolumeLocation {
                    url: node.clone(),
                    public_url: node.clone(),
                }],
                error: String::new(),
            },
            None => {
                return Err(SeaweedError::Status {
                    url: url.to_string(),
                    status: 404,
                    body: format!(r#"{{"error":"volume id {vid} not found"}}"#),
                });
            }
        };
        to_json(&ret)
    }

    /// Serves a read the way a volume server does: manifests are expanded into
    /// the concatenated chunk data unless `cm=false` asks for the raw manifest.
    fn read(&self, url: &Url) -> Result<Download> {
        let fid = fid_of(url);
        let state = self.state();
        let object = state.objects.get(&fid).ok_or_else(|| SeaweedError::Status {
            url: url.to_string(),
            status: 404,
            body: String::new(),
        })?;

        let raw = query_value(url, "cm").as_deref() == Some("false");
        let data = if object.is_manifest && !raw {
            let manifest = ChunkManifest::load(&object.data, object.is_gzipped)?;
            let mut buf = BytesMut::with_capacity(manifest.size as usize);
            for chunk in &manifest.chunks {
                let part = state.objects.get(chunk.fid.as_str()).ok_or_else(|| {
                    SeaweedError::Status {
                        url: url.to_string(),
                        status: 500,
                        body: format!("missing chunk {}", chunk.fid),
                    }
                })?;
                buf.extend_from_slice(&part.data);
            }
            buf.freeze()
        } else {
            object.data.clone()
        };

        Ok(Download {
            file_name: Some(object.file_name.clone()),
            is_gzipped: object.is_gzipped && (raw || !object.is_manifest),
            data,
        })
    }
}

#[async_trait]
impl Transport for InMemoryCluster {
    async fn post_form(&self, url: &Url, form: &[(&str, String)]) -> Result<Bytes> {
        match url.path() {
            "/dir/assign" => to_json(&self.assign(form)),
            _ => Err(not_found(url)),
        }
    }

    async fn get(&self, url: &Url) -> Result<Bytes> {
        match url.path() {
            "/dir/lookup" => self.lookup(url),
            "/vol/grow" => {
                self.state().stats.grow_calls += 1;
                Ok(Bytes::from_static(b"{}"))
            }
            _ => Ok(self.read(url)?.data),
        }
    }

    async fn upload(&self, url: &Url, upload: Upload) -> Result<UploadResult> {
        let fid = fid_of(url);
        let node = authority(url);
        // drain a streamed body before taking the lock
        let body = upload.body.collect().await;
        let mut state = self.state();
        state.stats.uploads += 1;
        let data = body?;

        if let Some(message) = state.faults.upload.get(&upload.file_name) {
            return Err(SeaweedError::remote(url, message.clone()));
        }
        let vid = FileId::new(fid.clone()).volume_id()?.to_string();
        if self.node_of_volume(&vid) != Some(&node) {
            return Err(SeaweedError::remote(
                url,
                format!("volume {vid} is not served by {node}"),
            ));
        }

        let size = data.len() as u64;
        let object = StoredObject {
            node,
            file_name: upload.file_name.clone(),
            data,
            mime_type: upload.mime_type,
            is_gzipped: upload.is_gzipped,
            is_manifest: query_value(url, "cm").as_deref() == Some("true"),
            mod_time: query_value(url, "ts").and_then(|ts| ts.parse().ok()),
        };
        state.objects.insert(fid, object);

        Ok(UploadResult {
            name: upload.file_name,
            size,
            error: String::new(),
        })
    }

    async fn delete(&self, url: &Url) -> Result<()> {
        let fid = fid_of(url);
        let mut state = self.state();
        state.stats.deletes.push(fid.clone());

        if state.faults.delete_all || state.faults.delete.contains(&fid) {
            let failure = DeleteFailure::from_body(br#"{"error":"delete refused"}"#);
            return Err(SeaweedError::remote(url, failure.message()));
        }
        // a missing object is a successful delete
        state.objects.remove(&fid);
        Ok(())
    }

    async fn download(&self, url: &Url) -> Result<Download> {
        self.read(url)
    }
}

fn not_found(url: &Url) -> SeaweedError {
    SeaweedError::Status {
        url: url.to_string(),
        status: 404,
        body: String::new(),
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<Bytes> {
    serde_json::to_vec(value)
        .map(Bytes::from)
        .map_err(|e| SeaweedError::json("failed to encode fake cluster reply", e))
}

fn fid_of(url: &Url) -> String {
    url.path().trim_start_matches('/').to_string()
}

fn authority(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default();
    match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    }
}

fn query_value(url: &Url, key: &str) -> Option<String> {
    url.query_pairs()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.into_owned())
}

fn form_value<'a>(form: &'a [(&str, String)], key: &str) -> Option<&'a str> {
    form.iter()
        .find(|(k, _)| *k == key)
        .map(|(_, v)| v.as_str())
}
