//! Calls against the master: file id assignment, volume lookup and growth.

use crate::client::Seaweed;
use crate::error::{Result, SeaweedError};
use crate::fid::FileId;
use crate::transport::{Transport, make_url};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Reply of `/dir/assign`. A zero `count` means nothing was assigned.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignResult {
    #[serde(default)]
    pub fid: FileId,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub public_url: String,
    #[serde(default)]
    pub count: u64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeLocation {
    pub url: String,
    #[serde(default)]
    pub public_url: String,
}

/// Reply of `/dir/lookup`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LookupResult {
    #[serde(default)]
    pub volume_id: String,
    #[serde(default)]
    pub locations: Vec<VolumeLocation>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error: String,
}

/// Parameters of `/vol/grow`. Empty strings and a zero count are left out.
#[derive(Debug, Clone, Default)]
pub struct GrowOptions {
    pub count: u64,
    pub collection: String,
    pub replication: String,
    pub data_center: String,
    pub ttl: String,
}

impl GrowOptions {
    fn to_args(&self) -> Vec<(&'static str, String)> {
        let mut args = Vec::new();
        if self.count > 0 {
            args.push(("count", self.count.to_string()));
        }
        for (key, value) in [
            ("collection", &self.collection),
            ("replication", &self.replication),
            ("dataCenter", &self.data_center),
            ("ttl", &self.ttl),
        ] {
            if !value.is_empty() {
                args.push((key, value.clone()));
            }
        }
        args
    }
}

impl<T: Transport> Seaweed<T> {
    /// Reserves `count` file ids. Extra ids are addressed as `<fid>_<k>`.
    pub async fn assign(&self, count: u64, collection: &str, ttl: &str) -> Result<AssignResult> {
        let mut form = vec![("count", count.to_string())];
        if !collection.is_empty() {
            form.push(("collection", collection.to_string()));
        }
        if !ttl.is_empty() {
            form.push(("ttl", ttl.to_string()));
        }

        let url = make_url(&self.config.master, "/dir/assign", &[])?;
        let body = self.transport.post_form(&url, &form).await?;
        let ret: AssignResult = serde_json::from_slice(&body).map_err(|e| {
            SeaweedError::json(
                format!(
                    "failed to decode assign response: {}",
                    String::from_utf8_lossy(&body)
                ),
                e,
            )
        })?;

        if ret.count == 0 {
            let reason = if ret.error.is_empty() {
                "no file id assigned".to_string()
            } else {
                ret.error
            };
            return Err(SeaweedError::Assign(reason));
        }
        debug!(fid = %ret.fid, url = %ret.url, count = ret.count, "assigned");
        Ok(ret)
    }

    /// Resolves the volume server holding `fid`.
    ///
    /// A cached location younger than the configured freshness window is used
    /// when `use_cache` is set. Every answer from the master refreshes the cache.
    pub async fn lookup_file_id(
        &self,
        fid: &FileId,
        collection: &str,
        use_cache: bool,
    ) -> Result<String> {
        if use_cache {
            if let Some(node) = self.locations.get(fid.as_str()).await {
                return Ok(node);
            }
        }

        let mut args = vec![("volumeId", fid.volume_id()?.to_string())];
        if !collection.is_empty() {
            args.push(("collection", collection.to_string()));
        }
        let url = make_url(&self.config.master, "/dir/lookup", &args)?;

        let lookup_error = |reason: String| SeaweedError::Lookup {
            fid: fid.to_string(),
            reason,
        };
        let body = self
            .transport
            .get(&url)
            .await
            .map_err(|e| lookup_error(lookup_failure_reason(e)))?;
        let ret: LookupResult = serde_json::from_slice(&body)
            .map_err(|e| lookup_error(format!("bad lookup response: {e}")))?;

        if !ret.error.is_empty() {
            return Err(lookup_error(ret.error));
        }
        let node = ret
            .locations
            .into_iter()
            .next()
            .map(|location| location.url)
            .ok_or_else(|| lookup_error("no locations found".to_string()))?;

        self.locations.put(fid.as_str(), node.clone()).await;
        Ok(node)
    }

    /// Asks the master to pre-allocate volumes.
    pub async fn grow(&self, options: &GrowOptions) -> Result<()> {
        let url = make_url(&self.config.master, "/vol/grow", &options.to_args())?;
        self.transport.get(&url).await?;
        info!(
            count = options.count,
            collection = %options.collection,
            "volume grow requested"
        );
        Ok(())
    }
}

/// Prefers the `error` field of a JSON error body over the bare status line.
fn lookup_failure_reason(err: SeaweedError) -> String {
    if let SeaweedError::Status { body, .. } = &err {
        if let Ok(ret) = serde_json::from_str::<LookupResult>(body) {
            if !ret.error.is_empty() {
                return ret.error;
            }
        }
    }
    err.to_string()
}
