#![allow(dead_code)]

use seaweed::{InMemoryCluster, Seaweed, SeaweedConfig};
use std::sync::Arc;

pub const CHUNK: u64 = 1024;

pub fn cluster(nodes: usize) -> Arc<InMemoryCluster> {
    Arc::new(InMemoryCluster::new(nodes))
}

pub fn client(cluster: &Arc<InMemoryCluster>, config: SeaweedConfig) -> Seaweed<InMemoryCluster> {
    Seaweed::with_shared_transport(config, cluster.clone())
}

pub fn chunked_config() -> SeaweedConfig {
    SeaweedConfig::new("master:9333").with_chunk_size(CHUNK)
}

/// Deterministic, non-repeating-per-chunk content.
pub fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 31 % 251) as u8).collect()
}
