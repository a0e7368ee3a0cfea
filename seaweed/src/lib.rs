//! Client for a SeaweedFS-style blob cluster: a master that assigns file ids
//! and volume servers that store the bytes.
//!
//! Large files are split into chunk objects plus a manifest; see [`submit`].

pub mod client;
pub mod config;
pub mod error;
pub mod fid;
pub mod location;
pub mod manifest;
pub mod master;
pub mod part;
pub mod submit;
pub mod transport;

pub use client::Seaweed;
pub use config::{ChunkCountPolicy, SeaweedConfig};
pub use error::{Result, SeaweedError};
pub use fid::FileId;
pub use location::{Clock, LocationCache, ManualClock, SystemClock};
pub use manifest::{ChunkInfo, ChunkManifest};
pub use master::{AssignResult, GrowOptions, LookupResult, VolumeLocation};
pub use part::{FilePart, SubmitResult};
pub use transport::{Download, HttpTransport, InMemoryCluster, Transport, make_url};
