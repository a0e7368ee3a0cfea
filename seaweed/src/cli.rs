use clap::{Args as ClapArgs, Parser, Subcommand};
use seaweed::{ChunkCountPolicy, SeaweedConfig};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "weed-client")]
#[command(version, about = "Upload, replace and delete files on a SeaweedFS cluster", long_about = None)]
pub(crate) struct Args {
    /// Master address
    #[arg(long, env = "SEAWEED_MASTER", default_value = "127.0.0.1:9333")]
    pub(crate) master: String,

    /// Split files larger than this many bytes into chunks, 0 disables chunking
    #[arg(long, env = "SEAWEED_CHUNK_SIZE", default_value_t = 0)]
    pub(crate) chunk_size: u64,

    /// Chunk uploads in flight per file
    #[arg(long, env = "SEAWEED_UPLOAD_CONCURRENCY", default_value_t = 1)]
    pub(crate) concurrency: usize,

    /// Count chunks as size / chunk_size + 1, like older clients
    #[arg(long, env = "SEAWEED_LEGACY_CHUNK_COUNT")]
    pub(crate) legacy_chunk_count: bool,

    /// Per-request timeout in seconds
    #[arg(long, env = "SEAWEED_TIMEOUT", default_value_t = 45)]
    pub(crate) timeout_secs: u64,

    #[command(subcommand)]
    pub(crate) command: Command,
}

#[derive(Subcommand, Debug)]
pub(crate) enum Command {
    #[command(about = "Upload one or more files")]
    Upload {
        #[arg(value_name = "FILE", required = true)]
        files: Vec<PathBuf>,
        #[command(flatten)]
        placement: Placement,
    },
    #[command(about = "Write a file over an existing file id")]
    Replace {
        fid: String,
        #[arg(value_name = "FILE")]
        file: PathBuf,
        /// Delete the old content before uploading
        #[arg(long)]
        delete_first: bool,
    },
    #[command(about = "Delete a file id")]
    Delete {
        fid: String,
        /// The id holds a chunk manifest; delete its chunks too
        #[arg(long)]
        chunked: bool,
        #[arg(long, default_value = "")]
        collection: String,
    },
    #[command(about = "Download a file id")]
    Download {
        fid: String,
        /// Output path, defaults to the name the server reports
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[arg(long, default_value = "")]
        collection: String,
    },
    #[command(about = "Ask the master to grow volumes")]
    Grow {
        #[arg(long, default_value_t = 0)]
        count: u64,
        #[arg(long, default_value = "")]
        collection: String,
        #[arg(long, default_value = "")]
        replication: String,
        #[arg(long, default_value = "")]
        data_center: String,
        #[arg(long, default_value = "")]
        ttl: String,
    },
}

#[derive(ClapArgs, Debug)]
pub(crate) struct Placement {
    #[arg(long, default_value = "")]
    pub(crate) collection: String,
    /// Time to live, e.g. 3m, 4h, 5d
    #[arg(long, default_value = "")]
    pub(crate) ttl: String,
}

impl Args {
    pub(crate) fn config(&self) -> SeaweedConfig {
        let policy = if self.legacy_chunk_count {
            ChunkCountPolicy::Legacy
        } else {
            ChunkCountPolicy::Exact
        };
        SeaweedConfig::new(self.master.clone())
            .with_chunk_size(self.chunk_size)
            .with_chunk_count_policy(policy)
            .with_upload_concurrency(self.concurrency)
            .with_request_timeout(Duration::from_secs(self.timeout_secs))
    }
}
