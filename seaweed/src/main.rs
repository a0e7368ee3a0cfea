use anyhow::Context;
use clap::Parser;
use cli::{Args, Command};
use seaweed::{FileId, GrowOptions, Seaweed};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let token = CancellationToken::new();
    let client = Seaweed::with_config(args.config())?.with_cancellation(token.clone());

    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            warn!("interrupted, cancelling");
            token.cancel();
        }
    });

    run(&client, args.command).await
}

async fn run(client: &Seaweed, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Upload { files, placement } => {
            if let [file] = files.as_slice() {
                let fid = client
                    .upload_file(file, &placement.collection, &placement.ttl)
                    .await
                    .with_context(|| format!("failed to upload {}", file.display()))?;
                println!("{}\t{fid}", file.display());
                return Ok(());
            }
            let results = client
                .batch_upload_files(files.as_slice(), &placement.collection, &placement.ttl)
                .await?;
            let mut failed = 0;
            for result in &results {
                println!("{}", serde_json::to_string(result)?);
                if !result.is_ok() {
                    failed += 1;
                }
            }
            if failed > 0 {
                anyhow::bail!("{failed} of {} files failed", results.len());
            }
        }
        Command::Replace {
            fid,
            file,
            delete_first,
        } => {
            let fid = FileId::new(fid);
            client
                .replace_file(&fid, &file, delete_first)
                .await
                .with_context(|| format!("failed to replace {fid}"))?;
            info!(fid = %fid, "replaced");
        }
        Command::Delete {
            fid,
            chunked,
            collection,
        } => {
            let fid = FileId::new(fid);
            if chunked {
                client.delete_chunked_file(&fid, &collection).await?;
            } else {
                client.delete_file(&fid, &collection).await?;
            }
            info!(fid = %fid, "deleted");
        }
        Command::Download {
            fid,
            output,
            collection,
        } => {
            let fid = FileId::new(fid);
            let download = client.download_file(&fid, &collection).await?;
            let output = output
                .or_else(|| download.file_name.clone().map(Into::into))
                .unwrap_or_else(|| fid.as_str().replace(',', "_").into());
            tokio::fs::write(&output, &download.data)
                .await
                .with_context(|| format!("failed to write {}", output.display()))?;
            println!("{}\t{} bytes", output.display(), download.data.len());
        }
        Command::Grow {
            count,
            collection,
            replication,
            data_center,
            ttl,
        } => {
            let options = GrowOptions {
                count,
                collection,
                replication,
                data_center,
                ttl,
            };
            client.grow(&options).await?;
        }
    }
    Ok(())
}
