use anyhow::{Context, Result};
use log::*;
use std::path::PathBuf;
use tokio::fs::File;

use crate::string_utils::size_to_str;
use caibr::Index;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Options {
    pub index: PathBuf,
}

pub async fn run(opts: Options) -> Result<()> {
    let mut index_file = File::open(&opts.index)
        .await
        .with_context(|| format!("failed to open {}", opts.index.display()))?;
    let index = Index::read_from(&mut index_file).await?;
    info!("Index: {}", opts.index.display());
    info!("  Format: {}", index.format());
    info!("  Created at: {}", index.created_at());
    info!("  Source size: {}", size_to_str(index.total_size()));
    info!("  Chunks: {}", index.chunk_count());
    info!("  Checksum: {}", index.checksum());
    if index.total_compressed_size() > 0 {
        info!(
            "  Embedded payloads: {} (ratio {:.2})",
            size_to_str(index.total_compressed_size()),
            index.compression_ratio(),
        );
    } else {
        info!("  Payloads: in chunk store");
    }
    info!("  {:>12} {:>12} {:>12}  {}", "OFFSET", "SIZE", "STORED", "ID");
    for chunk in index.chunks() {
        info!(
            "  {:>12} {:>12} {:>12}  {}",
            chunk.offset,
            chunk.size,
            chunk.payload.len(),
            chunk.id,
        );
    }
    Ok(())
}
