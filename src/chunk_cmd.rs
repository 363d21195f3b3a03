use anyhow::{Context, Result};
use log::*;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};

use crate::string_utils::size_to_str;
use caibr::{
    api,
    chunker::ChunkerConfig,
    store::{ChunkStore, LocalStore},
    CancelFlag, Compression, Index, IndexFormat,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Options {
    pub input: PathBuf,
    pub output: Option<PathBuf>,
    pub min_chunk_size: usize,
    pub avg_chunk_size: usize,
    pub max_chunk_size: usize,
    pub compression: Compression,
    pub store: Option<PathBuf>,
    pub format: IndexFormat,
    pub force_create: bool,
    pub num_chunk_buffers: usize,
}

pub async fn run(opts: Options, cancel: CancelFlag) -> Result<()> {
    let chunker_config = ChunkerConfig::new(
        opts.min_chunk_size,
        opts.avg_chunk_size,
        opts.max_chunk_size,
    )?;
    let mut input = File::open(&opts.input)
        .await
        .with_context(|| format!("failed to open {}", opts.input.display()))?;
    let source_size = input.metadata().await?.len();
    let chunk_opts = api::chunk::ChunkOptions {
        chunker_config,
        compression: opts.compression,
        format: opts.format,
        num_chunk_buffers: opts.num_chunk_buffers,
        cancel,
    };
    let index = match &opts.store {
        Some(store_dir) => {
            let store = LocalStore::new(store_dir).await?;
            let index =
                api::chunk::to_store(&mut input, Some(source_size), &store, &chunk_opts).await?;
            let stats = store.stats().await?;
            info!(
                "Store at {} now holds {} chunks",
                store_dir.display(),
                stats.chunk_count.unwrap_or(0),
            );
            index
        }
        None => api::chunk::to_index(&mut input, Some(source_size), &chunk_opts).await?,
    };

    let output_path = opts
        .output
        .clone()
        .unwrap_or_else(|| Index::filename_for(&opts.input, opts.format));
    let mut output = create_output(&output_path, opts.force_create).await?;
    index.write_to(&mut output).await?;

    let unique: HashSet<_> = index.chunks().iter().map(|chunk| chunk.id).collect();
    info!(
        "Chunked {} ({}) into {} chunks ({} unique)",
        opts.input.display(),
        size_to_str(index.total_size()),
        index.chunk_count(),
        unique.len(),
    );
    if opts.store.is_none() {
        info!(
            "Embedded payloads: {}, compression ratio {:.2}",
            size_to_str(index.total_compressed_size()),
            index.compression_ratio(),
        );
    }
    info!("Index written to {}", output_path.display());
    Ok(())
}

async fn create_output(path: &Path, overwrite: bool) -> Result<File> {
    let mut options = OpenOptions::new();
    options.write(true);
    if overwrite {
        options.create(true).truncate(true);
    } else {
        options.create_new(true);
    }
    options
        .open(path)
        .await
        .with_context(|| format!("failed to create {}", path.display()))
}
