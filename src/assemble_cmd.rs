use anyhow::{Context, Result};
use log::*;
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};

use crate::string_utils::size_to_str;
use caibr::{
    assemble::{self, Seed},
    chunker::ChunkerConfig,
    store::{LocalStore, MemoryStore},
    CancelFlag, Index,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Options {
    pub index: PathBuf,
    pub output: PathBuf,
    pub store: Option<PathBuf>,
    pub seeds: Vec<PathBuf>,
    pub min_chunk_size: usize,
    pub avg_chunk_size: usize,
    pub max_chunk_size: usize,
    pub verify: bool,
    pub force: bool,
    pub force_create: bool,
    pub num_chunk_buffers: usize,
}

pub async fn run(opts: Options, cancel: CancelFlag) -> Result<()> {
    let mut index_file = File::open(&opts.index)
        .await
        .with_context(|| format!("failed to open {}", opts.index.display()))?;
    let index = Index::read_from(&mut index_file).await?;
    info!(
        "Assembling {} ({}, {} chunks) into {}",
        opts.index.display(),
        size_to_str(index.total_size()),
        index.chunk_count(),
        opts.output.display(),
    );

    let mut seeds: Vec<Seed<File>> = Vec::new();
    if !opts.seeds.is_empty() {
        let seed_config = ChunkerConfig::new(
            opts.min_chunk_size,
            opts.avg_chunk_size,
            opts.max_chunk_size,
        )?;
        for path in &opts.seeds {
            let file = File::open(path)
                .await
                .with_context(|| format!("failed to open seed {}", path.display()))?;
            seeds.push(Seed::new(file, seed_config.clone()));
        }
    }

    let mut output = create_output(&opts.output, opts.force_create).await?;
    output.set_len(index.total_size()).await?;

    let assemble_opts = assemble::Options {
        verify: opts.verify,
        force: opts.force,
        num_chunk_buffers: opts.num_chunk_buffers,
        cancel,
    };
    let summary = match &opts.store {
        Some(store_dir) => {
            let store = LocalStore::new(store_dir).await?;
            assemble::assemble(&assemble_opts, &index, &store, seeds, &mut output).await?
        }
        None => {
            // Without a store every chunk must come from a seed or from
            // payloads embedded in the index.
            assemble::assemble(&assemble_opts, &index, &MemoryStore::new(), seeds, &mut output)
                .await?
        }
    };
    info!("Assembled {} ({})", opts.output.display(), size_to_str(summary.written));
    info!(
        "Used {} from seeds, {} from index, {} from store",
        size_to_str(summary.bytes_from_seeds),
        size_to_str(summary.bytes_from_index),
        size_to_str(summary.bytes_from_store),
    );
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
