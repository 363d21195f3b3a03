use anyhow::{Context, Result};
use log::*;
use std::path::PathBuf;
use tokio::fs::File;

use caibr::{
    api,
    store::{LocalStore, MemoryStore},
    CancelFlag, Index,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Options {
    pub index: PathBuf,
    pub store: Option<PathBuf>,
}

pub async fn run(opts: Options, cancel: CancelFlag) -> Result<()> {
    let mut index_file = File::open(&opts.index)
        .await
        .with_context(|| format!("failed to open {}", opts.index.display()))?;
    let index = Index::read_from(&mut index_file).await?;
    match &opts.store {
        Some(store_dir) => {
            let store = LocalStore::new(store_dir).await?;
            api::verify::verify(&index, Some(&store), &cancel).await?;
            info!(
                "{} OK, {} chunks verified against {}",
                opts.index.display(),
                index.chunk_count(),
                store_dir.display(),
            );
        }
        None => {
            api::verify::verify::<MemoryStore>(&index, None, &cancel).await?;
            info!("{} OK, {} chunks", opts.index.display(), index.chunk_count());
        }
    }
    Ok(())
}
