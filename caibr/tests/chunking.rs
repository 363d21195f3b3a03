mod common;
use common::pseudo_random;

use futures_util::stream::StreamExt;

use caibr::chunker::ChunkerConfig;

async fn chunk_offsets_and_sizes(data: &[u8], config: &ChunkerConfig) -> Vec<(u64, usize)> {
    config
        .new_chunker(data)
        .map(|result| {
            let (offset, chunk) = result.unwrap();
            (offset, chunk.len())
        })
        .collect()
        .await
}

// Boundary offsets pinned against the casync chunking algorithm. Any
// deviation from these values breaks cross tool compatibility.
#[tokio::test]
async fn golden_boundaries_pseudo_random() {
    let data = pseudo_random(100000);
    let config = ChunkerConfig::new(64, 256, 1024).unwrap();
    let chunks = chunk_offsets_and_sizes(&data, &config).await;
    assert_eq!(chunks.len(), 781);
    assert_eq!(
        &chunks[..10],
        &[
            (0, 166),
            (166, 143),
            (309, 113),
            (422, 143),
            (565, 113),
            (678, 143),
            (821, 113),
            (934, 143),
            (1077, 113),
            (1190, 143),
        ]
    );
    assert_eq!(chunks.iter().map(|(_, size)| size).sum::<usize>(), 100000);
}

#[tokio::test]
async fn chunking_is_deterministic() {
    let data = pseudo_random(50000);
    let config = ChunkerConfig::new(64, 256, 1024).unwrap();
    let first = chunk_offsets_and_sizes(&data, &config).await;
    let second = chunk_offsets_and_sizes(&data, &config).await;
    assert_eq!(first, second);
}

#[tokio::test]
async fn concatenated_chunks_equal_source() {
    let data = pseudo_random(30000);
    let config = ChunkerConfig::new(64, 256, 1024).unwrap();
    let mut rebuilt = Vec::new();
    let mut chunker = config.new_chunker(&data[..]);
    while let Some(result) = chunker.next().await {
        let (offset, chunk) = result.unwrap();
        assert_eq!(offset, rebuilt.len() as u64);
        rebuilt.extend_from_slice(chunk.data());
    }
    assert_eq!(rebuilt, data);
}

// An all zero hash window never matches the boundary predicate for the
// default discriminator, so zeros are forced into max size chunks.
#[tokio::test]
async fn zeros_forced_at_max_size() {
    let data = vec![0u8; 10 * 1024 * 1024];
    let config = ChunkerConfig::default();
    let chunks = chunk_offsets_and_sizes(&data, &config).await;
    assert_eq!(chunks.len(), 40);
    for (index, &(offset, size)) in chunks.iter().enumerate() {
        assert_eq!(offset, index as u64 * 262144);
        assert_eq!(size, 262144);
    }
}

#[tokio::test]
async fn trailing_short_chunk_is_kept() {
    let data = vec![0u8; 1024 * 1024 + 1000];
    let config = ChunkerConfig::default();
    let chunks = chunk_offsets_and_sizes(&data, &config).await;
    assert_eq!(chunks.len(), 5);
    assert_eq!(chunks[4], (1048576, 1000));
}

#[tokio::test]
async fn chunk_sizes_stay_within_bounds() {
    let data = pseudo_random(200000);
    let config = ChunkerConfig::new(64, 256, 1024).unwrap();
    let chunks = chunk_offsets_and_sizes(&data, &config).await;
    for (index, &(_, size)) in chunks.iter().enumerate() {
        assert!(size <= 1024);
        if index + 1 < chunks.len() {
            assert!(size >= 64);
        }
    }
}
