use std::{
    io,
    pin::Pin,
    task::{Context, Poll},
};

use bytes::BytesMut;
use futures_util::{ready, FutureExt, Stream};
use tokio::{
    io::{AsyncRead, AsyncReadExt},
    pin,
};

use crate::{chunker::Chunker, Chunk};

const REFILL_SIZE: usize = 1024 * 1024;

/// Streams chunks from any source which implements tokio AsyncRead.
///
/// Drives a [`Chunker`] over a scan buffer which is refilled from the
/// reader, yielding `(source offset, chunk)` pairs in offset order.
pub struct StreamingChunker<C, R> {
    chunker: C,
    reader: R,
    buf: BytesMut,
    source_offset: u64,
    source_ended: bool,
}

impl<C, R> StreamingChunker<C, R> {
    pub fn new(chunker: C, reader: R) -> Self {
        Self {
            chunker,
            reader,
            buf: BytesMut::with_capacity(REFILL_SIZE),
            source_offset: 0,
            source_ended: false,
        }
    }

    // Every chunk leaves through here so the source offset accounting
    // is the same for boundary chunks and the final flush.
    fn emit(&mut self, chunk: Chunk) -> (u64, Chunk) {
        let offset = self.source_offset;
        self.source_offset += chunk.len() as u64;
        (offset, chunk)
    }
}

impl<C, R> Stream for StreamingChunker<C, R>
where
    C: Chunker + Unpin + Send,
    R: AsyncRead + Unpin + Send,
{
    type Item = io::Result<(u64, Chunk)>;
    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context) -> Poll<Option<Self::Item>> {
        let me = &mut *self;
        loop {
            if !me.buf.is_empty() {
                if let Some(chunk) = me.chunker.next(&mut me.buf) {
                    let emitted = me.emit(chunk);
                    return Poll::Ready(Some(Ok(emitted)));
                }
            }
            if me.source_ended {
                // No boundary will be found anymore. Whatever is left
                // in the scan buffer is the final chunk, which may be
                // shorter than the minimal chunk size.
                if me.buf.is_empty() {
                    return Poll::Ready(None);
                }
                let last = Chunk::from(me.buf.split().freeze());
                let emitted = me.emit(last);
                return Poll::Ready(Some(Ok(emitted)));
            }
            // The chunker needs more data before it can place a
            // boundary.
            if me.buf.capacity() - me.buf.len() < REFILL_SIZE {
                me.buf.reserve(REFILL_SIZE);
            }
            let read = me.reader.read_buf(&mut me.buf);
            pin!(read);
            if ready!(read.poll_unpin(cx))? == 0 {
                me.source_ended = true;
            }
        }
    }
}

#[cfg(test)]
mod tests {

    use super::*;
    use crate::chunker::ChunkerConfig;
    use futures_util::StreamExt;
    use std::cmp;
    use tokio::io::ReadBuf;

    // The MockSource will return bytes_per_read bytes every other read
    // and Pending every other, to replicate a source with limited I/O.
    struct MockSource {
        data: Vec<u8>,
        offset: usize,
        bytes_per_read: usize,
        pending: bool,
    }

    impl MockSource {
        fn new(data: Vec<u8>, bytes_per_read: usize) -> Self {
            Self {
                data,
                offset: 0,
                bytes_per_read,
                pending: false,
            }
        }
    }

    impl AsyncRead for MockSource {
        fn poll_read(
            mut self: Pin<&mut Self>,
            cx: &mut Context,
            buf: &mut ReadBuf,
        ) -> Poll<io::Result<()>> {
            let data_available = self.data.len() - self.offset;
            if data_available == 0 {
                Poll::Ready(Ok(()))
            } else if self.pending {
                self.pending = false;
                cx.waker().wake_by_ref();
                Poll::Pending
            } else {
                let read = cmp::min(
                    data_available,
                    cmp::min(buf.remaining(), self.bytes_per_read),
                );
                buf.put_slice(&self.data[self.offset..self.offset + read]);
                self.offset += read;
                self.pending = true;
                Poll::Ready(Ok(()))
            }
        }
    }

    fn test_data(length: usize) -> Vec<u8> {
        let mut seed: usize = 0xa3;
        (0..length)
            .map(|v| {
                seed ^= seed.wrapping_mul(4);
                (seed ^ v) as u8
            })
            .collect()
    }

    #[tokio::test]
    async fn single_byte_per_source_read() {
        let config = ChunkerConfig::new(64, 256, 1024).unwrap();
        let source_data = test_data(10000);
        let expected_offsets = {
            config
                .new_chunker(&source_data[..])
                .map(|result| {
                    let (offset, _chunk) = result.unwrap();
                    offset
                })
                .collect::<Vec<u64>>()
                .await
        };
        // Only give back a single byte per read from source, should still result in the same
        // result as with unlimited I/O.
        let mut source = MockSource::new(source_data.clone(), 1);
        let offsets = config
            .new_chunker(&mut source)
            .map(|result| {
                let (offset, _chunk) = result.unwrap();
                offset
            })
            .collect::<Vec<u64>>()
            .await;
        assert_eq!(expected_offsets, offsets);
    }

    #[tokio::test]
    async fn zero_data() {
        let config = ChunkerConfig::new(64, 256, 1024).unwrap();
        static SRC: [u8; 0] = [];
        assert_eq!(
            config
                .new_chunker(&SRC[..])
                .map(|result| {
                    let (offset, chunk) = result.unwrap();
                    assert_eq!(chunk.len(), 0);
                    offset
                })
                .collect::<Vec<u64>>()
                .await,
            Vec::<u64>::new(),
        );
    }

    #[tokio::test]
    async fn source_smaller_than_min_chunk() {
        let config = ChunkerConfig::new(64, 256, 1024).unwrap();
        static SRC: [u8; 5] = [0x1f, 0x55, 0x39, 0x5e, 0xfa];
        assert_eq!(
            config
                .new_chunker(&SRC[..])
                .map(|result| {
                    let (offset, chunk) = result.unwrap();
                    assert_eq!(chunk, Chunk::from(vec![0x1f, 0x55, 0x39, 0x5e, 0xfa]));
                    offset
                })
                .collect::<Vec<u64>>()
                .await,
            vec![0],
        );
    }

    #[tokio::test]
    async fn source_equal_to_min_chunk() {
        let config = ChunkerConfig::new(64, 256, 1024).unwrap();
        let data = test_data(64);
        let chunks: Vec<(u64, Chunk)> = config
            .new_chunker(&data[..])
            .map(|result| result.unwrap())
            .collect()
            .await;
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].0, 0);
        assert_eq!(chunks[0].1.data(), &data[..]);
    }
}
