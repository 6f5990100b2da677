//! Unbounded upload body generator. Never materialises the whole body:
//! a single pre-filled chunk is rotated and cloned (a cheap `Bytes`
//! refcount bump, not a reallocation) for as long as the caller keeps
//! polling. Grounded in the chunked `Bytes` body generation used by
//! `cloudflare-speed-cli`'s throughput engine.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use http_body_util::StreamBody;
use hyper::body::Frame;

pub const UPLOAD_CHUNK_SIZE: usize = 64 * 1024;

/// One pre-filled chunk, reused by every body that streams it.
fn fixed_chunk() -> Bytes {
    Bytes::from(vec![0x42u8; UPLOAD_CHUNK_SIZE])
}

/// Builds an inexhaustible `StreamBody` that yields `fixed_chunk()` forever,
/// bumping `counter` by the chunk size on every frame produced. Counting at
/// production time (rather than guessing at what the kernel actually wrote)
/// is the same approximation used for the "accepted" byte count in
/// `LoadGeneratingConnection::Transferred()` on the upload side. The stream
/// stops only when the consumer drops it (connection close or scope
/// cancellation).
pub fn counting_upload_body(
    counter: Arc<AtomicU64>,
) -> StreamBody<impl futures::Stream<Item = Result<Frame<Bytes>, std::convert::Infallible>>> {
    let chunk = fixed_chunk();
    let stream = futures::stream::repeat_with(move || {
        counter.fetch_add(chunk.len() as u64, Ordering::Relaxed);
        Ok(Frame::data(chunk.clone()))
    });
    StreamBody::new(stream)
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use http_body_util::BodyExt;

    #[tokio::test]
    async fn counts_bytes_as_chunks_are_produced_and_never_reallocates() {
        let counter = Arc::new(AtomicU64::new(0));
        let body = counting_upload_body(counter.clone());
        let mut stream = Box::pin(body.into_data_stream().take(5));

        let mut seen = Vec::new();
        while let Some(Ok(b)) = stream.next().await {
            seen.push(b);
        }

        assert_eq!(seen.len(), 5);
        assert_eq!(counter.load(Ordering::Relaxed), (5 * UPLOAD_CHUNK_SIZE) as u64);
        // Same backing allocation across clones (refcount bump only).
        assert_eq!(seen[0].as_ptr(), seen[1].as_ptr());
    }
}
