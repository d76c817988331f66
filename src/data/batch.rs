//! Chunked persistence of large entity collections.
//!
//! Chunks are persisted one after another. The first failure aborts the
//! remaining chunks; chunks already persisted stay persisted.

use std::time::Instant;

use async_trait::async_trait;
use tracing::debug;

use super::errors::StoreError;
use super::resolver::{KeyResolver, KeyStore, Loadable};
use crate::utils::fmt_duration;

/// Anything that can persist a bounded slice of entities in one go.
#[async_trait]
pub trait ChunkSink<T: Sync>: Send + Sync {
    async fn persist(&self, chunk: &[T]) -> Result<(), StoreError>;
}

#[async_trait]
impl<T: Loadable, S: KeyStore> ChunkSink<T> for KeyResolver<S> {
    async fn persist(&self, chunk: &[T]) -> Result<(), StoreError> {
        self.resolve_or_create(chunk).await.map(|_| ())
    }
}

/// Persist `entities` through `sink` in contiguous chunks of at most
/// `chunk_size`. Returns the number of chunks persisted.
pub async fn upsert_in_chunks<T, K>(
    entities: &[T],
    chunk_size: usize,
    sink: &K,
) -> Result<usize, StoreError>
where
    T: Sync,
    K: ChunkSink<T> + ?Sized,
{
    let chunk_size = chunk_size.max(1);
    let total_chunks = entities.len().div_ceil(chunk_size);
    let start = Instant::now();

    for (index, chunk) in entities.chunks(chunk_size).enumerate() {
        sink.persist(chunk).await?;
        debug!(
            chunk = index + 1,
            total_chunks,
            size = chunk.len(),
            "chunk persisted"
        );
    }

    debug!(
        entities = entities.len(),
        chunks = total_chunks,
        duration = fmt_duration(start.elapsed()),
        "all chunks persisted"
    );
    Ok(total_chunks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::Mutex;

    /// Records chunk sizes and fails on the configured call.
    #[derive(Default)]
    struct RecordingSink {
        calls: Mutex<Vec<usize>>,
        fail_on: Option<usize>,
    }

    #[async_trait]
    impl ChunkSink<u32> for RecordingSink {
        async fn persist(&self, chunk: &[u32]) -> Result<(), StoreError> {
            let mut calls = self.calls.lock().await;
            calls.push(chunk.len());
            if self.fail_on == Some(calls.len()) {
                return Err(StoreError::Database(sqlx::Error::Protocol("boom".into())));
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn splits_into_bounded_chunks() {
        let sink = RecordingSink::default();
        let entities: Vec<u32> = (0..250).collect();

        let chunks = upsert_in_chunks(&entities, 100, &sink).await.unwrap();
        assert_eq!(chunks, 3);
        assert_eq!(*sink.calls.lock().await, vec![100, 100, 50]);
    }

    #[tokio::test]
    async fn failure_aborts_remaining_chunks() {
        let sink = RecordingSink {
            fail_on: Some(2),
            ..Default::default()
        };
        let entities: Vec<u32> = (0..250).collect();

        assert!(upsert_in_chunks(&entities, 100, &sink).await.is_err());
        assert_eq!(*sink.calls.lock().await, vec![100, 100]);
    }

    #[tokio::test]
    async fn empty_input_makes_no_calls() {
        let sink = RecordingSink::default();
        assert_eq!(upsert_in_chunks::<u32, _>(&[], 100, &sink).await.unwrap(), 0);
        assert!(sink.calls.lock().await.is_empty());
    }

    #[tokio::test]
    async fn zero_chunk_size_is_treated_as_one() {
        let sink = RecordingSink::default();
        upsert_in_chunks::<u32, _>(&[1, 2, 3], 0, &sink)
            .await
            .unwrap();
        assert_eq!(*sink.calls.lock().await, vec![1, 1, 1]);
    }
}
