use crate::error::{ReconcileError, Result};
use std::future::Future;

/// Largest number of tuples the remote store accepts in one write request
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Feed `items` to `sink` in consecutive chunks of at most `size`.
///
/// Chunks keep the input order. The first sink error stops the loop and is
/// returned as is.
pub fn batch<T, E, F>(items: &[T], size: usize, mut sink: F) -> std::result::Result<(), E>
where
    F: FnMut(&[T]) -> std::result::Result<(), E>,
    E: From<ReconcileError>,
{
    if size == 0 {
        return Err(ReconcileError::invalid_batch_size(size).into());
    }
    for chunk in items.chunks(size) {
        sink(chunk)?;
    }
    Ok(())
}

/// Async variant of [`batch`]. Chunks are awaited one after another.
pub async fn batch_async<'a, T, E, F, Fut>(
    items: &'a [T],
    size: usize,
    mut sink: F,
) -> std::result::Result<(), E>
where
    F: FnMut(usize, &'a [T]) -> Fut,
    Fut: Future<Output = std::result::Result<(), E>>,
    E: From<ReconcileError>,
{
    if size == 0 {
        return Err(ReconcileError::invalid_batch_size(size).into());
    }
    for (index, chunk) in items.chunks(size).enumerate() {
        sink(index, chunk).await?;
    }
    Ok(())
}

/// Number of chunks `batch` produces for `len` items
pub fn batch_count(len: usize, size: usize) -> Result<usize> {
    if size == 0 {
        return Err(ReconcileError::invalid_batch_size(size));
    }
    Ok(len.div_ceil(size))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_batch_empty_input_never_calls_sink() {
        let mut calls = 0;
        let result: Result<()> = batch(&Vec::<u32>::new(), 100, |_| {
            calls += 1;
            Ok(())
        });
        assert!(result.is_ok());
        assert_eq!(calls, 0);
    }

    #[test]
    fn test_batch_rejects_zero_size() {
        let result: Result<()> = batch(&[1, 2, 3], 0, |_| Ok(()));
        assert!(matches!(result, Err(ReconcileError::InvalidBatchSize { size: 0, .. })));
    }

    #[test]
    fn test_batch_stops_at_first_error() {
        let items: Vec<u32> = (0..250).collect();
        let mut seen = Vec::new();
        let result: Result<()> = batch(&items, 100, |chunk| {
            seen.push(chunk.len());
            if seen.len() == 2 {
                return Err(ReconcileError::Config("sink failed".to_string()));
            }
            Ok(())
        });

        assert!(result.is_err());
        assert_eq!(seen, vec![100, 100]);
    }

    #[tokio::test]
    async fn test_batch_async_passes_chunk_index() {
        let items: Vec<u32> = (0..5).collect();
        let mut indexes = Vec::new();
        let result: Result<()> = batch_async(&items, 2, |index, chunk| {
            indexes.push((index, chunk.to_vec()));
            async { Ok(()) }
        })
        .await;

        assert!(result.is_ok());
        assert_eq!(
            indexes,
            vec![(0, vec![0, 1]), (1, vec![2, 3]), (2, vec![4])]
        );
    }

    proptest! {
        #[test]
        fn prop_batch_covers_every_item_in_order(len in 0usize..1000, size in 1usize..150) {
            let items: Vec<usize> = (0..len).collect();
            let mut chunks: Vec<Vec<usize>> = Vec::new();
            let result: Result<()> = batch(&items, size, |chunk| {
                chunks.push(chunk.to_vec());
                Ok(())
            });

            prop_assert!(result.is_ok());
            prop_assert_eq!(chunks.len(), batch_count(len, size).unwrap());
            prop_assert!(chunks.iter().all(|c| !c.is_empty() && c.len() <= size));
            let flattened: Vec<usize> = chunks.into_iter().flatten().collect();
            prop_assert_eq!(flattened, items);
        }
    }
}
