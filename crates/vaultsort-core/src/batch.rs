//! Fixed-size batching of unmatched items for model calls

use std::iter::FusedIterator;

use crate::error::{Error, Result};

/// Lazy, order-preserving sequence of batches over a slice
///
/// Every batch holds at most `size` items; only the last may be smaller.
/// Concatenating the batches gives back the original slice.
#[derive(Debug, Clone)]
pub struct Batches<'a, T> {
    remaining: &'a [T],
    size: usize,
}

impl<'a, T> Iterator for Batches<'a, T> {
    type Item = &'a [T];

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining.is_empty() {
            return None;
        }
        let take = self.size.min(self.remaining.len());
        let (batch, rest) = self.remaining.split_at(take);
        self.remaining = rest;
        Some(batch)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.remaining.len().div_ceil(self.size);
        (n, Some(n))
    }
}

impl<T> ExactSizeIterator for Batches<'_, T> {}

impl<T> FusedIterator for Batches<'_, T> {}

/// Split `items` into batches of at most `batch_size`
///
/// Fails with a configuration error when `batch_size` is not positive.
pub fn batches<T>(items: &[T], batch_size: i64) -> Result<Batches<'_, T>> {
    let size = validate_batch_size(batch_size)?;
    Ok(Batches {
        remaining: items,
        size,
    })
}

/// Check a user-supplied batch size
pub fn validate_batch_size(batch_size: i64) -> Result<usize> {
    if batch_size <= 0 {
        return Err(Error::Configuration(format!(
            "Batch size must be greater than 0 (got {})",
            batch_size
        )));
    }
    usize::try_from(batch_size)
        .map_err(|_| Error::Configuration(format!("Batch size too large: {}", batch_size)))
}
