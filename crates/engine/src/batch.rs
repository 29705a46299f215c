//! Fixed-size batch partitioning.

use std::ops::Range;

/// Number of batches for `len` items.
pub fn batch_count(len: usize, batch_size: usize) -> usize {
    len.div_ceil(batch_size.max(1))
}

/// Index range of batch `index`, or `None` past the end.
pub fn batch_range(len: usize, batch_size: usize, index: usize) -> Option<Range<usize>> {
    let size = batch_size.max(1);
    let start = index.checked_mul(size)?;
    if start >= len {
        return None;
    }
    Some(start..(start + size).min(len))
}

/// All batch ranges in order.
pub fn partition(len: usize, batch_size: usize) -> Vec<Range<usize>> {
    (0..batch_count(len, batch_size))
        .filter_map(|i| batch_range(len, batch_size, i))
        .collect()
}
