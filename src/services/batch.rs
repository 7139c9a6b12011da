use crate::error::PipelineError;
use crate::models::{Batch, Item};

/// Split `items` into consecutive batches of `size`; the last one holds the remainder.
///
/// The returned sequence is lazy and consumed once.
pub fn batch(items: Vec<Item>, size: usize) -> Result<Batches, PipelineError> {
    if size == 0 {
        return Err(PipelineError::InvalidConfiguration(
            "batch size must be a positive integer".to_string(),
        ));
    }

    let total = items.len();
    Ok(Batches {
        items: items.into_iter(),
        size,
        total,
        next_index: 0,
        next_start: 0,
    })
}

/// Number of batches `total` items produce at `size` per batch.
pub fn batch_count(total: usize, size: usize) -> usize {
    total.div_ceil(size)
}

#[derive(Debug)]
pub struct Batches {
    items: std::vec::IntoIter<Item>,
    size: usize,
    total: usize,
    next_index: usize,
    next_start: usize,
}

impl Batches {
    /// Total number of batches, including any already consumed or skipped.
    pub fn total(&self) -> usize {
        batch_count(self.total, self.size)
    }

    /// Drop the next `n` batches. Indices and offsets of later batches are unchanged.
    pub fn skip_batches(&mut self, n: usize) -> usize {
        let remaining = self.items.len();
        let dropped_items = n.saturating_mul(self.size).min(remaining);
        if dropped_items > 0 {
            self.items.nth(dropped_items - 1);
        }

        let skipped = batch_count(dropped_items, self.size);
        self.next_index += skipped;
        self.next_start += dropped_items;
        skipped
    }
}

impl Iterator for Batches {
    type Item = Batch;

    fn next(&mut self) -> Option<Batch> {
        let items: Vec<Item> = self.items.by_ref().take(self.size).collect();
        if items.is_empty() {
            return None;
        }

        let batch = Batch {
            index: self.next_index,
            start: self.next_start,
            items,
        };
        self.next_index += 1;
        self.next_start += batch.len();
        Some(batch)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = batch_count(self.items.len(), self.size);
        (n, Some(n))
    }
}

impl ExactSizeIterator for Batches {}

#[cfg(test)]
mod tests {
    use super::*;

    fn items(k: usize) -> Vec<Item> {
        (0..k).map(|i| Item::new(format!("img_{i:06}.jpg"))).collect()
    }

    #[test]
    fn test_zero_size_is_invalid() {
        assert!(matches!(
            batch(items(3), 0),
            Err(PipelineError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_empty_input_yields_no_batches() {
        let mut batches = batch(Vec::new(), 10).unwrap();
        assert_eq!(batches.total(), 0);
        assert!(batches.next().is_none());
    }

    #[test]
    fn test_flattened_batches_equal_input() {
        for k in [0, 1, 7, 10, 23, 100] {
            for n in [1, 3, 10, 64] {
                let input = items(k);
                let batches: Vec<Batch> = batch(input.clone(), n).unwrap().collect();

                assert_eq!(batches.len(), k.div_ceil(n), "k={k} n={n}");

                let (last, full) = match batches.split_last() {
                    Some(split) => split,
                    None => continue,
                };
                assert!(full.iter().all(|b| b.len() == n));
                assert!((1..=n).contains(&last.len()));

                let flattened: Vec<Item> = batches.into_iter().flat_map(|b| b.items).collect();
                assert_eq!(flattened, input, "k={k} n={n}");
            }
        }
    }

    #[test]
    fn test_indices_and_offsets() {
        let batches: Vec<Batch> = batch(items(25), 10).unwrap().collect();
        let bounds: Vec<_> = batches.iter().map(|b| (b.index, b.start, b.end())).collect();
        assert_eq!(bounds, vec![(0, 0, 10), (1, 10, 20), (2, 20, 25)]);
    }

    #[test]
    fn test_skip_batches_preserves_numbering() {
        let mut batches = batch(items(25), 10).unwrap();
        assert_eq!(batches.skip_batches(2), 2);

        let rest: Vec<Batch> = batches.collect();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].index, 2);
        assert_eq!(rest[0].start, 20);
        assert_eq!(rest[0].items[0], Item::new("img_000020.jpg"));
    }

    #[test]
    fn test_skip_past_end() {
        let mut batches = batch(items(5), 2).unwrap();
        assert_eq!(batches.skip_batches(10), 3);
        assert!(batches.next().is_none());
        assert_eq!(batches.total(), 3);
    }

    #[test]
    fn test_size_hint_tracks_remaining() {
        let mut batches = batch(items(5), 2).unwrap();
        assert_eq!(batches.len(), 3);
        batches.next();
        assert_eq!(batches.len(), 2);
    }
}
