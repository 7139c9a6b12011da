//! Input items and the batches they are grouped into.

use std::path::{Path, PathBuf};

/// One file to embed. Its path is both the encoder input and the stored location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    path: PathBuf,
}

impl Item {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Location string persisted next to the vector.
    pub fn location(&self) -> String {
        self.path.to_string_lossy().into_owned()
    }
}

/// A contiguous run of items taken from the enumeration.
#[derive(Debug, PartialEq, Eq)]
pub struct Batch {
    /// Zero-based position of this batch in the run.
    pub index: usize,
    /// Offset of the first item in the full enumeration.
    pub start: usize,
    pub items: Vec<Item>,
}

impl Batch {
    /// Offset one past the last item.
    pub fn end(&self) -> usize {
        self.start + self.items.len()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_location() {
        let item = Item::new("/data/unlabeled2017/000000000001.jpg");
        assert_eq!(item.location(), "/data/unlabeled2017/000000000001.jpg");
    }

    #[test]
    fn test_batch_end() {
        let batch = Batch {
            index: 2,
            start: 2000,
            items: vec![Item::new("a"), Item::new("b")],
        };
        assert_eq!(batch.end(), 2002);
        assert_eq!(batch.len(), 2);
    }
}
