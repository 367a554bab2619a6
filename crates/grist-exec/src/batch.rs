//! Page-sized tuple containers.
//!
//! A `Batch` is one page of tuples: the unit of I/O and the unit delivered
//! by an operator's `next`. A `Block` stages several batches in memory at
//! once; external sort fills one per initial run, and block nested loop
//! join stages its left-side working set this way.

use crate::tuple::Tuple;

/// A fixed-capacity container of tuples, preserving insertion order.
#[derive(Debug, Clone)]
pub struct Batch {
    tuples: Vec<Tuple>,
    capacity: usize,
}

impl Batch {
    /// Creates an empty batch with the given tuple capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            tuples: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Creates a batch from existing tuples; capacity equals the tuple
    /// count. Used when reading pages back from a spill file.
    #[must_use]
    pub fn from_tuples(tuples: Vec<Tuple>) -> Self {
        let capacity = tuples.len();
        Self { tuples, capacity }
    }

    /// Returns the declared capacity in tuples.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns the number of tuples currently in the batch.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tuples.len()
    }

    /// Returns true if the batch holds no tuples.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tuples.is_empty()
    }

    /// Returns true if the batch is at capacity.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.tuples.len() >= self.capacity
    }

    /// Appends a tuple.
    ///
    /// Callers check `is_full` first; overflowing a page is a bug in the
    /// operator, not a recoverable condition.
    pub fn push(&mut self, tuple: Tuple) {
        debug_assert!(!self.is_full(), "batch pushed past capacity");
        self.tuples.push(tuple);
    }

    /// Appends every tuple of another batch.
    pub fn extend_from(&mut self, other: Batch) {
        self.tuples.extend(other.tuples);
    }

    /// Returns the tuple at the given position.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Tuple> {
        self.tuples.get(index)
    }

    /// Returns the tuples as a slice.
    #[must_use]
    pub fn tuples(&self) -> &[Tuple] {
        &self.tuples
    }

    /// Consumes the batch and returns its tuples.
    #[must_use]
    pub fn into_tuples(self) -> Vec<Tuple> {
        self.tuples
    }

    /// Returns an iterator over the tuples.
    pub fn iter(&self) -> impl Iterator<Item = &Tuple> {
        self.tuples.iter()
    }
}

/// A group of up to `max_batches` batches held in memory simultaneously.
#[derive(Debug)]
pub struct Block {
    batches: Vec<Batch>,
    max_batches: usize,
}

impl Block {
    /// Creates an empty block holding at most `max_batches` batches.
    #[must_use]
    pub fn new(max_batches: usize) -> Self {
        Self {
            batches: Vec::with_capacity(max_batches),
            max_batches,
        }
    }

    /// Returns true if the block holds its maximum number of batches.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.batches.len() >= self.max_batches
    }

    /// Returns true if the block holds no batches.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }

    /// Adds a batch to the block.
    pub fn add_batch(&mut self, batch: Batch) {
        debug_assert!(!self.is_full(), "block filled past its batch budget");
        self.batches.push(batch);
    }

    /// Flattens the block into a single list of tuples in arrival order.
    #[must_use]
    pub fn into_tuples(self) -> Vec<Tuple> {
        self.batches
            .into_iter()
            .flat_map(Batch::into_tuples)
            .collect()
    }
}

/// Re-packs a tuple list into batches of the given capacity.
///
/// Every batch is full except possibly the last.
#[must_use]
pub fn repack(tuples: Vec<Tuple>, page_capacity: usize) -> Vec<Batch> {
    let mut batches = Vec::with_capacity(tuples.len().div_ceil(page_capacity));
    let mut current = Batch::with_capacity(page_capacity);
    for tuple in tuples {
        if current.is_full() {
            batches.push(std::mem::replace(
                &mut current,
                Batch::with_capacity(page_capacity),
            ));
        }
        current.push(tuple);
    }
    if !current.is_empty() {
        batches.push(current);
    }
    batches
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    fn tuple(v: i32) -> Tuple {
        Tuple::new(vec![Value::int(v)])
    }

    #[test]
    fn test_batch_fill() {
        let mut batch = Batch::with_capacity(2);
        assert!(batch.is_empty());
        batch.push(tuple(1));
        assert!(!batch.is_full());
        batch.push(tuple(2));
        assert!(batch.is_full());
        assert_eq!(batch.len(), 2);
    }

    #[test]
    fn test_block_flatten() {
        let mut block = Block::new(2);
        let mut a = Batch::with_capacity(2);
        a.push(tuple(1));
        a.push(tuple(2));
        let mut b = Batch::with_capacity(2);
        b.push(tuple(3));
        block.add_batch(a);
        block.add_batch(b);
        assert!(block.is_full());

        let tuples = block.into_tuples();
        assert_eq!(tuples.len(), 3);
        assert_eq!(tuples[2].value_at(0).unwrap(), &Value::int(3));
    }

    #[test]
    fn test_repack_only_last_underfull() {
        let tuples: Vec<Tuple> = (0..7).map(tuple).collect();
        let batches = repack(tuples, 3);
        assert_eq!(batches.len(), 3);
        assert_eq!(batches[0].len(), 3);
        assert_eq!(batches[1].len(), 3);
        assert_eq!(batches[2].len(), 1);
    }

    #[test]
    fn test_repack_empty() {
        assert!(repack(Vec::new(), 4).is_empty());
    }
}
