use std::ops::Add;

/// Fixed-capacity circular sample store.
///
/// Slots that have not been written yet read as `T::default()`, so `sum` and
/// `sorted_descending` only become meaningful after one full window of pushes.
#[derive(Debug, Clone)]
pub struct RingBuffer<T> {
    values: Vec<T>,
    index: usize,
}

impl<T> RingBuffer<T>
where
    T: Copy + Default + PartialOrd + Add<Output = T>,
{
    /// Create a zero-filled buffer.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "RingBuffer capacity must be > 0");
        Self {
            values: vec![T::default(); capacity],
            index: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.values.len()
    }

    /// Slot that the next `push` will overwrite.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Overwrite the oldest slot and advance the cursor.
    pub fn push(&mut self, value: T) {
        self.values[self.index] = value;
        self.index = (self.index + 1) % self.values.len();
    }

    /// Sum over every slot, zero-filled ones included.
    pub fn sum(&self) -> T {
        self.values.iter().fold(T::default(), |acc, &v| acc + v)
    }

    /// Full copy of the buffer, largest value first.
    pub fn sorted_descending(&self) -> Vec<T> {
        let mut sorted = self.values.clone();
        sorted.sort_by(|a, b| b.partial_cmp(a).unwrap_or(std::cmp::Ordering::Equal));
        sorted
    }

    /// Values in arrival order, oldest first.
    #[cfg(test)]
    pub(crate) fn iter_chronological(&self) -> impl Iterator<Item = &T> {
        let (newer, older) = self.values.split_at(self.index);
        older.iter().chain(newer.iter())
    }
}
