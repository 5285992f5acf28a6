/// Rows kept by the recent-history tables.
pub const DEFAULT_CAPACITY: usize = 10;

/// The `capacity` most recently arrived records, newest first.
///
/// Ordering follows arrival (position in `records`), never record content.
pub fn recent<T: Clone>(records: &[T], capacity: usize) -> Vec<T> {
    records.iter().rev().take(capacity).cloned().collect()
}

/// Cached view over a growing record set, recomputed in full on every update.
#[derive(Clone, Debug)]
pub struct BoundedHistory<T> {
    capacity: usize,
    items: Vec<T>,
}

impl<T: Clone> BoundedHistory<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            items: Vec::with_capacity(capacity),
        }
    }

    pub fn update(&mut self, records: &[T]) -> &[T] {
        self.items = recent(records, self.capacity);
        &self.items
    }

    pub fn items(&self) -> &[T] {
        &self.items
    }

    pub fn newest(&self) -> Option<&T> {
        self.items.first()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl<T: Clone> Default for BoundedHistory<T> {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
