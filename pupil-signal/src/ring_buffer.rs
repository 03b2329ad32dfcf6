//! Fixed-capacity history ring for per-frame signal values
//!
//! Provides a circular buffer of pre-allocated slots that is reused without
//! allocating on each frame. When full, pushing overwrites the oldest entry.
//! Supports reallocation when the configured window changes, keeping the
//! newest entries.

/// Ring buffer holding the most recent `capacity` values in time order
///
/// Storage is a single arena allocated up front. `head` points at the oldest
/// entry and `len` counts valid entries, so the newest entry lives at
/// `(head + len - 1) % capacity`.
#[derive(Debug, Clone)]
pub struct HistoryRing<T> {
    /// Pre-allocated slots
    slots: Vec<T>,
    /// Index of the oldest valid entry
    head: usize,
    /// Number of valid entries
    len: usize,
}

impl<T: Copy + Default> HistoryRing<T> {
    /// Create a new ring with pre-allocated slots
    ///
    /// # Arguments
    /// * `capacity` - Maximum number of entries kept
    ///
    /// # Panics
    /// Panics if capacity is 0
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "History ring capacity must be greater than 0");

        Self {
            slots: vec![T::default(); capacity],
            head: 0,
            len: 0,
        }
    }

    /// Append a value, evicting the oldest entry when the ring is full
    ///
    /// # Returns
    /// The evicted value, if any
    pub fn push(&mut self, value: T) -> Option<T> {
        let capacity = self.capacity();

        if self.len < capacity {
            let idx = (self.head + self.len) % capacity;
            self.slots[idx] = value;
            self.len += 1;
            None
        } else {
            let evicted = self.slots[self.head];
            self.slots[self.head] = value;
            self.head = (self.head + 1) % capacity;
            Some(evicted)
        }
    }

    /// Get the entry at logical position `idx` (0 = oldest)
    pub fn get(&self, idx: usize) -> Option<T> {
        if idx >= self.len {
            return None;
        }
        Some(self.slots[(self.head + idx) % self.capacity()])
    }

    /// Get the `back`-th newest entry (0 = newest)
    pub fn from_newest(&self, back: usize) -> Option<T> {
        if back >= self.len {
            return None;
        }
        self.get(self.len - 1 - back)
    }

    /// Most recently pushed entry
    pub fn newest(&self) -> Option<T> {
        self.from_newest(0)
    }

    /// Iterate entries from oldest to newest
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = T> + ExactSizeIterator + '_ {
        (0..self.len).map(move |i| self.slots[(self.head + i) % self.slots.len()])
    }

    /// Copy the newest `count` entries (oldest first) into `out`
    ///
    /// Copies fewer entries if the ring holds less than `count`.
    pub fn copy_newest_into(&self, count: usize, out: &mut Vec<T>) {
        out.clear();
        let take = count.min(self.len);
        out.extend(self.iter().skip(self.len - take));
    }

    /// Copy all entries (oldest first) into a new vector
    pub fn to_vec(&self) -> Vec<T> {
        self.iter().collect()
    }

    /// Reallocate to a new capacity, keeping the newest entries that fit
    pub fn resize(&mut self, capacity: usize) {
        assert!(capacity > 0, "History ring capacity must be greater than 0");
        if capacity == self.capacity() {
            return;
        }

        let keep = self.len.min(capacity);
        let mut slots = vec![T::default(); capacity];
        for (slot, value) in slots.iter_mut().zip(self.iter().skip(self.len - keep)) {
            *slot = value;
        }

        self.slots = slots;
        self.head = 0;
        self.len = keep;
    }

    /// Drop all entries without releasing the storage
    pub fn clear(&mut self) {
        self.head = 0;
        self.len = 0;
    }

    /// Number of valid entries
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the ring holds no entries
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Whether the next push will evict an entry
    pub fn is_full(&self) -> bool {
        self.len == self.capacity()
    }

    /// Maximum number of entries kept
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }
}
