//! Memoized values that are built lazily and thrown away when their inputs change.
//!
//! Descriptor tables, push uniform blobs and viewport descriptors are all built on the first draw or
//! dispatch that needs them and reused until a bind or push invalidates them. [`Cached`] is the one
//! place that pattern lives, so every invalidation site goes through [`Cached::invalidate`].

/// A lazily built value. Empty means "must be rebuilt before the next use".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cached<T> {
    value: Option<T>,
}

impl<T> Default for Cached<T> {
    fn default() -> Self {
        Self {
            value: None,
        }
    }
}

impl<T: Copy> Cached<T> {
    /// Get the cached value, if it was built since the last invalidation.
    pub fn get(&self) -> Option<T> {
        self.value
    }

    /// Store a freshly built value.
    pub fn insert(&mut self, value: T) -> T {
        self.value = Some(value);
        value
    }

    /// Return the cached value, or build it. A failed build leaves the cache empty so the next
    /// call tries again from scratch.
    pub fn get_or_try_insert_with<E>(&mut self, build: impl FnOnce() -> Result<T, E>) -> Result<T, E> {
        if let Some(value) = self.value {
            return Ok(value);
        }
        let value = build()?;
        Ok(self.insert(value))
    }

    /// Drop the cached value.
    pub fn invalidate(&mut self) {
        self.value = None;
    }

    /// Whether a value is currently cached.
    pub fn is_valid(&self) -> bool {
        self.value.is_some()
    }
}
