//! Batch results with partial failure.

use crate::error::Errors;

/// Outcome of a batch operation.
///
/// `items` holds every input item in input order, each with its status
/// advanced to reflect its own outcome. `errors` holds one entry per failed
/// item, also in input order.
#[derive(Debug)]
pub struct Batch<T> {
    /// Processed items.
    pub items: Vec<T>,
    /// Per-item failures.
    pub errors: Errors,
}

impl<T> Batch<T> {
    /// Create a batch from its parts.
    #[must_use]
    pub fn new(items: Vec<T>, errors: Errors) -> Self {
        Self { items, errors }
    }

    /// Whether every item succeeded.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    /// Number of items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the batch holds no items.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Split into items and errors.
    #[must_use]
    pub fn into_parts(self) -> (Vec<T>, Errors) {
        (self.items, self.errors)
    }

    /// All-or-nothing view of the batch.
    ///
    /// # Errors
    ///
    /// Returns the collected errors if any item failed.
    pub fn into_result(self) -> Result<Vec<T>, Errors> {
        if self.errors.is_empty() {
            Ok(self.items)
        } else {
            Err(self.errors)
        }
    }

    /// Append another batch's items and errors to this one.
    pub fn merge(&mut self, other: Batch<T>) {
        self.items.extend(other.items);
        self.errors.extend(other.errors);
    }
}

impl<T> Default for Batch<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            errors: Errors::new(),
        }
    }
}

impl<T> FromIterator<Batch<T>> for Batch<T> {
    fn from_iter<I: IntoIterator<Item = Batch<T>>>(iter: I) -> Self {
        let mut merged = Self::default();
        for batch in iter {
            merged.merge(batch);
        }
        merged
    }
}
