//! Sort, skip, limit and projection for reads.
//!
//! [`Constraints`] keeps two materialized [`ReadOptions`] caches: one for blocking reads, updated
//! eagerly, and one for asynchronous reads whose sort clause is rebuilt from the sorter list on
//! the next read after a [`sort`](Constraints::sort) call. Both always describe the same options
//! when read.

use std::{
    fmt,
    marker::PhantomData,
    sync::atomic::{AtomicBool, Ordering},
};

use bson::{Document, doc};
use parking_lot::Mutex;

use crate::{field::Field, query::SortDirection};

/// Backend-neutral read options compiled from [`Constraints`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReadOptions {
    /// Sort document, `{ field: 1 | -1, .. }` in sorter order.
    pub sort: Option<Document>,
    pub skip: Option<u64>,
    /// A negative limit is passed through untouched.
    pub limit: Option<i64>,
    /// Projection document, `{ field: 1, _id: 0 }`.
    pub projection: Option<Document>,
}

/// Accumulates read constraints for documents of type `T`.
pub struct Constraints<T = Document> {
    sorters: Vec<(String, SortDirection)>,
    options: ReadOptions,
    async_options: Mutex<ReadOptions>,
    sort_dirty: AtomicBool,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Constraints<T> {
    pub fn new() -> Self {
        Self {
            sorters: Vec::new(),
            options: ReadOptions::default(),
            async_options: Mutex::new(ReadOptions::default()),
            sort_dirty: AtomicBool::new(false),
            _marker: PhantomData,
        }
    }

    /// Clears the sorters and both option caches.
    pub fn reset(&mut self) {
        self.sorters.clear();
        self.options = ReadOptions::default();
        *self.async_options.get_mut() = ReadOptions::default();
        self.sort_dirty.store(false, Ordering::Release);
    }

    /// Appends a sort key. Earlier keys take precedence.
    pub fn sort(&mut self, field: &str, direction: SortDirection) -> &mut Self {
        self.sorters.push((field.to_string(), direction));
        self.options.sort = Some(self.sort_document());
        self.sort_dirty.store(true, Ordering::Release);
        self
    }

    pub fn sort_on<V>(&mut self, field: Field<T, V>, direction: SortDirection) -> &mut Self {
        self.sort(field.path(), direction)
    }

    pub fn skip(&mut self, count: u64) -> &mut Self {
        self.options.skip = Some(count);
        self.async_options.get_mut().skip = Some(count);
        self
    }

    pub fn limit(&mut self, count: i64) -> &mut Self {
        self.options.limit = Some(count);
        self.async_options.get_mut().limit = Some(count);
        self
    }

    /// Projects reads onto `field` alone, excluding `_id`. Replaces any earlier projection.
    pub fn include(&mut self, field: &str) -> &mut Self {
        let projection = doc! { field: 1, "_id": 0 };
        self.options.projection = Some(projection.clone());
        self.async_options.get_mut().projection = Some(projection);
        self
    }

    pub fn include_on<V>(&mut self, field: Field<T, V>) -> &mut Self {
        self.include(field.path())
    }

    pub fn sorters(&self) -> &[(String, SortDirection)] {
        &self.sorters
    }

    /// Options for blocking reads.
    pub fn read_options(&self) -> &ReadOptions {
        &self.options
    }

    /// Options for asynchronous reads, rebuilding the sort clause if a sorter was added since the
    /// last call.
    pub fn read_options_async(&self) -> ReadOptions {
        let mut options = self.async_options.lock();
        if self.sort_dirty.swap(false, Ordering::AcqRel) {
            options.sort = Some(self.sort_document());
        }

        options.clone()
    }

    fn sort_document(&self) -> Document {
        let mut sort = Document::new();
        for (field, direction) in &self.sorters {
            sort.insert(field.clone(), direction.as_i32());
        }
        sort
    }
}

impl<T> Default for Constraints<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for Constraints<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Constraints")
            .field("sorters", &self.sorters)
            .field("options", &self.options)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn both_caches_agree_after_sorting() {
        let mut constraints = Constraints::<Document>::new();
        constraints
            .sort("age", SortDirection::Descending)
            .skip(2)
            .limit(5);

        assert_eq!(&constraints.read_options_async(), constraints.read_options());

        constraints.sort("name", SortDirection::Ascending);
        let options = constraints.read_options_async();
        assert_eq!(&options, constraints.read_options());
        assert_eq!(options.sort, Some(doc! { "age": -1, "name": 1 }));
    }

    #[test]
    fn include_replaces_the_projection() {
        let mut constraints = Constraints::<Document>::new();
        constraints.include("name").include("email");

        let expected = Some(doc! { "email": 1, "_id": 0 });
        assert_eq!(constraints.read_options().projection, expected);
        assert_eq!(constraints.read_options_async().projection, expected);
    }

    #[test]
    fn negative_limit_is_kept() {
        let mut constraints = Constraints::<Document>::new();
        constraints.limit(-3);

        assert_eq!(constraints.read_options().limit, Some(-3));
    }

    #[test]
    fn reset_clears_both_caches() {
        let mut constraints = Constraints::<Document>::new();
        constraints.sort("a", SortDirection::Ascending).limit(1).include("a");

        constraints.reset();

        assert!(constraints.sorters().is_empty());
        assert_eq!(constraints.read_options(), &ReadOptions::default());
        assert_eq!(constraints.read_options_async(), ReadOptions::default());
    }
}
