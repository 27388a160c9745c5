//! Batched heterogeneous writes.

use std::fmt;

use crate::{accessor::Accessor, query::Fragments};

/// One write of a batch. `D` is the document type carried by replacements and inserts.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteIntent<D> {
    /// Deletes the first document matching the filter.
    Delete { filter: Fragments },
    /// Replaces the first document matching the filter.
    Replace { filter: Fragments, document: D },
    /// Applies the update and array-filter fragments to the first matching document.
    Update { fragments: Fragments },
    Create { document: D },
}

impl<D> WriteIntent<D> {
    /// Converts the carried document, keeping the filter fragments.
    pub fn try_map<E, Err, F>(self, f: F) -> Result<WriteIntent<E>, Err>
    where
        F: FnOnce(D) -> Result<E, Err>,
    {
        Ok(match self {
            WriteIntent::Delete { filter } => WriteIntent::Delete { filter },
            WriteIntent::Replace { filter, document } => WriteIntent::Replace { filter, document: f(document)? },
            WriteIntent::Update { fragments } => WriteIntent::Update { fragments },
            WriteIntent::Create { document } => WriteIntent::Create { document: f(document)? },
        })
    }

    pub fn kind(&self) -> &'static str {
        match self {
            WriteIntent::Delete { .. } => "delete",
            WriteIntent::Replace { .. } => "replace",
            WriteIntent::Update { .. } => "update",
            WriteIntent::Create { .. } => "create",
        }
    }
}

/// An ordered batch of write intents, executed as one backend call.
///
/// Intents run in the order they were added. Only [`clear`](MultiWriter::clear) removes them.
///
/// # Example
///
/// ```ignore
/// let mut writer = MultiWriter::new();
/// writer
///     .create(new_order)
///     .update(&mark_shipped)
///     .delete(&by_stale_id);
///
/// let result = orders.multi_write(writer).await?;
/// ```
pub struct MultiWriter<T> {
    intents: Vec<WriteIntent<T>>,
}

impl<T> MultiWriter<T> {
    pub fn new() -> Self {
        Self { intents: Vec::new() }
    }

    pub fn delete(&mut self, accessor: &Accessor<T>) -> &mut Self {
        self.intents.push(WriteIntent::Delete { filter: accessor.fragments().clone() });
        self
    }

    pub fn replace(&mut self, accessor: &Accessor<T>, document: T) -> &mut Self {
        self.intents.push(WriteIntent::Replace {
            filter: accessor.fragments().clone(),
            document,
        });
        self
    }

    pub fn update(&mut self, accessor: &Accessor<T>) -> &mut Self {
        self.intents.push(WriteIntent::Update { fragments: accessor.fragments().clone() });
        self
    }

    pub fn create(&mut self, document: T) -> &mut Self {
        self.intents.push(WriteIntent::Create { document });
        self
    }

    pub fn clear(&mut self) {
        self.intents.clear();
    }

    pub fn len(&self) -> usize {
        self.intents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.intents.is_empty()
    }

    pub fn intents(&self) -> &[WriteIntent<T>] {
        &self.intents
    }

    pub fn into_intents(self) -> Vec<WriteIntent<T>> {
        self.intents
    }
}

impl<T> Default for MultiWriter<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: fmt::Debug> fmt::Debug for MultiWriter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(&self.intents).finish()
    }
}

#[cfg(test)]
mod tests {
    use bson::{Document, doc};

    use super::*;
    use crate::{query::Comparison, query::UpdateOperator};

    #[test]
    fn intents_keep_insertion_order() {
        let mut filter = Accessor::<Document>::new();
        filter.add_search_filter("n", 1, Comparison::Equals);
        let mut update = filter.clone();
        update.add_operation("done", true, UpdateOperator::AddOrOverwrite);

        let mut writer = MultiWriter::new();
        writer
            .create(doc! { "n": 1 })
            .update(&update)
            .replace(&filter, doc! { "n": 2 })
            .delete(&filter);

        let kinds: Vec<_> = writer.intents().iter().map(WriteIntent::kind).collect();
        assert_eq!(kinds, ["create", "update", "replace", "delete"]);
        assert!(matches!(
            &writer.intents()[1],
            WriteIntent::Update { fragments } if fragments.updates().len() == 1
        ));
    }

    #[test]
    fn clear_empties_the_batch() {
        let mut writer = MultiWriter::new();
        writer.create(doc! {}).create(doc! {});

        writer.clear();

        assert!(writer.is_empty());
    }

    #[test]
    fn intents_are_snapshots_of_the_accessor() {
        let mut accessor = Accessor::<Document>::new();
        accessor.add_search_filter("n", 1, Comparison::Equals);

        let mut writer = MultiWriter::<Document>::new();
        writer.delete(&accessor);
        accessor.reset();

        let WriteIntent::Delete { filter } = &writer.intents()[0] else {
            panic!("expected a delete intent");
        };
        assert_eq!(filter.filters().len(), 1);
    }
}
