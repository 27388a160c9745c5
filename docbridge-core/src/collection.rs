//! Typed collection contexts: the bridge between the builders and a backend.
//!
//! A [`TypedCollection`] reads the fragments of an [`Accessor`], the options of a
//! [`Constraints`] or the intents of a [`MultiWriter`], hands them to its backend, and converts
//! stored documents to and from `D`. Every operation has an asynchronous form and a blocking
//! `*_blocking` form.
//!
//! # Example
//!
//! ```ignore
//! use docbridge::prelude::*;
//!
//! let users = store.typed_collection::<User>();
//! users.add(&User { id: DocumentId::create(IdKind::Object), name: "Alice".into() }).await?;
//!
//! let mut accessor = Accessor::new();
//! accessor.add_search_filter_on(User::NAME, &"Alice".to_string(), Comparison::Equals);
//! let alice = users.get(&accessor).await?;
//! ```

use std::{future::Future, marker::PhantomData};

use tracing::{debug, warn};

use crate::{
    accessor::Accessor,
    backend::StoreBackend,
    constraints::{Constraints, ReadOptions},
    document::{Document, DocumentExt},
    error::{DocumentStoreError, DocumentStoreResult},
    field::Field,
    multi_writer::{MultiWriter, WriteIntent},
    query::Fragments,
    result::DatabaseResult,
};

/// A collection of documents of type `D` on backend `B`.
///
/// Use `bson::Document` as `D` for untyped access.
///
/// The blocking forms hand the operation to [`StoreBackend::block_on`], which runs it to
/// completion before returning.
#[derive(Debug)]
pub struct TypedCollection<'a, B: StoreBackend, D: Document> {
    name: String,
    backend: &'a B,
    _marker: PhantomData<fn() -> D>,
}

impl<'a, B: StoreBackend, D: Document> TypedCollection<'a, B, D> {
    pub(crate) fn new(name: String, backend: &'a B) -> Self {
        Self { name, backend, _marker: PhantomData }
    }

    /// Returns the name of this collection.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Drops the collection.
    pub async fn remove(&self) -> DocumentStoreResult<()> {
        debug!(target: "docbridge::bridge", collection = %self.name, "remove");
        self.backend.drop_collection(&self.name).await
    }

    /// Counts every document in the collection.
    pub async fn count(&self) -> DocumentStoreResult<u64> {
        self.backend.count(&self.name).await
    }

    /// Returns the single document matching the accessor's filters, or `None`.
    ///
    /// # Errors
    ///
    /// [`DocumentStoreError::MultipleResults`] when more than one document matches.
    pub async fn get(&self, accessor: &Accessor<D>) -> DocumentStoreResult<Option<D>> {
        self.trace("get", accessor.fragments());

        let options = ReadOptions { limit: Some(2), ..ReadOptions::default() };
        let mut found = self
            .backend
            .find(accessor.fragments(), &options, &self.name)
            .await?;

        if found.len() > 1 {
            return Err(DocumentStoreError::MultipleResults(self.name.clone()));
        }

        found.pop().map(D::from_stored).transpose()
    }

    /// Returns every document matching the accessor (all documents without one), shaped by the
    /// constraints.
    ///
    /// Backend and conversion failures are logged and produce an empty list. Use
    /// [`get_all_blocking`](TypedCollection::get_all_blocking) to observe them.
    pub async fn get_all(&self, accessor: Option<&Accessor<D>>, constraints: Option<&Constraints<D>>) -> Vec<D> {
        let options = constraints
            .map(Constraints::read_options_async)
            .unwrap_or_default();

        match self.find_all(accessor, &options).await {
            Ok(documents) => documents,
            Err(err) => {
                warn!(
                    target: "docbridge::bridge",
                    collection = %self.name,
                    error = %err,
                    "get_all failed, returning no documents"
                );
                Vec::new()
            }
        }
    }

    /// Inserts a document.
    pub async fn add(&self, document: &D) -> DocumentStoreResult<()> {
        debug!(target: "docbridge::bridge", collection = %self.name, "add");
        self.backend
            .insert_one(document.to_stored()?, &self.name)
            .await
    }

    /// Replaces the first document matching the accessor's filters.
    pub async fn replace(&self, document: &D, accessor: &Accessor<D>) -> DocumentStoreResult<DatabaseResult> {
        self.trace("replace", accessor.fragments());
        self.backend
            .replace_one(accessor.fragments(), document.to_stored()?, &self.name)
            .await
    }

    /// Applies the accessor's updates to the first matching document, inserting one when nothing
    /// matches.
    ///
    /// # Errors
    ///
    /// [`DocumentStoreError::InvalidAccessor`] when the accessor holds no updates.
    pub async fn update(&self, accessor: &Accessor<D>) -> DocumentStoreResult<DatabaseResult> {
        self.trace("update", accessor.fragments());
        ensure_updates(accessor.fragments())?;

        self.backend
            .update_one(accessor.fragments(), &self.name)
            .await
    }

    /// Like [`update`](TypedCollection::update), returning the document as it was before the
    /// update, or `None` when the update inserted it.
    pub async fn update_and_return(&self, accessor: &Accessor<D>) -> DocumentStoreResult<Option<D>> {
        self.trace("update_and_return", accessor.fragments());
        ensure_updates(accessor.fragments())?;

        self.backend
            .find_one_and_update(accessor.fragments(), &self.name)
            .await?
            .map(D::from_stored)
            .transpose()
    }

    /// Deletes the first document matching the accessor's filters.
    pub async fn delete(&self, accessor: &Accessor<D>) -> DocumentStoreResult<DatabaseResult> {
        self.trace("delete", accessor.fragments());
        self.backend
            .delete_one(accessor.fragments(), &self.name)
            .await
    }

    /// Executes the writer's intents as one batch.
    ///
    /// An empty writer succeeds without reaching the backend.
    pub async fn multi_write(&self, writer: MultiWriter<D>) -> DocumentStoreResult<DatabaseResult> {
        debug!(
            target: "docbridge::bridge",
            collection = %self.name,
            intents = writer.len(),
            "multi_write"
        );
        if writer.is_empty() {
            return Ok(DatabaseResult::acknowledged(0));
        }

        let intents = writer
            .into_intents()
            .into_iter()
            .map(|intent| {
                if let WriteIntent::Update { fragments } = &intent {
                    ensure_updates(fragments)?;
                }
                intent.try_map(|document| document.to_stored())
            })
            .collect::<DocumentStoreResult<Vec<_>>>()?;

        self.backend.bulk_write(intents, &self.name).await
    }

    /// Creates an ascending index on `field` and returns its name.
    pub async fn add_index(&self, field: &str) -> DocumentStoreResult<String> {
        debug!(target: "docbridge::bridge", collection = %self.name, field, "add_index");
        self.backend.create_index(field, &self.name).await
    }

    pub async fn add_index_on<V>(&self, field: Field<D, V>) -> DocumentStoreResult<String> {
        self.add_index(field.path()).await
    }

    pub fn remove_blocking(&self) -> DocumentStoreResult<()> {
        self.blocking(self.remove())
    }

    pub fn count_blocking(&self) -> DocumentStoreResult<u64> {
        self.blocking(self.count())
    }

    pub fn get_blocking(&self, accessor: &Accessor<D>) -> DocumentStoreResult<Option<D>> {
        self.blocking(self.get(accessor))
    }

    /// Blocking form of [`get_all`](TypedCollection::get_all). Failures are returned, not
    /// swallowed.
    pub fn get_all_blocking(
        &self,
        accessor: Option<&Accessor<D>>,
        constraints: Option<&Constraints<D>>,
    ) -> DocumentStoreResult<Vec<D>> {
        let options = constraints
            .map(|constraints| constraints.read_options().clone())
            .unwrap_or_default();

        self.blocking(self.find_all(accessor, &options))
    }

    pub fn add_blocking(&self, document: &D) -> DocumentStoreResult<()> {
        self.blocking(self.add(document))
    }

    pub fn replace_blocking(&self, document: &D, accessor: &Accessor<D>) -> DocumentStoreResult<DatabaseResult> {
        self.blocking(self.replace(document, accessor))
    }

    pub fn update_blocking(&self, accessor: &Accessor<D>) -> DocumentStoreResult<DatabaseResult> {
        self.blocking(self.update(accessor))
    }

    pub fn update_and_return_blocking(&self, accessor: &Accessor<D>) -> DocumentStoreResult<Option<D>> {
        self.blocking(self.update_and_return(accessor))
    }

    pub fn delete_blocking(&self, accessor: &Accessor<D>) -> DocumentStoreResult<DatabaseResult> {
        self.blocking(self.delete(accessor))
    }

    pub fn multi_write_blocking(&self, writer: MultiWriter<D>) -> DocumentStoreResult<DatabaseResult> {
        self.blocking(self.multi_write(writer))
    }

    pub fn add_index_blocking(&self, field: &str) -> DocumentStoreResult<String> {
        self.blocking(self.add_index(field))
    }

    fn blocking<T>(&self, operation: impl Future<Output = DocumentStoreResult<T>>) -> DocumentStoreResult<T> {
        let mut output = None;
        self.backend.block_on(Box::pin(async {
            output = Some(operation.await);
        }));

        output.unwrap_or_else(|| {
            Err(DocumentStoreError::Backend(format!(
                "the backend of collection {} cannot block the current thread",
                self.name
            )))
        })
    }

    async fn find_all(&self, accessor: Option<&Accessor<D>>, options: &ReadOptions) -> DocumentStoreResult<Vec<D>> {
        let empty = Fragments::default();
        let filter = accessor.map_or(&empty, Accessor::fragments);
        self.trace("get_all", filter);

        self.backend
            .find(filter, options, &self.name)
            .await?
            .into_iter()
            .map(D::from_stored)
            .collect()
    }

    fn trace(&self, operation: &'static str, fragments: &Fragments) {
        debug!(
            target: "docbridge::bridge",
            collection = %self.name,
            operation,
            filters = fragments.filters().len(),
            updates = fragments.updates().len(),
            array_filters = fragments.array_filters().len(),
            "compiling"
        );
    }
}

fn ensure_updates(fragments: &Fragments) -> DocumentStoreResult<()> {
    if fragments.updates().is_empty() {
        return Err(DocumentStoreError::InvalidAccessor(
            "the accessor does not define any update operation".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use bson::{Document, doc};
    use futures::future::LocalBoxFuture;
    use parking_lot::Mutex;

    use super::*;
    use crate::{query::Comparison, store::DocumentStore};

    #[derive(Debug, Default)]
    struct ScriptedBackend {
        found: Vec<Document>,
        fail_reads: bool,
        refuse_blocking: bool,
        bulk_calls: Mutex<usize>,
    }

    #[async_trait]
    impl StoreBackend for ScriptedBackend {
        async fn find(&self, _: &Fragments, options: &ReadOptions, _: &str) -> DocumentStoreResult<Vec<Document>> {
            if self.fail_reads {
                return Err(DocumentStoreError::Backend("unreachable".into()));
            }
            let limit = options.limit.map_or(usize::MAX, |limit| limit.unsigned_abs() as usize);
            Ok(self.found.iter().take(limit).cloned().collect())
        }

        async fn count(&self, _: &str) -> DocumentStoreResult<u64> {
            Ok(self.found.len() as u64)
        }

        async fn insert_one(&self, _: Document, _: &str) -> DocumentStoreResult<()> {
            Ok(())
        }

        async fn replace_one(&self, _: &Fragments, _: Document, _: &str) -> DocumentStoreResult<DatabaseResult> {
            Ok(DatabaseResult::acknowledged(1))
        }

        async fn update_one(&self, _: &Fragments, _: &str) -> DocumentStoreResult<DatabaseResult> {
            Ok(DatabaseResult::acknowledged(1))
        }

        async fn find_one_and_update(&self, _: &Fragments, _: &str) -> DocumentStoreResult<Option<Document>> {
            Ok(self.found.first().cloned())
        }

        async fn delete_one(&self, _: &Fragments, _: &str) -> DocumentStoreResult<DatabaseResult> {
            Ok(DatabaseResult::acknowledged(1))
        }

        async fn bulk_write(&self, intents: Vec<WriteIntent<Document>>, _: &str) -> DocumentStoreResult<DatabaseResult> {
            *self.bulk_calls.lock() += 1;
            Ok(DatabaseResult::acknowledged(intents.len() as u64))
        }

        async fn create_index(&self, field: &str, _: &str) -> DocumentStoreResult<String> {
            Ok(format!("{field}_1"))
        }

        async fn drop_collection(&self, _: &str) -> DocumentStoreResult<()> {
            Ok(())
        }

        fn block_on(&self, future: LocalBoxFuture<'_, ()>) {
            if !self.refuse_blocking {
                futures::executor::block_on(future);
            }
        }
    }

    fn backend_with(found: Vec<Document>) -> ScriptedBackend {
        ScriptedBackend { found, ..ScriptedBackend::default() }
    }

    #[tokio::test]
    async fn get_fails_on_more_than_one_match() {
        let store = DocumentStore::new(backend_with(vec![doc! { "n": 1 }, doc! { "n": 2 }]));
        let things = store.collection::<Document>("Things");

        let err = things.get(&Accessor::new()).await.unwrap_err();

        assert!(matches!(err, DocumentStoreError::MultipleResults(name) if name == "things"));
    }

    #[tokio::test]
    async fn get_returns_the_single_match() {
        let store = DocumentStore::new(backend_with(vec![doc! { "n": 1 }]));
        let things = store.collection::<Document>("things");

        assert_eq!(things.get(&Accessor::new()).await.unwrap(), Some(doc! { "n": 1 }));
    }

    #[tokio::test]
    async fn async_get_all_swallows_backend_failures() {
        let store = DocumentStore::new(ScriptedBackend { fail_reads: true, ..ScriptedBackend::default() });
        let things = store.collection::<Document>("things");

        assert!(things.get_all(None, None).await.is_empty());
    }

    #[test]
    fn blocking_get_all_propagates_backend_failures() {
        let store = DocumentStore::new(ScriptedBackend { fail_reads: true, ..ScriptedBackend::default() });
        let things = store.collection::<Document>("things");

        assert!(matches!(
            things.get_all_blocking(None, None),
            Err(DocumentStoreError::Backend(_))
        ));
    }

    #[test]
    fn blocking_forms_run_through_the_backend() {
        let store = DocumentStore::new(backend_with(vec![doc! { "n": 1 }]));
        let things = store.collection::<Document>("things");

        assert_eq!(things.count_blocking().unwrap(), 1);
        assert_eq!(things.add_index_blocking("n").unwrap(), "n_1");
    }

    #[test]
    fn blocking_forms_fail_when_the_backend_cannot_block() {
        let store = DocumentStore::new(ScriptedBackend { refuse_blocking: true, ..backend_with(vec![doc! { "n": 1 }]) });
        let things = store.collection::<Document>("things");

        assert!(matches!(things.count_blocking(), Err(DocumentStoreError::Backend(_))));
        assert!(matches!(things.get_blocking(&Accessor::new()), Err(DocumentStoreError::Backend(_))));
    }

    #[tokio::test]
    async fn update_without_updates_is_rejected() {
        let store = DocumentStore::new(ScriptedBackend::default());
        let things = store.collection::<Document>("things");
        let mut accessor = Accessor::new();
        accessor.add_search_filter("n", 1, Comparison::Equals);

        assert!(matches!(
            things.update(&accessor).await,
            Err(DocumentStoreError::InvalidAccessor(_))
        ));
        assert!(matches!(
            things.update_and_return(&accessor).await,
            Err(DocumentStoreError::InvalidAccessor(_))
        ));
    }

    #[tokio::test]
    async fn empty_batch_never_reaches_the_backend() {
        let store = DocumentStore::new(ScriptedBackend::default());
        let things = store.collection::<Document>("things");

        let result = things.multi_write(MultiWriter::new()).await.unwrap();

        assert_eq!(result, DatabaseResult::acknowledged(0));
        assert_eq!(*store.backend().bulk_calls.lock(), 0);
    }

    #[tokio::test]
    async fn batch_update_intents_need_updates() {
        let store = DocumentStore::new(ScriptedBackend::default());
        let things = store.collection::<Document>("things");
        let mut writer = MultiWriter::new();
        writer.create(doc! { "n": 1 }).update(&Accessor::new());

        assert!(things.multi_write(writer).await.is_err());
        assert_eq!(*store.backend().bulk_calls.lock(), 0);
    }
}
