//! Storage backend abstraction for the document store.
//!
//! A [`StoreBackend`] receives the fragments an [`Accessor`](crate::accessor::Accessor)
//! accumulated and the [`ReadOptions`] a [`Constraints`](crate::constraints::Constraints)
//! compiled, translates them into its native query and update representation, and executes them.
//! Documents cross this boundary in their stored BSON form; typed conversion happens in the
//! collection layer above.
//!
//! # Traits
//!
//! - [`StoreBackend`]: the capability interface every backend implements
//! - [`StoreBackendBuilder`]: factory trait for creating backend instances
//!
//! # Examples
//!
//! ```ignore
//! use docbridge::backend::StoreBackend;
//! use docbridge::accessor::Accessor;
//!
//! let mut accessor = Accessor::<bson::Document>::new();
//! accessor.add_search_filter("name", "Alice", Comparison::Equals);
//!
//! let found = backend
//!     .find(accessor.fragments(), &ReadOptions::default(), "users")
//!     .await?;
//! ```

use std::fmt::Debug;

use async_trait::async_trait;
use bson::Document;
use futures::future::LocalBoxFuture;

use crate::{
    constraints::ReadOptions,
    error::DocumentStoreResult,
    multi_writer::WriteIntent,
    query::Fragments,
    result::DatabaseResult,
};

/// Abstract interface for document storage backends.
///
/// Every operation addresses one collection by name. Collections are created lazily by the
/// first write. Filters are the AND-combination of the given filter fragments; an empty filter
/// matches every document.
///
/// # Thread Safety
///
/// Implementations must be thread-safe. Independent calls may run concurrently; no lock may be
/// held across an `.await` of the underlying engine.
#[async_trait]
pub trait StoreBackend: Send + Sync + Debug {
    /// Returns the documents matching `filter`, shaped by `options`, in backend order.
    async fn find(
        &self,
        filter: &Fragments,
        options: &ReadOptions,
        collection: &str,
    ) -> DocumentStoreResult<Vec<Document>>;

    /// Counts every document in the collection.
    async fn count(&self, collection: &str) -> DocumentStoreResult<u64>;

    async fn insert_one(&self, document: Document, collection: &str) -> DocumentStoreResult<()>;

    /// Replaces the first document matching `filter`. Never inserts.
    async fn replace_one(
        &self,
        filter: &Fragments,
        document: Document,
        collection: &str,
    ) -> DocumentStoreResult<DatabaseResult>;

    /// Applies the update fragments to the first document matching the filter fragments,
    /// inserting a new document when nothing matches.
    ///
    /// Array-filter fragments bind the positional placeholders of the update paths.
    async fn update_one(&self, fragments: &Fragments, collection: &str) -> DocumentStoreResult<DatabaseResult>;

    /// Like [`update_one`](StoreBackend::update_one), returning the matched document as it was
    /// before the update, or `None` when the update inserted a new document.
    async fn find_one_and_update(
        &self,
        fragments: &Fragments,
        collection: &str,
    ) -> DocumentStoreResult<Option<Document>>;

    /// Deletes the first document matching `filter`.
    async fn delete_one(&self, filter: &Fragments, collection: &str) -> DocumentStoreResult<DatabaseResult>;

    /// Executes the intents in order as one batch. The affected count is the number of modified
    /// plus deleted documents.
    async fn bulk_write(
        &self,
        intents: Vec<WriteIntent<Document>>,
        collection: &str,
    ) -> DocumentStoreResult<DatabaseResult>;

    /// Creates an ascending index on `field` and returns its name.
    async fn create_index(&self, field: &str, collection: &str) -> DocumentStoreResult<String>;

    async fn drop_collection(&self, collection: &str) -> DocumentStoreResult<()>;

    /// Releases connections and other resources.
    async fn shutdown(&self) -> DocumentStoreResult<()> {
        Ok(())
    }

    /// Drives `future` to completion on the calling thread for the `*_blocking` collection forms.
    ///
    /// The default polls it with a thread-local executor, which suits backends that need no
    /// reactor. A backend bound to an async runtime runs it there instead. A backend that cannot
    /// block on the current thread returns without polling; the blocking call then fails with a
    /// backend error.
    fn block_on(&self, future: LocalBoxFuture<'_, ()>) {
        futures::executor::block_on(future)
    }
}

#[async_trait]
impl<B> StoreBackend for &B
where
    B: StoreBackend + ?Sized,
{
    async fn find(
        &self,
        filter: &Fragments,
        options: &ReadOptions,
        collection: &str,
    ) -> DocumentStoreResult<Vec<Document>> {
        (**self).find(filter, options, collection).await
    }

    async fn count(&self, collection: &str) -> DocumentStoreResult<u64> {
        (**self).count(collection).await
    }

    async fn insert_one(&self, document: Document, collection: &str) -> DocumentStoreResult<()> {
        (**self).insert_one(document, collection).await
    }

    async fn replace_one(
        &self,
        filter: &Fragments,
        document: Document,
        collection: &str,
    ) -> DocumentStoreResult<DatabaseResult> {
        (**self)
            .replace_one(filter, document, collection)
            .await
    }

    async fn update_one(&self, fragments: &Fragments, collection: &str) -> DocumentStoreResult<DatabaseResult> {
        (**self).update_one(fragments, collection).await
    }

    async fn find_one_and_update(
        &self,
        fragments: &Fragments,
        collection: &str,
    ) -> DocumentStoreResult<Option<Document>> {
        (**self)
            .find_one_and_update(fragments, collection)
            .await
    }

    async fn delete_one(&self, filter: &Fragments, collection: &str) -> DocumentStoreResult<DatabaseResult> {
        (**self).delete_one(filter, collection).await
    }

    async fn bulk_write(
        &self,
        intents: Vec<WriteIntent<Document>>,
        collection: &str,
    ) -> DocumentStoreResult<DatabaseResult> {
        (**self).bulk_write(intents, collection).await
    }

    async fn create_index(&self, field: &str, collection: &str) -> DocumentStoreResult<String> {
        (**self).create_index(field, collection).await
    }

    async fn drop_collection(&self, collection: &str) -> DocumentStoreResult<()> {
        (**self).drop_collection(collection).await
    }

    async fn shutdown(&self) -> DocumentStoreResult<()> {
        (**self).shutdown().await
    }

    fn block_on(&self, future: LocalBoxFuture<'_, ()>) {
        (**self).block_on(future)
    }
}

#[async_trait]
impl<B> StoreBackend for Box<B>
where
    B: StoreBackend + ?Sized,
{
    async fn find(
        &self,
        filter: &Fragments,
        options: &ReadOptions,
        collection: &str,
    ) -> DocumentStoreResult<Vec<Document>> {
        (**self).find(filter, options, collection).await
    }

    async fn count(&self, collection: &str) -> DocumentStoreResult<u64> {
        (**self).count(collection).await
    }

    async fn insert_one(&self, document: Document, collection: &str) -> DocumentStoreResult<()> {
        (**self).insert_one(document, collection).await
    }

    async fn replace_one(
        &self,
        filter: &Fragments,
        document: Document,
        collection: &str,
    ) -> DocumentStoreResult<DatabaseResult> {
        (**self)
            .replace_one(filter, document, collection)
            .await
    }

    async fn update_one(&self, fragments: &Fragments, collection: &str) -> DocumentStoreResult<DatabaseResult> {
        (**self).update_one(fragments, collection).await
    }

    async fn find_one_and_update(
        &self,
        fragments: &Fragments,
        collection: &str,
    ) -> DocumentStoreResult<Option<Document>> {
        (**self)
            .find_one_and_update(fragments, collection)
            .await
    }

    async fn delete_one(&self, filter: &Fragments, collection: &str) -> DocumentStoreResult<DatabaseResult> {
        (**self).delete_one(filter, collection).await
    }

    async fn bulk_write(
        &self,
        intents: Vec<WriteIntent<Document>>,
        collection: &str,
    ) -> DocumentStoreResult<DatabaseResult> {
        (**self).bulk_write(intents, collection).await
    }

    async fn create_index(&self, field: &str, collection: &str) -> DocumentStoreResult<String> {
        (**self).create_index(field, collection).await
    }

    async fn drop_collection(&self, collection: &str) -> DocumentStoreResult<()> {
        (**self).drop_collection(collection).await
    }

    async fn shutdown(&self) -> DocumentStoreResult<()> {
        (**self).shutdown().await
    }

    fn block_on(&self, future: LocalBoxFuture<'_, ()>) {
        (**self).block_on(future)
    }
}

/// Factory trait for creating backend instances.
///
/// Builders carry connection settings and perform any one-time setup, such as running the
/// serializer registration hook, before the backend is handed out.
#[async_trait]
pub trait StoreBackendBuilder {
    /// The type of backend this builder creates.
    type Backend: StoreBackend;

    /// Builds and initializes the backend.
    ///
    /// # Errors
    ///
    /// Returns an error if the settings are invalid or the backend cannot be reached.
    async fn build(self) -> DocumentStoreResult<Self::Backend>;
}
