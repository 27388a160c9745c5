//! Main document store interface.
//!
//! - [`DocumentStore`] - store over one concrete backend type
//! - [`DynDocumentStore`] - store over a boxed backend, selected at runtime
//!
//! # Example
//!
//! ```ignore
//! use docbridge::store::DocumentStore;
//!
//! let store = DocumentStore::new(backend);
//! let users = store.typed_collection::<User>();
//! let audit = store.collection::<bson::Document>("Audit"); // opens "audit"
//! ```

use crate::{
    backend::StoreBackend,
    collection::TypedCollection,
    document::{Document, NamedDocument},
    error::DocumentStoreResult,
};

/// A document store backed by `B`.
#[derive(Debug)]
pub struct DocumentStore<B: StoreBackend> {
    backend: B,
}

/// A document store whose backend was chosen at runtime.
pub type DynDocumentStore = DocumentStore<Box<dyn StoreBackend>>;

impl<B: StoreBackend> DocumentStore<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    /// Opens the collection bound to `D`.
    pub fn typed_collection<D: NamedDocument>(&self) -> TypedCollection<'_, B, D> {
        self.collection(D::collection_name())
    }

    /// Opens a collection by name. Names are lower-cased.
    pub fn collection<D: Document>(&self, name: &str) -> TypedCollection<'_, B, D> {
        TypedCollection::new(name.to_lowercase(), &self.backend)
    }

    pub async fn drop_collection(&self, name: &str) -> DocumentStoreResult<()> {
        self.backend
            .drop_collection(&name.to_lowercase())
            .await
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Shuts down the backend and consumes the store.
    pub async fn shutdown(self) -> DocumentStoreResult<()> {
        self.backend.shutdown().await
    }
}

impl<B: StoreBackend + 'static> DocumentStore<B> {
    /// Erases the backend type.
    pub fn into_dyn(self) -> DynDocumentStore {
        DocumentStore::new(Box::new(self.backend))
    }
}
