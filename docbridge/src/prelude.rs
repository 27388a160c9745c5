//! Convenient re-exports of commonly used types from docbridge.
//!
//! ```ignore
//! use docbridge::prelude::*;
//! ```

pub use docbridge_core::{
    accessor::Accessor,
    backend::{StoreBackend, StoreBackendBuilder},
    collection::TypedCollection,
    constraints::{Constraints, ReadOptions},
    document::{Document, DocumentExt, NamedDocument},
    error::{DocumentStoreError, DocumentStoreResult},
    field::Field,
    id::{ArrayNameElementId, DocumentId, IdKind},
    multi_writer::MultiWriter,
    query::{Comparison, SortDirection, UpdateOperator},
    result::DatabaseResult,
    store::{DocumentStore, DynDocumentStore},
};
