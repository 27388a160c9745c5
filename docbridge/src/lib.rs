//! Main docbridge crate providing a backend-agnostic interface to document databases.
//!
//! This crate is the primary entry point for users of docbridge. It re-exports the core types
//! from the sub-crates and provides access to the storage backends.
//!
//! # Features
//!
//! - **Accessors** - Accumulate search filters and update operations, then run them anywhere
//! - **Constraints** - Sort, skip, limit and projection as one reusable value
//! - **Multi-writer** - Batched heterogeneous writes in a single backend call
//! - **Pluggable ids** - Object ids, integers and UUIDs behind one [`DocumentId`](id::DocumentId)
//! - **Multiple backends** - In-memory and MongoDB, selected at construction time
//!
//! # Quick Start
//!
//! ```ignore
//! use docbridge::{prelude::*, memory::InMemoryStore};
//! use serde::{Serialize, Deserialize};
//!
//! #[derive(Debug, Clone, Serialize, Deserialize)]
//! pub struct Order {
//!     #[serde(rename = "_id")]
//!     pub id: DocumentId,
//!     pub status: String,
//!     pub lines: Vec<Line>,
//! }
//!
//! impl NamedDocument for Order {
//!     fn collection_name() -> &'static str { "orders" }
//! }
//!
//! #[tokio::main]
//! async fn main() -> DocumentStoreResult<()> {
//!     let store = DocumentStore::new(InMemoryStore::builder().build().await?);
//!     let orders = store.typed_collection::<Order>();
//!
//!     let mut accessor = Accessor::new();
//!     accessor.add_search_filter("status", "open", Comparison::Equals);
//!     accessor.add_operation("status", "shipped", UpdateOperator::AddOrOverwrite);
//!     orders.update(&accessor).await?;
//!
//!     let mut constraints = Constraints::new();
//!     constraints.sort("status", SortDirection::Ascending).limit(10);
//!     let first_ten = orders.get_all(None, Some(&constraints)).await;
//!
//!     store.shutdown().await
//! }
//! ```
//!
//! # Runtime backend selection
//!
//! ```ignore
//! use docbridge::config::{connect, StoreConfig};
//!
//! let store = connect(StoreConfig::from_json_str(r#"{ "type": "memory" }"#)?).await?;
//! let orders = store.typed_collection::<Order>();
//! ```
//!
//! # Backends
//!
//! - [`memory`] - In-memory storage for development and testing
//! - `mongodb` - Persistent MongoDB backend (requires the `mongodb` feature)

pub mod config;
pub mod prelude;

pub use docbridge_core::{
    accessor, backend, collection, constraints, document, error, field, id, multi_writer, query, registry, result,
    store,
};

// Re-export BSON types for convenience
pub use bson;

/// In-memory storage backend implementations.
pub mod memory {
    pub use docbridge_memory::{InMemoryStore, InMemoryStoreBuilder};
}

/// MongoDB storage backend implementations.
///
/// This module is only available when the `mongodb` feature is enabled.
#[cfg(feature = "mongodb")]
pub mod mongodb {
    pub use docbridge_mongodb::{MongoDbStore, MongoDbStoreBuilder};
}
