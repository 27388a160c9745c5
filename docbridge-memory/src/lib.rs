//! In-memory document storage backend for docbridge.
//!
//! This crate provides a thread-safe, in-memory implementation of the `StoreBackend` trait. It
//! interprets filter, update and array-filter fragments itself, following MongoDB's semantics for
//! the operator vocabulary, which makes it a drop-in stand-in for development and tests.
//!
//! # Features
//!
//! - **Thread-safe access** - Concurrent reads and writes using an async-aware RwLock
//! - **Full filter support** - Dotted paths, array fan-out, element matching
//! - **Update operators** - Including `$` and `$[name]` positional paths and upserts
//! - **Read options** - Sorting, skip, limit and inclusion projections
//!
//! # Quick Start
//!
//! ```ignore
//! use docbridge::{prelude::*, memory::InMemoryStore};
//!
//! #[tokio::main]
//! async fn main() -> DocumentStoreResult<()> {
//!     let backend = InMemoryStore::builder().build().await?;
//!     let store = DocumentStore::new(backend);
//!     let users = store.typed_collection::<User>();
//!
//!     users.add(&User { id: DocumentId::create(IdKind::Object), name: "Alice".into() }).await?;
//!
//!     Ok(())
//! }
//! ```

mod evaluator;
pub mod store;
mod update;

pub use store::{InMemoryStore, InMemoryStoreBuilder};
