//! A backend-agnostic document database access layer.
//!
//! Callers describe searches, updates, read constraints and batched writes through an abstract
//! vocabulary of field paths, comparison operators and update operators. A backend compiles that
//! description into its native query language and executes it.
//!
//! This crate is the core of the docbridge project and provides:
//!
//! - **Identities** ([`id`]) - Pluggable document id schemes behind one value type
//! - **Operator vocabulary and fragments** ([`query`]) - What accessors record and backends read
//! - **Accessor** ([`accessor`]) - The filter + update builder
//! - **Constraints** ([`constraints`]) - Sort, skip, limit and projection
//! - **Multi-writer** ([`multi_writer`]) - Batched heterogeneous writes
//! - **Store backend abstraction** ([`backend`]) - The capability interface backends implement
//! - **Collections and store** ([`collection`], [`store`]) - Typed contexts that drive a backend
//! - **Serializer registry** ([`registry`]) - Process-wide conventions and field codecs
//! - **Error handling** ([`error`]) - Error types and result types
//!
//! # Example
//!
//! ```ignore
//! use docbridge::prelude::*;
//! use serde::{Serialize, Deserialize};
//!
//! #[derive(Debug, Clone, Serialize, Deserialize)]
//! pub struct User {
//!     #[serde(rename = "_id")]
//!     pub id: DocumentId,
//!     pub name: String,
//! }
//!
//! impl NamedDocument for User {
//!     fn collection_name() -> &'static str {
//!         "users"
//!     }
//! }
//!
//! let users = store.typed_collection::<User>();
//! let mut accessor = Accessor::new();
//! accessor.add_search_filter("name", "Alice", Comparison::Equals);
//! accessor.add_operation("name", "Alicia", UpdateOperator::AddOrOverwrite);
//! users.update(&accessor).await?;
//! ```

pub mod accessor;
pub mod backend;
pub mod collection;
pub mod constraints;
pub mod document;
pub mod error;
pub mod field;
pub mod id;
pub mod multi_writer;
pub mod query;
pub mod registry;
pub mod result;
pub mod store;
