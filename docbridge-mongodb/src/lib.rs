//! MongoDB backend implementation for docbridge.
//!
//! This crate provides a MongoDB-based implementation of the `StoreBackend` trait. Filter
//! fragments compile to query documents, update fragments to operator documents (`$set`, `$inc`,
//! `$pull`, ...), and array-filter fragments to the `arrayFilters` option, which are then executed
//! through the official async driver.
//!
//! To use this backend, include the `mongodb` feature in your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! docbridge = { version = "x.y.z", features = ["mongodb"] }
//! ```
//!
//! # Features
//!
//! - **Persistent storage** - Data is persisted to MongoDB Atlas or self-hosted MongoDB
//! - **Positional updates** - `$` and `$[name]` paths with array filters
//! - **Batched writes** - A multi-writer executes as one ordered bulk write
//! - **Registry hook** - Field codecs registered once before the first connection
//!
//! # Example
//!
//! ```ignore
//! use docbridge::{backend::StoreBackendBuilder, mongodb::MongoDbStore};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = MongoDbStore::builder("mongodb://localhost:27017", "my_database")
//!         .app_name("orders")
//!         .build()
//!         .await?;
//!
//!     Ok(())
//! }
//! ```

mod query;
pub mod store;

pub use store::{MongoDbStore, MongoDbStoreBuilder};
