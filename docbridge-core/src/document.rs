//! Core traits for document representation and serialization.
//!
//! Any serde type can be stored; there is nothing to implement beyond `Serialize` and
//! `Deserialize`. Types that always live in the same collection additionally implement
//! [`NamedDocument`] so a store can open their collection without a name.

use bson::{Bson, de::deserialize_from_bson, ser::serialize_to_bson};
use serde::{Serialize, de::DeserializeOwned};

use crate::{
    error::{DocumentStoreError, DocumentStoreResult},
    registry,
};

/// Marker trait for every type that can be stored in a collection.
///
/// Implemented automatically for all `Serialize + DeserializeOwned` types that are `Send + Sync`.
pub trait Document: Serialize + DeserializeOwned + Send + Sync + 'static {}

impl<T> Document for T where T: Serialize + DeserializeOwned + Send + Sync + 'static {}

/// A document type bound to one collection.
///
/// # Example
///
/// ```ignore
/// use docbridge::document::NamedDocument;
/// use docbridge::id::DocumentId;
/// use serde::{Serialize, Deserialize};
///
/// #[derive(Debug, Clone, Serialize, Deserialize)]
/// pub struct User {
///     #[serde(rename = "_id")]
///     pub id: DocumentId,
///     pub name: String,
///     pub email: String,
/// }
///
/// impl NamedDocument for User {
///     fn collection_name() -> &'static str {
///         "users"
///     }
/// }
/// ```
pub trait NamedDocument: Document {
    /// Returns the name of the collection this document belongs to.
    fn collection_name() -> &'static str;
}

/// Conversions between documents and their stored form.
///
/// Implemented automatically for every [`Document`]. The stored form has passed through the
/// process-wide [`registry`](crate::registry).
pub trait DocumentExt: Document + Sized {
    /// Converts this document into its stored BSON form.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails, a field codec rejects a value, or the type does not
    /// serialize to a BSON document.
    fn to_stored(&self) -> DocumentStoreResult<bson::Document>;

    /// Rebuilds a document from its stored BSON form.
    fn from_stored(document: bson::Document) -> DocumentStoreResult<Self>;
}

impl<D: Document> DocumentExt for D {
    fn to_stored(&self) -> DocumentStoreResult<bson::Document> {
        match serialize_to_bson(self)? {
            Bson::Document(document) => registry::encode_document(document),
            other => Err(DocumentStoreError::InvalidDocument(format!(
                "expected a document, found {:?}",
                other.element_type()
            ))),
        }
    }

    fn from_stored(document: bson::Document) -> DocumentStoreResult<Self> {
        let document = registry::decode_document(document)?;
        Ok(deserialize_from_bson(Bson::Document(document))?)
    }
}
