//! Pluggable document identities.
//!
//! A [`DocumentId`] is one of three id schemes behind a single value type:
//!
//! - [`DocumentId::Object`] - a 12 byte object id, string form is 24 hex characters
//! - [`DocumentId::Integer`] - a signed 64-bit integer, string form is decimal
//! - [`DocumentId::Opaque`] - a UUID, string form is the canonical hyphenated text
//!
//! Ids of different schemes never compare equal, even when their string forms happen to match.
//!
//! # Example
//!
//! ```ignore
//! use docbridge::id::{DocumentId, IdKind};
//!
//! let id = DocumentId::create(IdKind::Object);
//! let same = DocumentId::parse(IdKind::Object, &id.id_string())?;
//! assert_eq!(id, same);
//! ```

use std::fmt;

use bson::{Bson, oid::ObjectId};
use chrono::{DateTime, Utc};
use serde::{
    Deserialize, Deserializer, Serialize, Serializer,
    de::{self, MapAccess, Visitor, value::MapAccessDeserializer},
};
use uuid::Uuid;

use crate::error::{DocumentStoreError, DocumentStoreResult};

/// The id scheme of a [`DocumentId`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdKind {
    /// Backend-native 12 byte object id.
    Object,
    /// 64-bit integer id.
    Integer,
    /// UUID based opaque id.
    Opaque,
}

impl fmt::Display for IdKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            IdKind::Object => "object",
            IdKind::Integer => "integer",
            IdKind::Opaque => "opaque",
        })
    }
}

/// A document identity value.
///
/// Treat ids as values: clone them into each document rather than sharing one instance that is
/// later re-parsed through [`set_from_string`](DocumentId::set_from_string).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DocumentId {
    Object(ObjectId),
    Integer(i64),
    Opaque(Uuid),
}

impl DocumentId {
    /// Creates a fresh id of the given kind.
    ///
    /// Object ids and opaque ids are unique. Integer ids are random and carry no uniqueness
    /// guarantee, so callers assigning integer ids should set them explicitly.
    pub fn create(kind: IdKind) -> Self {
        match kind {
            IdKind::Object => DocumentId::Object(ObjectId::new()),
            IdKind::Integer => DocumentId::Integer(i64::from(rand::random::<u32>() >> 1)),
            IdKind::Opaque => DocumentId::Opaque(Uuid::new_v4()),
        }
    }

    /// Creates the zero value of the given kind, used as a placeholder before an id is known.
    pub fn create_empty(kind: IdKind) -> Self {
        match kind {
            IdKind::Object => DocumentId::Object(ObjectId::from_bytes([0; 12])),
            IdKind::Integer => DocumentId::Integer(0),
            IdKind::Opaque => DocumentId::Opaque(Uuid::nil()),
        }
    }

    /// Parses the string form of an id of the given kind.
    pub fn parse(kind: IdKind, value: &str) -> DocumentStoreResult<Self> {
        let mut id = Self::create_empty(kind);
        id.set_from_string(value)?;

        Ok(id)
    }

    pub fn kind(&self) -> IdKind {
        match self {
            DocumentId::Object(_) => IdKind::Object,
            DocumentId::Integer(_) => IdKind::Integer,
            DocumentId::Opaque(_) => IdKind::Opaque,
        }
    }

    /// Returns the canonical string form of this id.
    pub fn id_string(&self) -> String {
        match self {
            DocumentId::Object(oid) => oid.to_hex(),
            DocumentId::Integer(value) => value.to_string(),
            DocumentId::Opaque(uuid) => uuid.hyphenated().to_string(),
        }
    }

    /// Re-parses this id from a string of the same kind.
    ///
    /// On failure the id keeps its previous value.
    pub fn set_from_string(&mut self, value: &str) -> DocumentStoreResult<()> {
        let kind = self.kind();
        let invalid = || DocumentStoreError::InvalidId(kind.to_string(), value.to_string());

        *self = match kind {
            IdKind::Object => DocumentId::Object(ObjectId::parse_str(value).map_err(|_| invalid())?),
            IdKind::Integer => DocumentId::Integer(value.parse::<i64>().map_err(|_| invalid())?),
            IdKind::Opaque => DocumentId::Opaque(Uuid::parse_str(value).map_err(|_| invalid())?),
        };

        Ok(())
    }

    /// Returns the representation backends store and compare this id as.
    pub fn to_bson(&self) -> Bson {
        match self {
            DocumentId::Object(oid) => Bson::ObjectId(*oid),
            DocumentId::Integer(value) => Bson::Int64(*value),
            DocumentId::Opaque(uuid) => Bson::String(uuid.hyphenated().to_string()),
        }
    }

    /// Returns the creation time embedded in an object id. Other kinds carry none.
    pub fn creation_time(&self) -> Option<DateTime<Utc>> {
        match self {
            DocumentId::Object(oid) => Some(oid.timestamp().to_chrono()),
            _ => None,
        }
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id_string())
    }
}

impl From<ObjectId> for DocumentId {
    fn from(oid: ObjectId) -> Self {
        DocumentId::Object(oid)
    }
}

impl From<i64> for DocumentId {
    fn from(value: i64) -> Self {
        DocumentId::Integer(value)
    }
}

impl From<Uuid> for DocumentId {
    fn from(uuid: Uuid) -> Self {
        DocumentId::Opaque(uuid)
    }
}

impl From<DocumentId> for Bson {
    fn from(id: DocumentId) -> Self {
        id.to_bson()
    }
}

impl Serialize for DocumentId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            DocumentId::Object(oid) => oid.serialize(serializer),
            DocumentId::Integer(value) => serializer.serialize_i64(*value),
            DocumentId::Opaque(uuid) => serializer.serialize_str(&uuid.hyphenated().to_string()),
        }
    }
}

impl<'de> Deserialize<'de> for DocumentId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(DocumentIdVisitor)
    }
}

struct DocumentIdVisitor;

impl<'de> Visitor<'de> for DocumentIdVisitor {
    type Value = DocumentId;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("an object id, an integer or a UUID string")
    }

    fn visit_i64<E: de::Error>(self, value: i64) -> Result<Self::Value, E> {
        Ok(DocumentId::Integer(value))
    }

    fn visit_u64<E: de::Error>(self, value: u64) -> Result<Self::Value, E> {
        i64::try_from(value)
            .map(DocumentId::Integer)
            .map_err(|_| E::invalid_value(de::Unexpected::Unsigned(value), &self))
    }

    fn visit_str<E: de::Error>(self, value: &str) -> Result<Self::Value, E> {
        if let Ok(uuid) = Uuid::parse_str(value) {
            return Ok(DocumentId::Opaque(uuid));
        }

        ObjectId::parse_str(value)
            .map(DocumentId::Object)
            .map_err(|_| E::invalid_value(de::Unexpected::Str(value), &self))
    }

    fn visit_map<A: MapAccess<'de>>(self, map: A) -> Result<Self::Value, A::Error> {
        ObjectId::deserialize(MapAccessDeserializer::new(map)).map(DocumentId::Object)
    }
}

/// Names one element inside a named array: the array's field name and the element's `_id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArrayNameElementId {
    pub array_name: String,
    pub element_id: DocumentId,
}

impl ArrayNameElementId {
    pub fn new(array_name: impl Into<String>, element_id: DocumentId) -> Self {
        Self {
            array_name: array_name.into(),
            element_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use bson::{de::deserialize_from_bson, doc, ser::serialize_to_bson};

    use super::*;

    #[test]
    fn string_form_round_trips_for_every_kind() {
        for kind in [IdKind::Object, IdKind::Integer, IdKind::Opaque] {
            let id = DocumentId::create(kind);
            let mut parsed = DocumentId::create_empty(kind);
            parsed.set_from_string(&id.id_string()).unwrap();

            assert_eq!(parsed, id);
        }
    }

    #[test]
    fn different_kinds_never_compare_equal() {
        assert_ne!(
            DocumentId::create_empty(IdKind::Integer),
            DocumentId::create_empty(IdKind::Object),
        );
        assert_ne!(
            DocumentId::create_empty(IdKind::Opaque),
            DocumentId::create_empty(IdKind::Integer),
        );
    }

    #[test]
    fn malformed_object_id_is_rejected_without_mutation() {
        let original = DocumentId::create(IdKind::Object);
        let mut id = original;

        let result = id.set_from_string("not-hex");

        assert!(matches!(result, Err(DocumentStoreError::InvalidId(_, _))));
        assert_eq!(id, original);
        assert!(DocumentId::parse(IdKind::Object, "0123456789abcdef0123456").is_err());
        assert!(DocumentId::parse(IdKind::Integer, "12a").is_err());
    }

    #[test]
    fn empty_ids_are_zero_values() {
        assert_eq!(DocumentId::create_empty(IdKind::Object).id_string(), "0".repeat(24));
        assert_eq!(DocumentId::create_empty(IdKind::Integer).id_string(), "0");
        assert_eq!(
            DocumentId::create_empty(IdKind::Opaque).id_string(),
            "00000000-0000-0000-0000-000000000000",
        );
    }

    #[test]
    fn native_representation_per_kind() {
        let oid = ObjectId::new();

        assert_eq!(DocumentId::Object(oid).to_bson(), Bson::ObjectId(oid));
        assert_eq!(DocumentId::Integer(42).to_bson(), Bson::Int64(42));
        assert!(matches!(DocumentId::create(IdKind::Opaque).to_bson(), Bson::String(_)));
    }

    #[test]
    fn borrowed_ids_convert_to_bson() {
        let id = DocumentId::Integer(9);

        assert_eq!(Bson::from(&id), Bson::Int64(9));
        assert_eq!(doc! { "ids": [&id, id] }, doc! { "ids": [9_i64, 9_i64] });
    }

    #[test]
    fn serde_keeps_the_kind() {
        for id in [
            DocumentId::create(IdKind::Object),
            DocumentId::Integer(7),
            DocumentId::create(IdKind::Opaque),
        ] {
            let bson = serialize_to_bson(&id).unwrap();
            assert_eq!(bson, id.to_bson());

            let back: DocumentId = deserialize_from_bson(bson).unwrap();
            assert_eq!(back, id);

            let nested: bson::Document = deserialize_from_bson(Bson::Document(doc! { "_id": &id })).unwrap();
            assert_eq!(nested.get("_id"), Some(&id.to_bson()));
        }
    }

    #[test]
    fn object_ids_report_creation_time() {
        assert!(DocumentId::create(IdKind::Object).creation_time().is_some());
        assert!(DocumentId::Integer(1).creation_time().is_none());
    }
}
