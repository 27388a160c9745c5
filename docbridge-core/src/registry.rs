//! Process-wide serializer registry.
//!
//! Holds the convention packs and per-field value codecs every document passes through on its
//! way to and from a backend. The registry is initialized once per process, normally from the
//! registration hook of a backend builder, before any document is exchanged:
//!
//! ```ignore
//! use docbridge::registry::{self, Convention};
//!
//! registry::initialize(|registrar| {
//!     registrar.register_convention_pack("keys", vec![Convention::EscapeReservedKeys]);
//!     registrar.register_field_codec("secret", Rot13);
//! });
//! ```
//!
//! Concurrent first use is safe: registrations are staged and committed under one write lock,
//! and every later attempt returns `false` instead of failing. Registration never panics; a
//! rejected registration is reported through its `bool` result.

use std::{collections::HashMap, fmt, sync::Arc};

use bson::{Bson, Document};
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use tracing::debug;

use crate::error::{DocumentStoreError, DocumentStoreResult};

/// Converts the stored form of one field's value.
pub trait FieldCodec: Send + Sync {
    fn encode(&self, value: Bson) -> DocumentStoreResult<Bson>;
    fn decode(&self, value: Bson) -> DocumentStoreResult<Bson>;
}

/// Document-wide conventions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Convention {
    /// Escapes `.`, `$` and NUL in document keys, which MongoDB reserves for paths and operators.
    EscapeReservedKeys,
}

static REGISTRY: Lazy<RwLock<Registry>> = Lazy::new(|| RwLock::new(Registry::default()));

#[derive(Default)]
struct Registry {
    initialized: bool,
    packs: Vec<(String, Vec<Convention>)>,
    codecs: HashMap<String, Arc<dyn FieldCodec>>,
}

impl Registry {
    /// Runs `hook` against an empty staging registry.
    fn stage<F>(hook: F) -> Registry
    where
        F: FnOnce(&mut Registrar<'_>),
    {
        let mut staged = Registry::default();
        hook(&mut Registrar { registry: &mut staged });
        staged
    }

    /// Merges the staged registrations and marks the registry initialized. Staged entries that
    /// collide with an existing registration are dropped.
    fn commit(&mut self, staged: Registry) -> bool {
        if self.initialized {
            debug!(target: "docbridge::registry", "registry already initialized");
            return false;
        }

        for (name, conventions) in staged.packs {
            self.register_convention_pack(&name, conventions);
        }
        for (field, codec) in staged.codecs {
            self.register_field_codec(&field, codec);
        }

        self.initialized = true;
        debug!(
            target: "docbridge::registry",
            packs = self.packs.len(),
            codecs = self.codecs.len(),
            "registry initialized"
        );
        true
    }

    fn register_convention_pack(&mut self, name: &str, conventions: Vec<Convention>) -> bool {
        if name.is_empty() || conventions.is_empty() {
            debug!(target: "docbridge::registry", pack = name, "rejected empty convention pack");
            return false;
        }
        if self.packs.iter().any(|(existing, _)| existing == name) {
            debug!(target: "docbridge::registry", pack = name, "convention pack already registered");
            return false;
        }

        self.packs.push((name.to_string(), conventions));
        true
    }

    fn register_field_codec(&mut self, field: &str, codec: Arc<dyn FieldCodec>) -> bool {
        if field.is_empty() || self.codecs.contains_key(field) {
            debug!(target: "docbridge::registry", field, "field codec rejected");
            return false;
        }

        self.codecs.insert(field.to_string(), codec);
        true
    }

    fn has_convention(&self, convention: Convention) -> bool {
        self.packs
            .iter()
            .any(|(_, conventions)| conventions.contains(&convention))
    }

    fn encode_value(&self, field: &str, value: Bson) -> DocumentStoreResult<Bson> {
        let value = match self.codecs.get(field) {
            Some(codec) => codec.encode(value)?,
            None => value,
        };

        if self.has_convention(Convention::EscapeReservedKeys) {
            return Ok(map_keys(&value, escape_key));
        }
        Ok(value)
    }

    fn encode_document(&self, mut document: Document) -> DocumentStoreResult<Document> {
        for (path, codec) in &self.codecs {
            map_path(&mut document, path, |value| codec.encode(value))?;
        }

        if self.has_convention(Convention::EscapeReservedKeys) {
            document = escape_keys(&document);
        }

        Ok(document)
    }

    fn decode_document(&self, mut document: Document) -> DocumentStoreResult<Document> {
        if self.has_convention(Convention::EscapeReservedKeys) {
            document = restore_keys(&document);
        }

        for (path, codec) in &self.codecs {
            map_path(&mut document, path, |value| codec.decode(value))?;
        }

        Ok(document)
    }
}

/// Registration handle passed to the [`initialize`] hook.
pub struct Registrar<'a> {
    registry: &'a mut Registry,
}

impl Registrar<'_> {
    /// Registers a named convention pack. Returns `false` for an empty or duplicate pack.
    pub fn register_convention_pack(&mut self, name: &str, conventions: Vec<Convention>) -> bool {
        self.registry.register_convention_pack(name, conventions)
    }

    /// Registers a codec for a dotted field path. Returns `false` if the path already has one.
    pub fn register_field_codec(&mut self, field: &str, codec: impl FieldCodec + 'static) -> bool {
        self.registry.register_field_codec(field, Arc::new(codec))
    }
}

impl fmt::Debug for Registrar<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registrar")
            .field("packs", &self.registry.packs)
            .field("codecs", &self.registry.codecs.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Runs `hook` if the registry has not been initialized yet.
///
/// The hook registers into a staging area without holding the registry lock, so it may build
/// accessors or call the free `register_*` functions. Its registrations become visible when it
/// returns. Returns `true` for the call whose registrations were committed and `false` for every
/// other call; when two first calls race, both hooks run and only one is kept.
pub fn initialize<F>(hook: F) -> bool
where
    F: FnOnce(&mut Registrar<'_>),
{
    if REGISTRY.read().initialized {
        debug!(target: "docbridge::registry", "registry already initialized");
        return false;
    }

    let staged = Registry::stage(hook);
    REGISTRY.write().commit(staged)
}

pub fn is_initialized() -> bool {
    REGISTRY.read().initialized
}

/// Registers a convention pack outside of [`initialize`].
pub fn register_convention_pack(name: &str, conventions: Vec<Convention>) -> bool {
    REGISTRY.write().register_convention_pack(name, conventions)
}

/// Registers a field codec outside of [`initialize`].
pub fn register_field_codec(field: &str, codec: impl FieldCodec + 'static) -> bool {
    REGISTRY.write().register_field_codec(field, Arc::new(codec))
}

/// Encodes a document into its stored form.
pub fn encode_document(document: Document) -> DocumentStoreResult<Document> {
    REGISTRY.read().encode_document(document)
}

/// Decodes a stored document.
pub fn decode_document(document: Document) -> DocumentStoreResult<Document> {
    REGISTRY.read().decode_document(document)
}

/// Encodes a filter or update operand for `field`. `None` when the field codec rejects it.
pub(crate) fn encode_value(field: &str, value: Bson) -> Option<Bson> {
    match REGISTRY.read().encode_value(field, value) {
        Ok(value) => Some(value),
        Err(err) => {
            debug!(target: "docbridge::registry", field, error = %err, "field codec rejected value");
            None
        }
    }
}

const REPLACEMENTS: [(&str, &str); 3] = [(".", "__dot__"), ("$", "__dollar__"), ("\0", "__null__")];

fn escape_key(key: &str) -> String {
    REPLACEMENTS
        .iter()
        .fold(key.to_string(), |key, &(target, replacement)| key.replace(target, replacement))
}

fn restore_key(key: &str) -> String {
    REPLACEMENTS
        .iter()
        .rev()
        .fold(key.to_string(), |key, &(target, replacement)| key.replace(replacement, target))
}

fn map_keys(value: &Bson, rename: fn(&str) -> String) -> Bson {
    match value {
        Bson::Document(document) => Bson::Document(map_document_keys(document, rename)),
        Bson::Array(values) => Bson::Array(values.iter().map(|value| map_keys(value, rename)).collect()),
        _ => value.clone(),
    }
}

fn map_document_keys(document: &Document, rename: fn(&str) -> String) -> Document {
    document
        .iter()
        .map(|(key, value)| (rename(key), map_keys(value, rename)))
        .collect()
}

fn escape_keys(document: &Document) -> Document {
    map_document_keys(document, escape_key)
}

fn restore_keys(document: &Document) -> Document {
    map_document_keys(document, restore_key)
}

/// Replaces the value at a dotted path through nested documents, if present.
fn map_path<F>(document: &mut Document, path: &str, f: F) -> DocumentStoreResult<()>
where
    F: FnOnce(Bson) -> DocumentStoreResult<Bson>,
{
    let (head, rest) = match path.split_once('.') {
        Some((head, rest)) => (head, Some(rest)),
        None => (path, None),
    };

    match rest {
        None => {
            if let Some(slot) = document.get_mut(head) {
                let value = std::mem::replace(slot, Bson::Null);
                *slot = f(value)?;
            }
            Ok(())
        }
        Some(rest) => match document.get_mut(head) {
            Some(Bson::Document(inner)) => map_path(inner, rest, f),
            Some(_) => Err(DocumentStoreError::InvalidDocument(format!(
                "field codec path {path} crosses a non-document value"
            ))),
            None => Ok(()),
        },
    }
}
