//! In-memory storage implementation for document stores.
//!
//! Collections are vectors of BSON documents in insertion order, kept in a map behind an
//! async-aware read-write lock. Filters, updates and read options are interpreted directly
//! against the stored documents.

use std::{cmp::Ordering, collections::HashMap, sync::Arc};

use async_trait::async_trait;
use bson::{Bson, Document};
use mea::rwlock::RwLock;

use docbridge_core::{
    backend::{StoreBackend, StoreBackendBuilder},
    constraints::ReadOptions,
    error::DocumentStoreResult,
    multi_writer::WriteIntent,
    query::Fragments,
    result::DatabaseResult,
};

use crate::{
    evaluator::{Comparable, DocumentEvaluator, values_at},
    update::{apply_updates, upsert_seed},
};

type StoreMap = HashMap<String, Vec<Document>>;

/// Thread-safe in-memory document storage backend.
///
/// `InMemoryStore` is cloneable and uses an `Arc`-wrapped internal state, allowing it to be
/// shared across async tasks. Clones share the same underlying data.
///
/// Queries scan every document of a collection; [`create_index`](StoreBackend::create_index)
/// only reports the name an index would have.
///
/// # Example
///
/// ```ignore
/// use docbridge_memory::InMemoryStore;
/// use docbridge::{store::DocumentStore, accessor::Accessor};
///
/// let store = DocumentStore::new(InMemoryStore::new());
/// let users = store.collection::<bson::Document>("users");
/// users.add(&bson::doc! { "name": "Alice" }).await?;
/// assert_eq!(users.count().await?, 1);
/// ```
#[derive(Default, Clone, Debug)]
pub struct InMemoryStore {
    /// collection name -> documents in insertion order
    store: Arc<RwLock<StoreMap>>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory document store.
    pub fn new() -> Self {
        Self {
            store: Arc::new(RwLock::new(StoreMap::new())),
        }
    }

    pub fn builder() -> InMemoryStoreBuilder {
        InMemoryStoreBuilder::default()
    }
}

fn position(documents: &[Document], filter: &Fragments) -> Option<usize> {
    documents
        .iter()
        .position(|document| DocumentEvaluator::matches(document, filter.filters()))
}

fn replace(documents: &mut [Document], filter: &Fragments, mut replacement: Document) -> DatabaseResult {
    let Some(index) = position(documents, filter) else {
        return DatabaseResult::acknowledged(0);
    };

    let existing = &mut documents[index];
    if let Some(id) = existing.get("_id").cloned() {
        replacement.insert("_id", id);
    }

    let modified = *existing != replacement;
    *existing = replacement;
    DatabaseResult::acknowledged(u64::from(modified))
}

/// Applies `fragments` to the first match. Returns the matched document before the update and
/// whether it changed; inserts a seeded document when `upsert` is set and nothing matches.
fn update(
    documents: &mut Vec<Document>,
    fragments: &Fragments,
    upsert: bool,
) -> DocumentStoreResult<(Option<Document>, bool)> {
    match position(documents, fragments) {
        Some(index) => {
            let before = documents[index].clone();
            let modified = apply_updates(&mut documents[index], fragments)?;
            Ok((Some(before), modified))
        }
        None if upsert => {
            documents.push(upsert_seed(fragments)?);
            Ok((None, false))
        }
        None => Ok((None, false)),
    }
}

fn delete(documents: &mut Vec<Document>, filter: &Fragments) -> DatabaseResult {
    match position(documents, filter) {
        Some(index) => {
            documents.remove(index);
            DatabaseResult::acknowledged(1)
        }
        None => DatabaseResult::acknowledged(0),
    }
}

/// Orders two sort keys the way the server does for mixed presence: missing and null sort first.
fn compare_keys(left: Option<&Bson>, right: Option<&Bson>) -> Ordering {
    let is_null = |value: Option<&Bson>| matches!(value, None | Some(Bson::Null));

    match (is_null(left), is_null(right)) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => match (left, right) {
            (Some(a), Some(b)) => Comparable::from(a)
                .partial_cmp(&Comparable::from(b))
                .unwrap_or(Ordering::Equal),
            _ => Ordering::Equal,
        },
    }
}

fn sort(documents: &mut [Document], sort: &Document) {
    let keys: Vec<(&str, bool)> = sort
        .iter()
        .map(|(field, direction)| {
            let descending = matches!(direction, Bson::Int32(d) if *d < 0)
                || matches!(direction, Bson::Int64(d) if *d < 0);
            (field.as_str(), descending)
        })
        .collect();

    documents.sort_by(|a, b| {
        for (field, descending) in &keys {
            let ordering = compare_keys(
                values_at(a, field).first().copied(),
                values_at(b, field).first().copied(),
            );
            let ordering = if *descending { ordering.reverse() } else { ordering };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    });
}

/// Applies an inclusion projection. `_id` is kept unless excluded explicitly.
fn project(document: &Document, projection: &Document) -> Document {
    let included = |value: &Bson| match value {
        Bson::Int32(v) => *v != 0,
        Bson::Int64(v) => *v != 0,
        Bson::Double(v) => *v != 0.0,
        Bson::Boolean(v) => *v,
        _ => true,
    };

    let mut projected = Document::new();
    if projection.get("_id").is_none_or(included) {
        if let Some(id) = document.get("_id") {
            projected.insert("_id", id.clone());
        }
    }

    for (path, flag) in projection {
        if path == "_id" || !included(flag) {
            continue;
        }
        copy_path(document, &mut projected, path);
    }

    projected
}

fn copy_path(source: &Document, target: &mut Document, path: &str) {
    match path.split_once('.') {
        None => {
            if let Some(value) = source.get(path) {
                target.insert(path, value.clone());
            }
        }
        Some((head, rest)) => {
            let Ok(inner) = source.get_document(head) else {
                return;
            };
            let mut nested = match target.get(head) {
                Some(Bson::Document(existing)) => existing.clone(),
                _ => Document::new(),
            };
            copy_path(inner, &mut nested, rest);
            if !nested.is_empty() {
                target.insert(head, nested);
            }
        }
    }
}

fn read(documents: &[Document], filter: &Fragments, options: &ReadOptions) -> Vec<Document> {
    let mut found: Vec<Document> = documents
        .iter()
        .filter(|document| DocumentEvaluator::matches(document, filter.filters()))
        .cloned()
        .collect();

    if let Some(order) = &options.sort {
        sort(&mut found, order);
    }

    let skip = options.skip.unwrap_or(0) as usize;
    // Zero means no limit; a negative limit counts like its absolute value.
    let take = match options.limit {
        Some(limit) if limit != 0 => limit.unsigned_abs() as usize,
        _ => usize::MAX,
    };

    found
        .into_iter()
        .skip(skip)
        .take(take)
        .map(|document| match &options.projection {
            Some(projection) => project(&document, projection),
            None => document,
        })
        .collect()
}

#[async_trait]
impl StoreBackend for InMemoryStore {
    async fn find(
        &self,
        filter: &Fragments,
        options: &ReadOptions,
        collection: &str,
    ) -> DocumentStoreResult<Vec<Document>> {
        let store = self.store.read().await;
        let Some(documents) = store.get(collection) else {
            return Ok(vec![]);
        };

        Ok(read(documents, filter, options))
    }

    async fn count(&self, collection: &str) -> DocumentStoreResult<u64> {
        Ok(self
            .store
            .read()
            .await
            .get(collection)
            .map_or(0, |documents| documents.len() as u64))
    }

    async fn insert_one(&self, document: Document, collection: &str) -> DocumentStoreResult<()> {
        self.store
            .write()
            .await
            .entry(collection.to_string())
            .or_default()
            .push(document);

        Ok(())
    }

    async fn replace_one(
        &self,
        filter: &Fragments,
        document: Document,
        collection: &str,
    ) -> DocumentStoreResult<DatabaseResult> {
        let mut store = self.store.write().await;
        let Some(documents) = store.get_mut(collection) else {
            return Ok(DatabaseResult::acknowledged(0));
        };

        Ok(replace(documents, filter, document))
    }

    async fn update_one(&self, fragments: &Fragments, collection: &str) -> DocumentStoreResult<DatabaseResult> {
        let mut store = self.store.write().await;
        let documents = store.entry(collection.to_string()).or_default();

        let (_, modified) = update(documents, fragments, true)?;
        tracing::debug!(target: "docbridge::memory", collection, modified, "update applied");

        Ok(DatabaseResult::acknowledged(u64::from(modified)))
    }

    async fn find_one_and_update(
        &self,
        fragments: &Fragments,
        collection: &str,
    ) -> DocumentStoreResult<Option<Document>> {
        let mut store = self.store.write().await;
        let documents = store.entry(collection.to_string()).or_default();

        let (before, _) = update(documents, fragments, true)?;
        Ok(before)
    }

    async fn delete_one(&self, filter: &Fragments, collection: &str) -> DocumentStoreResult<DatabaseResult> {
        let mut store = self.store.write().await;
        let Some(documents) = store.get_mut(collection) else {
            return Ok(DatabaseResult::acknowledged(0));
        };

        Ok(delete(documents, filter))
    }

    async fn bulk_write(
        &self,
        intents: Vec<WriteIntent<Document>>,
        collection: &str,
    ) -> DocumentStoreResult<DatabaseResult> {
        let mut store = self.store.write().await;
        let documents = store.entry(collection.to_string()).or_default();

        let mut affected = 0;
        for intent in intents {
            tracing::debug!(target: "docbridge::memory", collection, kind = intent.kind(), "bulk write intent");

            // Ordered: the first failure stops the batch, earlier writes stay applied.
            affected += match intent {
                WriteIntent::Create { document } => {
                    documents.push(document);
                    0
                }
                WriteIntent::Update { fragments } => u64::from(update(documents, &fragments, false)?.1),
                WriteIntent::Replace { filter, document } => replace(documents, &filter, document).items_affected,
                WriteIntent::Delete { filter } => delete(documents, &filter).items_affected,
            };
        }

        Ok(DatabaseResult::acknowledged(affected))
    }

    async fn create_index(&self, field: &str, collection: &str) -> DocumentStoreResult<String> {
        tracing::debug!(target: "docbridge::memory", collection, field, "index requested; scans are used instead");
        Ok(format!("{field}_1"))
    }

    async fn drop_collection(&self, collection: &str) -> DocumentStoreResult<()> {
        self.store.write().await.remove(collection);
        Ok(())
    }
}

/// Builder for constructing [`InMemoryStore`] instances.
///
/// ```ignore
/// use docbridge_memory::InMemoryStore;
/// use docbridge::backend::StoreBackendBuilder;
///
/// let store = InMemoryStore::builder().build().await?;
/// ```
#[derive(Default)]
pub struct InMemoryStoreBuilder;

#[async_trait]
impl StoreBackendBuilder for InMemoryStoreBuilder {
    type Backend = InMemoryStore;

    async fn build(self) -> DocumentStoreResult<Self::Backend> {
        Ok(InMemoryStore::new())
    }
}
