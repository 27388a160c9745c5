use std::collections::BTreeMap;

use bson::{Bson, doc};
use serde::{Deserialize, Serialize};

use docbridge::{
    memory::InMemoryStore,
    prelude::*,
    query::Fragments,
    registry::{self, Convention, FieldCodec},
};

struct Reversed;

impl FieldCodec for Reversed {
    fn encode(&self, value: Bson) -> DocumentStoreResult<Bson> {
        match value {
            Bson::String(text) => Ok(Bson::String(text.chars().rev().collect())),
            other => Err(DocumentStoreError::InvalidDocument(format!("not a string: {other}"))),
        }
    }

    fn decode(&self, value: Bson) -> DocumentStoreResult<Bson> {
        self.encode(value)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Profile {
    #[serde(rename = "_id")]
    id: DocumentId,
    secret: String,
    attributes: BTreeMap<String, String>,
}

impl NamedDocument for Profile {
    fn collection_name() -> &'static str {
        "profiles"
    }
}

fn init() {
    registry::initialize(|registrar| {
        let mut accessor = Accessor::<Profile>::new();
        assert!(accessor.add_search_filter("secret", "abc", Comparison::Equals));
        registry::register_convention_pack("escape", vec![Convention::EscapeReservedKeys]);

        assert!(registrar.register_convention_pack("keys", vec![Convention::EscapeReservedKeys]));
        assert!(!registrar.register_convention_pack("keys", vec![Convention::EscapeReservedKeys]));
        assert!(registrar.register_field_codec("secret", Reversed));
    });
}

#[tokio::test]
async fn documents_pass_through_the_registry_both_ways() {
    init();
    assert!(registry::is_initialized());

    let profile = Profile {
        id: DocumentId::create(IdKind::Integer),
        secret: "abc".into(),
        attributes: BTreeMap::from([("site.name".to_string(), "$home".to_string())]),
    };

    let store = DocumentStore::new(InMemoryStore::new());
    let profiles = store.typed_collection::<Profile>();
    profiles.add(&profile).await.unwrap();

    let raw = store
        .backend()
        .find(&Fragments::default(), &ReadOptions::default(), "profiles")
        .await
        .unwrap();
    assert_eq!(raw[0].get_str("secret").unwrap(), "cba");
    let attributes = raw[0].get_document("attributes").unwrap();
    assert_eq!(attributes.get_str("site__dot__name").unwrap(), "$home");

    let mut accessor = Accessor::new();
    assert!(accessor.add_search_filter("secret", "abc", Comparison::Equals));
    assert_eq!(profiles.get(&accessor).await.unwrap(), Some(profile));
}

#[tokio::test]
async fn subdocument_operands_use_the_stored_key_form() {
    init();

    let profile = Profile {
        id: DocumentId::create(IdKind::Integer),
        secret: "xyz".into(),
        attributes: BTreeMap::from([("site.name".to_string(), "home".to_string())]),
    };
    let store = DocumentStore::new(InMemoryStore::new());
    let profiles = store.typed_collection::<Profile>();
    profiles.add(&profile).await.unwrap();

    let mut by_attributes = Accessor::new();
    assert!(by_attributes.add_search_filter("attributes", doc! { "site.name": "home" }, Comparison::Equals));
    assert_eq!(profiles.get(&by_attributes).await.unwrap(), Some(profile.clone()));

    let mut by_id = Accessor::new();
    by_id.add_search_filter_by_id(&profile.id, Comparison::Equals);
    let mut update = by_id.clone();
    assert!(update.add_operation("attributes", doc! { "x.y": "$z" }, UpdateOperator::AddOrOverwrite));
    profiles.update(&update).await.unwrap();

    let raw = store
        .backend()
        .find(by_id.fragments(), &ReadOptions::default(), "profiles")
        .await
        .unwrap();
    assert_eq!(raw[0].get_document("attributes").unwrap(), &doc! { "x__dot__y": "$z" });

    let stored = profiles.get(&by_id).await.unwrap().unwrap();
    assert_eq!(stored.attributes, BTreeMap::from([("x.y".to_string(), "$z".to_string())]));
}

#[tokio::test]
async fn array_element_replacements_use_the_stored_key_form() {
    init();

    let store = DocumentStore::new(InMemoryStore::new());
    let raw = store.collection::<bson::Document>("Entries");
    let element = DocumentId::Integer(1);
    raw.add(&doc! { "_id": 10_i64, "items": [ { "_id": &element, "a.b": 1 } ] })
        .await
        .unwrap();

    let mut accessor = Accessor::<bson::Document>::new();
    accessor.add_search_filter_by_id(&DocumentId::Integer(10), Comparison::Equals);
    assert!(accessor.add_operation_in_array(
        &ArrayNameElementId::new("items", element),
        doc! { "_id": &element, "a.b": 2 },
        UpdateOperator::AddOrOverwrite,
    ));
    raw.update(&accessor).await.unwrap();

    let stored = store
        .backend()
        .find(&Fragments::default(), &ReadOptions::default(), "entries")
        .await
        .unwrap();
    assert_eq!(stored[0].get_array("items").unwrap()[0], Bson::Document(doc! { "_id": 1_i64, "a__dot__b": 2 }));
}

#[tokio::test]
async fn a_rejected_operand_leaves_the_accessor_untouched() {
    init();

    let mut accessor = Accessor::<Profile>::new();
    assert!(!accessor.add_search_filter("secret", 5, Comparison::Equals));
    assert!(!accessor.add_operation("secret", 5, UpdateOperator::AddOrOverwrite));
    assert!(!accessor.has_search_filters());
    assert!(!accessor.has_updates());
}

#[test]
fn initialization_runs_once() {
    init();
    assert!(!registry::initialize(|_| panic!("ran twice")));
}
