//! Filter evaluation for in-memory documents.
//!
//! Follows MongoDB's matching rules closely enough for the operator vocabulary: dotted paths
//! descend through nested documents and fan out over arrays, a comparison against an array
//! field matches if the array itself or any of its elements matches, and a missing field equals
//! `null`.

use std::{cmp::Ordering, collections::HashMap};

use bson::{Bson, Document, Timestamp, datetime::DateTime, oid::ObjectId};

use docbridge_core::{
    error::DocumentStoreError,
    query::{Comparison, FilterFragment, FilterVisitor},
};

#[derive(Debug)]
pub(crate) enum Comparable<'a> {
    Null,
    Bool(bool),
    Number(f64),
    DateTime(DateTime),
    ObjectId(ObjectId),
    String(&'a str),
    Timestamp(Timestamp),
    Array(Vec<Comparable<'a>>),
    Map(HashMap<&'a str, Comparable<'a>>),
    /// Binary, decimal, regex and the remaining types: equal only to an identical value, never
    /// ordered.
    Other(&'a Bson),
}

impl<'a> From<&'a Bson> for Comparable<'a> {
    fn from(bson: &'a Bson) -> Self {
        match bson {
            Bson::Null => Comparable::Null,
            Bson::Boolean(value) => Comparable::Bool(*value),
            Bson::Int32(value) => Comparable::Number(*value as f64),
            Bson::Int64(value) => Comparable::Number(*value as f64),
            Bson::Double(value) => Comparable::Number(*value),
            Bson::DateTime(value) => Comparable::DateTime(*value),
            Bson::ObjectId(value) => Comparable::ObjectId(*value),
            Bson::String(value) => Comparable::String(value),
            Bson::Timestamp(value) => Comparable::Timestamp(*value),
            Bson::Array(arr) => Comparable::Array(arr.iter().map(Comparable::from).collect()),
            Bson::Document(doc) => Comparable::Map(
                doc.iter()
                    .map(|(k, v)| (k.as_str(), Comparable::from(v)))
                    .collect(),
            ),
            other => Comparable::Other(other),
        }
    }
}

impl PartialEq for Comparable<'_> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Comparable::Null, Comparable::Null) => true,
            (Comparable::Bool(a), Comparable::Bool(b)) => a == b,
            (Comparable::Number(a), Comparable::Number(b)) => a == b,
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a == b,
            (Comparable::ObjectId(a), Comparable::ObjectId(b)) => a == b,
            (Comparable::String(a), Comparable::String(b)) => a == b,
            (Comparable::Timestamp(a), Comparable::Timestamp(b)) => a == b,
            (Comparable::Array(a), Comparable::Array(b)) => a == b,
            (Comparable::Map(a), Comparable::Map(b)) => a == b,
            (Comparable::Other(a), Comparable::Other(b)) => a == b,
            _ => false,
        }
    }
}

impl PartialOrd for Comparable<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Comparable::Bool(a), Comparable::Bool(b)) => a.partial_cmp(b),
            (Comparable::Number(a), Comparable::Number(b)) => a.partial_cmp(b),
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a.partial_cmp(b),
            (Comparable::ObjectId(a), Comparable::ObjectId(b)) => a.bytes().partial_cmp(&b.bytes()),
            (Comparable::String(a), Comparable::String(b)) => a.partial_cmp(b),
            (Comparable::Timestamp(a), Comparable::Timestamp(b)) => {
                (a.time, a.increment).partial_cmp(&(b.time, b.increment))
            }
            _ => None,
        }
    }
}

/// Collects every value reached by a dotted path. Intermediate arrays fan out over their elements
/// unless the next segment is a numeric index.
pub(crate) fn values_at<'a>(document: &'a Document, path: &str) -> Vec<&'a Bson> {
    let mut current: Vec<&Bson> = Vec::new();
    let mut segments = path.split('.');

    let Some(first) = segments.next() else {
        return current;
    };
    current.extend(document.get(first));

    for segment in segments {
        let mut next = Vec::new();
        for value in current {
            step(value, segment, &mut next);
        }
        current = next;
    }

    current
}

fn step<'a>(value: &'a Bson, segment: &str, out: &mut Vec<&'a Bson>) {
    match value {
        Bson::Document(doc) => out.extend(doc.get(segment)),
        Bson::Array(items) => match segment.parse::<usize>() {
            Ok(index) => out.extend(items.get(index)),
            Err(_) => {
                for item in items {
                    if let Bson::Document(doc) = item {
                        out.extend(doc.get(segment));
                    }
                }
            }
        },
        _ => {}
    }
}

/// Evaluates filter fragments against one document.
pub(crate) struct DocumentEvaluator<'a> {
    document: &'a Document,
}

impl<'a> DocumentEvaluator<'a> {
    pub fn new(document: &'a Document) -> Self {
        Self { document }
    }

    /// Whether the document satisfies every fragment.
    pub fn matches(document: &Document, fragments: &[FilterFragment]) -> bool {
        DocumentEvaluator::new(document)
            .visit_all(fragments)
            .unwrap_or(false)
    }

    fn any_candidate(&self, field: &str, mut predicate: impl FnMut(&Comparable<'_>) -> bool) -> bool {
        self.candidates(field)
            .iter()
            .any(|candidate| predicate(&Comparable::from(*candidate)))
    }

    /// The values at `field`, plus the elements of any array among them.
    fn candidates(&self, field: &str) -> Vec<&'a Bson> {
        let mut candidates = Vec::new();
        for value in values_at(self.document, field) {
            candidates.push(value);
            if let Bson::Array(items) = value {
                candidates.extend(items.iter());
            }
        }
        candidates
    }

    fn equals(&self, field: &str, value: &Bson) -> bool {
        if matches!(value, Bson::Null) && values_at(self.document, field).is_empty() {
            return true;
        }

        let expected = Comparable::from(value);
        self.any_candidate(field, |candidate| *candidate == expected)
    }

    fn ordered(&self, field: &str, value: &Bson, wanted: fn(Ordering) -> bool) -> bool {
        let expected = Comparable::from(value);
        self.any_candidate(field, |candidate| {
            candidate.partial_cmp(&expected).is_some_and(wanted)
        })
    }
}

impl FilterVisitor for DocumentEvaluator<'_> {
    type Output = bool;
    type Error = DocumentStoreError;

    fn visit_all(&mut self, fragments: &[FilterFragment]) -> Result<Self::Output, Self::Error> {
        for fragment in fragments {
            if !self.visit_fragment(fragment)? {
                return Ok(false);
            }
        }

        Ok(true)
    }

    fn visit_comparison(&mut self, field: &str, op: Comparison, value: &Bson) -> Result<Self::Output, Self::Error> {
        Ok(match op {
            Comparison::Equals => self.equals(field, value),
            Comparison::Differs => !self.equals(field, value),
            Comparison::Greater => self.ordered(field, value, Ordering::is_gt),
            Comparison::GreaterOrEquals => self.ordered(field, value, Ordering::is_ge),
            Comparison::Less => self.ordered(field, value, Ordering::is_lt),
            Comparison::LessOrEquals => self.ordered(field, value, Ordering::is_le),
            other => {
                return Err(DocumentStoreError::Backend(format!(
                    "{other:?} is not a value comparison"
                )));
            }
        })
    }

    fn visit_exists(&mut self, field: &str, should_exist: bool) -> Result<Self::Output, Self::Error> {
        Ok(!values_at(self.document, field).is_empty() == should_exist)
    }

    fn visit_set(&mut self, field: &str, values: &[Bson], contains: bool) -> Result<Self::Output, Self::Error> {
        let found = values.iter().any(|value| self.equals(field, value));
        Ok(found == contains)
    }

    fn visit_element_match(&mut self, field: &str, element: &[FilterFragment]) -> Result<Self::Output, Self::Error> {
        Ok(values_at(self.document, field)
            .into_iter()
            .filter_map(Bson::as_array)
            .flatten()
            .filter_map(Bson::as_document)
            .any(|item| DocumentEvaluator::matches(item, element)))
    }
}

#[cfg(test)]
mod tests {
    use bson::{Binary, Decimal128, doc, spec::BinarySubtype};
    use docbridge_core::{accessor::Accessor, id::DocumentId};

    use super::*;

    fn matches(document: &Document, accessor: &Accessor) -> bool {
        DocumentEvaluator::matches(document, accessor.fragments().filters())
    }

    fn filter(field: &str, value: impl Into<Bson>, op: Comparison) -> Accessor {
        let mut accessor = Accessor::new();
        assert!(accessor.add_search_filter(field, value, op));
        accessor
    }

    #[test]
    fn ordered_comparisons_need_matching_types() {
        let document = doc! { "age": 30, "name": "x" };

        assert!(matches(&document, &filter("age", 18i64, Comparison::Greater)));
        assert!(matches(&document, &filter("age", 30.0, Comparison::LessOrEquals)));
        assert!(!matches(&document, &filter("age", "18", Comparison::Greater)));
        assert!(!matches(&document, &filter("missing", 1, Comparison::Less)));
    }

    #[test]
    fn missing_fields_equal_null_and_differ_from_values() {
        let document = doc! { "a": 1 };

        assert!(matches(&document, &filter("b", Bson::Null, Comparison::Equals)));
        assert!(matches(&document, &filter("b", 5, Comparison::Differs)));
        assert!(!matches(&document, &filter("a", 1, Comparison::Differs)));
    }

    #[test]
    fn array_fields_match_any_element() {
        let document = doc! { "tags": ["red", "blue"], "lines": [ { "qty": 1 }, { "qty": 7 } ] };

        assert!(matches(&document, &filter("tags", "blue", Comparison::Equals)));
        assert!(matches(&document, &filter("lines.qty", 5, Comparison::Greater)));
        assert!(matches(&document, &filter("lines.1.qty", 7, Comparison::Equals)));

        let mut accessor = Accessor::new();
        accessor.add_search_filter_values("tags", ["green", "red"], Comparison::ContainsNot);
        assert!(!matches(&document, &accessor));
    }

    #[test]
    fn existence_follows_dotted_paths() {
        let document = doc! { "a": { "b": null } };

        let mut accessor = Accessor::new();
        accessor.add_search_filter_exists("a.b", Comparison::Exists);
        accessor.add_search_filter_exists("a.c", Comparison::ExistsNot);

        assert!(matches(&document, &accessor));
    }

    #[test]
    fn element_match_tests_each_element_separately() {
        let oid = ObjectId::new();
        let document = doc! { "lines": [ { "_id": oid, "qty": 1 }, { "_id": ObjectId::new(), "qty": 9 } ] };

        let mut by_id = Accessor::new();
        by_id.add_search_in_array_by_id_filter("lines", &DocumentId::Object(oid));
        assert!(matches(&document, &by_id));

        let mut element = Accessor::<Document>::new();
        element.add_search_filter_id("_id", &DocumentId::Object(oid), Comparison::Equals);
        element.add_search_filter("qty", 9, Comparison::Equals);
        let mut accessor = Accessor::new();
        accessor.add_search_in_array_filter("lines", &element);
        assert!(!matches(&document, &accessor));
    }

    #[test]
    fn opaque_types_only_equal_identical_values() {
        let binary = |bytes: Vec<u8>| Bson::Binary(Binary { subtype: BinarySubtype::Generic, bytes });
        let document = doc! {
            "blob": binary(vec![1]),
            "stamp": Timestamp { time: 5, increment: 1 },
            "amount": Decimal128::from_bytes([1; 16]),
        };

        assert!(matches(&document, &filter("blob", binary(vec![1]), Comparison::Equals)));
        assert!(!matches(&document, &filter("blob", binary(vec![2]), Comparison::Equals)));
        assert!(!matches(&document, &filter("blob", Bson::Null, Comparison::Equals)));
        assert!(!matches(&document, &filter("amount", Decimal128::from_bytes([2; 16]), Comparison::Equals)));
        assert!(!matches(&document, &filter("blob", binary(vec![0]), Comparison::Greater)));

        let stamp = |time| Timestamp { time, increment: 1 };
        assert!(!matches(&document, &filter("stamp", stamp(9), Comparison::Equals)));
        assert!(matches(&document, &filter("stamp", stamp(1), Comparison::Greater)));
    }

    #[test]
    fn empty_filter_matches_everything() {
        assert!(matches(&doc! {}, &Accessor::new()));
    }
}
