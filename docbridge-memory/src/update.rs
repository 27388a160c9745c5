//! Update application for in-memory documents.
//!
//! Interprets update fragments the way MongoDB's update operators behave: dotted paths create
//! missing intermediate documents, `$` addresses the array element the query matched, and
//! `$[name]` addresses every element its array filter matches. A failing fragment leaves the
//! document untouched.

use std::cmp::Ordering;

use bson::{Bson, Document, oid::ObjectId};

use docbridge_core::{
    error::{DocumentStoreError, DocumentStoreResult},
    query::{ArrayFilterFragment, Comparison, FilterFragment, Fragments, Numeric, Operand, UpdateFragment, UpdateOperand, UpdateOperator},
};

use crate::evaluator::{Comparable, DocumentEvaluator, values_at};

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Key(String),
    /// `$`
    Positional,
    /// `$[name]`
    Placeholder(String),
}

fn parse_path(path: &str) -> Vec<Segment> {
    path.split('.')
        .map(|segment| {
            if segment == "$" {
                Segment::Positional
            } else if let Some(name) = segment.strip_prefix("$[").and_then(|rest| rest.strip_suffix(']')) {
                Segment::Placeholder(name.to_string())
            } else {
                Segment::Key(segment.to_string())
            }
        })
        .collect()
}

#[derive(Debug, Clone)]
enum Target {
    Key(String),
    Index(usize),
}

/// Resolves positional segments of one update against the document it applies to.
struct Resolver<'a> {
    filters: &'a [FilterFragment],
    array_filters: &'a [ArrayFilterFragment],
    /// The unmodified document, used to find the element the query matched.
    original: &'a Document,
}

impl Resolver<'_> {
    /// Index of the first element of the array at `prefix` that the query's filters on that array
    /// accept.
    fn positional(&self, prefix: &str) -> DocumentStoreResult<usize> {
        let nested = format!("{prefix}.");
        let relevant: Vec<FilterFragment> = self
            .filters
            .iter()
            .filter(|fragment| fragment.field() == prefix || fragment.field().starts_with(&nested))
            .cloned()
            .collect();

        let items = match get_path(self.original, prefix) {
            Some(Bson::Array(items)) => items,
            _ => return Err(positional_error(prefix)),
        };
        if relevant.is_empty() {
            return Err(positional_error(prefix));
        }

        for index in 0..items.len() {
            let mut view = self.original.clone();
            if let Some(slot) = get_path_mut(&mut view, prefix) {
                *slot = Bson::Array(vec![items[index].clone()]);
            }
            if DocumentEvaluator::matches(&view, &relevant) {
                return Ok(index);
            }
        }

        Err(positional_error(prefix))
    }

    /// Whether `element` satisfies every array filter bound to `placeholder`.
    fn placeholder_accepts(&self, placeholder: &str, element: &Bson) -> DocumentStoreResult<bool> {
        let bound: Vec<&ArrayFilterFragment> = self
            .array_filters
            .iter()
            .filter(|filter| filter.placeholder() == placeholder)
            .collect();

        if bound.is_empty() {
            return Err(DocumentStoreError::Backend(format!(
                "no array filter found for identifier '{placeholder}'"
            )));
        }

        let Bson::Document(element) = element else {
            return Ok(false);
        };

        Ok(bound.iter().all(|filter| {
            let expected = Comparable::from(filter.value());
            values_at(element, filter.field())
                .into_iter()
                .any(|value| Comparable::from(value) == expected)
        }))
    }
}

fn positional_error(prefix: &str) -> DocumentStoreError {
    DocumentStoreError::Backend(format!(
        "the positional operator did not find the match needed from the query for '{prefix}'"
    ))
}

/// Applies every update fragment of `fragments` to `document`, in order.
///
/// Returns whether the document changed. On error the document is left as it was.
pub(crate) fn apply_updates(document: &mut Document, fragments: &Fragments) -> DocumentStoreResult<bool> {
    let original = document.clone();
    let resolver = Resolver {
        filters: fragments.filters(),
        array_filters: fragments.array_filters(),
        original: &original,
    };

    let mut working = Bson::Document(document.clone());
    let mut modified = false;
    for update in fragments.updates() {
        modified |= apply_update(&mut working, update, &resolver)?;
    }

    if let Bson::Document(updated) = working {
        *document = updated;
    }

    Ok(modified)
}

fn apply_update(root: &mut Bson, update: &UpdateFragment, resolver: &Resolver<'_>) -> DocumentStoreResult<bool> {
    let segments = parse_path(update.field());
    let creates = !matches!(
        update.op(),
        UpdateOperator::Remove
            | UpdateOperator::RemoveFirstFromArray
            | UpdateOperator::RemoveLastFromArray
            | UpdateOperator::RemoveFromArray
    );

    walk(root, &segments, &mut Vec::new(), creates, resolver, &mut |parent, target| {
        apply_leaf(parent, target, update)
    })
}

fn walk(
    node: &mut Bson,
    segments: &[Segment],
    prefix: &mut Vec<String>,
    creates: bool,
    resolver: &Resolver<'_>,
    leaf: &mut dyn FnMut(&mut Bson, &Target) -> DocumentStoreResult<bool>,
) -> DocumentStoreResult<bool> {
    let Some((segment, rest)) = segments.split_first() else {
        return Ok(false);
    };

    let targets = resolve(node, segment, prefix, resolver)?;
    let mut modified = false;

    for target in targets {
        if rest.is_empty() {
            modified |= leaf(node, &target)?;
            continue;
        }

        let Some(child) = child_mut(node, &target, creates)? else {
            continue;
        };

        prefix.push(match &target {
            Target::Key(key) => key.clone(),
            Target::Index(index) => index.to_string(),
        });
        let result = walk(child, rest, prefix, creates, resolver, leaf);
        prefix.pop();
        modified |= result?;
    }

    Ok(modified)
}

fn resolve(
    node: &Bson,
    segment: &Segment,
    prefix: &[String],
    resolver: &Resolver<'_>,
) -> DocumentStoreResult<Vec<Target>> {
    match (segment, node) {
        (Segment::Key(key), Bson::Array(_)) => key
            .parse::<usize>()
            .map(|index| vec![Target::Index(index)])
            .map_err(|_| cannot_create(key, prefix)),
        (Segment::Key(key), _) => Ok(vec![Target::Key(key.clone())]),
        (Segment::Positional, Bson::Array(_)) => {
            Ok(vec![Target::Index(resolver.positional(&prefix.join("."))?)])
        }
        (Segment::Placeholder(name), Bson::Array(items)) => {
            let mut targets = Vec::new();
            for (index, item) in items.iter().enumerate() {
                if resolver.placeholder_accepts(name, item)? {
                    targets.push(Target::Index(index));
                }
            }
            Ok(targets)
        }
        (_, _) => Err(DocumentStoreError::Backend(format!(
            "positional operator applied to non-array field '{}'",
            prefix.join(".")
        ))),
    }
}

fn cannot_create(key: &str, prefix: &[String]) -> DocumentStoreError {
    DocumentStoreError::Backend(format!(
        "cannot create field '{key}' in array '{}'",
        prefix.join(".")
    ))
}

fn child_mut<'n>(node: &'n mut Bson, target: &Target, creates: bool) -> DocumentStoreResult<Option<&'n mut Bson>> {
    match (node, target) {
        (Bson::Document(doc), Target::Key(key)) => {
            if !doc.contains_key(key) {
                if !creates {
                    return Ok(None);
                }
                doc.insert(key.clone(), Document::new());
            }
            Ok(doc.get_mut(key))
        }
        (Bson::Array(items), Target::Index(index)) => Ok(items.get_mut(*index)),
        (other, _) => Err(DocumentStoreError::Backend(format!(
            "cannot traverse into a {:?} value",
            other.element_type()
        ))),
    }
}

fn current<'n>(parent: &'n Bson, target: &Target) -> Option<&'n Bson> {
    match (parent, target) {
        (Bson::Document(doc), Target::Key(key)) => doc.get(key),
        (Bson::Array(items), Target::Index(index)) => items.get(*index),
        _ => None,
    }
}

fn set(parent: &mut Bson, target: &Target, value: Bson) -> DocumentStoreResult<()> {
    match (parent, target) {
        (Bson::Document(doc), Target::Key(key)) => {
            doc.insert(key.clone(), value);
            Ok(())
        }
        (Bson::Array(items), Target::Index(index)) => {
            if *index >= items.len() {
                items.resize(*index + 1, Bson::Null);
            }
            items[*index] = value;
            Ok(())
        }
        (other, _) => Err(DocumentStoreError::Backend(format!(
            "cannot set a field on a {:?} value",
            other.element_type()
        ))),
    }
}

fn unset(parent: &mut Bson, target: &Target) -> bool {
    match (parent, target) {
        (Bson::Document(doc), Target::Key(key)) => doc.remove(key).is_some(),
        // Unsetting an array element leaves a null in its place.
        (Bson::Array(items), Target::Index(index)) => match items.get_mut(*index) {
            Some(slot) if *slot != Bson::Null => {
                *slot = Bson::Null;
                true
            }
            _ => false,
        },
        _ => false,
    }
}

fn apply_leaf(parent: &mut Bson, target: &Target, update: &UpdateFragment) -> DocumentStoreResult<bool> {
    let existing = current(parent, target).cloned();

    let replacement = match (update.op(), update.operand()) {
        (UpdateOperator::Remove, _) => return Ok(unset(parent, target)),
        (UpdateOperator::AddOrOverwrite, UpdateOperand::Value(value)) => Some(value.clone()),
        (UpdateOperator::AddIfNotExist, UpdateOperand::Value(value)) => {
            let mut items = array_or_empty(existing.as_ref(), update)?;
            if items.iter().any(|item| Comparable::from(item) == Comparable::from(value)) {
                None
            } else {
                items.push(value.clone());
                Some(Bson::Array(items))
            }
        }
        (UpdateOperator::AddToArray, UpdateOperand::Value(value)) => {
            let mut items = array_or_empty(existing.as_ref(), update)?;
            items.push(value.clone());
            Some(Bson::Array(items))
        }
        (UpdateOperator::OverwriteIfGreater, UpdateOperand::Value(value)) => {
            keep_extreme(existing.as_ref(), value, Ordering::Greater)
        }
        (UpdateOperator::OverwriteIfLower, UpdateOperand::Value(value)) => {
            keep_extreme(existing.as_ref(), value, Ordering::Less)
        }
        (UpdateOperator::IncrementNumericalValue, UpdateOperand::Numeric(operand)) => {
            Some(arithmetic(existing.as_ref(), *operand, update, Arithmetic::Add)?)
        }
        (UpdateOperator::MultiplyNumericalValue, UpdateOperand::Numeric(operand)) => {
            Some(arithmetic(existing.as_ref(), *operand, update, Arithmetic::Multiply)?)
        }
        (UpdateOperator::RemoveFirstFromArray, _) | (UpdateOperator::RemoveLastFromArray, _) => {
            match existing.clone() {
                None => None,
                Some(Bson::Array(mut items)) if !items.is_empty() => {
                    if update.op() == UpdateOperator::RemoveFirstFromArray {
                        items.remove(0);
                    } else {
                        items.pop();
                    }
                    Some(Bson::Array(items))
                }
                Some(Bson::Array(_)) => None,
                Some(_) => return Err(not_an_array(update)),
            }
        }
        (UpdateOperator::RemoveFromArray, operand) => match existing.clone() {
            None => None,
            Some(Bson::Array(items)) => {
                let before = items.len();
                let kept: Vec<Bson> = items
                    .into_iter()
                    .filter(|item| !pull_matches(item, operand))
                    .collect();
                (kept.len() != before).then_some(Bson::Array(kept))
            }
            Some(_) => return Err(not_an_array(update)),
        },
        (op, operand) => {
            return Err(DocumentStoreError::Backend(format!(
                "{op:?} cannot take operand {operand:?}"
            )));
        }
    };

    match replacement {
        Some(value) if existing.as_ref() != Some(&value) => {
            set(parent, target, value)?;
            Ok(true)
        }
        _ => Ok(false),
    }
}

fn array_or_empty(existing: Option<&Bson>, update: &UpdateFragment) -> DocumentStoreResult<Vec<Bson>> {
    match existing {
        None => Ok(Vec::new()),
        Some(Bson::Array(items)) => Ok(items.clone()),
        Some(_) => Err(not_an_array(update)),
    }
}

fn not_an_array(update: &UpdateFragment) -> DocumentStoreError {
    DocumentStoreError::Backend(format!(
        "{:?} requires '{}' to be an array",
        update.op(),
        update.field()
    ))
}

fn pull_matches(item: &Bson, operand: &UpdateOperand) -> bool {
    match (operand, item) {
        (UpdateOperand::Value(value), _) => Comparable::from(item) == Comparable::from(value),
        (UpdateOperand::Matching(element), Bson::Document(doc)) => DocumentEvaluator::matches(doc, element),
        _ => false,
    }
}

fn keep_extreme(existing: Option<&Bson>, value: &Bson, wanted: Ordering) -> Option<Bson> {
    match existing {
        None => Some(value.clone()),
        Some(current) => match Comparable::from(value).partial_cmp(&Comparable::from(current)) {
            Some(ordering) if ordering == wanted => Some(value.clone()),
            _ => None,
        },
    }
}

#[derive(Clone, Copy)]
enum Arithmetic {
    Add,
    Multiply,
}

fn arithmetic(
    existing: Option<&Bson>,
    operand: Numeric,
    update: &UpdateFragment,
    kind: Arithmetic,
) -> DocumentStoreResult<Bson> {
    let overflow = || DocumentStoreError::Backend(format!("integer overflow updating '{}'", update.field()));

    // A missing field starts from zero of the operand's type; multiplying it stays zero.
    let current = match existing {
        Some(value) => value.clone(),
        None => {
            let zero = match operand {
                Numeric::Int32(_) => Bson::Int32(0),
                Numeric::Int64(_) => Bson::Int64(0),
                Numeric::Double(_) => Bson::Double(0.0),
            };
            if matches!(kind, Arithmetic::Multiply) {
                return Ok(zero);
            }
            zero
        }
    };

    Ok(match (current, operand) {
        (Bson::Double(a), b) => Bson::Double(float_op(a, numeric_f64(b), kind)),
        (Bson::Int32(a), Numeric::Double(b)) => Bson::Double(float_op(f64::from(a), b, kind)),
        (Bson::Int64(a), Numeric::Double(b)) => Bson::Double(float_op(a as f64, b, kind)),
        (Bson::Int32(a), Numeric::Int32(b)) => match int32_op(a, b, kind) {
            Some(value) => Bson::Int32(value),
            None => Bson::Int64(int64_op(i64::from(a), i64::from(b), kind).ok_or_else(overflow)?),
        },
        (Bson::Int32(a), Numeric::Int64(b)) => {
            Bson::Int64(int64_op(i64::from(a), b, kind).ok_or_else(overflow)?)
        }
        (Bson::Int64(a), Numeric::Int32(b)) => {
            Bson::Int64(int64_op(a, i64::from(b), kind).ok_or_else(overflow)?)
        }
        (Bson::Int64(a), Numeric::Int64(b)) => Bson::Int64(int64_op(a, b, kind).ok_or_else(overflow)?),
        (other, _) => {
            return Err(DocumentStoreError::Backend(format!(
                "cannot apply {:?} to a non-numeric {:?} field '{}'",
                update.op(),
                other.element_type(),
                update.field()
            )));
        }
    })
}

fn numeric_f64(value: Numeric) -> f64 {
    match value {
        Numeric::Int32(v) => f64::from(v),
        Numeric::Int64(v) => v as f64,
        Numeric::Double(v) => v,
    }
}

fn float_op(a: f64, b: f64, kind: Arithmetic) -> f64 {
    match kind {
        Arithmetic::Add => a + b,
        Arithmetic::Multiply => a * b,
    }
}

fn int32_op(a: i32, b: i32, kind: Arithmetic) -> Option<i32> {
    match kind {
        Arithmetic::Add => a.checked_add(b),
        Arithmetic::Multiply => a.checked_mul(b),
    }
}

fn int64_op(a: i64, b: i64, kind: Arithmetic) -> Option<i64> {
    match kind {
        Arithmetic::Add => a.checked_add(b),
        Arithmetic::Multiply => a.checked_mul(b),
    }
}

/// Builds the document an upsert inserts: the equality conditions of the filter, with the updates
/// applied on top and a fresh object id when none was given.
pub(crate) fn upsert_seed(fragments: &Fragments) -> DocumentStoreResult<Document> {
    let mut seed = Document::new();

    for fragment in fragments.filters() {
        if let (Comparison::Equals, Operand::Value(value)) = (fragment.op(), fragment.operand()) {
            let mut root = Bson::Document(seed);
            let segments = parse_path(fragment.field());
            let resolver = Resolver { filters: &[], array_filters: &[], original: &Document::new() };
            walk(&mut root, &segments, &mut Vec::new(), true, &resolver, &mut |parent, target| {
                set(parent, target, value.clone()).map(|_| true)
            })?;
            seed = match root {
                Bson::Document(seed) => seed,
                _ => Document::new(),
            };
        }
    }

    apply_updates(&mut seed, fragments)?;

    if !seed.contains_key("_id") {
        let mut with_id = Document::new();
        with_id.insert("_id", ObjectId::new());
        with_id.extend(seed);
        seed = with_id;
    }

    Ok(seed)
}

/// Reads the value at a dotted path of nested documents and array indexes.
fn get_path<'d>(document: &'d Document, path: &str) -> Option<&'d Bson> {
    let mut segments = path.split('.');
    let mut value = document.get(segments.next()?)?;
    for segment in segments {
        value = match value {
            Bson::Document(doc) => doc.get(segment)?,
            Bson::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(value)
}

fn get_path_mut<'d>(document: &'d mut Document, path: &str) -> Option<&'d mut Bson> {
    let mut segments = path.split('.');
    let mut value = document.get_mut(segments.next()?)?;
    for segment in segments {
        value = match value {
            Bson::Document(doc) => doc.get_mut(segment)?,
            Bson::Array(items) => items.get_mut(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(value)
}

#[cfg(test)]
mod tests {
    use bson::{Binary, doc, spec::BinarySubtype};
    use docbridge_core::{accessor::Accessor, id::{ArrayNameElementId, DocumentId}};

    use super::*;

    fn apply(document: &mut Document, accessor: &Accessor) -> DocumentStoreResult<bool> {
        apply_updates(document, accessor.fragments())
    }

    #[test]
    fn set_creates_intermediate_documents() {
        let mut document = doc! { "_id": 1 };
        let mut accessor = Accessor::new();
        accessor.add_operation("profile.address.city", "Oslo", UpdateOperator::AddOrOverwrite);

        assert!(apply(&mut document, &accessor).unwrap());
        assert_eq!(document, doc! { "_id": 1, "profile": { "address": { "city": "Oslo" } } });
    }

    #[test]
    fn unchanged_values_do_not_count_as_modified() {
        let mut document = doc! { "name": "a", "score": 10 };
        let mut accessor = Accessor::new();
        accessor.add_operation("name", "a", UpdateOperator::AddOrOverwrite);
        accessor.add_operation("score", 5, UpdateOperator::OverwriteIfGreater);
        accessor.add_operation("missing", Bson::Null, UpdateOperator::Remove);

        assert!(!apply(&mut document, &accessor).unwrap());
    }

    #[test]
    fn max_and_min_only_move_in_one_direction() {
        let mut document = doc! { "high": 10, "low": 10 };
        let mut accessor = Accessor::new();
        accessor.add_operation("high", 12, UpdateOperator::OverwriteIfGreater);
        accessor.add_operation("low", 12, UpdateOperator::OverwriteIfLower);
        accessor.add_operation("fresh", 3, UpdateOperator::OverwriteIfLower);

        apply(&mut document, &accessor).unwrap();
        assert_eq!(document, doc! { "high": 12, "low": 10, "fresh": 3 });
    }

    #[test]
    fn arithmetic_promotes_types() {
        let mut document = doc! { "small": i32::MAX, "ratio": 2, "count": 1i64 };
        let mut accessor = Accessor::new();
        accessor.add_operation("small", 1, UpdateOperator::IncrementNumericalValue);
        accessor.add_operation("ratio", 1.5, UpdateOperator::MultiplyNumericalValue);
        accessor.add_operation("count", 2, UpdateOperator::IncrementNumericalValue);
        accessor.add_operation("absent", 4, UpdateOperator::MultiplyNumericalValue);
        accessor.add_operation("started", 4, UpdateOperator::IncrementNumericalValue);

        apply(&mut document, &accessor).unwrap();
        assert_eq!(
            document,
            doc! {
                "small": i32::MAX as i64 + 1,
                "ratio": 3.0,
                "count": 3i64,
                "absent": 0,
                "started": 4,
            }
        );
    }

    #[test]
    fn arithmetic_on_a_string_fails_without_partial_changes() {
        let mut document = doc! { "a": 1, "name": "x" };
        let mut accessor = Accessor::new();
        accessor.add_operation("a", 2, UpdateOperator::AddOrOverwrite);
        accessor.add_operation("name", 1, UpdateOperator::IncrementNumericalValue);

        assert!(apply(&mut document, &accessor).is_err());
        assert_eq!(document, doc! { "a": 1, "name": "x" });
    }

    #[test]
    fn array_operators() {
        let mut document = doc! { "tags": ["a", "b", "c"], "queue": [1, 2, 3] };
        let mut accessor = Accessor::new();
        accessor.add_operation("tags", "a", UpdateOperator::AddIfNotExist);
        accessor.add_operation("tags", "d", UpdateOperator::AddToArray);
        accessor.add_operation("tags", "b", UpdateOperator::RemoveFromArray);
        accessor.add_operation("queue", Bson::Null, UpdateOperator::RemoveFirstFromArray);
        accessor.add_operation("fresh", "x", UpdateOperator::AddIfNotExist);

        apply(&mut document, &accessor).unwrap();
        assert_eq!(document, doc! { "tags": ["a", "c", "d"], "queue": [2, 3], "fresh": ["x"] });
    }

    #[test]
    fn binary_elements_are_compared_by_content() {
        let blob = |byte: u8| Bson::Binary(Binary { subtype: BinarySubtype::Generic, bytes: vec![byte] });
        let mut document = doc! { "blobs": [blob(1), blob(2)] };
        let mut accessor = Accessor::new();
        accessor.add_operation("blobs", blob(3), UpdateOperator::AddIfNotExist);
        accessor.add_operation("blobs", blob(1), UpdateOperator::RemoveFromArray);

        assert!(apply(&mut document, &accessor).unwrap());
        assert_eq!(document, doc! { "blobs": [blob(2), blob(3)] });
    }

    #[test]
    fn pull_by_id_removes_matching_elements() {
        let keep = ObjectId::new();
        let drop = ObjectId::new();
        let mut document = doc! { "lines": [ { "_id": keep }, { "_id": drop } ] };
        let mut accessor = Accessor::new();
        accessor.add_operation_remove_from_array_by_id("lines", &DocumentId::Object(drop));

        assert!(apply(&mut document, &accessor).unwrap());
        assert_eq!(document, doc! { "lines": [ { "_id": keep } ] });
    }

    #[test]
    fn placeholder_replaces_the_identified_element() {
        let target = ObjectId::new();
        let other = ObjectId::new();
        let mut document = doc! { "lines": [ { "_id": other, "qty": 1 }, { "_id": target, "qty": 1 } ] };

        let mut accessor = Accessor::new();
        accessor.add_operation_in_array(
            &ArrayNameElementId::new("lines", DocumentId::Object(target)),
            doc! { "_id": target, "qty": 5 },
            UpdateOperator::AddOrOverwrite,
        );

        assert!(apply(&mut document, &accessor).unwrap());
        assert_eq!(
            document,
            doc! { "lines": [ { "_id": other, "qty": 1 }, { "_id": target, "qty": 5 } ] }
        );
    }

    #[test]
    fn nested_placeholders_reach_the_inner_element() {
        let outer = ObjectId::new();
        let inner = ObjectId::new();
        let mut document = doc! {
            "items": [
                { "_id": outer, "items": [ { "_id": inner, "n": 1 }, { "_id": ObjectId::new(), "n": 1 } ] },
            ]
        };

        let mut accessor = Accessor::new();
        accessor.add_operation_in_nested_array(
            &ArrayNameElementId::new("items", DocumentId::Object(outer)),
            &ArrayNameElementId::new("items", DocumentId::Object(inner)),
            doc! { "_id": inner, "n": 2 },
            UpdateOperator::AddOrOverwrite,
        );

        apply(&mut document, &accessor).unwrap();
        let outer_items = document.get_array("items").unwrap()[0].as_document().unwrap();
        let inner_items = outer_items.get_array("items").unwrap();
        assert_eq!(inner_items[0].as_document().unwrap().get_i32("n").unwrap(), 2);
        assert_eq!(inner_items[1].as_document().unwrap().get_i32("n").unwrap(), 1);
    }

    #[test]
    fn positional_operator_uses_the_query_match() {
        let target = ObjectId::new();
        let mut document = doc! { "lines": [ { "_id": ObjectId::new(), "qty": 1 }, { "_id": target, "qty": 1 } ] };

        let mut accessor = Accessor::new();
        accessor.add_search_in_array_by_id_filter("lines", &DocumentId::Object(target));
        accessor.add_operation("lines.$.qty", 9, UpdateOperator::AddOrOverwrite);

        apply(&mut document, &accessor).unwrap();
        let lines = document.get_array("lines").unwrap();
        assert_eq!(lines[0].as_document().unwrap().get_i32("qty").unwrap(), 1);
        assert_eq!(lines[1].as_document().unwrap().get_i32("qty").unwrap(), 9);
    }

    #[test]
    fn positional_operator_without_a_query_match_fails() {
        let mut document = doc! { "lines": [ { "qty": 1 } ] };
        let mut accessor = Accessor::new();
        accessor.add_operation("lines.$.qty", 9, UpdateOperator::AddOrOverwrite);

        assert!(apply(&mut document, &accessor).is_err());
    }

    #[test]
    fn removing_from_a_missing_array_is_a_no_op() {
        let mut document = doc! { "a": 1 };
        let mut accessor = Accessor::new();
        accessor.add_operation("lines", 1, UpdateOperator::RemoveFromArray);
        accessor.add_operation("x.y", Bson::Null, UpdateOperator::RemoveLastFromArray);

        assert!(!apply(&mut document, &accessor).unwrap());
        assert_eq!(document, doc! { "a": 1 });
    }

    #[test]
    fn upsert_seed_combines_equalities_and_updates() {
        let mut accessor = Accessor::<Document>::new();
        accessor.add_search_filter("account.region", "eu", Comparison::Equals);
        accessor.add_search_filter("score", 3, Comparison::Greater);
        accessor.add_operation("visits", 1, UpdateOperator::IncrementNumericalValue);

        let seed = upsert_seed(accessor.fragments()).unwrap();
        assert!(seed.get_object_id("_id").is_ok());
        assert_eq!(seed.get_document("account").unwrap(), &doc! { "region": "eu" });
        assert_eq!(seed.get_i32("visits").unwrap(), 1);
        assert!(!seed.contains_key("score"));
    }
}
