//! The filter + update builder.
//!
//! An [`Accessor`] accumulates search filters, field updates and positional array filters in
//! insertion order. Every `add_*` call validates its operator first and either records exactly
//! one logical fragment (returning `true`) or records nothing (returning `false`). Only
//! [`reset`](Accessor::reset) removes fragments.
//!
//! Path-string entry points take any `Into<Bson>` value. Typed entry points (suffix `_on`) take a
//! [`Field`] handle and a serializable value, and accept a narrower operator set.
//!
//! # Example
//!
//! ```ignore
//! use docbridge::prelude::*;
//!
//! let mut accessor = Accessor::<Order>::new();
//! accessor.add_search_filter_by_id(&order_id, Comparison::Equals);
//! accessor.add_operation("status", "shipped", UpdateOperator::AddOrOverwrite);
//! accessor.add_operation_in_array(
//!     &ArrayNameElementId::new("lines", line_id),
//!     7,
//!     UpdateOperator::AddOrOverwrite,
//! );
//!
//! orders.update(&accessor).await?;
//! ```

use std::{fmt, marker::PhantomData};

use bson::{Bson, ser::serialize_to_bson};
use serde::Serialize;

use crate::{
    field::Field,
    id::{ArrayNameElementId, DocumentId},
    query::{
        ArrayFilterFragment, Comparison, FilterFragment, Fragments, Numeric, UpdateFragment,
        UpdateOperand, UpdateOperator,
    },
    registry,
};

const ID_FIELD: &str = "_id";
const ELEMENT: &str = "elem";
const OUTER_ELEMENT: &str = "elema";
const INNER_ELEMENT: &str = "elemb";

/// Accumulates filter, update and array-filter fragments for documents of type `T`.
///
/// Not meant to be shared between tasks while it is being built: build it, hand it to a
/// collection operation by reference, then reset or drop it.
pub struct Accessor<T = bson::Document> {
    fragments: Fragments,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Accessor<T> {
    pub fn new() -> Self {
        Self { fragments: Fragments::default(), _marker: PhantomData }
    }

    /// Clears every filter, update and array-filter fragment.
    pub fn reset(&mut self) {
        self.fragments.clear();
    }

    pub fn has_updates(&self) -> bool {
        !self.fragments.updates().is_empty()
    }

    pub fn has_search_filters(&self) -> bool {
        !self.fragments.filters().is_empty()
    }

    pub fn has_array_updates(&self) -> bool {
        !self.fragments.array_filters().is_empty()
    }

    /// The accumulated fragments, read by backends when an operation executes.
    pub fn fragments(&self) -> &Fragments {
        &self.fragments
    }

    // --- search filters ------------------------------------------------------------------

    /// Filters on the document id. `Contains` / `ContainsNot` are rejected.
    pub fn add_search_filter_by_id(&mut self, id: &DocumentId, op: Comparison) -> bool {
        self.add_search_filter_id(ID_FIELD, id, op)
    }

    /// Filters `field` against an id compiled to its native representation.
    pub fn add_search_filter_id(&mut self, field: &str, id: &DocumentId, op: Comparison) -> bool {
        self.push_single(field, id.to_bson(), op)
    }

    /// Filters `field` against a set of ids compiled to their native representation.
    pub fn add_search_filter_ids<'a, I>(&mut self, field: &str, ids: I, op: Comparison) -> bool
    where
        I: IntoIterator<Item = &'a DocumentId>,
    {
        self.push_values(field, ids.into_iter().map(DocumentId::to_bson).collect(), op)
    }

    /// Compares `field` with a single value.
    ///
    /// Accepts `Equals`, `Differs`, `Greater`, `Less`, `GreaterOrEquals`, `LessOrEquals`, and
    /// `Exists` / `ExistsNot` (the value is then ignored).
    pub fn add_search_filter(&mut self, field: &str, value: impl Into<Bson>, op: Comparison) -> bool {
        match registry::encode_value(field, value.into()) {
            Some(value) => self.push_single(field, value, op),
            None => false,
        }
    }

    /// Compares `field` with a set of values.
    ///
    /// `Contains` / `ContainsNot` / `Exists` / `ExistsNot` apply to the whole set. Any other
    /// operator applies the single value rules to the first element. An empty set is rejected
    /// unless the operator is `Exists` / `ExistsNot`.
    pub fn add_search_filter_values<I, V>(&mut self, field: &str, values: I, op: Comparison) -> bool
    where
        I: IntoIterator<Item = V>,
        V: Into<Bson>,
    {
        let values: Option<Vec<Bson>> = values
            .into_iter()
            .map(|value| registry::encode_value(field, value.into()))
            .collect();

        match values {
            Some(values) => self.push_values(field, values, op),
            None => false,
        }
    }

    /// Existence check on `field`. Only `Exists` / `ExistsNot` are accepted.
    pub fn add_search_filter_exists(&mut self, field: &str, op: Comparison) -> bool {
        if !op.is_existence() {
            return false;
        }

        self.fragments
            .push_filter(FilterFragment::exists(field, op == Comparison::Exists));
        true
    }

    /// Matches documents whose `array_field` holds an element with the given `_id`.
    pub fn add_search_in_array_by_id_filter(&mut self, array_field: &str, id: &DocumentId) -> bool {
        let element = FilterFragment::compare(ID_FIELD, Comparison::Equals, id.to_bson());
        self.fragments
            .push_filter(FilterFragment::element_match(array_field, vec![element]));
        true
    }

    /// Matches documents whose `array_field` holds an element satisfying every search filter of
    /// `element`. Rejected when `element` has no search filters.
    pub fn add_search_in_array_filter<E>(&mut self, array_field: &str, element: &Accessor<E>) -> bool {
        if !element.has_search_filters() {
            return false;
        }

        self.fragments.push_filter(FilterFragment::element_match(
            array_field,
            element.fragments.filters().to_vec(),
        ));
        true
    }

    /// Typed single-value comparison: `Equals`, `Differs`, `Greater`, `Less`, `GreaterOrEquals`,
    /// `LessOrEquals`.
    pub fn add_search_filter_on<V: Serialize>(&mut self, field: Field<T, V>, value: &V, op: Comparison) -> bool {
        if !op.is_value_comparison() {
            return false;
        }

        match typed_value(field.path(), value) {
            Some(value) => self.push_single(field.path(), value, op),
            None => false,
        }
    }

    /// Typed value-set comparison. `Contains` / `ContainsNot` apply to the whole set, any other
    /// operator to the first element. An empty set is always rejected.
    pub fn add_search_filter_values_on<V: Serialize>(
        &mut self,
        field: Field<T, V>,
        values: &[V],
        op: Comparison,
    ) -> bool {
        let Some(first) = values.first() else {
            return false;
        };

        if !op.is_membership() {
            return self.add_search_filter_on(field, first, op);
        }

        let values: Option<Vec<Bson>> = values
            .iter()
            .map(|value| typed_value(field.path(), value))
            .collect();

        match values {
            Some(values) => self.push_values(field.path(), values, op),
            None => false,
        }
    }

    /// Typed existence check: `Exists` / `ExistsNot`.
    pub fn add_search_filter_exists_on<V>(&mut self, field: Field<T, V>, op: Comparison) -> bool {
        self.add_search_filter_exists(field.path(), op)
    }

    // --- updates -------------------------------------------------------------------------

    /// Records an update of `field`.
    ///
    /// `Remove`, `RemoveFirstFromArray` and `RemoveLastFromArray` ignore the value. The numeric
    /// operators are delegated to [`add_operation_numerics`](Accessor::add_operation_numerics).
    pub fn add_operation(&mut self, field: &str, value: impl Into<Bson>, op: UpdateOperator) -> bool {
        let Some(value) = registry::encode_value(field, value.into()) else {
            return false;
        };

        match update_fragment(field, value, op) {
            Some(fragment) => {
                self.fragments.push_update(fragment);
                true
            }
            None => false,
        }
    }

    /// Records an arithmetic update. The operand must be an int32, int64 or double, the operator
    /// `IncrementNumericalValue` or `MultiplyNumericalValue`.
    pub fn add_operation_numerics(&mut self, field: &str, value: impl Into<Bson>, op: UpdateOperator) -> bool {
        match numeric_fragment(field, value.into(), op) {
            Some(fragment) => {
                self.fragments.push_update(fragment);
                true
            }
            None => false,
        }
    }

    /// Updates `field` of the element of `array_and_id.array_name` whose `_id` is
    /// `array_and_id.element_id`.
    pub fn add_operation_in_array(
        &mut self,
        array_and_id: &ArrayNameElementId,
        value: impl Into<Bson>,
        op: UpdateOperator,
    ) -> bool {
        let path = format!("{}.$[{ELEMENT}]", array_and_id.array_name);
        let Some(fragment) =
            registry::encode_value(&path, value.into()).and_then(|value| update_fragment(&path, value, op))
        else {
            return false;
        };

        self.fragments.push_array_filter(ArrayFilterFragment::new(
            ELEMENT,
            ID_FIELD,
            array_and_id.element_id.to_bson(),
        ));
        self.fragments.push_update(fragment);
        true
    }

    /// Updates an element of an array nested inside an element of another array.
    ///
    /// Binds `elema` to the outer element id and `elemb` to the inner element id. The update path
    /// is built from the inner array name on both levels:
    /// `"<inner>.$[elema].<inner>.$[elemb]"`.
    pub fn add_operation_in_nested_array(
        &mut self,
        array_and_id: &ArrayNameElementId,
        array_in_array_and_id: &ArrayNameElementId,
        value: impl Into<Bson>,
        op: UpdateOperator,
    ) -> bool {
        let inner = &array_in_array_and_id.array_name;
        let path = format!("{inner}.$[{OUTER_ELEMENT}].{inner}.$[{INNER_ELEMENT}]");
        let Some(fragment) =
            registry::encode_value(&path, value.into()).and_then(|value| update_fragment(&path, value, op))
        else {
            return false;
        };

        self.fragments.push_array_filter(ArrayFilterFragment::new(
            OUTER_ELEMENT,
            ID_FIELD,
            array_and_id.element_id.to_bson(),
        ));
        self.fragments.push_array_filter(ArrayFilterFragment::new(
            INNER_ELEMENT,
            ID_FIELD,
            array_in_array_and_id.element_id.to_bson(),
        ));
        self.fragments.push_update(fragment);
        true
    }

    /// Removes every element of `array` whose `_id` is `id`.
    ///
    /// The caller adds the document-level search filter.
    pub fn add_operation_remove_from_array_by_id(&mut self, array: &str, id: &DocumentId) -> bool {
        self.push_pull_by_id(array.to_string(), id)
    }

    /// Removes an element from `array_in_array` inside the array element matched by the query.
    ///
    /// Requires a document filter and a filter on `"<array>._id"` so the positional `$` resolves.
    pub fn add_operation_remove_from_nested_array_by_id(
        &mut self,
        array: &str,
        array_in_array: &str,
        id: &DocumentId,
    ) -> bool {
        self.push_pull_by_id(format!("{array}.$.{array_in_array}"), id)
    }

    /// Removes every element of `array` that satisfies all search filters of `element`.
    pub fn add_operation_remove_from_array_matching<E>(&mut self, array: &str, element: &Accessor<E>) -> bool {
        if !element.has_search_filters() {
            return false;
        }

        self.fragments.push_update(UpdateFragment::new(
            array,
            UpdateOperator::RemoveFromArray,
            UpdateOperand::Matching(element.fragments.filters().to_vec()),
        ));
        true
    }

    /// Typed update: `AddOrOverwrite`, `OverwriteIfGreater`, `OverwriteIfLower`.
    pub fn add_operation_on<V: Serialize>(&mut self, field: Field<T, V>, value: &V, op: UpdateOperator) -> bool {
        if !matches!(
            op,
            UpdateOperator::AddOrOverwrite | UpdateOperator::OverwriteIfGreater | UpdateOperator::OverwriteIfLower
        ) {
            return false;
        }

        match typed_value(field.path(), value).and_then(|value| update_fragment(field.path(), value, op)) {
            Some(fragment) => {
                self.fragments.push_update(fragment);
                true
            }
            None => false,
        }
    }

    /// Typed arithmetic update, with the same operand checks as the path-string form.
    pub fn add_operation_numerics_on<V: Serialize>(
        &mut self,
        field: Field<T, V>,
        value: &V,
        op: UpdateOperator,
    ) -> bool {
        match serialize_to_bson(value) {
            Ok(value) => self.add_operation_numerics(field.path(), value, op),
            Err(_) => false,
        }
    }

    fn push_single(&mut self, field: &str, value: Bson, op: Comparison) -> bool {
        let fragment = match op {
            Comparison::Exists | Comparison::ExistsNot => {
                FilterFragment::exists(field, op == Comparison::Exists)
            }
            op if op.is_value_comparison() => FilterFragment::compare(field, op, value),
            _ => return false,
        };

        self.fragments.push_filter(fragment);
        true
    }

    fn push_values(&mut self, field: &str, mut values: Vec<Bson>, op: Comparison) -> bool {
        match op {
            Comparison::Exists | Comparison::ExistsNot => {
                self.fragments
                    .push_filter(FilterFragment::exists(field, op == Comparison::Exists));
                true
            }
            _ if values.is_empty() => false,
            Comparison::Contains | Comparison::ContainsNot => {
                self.fragments
                    .push_filter(FilterFragment::set(field, values, op == Comparison::Contains));
                true
            }
            _ => {
                let first = values.swap_remove(0);
                self.push_single(field, first, op)
            }
        }
    }

    fn push_pull_by_id(&mut self, path: String, id: &DocumentId) -> bool {
        let element = FilterFragment::compare(ID_FIELD, Comparison::Equals, id.to_bson());
        self.fragments.push_update(UpdateFragment::new(
            path,
            UpdateOperator::RemoveFromArray,
            UpdateOperand::Matching(vec![element]),
        ));
        true
    }
}

impl<T> Default for Accessor<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for Accessor<T> {
    fn clone(&self) -> Self {
        Self { fragments: self.fragments.clone(), _marker: PhantomData }
    }
}

impl<T> fmt::Debug for Accessor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Accessor")
            .field("filters", &self.fragments.filters())
            .field("updates", &self.fragments.updates())
            .field("array_filters", &self.fragments.array_filters())
            .finish()
    }
}

fn typed_value<V: Serialize>(field: &str, value: &V) -> Option<Bson> {
    serialize_to_bson(value)
        .ok()
        .and_then(|value| registry::encode_value(field, value))
}

fn update_fragment(field: &str, value: Bson, op: UpdateOperator) -> Option<UpdateFragment> {
    let operand = match op {
        UpdateOperator::Remove
        | UpdateOperator::RemoveFirstFromArray
        | UpdateOperator::RemoveLastFromArray => UpdateOperand::None,
        UpdateOperator::IncrementNumericalValue | UpdateOperator::MultiplyNumericalValue => {
            return numeric_fragment(field, value, op);
        }
        _ => UpdateOperand::Value(value),
    };

    Some(UpdateFragment::new(field, op, operand))
}

fn numeric_fragment(field: &str, value: Bson, op: UpdateOperator) -> Option<UpdateFragment> {
    if !op.is_numeric() {
        return None;
    }

    let numeric = Numeric::try_from(value).ok()?;
    Some(UpdateFragment::new(field, op, UpdateOperand::Numeric(numeric)))
}
