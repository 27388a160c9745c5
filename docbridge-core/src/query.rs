//! Operator vocabulary and the fragment model accessors accumulate.
//!
//! Callers never build fragments directly. An [`Accessor`](crate::accessor::Accessor) validates
//! each request against the operator tables and records one fragment per accepted call. Backends
//! read the recorded fragments through [`Fragments`] and translate them, either by implementing
//! [`FilterVisitor`] (the MongoDB backend compiles to filter documents, the in-memory backend
//! evaluates against a document) or by walking the update fragments directly.
//!
//! # Comparison operators
//!
//! | operator | operand | meaning |
//! |---|---|---|
//! | `Equals`, `Differs` | value | field equals / differs from value |
//! | `Greater`, `Less`, `GreaterOrEquals`, `LessOrEquals` | value | ordered comparison |
//! | `Contains`, `ContainsNot` | value set | field is / is not one of the values |
//! | `Exists`, `ExistsNot` | none | field is present / absent |
//! | `ArrayElementField` | element predicate | some array element satisfies the predicate |
//!
//! # Update operators
//!
//! | operator | operand | effect |
//! |---|---|---|
//! | `AddOrOverwrite` | value | set the field |
//! | `Remove` | none | remove the field |
//! | `AddIfNotExist` | value | append to array unless already present |
//! | `OverwriteIfGreater`, `OverwriteIfLower` | value | keep the larger / smaller |
//! | `IncrementNumericalValue`, `MultiplyNumericalValue` | numeric | arithmetic |
//! | `RemoveFirstFromArray`, `RemoveLastFromArray` | none | pop an end of the array |
//! | `RemoveFromArray` | value or element predicate | pull matching elements |
//! | `AddToArray` | value | append to array |

use std::fmt;

use bson::Bson;

use crate::error::{DocumentStoreError, DocumentStoreResult};

/// Comparison operators for search filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Comparison {
    Equals,
    Differs,
    Greater,
    Less,
    GreaterOrEquals,
    LessOrEquals,
    Contains,
    ContainsNot,
    Exists,
    ExistsNot,
    ArrayElementField,
}

impl Comparison {
    /// Whether this operator compares a field against one value.
    pub fn is_value_comparison(&self) -> bool {
        matches!(
            self,
            Comparison::Equals
                | Comparison::Differs
                | Comparison::Greater
                | Comparison::Less
                | Comparison::GreaterOrEquals
                | Comparison::LessOrEquals
        )
    }

    pub fn is_existence(&self) -> bool {
        matches!(self, Comparison::Exists | Comparison::ExistsNot)
    }

    pub fn is_membership(&self) -> bool {
        matches!(self, Comparison::Contains | Comparison::ContainsNot)
    }
}

/// Update operators applied to the fields of matched documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UpdateOperator {
    AddOrOverwrite,
    Remove,
    AddIfNotExist,
    OverwriteIfGreater,
    OverwriteIfLower,
    IncrementNumericalValue,
    MultiplyNumericalValue,
    RemoveFirstFromArray,
    RemoveLastFromArray,
    RemoveFromArray,
    AddToArray,
}

impl UpdateOperator {
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            UpdateOperator::IncrementNumericalValue | UpdateOperator::MultiplyNumericalValue
        )
    }
}

/// Sort direction for read constraints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

impl SortDirection {
    /// The conventional `1` / `-1` key value of a sort document.
    pub fn as_i32(&self) -> i32 {
        match self {
            SortDirection::Ascending => 1,
            SortDirection::Descending => -1,
        }
    }
}

/// A value numeric update operators accept: a 32-bit integer, a 64-bit integer or a double.
///
/// Anything else is rejected when converting from [`Bson`], before an update fragment exists.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Numeric {
    Int32(i32),
    Int64(i64),
    Double(f64),
}

impl TryFrom<Bson> for Numeric {
    type Error = DocumentStoreError;

    fn try_from(value: Bson) -> DocumentStoreResult<Self> {
        match value {
            Bson::Int32(v) => Ok(Numeric::Int32(v)),
            Bson::Int64(v) => Ok(Numeric::Int64(v)),
            Bson::Double(v) => Ok(Numeric::Double(v)),
            other => Err(DocumentStoreError::InvalidAccessor(format!(
                "numeric updates require an int32, int64 or double operand, got {:?}",
                other.element_type()
            ))),
        }
    }
}

impl From<i32> for Numeric {
    fn from(value: i32) -> Self {
        Numeric::Int32(value)
    }
}

impl From<i64> for Numeric {
    fn from(value: i64) -> Self {
        Numeric::Int64(value)
    }
}

impl From<f64> for Numeric {
    fn from(value: f64) -> Self {
        Numeric::Double(value)
    }
}

impl From<Numeric> for Bson {
    fn from(value: Numeric) -> Self {
        match value {
            Numeric::Int32(v) => Bson::Int32(v),
            Numeric::Int64(v) => Bson::Int64(v),
            Numeric::Double(v) => Bson::Double(v),
        }
    }
}

/// The operand of a [`FilterFragment`].
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// Existence checks carry no operand.
    None,
    Value(Bson),
    Set(Vec<Bson>),
    /// A predicate every candidate array element is tested against.
    Element(Vec<FilterFragment>),
}

/// One atomic search predicate: `(field, comparison, operand)`.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterFragment {
    field: String,
    op: Comparison,
    operand: Operand,
}

impl FilterFragment {
    pub(crate) fn compare(field: impl Into<String>, op: Comparison, value: Bson) -> Self {
        Self { field: field.into(), op, operand: Operand::Value(value) }
    }

    pub(crate) fn exists(field: impl Into<String>, should_exist: bool) -> Self {
        Self {
            field: field.into(),
            op: if should_exist { Comparison::Exists } else { Comparison::ExistsNot },
            operand: Operand::None,
        }
    }

    pub(crate) fn set(field: impl Into<String>, values: Vec<Bson>, contains: bool) -> Self {
        Self {
            field: field.into(),
            op: if contains { Comparison::Contains } else { Comparison::ContainsNot },
            operand: Operand::Set(values),
        }
    }

    pub(crate) fn element_match(field: impl Into<String>, element: Vec<FilterFragment>) -> Self {
        Self {
            field: field.into(),
            op: Comparison::ArrayElementField,
            operand: Operand::Element(element),
        }
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn op(&self) -> Comparison {
        self.op
    }

    pub fn operand(&self) -> &Operand {
        &self.operand
    }
}

/// The operand of an [`UpdateFragment`].
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOperand {
    None,
    Value(Bson),
    Numeric(Numeric),
    /// Array elements matching this predicate are removed.
    Matching(Vec<FilterFragment>),
}

/// One atomic field mutation: `(field, update operator, operand)`.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateFragment {
    field: String,
    op: UpdateOperator,
    operand: UpdateOperand,
}

impl UpdateFragment {
    pub(crate) fn new(field: impl Into<String>, op: UpdateOperator, operand: UpdateOperand) -> Self {
        Self { field: field.into(), op, operand }
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn op(&self) -> UpdateOperator {
        self.op
    }

    pub fn operand(&self) -> &UpdateOperand {
        &self.operand
    }
}

/// Binds a positional placeholder (`$[placeholder]` in an update path) to the array elements whose
/// `field` equals `value`.
#[derive(Debug, Clone, PartialEq)]
pub struct ArrayFilterFragment {
    placeholder: String,
    field: String,
    value: Bson,
}

impl ArrayFilterFragment {
    pub(crate) fn new(placeholder: impl Into<String>, field: impl Into<String>, value: Bson) -> Self {
        Self { placeholder: placeholder.into(), field: field.into(), value }
    }

    pub fn placeholder(&self) -> &str {
        &self.placeholder
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn value(&self) -> &Bson {
        &self.value
    }

    /// The dotted `placeholder.field` path backends bind the placeholder with.
    pub fn path(&self) -> String {
        format!("{}.{}", self.placeholder, self.field)
    }
}

impl fmt::Display for ArrayFilterFragment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} == {}", self.path(), self.value)
    }
}

/// The fragments an accessor accumulated, in insertion order.
///
/// Filters are AND-combined. Updates are combined with conflicting paths resolved by the
/// backend. Array filters must stay in the order their placeholders appear in update paths.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Fragments {
    filters: Vec<FilterFragment>,
    updates: Vec<UpdateFragment>,
    array_filters: Vec<ArrayFilterFragment>,
}

impl Fragments {
    pub fn filters(&self) -> &[FilterFragment] {
        &self.filters
    }

    pub fn updates(&self) -> &[UpdateFragment] {
        &self.updates
    }

    pub fn array_filters(&self) -> &[ArrayFilterFragment] {
        &self.array_filters
    }

    /// Compiles the AND-combined filter fragments with the given visitor.
    pub fn compile_filter<V: FilterVisitor>(&self, visitor: &mut V) -> Result<V::Output, V::Error> {
        visitor.visit_all(&self.filters)
    }

    pub(crate) fn push_filter(&mut self, fragment: FilterFragment) {
        self.filters.push(fragment);
    }

    pub(crate) fn push_update(&mut self, fragment: UpdateFragment) {
        self.updates.push(fragment);
    }

    pub(crate) fn push_array_filter(&mut self, fragment: ArrayFilterFragment) {
        self.array_filters.push(fragment);
    }

    pub(crate) fn clear(&mut self) {
        self.filters.clear();
        self.updates.clear();
        self.array_filters.clear();
    }
}

/// Translates filter fragments into a backend's representation.
///
/// [`visit_fragment`](FilterVisitor::visit_fragment) dispatches on the operand, so implementors
/// only supply one method per predicate shape.
pub trait FilterVisitor {
    type Output;
    type Error: Into<DocumentStoreError>;

    /// AND-combination; an empty slice matches everything.
    fn visit_all(&mut self, fragments: &[FilterFragment]) -> Result<Self::Output, Self::Error>;
    fn visit_comparison(
        &mut self,
        field: &str,
        op: Comparison,
        value: &Bson,
    ) -> Result<Self::Output, Self::Error>;
    fn visit_exists(&mut self, field: &str, should_exist: bool) -> Result<Self::Output, Self::Error>;
    fn visit_set(
        &mut self,
        field: &str,
        values: &[Bson],
        contains: bool,
    ) -> Result<Self::Output, Self::Error>;
    fn visit_element_match(
        &mut self,
        field: &str,
        element: &[FilterFragment],
    ) -> Result<Self::Output, Self::Error>;

    fn visit_fragment(&mut self, fragment: &FilterFragment) -> Result<Self::Output, Self::Error> {
        match fragment.operand() {
            Operand::None => self.visit_exists(fragment.field(), fragment.op() == Comparison::Exists),
            Operand::Value(value) => self.visit_comparison(fragment.field(), fragment.op(), value),
            Operand::Set(values) => {
                self.visit_set(fragment.field(), values, fragment.op() == Comparison::Contains)
            }
            Operand::Element(element) => self.visit_element_match(fragment.field(), element),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_accepts_only_the_three_numeric_types() {
        assert_eq!(Numeric::try_from(Bson::Int32(2)).unwrap(), Numeric::Int32(2));
        assert_eq!(Numeric::try_from(Bson::Int64(2)).unwrap(), Numeric::Int64(2));
        assert_eq!(Numeric::try_from(Bson::Double(2.5)).unwrap(), Numeric::Double(2.5));

        assert!(Numeric::try_from(Bson::String("2".into())).is_err());
        assert!(Numeric::try_from(Bson::Boolean(true)).is_err());
        assert!(Numeric::try_from(Bson::Null).is_err());
    }

    #[test]
    fn array_filter_path_joins_placeholder_and_field() {
        let fragment = ArrayFilterFragment::new("elem", "_id", Bson::Int64(3));

        assert_eq!(fragment.path(), "elem._id");
        assert_eq!(fragment.to_string(), "elem._id == 3");
    }
}
