//! Translation from docbridge fragments to MongoDB query syntax.
//!
//! Filter fragments become a query document through [`MongoFilterTranslator`], update fragments
//! become an update document grouped by operator, and array-filter fragments become the
//! `arrayFilters` option of an update.

use bson::{Bson, Document, doc};

use docbridge_core::{
    error::{DocumentStoreError, DocumentStoreResult},
    query::{ArrayFilterFragment, Comparison, FilterFragment, FilterVisitor, Fragments, UpdateFragment, UpdateOperand, UpdateOperator},
};

/// Translates filter fragments into MongoDB query documents.
pub(crate) struct MongoFilterTranslator;

impl FilterVisitor for MongoFilterTranslator {
    type Output = Document;
    type Error = DocumentStoreError;

    fn visit_all(&mut self, fragments: &[FilterFragment]) -> Result<Self::Output, Self::Error> {
        match fragments {
            [] => Ok(doc! {}),
            [single] => self.visit_fragment(single),
            many => Ok(doc! {
                "$and": many
                    .iter()
                    .map(|fragment| self.visit_fragment(fragment))
                    .collect::<Result<Vec<_>, _>>()?,
            }),
        }
    }

    fn visit_comparison(&mut self, field: &str, op: Comparison, value: &Bson) -> Result<Self::Output, Self::Error> {
        let operator = match op {
            Comparison::Equals => "$eq",
            Comparison::Differs => "$ne",
            Comparison::Greater => "$gt",
            Comparison::Less => "$lt",
            Comparison::GreaterOrEquals => "$gte",
            Comparison::LessOrEquals => "$lte",
            other => {
                return Err(DocumentStoreError::Backend(format!(
                    "{other:?} is not a value comparison"
                )));
            }
        };

        Ok(doc! {
            field: { operator: value.clone() },
        })
    }

    fn visit_exists(&mut self, field: &str, should_exist: bool) -> Result<Self::Output, Self::Error> {
        Ok(doc! {
            field: { "$exists": should_exist },
        })
    }

    fn visit_set(&mut self, field: &str, values: &[Bson], contains: bool) -> Result<Self::Output, Self::Error> {
        let operator = if contains { "$in" } else { "$nin" };

        Ok(doc! {
            field: { operator: values.to_vec() },
        })
    }

    fn visit_element_match(&mut self, field: &str, element: &[FilterFragment]) -> Result<Self::Output, Self::Error> {
        Ok(doc! {
            field: { "$elemMatch": self.visit_all(element)? },
        })
    }
}

/// Compiles the filter fragments of `fragments`. No fragments compile to `{}`.
pub(crate) fn compile_filter(fragments: &Fragments) -> DocumentStoreResult<Document> {
    fragments.compile_filter(&mut MongoFilterTranslator)
}

/// Compiles update fragments into one update document, grouped by operator.
///
/// A later fragment for the same operator and path replaces the earlier one.
pub(crate) fn compile_update(updates: &[UpdateFragment]) -> DocumentStoreResult<Document> {
    let mut compiled = Document::new();

    for update in updates {
        let (operator, value): (&str, Bson) = match (update.op(), update.operand()) {
            (UpdateOperator::AddOrOverwrite, UpdateOperand::Value(value)) => ("$set", value.clone()),
            (UpdateOperator::Remove, _) => ("$unset", Bson::String(String::new())),
            (UpdateOperator::AddIfNotExist, UpdateOperand::Value(value)) => ("$addToSet", value.clone()),
            (UpdateOperator::OverwriteIfGreater, UpdateOperand::Value(value)) => ("$max", value.clone()),
            (UpdateOperator::OverwriteIfLower, UpdateOperand::Value(value)) => ("$min", value.clone()),
            (UpdateOperator::IncrementNumericalValue, UpdateOperand::Numeric(value)) => ("$inc", (*value).into()),
            (UpdateOperator::MultiplyNumericalValue, UpdateOperand::Numeric(value)) => ("$mul", (*value).into()),
            (UpdateOperator::RemoveFirstFromArray, _) => ("$pop", Bson::Int32(-1)),
            (UpdateOperator::RemoveLastFromArray, _) => ("$pop", Bson::Int32(1)),
            (UpdateOperator::RemoveFromArray, UpdateOperand::Value(value)) => ("$pull", value.clone()),
            (UpdateOperator::RemoveFromArray, UpdateOperand::Matching(element)) => {
                ("$pull", Bson::Document(MongoFilterTranslator.visit_all(element)?))
            }
            (UpdateOperator::AddToArray, UpdateOperand::Value(value)) => ("$push", value.clone()),
            (op, operand) => {
                return Err(DocumentStoreError::Backend(format!(
                    "{op:?} cannot take operand {operand:?}"
                )));
            }
        };

        if !compiled.contains_key(operator) {
            compiled.insert(operator, Document::new());
        }
        compiled
            .get_document_mut(operator)
            .map_err(|e| DocumentStoreError::Backend(e.to_string()))?
            .insert(update.field(), value);
    }

    Ok(compiled)
}

/// Compiles array-filter fragments into the `arrayFilters` option, `None` when there are none.
pub(crate) fn compile_array_filters(array_filters: &[ArrayFilterFragment]) -> Option<Vec<Document>> {
    if array_filters.is_empty() {
        return None;
    }

    Some(
        array_filters
            .iter()
            .map(|filter| doc! { filter.path(): { "$eq": filter.value().clone() } })
            .collect(),
    )
}
