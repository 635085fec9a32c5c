//! Filter tree validation and rewriting
//!
//! Validation semantics:
//! - `$and`/`$or` take an array of nested filter documents
//! - every other key is a field path that must exist in the flattened schema
//! - a document value is a map of operator → operand
//! - any other value is an implicit `$eq`
//! - empty documents and empty arrays are never valid predicates
//!
//! The first violation aborts validation; the input is never partially
//! rewritten. `$text` and `$expr` are always known, typed `Object`.

use bson::{Bson, Document};

use crate::errors::{QueryError, QueryResult};
use crate::schema::{FieldType, FlatSchema};

use super::coerce::coerce_operand;
use super::operator::Operator;

/// Query-level fields available regardless of the caller's schema
const SYNTHETIC_FIELDS: [&str; 2] = ["$text", "$expr"];

/// Validates a filter tree and returns the coerced copy.
///
/// # Errors
///
/// - `UnknownField` if a path is absent from the schema
/// - `UnknownOperator` if an operator is not in the matrix
/// - `TypeOperatorMismatch` if the declared type rejects the operator
/// - `ValueTypeMismatch` if an operand cannot be coerced
/// - `InvalidExpression` for empty predicates or malformed `$and`/`$or`
pub fn validate_filter(schema: &FlatSchema, filter: &Document) -> QueryResult<Document> {
    validate_filter_scoped(schema, filter, None)
}

/// Like [`validate_filter`], resolving every field path under `prefix`.
///
/// Output keys stay unprefixed; only schema lookups use `prefix.key`.
pub fn validate_filter_scoped(
    schema: &FlatSchema,
    filter: &Document,
    prefix: Option<&str>,
) -> QueryResult<Document> {
    let mut rewritten = Document::new();

    for (key, value) in filter {
        if is_empty_container(value) {
            return Err(QueryError::InvalidExpression(format!(
                "Field {} has invalid value",
                key
            )));
        }

        if key == "$and" || key == "$or" {
            let branches = validate_branches(schema, key, value, prefix)?;
            rewritten.insert(key.clone(), branches);
            continue;
        }

        let path = match prefix {
            Some(p) if !p.is_empty() && !key.starts_with('$') => format!("{}.{}", p, key),
            _ => key.clone(),
        };
        let value = validate_field_predicate(schema, &path, value.clone())?;
        rewritten.insert(key.clone(), value);
    }

    Ok(rewritten)
}

fn validate_branches(
    schema: &FlatSchema,
    key: &str,
    value: &Bson,
    prefix: Option<&str>,
) -> QueryResult<Bson> {
    let Bson::Array(branches) = value else {
        return Err(QueryError::InvalidExpression(format!(
            "{} only accepts an array of filter documents",
            key
        )));
    };

    branches
        .iter()
        .map(|branch| match branch {
            Bson::Document(sub) => validate_filter_scoped(schema, sub, prefix).map(Bson::Document),
            _ => Err(QueryError::InvalidExpression(format!(
                "{} only accepts an array of filter documents",
                key
            ))),
        })
        .collect::<QueryResult<Vec<_>>>()
        .map(Bson::Array)
}

/// Validates the predicate attached to one field path.
pub(crate) fn validate_field_predicate(
    schema: &FlatSchema,
    path: &str,
    value: Bson,
) -> QueryResult<Bson> {
    let field_type =
        resolve_field_type(schema, path).ok_or_else(|| QueryError::UnknownField(path.to_string()))?;

    match value {
        Bson::Document(operators) => {
            if operators.is_empty() {
                return Err(QueryError::InvalidExpression(format!(
                    "Field {} has invalid value",
                    path
                )));
            }

            let mut rewritten = Document::new();
            for (name, operand) in operators {
                let operator = Operator::parse(&name)
                    .ok_or_else(|| QueryError::UnknownOperator(name.clone()))?;
                let operand = check_operator(schema, path, field_type, operator, operand)?;
                rewritten.insert(name, operand);
            }
            Ok(Bson::Document(rewritten))
        }
        Bson::Null => Ok(Bson::Null),
        Bson::Array(ref items) if items.is_empty() => Err(QueryError::InvalidExpression(format!(
            "Field {} has invalid value",
            path
        ))),
        bare => check_operator(schema, path, field_type, Operator::Eq, bare),
    }
}

fn check_operator(
    schema: &FlatSchema,
    path: &str,
    field_type: FieldType,
    operator: Operator,
    operand: Bson,
) -> QueryResult<Bson> {
    if !operator.accepts(field_type) {
        return Err(QueryError::type_operator(path, operator.as_str()));
    }
    coerce_operand(schema, path, field_type, operator, operand)
}

fn resolve_field_type(schema: &FlatSchema, path: &str) -> Option<FieldType> {
    schema.get(path).or_else(|| {
        SYNTHETIC_FIELDS
            .contains(&path)
            .then_some(FieldType::Object)
    })
}

fn is_empty_container(value: &Bson) -> bool {
    match value {
        Bson::Document(doc) => doc.is_empty(),
        Bson::Array(items) => items.is_empty(),
        _ => false,
    }
}
