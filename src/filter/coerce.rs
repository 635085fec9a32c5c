//! Per-type operand coercion
//!
//! One function per declared field type, each `(operator, operand) ->
//! coerced operand`. Already-coerced operands (dates, identifiers,
//! compiled patterns) pass through unchanged, so re-validating a
//! validated filter is a no-op.

use bson::oid::ObjectId;
use bson::{Bson, Document};
use chrono::{NaiveDate, NaiveDateTime, TimeZone, Utc};

use crate::errors::{QueryError, QueryResult};
use crate::schema::{FieldType, FlatSchema};

use super::operator::Operator;
use super::validator::validate_field_predicate;

const SCHEMATYPE_MISMATCH: &str = "value does not match schema type";

/// Checks operator-level operand constraints, then dispatches on the
/// declared type of `field`.
pub(crate) fn coerce_operand(
    schema: &FlatSchema,
    field: &str,
    field_type: FieldType,
    operator: Operator,
    operand: Bson,
) -> QueryResult<Bson> {
    match operator {
        Operator::In | Operator::Nin if !matches!(operand, Bson::Array(_)) => {
            return Err(QueryError::value_mismatch(
                field,
                format!("{} only accepts array values", operator),
            ));
        }
        Operator::Search if !matches!(operand, Bson::String(_)) => {
            return Err(QueryError::value_mismatch(
                field,
                format!("{} only accepts string values", operator),
            ));
        }
        Operator::ElemMatch if !matches!(operand, Bson::Document(_) | Bson::Null) => {
            return Err(QueryError::value_mismatch(
                field,
                format!("{} only accepts object values", operator),
            ));
        }
        Operator::Exists => return coerce_exists(field, operand),
        _ => {}
    }

    if let Bson::Null = operand {
        return Ok(Bson::Null);
    }

    if operator == Operator::ElemMatch
        && !matches!(field_type, FieldType::Array | FieldType::Object)
    {
        return coerce_element_predicates(schema, field, field_type, operand);
    }

    match field_type {
        FieldType::String | FieldType::StringArray => coerce_string(field, operator, operand),
        FieldType::Number | FieldType::NumberArray => coerce_number(field, operand),
        FieldType::Boolean => coerce_boolean(field, operand),
        FieldType::Date => coerce_date(field, operand),
        FieldType::ObjectId | FieldType::ObjectIdArray => coerce_object_id(field, operand),
        FieldType::Object => Ok(operand),
        FieldType::Array if operator == Operator::ElemMatch => {
            coerce_elem_match(schema, field, operand)
        }
        FieldType::Array => Err(QueryError::UnsupportedFieldType(
            field_type.type_name().to_string(),
        )),
    }
}

/// `$exists` takes a flag regardless of the field's type
fn coerce_exists(field: &str, operand: Bson) -> QueryResult<Bson> {
    match operand {
        Bson::Boolean(_) | Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_) => Ok(operand),
        other => Err(mismatch(field, "boolean", &other)),
    }
}

fn coerce_string(field: &str, operator: Operator, operand: Bson) -> QueryResult<Bson> {
    match operand {
        Bson::Array(items) => {
            check_elements(field, &items, "string", |v| matches!(v, Bson::String(_)))?;
            Ok(Bson::Array(items))
        }
        Bson::String(pattern) if operator == Operator::Regex => compile_pattern(field, pattern),
        Bson::RegularExpression(_) if operator == Operator::Regex => Ok(operand),
        Bson::String(_) => Ok(operand),
        other => Err(mismatch(field, "string", &other)),
    }
}

/// `$regex` operands become case-insensitive patterns. Look-around and
/// backreferences are accepted.
fn compile_pattern(field: &str, pattern: String) -> QueryResult<Bson> {
    if let Err(e) = fancy_regex::Regex::new(&pattern) {
        return Err(QueryError::value_mismatch(
            field,
            format!("invalid pattern: {}", e),
        ));
    }
    Ok(Bson::RegularExpression(bson::Regex {
        pattern,
        options: "i".to_string(),
    }))
}

fn coerce_number(field: &str, operand: Bson) -> QueryResult<Bson> {
    match operand {
        Bson::Array(items) => {
            check_elements(field, &items, "number", is_number)?;
            Ok(Bson::Array(items))
        }
        other if is_number(&other) => Ok(other),
        other => Err(mismatch(field, "number", &other)),
    }
}

fn coerce_boolean(field: &str, operand: Bson) -> QueryResult<Bson> {
    match operand {
        Bson::Array(items) => {
            check_elements(field, &items, "boolean", |v| matches!(v, Bson::Boolean(_)))?;
            Ok(Bson::Array(items))
        }
        Bson::Boolean(_) => Ok(operand),
        other => Err(mismatch(field, "boolean", &other)),
    }
}

fn coerce_date(field: &str, operand: Bson) -> QueryResult<Bson> {
    match operand {
        Bson::DateTime(_) => Ok(operand),
        Bson::String(s) if s.is_empty() => Ok(Bson::Null),
        Bson::String(s) => parse_date(&s)
            .map(Bson::DateTime)
            .ok_or_else(|| QueryError::value_mismatch(field, format!("unparsable date '{}'", s))),
        other => Err(mismatch(field, "date string", &other)),
    }
}

/// Accepts RFC 3339, `YYYY-MM-DDTHH:MM[:SS[.fff]]` with `T` or a space,
/// `YYYY-MM-DD`, `YYYY-MM` and `YYYY`. Strings without an offset are read as
/// UTC; a month or year alone means its first day.
pub(crate) fn parse_date(input: &str) -> Option<bson::DateTime> {
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(input) {
        return Some(bson::DateTime::from_millis(dt.timestamp_millis()));
    }

    for format in [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M",
    ] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(input, format) {
            let millis = Utc.from_utc_datetime(&naive).timestamp_millis();
            return Some(bson::DateTime::from_millis(millis));
        }
    }

    let date = match input.len() {
        4 if input.bytes().all(|b| b.is_ascii_digit()) => {
            NaiveDate::from_ymd_opt(input.parse().ok()?, 1, 1)?
        }
        7 => NaiveDate::parse_from_str(&format!("{}-01", input), "%Y-%m-%d").ok()?,
        _ => NaiveDate::parse_from_str(input, "%Y-%m-%d").ok()?,
    };
    let millis = Utc
        .from_utc_datetime(&date.and_hms_opt(0, 0, 0)?)
        .timestamp_millis();
    Some(bson::DateTime::from_millis(millis))
}

fn coerce_object_id(field: &str, operand: Bson) -> QueryResult<Bson> {
    match operand {
        Bson::Array(items) => items
            .into_iter()
            .map(|item| to_object_id(field, item))
            .collect::<QueryResult<Vec<_>>>()
            .map(Bson::Array),
        other => to_object_id(field, other),
    }
}

fn to_object_id(field: &str, value: Bson) -> QueryResult<Bson> {
    match value {
        Bson::ObjectId(_) => Ok(value),
        Bson::String(ref s) if crate::document::is_valid_object_id(s) => ObjectId::parse_str(s)
            .map(Bson::ObjectId)
            .map_err(|e| QueryError::value_mismatch(field, e.to_string())),
        other => Err(mismatch(field, "24-hex identifier", &other)),
    }
}

/// Sub-keys of an `$elemMatch` on a document array are validated as
/// predicates on `field.subkey`.
fn coerce_elem_match(schema: &FlatSchema, field: &str, operand: Bson) -> QueryResult<Bson> {
    let Bson::Document(predicates) = operand else {
        return Err(mismatch(field, "object", &operand));
    };

    let mut rewritten = Document::new();
    for (key, value) in predicates {
        let sub_path = format!("{}.{}", field, key);
        let value = validate_field_predicate(schema, &sub_path, value)?;
        rewritten.insert(key, value);
    }
    Ok(Bson::Document(rewritten))
}

/// `$elemMatch` on a primitive field holds operator predicates applied to
/// each element, checked against the element type.
fn coerce_element_predicates(
    schema: &FlatSchema,
    field: &str,
    field_type: FieldType,
    operand: Bson,
) -> QueryResult<Bson> {
    let Bson::Document(predicates) = operand else {
        return Err(mismatch(field, "object", &operand));
    };

    let element_type = element_type(field_type);
    let mut rewritten = Document::new();
    for (name, value) in predicates {
        let operator =
            Operator::parse(&name).ok_or_else(|| QueryError::UnknownOperator(name.clone()))?;
        if !operator.accepts(element_type) {
            return Err(QueryError::type_operator(field, operator.as_str()));
        }
        let value = coerce_operand(schema, field, element_type, operator, value)?;
        rewritten.insert(name, value);
    }
    Ok(Bson::Document(rewritten))
}

fn element_type(field_type: FieldType) -> FieldType {
    match field_type {
        FieldType::StringArray => FieldType::String,
        FieldType::NumberArray => FieldType::Number,
        FieldType::ObjectIdArray => FieldType::ObjectId,
        other => other,
    }
}

fn check_elements(
    field: &str,
    items: &[Bson],
    expected: &str,
    accept: impl Fn(&Bson) -> bool,
) -> QueryResult<()> {
    match items.iter().find(|item| !accept(item)) {
        Some(bad) => Err(mismatch(field, expected, bad)),
        None => Ok(()),
    }
}

fn is_number(value: &Bson) -> bool {
    matches!(
        value,
        Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_) | Bson::Decimal128(_)
    )
}

fn mismatch(field: &str, expected: &str, actual: &Bson) -> QueryError {
    QueryError::value_mismatch(
        field,
        format!(
            "{}: expected {}, got {}",
            SCHEMATYPE_MISMATCH,
            expected,
            bson_type_name(actual)
        ),
    )
}

/// Returns the BSON kind name for error messages.
pub(crate) fn bson_type_name(value: &Bson) -> &'static str {
    match value {
        Bson::Null => "null",
        Bson::Boolean(_) => "boolean",
        Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_) | Bson::Decimal128(_) => "number",
        Bson::String(_) => "string",
        Bson::Array(_) => "array",
        Bson::Document(_) => "object",
        Bson::DateTime(_) => "date",
        Bson::ObjectId(_) => "identifier",
        Bson::RegularExpression(_) => "pattern",
        _ => "other",
    }
}
