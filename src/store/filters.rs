//! `$match` evaluation for the in-memory store
//!
//! Matching rules:
//! - dotted paths descend through embedded documents and fan out across
//!   arrays of documents
//! - a field holding an array matches when the array itself or any element
//!   satisfies the predicate
//! - ordering operators only compare values of the same kind
//! - `$search`, `$regexMatch`, `$text` and `$expr` are not evaluated

use bson::{Bson, Document};
use fancy_regex::Regex;

use super::errors::{StoreError, StoreResult};
use super::sorter::{as_number, compare_same_kind};

/// Evaluates filter documents against stored documents
pub struct MatchEvaluator;

impl MatchEvaluator {
    /// Checks whether `document` satisfies every clause of `filter`.
    pub fn matches(document: &Document, filter: &Document) -> StoreResult<bool> {
        for (key, condition) in filter {
            let matched = match key.as_str() {
                "$and" => {
                    let mut all = true;
                    for branch in branches(key, condition)? {
                        if !Self::matches(document, branch)? {
                            all = false;
                            break;
                        }
                    }
                    all
                }
                "$or" => {
                    let mut any = false;
                    for branch in branches(key, condition)? {
                        if Self::matches(document, branch)? {
                            any = true;
                            break;
                        }
                    }
                    any
                }
                "$text" | "$expr" => return Err(StoreError::unsupported(key.as_str())),
                path => Self::matches_field(document, path, condition)?,
            };

            if !matched {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn matches_field(document: &Document, path: &str, condition: &Bson) -> StoreResult<bool> {
        let values = resolve_values(document, path);

        match condition {
            Bson::Document(operators) if is_operator_document(operators) => {
                apply_all(&values, operators)
            }
            expected => Ok(eq_match(&values, expected)),
        }
    }
}

fn branches<'a>(key: &str, condition: &'a Bson) -> StoreResult<Vec<&'a Document>> {
    let invalid = || StoreError::invalid_stage("$match", format!("{} needs an array of documents", key));
    match condition {
        Bson::Array(items) => items
            .iter()
            .map(|item| item.as_document().ok_or_else(invalid))
            .collect(),
        _ => Err(invalid()),
    }
}

fn is_operator_document(doc: &Document) -> bool {
    doc.keys().next().is_some_and(|k| k.starts_with('$'))
}

/// Collects every value reachable at `path`, fanning out across arrays of
/// documents. An empty result means the path is missing.
pub(super) fn resolve_values<'a>(document: &'a Document, path: &str) -> Vec<&'a Bson> {
    let mut out = Vec::new();
    let (head, rest) = match path.split_once('.') {
        Some((head, rest)) => (head, Some(rest)),
        None => (path, None),
    };

    if let Some(value) = document.get(head) {
        match rest {
            None => out.push(value),
            Some(rest) => match value {
                Bson::Document(inner) => out.extend(resolve_values(inner, rest)),
                Bson::Array(items) => {
                    for item in items {
                        if let Bson::Document(inner) = item {
                            out.extend(resolve_values(inner, rest));
                        }
                    }
                }
                _ => {}
            },
        }
    }
    out
}

/// Values plus the elements of any array among them
pub(super) fn candidates<'a>(values: &[&'a Bson]) -> Vec<&'a Bson> {
    let mut out = Vec::with_capacity(values.len());
    for value in values {
        out.push(*value);
        if let Bson::Array(items) = value {
            out.extend(items.iter());
        }
    }
    out
}

fn apply_all(values: &[&Bson], operators: &Document) -> StoreResult<bool> {
    for (operator, operand) in operators {
        if !apply(values, operator, operand, operators)? {
            return Ok(false);
        }
    }
    Ok(true)
}

fn apply(values: &[&Bson], operator: &str, operand: &Bson, siblings: &Document) -> StoreResult<bool> {
    let matched = match operator {
        "$eq" => eq_match(values, operand),
        "$ne" => !eq_match(values, operand),
        "$gt" => ordered_match(values, operand, |o| o.is_gt()),
        "$gte" => ordered_match(values, operand, |o| o.is_ge()),
        "$lt" => ordered_match(values, operand, |o| o.is_lt()),
        "$lte" => ordered_match(values, operand, |o| o.is_le()),
        "$in" => operand_array(operator, operand)?
            .iter()
            .any(|item| eq_match(values, item)),
        "$nin" => !operand_array(operator, operand)?
            .iter()
            .any(|item| eq_match(values, item)),
        "$all" => {
            let items = operand_array(operator, operand)?;
            !items.is_empty() && items.iter().all(|item| eq_match(values, item))
        }
        "$exists" => {
            let wanted = match operand {
                Bson::Boolean(b) => *b,
                other => as_number(other).is_some_and(|n| n != 0.0),
            };
            values.is_empty() != wanted
        }
        "$regex" => {
            let options = siblings.get_str("$options").unwrap_or_default();
            regex_match(values, operand, options)?
        }
        "$options" => true,
        "$elemMatch" => {
            let Bson::Document(predicate) = operand else {
                return Err(StoreError::invalid_stage("$match", "$elemMatch needs a document"));
            };
            elem_match(values, predicate)?
        }
        other => return Err(StoreError::unsupported(other)),
    };
    Ok(matched)
}

fn operand_array<'a>(operator: &str, operand: &'a Bson) -> StoreResult<&'a Vec<Bson>> {
    match operand {
        Bson::Array(items) => Ok(items),
        _ => Err(StoreError::invalid_stage(
            "$match",
            format!("{} needs an array", operator),
        )),
    }
}

fn eq_match(values: &[&Bson], expected: &Bson) -> bool {
    if let Bson::Null = expected {
        return values.is_empty() || values.iter().any(|v| matches!(v, Bson::Null));
    }
    if let Bson::RegularExpression(re) = expected {
        return build_regex(&re.pattern, &re.options)
            .and_then(|compiled| any_match(&compiled, values))
            .unwrap_or(false);
    }
    candidates(values)
        .into_iter()
        .any(|actual| values_equal(actual, expected))
}

fn ordered_match(
    values: &[&Bson],
    bound: &Bson,
    accept: impl Fn(std::cmp::Ordering) -> bool,
) -> bool {
    candidates(values)
        .into_iter()
        .any(|actual| compare_same_kind(actual, bound).is_some_and(&accept))
}

fn regex_match(values: &[&Bson], operand: &Bson, extra_options: &str) -> StoreResult<bool> {
    let (pattern, options) = match operand {
        Bson::RegularExpression(re) => (re.pattern.as_str(), format!("{}{}", re.options, extra_options)),
        Bson::String(s) => (s.as_str(), extra_options.to_string()),
        _ => {
            return Err(StoreError::invalid_stage(
                "$match",
                "$regex needs a string or pattern",
            ))
        }
    };
    let compiled = build_regex(pattern, &options)?;
    any_match(&compiled, values)
}

fn any_match(compiled: &Regex, values: &[&Bson]) -> StoreResult<bool> {
    for candidate in string_candidates(values) {
        let matched = compiled
            .is_match(candidate)
            .map_err(|e| StoreError::invalid_stage("$match", e.to_string()))?;
        if matched {
            return Ok(true);
        }
    }
    Ok(false)
}

fn string_candidates<'a>(values: &'a [&'a Bson]) -> impl Iterator<Item = &'a str> + 'a {
    candidates(values).into_iter().filter_map(|v| v.as_str())
}

/// Compiles a pattern with its `i`, `m` and `s` options as inline flags
fn build_regex(pattern: &str, options: &str) -> StoreResult<Regex> {
    let mut flags: Vec<char> = options
        .chars()
        .filter(|c| matches!(c, 'i' | 'm' | 's'))
        .collect();
    flags.sort_unstable();
    flags.dedup();

    let source = if flags.is_empty() {
        pattern.to_string()
    } else {
        format!("(?{}){}", flags.into_iter().collect::<String>(), pattern)
    };
    Regex::new(&source).map_err(|e| StoreError::invalid_stage("$match", e.to_string()))
}

fn elem_match(values: &[&Bson], predicate: &Document) -> StoreResult<bool> {
    for value in values {
        let Bson::Array(items) = value else {
            continue;
        };
        for item in items {
            let matched = if is_operator_document(predicate) {
                apply_all(&[item], predicate)?
            } else if let Bson::Document(element) = item {
                MatchEvaluator::matches(element, predicate)?
            } else {
                false
            };
            if matched {
                return Ok(true);
            }
        }
    }
    Ok(false)
}

/// Equality with numeric kinds compared by value
pub(super) fn values_equal(a: &Bson, b: &Bson) -> bool {
    match (as_number(a), as_number(b)) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}
