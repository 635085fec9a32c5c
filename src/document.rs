//! Document helpers
//!
//! Small, pure transformations over BSON documents used by callers
//! preparing request payloads and by the in-memory store for path access.

use bson::{Bson, Document};

use crate::filter::parse_date;

/// Returns whether `s` is a 24-character hexadecimal identifier.
pub fn is_valid_object_id(s: &str) -> bool {
    s.len() == 24 && s.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Returns whether `value` is an identifier or a string that parses as one.
pub fn is_object_id_value(value: &Bson) -> bool {
    match value {
        Bson::ObjectId(_) => true,
        Bson::String(s) => is_valid_object_id(s),
        _ => false,
    }
}

// ==================
// Path access
// ==================

/// Resolves a dot path through nested documents.
///
/// Arrays are not traversed; `a.b` on `{a: [{b: 1}]}` is `None`.
pub fn get_path<'a>(doc: &'a Document, path: &str) -> Option<&'a Bson> {
    let mut segments = path.split('.');
    let mut current = doc.get(segments.next()?)?;
    for segment in segments {
        match current {
            Bson::Document(inner) => current = inner.get(segment)?,
            _ => return None,
        }
    }
    Some(current)
}

/// Sets a dot path, creating intermediate documents and replacing any
/// non-document value in the way.
pub fn set_path(doc: &mut Document, path: &str, value: Bson) {
    match path.split_once('.') {
        None => {
            doc.insert(path, value);
        }
        Some((head, rest)) => {
            if !matches!(doc.get(head), Some(Bson::Document(_))) {
                doc.insert(head, Document::new());
            }
            if let Some(Bson::Document(inner)) = doc.get_mut(head) {
                set_path(inner, rest, value);
            }
        }
    }
}

/// Removes a dot path, returning the removed value.
pub fn remove_path(doc: &mut Document, path: &str) -> Option<Bson> {
    match path.split_once('.') {
        None => doc.remove(path),
        Some((head, rest)) => match doc.get_mut(head) {
            Some(Bson::Document(inner)) => remove_path(inner, rest),
            _ => None,
        },
    }
}

// ==================
// Transformations
// ==================

/// Flattens nested documents into dot-notation keys.
///
/// Arrays, dates, identifiers and nulls are kept whole under their path.
pub fn to_dot_notation(doc: &Document) -> Document {
    let mut target = Document::new();
    collect_dotted(doc, "", &mut target);
    target
}

fn collect_dotted(doc: &Document, prefix: &str, target: &mut Document) {
    for (key, value) in doc {
        let path = format!("{}{}", prefix, key);
        match value {
            Bson::Document(inner) => collect_dotted(inner, &format!("{}.", path), target),
            other => {
                target.insert(path, other.clone());
            }
        }
    }
}

/// Options for [`remove_empties`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RemoveEmptyOptions {
    /// Also drop `""` values
    pub remove_empty_string: bool,
    /// Also drop numeric zeros
    pub remove_zeros: bool,
}

/// Drops nulls, empty documents and empty arrays, recursively.
///
/// Nested documents and arrays that become empty after cleaning are dropped
/// too. Identifiers are never descended into.
pub fn remove_empties(doc: &Document, options: RemoveEmptyOptions) -> Document {
    let mut cleaned = Document::new();
    for (key, value) in doc {
        if let Some(kept) = clean_value(value, options) {
            cleaned.insert(key.clone(), kept);
        }
    }
    cleaned
}

fn clean_value(value: &Bson, options: RemoveEmptyOptions) -> Option<Bson> {
    match value {
        Bson::Null | Bson::Undefined => None,
        Bson::Document(inner) => {
            let inner = remove_empties(inner, options);
            (!inner.is_empty()).then_some(Bson::Document(inner))
        }
        Bson::Array(items) => {
            let items: Vec<Bson> = items
                .iter()
                .filter_map(|item| clean_value(item, options))
                .collect();
            (!items.is_empty()).then_some(Bson::Array(items))
        }
        Bson::String(s) if s.is_empty() && options.remove_empty_string => None,
        Bson::Int32(0) | Bson::Int64(0) if options.remove_zeros => None,
        Bson::Double(n) if *n == 0.0 && options.remove_zeros => None,
        other => Some(other.clone()),
    }
}

/// Converts string and numeric values to dates when their key contains one
/// of `matches` and none of `excludes`, at any depth.
///
/// Numbers are read as milliseconds since the epoch. Strings that do not
/// parse as dates are left untouched.
pub fn mutate_date_strings(doc: &Document, matches: &[&str], excludes: &[&str]) -> Document {
    let mut out = Document::new();
    for (key, value) in doc {
        out.insert(key.clone(), mutate_value(key, value, matches, excludes));
    }
    out
}

fn mutate_value(key: &str, value: &Bson, matches: &[&str], excludes: &[&str]) -> Bson {
    match value {
        Bson::Document(inner) => Bson::Document(mutate_date_strings(inner, matches, excludes)),
        Bson::Array(items) => Bson::Array(
            items
                .iter()
                .map(|item| match item {
                    Bson::Document(inner) => {
                        Bson::Document(mutate_date_strings(inner, matches, excludes))
                    }
                    other => other.clone(),
                })
                .collect(),
        ),
        Bson::String(_) | Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_) => {
            let wanted = !excludes.iter().any(|e| key.contains(e))
                && matches.iter().any(|m| key.contains(m));
            if wanted {
                to_date(value).unwrap_or_else(|| value.clone())
            } else {
                value.clone()
            }
        }
        other => other.clone(),
    }
}

fn to_date(value: &Bson) -> Option<Bson> {
    let millis = match value {
        Bson::String(s) => return parse_date(s).map(Bson::DateTime),
        Bson::Int32(n) => i64::from(*n),
        Bson::Int64(n) => *n,
        Bson::Double(n) if n.is_finite() => *n as i64,
        _ => return None,
    };
    Some(Bson::DateTime(bson::DateTime::from_millis(millis)))
}
