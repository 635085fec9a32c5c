//! `$sort` evaluation
//!
//! Sorting is stable. Values of different kinds order by kind first
//! (missing/null < numbers < strings < documents < arrays < identifiers <
//! booleans < dates), then naturally within a kind.

use std::cmp::Ordering;

use bson::{Bson, Document};

use super::errors::{StoreError, StoreResult};
use crate::document::get_path;

/// Sorts documents by a `$sort` specification
pub struct DocumentSorter;

impl DocumentSorter {
    /// Sorts `documents` in place by `spec` (`path → 1 | -1`).
    pub fn sort(documents: &mut [Document], spec: &Document) -> StoreResult<()> {
        let keys = spec
            .iter()
            .map(|(path, direction)| Ok((path.as_str(), parse_direction(path, direction)?)))
            .collect::<StoreResult<Vec<_>>>()?;

        documents.sort_by(|a, b| {
            for (path, descending) in &keys {
                let ordering = Self::compare_values(get_path(a, path), get_path(b, path));
                let ordering = if *descending { ordering.reverse() } else { ordering };
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            Ordering::Equal
        });
        Ok(())
    }

    /// Total order over optional values used by `$sort`.
    pub fn compare_values(a: Option<&Bson>, b: Option<&Bson>) -> Ordering {
        let rank = |v: Option<&Bson>| -> u8 {
            match v {
                None | Some(Bson::Null) | Some(Bson::Undefined) => 0,
                Some(Bson::Int32(_)) | Some(Bson::Int64(_)) | Some(Bson::Double(_)) => 1,
                Some(Bson::String(_)) => 2,
                Some(Bson::Document(_)) => 3,
                Some(Bson::Array(_)) => 4,
                Some(Bson::ObjectId(_)) => 5,
                Some(Bson::Boolean(_)) => 6,
                Some(Bson::DateTime(_)) => 7,
                Some(_) => 8,
            }
        };

        match rank(a).cmp(&rank(b)) {
            Ordering::Equal => match (a, b) {
                (Some(x), Some(y)) => compare_same_kind(x, y).unwrap_or(Ordering::Equal),
                _ => Ordering::Equal,
            },
            other => other,
        }
    }
}

fn parse_direction(path: &str, direction: &Bson) -> StoreResult<bool> {
    match as_number(direction) {
        Some(n) if n == 1.0 => Ok(false),
        Some(n) if n == -1.0 => Ok(true),
        _ => Err(StoreError::invalid_stage(
            "$sort",
            format!("direction for '{}' must be 1 or -1", path),
        )),
    }
}

pub(super) fn as_number(value: &Bson) -> Option<f64> {
    match value {
        Bson::Int32(n) => Some(f64::from(*n)),
        Bson::Int64(n) => Some(*n as f64),
        Bson::Double(n) => Some(*n),
        _ => None,
    }
}

/// Orders two values of the same kind; `None` when kinds differ or the kind
/// has no natural order.
pub(super) fn compare_same_kind(a: &Bson, b: &Bson) -> Option<Ordering> {
    match (a, b) {
        (Bson::String(x), Bson::String(y)) => Some(x.cmp(y)),
        (Bson::Boolean(x), Bson::Boolean(y)) => Some(x.cmp(y)),
        (Bson::DateTime(x), Bson::DateTime(y)) => Some(x.timestamp_millis().cmp(&y.timestamp_millis())),
        (Bson::ObjectId(x), Bson::ObjectId(y)) => Some(x.bytes().cmp(&y.bytes())),
        _ => match (as_number(a), as_number(b)) {
            (Some(x), Some(y)) => x.partial_cmp(&y),
            _ => None,
        },
    }
}
