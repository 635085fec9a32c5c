//! Sort and projection validation
//!
//! Both stages are flat `path → value` maps. Every path must exist in the
//! flattened schema and carry a scalar or non-empty expression value.
//! Projection maps additionally may not mix inclusion and exclusion flags.

use std::fmt;

use bson::{Bson, Document};

use crate::errors::{QueryError, QueryResult};
use crate::schema::FlatSchema;

/// Which stage a key map is destined for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectionMode {
    Sort,
    Project,
}

impl ProjectionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectionMode::Sort => "sort",
            ProjectionMode::Project => "project",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "sort" | "$sort" => Some(ProjectionMode::Sort),
            "project" | "$project" => Some(ProjectionMode::Project),
            _ => None,
        }
    }
}

impl fmt::Display for ProjectionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flag {
    Include,
    Exclude,
}

/// Validates a sort or projection map and returns it unchanged.
///
/// # Errors
///
/// - `InvalidExpression` for `null`, arrays, empty documents, or mixed
///   inclusion/exclusion in project mode
/// - `UnknownField` for paths absent from the schema
pub fn validate_projection(
    schema: &FlatSchema,
    fields: &Document,
    mode: ProjectionMode,
) -> QueryResult<Document> {
    let mut seen: Option<Flag> = None;

    for (key, value) in fields {
        if is_incorrect_value(value) {
            return Err(QueryError::InvalidExpression(format!(
                "Field {} is value incorrect",
                key
            )));
        }

        if !schema.contains(key) {
            return Err(QueryError::UnknownField(key.clone()));
        }

        if mode != ProjectionMode::Project {
            continue;
        }

        let Some(flag) = classify(value) else {
            continue;
        };
        match seen {
            Some(prev) if prev != flag => {
                return Err(QueryError::InvalidExpression(format!(
                    "Bad projection : {}",
                    Bson::Document(fields.clone()).into_relaxed_extjson()
                )));
            }
            _ => seen = Some(flag),
        }
    }

    Ok(fields.clone())
}

fn is_incorrect_value(value: &Bson) -> bool {
    match value {
        Bson::Null | Bson::Array(_) => true,
        Bson::Document(doc) => doc.is_empty(),
        _ => false,
    }
}

/// Numeric and boolean values are inclusion flags; expressions are not
fn classify(value: &Bson) -> Option<Flag> {
    let included = match value {
        Bson::Boolean(b) => *b,
        Bson::Int32(n) => *n != 0,
        Bson::Int64(n) => *n != 0,
        Bson::Double(n) => *n != 0.0,
        _ => return None,
    };
    Some(if included { Flag::Include } else { Flag::Exclude })
}
