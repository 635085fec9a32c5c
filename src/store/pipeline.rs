//! Aggregation pipeline evaluation for the in-memory store
//!
//! Supports `$match`, `$sort`, `$skip`, `$limit`, `$project`, `$unwind`,
//! `$replaceRoot`, `$count`, `$facet` and `$lookup`. Stages run in order
//! over an owned document vector; every stage body is checked before it
//! is applied.

use std::collections::HashMap;

use bson::{Bson, Document};

use super::errors::{StoreError, StoreResult};
use super::filters::{candidates, resolve_values, values_equal, MatchEvaluator};
use super::sorter::{as_number, DocumentSorter};
use crate::document::{get_path, remove_path, set_path};

/// Runs pipelines against a set of documents, resolving `$lookup` sources
/// from `collections`
pub struct PipelineRunner<'a> {
    collections: &'a HashMap<String, Vec<Document>>,
}

impl<'a> PipelineRunner<'a> {
    pub fn new(collections: &'a HashMap<String, Vec<Document>>) -> Self {
        Self { collections }
    }

    /// Applies `stages` to `documents` in order.
    pub fn run(&self, documents: Vec<Document>, stages: &[Document]) -> StoreResult<Vec<Document>> {
        stages
            .iter()
            .try_fold(documents, |docs, stage| self.apply(docs, stage))
    }

    fn apply(&self, documents: Vec<Document>, stage: &Document) -> StoreResult<Vec<Document>> {
        let mut entries = stage.iter();
        let (name, body) = match (entries.next(), entries.next()) {
            (Some(entry), None) => entry,
            _ => {
                return Err(StoreError::invalid_stage(
                    "pipeline",
                    "each stage must have exactly one key",
                ))
            }
        };

        match name.as_str() {
            "$match" => filter(documents, stage_document(name, body)?),
            "$sort" => {
                let mut documents = documents;
                DocumentSorter::sort(&mut documents, stage_document(name, body)?)?;
                Ok(documents)
            }
            "$skip" => {
                let n = stage_count(name, body, 0)?;
                Ok(documents.into_iter().skip(n).collect())
            }
            "$limit" => {
                let n = stage_count(name, body, 1)?;
                Ok(documents.into_iter().take(n).collect())
            }
            "$project" => project(documents, stage_document(name, body)?),
            "$unwind" => unwind(documents, body),
            "$replaceRoot" => replace_root(documents, stage_document(name, body)?),
            "$count" => count(documents, body),
            "$facet" => self.facet(documents, stage_document(name, body)?),
            "$lookup" => self.lookup(documents, stage_document(name, body)?),
            other => Err(StoreError::unsupported(other)),
        }
    }

    fn facet(&self, documents: Vec<Document>, branches: &Document) -> StoreResult<Vec<Document>> {
        let mut output = Document::new();
        for (name, stages) in branches {
            let Bson::Array(stages) = stages else {
                return Err(StoreError::invalid_stage(
                    "$facet",
                    format!("branch '{}' must be an array of stages", name),
                ));
            };
            let stages = stages
                .iter()
                .map(|s| {
                    s.as_document().cloned().ok_or_else(|| {
                        StoreError::invalid_stage("$facet", format!("branch '{}' has a non-document stage", name))
                    })
                })
                .collect::<StoreResult<Vec<_>>>()?;

            let result = self.run(documents.clone(), &stages)?;
            output.insert(name.clone(), result.into_iter().map(Bson::Document).collect::<Vec<_>>());
        }
        Ok(vec![output])
    }

    fn lookup(&self, documents: Vec<Document>, spec: &Document) -> StoreResult<Vec<Document>> {
        let field = |key: &str| {
            spec.get_str(key)
                .map_err(|_| StoreError::invalid_stage("$lookup", format!("'{}' must be a string", key)))
        };
        let from = field("from")?;
        let local_field = field("localField")?;
        let foreign_field = field("foreignField")?;
        let as_field = field("as")?;

        let empty = Vec::new();
        let foreign = self.collections.get(from).unwrap_or(&empty);

        let mut output = Vec::with_capacity(documents.len());
        for mut doc in documents {
            let local = join_keys(&doc, local_field);
            let joined: Vec<Bson> = foreign
                .iter()
                .filter(|candidate| {
                    join_keys(candidate, foreign_field)
                        .iter()
                        .any(|key| local.iter().any(|l| values_equal(l, key)))
                })
                .cloned()
                .map(Bson::Document)
                .collect();
            set_path(&mut doc, as_field, Bson::Array(joined));
            output.push(doc);
        }
        Ok(output)
    }
}

fn stage_document<'b>(name: &str, body: &'b Bson) -> StoreResult<&'b Document> {
    body.as_document()
        .ok_or_else(|| StoreError::invalid_stage(name, "body must be a document"))
}

fn stage_count(name: &str, body: &Bson, min: i64) -> StoreResult<usize> {
    let invalid = || StoreError::invalid_stage(name, format!("must be an integer >= {}", min));
    let n = as_number(body).ok_or_else(invalid)?;
    if n.fract() != 0.0 || n < min as f64 {
        return Err(invalid());
    }
    Ok(n as usize)
}

fn filter(documents: Vec<Document>, predicate: &Document) -> StoreResult<Vec<Document>> {
    let mut kept = Vec::with_capacity(documents.len());
    for doc in documents {
        if MatchEvaluator::matches(&doc, predicate)? {
            kept.push(doc);
        }
    }
    Ok(kept)
}

/// `Some(true)` for inclusion flags, `Some(false)` for exclusion flags,
/// `None` for computed values
fn projection_flag(value: &Bson) -> Option<bool> {
    match value {
        Bson::Boolean(b) => Some(*b),
        other => as_number(other).map(|n| n != 0.0),
    }
}

fn project(documents: Vec<Document>, spec: &Document) -> StoreResult<Vec<Document>> {
    let mut inclusion = false;
    let mut exclusion = false;
    for (key, value) in spec {
        if key == "_id" {
            continue;
        }
        match projection_flag(value) {
            Some(false) => exclusion = true,
            _ => inclusion = true,
        }
    }
    if inclusion && exclusion {
        return Err(StoreError::invalid_stage(
            "$project",
            "cannot mix inclusion and exclusion",
        ));
    }

    let hide_id = matches!(spec.get("_id").and_then(projection_flag), Some(false));

    documents
        .into_iter()
        .map(|doc| {
            if !inclusion {
                let mut out = doc;
                for (key, value) in spec {
                    if projection_flag(value) == Some(false) {
                        remove_path(&mut out, key);
                    }
                }
                return Ok(out);
            }

            let mut out = Document::new();
            if !hide_id {
                if let Some(id) = doc.get("_id") {
                    out.insert("_id", id.clone());
                }
            }
            for (key, value) in spec {
                if key == "_id" {
                    continue;
                }
                let projected = match projection_flag(value) {
                    Some(_) => get_path(&doc, key).cloned(),
                    None => evaluate(&doc, value)?,
                };
                if let Some(v) = projected {
                    set_path(&mut out, key, v);
                }
            }
            Ok(out)
        })
        .collect()
}

/// Field references and literals; operator expressions are not evaluated
fn evaluate(doc: &Document, expr: &Bson) -> StoreResult<Option<Bson>> {
    match expr {
        Bson::String(s) if s.starts_with('$') => Ok(get_path(doc, &s[1..]).cloned()),
        Bson::Document(inner) if inner.keys().any(|k| k.starts_with('$')) => {
            Err(StoreError::unsupported("operator expression"))
        }
        Bson::Document(inner) => {
            let mut out = Document::new();
            for (key, value) in inner {
                if let Some(v) = evaluate(doc, value)? {
                    out.insert(key.clone(), v);
                }
            }
            Ok(Some(Bson::Document(out)))
        }
        other => Ok(Some(other.clone())),
    }
}

fn unwind(documents: Vec<Document>, body: &Bson) -> StoreResult<Vec<Document>> {
    let (path, preserve) = match body {
        Bson::String(path) => (path.as_str(), false),
        Bson::Document(spec) => (
            spec.get_str("path")
                .map_err(|_| StoreError::invalid_stage("$unwind", "'path' must be a string"))?,
            spec.get_bool("preserveNullAndEmptyArrays").unwrap_or(false),
        ),
        _ => {
            return Err(StoreError::invalid_stage(
                "$unwind",
                "body must be a path or a document",
            ))
        }
    };
    let path = path
        .strip_prefix('$')
        .ok_or_else(|| StoreError::invalid_stage("$unwind", "path must start with '$'"))?;

    let mut output = Vec::new();
    for doc in documents {
        match get_path(&doc, path).cloned() {
            Some(Bson::Array(items)) if !items.is_empty() => {
                for item in items {
                    let mut copy = doc.clone();
                    set_path(&mut copy, path, item);
                    output.push(copy);
                }
            }
            Some(Bson::Array(_)) | Some(Bson::Null) | None => {
                if preserve {
                    output.push(doc);
                }
            }
            Some(_) => output.push(doc),
        }
    }
    Ok(output)
}

fn replace_root(documents: Vec<Document>, spec: &Document) -> StoreResult<Vec<Document>> {
    let new_root = spec
        .get("newRoot")
        .ok_or_else(|| StoreError::invalid_stage("$replaceRoot", "missing 'newRoot'"))?;

    documents
        .iter()
        .map(|doc| match evaluate(doc, new_root)? {
            Some(Bson::Document(root)) => Ok(root),
            other => Err(StoreError::invalid_stage(
                "$replaceRoot",
                format!(
                    "'newRoot' must resolve to a document, got {}",
                    other.map_or("missing".to_string(), |v| format!("{:?}", v.element_type()))
                ),
            )),
        })
        .collect()
}

fn count(documents: Vec<Document>, body: &Bson) -> StoreResult<Vec<Document>> {
    let name = match body {
        Bson::String(name) if !name.is_empty() && !name.starts_with('$') && !name.contains('.') => name,
        _ => {
            return Err(StoreError::invalid_stage(
                "$count",
                "name must be a non-empty string without '$' or '.'",
            ))
        }
    };
    if documents.is_empty() {
        return Ok(Vec::new());
    }

    let total = match i32::try_from(documents.len()) {
        Ok(n) => Bson::Int32(n),
        Err(_) => Bson::Int64(documents.len() as i64),
    };
    let mut out = Document::new();
    out.insert(name.clone(), total);
    Ok(vec![out])
}

/// Join keys of a document at `path`; a missing path joins as `null`
fn join_keys(doc: &Document, path: &str) -> Vec<Bson> {
    let values = resolve_values(doc, path);
    if values.is_empty() {
        return vec![Bson::Null];
    }
    candidates(&values).into_iter().cloned().collect()
}
