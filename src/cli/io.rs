//! JSON I/O handling for CLI
//!
//! - Input: inline JSON, or `@path` naming a JSON file
//! - Output: one JSON object on stdout, BSON values as relaxed extended JSON

use std::fs;
use std::io::{self, Write};
use std::path::Path;

use bson::{Bson, Document};
use serde_json::Value;

use super::errors::{CliError, CliResult};

/// Parses a JSON argument, reading the file when it starts with `@`.
pub fn read_json_arg(arg: &str) -> CliResult<Value> {
    match arg.strip_prefix('@') {
        Some(path) => read_json_file(Path::new(path)),
        None => serde_json::from_str(arg).map_err(CliError::from),
    }
}

/// Reads and parses a JSON file
pub fn read_json_file(path: &Path) -> CliResult<Value> {
    let content = fs::read_to_string(path)
        .map_err(|e| CliError::input_error(format!("Failed to read {}: {}", path.display(), e)))?;
    serde_json::from_str(&content)
        .map_err(|e| CliError::input_error(format!("Invalid JSON in {}: {}", path.display(), e)))
}

/// Converts extended JSON into a document.
pub fn to_document(value: Value, what: &str) -> CliResult<Document> {
    match to_bson(value, what)? {
        Bson::Document(doc) => Ok(doc),
        other => Err(CliError::input_error(format!(
            "{} must be a JSON object, got {:?}",
            what,
            other.element_type()
        ))),
    }
}

/// Converts an extended JSON array of objects into documents.
pub fn to_documents(value: Value, what: &str) -> CliResult<Vec<Document>> {
    match value {
        Value::Array(items) => items
            .into_iter()
            .map(|item| to_document(item, what))
            .collect(),
        _ => Err(CliError::input_error(format!("{} must be a JSON array", what))),
    }
}

fn to_bson(value: Value, what: &str) -> CliResult<Bson> {
    Bson::try_from(value).map_err(|e| CliError::input_error(format!("Invalid {}: {}", what, e)))
}

/// Relaxed extended JSON rendering of a document
pub fn document_json(doc: &Document) -> Value {
    Bson::Document(doc.clone()).into_relaxed_extjson()
}

/// Write a success response to stdout
pub fn write_response(data: Value) -> CliResult<()> {
    let response = serde_json::json!({
        "status": "ok",
        "data": data
    });

    let mut stdout = io::stdout();
    serde_json::to_writer_pretty(&mut stdout, &response)?;
    writeln!(stdout)?;
    stdout.flush()?;

    Ok(())
}

/// Write an error response to stdout
pub fn write_error(code: &str, message: &str) -> CliResult<()> {
    let response = serde_json::json!({
        "status": "error",
        "code": code,
        "message": message
    });

    let mut stdout = io::stdout();
    serde_json::to_writer_pretty(&mut stdout, &response)?;
    writeln!(stdout)?;
    stdout.flush()?;

    Ok(())
}
