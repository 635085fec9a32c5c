//! CLI command implementations
//!
//! Every command validates against a schema descriptor file. `page`, `count`
//! and `legacy` run against an in-memory collection loaded from a JSON array
//! file, which makes them handy for checking what a request returns before
//! pointing it at a real store.

use std::future::Future;
use std::path::Path;

use bson::Document;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::info;

use crate::config::EngineConfig;
use crate::filter::{validate_filter, validate_projection, ProjectionMode};
use crate::observability::init_logging;
use crate::paging::{CountOptions, LegacyPageRequest, PageOutcome, QueryEngine, QueryOptions};
use crate::schema::{flatten_schema, SchemaDescriptor};
use crate::store::InMemoryStore;

use super::args::{Cli, Command};
use super::errors::{CliError, CliResult};
use super::io::{document_json, read_json_arg, read_json_file, to_document, to_documents, write_response};

/// Parses arguments, loads configuration, installs logging and runs the command.
pub fn run() -> CliResult<()> {
    let cli = Cli::parse_args();

    let config = match &cli.config {
        Some(path) => EngineConfig::from_file(path)?,
        None => EngineConfig::default(),
    };
    init_logging(&config.logging)?;

    run_command(cli.command, config)
}

/// Runs one command and writes its response
pub fn run_command(cmd: Command, config: EngineConfig) -> CliResult<()> {
    let data = execute(cmd, config)?;
    write_response(data)
}

/// Runs one command and returns its response body
pub fn execute(cmd: Command, config: EngineConfig) -> CliResult<Value> {
    let engine = QueryEngine::new(config);
    match cmd {
        Command::Flatten { schema } => flatten(&schema),
        Command::Filter { schema, filter } => filter_command(&schema, &filter),
        Command::Project {
            schema,
            mode,
            fields,
        } => project(&schema, &mode, &fields),
        Command::Plan {
            schema,
            request,
            pipeline,
        } => plan(&engine, &schema, &request, pipeline.as_deref()),
        Command::Page {
            schema,
            data,
            request,
            pipeline,
        } => page(&engine, &schema, &data, &request, pipeline.as_deref()),
        Command::Count {
            schema,
            data,
            request,
            pipeline,
        } => count(&engine, &schema, &data, &request, pipeline.as_deref()),
        Command::Legacy {
            schema,
            data,
            request,
        } => legacy(&engine, &schema, &data, &request),
    }
}

pub fn flatten(schema_path: &Path) -> CliResult<Value> {
    let schema = flatten_schema(&load_schema(schema_path)?);
    let paths: Map<String, Value> = schema
        .iter()
        .map(|(path, field_type)| (path.to_string(), json!(field_type.type_name())))
        .collect();
    Ok(Value::Object(paths))
}

pub fn filter_command(schema_path: &Path, filter: &str) -> CliResult<Value> {
    let schema = flatten_schema(&load_schema(schema_path)?);
    let filter = to_document(read_json_arg(filter)?, "filter")?;
    let rewritten = validate_filter(&schema, &filter)?;
    Ok(document_json(&rewritten))
}

pub fn project(schema_path: &Path, mode: &str, fields: &str) -> CliResult<Value> {
    let mode = ProjectionMode::parse(mode)
        .ok_or_else(|| CliError::input_error(format!("Unknown mode '{}', expected sort or project", mode)))?;
    let schema = flatten_schema(&load_schema(schema_path)?);
    let fields = to_document(read_json_arg(fields)?, "fields")?;
    let validated = validate_projection(&schema, &fields, mode)?;
    Ok(document_json(&validated))
}

pub fn plan(
    engine: &QueryEngine,
    schema_path: &Path,
    request: &str,
    pipeline: Option<&str>,
) -> CliResult<Value> {
    let options = query_options(load_schema(schema_path)?, request)?;
    let pre_pipeline = load_pipeline(pipeline)?;
    let plan = engine.plan(&pre_pipeline, &options)?;
    Ok(plan.describe())
}

pub fn page(
    engine: &QueryEngine,
    schema_path: &Path,
    data_path: &Path,
    request: &str,
    pipeline: Option<&str>,
) -> CliResult<Value> {
    let options = query_options(load_schema(schema_path)?, request)?;
    let pre_pipeline = load_pipeline(pipeline)?;
    let store = load_store(data_path)?;

    let page = block_on(engine.query_page(&store, &pre_pipeline, &options))??;
    info!(
        documents = page.data.len(),
        page = page.metadata.current_page,
        "page served"
    );
    Ok(page.to_json())
}

pub fn count(
    engine: &QueryEngine,
    schema_path: &Path,
    data_path: &Path,
    request: &str,
    pipeline: Option<&str>,
) -> CliResult<Value> {
    let mut fields = request_object(read_json_arg(request)?)?;
    let filter = take_document(&mut fields, "filter")?;
    let mut options: CountOptions = serde_json::from_value(Value::Object(fields))?;
    options.schema = Some(load_schema(schema_path)?);
    options.filter = filter;

    let pre_pipeline = load_pipeline(pipeline)?;
    let store = load_store(data_path)?;

    let counted = block_on(engine.query_page_count(&store, &pre_pipeline, &options))??;
    Ok(serde_json::to_value(counted)?)
}

/// Scalar fields of a legacy request; document fields are read separately
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct LegacyFields {
    page: i64,
    limit: i64,
    unwind: Option<String>,
    resource: Option<String>,
}

pub fn legacy(
    engine: &QueryEngine,
    schema_path: &Path,
    data_path: &Path,
    request: &str,
) -> CliResult<Value> {
    let mut fields = request_object(read_json_arg(request)?)?;
    let request = LegacyPageRequest {
        schema: load_schema(schema_path)?,
        filter: take_document(&mut fields, "filter")?,
        sort: take_document(&mut fields, "sort")?,
        project: take_document(&mut fields, "project")?,
        extra_match: take_document(&mut fields, "extraMatch")?,
        lookup: take_document(&mut fields, "lookup")?,
        ..LegacyPageRequest::default()
    };
    let scalars: LegacyFields = serde_json::from_value(Value::Object(fields))?;
    let request = LegacyPageRequest {
        page: scalars.page,
        limit: scalars.limit,
        unwind: scalars.unwind,
        resource: scalars.resource,
        ..request
    };

    let store = load_store(data_path)?;
    let outcome = block_on(engine.get_data_with_paging(&store, &request))??;
    Ok(match outcome {
        PageOutcome::Page(page) | PageOutcome::Empty(page) => page.to_json(),
        PageOutcome::PastEnd => json!({ "pastEnd": true }),
    })
}

// ==================
// Helpers
// ==================

fn load_schema(path: &Path) -> CliResult<SchemaDescriptor> {
    let value = read_json_file(path)?;
    serde_json::from_value(value)
        .map_err(|e| CliError::input_error(format!("Invalid schema in {}: {}", path.display(), e)))
}

fn load_pipeline(pipeline: Option<&str>) -> CliResult<Vec<Document>> {
    match pipeline {
        Some(arg) => to_documents(read_json_arg(arg)?, "pipeline"),
        None => Ok(Vec::new()),
    }
}

fn load_store(path: &Path) -> CliResult<InMemoryStore> {
    let documents = to_documents(read_json_file(path)?, "data")?;
    Ok(InMemoryStore::with_documents(documents))
}

fn query_options(schema: SchemaDescriptor, request: &str) -> CliResult<QueryOptions> {
    let mut fields = request_object(read_json_arg(request)?)?;
    let filter = take_document(&mut fields, "filter")?;
    let sort = take_document(&mut fields, "sort")?;
    let project = take_document(&mut fields, "project")?;

    let mut options: QueryOptions = serde_json::from_value(Value::Object(fields))?;
    options.schema = Some(schema);
    options.filter = filter;
    options.sort = sort;
    options.project = project;
    Ok(options)
}

fn request_object(value: Value) -> CliResult<Map<String, Value>> {
    match value {
        Value::Object(mut fields) => {
            fields.remove("schema");
            Ok(fields)
        }
        _ => Err(CliError::input_error("request must be a JSON object")),
    }
}

fn take_document(fields: &mut Map<String, Value>, key: &str) -> CliResult<Option<Document>> {
    match fields.remove(key) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => to_document(value, key).map(Some),
    }
}

fn block_on<F: Future>(future: F) -> CliResult<F::Output> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    Ok(runtime.block_on(future))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn json_file(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", content).unwrap();
        file
    }

    fn schema_file() -> NamedTempFile {
        json_file(r#"{ "no": "Number", "name": "String", "createdAt": "Date" }"#)
    }

    fn data_file() -> NamedTempFile {
        json_file(
            r#"[
                { "no": 1, "name": "a" },
                { "no": 2, "name": "b" },
                { "no": 3, "name": "c" }
            ]"#,
        )
    }

    #[test]
    fn test_flatten_lists_types() {
        let schema = schema_file();
        let flat = flatten(schema.path()).unwrap();
        assert_eq!(flat["no"], "Number");
        assert_eq!(flat["createdAt"], "Date");
    }

    #[test]
    fn test_filter_rewrites_dates() {
        let schema = schema_file();
        let out = filter_command(
            schema.path(),
            r#"{ "createdAt": { "$gte": "2021-03-01T00:00:00Z" } }"#,
        )
        .unwrap();
        assert!(out["createdAt"]["$gte"]["$date"].is_string());
    }

    #[test]
    fn test_filter_unknown_field_keeps_code() {
        let schema = schema_file();
        let err = filter_command(schema.path(), r#"{ "testZ": 1 }"#).unwrap_err();
        assert_eq!(err.code_str(), "QG_UNKNOWN_FIELD");
    }

    #[test]
    fn test_project_unknown_mode() {
        let schema = schema_file();
        let err = project(schema.path(), "group", "{}").unwrap_err();
        assert_eq!(err.code_str(), "QG_CLI_INPUT_ERROR");
    }

    #[test]
    fn test_plan_describes_find_fast_path() {
        let schema = schema_file();
        let engine = QueryEngine::default();
        let described = plan(
            &engine,
            schema.path(),
            r#"{ "limit": -1, "calculatePages": false, "filter": { "no": 2 } }"#,
            None,
        )
        .unwrap();
        assert_eq!(described["execution"], "find");
        assert_eq!(described["filter"]["no"], 2);
    }

    #[test]
    fn test_page_against_data_file() {
        let schema = schema_file();
        let data = data_file();
        let engine = QueryEngine::default();
        let out = page(
            &engine,
            schema.path(),
            data.path(),
            r#"{ "limit": 2, "page": 2, "sort": { "no": 1 } }"#,
            None,
        )
        .unwrap();
        assert_eq!(out["data"].as_array().unwrap().len(), 1);
        assert_eq!(out["data"][0]["no"], 3);
        assert_eq!(out["_metadata"]["totalPages"], 2);
        assert_eq!(out["_metadata"]["totalDocuments"], 3);
    }

    #[test]
    fn test_count_against_data_file() {
        let schema = schema_file();
        let data = data_file();
        let engine = QueryEngine::default();
        let out = count(
            &engine,
            schema.path(),
            data.path(),
            r#"{ "limit": 2, "filter": { "no": { "$gte": 2 } } }"#,
            None,
        )
        .unwrap();
        assert_eq!(out, json!({ "totalPages": 1, "totalDocuments": 2 }));
    }

    #[test]
    fn test_legacy_past_end() {
        let schema = schema_file();
        let data = data_file();
        let engine = QueryEngine::default();
        let out = legacy(&engine, schema.path(), data.path(), r#"{ "page": 5, "limit": 2 }"#).unwrap();
        assert_eq!(out, json!({ "pastEnd": true }));
    }
}
