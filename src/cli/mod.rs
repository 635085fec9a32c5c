//! Command-line front end
//!
//! Provides:
//! - flatten: print a schema's dot paths
//! - filter / project: validate request documents
//! - plan: show the store calls for a paged read
//! - page / count / legacy: run paged reads against a JSON data file

mod args;
mod commands;
mod errors;
mod io;

pub use args::{Cli, Command};
pub use commands::{execute, run, run_command};
pub use errors::{CliError, CliErrorCode, CliResult};
pub use io::{read_json_arg, write_error, write_response};
