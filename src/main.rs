//! querygate CLI entry point
//!
//! Parses arguments and delegates to `cli::run`. Failures are written as a
//! JSON error response and the process exits non-zero.

use querygate::cli;

fn main() {
    if let Err(e) = cli::run() {
        if cli::write_error(e.code_str(), e.message()).is_err() {
            eprintln!("{}", e);
        }
        std::process::exit(1);
    }
}
