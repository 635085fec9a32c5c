//! Filter, sort and projection validation
//!
//! Untrusted expressions are checked against a flattened schema and the
//! operator-compatibility matrix, then rewritten with coerced operands.
//! Validation is pure and synchronous.

mod coerce;
mod operator;
mod projection;
mod validator;

pub use operator::Operator;
pub use projection::{validate_projection, ProjectionMode};
pub use validator::{validate_filter, validate_filter_scoped};

pub(crate) use coerce::parse_date;
