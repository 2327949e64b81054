//! Validation of caller-supplied SQL.

mod validation;

pub use validation::{QueryValidator, StatementKind, ValidatedQuery};
