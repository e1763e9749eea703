//! Error types shared by the core data model.

use thiserror::Error;

/// Errors raised by symbol-table lookups.
///
/// A missing name is an expected, common outcome during analysis (dynamic
/// code binds names in ways the table cannot see), so callers usually map
/// this to "no candidates" rather than aborting.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LookupError {
    /// The name was never bound in the queried scope.
    #[error("name '{name}' is not bound in {scope} scope")]
    NotBound { name: String, scope: String },
}

/// Result type for lookup operations.
pub type LookupResult<T> = Result<T, LookupError>;
