//! Error handling for the SQL execution core.
//!
//! Every failure mode of the core maps to one variant of [`SqlError`].
//! Store-level failures are wrapped; `KeyAlreadyExists`, raised when a
//! unique-index constraint rejects a commit batch, surfaces to callers
//! unchanged through that wrapping.

use thiserror::Error;

use strata_store::StoreError;

/// Result type alias for SQL core operations.
pub type SqlResult<T> = std::result::Result<T, SqlError>;

/// Errors raised by the SQL execution core.
#[derive(Debug, Error)]
pub enum SqlError {
    /// A malformed statement or argument reached the core.
    #[error("illegal arguments: {0}")]
    IllegalArguments(&'static str),

    /// A named parameter was not bound at execution time.
    #[error("missing parameter '{0}'")]
    MissingParameter(String),

    /// A parameter was bound to a value the core cannot carry into a key or
    /// payload encoding.
    #[error("unsupported parameter '{0}'")]
    UnsupportedParameter(String),

    /// A row specification carries a different number of values than the
    /// statement's column list.
    #[error("invalid number of values")]
    InvalidNumberOfValues,

    /// The same column appears more than once in a column list.
    #[error("duplicated column '{0}'")]
    DuplicatedColumn(String),

    /// An expression cannot produce the type its context requires.
    #[error("invalid types")]
    InvalidTypes,

    /// A parameter was narrowed to two different concrete types.
    #[error("inferred multiple types for parameter '{0}'")]
    InferredMultipleTypes(String),

    /// Two values of different types were compared.
    #[error("values are not comparable")]
    NotComparableValues,

    /// A value does not fit its column (wrong shape or over max length).
    #[error("invalid value")]
    InvalidValue,

    /// A WHERE/HAVING condition did not reduce to a boolean.
    #[error("invalid condition")]
    InvalidCondition,

    /// No database has been selected and the statement needs one.
    #[error("no database selected")]
    NoDatabaseSelected,

    /// The named database already exists.
    #[error("database '{0}' already exists")]
    DatabaseAlreadyExists(String),

    /// The named database does not exist.
    #[error("database '{0}' does not exist")]
    DatabaseDoesNotExist(String),

    /// The named table already exists.
    #[error("table '{0}' already exists")]
    TableAlreadyExists(String),

    /// The named table does not exist.
    #[error("table '{0}' does not exist")]
    TableDoesNotExist(String),

    /// The named column does not exist.
    #[error("column '{0}' does not exist")]
    ColumnDoesNotExist(String),

    /// A selector does not resolve against the row's columns.
    #[error("invalid column '{0}'")]
    InvalidColumn(String),

    /// A primary key column was given a NULL value.
    #[error("primary key cannot be null")]
    PKCanNotBeNull,

    /// A NOT NULL column was given no value or an explicit NULL.
    #[error("not-nullable column '{0}' cannot be null")]
    NotNullableColumnCannotBeNull(String),

    /// An INSERT supplied a value for an auto-increment primary key.
    #[error("no value should be specified for auto-incremental column '{0}'")]
    NoValueForAutoIncrementalColumn(String),

    /// An encoded key fragment exceeds the maximum key length.
    #[error("max key length exceeded")]
    MaxKeyLengthExceeded,

    /// An index declares more columns than supported.
    #[error("max number of columns in index exceeded")]
    MaxNumberOfColumnsInIndexExceeded,

    /// AUTO_INCREMENT is only supported on a sole INTEGER primary key column.
    #[error("limited auto-increment support")]
    LimitedAutoIncrement,

    /// Secondary indexes can only be created on empty tables.
    #[error("index creation is only supported on empty tables")]
    LimitedIndexCreation,

    /// A variable-length index column lacks a usable max length.
    #[error("limited key type: column max length missing or too large")]
    LimitedKeyType,

    /// GROUP BY supports at most one column.
    #[error("limited group-by support")]
    LimitedGroupBy,

    /// ORDER BY supports at most one, indexed, column.
    #[error("limited order-by support")]
    LimitedOrderBy,

    /// HAVING was used without GROUP BY.
    #[error("having clause requires a group clause")]
    HavingClauseRequiresGroupClause,

    /// No index matches the hinted or required column tuple.
    #[error("no available index")]
    NoAvailableIndex,

    /// Integer division by zero.
    #[error("division by zero")]
    DivisionByZero,

    /// A single-row fetch found no row.
    #[error("no more rows")]
    NoMoreRows,

    /// The operation is recognized but not supported by this core.
    #[error("operation not supported")]
    NoSupported,

    /// Internal invariant violation.
    #[error("unexpected error: {0}")]
    Unexpected(&'static str),

    /// Error surfaced by the underlying store, propagated verbatim.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl SqlError {
    /// Returns true if this error is the store's unique-key violation.
    #[must_use]
    pub fn is_key_already_exists(&self) -> bool {
        matches!(self, Self::Store(StoreError::KeyAlreadyExists))
    }
}
