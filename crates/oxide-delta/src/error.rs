//! Error types for delta compilation and execution.

use crate::script::Origin;

/// Boxed error used at the connection and predicate seams.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors that can occur while compiling or applying a delta.
#[derive(Debug, thiserror::Error)]
pub enum DeltaError {
    /// A column entry has no `type`.
    #[error("Column '{column}' of table '{table}' has no type")]
    MissingColumnType {
        /// Table the column belongs to.
        table: String,
        /// Column name.
        column: String,
    },

    /// An index entry has no `column_name`.
    #[error("Index '{index}' of table '{table}' has no column_name")]
    MissingIndexColumns {
        /// Table the index belongs to.
        table: String,
        /// Index key in the delta.
        index: String,
    },

    /// Applying the compiled script failed.
    ///
    /// `message` holds the original failure text followed by a numbered
    /// listing of the script around the offending line.
    #[error("{message}")]
    Apply {
        /// Annotated message.
        message: String,
        /// 1-based line of the compiled script, 0 when unknown.
        line: usize,
        /// Delta entry the failing line was compiled from.
        origin: Option<Origin>,
        /// The failure raised by the sink.
        #[source]
        source: BoxError,
    },

    /// Database error outside the compiled script (pre/post query, directives).
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A connection implementation reported an error.
    #[error("Connection error: {0}")]
    Connection(BoxError),

    /// IO error (reading deltas, writing the report).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration could not be used.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type for delta operations.
pub type Result<T> = std::result::Result<T, DeltaError>;

/// Failure raised while evaluating an execute directive's condition.
///
/// Never escapes the executor: the directive is skipped with a warning.
#[derive(Debug, thiserror::Error)]
pub enum ConditionError {
    /// The live schema could not be inspected.
    #[error("inspection failed: {0}")]
    Inspect(#[source] DeltaError),

    /// The predicate itself failed.
    #[error("{0}")]
    Predicate(#[source] BoxError),
}
