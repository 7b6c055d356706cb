//! Schema delta compiler and executor.
//!
//! `oxide-delta` takes a structured description of the differences between
//! a desired schema and the applied one, and:
//! - compiles it into an ordered, line-numbered script of schema operations
//! - runs that script against a live database, or renders the statements it
//!   would issue in dry-run mode
//! - on failure, points back at the script line (and delta entry) at fault
//!
//! # Architecture
//!
//! - **Delta** - Tables to add, rename, change and drop, plus raw SQL
//!   directives gated by optional conditions
//! - **Compiler** - Turns a delta into a [`script::CompiledScript`]
//! - **Dialect** - Database-specific SQL generation for each operation
//! - **Executor** - Applies or renders a compiled script
//! - **Annotate** - Maps an apply failure to a windowed script listing
//!
//! # Example
//!
//! ```rust,ignore
//! use oxide_delta::prelude::*;
//!
//! let delta = Delta::new().add_table(
//!     "users",
//!     AddTable::new()
//!         .column("id", ColumnSpec::new(ColumnType::Integer))
//!         .column("name", ColumnSpec::new(ColumnType::String)),
//! );
//!
//! let config = Config::new().default_int_limit(8);
//! println!("{}", compile(&delta, &config)?);
//!
//! let mut executor = DeltaExecutor::new(pool, SqliteDialect::new(), config);
//! let result = executor.migrate(&delta, Mode::DryRun).await?;
//! println!("{}", result.rendered_output.unwrap_or_default());
//! ```
//!
//! # CLI Usage
//!
//! ```bash
//! # Print the compiled script
//! oxide-delta script delta.json
//!
//! # Exit 1 when the delta would do nothing
//! oxide-delta differ delta.json
//!
//! # Show the statements that would run
//! oxide-delta apply delta.json --database sqlite:db.sqlite3 --dry-run
//! ```

pub mod annotate;
pub mod compiler;
pub mod config;
pub mod connection;
pub mod delta;
pub mod dialect;
pub mod error;
pub mod executor;
pub mod foreign_key;
pub mod operations;
pub mod render;
pub mod report;
pub mod schema;
pub mod script;
pub mod text;

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::annotate::{annotate, detect_error_line, ApplyFailure};
    pub use crate::compiler::{compile, differ, ScriptCompiler};
    pub use crate::config::Config;
    pub use crate::connection::Connection;
    pub use crate::delta::{
        AddTable, Bucket, ChangeTable, ColumnSpec, ColumnType, Condition, Delta,
        ExecuteDirective, ForeignKeySpec, IndexColumns, IndexSpec, Options,
    };
    pub use crate::dialect::{MigrationDialect, SqliteDialect};
    pub use crate::error::{DeltaError, Result};
    pub use crate::executor::{DeltaExecutor, Mode};
    pub use crate::foreign_key::{ForeignKeyCodegen, ForeignerCodegen};
    pub use crate::operations::{ColumnDef, IndexTarget, Operation};
    pub use crate::report::{MigrationReport, MigrationResult};
    pub use crate::schema::{ColumnSchema, DatabaseSchema, IndexSchema, TableSchema};
    pub use crate::script::{CompiledScript, Origin, ScriptLine};
}
