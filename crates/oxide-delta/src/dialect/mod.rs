//! Database dialect implementations.
//!
//! Each dialect knows how to generate SQL for schema operations
//! specific to that database system.

mod sqlite;

pub use sqlite::SqliteDialect;

use serde_json::Value;

use crate::delta::{ColumnType, Options};
use crate::operations::{ColumnDef, Operation};

/// Reads a boolean option; absent or non-boolean reads as false.
pub(crate) fn flag(options: &Options, key: &str) -> bool {
    options.get(key).and_then(Value::as_bool).unwrap_or(false)
}

/// Reads an unsigned integer option.
pub(crate) fn number(options: &Options, key: &str) -> Option<u64> {
    options.get(key).and_then(Value::as_u64)
}

/// Trait for database-specific SQL generation.
pub trait MigrationDialect: Send + Sync {
    /// Returns the dialect name.
    fn name(&self) -> &'static str;

    /// Generates SQL for an operation.
    ///
    /// Statements the database cannot run are returned as `--` comments.
    fn generate_sql(&self, operation: &Operation) -> Vec<String>;

    /// Returns the SQL type name for a column type and its options
    /// (`limit`, `precision`, `scale`).
    fn type_name(&self, column_type: ColumnType, options: &Options) -> String;

    /// Returns the auto-increment keyword for this dialect.
    fn auto_increment_keyword(&self) -> &'static str;

    /// Generates column definition SQL.
    fn column_definition(&self, column: &ColumnDef) -> String {
        let options = &column.options;
        let primary_key = flag(options, "primary_key");

        let mut parts = vec![
            self.quote_identifier(&column.name),
            self.type_name(column.column_type, options),
        ];

        if primary_key {
            parts.push("PRIMARY KEY".to_string());
            if flag(options, "auto_increment") {
                parts.push(self.auto_increment_keyword().to_string());
            }
        }

        if options.get("null") == Some(&Value::Bool(false)) && !primary_key {
            parts.push("NOT NULL".to_string());
        }

        if let Some(default) = options.get("default") {
            parts.push(format!("DEFAULT {}", self.default_value(default)));
        }

        parts.join(" ")
    }

    /// Renders a default value literal.
    fn default_value(&self, value: &Value) -> String {
        match value {
            Value::Null => "NULL".to_string(),
            Value::Bool(b) => if *b { "1" } else { "0" }.to_string(),
            Value::Number(n) => n.to_string(),
            Value::String(s) => self.quote_string(s),
            other => self.quote_string(&other.to_string()),
        }
    }

    /// Quote an identifier (table name, column name, etc.).
    fn quote_identifier(&self, name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }

    /// Quote a string literal.
    fn quote_string(&self, s: &str) -> String {
        format!("'{}'", s.replace('\'', "''"))
    }

    /// Name given to an index declared without an explicit `name`.
    fn index_name(&self, table: &str, columns: &[String]) -> String {
        format!("index_{}_on_{}", table, columns.join("_and_"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_option_readers() {
        let options = Options::new()
            .with("unique", json!(true))
            .with("limit", json!(8))
            .with("null", json!("no"));
        assert!(flag(&options, "unique"));
        assert!(!flag(&options, "null"));
        assert!(!flag(&options, "missing"));
        assert_eq!(number(&options, "limit"), Some(8));
        assert_eq!(number(&options, "unique"), None);
    }
}
