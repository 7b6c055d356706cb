//! SQLite dialect.
//!
//! SQLite cannot alter a column's type or add foreign keys to an existing
//! table without recreating it; those operations come out as comments and
//! are skipped by the executor.

use serde_json::Value;

use crate::delta::{ColumnType, Options};
use crate::operations::{ColumnDef, IndexTarget, Operation};

use super::{flag, number, MigrationDialect};

/// SQLite migration dialect.
#[derive(Debug, Clone, Default)]
pub struct SqliteDialect;

impl SqliteDialect {
    /// Creates a new SQLite dialect.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn create_table_sql(&self, name: &str, options: &Options, columns: &[ColumnDef]) -> String {
        let mut sql = String::from("CREATE ");
        if flag(options, "temporary") {
            sql.push_str("TEMPORARY ");
        }
        sql.push_str("TABLE ");
        sql.push_str(&self.quote_identifier(name));
        sql.push_str(" (");

        let mut defs: Vec<String> = columns.iter().map(|c| self.column_definition(c)).collect();

        // Composite primary key given as a table option.
        if let Some(Value::Array(keys)) = options.get("primary_key") {
            let quoted: Vec<String> = keys
                .iter()
                .filter_map(Value::as_str)
                .map(|k| self.quote_identifier(k))
                .collect();
            defs.push(format!("PRIMARY KEY ({})", quoted.join(", ")));
        }

        sql.push_str(&defs.join(", "));
        sql.push(')');

        if let Some(extra) = options.get("options").and_then(Value::as_str) {
            sql.push(' ');
            sql.push_str(extra);
        }

        sql
    }

    fn create_index_sql(&self, table: &str, columns: &[String], options: &Options) -> String {
        let name = options
            .get("name")
            .and_then(Value::as_str)
            .map_or_else(|| self.index_name(table, columns), str::to_string);

        let mut sql = String::from("CREATE ");
        if flag(options, "unique") {
            sql.push_str("UNIQUE ");
        }
        sql.push_str("INDEX ");
        sql.push_str(&self.quote_identifier(&name));
        sql.push_str(" ON ");
        sql.push_str(&self.quote_identifier(table));
        sql.push_str(" (");

        let quoted: Vec<String> = columns.iter().map(|c| self.quote_identifier(c)).collect();
        sql.push_str(&quoted.join(", "));
        sql.push(')');

        if let Some(cond) = options.get("where").and_then(Value::as_str) {
            sql.push_str(" WHERE ");
            sql.push_str(cond);
        }

        sql
    }
}

impl MigrationDialect for SqliteDialect {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn generate_sql(&self, operation: &Operation) -> Vec<String> {
        match operation {
            Operation::CreateTable {
                name,
                options,
                columns,
            } => vec![self.create_table_sql(name, options, columns)],

            Operation::RenameTable { old_name, new_name } => vec![format!(
                "ALTER TABLE {} RENAME TO {}",
                self.quote_identifier(old_name),
                self.quote_identifier(new_name)
            )],

            Operation::DropTable { name } => {
                vec![format!("DROP TABLE {}", self.quote_identifier(name))]
            }

            Operation::AddColumn { table, column } => vec![format!(
                "ALTER TABLE {} ADD COLUMN {}",
                self.quote_identifier(table),
                self.column_definition(column)
            )],

            Operation::RenameColumn {
                table,
                old_name,
                new_name,
            } => vec![format!(
                "ALTER TABLE {} RENAME COLUMN {} TO {}",
                self.quote_identifier(table),
                self.quote_identifier(old_name),
                self.quote_identifier(new_name)
            )],

            Operation::ChangeColumn { table, column } => vec![format!(
                "-- ALTER COLUMN not directly supported in SQLite. \
                 Table recreation required for: {}.{}",
                table, column.name
            )],

            // SQLite 3.35.0+
            Operation::RemoveColumn { table, column_name } => vec![format!(
                "ALTER TABLE {} DROP COLUMN {}",
                self.quote_identifier(table),
                self.quote_identifier(column_name)
            )],

            Operation::AddIndex {
                table,
                columns,
                options,
            } => vec![self.create_index_sql(table, columns, options)],

            Operation::RemoveIndex { table, target } => {
                let name = match target {
                    IndexTarget::Name(name) => name.clone(),
                    IndexTarget::Columns(columns) => self.index_name(table, columns),
                };
                vec![format!("DROP INDEX {}", self.quote_identifier(&name))]
            }

            Operation::AddForeignKey {
                table, to_table, ..
            } => vec![format!(
                "-- Foreign key from {} to {} cannot be added after table creation in SQLite. \
                 Table recreation required.",
                table, to_table
            )],

            Operation::RemoveForeignKey { name, .. } => vec![format!(
                "-- Foreign key {} cannot be dropped in SQLite. \
                 Table recreation required.",
                name
            )],
        }
    }

    fn type_name(&self, column_type: ColumnType, options: &Options) -> String {
        let limit = number(options, "limit");
        match column_type {
            // Only a plain INTEGER column can carry AUTOINCREMENT.
            ColumnType::Integer if flag(options, "auto_increment") => "INTEGER".to_string(),
            ColumnType::Integer => match limit {
                Some(1 | 2) => "SMALLINT".to_string(),
                Some(3 | 4) | None => "INTEGER".to_string(),
                Some(_) => "BIGINT".to_string(),
            },
            ColumnType::Bigint => "BIGINT".to_string(),
            ColumnType::String => format!("VARCHAR({})", limit.unwrap_or(255)),
            ColumnType::Text => "TEXT".to_string(),
            ColumnType::Float => "FLOAT".to_string(),
            ColumnType::Decimal => match (number(options, "precision"), number(options, "scale")) {
                (Some(p), Some(s)) => format!("DECIMAL({}, {})", p, s),
                (Some(p), None) => format!("DECIMAL({})", p),
                _ => "DECIMAL".to_string(),
            },
            ColumnType::Datetime => "DATETIME".to_string(),
            ColumnType::Timestamp => "TIMESTAMP".to_string(),
            ColumnType::Time => "TIME".to_string(),
            ColumnType::Date => "DATE".to_string(),
            ColumnType::Binary => "BLOB".to_string(),
            ColumnType::Boolean => "BOOLEAN".to_string(),
            ColumnType::Json => "JSON".to_string(),
        }
    }

    fn auto_increment_keyword(&self) -> &'static str {
        "AUTOINCREMENT"
    }
}
