//! Schema operations.
//!
//! Every statement-bearing line of a compiled script carries one
//! [`Operation`]. The executor hands it to a dialect for SQL generation, so
//! nothing ever re-parses script text.

use serde::{Deserialize, Serialize};

use crate::delta::{ColumnType, Options};

/// A column as it is created or changed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDef {
    /// Column name.
    pub name: String,
    /// Column type.
    pub column_type: ColumnType,
    /// Effective options, defaults already merged.
    pub options: Options,
}

impl ColumnDef {
    /// Creates a column definition.
    #[must_use]
    pub fn new(name: impl Into<String>, column_type: ColumnType, options: Options) -> Self {
        Self {
            name: name.into(),
            column_type,
            options,
        }
    }
}

/// How an index is identified for removal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndexTarget {
    /// By its explicit name.
    Name(String),
    /// By the columns it was built on.
    Columns(Vec<String>),
}

/// A single schema operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Operation {
    /// Create a new table.
    CreateTable {
        /// Table name.
        name: String,
        /// Table options, defaults already merged.
        options: Options,
        /// Column definitions.
        columns: Vec<ColumnDef>,
    },

    /// Rename a table.
    RenameTable {
        /// Old table name.
        old_name: String,
        /// New table name.
        new_name: String,
    },

    /// Drop a table.
    DropTable {
        /// Table name.
        name: String,
    },

    /// Add a column to a table.
    AddColumn {
        /// Table name.
        table: String,
        /// Column definition.
        column: ColumnDef,
    },

    /// Rename a column.
    RenameColumn {
        /// Table name.
        table: String,
        /// Old column name.
        old_name: String,
        /// New column name.
        new_name: String,
    },

    /// Change a column's type and options.
    ChangeColumn {
        /// Table name.
        table: String,
        /// New column definition.
        column: ColumnDef,
    },

    /// Remove a column from a table.
    RemoveColumn {
        /// Table name.
        table: String,
        /// Column name.
        column_name: String,
    },

    /// Create an index.
    AddIndex {
        /// Table name.
        table: String,
        /// Indexed columns.
        columns: Vec<String>,
        /// Index options (`unique`, `name`, `where`).
        options: Options,
    },

    /// Drop an index.
    RemoveIndex {
        /// Table name.
        table: String,
        /// Index to drop.
        target: IndexTarget,
    },

    /// Add a foreign key constraint.
    AddForeignKey {
        /// Referencing table.
        table: String,
        /// Referenced table.
        to_table: String,
        /// Foreign key options.
        options: Options,
    },

    /// Drop a foreign key constraint.
    RemoveForeignKey {
        /// Referencing table.
        table: String,
        /// Constraint name.
        name: String,
    },
}

impl Operation {
    /// The table this operation acts on (the new name for renames).
    #[must_use]
    pub fn table(&self) -> &str {
        match self {
            Self::CreateTable { name, .. } | Self::DropTable { name } => name,
            Self::RenameTable { new_name, .. } => new_name,
            Self::AddColumn { table, .. }
            | Self::RenameColumn { table, .. }
            | Self::ChangeColumn { table, .. }
            | Self::RemoveColumn { table, .. }
            | Self::AddIndex { table, .. }
            | Self::RemoveIndex { table, .. }
            | Self::AddForeignKey { table, .. }
            | Self::RemoveForeignKey { table, .. } => table,
        }
    }

    /// Returns a human-readable description of this operation.
    #[must_use]
    pub fn description(&self) -> String {
        match self {
            Self::CreateTable { name, .. } => format!("Create table '{}'", name),
            Self::RenameTable { old_name, new_name } => {
                format!("Rename table '{}' to '{}'", old_name, new_name)
            }
            Self::DropTable { name } => format!("Drop table '{}'", name),
            Self::AddColumn { table, column } => {
                format!("Add column '{}' to table '{}'", column.name, table)
            }
            Self::RenameColumn {
                table,
                old_name,
                new_name,
            } => format!(
                "Rename column '{}' to '{}' in table '{}'",
                old_name, new_name, table
            ),
            Self::ChangeColumn { table, column } => {
                format!("Change column '{}' in table '{}'", column.name, table)
            }
            Self::RemoveColumn { table, column_name } => {
                format!("Remove column '{}' from table '{}'", column_name, table)
            }
            Self::AddIndex { table, columns, .. } => {
                format!("Add index on '{}' ({})", table, columns.join(", "))
            }
            Self::RemoveIndex { table, target } => match target {
                IndexTarget::Name(name) => {
                    format!("Remove index '{}' from table '{}'", name, table)
                }
                IndexTarget::Columns(columns) => format!(
                    "Remove index on '{}' ({})",
                    table,
                    columns.join(", ")
                ),
            },
            Self::AddForeignKey {
                table, to_table, ..
            } => format!("Add foreign key from '{}' to '{}'", table, to_table),
            Self::RemoveForeignKey { table, name } => {
                format!("Remove foreign key '{}' from table '{}'", name, table)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_of_rename_is_new_name() {
        let op = Operation::RenameTable {
            old_name: "people".to_string(),
            new_name: "users".to_string(),
        };
        assert_eq!(op.table(), "users");
    }

    #[test]
    fn test_descriptions() {
        let op = Operation::AddColumn {
            table: "users".to_string(),
            column: ColumnDef::new("email", ColumnType::String, Options::new()),
        };
        assert_eq!(op.description(), "Add column 'email' to table 'users'");

        let op = Operation::RemoveIndex {
            table: "users".to_string(),
            target: IndexTarget::Columns(vec!["a".to_string(), "b".to_string()]),
        };
        assert_eq!(op.description(), "Remove index on 'users' (a, b)");
    }
}
