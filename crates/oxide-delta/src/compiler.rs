//! Script compiler.
//!
//! Walks a [`Delta`] and emits a [`CompiledScript`]: all `add` tables, then
//! all `rename`s, then all `change`s, then all `delete`s, each bucket in
//! insertion order. Execute directives are not part of the script.

use serde_json::Value;

use crate::config::Config;
use crate::delta::{
    AddTable, ChangeTable, ColumnSpec, ColumnType, DefinitionChanges, Delta, IndexChanges,
    IndexSpec,
};
use crate::error::{DeltaError, Result};
use crate::foreign_key::{ForeignKeyCodegen, ForeignerCodegen};
use crate::operations::{ColumnDef, IndexTarget, Operation};
use crate::render;
use crate::script::{ChangeKind, CompiledScript, Origin, ScriptBuilder, Section};

static FOREIGNER: ForeignerCodegen = ForeignerCodegen;

/// Compiles a delta with the default foreign key codegen.
pub fn compile(delta: &Delta, config: &Config) -> Result<CompiledScript> {
    ScriptCompiler::new(config).compile(delta)
}

/// Returns true if running the delta would do anything.
///
/// Static check: the script is non-empty or there are execute directives.
/// Directive conditions are not evaluated.
pub fn differ(delta: &Delta, config: &Config) -> Result<bool> {
    Ok(!compile(delta, config)?.is_empty() || !delta.execute.is_empty())
}

/// Compiles deltas into scripts.
pub struct ScriptCompiler<'a> {
    config: &'a Config,
    foreign_keys: &'a dyn ForeignKeyCodegen,
}

impl<'a> ScriptCompiler<'a> {
    /// Creates a compiler using [`ForeignerCodegen`] for foreign keys.
    #[must_use]
    pub fn new(config: &'a Config) -> Self {
        Self {
            config,
            foreign_keys: &FOREIGNER,
        }
    }

    /// Replaces the foreign key codegen.
    #[must_use]
    pub fn with_foreign_keys(mut self, codegen: &'a dyn ForeignKeyCodegen) -> Self {
        self.foreign_keys = codegen;
        self
    }

    /// Compiles the delta. Same delta and config always give the same script.
    pub fn compile(&self, delta: &Delta) -> Result<CompiledScript> {
        let mut buf = ScriptBuilder::new();

        for (table_name, table) in delta.add.iter() {
            self.append_create_table(table_name, table, &mut buf)?;
        }

        for (to_table_name, from_table_name) in delta.rename.iter() {
            Self::append_rename_table(to_table_name, from_table_name, &mut buf);
        }

        for (table_name, change) in delta.change.iter() {
            self.append_change(table_name, change, &mut buf)?;
        }

        for table_name in delta.delete.keys() {
            Self::append_drop_table(table_name, &mut buf);
        }

        Ok(buf.finish())
    }

    fn append_create_table(
        &self,
        table_name: &str,
        table: &AddTable,
        buf: &mut ScriptBuilder,
    ) -> Result<()> {
        let origin = Origin::table(ChangeKind::Add, table_name);
        let options = self.config.merge_table_options(&table.options);

        let columns = table
            .definition
            .iter()
            .map(|(column_name, spec)| {
                let column_type = require_type(table_name, column_name, spec)?;
                let options = self.config.apply_default_int_limit(column_type, &spec.options);
                Ok(ColumnDef::new(column_name, column_type, options))
            })
            .collect::<Result<Vec<_>>>()?;

        let header = format!(
            "create_table({}, {}) do |t|",
            render::string(table_name),
            render::options(&options)
        );
        let column_lines: Vec<(String, Origin)> = columns
            .iter()
            .map(|c| {
                let text = format!(
                    "  t.{}({}, {})",
                    c.column_type,
                    render::symbol(&c.name),
                    render::options(&c.options)
                );
                (text, origin.entry(Section::Definition, None, c.name.as_str()))
            })
            .collect();

        buf.statement(
            header,
            Operation::CreateTable {
                name: table_name.to_string(),
                options,
                columns,
            },
            origin.clone(),
        );
        for (text, column_origin) in column_lines {
            buf.line(text, Some(column_origin));
        }
        buf.line("end", Some(origin.clone()));

        if !table.indices.is_empty() {
            self.append_change_table(table_name, &origin, buf, |buf| {
                for (index_name, spec) in table.indices.iter() {
                    let entry = origin.entry(Section::Indices, None, index_name);
                    self.append_add_index(table_name, index_name, spec, entry, buf)?;
                }
                Ok(())
            })?;
        }

        if self.config.enable_foreigner && !table.foreign_keys.is_empty() {
            self.append_change_table(table_name, &origin, buf, |buf| {
                for (fk_name, spec) in table.foreign_keys.iter() {
                    self.foreign_keys.append_add_foreign_key(
                        table_name,
                        fk_name,
                        spec,
                        &origin,
                        buf,
                        self.config,
                    );
                }
                Ok(())
            })?;
        }

        buf.blank();
        Ok(())
    }

    fn append_rename_table(to_table_name: &str, from_table_name: &str, buf: &mut ScriptBuilder) {
        buf.statement(
            format!(
                "rename_table({}, {})",
                render::string(from_table_name),
                render::string(to_table_name)
            ),
            Operation::RenameTable {
                old_name: from_table_name.to_string(),
                new_name: to_table_name.to_string(),
            },
            Origin::table(ChangeKind::Rename, to_table_name),
        );
        buf.blank();
    }

    fn append_drop_table(table_name: &str, buf: &mut ScriptBuilder) {
        buf.statement(
            format!("drop_table({})", render::string(table_name)),
            Operation::DropTable {
                name: table_name.to_string(),
            },
            Origin::table(ChangeKind::Delete, table_name),
        );
        buf.blank();
    }

    fn append_change(
        &self,
        table_name: &str,
        change: &ChangeTable,
        buf: &mut ScriptBuilder,
    ) -> Result<()> {
        let origin = Origin::table(ChangeKind::Change, table_name);

        self.append_change_table(table_name, &origin, buf, |buf| {
            self.append_change_definition(table_name, &change.definition, &origin, buf)?;
            self.append_change_indices(table_name, &change.indices, &origin, buf)?;

            if self.config.enable_foreigner {
                self.foreign_keys.append_change_foreign_keys(
                    table_name,
                    &change.foreign_keys,
                    &origin,
                    buf,
                    self.config,
                );
            }
            Ok(())
        })?;

        buf.blank();
        Ok(())
    }

    /// Wraps `f`'s output in a `change_table` block when batching is on.
    /// An empty block is dropped.
    fn append_change_table<F>(
        &self,
        table_name: &str,
        origin: &Origin,
        buf: &mut ScriptBuilder,
        f: F,
    ) -> Result<()>
    where
        F: FnOnce(&mut ScriptBuilder) -> Result<()>,
    {
        if !self.config.bulk_change {
            return f(buf);
        }

        let start = buf.len();
        buf.line(
            format!("change_table({}, {{:bulk=>true}}) do |t|", render::string(table_name)),
            Some(origin.clone()),
        );
        f(buf)?;

        if buf.len() == start + 1 {
            buf.truncate(start);
        } else {
            buf.line("end", Some(origin.clone()));
        }
        Ok(())
    }

    fn append_change_definition(
        &self,
        table_name: &str,
        changes: &DefinitionChanges,
        origin: &Origin,
        buf: &mut ScriptBuilder,
    ) -> Result<()> {
        for (column_name, spec) in changes.add.iter() {
            let entry = origin.entry(Section::Definition, Some(ChangeKind::Add), column_name);
            self.append_add_column(table_name, column_name, spec, entry, buf)?;
        }

        for (to_column_name, from_column_name) in changes.rename.iter() {
            let entry = origin.entry(Section::Definition, Some(ChangeKind::Rename), to_column_name);
            self.append_rename_column(table_name, to_column_name, from_column_name, entry, buf);
        }

        for (column_name, spec) in changes.change.iter() {
            let entry = origin.entry(Section::Definition, Some(ChangeKind::Change), column_name);
            self.append_change_column(table_name, column_name, spec, entry, buf)?;
        }

        for column_name in changes.delete.keys() {
            let entry = origin.entry(Section::Definition, Some(ChangeKind::Delete), column_name);
            self.append_remove_column(table_name, column_name, entry, buf);
        }

        Ok(())
    }

    fn append_add_column(
        &self,
        table_name: &str,
        column_name: &str,
        spec: &ColumnSpec,
        origin: Origin,
        buf: &mut ScriptBuilder,
    ) -> Result<()> {
        let column_type = require_type(table_name, column_name, spec)?;
        let options = self.config.apply_default_int_limit(column_type, &spec.options);

        let text = if self.config.bulk_change {
            format!(
                "  t.column({}, {}, {})",
                render::symbol(column_name),
                render::symbol(column_type.as_str()),
                render::options(&options)
            )
        } else {
            format!(
                "add_column({}, {}, {}, {})",
                render::string(table_name),
                render::symbol(column_name),
                render::symbol(column_type.as_str()),
                render::options(&options)
            )
        };

        buf.statement(
            text,
            Operation::AddColumn {
                table: table_name.to_string(),
                column: ColumnDef::new(column_name, column_type, options),
            },
            origin,
        );
        Ok(())
    }

    fn append_rename_column(
        &self,
        table_name: &str,
        to_column_name: &str,
        from_column_name: &str,
        origin: Origin,
        buf: &mut ScriptBuilder,
    ) {
        let text = if self.config.bulk_change {
            format!(
                "  t.rename({}, {})",
                render::symbol(from_column_name),
                render::symbol(to_column_name)
            )
        } else {
            format!(
                "rename_column({}, {}, {})",
                render::string(table_name),
                render::symbol(from_column_name),
                render::symbol(to_column_name)
            )
        };

        buf.statement(
            text,
            Operation::RenameColumn {
                table: table_name.to_string(),
                old_name: from_column_name.to_string(),
                new_name: to_column_name.to_string(),
            },
            origin,
        );
    }

    fn append_change_column(
        &self,
        table_name: &str,
        column_name: &str,
        spec: &ColumnSpec,
        origin: Origin,
        buf: &mut ScriptBuilder,
    ) -> Result<()> {
        let column_type = require_type(table_name, column_name, spec)?;
        let options = spec.options.clone();

        let text = if self.config.bulk_change {
            format!(
                "  t.change({}, {}, {})",
                render::symbol(column_name),
                render::symbol(column_type.as_str()),
                render::options(&options)
            )
        } else {
            format!(
                "change_column({}, {}, {}, {})",
                render::string(table_name),
                render::symbol(column_name),
                render::symbol(column_type.as_str()),
                render::options(&options)
            )
        };

        buf.statement(
            text,
            Operation::ChangeColumn {
                table: table_name.to_string(),
                column: ColumnDef::new(column_name, column_type, options),
            },
            origin,
        );
        Ok(())
    }

    fn append_remove_column(
        &self,
        table_name: &str,
        column_name: &str,
        origin: Origin,
        buf: &mut ScriptBuilder,
    ) {
        let text = if self.config.bulk_change {
            format!("  t.remove({})", render::symbol(column_name))
        } else {
            format!(
                "remove_column({}, {})",
                render::string(table_name),
                render::symbol(column_name)
            )
        };

        buf.statement(
            text,
            Operation::RemoveColumn {
                table: table_name.to_string(),
                column_name: column_name.to_string(),
            },
            origin,
        );
    }

    /// Deletions go first so an index dropped and re-added under the same
    /// name does not collide.
    fn append_change_indices(
        &self,
        table_name: &str,
        changes: &IndexChanges,
        origin: &Origin,
        buf: &mut ScriptBuilder,
    ) -> Result<()> {
        for (index_name, spec) in changes.delete.iter() {
            let entry = origin.entry(Section::Indices, Some(ChangeKind::Delete), index_name);
            self.append_remove_index(table_name, index_name, spec, entry, buf)?;
        }

        for (index_name, spec) in changes.add.iter() {
            let entry = origin.entry(Section::Indices, Some(ChangeKind::Add), index_name);
            self.append_add_index(table_name, index_name, spec, entry, buf)?;
        }

        Ok(())
    }

    fn append_add_index(
        &self,
        table_name: &str,
        index_name: &str,
        spec: &IndexSpec,
        origin: Origin,
        buf: &mut ScriptBuilder,
    ) -> Result<()> {
        let columns = spec
            .column_name
            .as_ref()
            .ok_or_else(|| DeltaError::MissingIndexColumns {
                table: table_name.to_string(),
                index: index_name.to_string(),
            })?;

        let text = if self.config.bulk_change {
            format!(
                "  t.index({}, {})",
                render::index_columns(columns),
                render::options(&spec.options)
            )
        } else {
            format!(
                "add_index({}, {}, {})",
                render::string(table_name),
                render::index_columns(columns),
                render::options(&spec.options)
            )
        };

        buf.statement(
            text,
            Operation::AddIndex {
                table: table_name.to_string(),
                columns: columns.names(),
                options: spec.options.clone(),
            },
            origin,
        );
        Ok(())
    }

    fn append_remove_index(
        &self,
        table_name: &str,
        index_name: &str,
        spec: &IndexSpec,
        origin: Origin,
        buf: &mut ScriptBuilder,
    ) -> Result<()> {
        let columns = spec
            .column_name
            .as_ref()
            .ok_or_else(|| DeltaError::MissingIndexColumns {
                table: table_name.to_string(),
                index: index_name.to_string(),
            })?;

        let (target_text, target) = match spec.options.get("name").and_then(Value::as_str) {
            Some(name) => (
                format!("{{:name=>{}}}", render::string(name)),
                IndexTarget::Name(name.to_string()),
            ),
            None => (
                render::index_columns(columns),
                IndexTarget::Columns(columns.names()),
            ),
        };

        let text = if self.config.bulk_change {
            format!("  t.remove_index({target_text})")
        } else {
            format!("remove_index({}, {target_text})", render::string(table_name))
        };

        buf.statement(
            text,
            Operation::RemoveIndex {
                table: table_name.to_string(),
                target,
            },
            origin,
        );
        Ok(())
    }
}

fn require_type(
    table_name: &str,
    column_name: &str,
    spec: &ColumnSpec,
) -> Result<ColumnType> {
    spec.column_type.ok_or_else(|| DeltaError::MissingColumnType {
        table: table_name.to_string(),
        column: column_name.to_string(),
    })
}
