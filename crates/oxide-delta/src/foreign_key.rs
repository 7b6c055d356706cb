//! Foreign key code generation.
//!
//! The compiler delegates foreign keys to a [`ForeignKeyCodegen`]. Output
//! follows the same batched/standalone convention as the rest of the script:
//! inside a `change_table` block statements use the `t.` form.

use serde_json::Value;

use crate::config::Config;
use crate::delta::{ForeignKeyChanges, ForeignKeySpec};
use crate::operations::Operation;
use crate::render;
use crate::script::{ChangeKind, Origin, ScriptBuilder, Section};

/// Emits foreign key statements into a script.
pub trait ForeignKeyCodegen {
    /// Emits the statement adding one foreign key.
    fn append_add_foreign_key(
        &self,
        table: &str,
        name: &str,
        spec: &ForeignKeySpec,
        origin: &Origin,
        buf: &mut ScriptBuilder,
        config: &Config,
    );

    /// Emits the statements for a table's foreign key changes.
    fn append_change_foreign_keys(
        &self,
        table: &str,
        changes: &ForeignKeyChanges,
        origin: &Origin,
        buf: &mut ScriptBuilder,
        config: &Config,
    );
}

/// Default foreign key codegen.
///
/// The delta key names the constraint unless its options set `name`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ForeignerCodegen;

impl ForeignerCodegen {
    /// Creates the codegen.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn constraint_name(name: &str, spec: &ForeignKeySpec) -> String {
        spec.options
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or(name)
            .to_string()
    }

    fn append_remove_foreign_key(
        table: &str,
        name: &str,
        spec: &ForeignKeySpec,
        origin: &Origin,
        buf: &mut ScriptBuilder,
        config: &Config,
    ) {
        let constraint = Self::constraint_name(name, spec);
        let target = format!("{{:name=>{}}}", render::string(&constraint));
        let text = if config.bulk_change {
            format!("  t.remove_foreign_key({target})")
        } else {
            format!("remove_foreign_key({}, {target})", render::string(table))
        };

        buf.statement(
            text,
            Operation::RemoveForeignKey {
                table: table.to_string(),
                name: constraint,
            },
            origin.entry(Section::ForeignKeys, Some(ChangeKind::Delete), name),
        );
    }

    fn add(
        table: &str,
        name: &str,
        spec: &ForeignKeySpec,
        origin: Origin,
        buf: &mut ScriptBuilder,
        config: &Config,
    ) {
        let mut options = spec.options.clone();
        if !options.contains_key("name") {
            options.insert("name", Value::from(name));
        }

        let text = if config.bulk_change {
            format!(
                "  t.foreign_key({}, {})",
                render::string(&spec.to_table),
                render::options(&options)
            )
        } else {
            format!(
                "add_foreign_key({}, {}, {})",
                render::string(table),
                render::string(&spec.to_table),
                render::options(&options)
            )
        };

        buf.statement(
            text,
            Operation::AddForeignKey {
                table: table.to_string(),
                to_table: spec.to_table.clone(),
                options,
            },
            origin,
        );
    }
}

impl ForeignKeyCodegen for ForeignerCodegen {
    fn append_add_foreign_key(
        &self,
        table: &str,
        name: &str,
        spec: &ForeignKeySpec,
        origin: &Origin,
        buf: &mut ScriptBuilder,
        config: &Config,
    ) {
        let origin = origin.entry(Section::ForeignKeys, None, name);
        Self::add(table, name, spec, origin, buf, config);
    }

    fn append_change_foreign_keys(
        &self,
        table: &str,
        changes: &ForeignKeyChanges,
        origin: &Origin,
        buf: &mut ScriptBuilder,
        config: &Config,
    ) {
        for (name, spec) in changes.delete.iter() {
            Self::append_remove_foreign_key(table, name, spec, origin, buf, config);
        }

        for (name, spec) in changes.add.iter() {
            let entry = origin.entry(Section::ForeignKeys, Some(ChangeKind::Add), name);
            Self::add(table, name, spec, entry, buf, config);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delta::Bucket;

    fn texts(buf: ScriptBuilder) -> Vec<String> {
        buf.finish().lines().iter().map(|l| l.text.clone()).collect()
    }

    #[test]
    fn test_add_uses_key_as_name() {
        let mut buf = ScriptBuilder::new();
        let spec = ForeignKeySpec::new("users").option("column", "author_id");
        ForeignerCodegen.append_add_foreign_key(
            "posts",
            "fk_posts_author",
            &spec,
            &Origin::table(ChangeKind::Add, "posts"),
            &mut buf,
            &Config::new(),
        );

        assert_eq!(
            texts(buf),
            vec![
                "add_foreign_key(\"posts\", \"users\", {:column=>\"author_id\", :name=>\"fk_posts_author\"})"
            ]
        );
    }

    #[test]
    fn test_change_removes_before_adding_in_bulk_form() {
        let changes = ForeignKeyChanges {
            add: Bucket::new().with("fk_new", ForeignKeySpec::new("users")),
            delete: Bucket::new().with(
                "fk_old",
                ForeignKeySpec::new("users").option("name", "legacy_fk"),
            ),
        };

        let mut buf = ScriptBuilder::new();
        ForeignerCodegen.append_change_foreign_keys(
            "posts",
            &changes,
            &Origin::table(ChangeKind::Change, "posts"),
            &mut buf,
            &Config::new().bulk_change(true),
        );

        let script = buf.finish();
        let lines: Vec<&str> = script.lines().iter().map(|l| l.text.as_str()).collect();
        assert_eq!(
            lines,
            vec![
                "  t.remove_foreign_key({:name=>\"legacy_fk\"})",
                "  t.foreign_key(\"users\", {:name=>\"fk_new\"})",
            ]
        );
        assert_eq!(
            script.lines()[0].origin.as_ref().unwrap().to_string(),
            "change.posts.foreign_keys.delete.fk_old"
        );
        assert!(matches!(
            script.lines()[0].operation,
            Some(Operation::RemoveForeignKey { ref name, .. }) if name == "legacy_fk"
        ));
    }
}
