//! Delta model.
//!
//! A [`Delta`] is the structured difference between the desired schema and
//! the applied one, bucketed by change kind. Every bucket keeps insertion
//! order, which drives the order statements are compiled in.

use std::fmt;
use std::marker::PhantomData;
use std::path::Path;
use std::sync::Arc;

use serde::de::{IgnoredAny, MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{BoxError, Result};
use crate::schema::DatabaseSchema;

/// Insertion-ordered map keyed by name.
#[derive(Clone, PartialEq)]
pub struct Bucket<T> {
    entries: Vec<(String, T)>,
}

impl<T> Bucket<T> {
    /// Creates an empty bucket.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Inserts an entry. An existing key keeps its position and gets the new value.
    pub fn insert(&mut self, key: impl Into<String>, value: T) {
        let key = key.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    /// Builder form of [`Bucket::insert`].
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: T) -> Self {
        self.insert(key, value);
        self
    }

    /// Looks up an entry by key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&T> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Returns true if the key is present.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Iterates entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &T)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Iterates keys in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if there are no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<T> Default for Bucket<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: fmt::Debug> fmt::Debug for Bucket<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl<K: Into<String>, T> FromIterator<(K, T)> for Bucket<T> {
    fn from_iter<I: IntoIterator<Item = (K, T)>>(iter: I) -> Self {
        let mut bucket = Self::new();
        for (k, v) in iter {
            bucket.insert(k, v);
        }
        bucket
    }
}

impl<T: Serialize> Serialize for Bucket<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (k, v) in &self.entries {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

struct BucketVisitor<T>(PhantomData<T>);

impl<'de, T: Deserialize<'de>> Visitor<'de> for BucketVisitor<T> {
    type Value = Bucket<T>;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a map")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> std::result::Result<Self::Value, A::Error> {
        let mut bucket = Bucket::new();
        while let Some((key, value)) = access.next_entry::<String, T>()? {
            bucket.insert(key, value);
        }
        Ok(bucket)
    }

    // `null` reads as an empty bucket.
    fn visit_unit<E: serde::de::Error>(self) -> std::result::Result<Self::Value, E> {
        Ok(Bucket::new())
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Bucket<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        deserializer.deserialize_any(BucketVisitor(PhantomData))
    }
}

/// Free-form options (nullability, default, limit, index name, ...).
pub type Options = Bucket<serde_json::Value>;

/// Column type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    /// Integer, width controlled by the `limit` option.
    Integer,
    /// 64-bit integer.
    Bigint,
    /// Variable-length string.
    String,
    /// Unbounded text.
    Text,
    /// Floating point.
    Float,
    /// Decimal with `precision`/`scale` options.
    Decimal,
    /// Date and time.
    Datetime,
    /// Timestamp.
    Timestamp,
    /// Time of day.
    Time,
    /// Calendar date.
    Date,
    /// Binary blob.
    Binary,
    /// Boolean.
    Boolean,
    /// JSON document.
    Json,
}

impl ColumnType {
    /// The tag as written in scripts (`integer`, `string`, ...).
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Integer => "integer",
            Self::Bigint => "bigint",
            Self::String => "string",
            Self::Text => "text",
            Self::Float => "float",
            Self::Decimal => "decimal",
            Self::Datetime => "datetime",
            Self::Timestamp => "timestamp",
            Self::Time => "time",
            Self::Date => "date",
            Self::Binary => "binary",
            Self::Boolean => "boolean",
            Self::Json => "json",
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A column declaration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnSpec {
    /// Column type. Required wherever a column is created or changed.
    #[serde(rename = "type")]
    pub column_type: Option<ColumnType>,
    /// Column options.
    pub options: Options,
}

impl ColumnSpec {
    /// Creates a column of the given type with no options.
    #[must_use]
    pub fn new(column_type: ColumnType) -> Self {
        Self {
            column_type: Some(column_type),
            options: Options::new(),
        }
    }

    /// Sets an option.
    #[must_use]
    pub fn option(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.options.insert(key, value.into());
        self
    }
}

/// Columns an index is built on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IndexColumns {
    /// A single column.
    Single(String),
    /// Several columns, in index order.
    Multiple(Vec<String>),
}

impl IndexColumns {
    /// Column names in index order.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        match self {
            Self::Single(name) => vec![name.clone()],
            Self::Multiple(names) => names.clone(),
        }
    }
}

/// An index declaration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexSpec {
    /// Indexed column(s). Required.
    pub column_name: Option<IndexColumns>,
    /// Index options (`unique`, `name`, `where`).
    pub options: Options,
}

impl IndexSpec {
    /// Creates an index on a single column.
    #[must_use]
    pub fn column(name: impl Into<String>) -> Self {
        Self {
            column_name: Some(IndexColumns::Single(name.into())),
            options: Options::new(),
        }
    }

    /// Creates an index on several columns.
    #[must_use]
    pub fn columns<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            column_name: Some(IndexColumns::Multiple(
                names.into_iter().map(Into::into).collect(),
            )),
            options: Options::new(),
        }
    }

    /// Sets an option.
    #[must_use]
    pub fn option(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.options.insert(key, value.into());
        self
    }
}

/// A foreign key declaration, handed to the foreign-key codegen as is.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForeignKeySpec {
    /// Referenced table.
    pub to_table: String,
    /// Foreign key options (`column`, `primary_key`, `name`, `on_delete`, `on_update`).
    pub options: Options,
}

impl ForeignKeySpec {
    /// Creates a foreign key referencing `to_table`.
    #[must_use]
    pub fn new(to_table: impl Into<String>) -> Self {
        Self {
            to_table: to_table.into(),
            options: Options::new(),
        }
    }

    /// Sets an option.
    #[must_use]
    pub fn option(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.options.insert(key, value.into());
        self
    }
}

/// Payload of an `add` entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AddTable {
    /// Columns in declaration order.
    pub definition: Bucket<ColumnSpec>,
    /// Indices added after creation.
    pub indices: Bucket<IndexSpec>,
    /// Foreign keys added after creation.
    pub foreign_keys: Bucket<ForeignKeySpec>,
    /// Table creation options.
    pub options: Options,
}

impl AddTable {
    /// Creates an empty table definition.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a column.
    #[must_use]
    pub fn column(mut self, name: impl Into<String>, spec: ColumnSpec) -> Self {
        self.definition.insert(name, spec);
        self
    }

    /// Adds an index.
    #[must_use]
    pub fn index(mut self, name: impl Into<String>, spec: IndexSpec) -> Self {
        self.indices.insert(name, spec);
        self
    }

    /// Adds a foreign key.
    #[must_use]
    pub fn foreign_key(mut self, name: impl Into<String>, spec: ForeignKeySpec) -> Self {
        self.foreign_keys.insert(name, spec);
        self
    }

    /// Sets a table option.
    #[must_use]
    pub fn option(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.options.insert(key, value.into());
        self
    }
}

/// Column-level changes of a `change` entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DefinitionChanges {
    /// Columns to add.
    pub add: Bucket<ColumnSpec>,
    /// Columns to rename, keyed by new name, valued by old name.
    pub rename: Bucket<String>,
    /// Columns whose type or options change.
    pub change: Bucket<ColumnSpec>,
    /// Columns to remove.
    pub delete: Bucket<ColumnSpec>,
}

/// Index changes of a `change` entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexChanges {
    /// Indices to add.
    pub add: Bucket<IndexSpec>,
    /// Indices to remove.
    pub delete: Bucket<IndexSpec>,
}

/// Foreign key changes of a `change` entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForeignKeyChanges {
    /// Foreign keys to add.
    pub add: Bucket<ForeignKeySpec>,
    /// Foreign keys to remove.
    pub delete: Bucket<ForeignKeySpec>,
}

/// Payload of a `change` entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChangeTable {
    /// Column changes.
    pub definition: DefinitionChanges,
    /// Index changes.
    pub indices: IndexChanges,
    /// Foreign key changes.
    pub foreign_keys: ForeignKeyChanges,
}

impl ChangeTable {
    /// Creates an empty change set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a column.
    #[must_use]
    pub fn add_column(mut self, name: impl Into<String>, spec: ColumnSpec) -> Self {
        self.definition.add.insert(name, spec);
        self
    }

    /// Renames column `from` to `to`.
    #[must_use]
    pub fn rename_column(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.definition.rename.insert(to, from.into());
        self
    }

    /// Changes a column.
    #[must_use]
    pub fn change_column(mut self, name: impl Into<String>, spec: ColumnSpec) -> Self {
        self.definition.change.insert(name, spec);
        self
    }

    /// Removes a column.
    #[must_use]
    pub fn remove_column(mut self, name: impl Into<String>) -> Self {
        self.definition.delete.insert(name, ColumnSpec::default());
        self
    }

    /// Adds an index.
    #[must_use]
    pub fn add_index(mut self, name: impl Into<String>, spec: IndexSpec) -> Self {
        self.indices.add.insert(name, spec);
        self
    }

    /// Removes an index.
    #[must_use]
    pub fn remove_index(mut self, name: impl Into<String>, spec: IndexSpec) -> Self {
        self.indices.delete.insert(name, spec);
        self
    }

    /// Adds a foreign key.
    #[must_use]
    pub fn add_foreign_key(mut self, name: impl Into<String>, spec: ForeignKeySpec) -> Self {
        self.foreign_keys.add.insert(name, spec);
        self
    }

    /// Removes a foreign key.
    #[must_use]
    pub fn remove_foreign_key(mut self, name: impl Into<String>, spec: ForeignKeySpec) -> Self {
        self.foreign_keys.delete.insert(name, spec);
        self
    }
}

/// Payload of a `delete` entry. Any content is ignored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DropTable {}

impl<'de> Deserialize<'de> for DropTable {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        IgnoredAny::deserialize(deserializer)?;
        Ok(Self {})
    }
}

/// Predicate written in code, evaluated against the live schema.
pub type Predicate = Arc<dyn Fn(&DatabaseSchema) -> std::result::Result<bool, BoxError> + Send + Sync>;

/// Gate deciding whether an execute directive runs.
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    /// The table exists.
    TableExists(String),
    /// The table does not exist.
    TableAbsent(String),
    /// The column exists on the table.
    ColumnExists {
        /// Table name.
        table: String,
        /// Column name.
        column: String,
    },
    /// The column does not exist on the table.
    ColumnAbsent {
        /// Table name.
        table: String,
        /// Column name.
        column: String,
    },
    /// The named index exists on the table.
    IndexExists {
        /// Table name.
        table: String,
        /// Index name.
        name: String,
    },
    /// The named index does not exist on the table.
    IndexAbsent {
        /// Table name.
        table: String,
        /// Index name.
        name: String,
    },
    /// Arbitrary predicate. Only constructible in code.
    #[serde(skip)]
    Custom(Predicate),
}

impl Condition {
    /// Wraps a closure as a condition.
    pub fn custom<F>(predicate: F) -> Self
    where
        F: Fn(&DatabaseSchema) -> std::result::Result<bool, BoxError> + Send + Sync + 'static,
    {
        Self::Custom(Arc::new(predicate))
    }

    /// Evaluates the condition against an inspected schema.
    pub fn evaluate(&self, schema: &DatabaseSchema) -> std::result::Result<bool, BoxError> {
        match self {
            Self::TableExists(table) => Ok(schema.get_table(table).is_some()),
            Self::TableAbsent(table) => Ok(schema.get_table(table).is_none()),
            Self::ColumnExists { table, column } => Ok(schema.has_column(table, column)),
            Self::ColumnAbsent { table, column } => Ok(!schema.has_column(table, column)),
            Self::IndexExists { table, name } => Ok(schema.has_index(table, name)),
            Self::IndexAbsent { table, name } => Ok(!schema.has_index(table, name)),
            Self::Custom(predicate) => predicate(schema),
        }
    }
}

impl fmt::Debug for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TableExists(t) => f.debug_tuple("TableExists").field(t).finish(),
            Self::TableAbsent(t) => f.debug_tuple("TableAbsent").field(t).finish(),
            Self::ColumnExists { table, column } => f
                .debug_struct("ColumnExists")
                .field("table", table)
                .field("column", column)
                .finish(),
            Self::ColumnAbsent { table, column } => f
                .debug_struct("ColumnAbsent")
                .field("table", table)
                .field("column", column)
                .finish(),
            Self::IndexExists { table, name } => f
                .debug_struct("IndexExists")
                .field("table", table)
                .field("name", name)
                .finish(),
            Self::IndexAbsent { table, name } => f
                .debug_struct("IndexAbsent")
                .field("table", table)
                .field("name", name)
                .finish(),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// A raw SQL statement run after the compiled script.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecuteDirective {
    /// Statement text.
    pub sql: String,
    /// Optional gate. Absent means always executable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<Condition>,
}

impl ExecuteDirective {
    /// Creates an unconditional directive.
    #[must_use]
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            condition: None,
        }
    }

    /// Gates the directive on a condition.
    #[must_use]
    pub fn when(mut self, condition: Condition) -> Self {
        self.condition = Some(condition);
        self
    }
}

/// Structured difference between the desired and the applied schema.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Delta {
    /// Tables to create.
    pub add: Bucket<AddTable>,
    /// Tables to rename, keyed by new name, valued by old name.
    pub rename: Bucket<String>,
    /// Tables to alter.
    pub change: Bucket<ChangeTable>,
    /// Tables to drop.
    pub delete: Bucket<DropTable>,
    /// Raw statements run after the script.
    pub execute: Vec<ExecuteDirective>,
}

impl Delta {
    /// Creates an empty delta.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a delta from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Reads a delta from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Adds a table creation.
    #[must_use]
    pub fn add_table(mut self, name: impl Into<String>, table: AddTable) -> Self {
        self.add.insert(name, table);
        self
    }

    /// Adds a table rename from `from` to `to`.
    #[must_use]
    pub fn rename_table(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.rename.insert(to, from.into());
        self
    }

    /// Adds a table alteration.
    #[must_use]
    pub fn change_table(mut self, name: impl Into<String>, change: ChangeTable) -> Self {
        self.change.insert(name, change);
        self
    }

    /// Adds a table drop.
    #[must_use]
    pub fn drop_table(mut self, name: impl Into<String>) -> Self {
        self.delete.insert(name, DropTable {});
        self
    }

    /// Appends an execute directive.
    #[must_use]
    pub fn execute(mut self, directive: ExecuteDirective) -> Self {
        self.execute.push(directive);
        self
    }

    /// Returns true if no bucket has entries and there are no directives.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.add.is_empty()
            && self.rename.is_empty()
            && self.change.is_empty()
            && self.delete.is_empty()
            && self.execute.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bucket_keeps_insertion_order() {
        let bucket: Bucket<i32> = [("b", 1), ("a", 2), ("c", 3)].into_iter().collect();
        assert_eq!(bucket.keys().collect::<Vec<_>>(), vec!["b", "a", "c"]);
    }

    #[test]
    fn test_bucket_insert_replaces_in_place() {
        let mut bucket = Bucket::new();
        bucket.insert("x", 1);
        bucket.insert("y", 2);
        bucket.insert("x", 3);
        assert_eq!(bucket.len(), 2);
        assert_eq!(bucket.iter().next(), Some(("x", &3)));
    }

    #[test]
    fn test_deserialize_preserves_document_order() {
        let delta = Delta::from_json(
            r#"{
                "add": {
                    "zebras": {"definition": {"id": {"type": "integer"}}},
                    "apples": {"definition": {"name": {"type": "string", "options": {"null": false}}}}
                },
                "delete": {"old": {}}
            }"#,
        )
        .unwrap();

        assert_eq!(delta.add.keys().collect::<Vec<_>>(), vec!["zebras", "apples"]);
        assert!(delta.rename.is_empty());
        assert!(delta.change.is_empty());
        assert!(delta.delete.contains_key("old"));

        let apples = delta.add.get("apples").unwrap();
        let name = apples.definition.get("name").unwrap();
        assert_eq!(name.column_type, Some(ColumnType::String));
        assert_eq!(name.options.get("null"), Some(&serde_json::json!(false)));
    }

    #[test]
    fn test_deserialize_null_bucket() {
        let delta = Delta::from_json(r#"{"add": null, "execute": []}"#).unwrap();
        assert!(delta.is_empty());
    }

    #[test]
    fn test_deserialize_missing_type_is_kept_for_compiler() {
        let delta = Delta::from_json(r#"{"add": {"t": {"definition": {"c": {}}}}}"#).unwrap();
        let column = delta.add.get("t").unwrap().definition.get("c").unwrap();
        assert_eq!(column.column_type, None);
    }

    #[test]
    fn test_index_columns_untagged() {
        let single: IndexSpec = serde_json::from_str(r#"{"column_name": "email"}"#).unwrap();
        let multi: IndexSpec = serde_json::from_str(r#"{"column_name": ["a", "b"]}"#).unwrap();
        assert_eq!(single.column_name.unwrap().names(), vec!["email"]);
        assert_eq!(multi.column_name.unwrap().names(), vec!["a", "b"]);
    }

    #[test]
    fn test_execute_directive_with_declarative_condition() {
        let delta = Delta::from_json(
            r#"{"execute": [
                {"sql": "SELECT 1"},
                {"sql": "DROP INDEX x", "condition": {"index_exists": {"table": "t", "name": "x"}}}
            ]}"#,
        )
        .unwrap();

        assert!(delta.execute[0].condition.is_none());
        assert!(matches!(
            delta.execute[1].condition,
            Some(Condition::IndexExists { .. })
        ));
    }

    #[test]
    fn test_rename_builders_store_new_to_old() {
        let delta = Delta::new().rename_table("people", "users");
        assert_eq!(delta.rename.get("users"), Some(&"people".to_string()));

        let change = ChangeTable::new().rename_column("nick", "handle");
        assert_eq!(change.definition.rename.get("handle"), Some(&"nick".to_string()));
    }

    #[test]
    fn test_custom_condition() {
        let cond = Condition::custom(|schema| Ok(schema.tables.is_empty()));
        assert!(cond.evaluate(&DatabaseSchema::new()).unwrap());
    }

    #[test]
    fn test_delete_entries_accept_any_payload() {
        let delta =
            Delta::from_json(r#"{"delete": {"a": null, "b": true, "c": {}, "d": "x"}}"#).unwrap();
        assert_eq!(delta.delete.keys().collect::<Vec<_>>(), vec!["a", "b", "c", "d"]);
        assert_eq!(delta.delete.get("a"), Some(&DropTable {}));
    }
}
