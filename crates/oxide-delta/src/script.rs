//! Compiled scripts.
//!
//! A [`CompiledScript`] is the line-addressable output of the compiler. Each
//! line has a text form for listings, and statement lines also carry the
//! [`Operation`] to execute and the [`Origin`] of the delta entry they were
//! compiled from.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::operations::Operation;

/// Identifier used for compiled scripts in failure references
/// (`<Schema>:7: ...`).
pub const SCRIPT_NAME: &str = "<Schema>";

/// Change kind of a delta bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    /// `add` bucket.
    Add,
    /// `rename` bucket.
    Rename,
    /// `change` bucket.
    Change,
    /// `delete` bucket.
    Delete,
}

impl ChangeKind {
    /// Bucket key.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Rename => "rename",
            Self::Change => "change",
            Self::Delete => "delete",
        }
    }
}

/// Part of a table entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Section {
    /// Columns.
    Definition,
    /// Indices.
    Indices,
    /// Foreign keys.
    ForeignKeys,
}

impl Section {
    /// Section key.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Definition => "definition",
            Self::Indices => "indices",
            Self::ForeignKeys => "foreign_keys",
        }
    }
}

/// Entry inside a table's section.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntryRef {
    /// Section the entry lives in.
    pub section: Section,
    /// Sub-bucket, for `change` entries.
    pub kind: Option<ChangeKind>,
    /// Entry key.
    pub name: String,
}

/// The delta entry a script line was compiled from.
///
/// Displays as a dotted path, e.g. `change.users.definition.add.email`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Origin {
    /// Top-level bucket.
    pub kind: ChangeKind,
    /// Table key.
    pub table: String,
    /// Entry within the table, if the line is about one.
    pub entry: Option<EntryRef>,
}

impl Origin {
    /// Origin naming a whole table entry.
    #[must_use]
    pub fn table(kind: ChangeKind, table: impl Into<String>) -> Self {
        Self {
            kind,
            table: table.into(),
            entry: None,
        }
    }

    /// Origin naming an entry inside this table entry.
    #[must_use]
    pub fn entry(&self, section: Section, kind: Option<ChangeKind>, name: impl Into<String>) -> Self {
        Self {
            kind: self.kind,
            table: self.table.clone(),
            entry: Some(EntryRef {
                section,
                kind,
                name: name.into(),
            }),
        }
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.kind.as_str(), self.table)?;
        if let Some(ref entry) = self.entry {
            write!(f, ".{}", entry.section.as_str())?;
            if let Some(kind) = entry.kind {
                write!(f, ".{}", kind.as_str())?;
            }
            write!(f, ".{}", entry.name)?;
        }
        Ok(())
    }
}

/// One line of a compiled script.
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptLine {
    /// Text form of the line.
    pub text: String,
    /// Operation executed for this line, if it is a statement.
    pub operation: Option<Operation>,
    /// Delta entry this line came from.
    pub origin: Option<Origin>,
}

impl ScriptLine {
    /// Returns true for blank separator lines.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// Line-addressable script compiled from a delta.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompiledScript {
    lines: Vec<ScriptLine>,
}

impl CompiledScript {
    /// All lines, in order.
    #[must_use]
    pub fn lines(&self) -> &[ScriptLine] {
        &self.lines
    }

    /// Number of lines.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    /// Returns true if the script has no statements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Gets a line by its 1-based number.
    #[must_use]
    pub fn line(&self, number: usize) -> Option<&ScriptLine> {
        number.checked_sub(1).and_then(|i| self.lines.get(i))
    }

    /// Statement lines with their 1-based numbers, in execution order.
    pub fn operations(&self) -> impl Iterator<Item = (usize, &ScriptLine, &Operation)> {
        self.lines
            .iter()
            .enumerate()
            .filter_map(|(i, line)| line.operation.as_ref().map(|op| (i + 1, line, op)))
    }

    /// The script text, lines joined with newlines.
    #[must_use]
    pub fn text(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for CompiledScript {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, line) in self.lines.iter().enumerate() {
            if i > 0 {
                f.write_str("\n")?;
            }
            f.write_str(&line.text)?;
        }
        Ok(())
    }
}

/// Output buffer the compiler and foreign-key codegen append to.
#[derive(Debug, Default)]
pub struct ScriptBuilder {
    lines: Vec<ScriptLine>,
}

impl ScriptBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a statement line.
    pub fn statement(&mut self, text: impl Into<String>, operation: Operation, origin: Origin) {
        self.lines.push(ScriptLine {
            text: text.into(),
            operation: Some(operation),
            origin: Some(origin),
        });
    }

    /// Appends a structural line (block header, column declaration, `end`).
    pub fn line(&mut self, text: impl Into<String>, origin: Option<Origin>) {
        self.lines.push(ScriptLine {
            text: text.into(),
            operation: None,
            origin,
        });
    }

    /// Appends a blank separator.
    pub fn blank(&mut self) {
        self.line(String::new(), None);
    }

    /// Number of lines appended so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    /// Returns true if nothing was appended.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub(crate) fn truncate(&mut self, len: usize) {
        self.lines.truncate(len);
    }

    /// Finishes the script, dropping leading and trailing blank lines.
    #[must_use]
    pub fn finish(self) -> CompiledScript {
        let mut lines = self.lines;
        while lines.last().is_some_and(ScriptLine::is_blank) {
            lines.pop();
        }
        let start = lines
            .iter()
            .position(|l| !l.is_blank())
            .unwrap_or(lines.len());
        lines.drain(..start);
        CompiledScript { lines }
    }
}
