//! Maps apply failures back to the compiled script.
//!
//! When a statement of the compiled script fails, the resulting error is
//! rewritten to carry a numbered listing of the script with the offending
//! line marked, so the operator can find the delta entry behind it.

use std::error::Error as StdError;
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::{BoxError, DeltaError};
use crate::script::{CompiledScript, Origin, SCRIPT_NAME};

/// Lines shown before the offending line.
const LINES_BEFORE: usize = 6;
/// Lines shown after the offending line.
const LINES_AFTER: usize = 4;

static LINE_REFERENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"(?m)^{}:(\d+):", regex::escape(SCRIPT_NAME)))
        .expect("line reference pattern is valid")
});

/// Failure raised while applying one line of a compiled script.
#[derive(Debug)]
pub struct ApplyFailure {
    /// 1-based line of the compiled script, when known.
    pub line: Option<usize>,
    /// Description of the operation that failed.
    pub operation: Option<String>,
    /// Delta entry the line was compiled from.
    pub origin: Option<Origin>,
    /// Underlying error.
    pub source: BoxError,
}

impl ApplyFailure {
    /// Wraps an error raised outside any particular line.
    pub fn new(source: impl Into<BoxError>) -> Self {
        Self {
            line: None,
            operation: None,
            origin: None,
            source: source.into(),
        }
    }

    /// Wraps an error raised by a given script line.
    pub fn at_line(line: usize, source: impl Into<BoxError>) -> Self {
        Self {
            line: Some(line),
            ..Self::new(source)
        }
    }
}

impl fmt::Display for ApplyFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.line {
            Some(line) => write!(f, "{}:{}: {}", SCRIPT_NAME, line, self.source),
            None => write!(f, "{}", self.source),
        }
    }
}

impl StdError for ApplyFailure {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        Some(self.source.as_ref())
    }
}

/// Returns the script line a failure came from, or 0 when unknown.
///
/// The structured line wins; otherwise each message in the cause chain is
/// searched for a `<Schema>:<line>:` reference.
#[must_use]
pub fn detect_error_line(failure: &ApplyFailure) -> usize {
    if let Some(line) = failure.line {
        return line;
    }

    let mut current: Option<&(dyn StdError + 'static)> = Some(failure.source.as_ref());
    while let Some(err) = current {
        let message = err.to_string();
        if let Some(line) = LINE_REFERENCE
            .captures(&message)
            .and_then(|c| c[1].parse().ok())
        {
            return line;
        }
        current = err.source();
    }
    0
}

/// Numbered listing of the script, marking `error_line`.
///
/// With a known line the listing is cut to the lines around it.
#[must_use]
pub fn listing(script: &CompiledScript, error_line: usize) -> String {
    let width = (script.len() + 1).to_string().len();

    let (from, to) = if (1..=script.len()).contains(&error_line) {
        (
            error_line.saturating_sub(LINES_BEFORE).max(1),
            (error_line + LINES_AFTER).min(script.len()),
        )
    } else {
        (1, script.len())
    };

    script
        .lines()
        .iter()
        .enumerate()
        .map(|(i, line)| (i + 1, line))
        .filter(|(number, _)| (from..=to).contains(number))
        .map(|(number, line)| {
            let prefix = if number == error_line { "* " } else { "  " };
            format!("{prefix}{number:>width$}: {}", line.text)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Converts an apply failure into an annotated [`DeltaError::Apply`].
///
/// A line outside the script counts as unknown.
///
/// The original error stays reachable through `source()`.
#[must_use]
pub fn annotate(script: &CompiledScript, failure: ApplyFailure) -> DeltaError {
    let line = Some(detect_error_line(&failure))
        .filter(|n| (1..=script.len()).contains(n))
        .unwrap_or(0);
    let message = format!("{}\n{}", failure.source, listing(script, line));
    let origin = failure
        .origin
        .or_else(|| script.line(line).and_then(|l| l.origin.clone()));

    DeltaError::Apply {
        message,
        line,
        origin,
        source: failure.source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::{ChangeKind, ScriptBuilder};

    fn script_of(n: usize) -> CompiledScript {
        let mut buf = ScriptBuilder::new();
        for i in 1..=n {
            buf.line(format!("stmt_{i}"), None);
        }
        buf.finish()
    }

    #[derive(Debug, thiserror::Error)]
    #[error("{0}")]
    struct Plain(String);

    #[test]
    fn test_window_around_line_seven() {
        let script = script_of(20);
        let err = annotate(&script, ApplyFailure::at_line(7, Plain("boom".into())));

        let DeltaError::Apply { message, line, .. } = err else {
            panic!("expected Apply");
        };
        assert_eq!(line, 7);

        let mut parts = message.lines();
        assert_eq!(parts.next(), Some("boom"));
        let listed: Vec<&str> = parts.collect();
        assert_eq!(listed.len(), 11);
        assert_eq!(listed[0], "   1: stmt_1");
        assert_eq!(listed[6], "*  7: stmt_7");
        assert_eq!(listed[10], "  11: stmt_11");
    }

    #[test]
    fn test_window_clamped_at_end() {
        let script = script_of(8);
        let err = annotate(&script, ApplyFailure::at_line(8, Plain("bad".into())));
        let message = err.to_string();
        let listed: Vec<&str> = message.lines().skip(1).collect();
        assert_eq!(listed.len(), 7);
        assert_eq!(listed.first(), Some(&"  2: stmt_2"));
        assert_eq!(listed.last(), Some(&"* 8: stmt_8"));
    }

    #[test]
    fn test_unknown_line_lists_whole_script_unmarked() {
        let script = script_of(3);
        let err = annotate(&script, ApplyFailure::new(Plain("sink crashed".into())));

        let DeltaError::Apply { message, line, .. } = err else {
            panic!("expected Apply");
        };
        assert_eq!(line, 0);
        assert_eq!(message, "sink crashed\n  1: stmt_1\n  2: stmt_2\n  3: stmt_3");
    }

    #[test]
    fn test_line_past_end_lists_whole_script() {
        let script = script_of(3);
        let failure = ApplyFailure::new(Plain("<Schema>:9: bad".into()));
        let err = annotate(&script, failure);

        let DeltaError::Apply { message, line, .. } = err else {
            panic!("expected Apply");
        };
        assert_eq!(line, 0);
        assert_eq!(message, "<Schema>:9: bad\n  1: stmt_1\n  2: stmt_2\n  3: stmt_3");
    }

    #[test]
    fn test_line_detected_from_message_chain() {
        #[derive(Debug, thiserror::Error)]
        #[error("wrapped")]
        struct Wrapper(#[source] Plain);

        let failure = ApplyFailure::new(Wrapper(Plain("<Schema>:12: near \"x\"".into())));
        assert_eq!(detect_error_line(&failure), 12);

        let failure = ApplyFailure::new(Plain("somewhere else:12: oops".into()));
        assert_eq!(detect_error_line(&failure), 0);
    }

    #[test]
    fn test_source_is_preserved() {
        let script = script_of(2);
        let err = annotate(&script, ApplyFailure::at_line(1, Plain("root cause".into())));
        let source = err.source().expect("source kept");
        assert_eq!(source.to_string(), "root cause");
    }

    #[test]
    fn test_origin_falls_back_to_script_line() {
        let mut buf = ScriptBuilder::new();
        buf.line("first", Some(Origin::table(ChangeKind::Add, "users")));
        let script = buf.finish();

        let err = annotate(&script, ApplyFailure::at_line(1, Plain("x".into())));
        let DeltaError::Apply { origin, .. } = err else {
            panic!("expected Apply");
        };
        assert_eq!(origin.unwrap().table, "users");
    }

    #[test]
    fn test_display_references_line() {
        let failure = ApplyFailure::at_line(4, Plain("no such table".into()));
        assert_eq!(failure.to_string(), "<Schema>:4: no such table");
    }
}
