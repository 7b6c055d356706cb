//! Rendering of values in the compiled script's text form.
//!
//! Scripts read like schema DSL calls: table names are quoted strings,
//! column names and types are symbols, options are hashes.

use serde_json::Value;

use crate::delta::{IndexColumns, Options};

fn is_bare_symbol(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Renders a quoted string literal.
#[must_use]
pub fn string(s: &str) -> String {
    // JSON escaping is a valid double-quoted literal here.
    Value::from(s).to_string()
}

/// Renders a symbol: `:name`, or `:"odd name"` when it needs quoting.
#[must_use]
pub fn symbol(name: &str) -> String {
    if is_bare_symbol(name) {
        format!(":{name}")
    } else {
        format!(":{}", string(name))
    }
}

/// Renders an arbitrary option value.
#[must_use]
pub fn value(v: &Value) -> String {
    match v {
        Value::Null => "nil".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => string(s),
        Value::Array(items) => {
            let items: Vec<String> = items.iter().map(value).collect();
            format!("[{}]", items.join(", "))
        }
        Value::Object(map) => hash(map.iter().map(|(k, v)| (k.as_str(), v))),
    }
}

/// Renders key/value pairs as a hash literal.
pub fn hash<'a>(entries: impl Iterator<Item = (&'a str, &'a Value)>) -> String {
    let parts: Vec<String> = entries
        .map(|(k, v)| format!("{}=>{}", symbol(k), value(v)))
        .collect();
    format!("{{{}}}", parts.join(", "))
}

/// Renders an option map, preserving insertion order.
#[must_use]
pub fn options(opts: &Options) -> String {
    hash(opts.iter())
}

/// Renders index columns: `:email` or `[:a, :b]`.
#[must_use]
pub fn index_columns(columns: &IndexColumns) -> String {
    match columns {
        IndexColumns::Single(name) => symbol(name),
        IndexColumns::Multiple(names) => {
            let names: Vec<String> = names.iter().map(|n| symbol(n)).collect();
            format!("[{}]", names.join(", "))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_symbols() {
        assert_eq!(symbol("id"), ":id");
        assert_eq!(symbol("_private2"), ":_private2");
        assert_eq!(symbol("first name"), ":\"first name\"");
        assert_eq!(symbol("2fa"), ":\"2fa\"");
    }

    #[test]
    fn test_strings_are_escaped() {
        assert_eq!(string("users"), "\"users\"");
        assert_eq!(string("say \"hi\""), "\"say \\\"hi\\\"\"");
    }

    #[test]
    fn test_options_keep_order() {
        let opts = Options::new()
            .with("null", json!(false))
            .with("limit", json!(8))
            .with("default", json!("x"));
        assert_eq!(options(&opts), "{:null=>false, :limit=>8, :default=>\"x\"}");
        assert_eq!(options(&Options::new()), "{}");
    }

    #[test]
    fn test_nested_values() {
        assert_eq!(value(&json!(null)), "nil");
        assert_eq!(value(&json!([1, "a"])), "[1, \"a\"]");
        assert_eq!(value(&json!({"name": "idx"})), "{:name=>\"idx\"}");
    }

    #[test]
    fn test_index_columns() {
        assert_eq!(index_columns(&IndexColumns::Single("email".into())), ":email");
        assert_eq!(
            index_columns(&IndexColumns::Multiple(vec!["a".into(), "b".into()])),
            "[:a, :b]"
        );
    }
}
