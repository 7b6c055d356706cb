//! Run configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::delta::{ColumnType, Options};
use crate::error::{DeltaError, Result};

/// Process-wide settings for one compile/apply run.
///
/// Supplied at construction and never mutated while a run is in progress.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Default value of the `options` table option (e.g. `ENGINE=InnoDB`).
    pub table_options: Option<String>,
    /// Width given to integer columns that do not set a `limit`.
    pub default_int_limit: Option<u32>,
    /// Whether foreign keys are emitted.
    pub enable_foreigner: bool,
    /// Whether per-table alterations are batched into one block.
    pub bulk_change: bool,
    /// Statement run before the script.
    pub pre_query: Option<String>,
    /// Statement run after the script and directives.
    pub post_query: Option<String>,
    /// Include cause chains in warnings.
    pub debug: bool,
    /// Where to write the timed JSON report.
    pub log_file: Option<PathBuf>,
}

impl Config {
    /// Creates the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads a configuration from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)?;
        serde_json::from_str(&json)
            .map_err(|e| DeltaError::InvalidConfig(format!("{}: {}", path.display(), e)))
    }

    /// Sets the default table options.
    #[must_use]
    pub fn table_options(mut self, options: impl Into<String>) -> Self {
        self.table_options = Some(options.into());
        self
    }

    /// Sets the default integer limit.
    #[must_use]
    pub fn default_int_limit(mut self, limit: u32) -> Self {
        self.default_int_limit = Some(limit);
        self
    }

    /// Enables or disables foreign key emission.
    #[must_use]
    pub fn enable_foreigner(mut self, enabled: bool) -> Self {
        self.enable_foreigner = enabled;
        self
    }

    /// Enables or disables batched table alterations.
    #[must_use]
    pub fn bulk_change(mut self, enabled: bool) -> Self {
        self.bulk_change = enabled;
        self
    }

    /// Sets the statement run before the script.
    #[must_use]
    pub fn pre_query(mut self, sql: impl Into<String>) -> Self {
        self.pre_query = Some(sql.into());
        self
    }

    /// Sets the statement run after the script.
    #[must_use]
    pub fn post_query(mut self, sql: impl Into<String>) -> Self {
        self.post_query = Some(sql.into());
        self
    }

    /// Enables or disables cause chains in warnings.
    #[must_use]
    pub fn debug(mut self, enabled: bool) -> Self {
        self.debug = enabled;
        self
    }

    /// Sets the report destination.
    #[must_use]
    pub fn log_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_file = Some(path.into());
        self
    }

    /// Returns table creation options with `options` filled from
    /// [`Config::table_options`] when the table did not set it.
    #[must_use]
    pub fn merge_table_options(&self, options: &Options) -> Options {
        let mut merged = options.clone();
        if let Some(ref defaults) = self.table_options {
            if merged.get("options").is_none_or(serde_json::Value::is_null) {
                merged.insert("options", serde_json::Value::from(defaults.as_str()));
            }
        }
        merged
    }

    /// Returns column options with `limit` filled from
    /// [`Config::default_int_limit`] for integer columns without one.
    #[must_use]
    pub fn apply_default_int_limit(&self, column_type: ColumnType, options: &Options) -> Options {
        let mut merged = options.clone();
        if let Some(limit) = self.default_int_limit {
            let unset = merged.get("limit").is_none_or(serde_json::Value::is_null);
            if column_type == ColumnType::Integer && unset {
                merged.insert("limit", serde_json::Value::from(limit));
            }
        }
        merged
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults() {
        let config = Config::new();
        assert!(!config.bulk_change);
        assert!(!config.enable_foreigner);
        assert_eq!(config.default_int_limit, None);
        assert_eq!(config.log_file, None);
    }

    #[test]
    fn test_parse_partial_json() {
        let config: Config =
            serde_json::from_str(r#"{"bulk_change": true, "default_int_limit": 8}"#).unwrap();
        assert!(config.bulk_change);
        assert_eq!(config.default_int_limit, Some(8));
        assert_eq!(config.pre_query, None);
    }

    #[test]
    fn test_from_file_reports_path_on_bad_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{not json").unwrap();

        let err = Config::from_file(&path).unwrap_err();
        assert!(matches!(err, DeltaError::InvalidConfig(_)));
        assert!(err.to_string().contains("config.json"));
    }

    #[test]
    fn test_merge_table_options_fills_only_when_unset() {
        let config = Config::new().table_options("ENGINE=InnoDB");

        let merged = config.merge_table_options(&Options::new());
        assert_eq!(merged.get("options"), Some(&json!("ENGINE=InnoDB")));

        let own = Options::new().with("options", json!("ENGINE=MyISAM"));
        let merged = config.merge_table_options(&own);
        assert_eq!(merged.get("options"), Some(&json!("ENGINE=MyISAM")));

        let null = Options::new().with("options", json!(null));
        let merged = config.merge_table_options(&null);
        assert_eq!(merged.get("options"), Some(&json!("ENGINE=InnoDB")));
    }

    #[test]
    fn test_default_int_limit() {
        let config = Config::new().default_int_limit(8);

        let merged = config.apply_default_int_limit(ColumnType::Integer, &Options::new());
        assert_eq!(merged.get("limit"), Some(&json!(8)));

        let own = Options::new().with("limit", json!(4));
        let merged = config.apply_default_int_limit(ColumnType::Integer, &own);
        assert_eq!(merged.get("limit"), Some(&json!(4)));

        let merged = config.apply_default_int_limit(ColumnType::String, &Options::new());
        assert!(merged.get("limit").is_none());
    }

    #[test]
    fn test_merges_do_not_touch_source() {
        let config = Config::new().default_int_limit(8);
        let source = Options::new();
        let _ = config.apply_default_int_limit(ColumnType::Integer, &source);
        assert!(source.is_empty());
    }
}
